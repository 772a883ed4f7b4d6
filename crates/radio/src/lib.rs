//! stop-and-wait transport over a fixed-width broadcast radio link

use std::time::Duration;

use ooklink_core::{Address, CHUNK_SIZE, MAX_SEQUENCED_LEN};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod arq;
pub mod clock;
pub mod filter;
pub mod simulated;
pub mod slots;
pub mod transceiver;
pub mod transport;

pub use arq::{OutboundTransfer, Progress};
pub use clock::{Clock, ManualClock, SystemClock};
pub use filter::{AcceptBroadcast, AddressFilter, ExactMatch, Promiscuous};
pub use simulated::{MediumPort, MediumStats, SimulatedMedium};
pub use slots::{Slot, SlotId, SlotPool};
pub use transceiver::Transceiver;
pub use transport::{DropReason, Inbound, Message, Transport};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("Message of {len} bytes exceeds maximum of {max}")]
    MessageTooLong { len: usize, max: usize },

    #[error("Invalid destination address {0}")]
    InvalidAddress(Address),

    #[error("Delivery to {dest} failed: retry budget exhausted")]
    DeliveryFailed { dest: Address },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Maximum message length must be a non-zero multiple of {}, got {}", CHUNK_SIZE, .0)]
    UnalignedMessageLength(usize),

    #[error(
        "Maximum message length {} exceeds the sequence space limit of {}",
        .0,
        MAX_SEQUENCED_LEN
    )]
    MessageLengthTooLarge(usize),

    #[error("Slot pool must hold at least one slot")]
    EmptyPool,

    #[error("Frame timeout must be non-zero")]
    ZeroTimeout,

    #[error("Broadcast address cannot be a node's own address")]
    BroadcastLocalAddress,

    #[error("Poll interval must be non-zero")]
    ZeroPollInterval,

    #[error("Poll interval {poll:?} is longer than the frame timeout {timeout:?}")]
    PollIntervalTooLong { poll: Duration, timeout: Duration },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Largest message accepted by `send` or announced by a peer, in bytes.
    pub max_message_len: usize,
    /// Number of reassembly slots, i.e. senders that can be in flight at once.
    pub pool_size: usize,
    /// Retransmissions of one frame before the send is abandoned.
    pub retries: u32,
    /// Time to wait for an acknowledgment before retransmitting.
    pub frame_timeout: Duration,
    /// Granularity of the blocking send loop. Must be non-zero so that a
    /// virtual clock advances while `send` waits.
    pub poll_interval: Duration,
    /// When set, incomplete slots idle for longer than this may be evicted
    /// to make room for a new sender. Completed slots are never evicted.
    pub stale_slot_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_len: 40,
            pool_size: 6,
            retries: 5,
            frame_timeout: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(5),
            stale_slot_timeout: None,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_message_len == 0 || self.max_message_len % CHUNK_SIZE != 0 {
            return Err(ConfigError::UnalignedMessageLength(self.max_message_len));
        }
        if self.max_message_len > MAX_SEQUENCED_LEN {
            return Err(ConfigError::MessageLengthTooLarge(self.max_message_len));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::EmptyPool);
        }
        if self.frame_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.poll_interval > self.frame_timeout {
            return Err(ConfigError::PollIntervalTooLong {
                poll: self.poll_interval,
                timeout: self.frame_timeout,
            });
        }
        Ok(())
    }
}

/// Channel model for [`SimulatedMedium`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediumConfig {
    pub bandwidth_bps: u32,
    pub packet_loss: f32,
    pub latency: Duration,
    pub latency_jitter: Duration,
}

impl Default for MediumConfig {
    fn default() -> Self {
        Self {
            bandwidth_bps: 2400,
            packet_loss: 0.05,
            latency: Duration::from_millis(20),
            latency_jitter: Duration::from_millis(5),
        }
    }
}
