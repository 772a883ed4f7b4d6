//! wire-level primitives for ooklink: addresses, frames and the frame codec

use thiserror::Error;

pub mod crc;
pub mod frame;
pub mod types;

pub use crc::crc8;
pub use frame::{Frame, FrameKind};
pub use types::{Address, CHUNK_SIZE, FRAME_BITS, MAX_SEQ, MAX_SEQUENCED_LEN};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Integrity check failed (carried {carried:#04x}, computed {computed:#04x})")]
    Integrity { carried: u8, computed: u8 },

    #[error("Sequence number {0} does not fit in 6 bits")]
    SequenceOutOfRange(u8),
}
