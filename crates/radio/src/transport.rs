//! Transport engine: blocking send, polled receive and inbound dispatch

use std::time::Instant;

use log::{debug, info, trace, warn};
use ooklink_core::{Address, Frame, FrameKind, FRAME_BITS};

use crate::arq::{OutboundTransfer, Progress};
use crate::clock::{Clock, SystemClock};
use crate::filter::{AddressFilter, ExactMatch};
use crate::slots::{SlotId, SlotPool};
use crate::transceiver::Transceiver;
use crate::{ConfigError, SendError, TransportConfig};

/// Why an inbound frame was discarded. None of these are acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The integrity code did not match.
    Integrity,
    /// The address filter rejected the frame.
    Filtered,
    /// Wrong frame kind for the source's current state.
    UnexpectedKind,
    /// A handshake announced more than the configured maximum.
    LengthTooLarge,
    /// No free slot for a new source.
    PoolExhausted,
    /// Data for a message that is already complete.
    SlotFull,
}

/// Outcome of dispatching one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// The frame completed the message held in this slot.
    Completed(SlotId),
    /// Handled (accepted or re-acknowledged); no message completed.
    Pending,
    Dropped(DropReason),
}

/// A completed message still held in its reassembly slot.
///
/// The slot stays occupied until [`Message::free`] is called; dropping the
/// handle without freeing it leaves the message to be returned again by the
/// next [`Transport::receive`].
#[derive(Debug)]
pub struct Message<'a> {
    pool: &'a mut SlotPool,
    id: SlotId,
}

impl Message<'_> {
    pub fn source(&self) -> Address {
        self.pool.get(self.id).source()
    }

    pub fn len(&self) -> usize {
        self.pool.get(self.id).declared_len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contents(&self) -> &[u8] {
        self.pool.get(self.id).contents()
    }

    /// Releases the slot for the next sender.
    pub fn free(self) {
        self.pool.free(self.id);
    }
}

/// One node's endpoint on the shared medium.
///
/// All state lives here and is touched from a single thread of control:
/// the blocking [`Transport::send`] loop and the non-blocking
/// [`Transport::receive`] poll both funnel inbound frames through
/// [`Transport::process_incoming_frame`].
pub struct Transport<T, C = SystemClock> {
    address: Address,
    config: TransportConfig,
    transceiver: T,
    clock: C,
    slots: SlotPool,
    filter: Box<dyn AddressFilter + Send>,
}

impl<T: Transceiver, C: Clock> Transport<T, C> {
    pub fn new(
        address: Address,
        config: TransportConfig,
        transceiver: T,
        clock: C,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if address.is_broadcast() {
            return Err(ConfigError::BroadcastLocalAddress);
        }

        let slots = SlotPool::new(config.pool_size, config.max_message_len);
        info!(
            "Transport {} ready: {} slots, {} byte messages, {} retries at {:?}",
            address, config.pool_size, config.max_message_len, config.retries, config.frame_timeout
        );

        Ok(Self {
            address,
            config,
            transceiver,
            clock,
            slots,
            filter: Box::new(ExactMatch),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn slots(&self) -> &SlotPool {
        &self.slots
    }

    pub fn transceiver(&self) -> &T {
        &self.transceiver
    }

    pub fn transceiver_mut(&mut self) -> &mut T {
        &mut self.transceiver
    }

    /// Replaces the predicate deciding which frames are for this node.
    pub fn set_address_filter(&mut self, filter: impl AddressFilter + Send + 'static) {
        self.filter = Box::new(filter);
    }

    /// Number of completed messages waiting to be read.
    pub fn pending_messages(&self) -> usize {
        self.slots.completed_count()
    }

    /// Delivers `payload` to `dest`, blocking until every frame has been
    /// acknowledged or a frame's retry budget is exhausted.
    ///
    /// Frames from other senders heard while waiting are processed as if
    /// they had arrived through [`Transport::receive`].
    pub fn send(&mut self, dest: Address, payload: &[u8]) -> Result<(), SendError> {
        if payload.len() > self.config.max_message_len {
            return Err(SendError::MessageTooLong {
                len: payload.len(),
                max: self.config.max_message_len,
            });
        }
        if dest.is_broadcast() || dest == self.address {
            return Err(SendError::InvalidAddress(dest));
        }

        let mut transfer = OutboundTransfer::new(
            self.address,
            dest,
            payload,
            self.config.retries,
            self.config.frame_timeout,
        );
        debug!(
            "Sending {} bytes from {} to {} in {} data frames",
            payload.len(),
            self.address,
            dest,
            transfer.data_frames()
        );

        let handshake = transfer.start(self.clock.now());
        self.transmit(&handshake);

        loop {
            if let Some(Ok(frame)) = self.read_frame() {
                let progress = if transfer.is_expected_ack(&frame) {
                    transfer.on_ack(&frame, self.clock.now())
                } else {
                    self.process_incoming_frame(&frame);
                    Progress::Waiting
                };
                if let Some(outcome) = self.advance(progress, dest) {
                    return outcome;
                }
            }

            let progress = transfer.on_tick(self.clock.now());
            if let Some(outcome) = self.advance(progress, dest) {
                return outcome;
            }

            self.clock.sleep(self.config.poll_interval);
        }
    }

    /// Returns a completed message if one is waiting, otherwise processes
    /// at most one frame from the transceiver. Never blocks.
    pub fn receive(&mut self) -> Option<Message<'_>> {
        if let Some(id) = self.slots.find_completed() {
            return Some(Message {
                pool: &mut self.slots,
                id,
            });
        }

        match self.poll()? {
            Inbound::Completed(id) => Some(Message {
                pool: &mut self.slots,
                id,
            }),
            _ => None,
        }
    }

    /// Reads, verifies, filters and dispatches at most one available frame.
    /// `None` if the transceiver had nothing pending.
    pub fn poll(&mut self) -> Option<Inbound> {
        Some(match self.read_frame()? {
            Ok(frame) => self.process_incoming_frame(&frame),
            Err(reason) => Inbound::Dropped(reason),
        })
    }

    /// Applies one verified, admitted frame to the reassembly slots,
    /// acknowledging it when the protocol calls for it.
    pub fn process_incoming_frame(&mut self, frame: &Frame) -> Inbound {
        let now = self.clock.now();
        let src = frame.src();

        let Some(id) = self.slots.find_by_source(src) else {
            if frame.kind() != FrameKind::Handshake {
                debug!("Dropping {:?} from {} with no open message", frame.kind(), src);
                return Inbound::Dropped(DropReason::UnexpectedKind);
            }
            return self.open_slot(frame, now);
        };

        match frame.kind() {
            // A completed but unread message from this source is discarded too.
            FrameKind::Handshake => {
                debug!("Handshake from {} restarts its message", src);
                self.slots.free(id);
                self.open_slot(frame, now)
            }
            FrameKind::Data => self.accept_data(id, frame, now),
            kind => {
                debug!("Dropping {:?} from {} during reassembly", kind, src);
                Inbound::Dropped(DropReason::UnexpectedKind)
            }
        }
    }

    fn open_slot(&mut self, frame: &Frame, now: Instant) -> Inbound {
        let src = frame.src();
        let len = frame.declared_len();
        if len as usize > self.config.max_message_len {
            debug!(
                "Dropping handshake from {}: {} bytes exceeds maximum {}",
                src, len, self.config.max_message_len
            );
            return Inbound::Dropped(DropReason::LengthTooLarge);
        }

        let Some(id) = self.slots.find_free().or_else(|| self.evict_stale(now)) else {
            debug!("Dropping handshake from {}: no free slot", src);
            return Inbound::Dropped(DropReason::PoolExhausted);
        };

        self.slots.get_mut(id).init(src, len, now);
        trace!("Slot {} opened for {} ({} bytes)", id.index(), src, len);
        self.transmit(&Frame::ack(self.address, src, 0));
        Inbound::Pending
    }

    fn accept_data(&mut self, id: SlotId, frame: &Frame, now: Instant) -> Inbound {
        let src = frame.src();
        let expected = self.slots.get(id).expected_seq();

        // Covers redelivery after a lost ack: the duplicate carries
        // expected - 1 and gets that ack again without being appended.
        if frame.seq() != expected {
            let last = expected - 1;
            debug!(
                "Data seq {} from {} out of order (expected {}), re-acking {}",
                frame.seq(),
                src,
                expected,
                last
            );
            self.transmit(&Frame::ack(self.address, src, last));
            return Inbound::Pending;
        }

        let slot = self.slots.get_mut(id);
        if !slot.append(frame.payload(), now) {
            debug!("Dropping data seq {} from {}: message already complete", frame.seq(), src);
            return Inbound::Dropped(DropReason::SlotFull);
        }
        let completed = slot.is_completed();
        let len = slot.declared_len();

        self.transmit(&Frame::ack(self.address, src, frame.seq()));
        if completed {
            info!("Received {} byte message from {}", len, src);
            Inbound::Completed(id)
        } else {
            Inbound::Pending
        }
    }

    fn evict_stale(&mut self, now: Instant) -> Option<SlotId> {
        let timeout = self.config.stale_slot_timeout?;
        let id = self.slots.find_stale(now, timeout)?;
        warn!(
            "Evicting stale message from {} after {:?} of inactivity",
            self.slots.get(id).source(),
            timeout
        );
        self.slots.free(id);
        Some(id)
    }

    /// `None` when nothing is pending; otherwise the verified frame or the
    /// reason it was discarded.
    fn read_frame(&mut self) -> Option<Result<Frame, DropReason>> {
        if !self.transceiver.frame_available() {
            return None;
        }
        let raw = self.transceiver.take_frame()?;

        Some(match Frame::decode(raw) {
            Err(e) => {
                trace!("Dropping frame {:#018x}: {}", raw, e);
                Err(DropReason::Integrity)
            }
            Ok(frame) if !self.filter.accepts(self.address, &frame) => {
                trace!(
                    "Ignoring {:?} from {} to {}",
                    frame.kind(),
                    frame.src(),
                    frame.dest()
                );
                Err(DropReason::Filtered)
            }
            Ok(frame) => Ok(frame),
        })
    }

    fn transmit(&mut self, frame: &Frame) {
        trace!(
            "{} -> {}: {:?} seq {}",
            frame.src(),
            frame.dest(),
            frame.kind(),
            frame.seq()
        );
        self.transceiver.transmit(frame.encode(), FRAME_BITS);
    }

    fn advance(&mut self, progress: Progress, dest: Address) -> Option<Result<(), SendError>> {
        match progress {
            Progress::Waiting => None,
            Progress::Transmit(frame) => {
                self.transmit(&frame);
                None
            }
            Progress::Delivered => Some(Ok(())),
            Progress::Failed => Some(Err(SendError::DeliveryFailed { dest })),
        }
    }
}
