//! Outbound stop-and-wait state machine
//!
//! One message is delivered as a handshake (seq 0) followed by one data
//! frame per 4-byte chunk (seq 1, 2, ...). Exactly one frame is outstanding
//! at a time. The machine never touches a radio or a clock itself: callers
//! feed it acknowledgments and the current time, and transmit whatever frame
//! it hands back. [`crate::Transport::send`] is the blocking driver.

use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use ooklink_core::{Address, Frame, FrameKind, CHUNK_SIZE};

/// What the driver should do after feeding the machine an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Nothing to transmit yet.
    Waiting,
    /// Put this frame on the air.
    Transmit(Frame),
    /// Every frame has been acknowledged.
    Delivered,
    /// The retry budget for the outstanding frame ran out.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    AwaitingAck {
        seq: u8,
        deadline: Instant,
        retries_left: u32,
    },
    Delivered,
    Failed,
}

#[derive(Debug)]
pub struct OutboundTransfer<'a> {
    src: Address,
    dest: Address,
    payload: &'a [u8],
    retries: u32,
    frame_timeout: Duration,
    phase: Phase,
}

impl<'a> OutboundTransfer<'a> {
    /// `payload` must fit the sequence space; the transport checks this
    /// against its configured maximum before building a transfer.
    pub fn new(
        src: Address,
        dest: Address,
        payload: &'a [u8],
        retries: u32,
        frame_timeout: Duration,
    ) -> Self {
        Self {
            src,
            dest,
            payload,
            retries,
            frame_timeout,
            phase: Phase::Idle,
        }
    }

    /// Number of data frames following the handshake.
    pub fn data_frames(&self) -> usize {
        self.payload.len().div_ceil(CHUNK_SIZE)
    }

    /// Sequence number currently waiting for an acknowledgment.
    pub fn awaiting(&self) -> Option<u8> {
        match self.phase {
            Phase::AwaitingAck { seq, .. } => Some(seq),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Delivered | Phase::Failed)
    }

    /// Returns the handshake and starts its timer.
    pub fn start(&mut self, now: Instant) -> Frame {
        self.arm(0, now);
        self.frame_for(0)
    }

    /// True if `frame` acknowledges the outstanding sequence number.
    pub fn is_expected_ack(&self, frame: &Frame) -> bool {
        frame.kind() == FrameKind::Ack
            && frame.src() == self.dest
            && frame.dest() == self.src
            && self.awaiting() == Some(frame.seq())
    }

    /// Feeds an acknowledgment. Anything that is not the expected ack,
    /// including stale or duplicate ones, is ignored.
    pub fn on_ack(&mut self, frame: &Frame, now: Instant) -> Progress {
        if !self.is_expected_ack(frame) {
            trace!(
                "Ignoring ack {} from {} while awaiting {:?}",
                frame.seq(),
                frame.src(),
                self.awaiting()
            );
            return Progress::Waiting;
        }

        let next = frame.seq() + 1;
        if next as usize > self.data_frames() {
            debug!("All {} frames to {} acknowledged", next, self.dest);
            self.phase = Phase::Delivered;
            return Progress::Delivered;
        }

        self.arm(next, now);
        Progress::Transmit(self.frame_for(next))
    }

    /// Advances time. Retransmits the outstanding frame when its deadline
    /// has passed and budget remains, fails when it does not.
    pub fn on_tick(&mut self, now: Instant) -> Progress {
        let Phase::AwaitingAck {
            seq,
            deadline,
            retries_left,
        } = self.phase
        else {
            return match self.phase {
                Phase::Delivered => Progress::Delivered,
                Phase::Failed => Progress::Failed,
                _ => Progress::Waiting,
            };
        };

        if now < deadline {
            return Progress::Waiting;
        }

        if retries_left == 0 {
            warn!(
                "No ack for seq {} from {} after {} retries, giving up",
                seq, self.dest, self.retries
            );
            self.phase = Phase::Failed;
            return Progress::Failed;
        }

        debug!(
            "Ack timeout for seq {} from {}, retransmitting ({} retries left)",
            seq,
            self.dest,
            retries_left - 1
        );
        self.phase = Phase::AwaitingAck {
            seq,
            deadline: now + self.frame_timeout,
            retries_left: retries_left - 1,
        };
        Progress::Transmit(self.frame_for(seq))
    }

    fn arm(&mut self, seq: u8, now: Instant) {
        self.phase = Phase::AwaitingAck {
            seq,
            deadline: now + self.frame_timeout,
            retries_left: self.retries,
        };
    }

    fn frame_for(&self, seq: u8) -> Frame {
        if seq == 0 {
            return Frame::handshake(self.src, self.dest, self.payload.len() as u32);
        }

        let start = (seq as usize - 1) * CHUNK_SIZE;
        let end = (start + CHUNK_SIZE).min(self.payload.len());
        let mut chunk = [0u8; CHUNK_SIZE];
        chunk[..end - start].copy_from_slice(&self.payload[start..end]);
        Frame::data(self.src, self.dest, seq, chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Address = Address(1);
    const B: Address = Address(2);
    const TIMEOUT: Duration = Duration::from_millis(100);

    fn expect_transmit(progress: Progress) -> Frame {
        match progress {
            Progress::Transmit(frame) => frame,
            other => panic!("expected a transmission, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_sequence_for_hello() {
        let now = Instant::now();
        let mut transfer = OutboundTransfer::new(A, B, b"HELLO!", 3, TIMEOUT);
        assert_eq!(transfer.data_frames(), 2);

        let handshake = transfer.start(now);
        assert_eq!(handshake, Frame::handshake(A, B, 6));

        let first = expect_transmit(transfer.on_ack(&Frame::ack(B, A, 0), now));
        assert_eq!(first, Frame::data(A, B, 1, *b"HELL"));

        let second = expect_transmit(transfer.on_ack(&Frame::ack(B, A, 1), now));
        assert_eq!(second, Frame::data(A, B, 2, *b"O!\0\0"));

        assert_eq!(transfer.on_ack(&Frame::ack(B, A, 2), now), Progress::Delivered);
        assert!(transfer.is_finished());
    }

    #[test]
    fn test_stale_and_foreign_acks_are_ignored() {
        let now = Instant::now();
        let mut transfer = OutboundTransfer::new(A, B, b"HELLO!", 3, TIMEOUT);
        transfer.start(now);
        transfer.on_ack(&Frame::ack(B, A, 0), now);
        assert_eq!(transfer.awaiting(), Some(1));

        // duplicate of an already-consumed ack
        assert_eq!(transfer.on_ack(&Frame::ack(B, A, 0), now), Progress::Waiting);
        // right seq, wrong peer
        assert_eq!(transfer.on_ack(&Frame::ack(Address(3), A, 1), now), Progress::Waiting);
        // right seq, addressed to someone else
        assert_eq!(transfer.on_ack(&Frame::ack(B, Address(3), 1), now), Progress::Waiting);
        assert_eq!(transfer.awaiting(), Some(1));
    }

    #[test]
    fn test_retransmits_same_frame_then_fails() {
        let start = Instant::now();
        let mut transfer = OutboundTransfer::new(A, B, b"abcd", 2, TIMEOUT);
        let handshake = transfer.start(start);

        assert_eq!(transfer.on_tick(start + TIMEOUT / 2), Progress::Waiting);

        let retry1 = expect_transmit(transfer.on_tick(start + TIMEOUT));
        assert_eq!(retry1, handshake);
        assert_eq!(transfer.on_tick(start + TIMEOUT + TIMEOUT / 2), Progress::Waiting);

        let retry2 = expect_transmit(transfer.on_tick(start + TIMEOUT * 2));
        assert_eq!(retry2, handshake);

        assert_eq!(transfer.on_tick(start + TIMEOUT * 3), Progress::Failed);
        assert!(transfer.is_finished());
        assert_eq!(transfer.awaiting(), None);
    }

    #[test]
    fn test_retry_budget_resets_per_frame() {
        let start = Instant::now();
        let mut transfer = OutboundTransfer::new(A, B, b"abcdefgh", 1, TIMEOUT);
        transfer.start(start);
        expect_transmit(transfer.on_tick(start + TIMEOUT));

        let t = start + TIMEOUT + Duration::from_millis(10);
        expect_transmit(transfer.on_ack(&Frame::ack(B, A, 0), t));
        let retry = expect_transmit(transfer.on_tick(t + TIMEOUT));
        assert_eq!(retry.seq(), 1);
        assert_eq!(transfer.on_tick(t + TIMEOUT * 2), Progress::Failed);
    }

    #[test]
    fn test_empty_payload_is_handshake_only() {
        let now = Instant::now();
        let mut transfer = OutboundTransfer::new(A, B, b"", 0, TIMEOUT);
        assert_eq!(transfer.start(now).declared_len(), 0);
        assert_eq!(transfer.on_ack(&Frame::ack(B, A, 0), now), Progress::Delivered);
    }
}
