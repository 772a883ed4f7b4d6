//! 64-bit frame layout and codec
//!
//! ```text
//!  byte:   0        1        2              3        4..8
//!        +--------+--------+--------------+--------+-----------------+
//!        |  src   |  dest  | kind | seq   | check  |     payload     |
//!        +--------+--------+--------------+--------+-----------------+
//!                            2 bits 6 bits
//! ```
//!
//! The wire value is the big-endian reading of those eight bytes. Handshake
//! payloads carry the declared message length in network byte order; data
//! payloads carry four message bytes exactly as they appear in the message.

use serde::{Deserialize, Serialize};

use crate::crc::crc8;
use crate::types::{Address, MAX_SEQ};
use crate::FrameError;

const CHECK_BYTE: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameKind {
    Handshake = 0b00,
    Data = 0b01,
    Ack = 0b10,
    Reserved = 0b11,
}

impl FrameKind {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => FrameKind::Handshake,
            0b01 => FrameKind::Data,
            0b10 => FrameKind::Ack,
            _ => FrameKind::Reserved,
        }
    }
}

/// A decoded frame. The integrity code is not stored: it is derived on
/// [`Frame::encode`] and verified on [`Frame::decode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame {
    src: Address,
    dest: Address,
    kind: FrameKind,
    seq: u8,
    payload: [u8; 4],
}

impl Frame {
    pub fn new(
        src: Address,
        dest: Address,
        kind: FrameKind,
        seq: u8,
        payload: [u8; 4],
    ) -> Result<Self, FrameError> {
        if seq > MAX_SEQ {
            return Err(FrameError::SequenceOutOfRange(seq));
        }
        Ok(Self { src, dest, kind, seq, payload })
    }

    /// Opens a message of `len` bytes. Always sequence 0.
    pub fn handshake(src: Address, dest: Address, len: u32) -> Self {
        Self {
            src,
            dest,
            kind: FrameKind::Handshake,
            seq: 0,
            payload: len.to_be_bytes(),
        }
    }

    /// Carries the chunk at position `seq`. Only the low six bits of `seq`
    /// are kept; use [`Frame::new`] to have a larger value rejected.
    pub fn data(src: Address, dest: Address, seq: u8, chunk: [u8; 4]) -> Self {
        Self {
            src,
            dest,
            kind: FrameKind::Data,
            seq: seq & MAX_SEQ,
            payload: chunk,
        }
    }

    /// Acknowledges `seq`, masked to six bits like [`Frame::data`].
    pub fn ack(src: Address, dest: Address, seq: u8) -> Self {
        Self {
            src,
            dest,
            kind: FrameKind::Ack,
            seq: seq & MAX_SEQ,
            payload: [0; 4],
        }
    }

    pub fn src(&self) -> Address {
        self.src
    }

    pub fn dest(&self) -> Address {
        self.dest
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn seq(&self) -> u8 {
        self.seq
    }

    pub fn payload(&self) -> [u8; 4] {
        self.payload
    }

    /// Message length announced by a handshake.
    pub fn declared_len(&self) -> u32 {
        u32::from_be_bytes(self.payload)
    }

    fn to_bytes(self, check: u8) -> [u8; 8] {
        let [p0, p1, p2, p3] = self.payload;
        [
            self.src.0,
            self.dest.0,
            (self.kind as u8) << 6 | self.seq,
            check,
            p0,
            p1,
            p2,
            p3,
        ]
    }

    pub fn encode(&self) -> u64 {
        let check = crc8(&self.to_bytes(0));
        u64::from_be_bytes(self.to_bytes(check))
    }

    /// Decodes an untrusted wire value. On integrity failure nothing from
    /// the value is returned.
    pub fn decode(raw: u64) -> Result<Self, FrameError> {
        let mut bytes = raw.to_be_bytes();
        let carried = bytes[CHECK_BYTE];
        bytes[CHECK_BYTE] = 0;
        let computed = crc8(&bytes);
        if carried != computed {
            return Err(FrameError::Integrity { carried, computed });
        }

        Ok(Self {
            src: Address(bytes[0]),
            dest: Address(bytes[1]),
            kind: FrameKind::from_bits(bytes[2] >> 6),
            seq: bytes[2] & MAX_SEQ,
            payload: [bytes[4], bytes[5], bytes[6], bytes[7]],
        })
    }
}
