use std::fmt;

use serde::{Deserialize, Serialize};

/// Width of one on-air frame in bits.
pub const FRAME_BITS: u8 = 64;

/// Bytes of message payload carried by one data frame.
pub const CHUNK_SIZE: usize = 4;

/// Largest value the 6-bit sequence field can hold.
pub const MAX_SEQ: u8 = 0x3F;

/// Upper bound on a message length imposed by the sequence space: the
/// handshake takes seq 0, so at most `MAX_SEQ` data frames follow it.
pub const MAX_SEQUENCED_LEN: usize = MAX_SEQ as usize * CHUNK_SIZE;

/// Node address on the shared medium.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub u8);

impl Address {
    pub const BROADCAST: Address = Address(0xFF);

    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_broadcast() {
            write!(f, "*")
        } else {
            write!(f, "{}", self.0)
        }
    }
}
