//! Decides which overheard frames a node processes

use ooklink_core::{Address, Frame};

/// Predicate applied to every verified frame before the transport acts on
/// it, both while waiting for an acknowledgment and on the receive path.
pub trait AddressFilter {
    fn accepts(&self, local: Address, frame: &Frame) -> bool;
}

impl<F> AddressFilter for F
where
    F: Fn(Address, &Frame) -> bool,
{
    fn accepts(&self, local: Address, frame: &Frame) -> bool {
        self(local, frame)
    }
}

/// Only frames addressed to this node. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatch;

impl AddressFilter for ExactMatch {
    fn accepts(&self, local: Address, frame: &Frame) -> bool {
        frame.dest() == local
    }
}

/// Frames addressed to this node or to [`Address::BROADCAST`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptBroadcast;

impl AddressFilter for AcceptBroadcast {
    fn accepts(&self, local: Address, frame: &Frame) -> bool {
        frame.dest() == local || frame.dest().is_broadcast()
    }
}

/// Everything on the air.
#[derive(Debug, Clone, Copy, Default)]
pub struct Promiscuous;

impl AddressFilter for Promiscuous {
    fn accepts(&self, _local: Address, _frame: &Frame) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: Address = Address(2);

    #[test]
    fn test_builtin_filters() {
        let mine = Frame::ack(Address(1), LOCAL, 0);
        let broadcast = Frame::ack(Address(1), Address::BROADCAST, 0);
        let other = Frame::ack(Address(1), Address(3), 0);

        assert!(ExactMatch.accepts(LOCAL, &mine));
        assert!(!ExactMatch.accepts(LOCAL, &broadcast));
        assert!(!ExactMatch.accepts(LOCAL, &other));

        assert!(AcceptBroadcast.accepts(LOCAL, &mine));
        assert!(AcceptBroadcast.accepts(LOCAL, &broadcast));
        assert!(!AcceptBroadcast.accepts(LOCAL, &other));

        assert!(Promiscuous.accepts(LOCAL, &other));
    }

    #[test]
    fn test_closure_filter() {
        let from_one = |_local: Address, frame: &Frame| frame.src() == Address(1);
        assert!(from_one.accepts(LOCAL, &Frame::ack(Address(1), Address(9), 0)));
        assert!(!from_one.accepts(LOCAL, &Frame::ack(Address(4), LOCAL, 0)));
    }
}
