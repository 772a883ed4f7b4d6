//! Boundary to the radio hardware (or anything pretending to be one)

/// A half-duplex radio that moves one raw frame at a time.
///
/// Every value returned by [`Transceiver::take_frame`] is untrusted; the
/// transport verifies it before looking at any field.
pub trait Transceiver {
    fn transmit(&mut self, raw: u64, width: u8);

    fn frame_available(&mut self) -> bool;

    /// Takes the pending frame, clearing availability. `None` if nothing
    /// was pending.
    fn take_frame(&mut self) -> Option<u64>;
}

impl<T: Transceiver + ?Sized> Transceiver for Box<T> {
    fn transmit(&mut self, raw: u64, width: u8) {
        (**self).transmit(raw, width)
    }

    fn frame_available(&mut self) -> bool {
        (**self).frame_available()
    }

    fn take_frame(&mut self) -> Option<u64> {
        (**self).take_frame()
    }
}
