//! The byte link between the host and the co-processor.
//!
//! Everything above this module only needs [`ByteTransport`]: a single,
//! non-blocking poll that may return zero bytes, a write that may accept fewer
//! bytes than offered, and the co-processor's "data ready" line.

mod poller;
mod spi;

pub use poller::{PollError, Poller};
pub use spi::{SpiTransport, SpiTransportError};

pub trait ByteTransport {
    type Error: core::fmt::Debug;

    /// Makes one attempt to read whatever the co-processor has buffered, up
    /// to `buf.len()` bytes. `Ok(0)` means nothing is available yet, not end
    /// of stream.
    fn poll(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Offers `buf` to the co-processor. Returns how many bytes it accepted,
    /// which can be fewer than `buf.len()`.
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;

    /// State of the co-processor's "data ready" signal. `true` means more
    /// bytes may be pending.
    fn data_ready(&mut self) -> bool;
}

impl<T: ByteTransport + ?Sized> ByteTransport for &mut T {
    type Error = T::Error;

    fn poll(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        (**self).poll(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        (**self).write(buf)
    }

    fn data_ready(&mut self) -> bool {
        (**self).data_ready()
    }
}
