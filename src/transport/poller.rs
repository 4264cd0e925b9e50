use core::cmp::max;

use embedded_hal::blocking::delay::DelayMs;
use fugit::MillisDurationU32;

use super::ByteTransport;

#[derive(Debug, PartialEq, Eq)]
pub enum PollError<E> {
    /// The retry budget ran out without the transport making progress.
    Timeout,
    Transport(E),
}

/// Retry and backoff around [`ByteTransport::poll`](trait.ByteTransport.html).
///
/// A zero-byte poll costs one retry and one `interval` sleep. The budget is
/// `timeout / interval` retries and starts over every time the caller reports
/// progress with [`progress`](#method.progress), so `timeout` bounds how long
/// we wait for *something* to happen, not the whole transfer.
///
/// The sleeps go through an injected [`DelayMs`] so that tests can run on a
/// virtual clock.
pub struct Poller<'a, T, D> {
    transport: &'a mut T,
    delay: &'a mut D,
    interval_ms: u32,
    budget: u32,
    retries_left: u32,
}

impl<'a, T, D> Poller<'a, T, D>
where
    T: ByteTransport,
    D: DelayMs<u32>,
{
    pub fn new(
        transport: &'a mut T,
        delay: &'a mut D,
        timeout: MillisDurationU32,
        interval: MillisDurationU32,
    ) -> Self {
        let interval_ms = max(interval.to_millis(), 1);
        let budget = max(timeout.to_millis() / interval_ms, 1);

        Poller {
            transport,
            delay,
            interval_ms,
            budget,
            retries_left: budget,
        }
    }

    /// Restarts the retry budget.
    pub fn progress(&mut self) {
        self.retries_left = self.budget;
    }

    /// Polls until the transport returns at least one byte.
    pub fn fill(&mut self, buf: &mut [u8]) -> Result<usize, PollError<T::Error>> {
        loop {
            let read = self.transport.poll(buf).map_err(PollError::Transport)?;

            if read > 0 {
                self.progress();
                return Ok(core::cmp::min(read, buf.len()));
            }

            self.backoff()?;
        }
    }

    /// Writes all of `bytes`, retrying when the co-processor accepts nothing.
    pub fn write_all(&mut self, mut bytes: &[u8]) -> Result<(), PollError<T::Error>> {
        while !bytes.is_empty() {
            let written = self.transport.write(bytes).map_err(PollError::Transport)?;

            if written == 0 {
                self.backoff()?;
            } else {
                self.progress();
                bytes = &bytes[core::cmp::min(written, bytes.len())..];
            }
        }

        Ok(())
    }

    /// Reads and throws away whatever the co-processor still has queued, for
    /// as long as the data-ready line stays up. Each poll costs one retry, so
    /// a stuck line cannot keep us here past the budget.
    ///
    /// Returns the number of bytes discarded.
    pub fn drain(&mut self, scratch: &mut [u8]) -> Result<usize, PollError<T::Error>> {
        let mut discarded = 0;

        while self.retries_left > 0 && self.transport.data_ready() {
            self.retries_left -= 1;

            match self.transport.poll(scratch).map_err(PollError::Transport)? {
                0 => self.delay.delay_ms(self.interval_ms),
                read => discarded += read,
            }
        }

        Ok(discarded)
    }

    fn backoff(&mut self) -> Result<(), PollError<T::Error>> {
        if self.retries_left == 0 {
            return Err(PollError::Timeout);
        }

        self.retries_left -= 1;
        self.delay.delay_ms(self.interval_ms);

        Ok(())
    }
}
