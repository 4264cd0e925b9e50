//! This library talks to RTL8720DN Wi-Fi co-processors running the ESP-AT
//! compatible firmware, as found on the Seeed Wio Terminal, over SPI.
//!
//! The co-processor is driven with text AT commands. Data that arrives on an
//! open socket is pushed back to us unprompted as `+IPD` frames, which the
//! [`ipd`](ipd/index.html) module reassembles into whole responses no matter
//! how the link splits them up.
//!
//! See the [`Rtl8720dn`](struct.Rtl8720dn.html) struct.
//!
//! The device is generic over a [`ByteTransport`](transport/trait.ByteTransport.html),
//! so the same driver runs over the SPI link
//! ([`SpiTransport`](transport/struct.SpiTransport.html)), a UART, or a
//! scripted fake in tests.
//!
//! It also has a `no_std` wrapper for parsing HTTP response heads, available
//! with the `http` feature and [`http`](http/index.html) module.
//!
//! If you use [`genio`](https://docs.rs/genio/)’s [`io`](std::io) replacements,
//! you can use the `genio-traits` feature to generate [`Read`](genio::Read) and
//! [`Write`](genio::Write) implementations for
//! [`ConnectedSocket`](struct.ConnectedSocket.html).

#![cfg_attr(not(test), no_std)]

mod commands;
pub mod config;
mod header;
pub mod ipd;
pub mod transport;
mod util;

#[cfg(feature = "http")]
pub mod http;

use core::ops::Range;

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::digital::v2::OutputPin;
use fugit::MillisDurationU32;

use config::{RX_BUFFER_SIZE, WINDOW_SIZE};
use ipd::{FrameParser, ParserObserver, ReceiveWindow, ResponseMode};
use transport::{ByteTransport, PollError, Poller};

pub use commands::socket::{ConnectedSocket, Protocol, LINK_ID};
pub use commands::wifi::WifiMode;
pub use config::Config;
pub use header::content_length;

/// Device interface for the RTL8720DN Wi-Fi co-processor.
///
/// **References:**
/// * [ESP-AT command set](https://docs.espressif.com/projects/esp-at/en/latest/)
/// * [Wio Terminal RTL8720DN firmware](https://github.com/Seeed-Studio/seeed-ambd-firmware)
///
/// To create this struct, you’ll need:
///
/// * A [`ByteTransport`](transport/trait.ByteTransport.html) for the link,
///   usually a [`SpiTransport`](transport/struct.SpiTransport.html)
/// * A [`DelayMs`](embedded_hal::blocking::delay::DelayMs) used to back off
///   while the co-processor has nothing for us
/// * (Optional) The CHIP_PU [`OutputPin`](embedded_hal::digital::v2::OutputPin)
///   to pass to [`reset`](#method.reset)
///
/// The struct owns a receive window for AT replies and `+IPD` frame lines and
/// a larger buffer for socket reads, a little over 6KiB in total, so you
/// probably want to keep it in a `static`.
pub struct Rtl8720dn<Transport, Delay> {
    transport: Transport,
    delay: Delay,
    config: Config,
    scratch: Scratch,
    rx: RxBuffer,
}

impl<T, D> Rtl8720dn<T, D>
where
    T: ByteTransport,
    D: DelayMs<u32>,
{
    pub fn new(transport: T, delay: D) -> Self {
        Self::with_config(transport, delay, Config::default())
    }

    pub fn with_config(transport: T, delay: D, config: Config) -> Self {
        Rtl8720dn {
            transport,
            delay,
            config,
            scratch: Scratch::new(),
            rx: RxBuffer::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Switches between HTTP responses and raw frame payloads for the
    /// following reads.
    pub fn set_response_mode(&mut self, mode: ResponseMode) {
        self.config.response_mode = mode;
    }

    /// Gives back the transport and delay.
    pub fn free(self) -> (T, D) {
        (self.transport, self.delay)
    }

    /// Reboots the co-processor by pulling CHIP_PU low for 20ms, then waits
    /// for its `ready` banner.
    pub fn reset<ChipPu>(&mut self, chip_pu: &mut ChipPu) -> Result<(), Error<T::Error>>
    where
        ChipPu: OutputPin,
    {
        chip_pu.set_low().map_err(|_| Error::ResetPinError)?;
        self.delay.delay_ms(20);
        chip_pu.set_high().map_err(|_| Error::ResetPinError)?;

        // Give the chip time to start back up.
        self.delay.delay_ms(500);

        self.scratch.pending = 0..0;
        self.scratch.stale = 0;
        self.rx.clear();

        let timeout = self.config.boot_timeout;
        self.wait_response(timeout).map(|_| ())
    }

    /// Reads one complete response from the link into `out` and returns its
    /// length.
    ///
    /// `timeout_ms` bounds how long we wait without any progress, not the
    /// whole call. In [`ResponseMode::Http`](ipd/enum.ResponseMode.html) the
    /// result is the HTTP header block followed by exactly `Content-Length`
    /// body bytes, reassembled from as many `+IPD` frames as it takes. In
    /// [`ResponseMode::Raw`](ipd/enum.ResponseMode.html) it is the payload of
    /// the next frame.
    ///
    /// Each call starts from scratch. After a timeout the partial response is
    /// gone; after a [`LinkOverflow`](ipd/enum.Error.html#variant.LinkOverflow)
    /// the link has been drained and the next call starts clean.
    pub fn receive_framed(
        &mut self,
        timeout_ms: u32,
        out: &mut [u8],
    ) -> Result<usize, ipd::Error<T::Error>> {
        self.receive_framed_observed(timeout_ms, out, ())
    }

    /// [`receive_framed`](#method.receive_framed) that reports every state
    /// change, read and frame to `observer`.
    pub fn receive_framed_observed<O>(
        &mut self,
        timeout_ms: u32,
        out: &mut [u8],
        observer: O,
    ) -> Result<usize, ipd::Error<T::Error>>
    where
        O: ParserObserver,
    {
        let mut poller = Poller::new(
            &mut self.transport,
            &mut self.delay,
            MillisDurationU32::from_ticks(timeout_ms),
            self.config.poll_interval,
        );

        self.scratch
            .parse_response(&mut poller, self.config.response_mode, out, observer)
    }
}

/// Window for AT replies and `+IPD` lexing.
struct Scratch {
    buf: [u8; WINDOW_SIZE],
    /// Bytes that arrived after the last AT reply or response. They are the
    /// start of whatever the co-processor sends next.
    pending: Range<usize>,
    /// Bytes of a finished response's last frame that had not arrived yet.
    /// They are dropped as they come in.
    stale: usize,
}

impl Scratch {
    fn new() -> Self {
        Scratch {
            buf: [0; WINDOW_SIZE],
            pending: 0..0,
            stale: 0,
        }
    }

    /// Moves the pending bytes to the front of the buffer and returns how
    /// many there are.
    fn take_pending(&mut self) -> usize {
        let Range { start, end } = core::mem::replace(&mut self.pending, 0..0);
        self.buf.copy_within(start..end, 0);
        self.discard_stale(end - start)
    }

    /// Drops stale bytes from the front of `buf[..len]` and returns how many
    /// are left. While anything is stale the buffer holds nothing else.
    fn discard_stale(&mut self, len: usize) -> usize {
        let count = core::cmp::min(self.stale, len);
        self.buf.copy_within(count..len, 0);
        self.stale -= count;
        len - count
    }

    fn parse_response<T, D, O>(
        &mut self,
        poller: &mut Poller<T, D>,
        mode: ResponseMode,
        out: &mut [u8],
        observer: O,
    ) -> Result<usize, ipd::Error<T::Error>>
    where
        T: ByteTransport,
        D: DelayMs<u32>,
        O: ParserObserver,
    {
        let pending = core::mem::replace(&mut self.pending, 0..0);
        let window = ReceiveWindow::with_pending(&mut self.buf, pending);

        let stale = core::mem::replace(&mut self.stale, 0);

        let mut parser = FrameParser::with_observer(window, mode, observer).skipping(stale);
        let len = parser.run(poller, out)?;

        // The next response may already have started in the same read.
        self.pending = parser.leftover();
        self.stale = parser.unread_tail();

        Ok(len)
    }
}

/// A response collected by a socket read and handed out piecemeal.
struct RxBuffer {
    buf: [u8; RX_BUFFER_SIZE],
    start: usize,
    end: usize,
    /// Set after a send, when the peer's reply has not been read yet.
    response_expected: bool,
}

impl RxBuffer {
    fn new() -> Self {
        RxBuffer {
            buf: [0; RX_BUFFER_SIZE],
            start: 0,
            end: 0,
            response_expected: false,
        }
    }

    fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
        self.response_expected = false;
    }

    fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Copies buffered bytes into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let count = core::cmp::min(buf.len(), self.end - self.start);
        buf[..count].copy_from_slice(&self.buf[self.start..self.start + count]);
        self.start += count;

        if self.is_empty() {
            self.start = 0;
            self.end = 0;
        }

        count
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Error<TransportError> {
    /// There was an I/O error writing to the CHIP_PU pin. Really won’t happen
    /// unless the pin is on a GPIO expander or something, but it’s a part of
    /// the [`v2::OutputPin`](embedded_hal::digital::v2::OutputPin) signature.
    ResetPinError,

    /// The co-processor did not finish its reply to a command in time.
    ResponseTimeout,
    /// The co-processor answered `ERROR` or did not know the command.
    ErrorResponse,
    /// The reply to a command did not fit in the receive window.
    ResponseTooLong,
    /// The reply did not contain what the command is supposed to return.
    /// Indicates a mismatch between this driver code and the firmware.
    UnexpectedResponse,
    /// A formatted command was longer than
    /// [`MAX_COMMAND_LEN`](config/constant.MAX_COMMAND_LEN.html).
    CommandTooLong,

    /// The payload went out but the co-processor never confirmed it with
    /// `SEND OK`.
    SendFailed,

    /// Reassembling `+IPD` frames failed. See
    /// [`ipd::Error`](ipd/enum.Error.html).
    Frame(ipd::ErrorKind),

    /// There was an error related to the transport itself.
    Transport(TransportError),
    /// Marker that a [`core::fmt::Error`](core::fmt::Error) occurred.
    /// Unfortunately, that error wraps any underlying error that might have
    /// been raised over the course of doing a write! to e.g. a
    /// [`ConnectedSocket`](struct.ConnectedSocket.html).
    FormatError,
}

impl<E> From<PollError<E>> for Error<E> {
    fn from(err: PollError<E>) -> Self {
        match err {
            PollError::Timeout => Error::ResponseTimeout,
            PollError::Transport(err) => Error::Transport(err),
        }
    }
}

impl<E> From<ipd::Error<E>> for Error<E> {
    fn from(err: ipd::Error<E>) -> Self {
        match err {
            ipd::Error::Transport(err) => Error::Transport(err),
            err => Error::Frame(err.kind()),
        }
    }
}

impl<E> core::convert::From<core::fmt::Error> for Error<E> {
    fn from(_: core::fmt::Error) -> Error<E> {
        // All FormatErrors are the same (they indicate swallowing an I/O error)
        // so we don’t need to include the input argument in this output.
        Error::FormatError
    }
}
