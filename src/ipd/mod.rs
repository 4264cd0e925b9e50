//! Reassembly of socket data that the co-processor forwards as `+IPD` frames.
//!
//! After a request is sent, the firmware pushes the reply as one or more
//! frames:
//!
//! ```text
//! \r\n+IPD,<channel>,<length>,<ip>,<port>:<length raw bytes>
//! ```
//!
//! The transport hands these to us in chunks of any size, so a frame line,
//! an HTTP header or a body can be split at any byte. [`FrameParser`] is a
//! resumable state machine that buffers just enough in a
//! [`ReceiveWindow`] to lex frame lines and the HTTP header, and streams
//! everything else straight into the caller's buffer.
//!
//! In [`ResponseMode::Http`] the first frame starts with an HTTP header whose
//! `Content-Length` says how many body bytes to collect across continuation
//! frames. In [`ResponseMode::Raw`] one call returns the payload of one frame.

mod frame;
mod parser;
mod window;

pub use frame::{FrameDescriptor, Lexed, MalformedFrame, FRAME_PREFIX, MAX_FRAME_HEADER_LEN};
pub use parser::{FrameParser, ResponseAccumulator};
pub use window::ReceiveWindow;

use crate::transport::PollError;

/// Where the parser is in a response. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    AwaitingFrameHeader,
    ParsingFrameHeaderFields,
    /// Only entered for the first frame of an HTTP response.
    AwaitingHttpHeaderEnd,
    StreamingBody,
    /// The current frame is used up but the response is not.
    AwaitingContinuationHeader,
    Done,
    Failed(ErrorKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    LinkOverflow,
    MalformedFrame,
    OutputFull,
    TransportError,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Error<TransportError> {
    /// Nothing arrived within the timeout since the parser last made
    /// progress. The partial response is lost; the link is usually reset
    /// after this.
    Timeout,
    /// Something other than a frame line showed up where one was expected.
    /// The firmware does this when its transmit buffer overflows. Whatever
    /// was still queued has been read and thrown away.
    LinkOverflow,
    /// A frame line or HTTP header could not be parsed, or did not fit in the
    /// receive window.
    MalformedFrame,
    /// The caller's buffer filled up before the response was complete.
    OutputFull,
    /// The transport itself failed.
    Transport(TransportError),
}

impl<E> Error<E> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Timeout => ErrorKind::Timeout,
            Error::LinkOverflow => ErrorKind::LinkOverflow,
            Error::MalformedFrame => ErrorKind::MalformedFrame,
            Error::OutputFull => ErrorKind::OutputFull,
            Error::Transport(_) => ErrorKind::TransportError,
        }
    }
}

impl<E> From<PollError<E>> for Error<E> {
    fn from(err: PollError<E>) -> Self {
        match err {
            PollError::Timeout => Error::Timeout,
            PollError::Transport(err) => Error::Transport(err),
        }
    }
}

impl<E> From<MalformedFrame> for Error<E> {
    fn from(_: MalformedFrame) -> Self {
        Error::MalformedFrame
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// The first frame carries an HTTP header. Frames are collected until
    /// its `Content-Length` is satisfied.
    Http,
    /// No header. Each call returns the payload of a single frame. Used for
    /// MQTT, NTP and other binary protocols.
    Raw,
}

impl Default for ResponseMode {
    fn default() -> Self {
        ResponseMode::Http
    }
}

/// Hooks for watching the parser work, e.g. to trace it on a spare UART or
/// to record the state history in tests. Every method defaults to a no-op,
/// and `()` is the observer that ignores everything.
pub trait ParserObserver {
    fn on_transition(&mut self, _from: ParserState, _to: ParserState) {}

    /// Called with every chunk the transport returns.
    fn on_read(&mut self, _bytes: &[u8]) {}

    fn on_frame(&mut self, _frame: &FrameDescriptor) {}
}

impl ParserObserver for () {}

impl<O: ParserObserver + ?Sized> ParserObserver for &mut O {
    fn on_transition(&mut self, from: ParserState, to: ParserState) {
        (**self).on_transition(from, to)
    }

    fn on_read(&mut self, bytes: &[u8]) {
        (**self).on_read(bytes)
    }

    fn on_frame(&mut self, frame: &FrameDescriptor) {
        (**self).on_frame(frame)
    }
}
