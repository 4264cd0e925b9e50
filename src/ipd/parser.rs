use core::cmp::min;
use core::ops::Range;

use embedded_hal::blocking::delay::DelayMs;

use super::frame::{FrameDescriptor, Lexed, FRAME_PREFIX};
use super::window::ReceiveWindow;
use super::{Error, ParserObserver, ParserState, ResponseMode};
use crate::header::content_length;
use crate::transport::{ByteTransport, Poller};
use crate::util::ascii::find;

const HEADER_END: &[u8] = b"\r\n\r\n";

/// Progress through one logical response.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResponseAccumulator {
    /// `Content-Length` of the response, if it declared one.
    pub content_length: Option<usize>,
    /// Body bytes still to deliver, when known.
    pub remaining: Option<usize>,
    /// Bytes written to the output buffer so far, header included.
    pub written: usize,
    /// Length of the HTTP header block at the front of the output.
    pub header_len: usize,
    header_seen: bool,
}

/// Resumable parser for one `+IPD` response.
///
/// A parser is built for a single response, so nothing carries over between
/// responses: the next one starts again from
/// [`AwaitingFrameHeader`](enum.ParserState.html#variant.AwaitingFrameHeader)
/// with a fresh accumulator. Only the unread bytes in the window are handed
/// on, through [`leftover`](#method.leftover).
///
/// The window's buffer only has to hold the longest frame line or HTTP
/// header. Body bytes are copied straight through to the output.
pub struct FrameParser<'w, O = ()> {
    window: ReceiveWindow<'w>,
    state: ParserState,
    mode: ResponseMode,
    /// Raw bytes of the current link frame not yet consumed.
    frame_remaining: usize,
    /// Tail of a frame from an earlier response that is still on the link.
    stale: usize,
    accumulator: ResponseAccumulator,
    observer: O,
}

impl<'w> FrameParser<'w, ()> {
    pub fn new(window: ReceiveWindow<'w>, mode: ResponseMode) -> Self {
        FrameParser::with_observer(window, mode, ())
    }
}

impl<'w, O: ParserObserver> FrameParser<'w, O> {
    pub fn with_observer(window: ReceiveWindow<'w>, mode: ResponseMode, observer: O) -> Self {
        FrameParser {
            window,
            state: ParserState::AwaitingFrameHeader,
            mode,
            frame_remaining: 0,
            stale: 0,
            accumulator: ResponseAccumulator::default(),
            observer,
        }
    }

    /// Discards the first `count` bytes off the link before looking for a
    /// frame line. See [`unread_tail`](#method.unread_tail).
    pub fn skipping(mut self, count: usize) -> Self {
        self.stale = count;
        self
    }

    /// Drives the state machine until the response is complete, writing it
    /// into `out`. Returns the number of bytes written: in HTTP mode that is
    /// the header block followed by the body.
    ///
    /// The poller's timeout applies between steps of progress. Every state
    /// change and every chunk of new bytes restarts it.
    pub fn run<T, D>(
        &mut self,
        poller: &mut Poller<T, D>,
        out: &mut [u8],
    ) -> Result<usize, Error<T::Error>>
    where
        T: ByteTransport,
        D: DelayMs<u32>,
    {
        poller.progress();

        loop {
            if self.state == ParserState::Done {
                self.skip_frame_tail();
                return Ok(self.accumulator.written);
            }

            match self.step(poller, out) {
                Ok(next) => self.transition(next, poller),
                Err(err) => {
                    self.transition(ParserState::Failed(err.kind()), poller);
                    return Err(err);
                }
            }
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn accumulator(&self) -> &ResponseAccumulator {
        &self.accumulator
    }

    /// Window offsets of the bytes read past the end of the response, which
    /// belong to whatever comes next on the link.
    pub fn leftover(&self) -> Range<usize> {
        self.window.pending()
    }

    /// Bytes of the final frame that lie past the end of the response and
    /// have not been read off the link yet. They have to be skipped before
    /// the next frame line.
    pub fn unread_tail(&self) -> usize {
        match self.state {
            ParserState::Done => self.frame_remaining,
            _ => 0,
        }
    }

    fn transition<T, D>(&mut self, next: ParserState, poller: &mut Poller<T, D>)
    where
        T: ByteTransport,
        D: DelayMs<u32>,
    {
        if next == self.state {
            return;
        }

        log::trace!("ipd: {:?} -> {:?}", self.state, next);
        self.observer.on_transition(self.state, next);
        self.state = next;
        poller.progress();
    }

    /// Runs the current state once and returns the state to move to, which
    /// is the same state when it had to wait for more bytes.
    fn step<T, D>(
        &mut self,
        poller: &mut Poller<T, D>,
        out: &mut [u8],
    ) -> Result<ParserState, Error<T::Error>>
    where
        T: ByteTransport,
        D: DelayMs<u32>,
    {
        match self.state {
            ParserState::AwaitingFrameHeader | ParserState::AwaitingContinuationHeader => {
                self.await_frame_prefix(poller)
            }
            ParserState::ParsingFrameHeaderFields => self.parse_frame_fields(poller),
            ParserState::AwaitingHttpHeaderEnd => self.parse_http_header(poller, out),
            ParserState::StreamingBody => self.stream_body(poller, out),
            ParserState::Done | ParserState::Failed(_) => Ok(self.state),
        }
    }

    fn await_frame_prefix<T, D>(
        &mut self,
        poller: &mut Poller<T, D>,
    ) -> Result<ParserState, Error<T::Error>>
    where
        T: ByteTransport,
        D: DelayMs<u32>,
    {
        if self.stale > 0 {
            if self.window.is_empty() {
                self.read_more(poller)?;
            } else {
                let skipped = min(self.stale, self.window.len());
                self.window.consume(skipped);
                self.stale -= skipped;
            }
            return Ok(self.state);
        }

        let short = self.window.len() < FRAME_PREFIX.len();

        // Bail as soon as the bytes we have can no longer become a prefix,
        // rather than waiting for all seven.
        let matches = if short {
            FRAME_PREFIX.starts_with(self.window.available())
        } else {
            self.window.starts_with(FRAME_PREFIX)
        };

        if !matches {
            return Err(self.recover_from_overflow(poller));
        }

        if short {
            self.read_more(poller)?;
            return Ok(self.state);
        }

        Ok(ParserState::ParsingFrameHeaderFields)
    }

    fn parse_frame_fields<T, D>(
        &mut self,
        poller: &mut Poller<T, D>,
    ) -> Result<ParserState, Error<T::Error>>
    where
        T: ByteTransport,
        D: DelayMs<u32>,
    {
        let (descriptor, consumed) = match FrameDescriptor::lex(self.window.available())? {
            Lexed::Incomplete => {
                self.read_more(poller)?;
                return Ok(self.state);
            }
            Lexed::Frame {
                descriptor,
                consumed,
            } => (descriptor, consumed),
        };

        log::debug!(
            "ipd: frame on channel {} with {} bytes",
            descriptor.channel,
            descriptor.length
        );
        self.observer.on_frame(&descriptor);

        self.window.consume(consumed);
        self.frame_remaining = descriptor.length;

        match self.mode {
            ResponseMode::Http if !self.accumulator.header_seen => {
                Ok(ParserState::AwaitingHttpHeaderEnd)
            }
            ResponseMode::Http => Ok(ParserState::StreamingBody),
            ResponseMode::Raw => {
                self.accumulator.content_length = Some(descriptor.length);
                self.accumulator.remaining = Some(descriptor.length);
                Ok(self.after_body_bytes())
            }
        }
    }

    fn parse_http_header<T, D>(
        &mut self,
        poller: &mut Poller<T, D>,
        out: &mut [u8],
    ) -> Result<ParserState, Error<T::Error>>
    where
        T: ByteTransport,
        D: DelayMs<u32>,
    {
        // Only bytes of this frame can belong to the header; anything after
        // them is the next frame line.
        let in_frame = min(self.window.len(), self.frame_remaining);

        let header_len = match find(&self.window.available()[..in_frame], HEADER_END) {
            Some(idx) => idx + HEADER_END.len(),
            // The whole frame is here and the header still has not ended.
            None if in_frame == self.frame_remaining => return Err(Error::MalformedFrame),
            None => {
                self.read_more(poller)?;
                return Ok(self.state);
            }
        };

        let header_start = self.accumulator.written;
        self.copy_out(header_len, out)?;
        self.frame_remaining -= header_len;

        let declared = content_length(&out[header_start..header_start + header_len]);
        log::debug!(
            "ipd: {} byte header, content length {:?}",
            header_len,
            declared
        );

        self.accumulator.header_seen = true;
        self.accumulator.header_len = header_len;
        self.accumulator.content_length = declared;
        self.accumulator.remaining = declared;

        Ok(self.after_body_bytes())
    }

    fn stream_body<T, D>(
        &mut self,
        poller: &mut Poller<T, D>,
        out: &mut [u8],
    ) -> Result<ParserState, Error<T::Error>>
    where
        T: ByteTransport,
        D: DelayMs<u32>,
    {
        if self.frame_remaining == 0 {
            return Ok(self.after_body_bytes());
        }

        if self.window.is_empty() {
            self.read_more(poller)?;
            return Ok(self.state);
        }

        let mut count = min(self.frame_remaining, self.window.len());
        if let Some(remaining) = self.accumulator.remaining {
            count = min(count, remaining);
        }

        self.copy_out(count, out)?;
        self.frame_remaining -= count;
        if let Some(remaining) = self.accumulator.remaining.as_mut() {
            *remaining -= count;
        }

        Ok(self.after_body_bytes())
    }

    /// Decides where to go once some of the current frame has been copied.
    fn after_body_bytes(&self) -> ParserState {
        match self.accumulator.remaining {
            Some(0) => ParserState::Done,
            Some(_) if self.frame_remaining == 0 => ParserState::AwaitingContinuationHeader,
            // Without a Content-Length the first frame is the whole response.
            None if self.frame_remaining == 0 => ParserState::Done,
            _ => ParserState::StreamingBody,
        }
    }

    /// Drops what is left of the current frame once the response is
    /// complete. Whatever part of it has not arrived yet is counted in
    /// [`unread_tail`](#method.unread_tail).
    fn skip_frame_tail(&mut self) {
        if self.frame_remaining == 0 {
            return;
        }

        let skipped = min(self.frame_remaining, self.window.len());
        log::debug!(
            "ipd: dropping {} bytes past the end of the response, {} still on the link",
            self.frame_remaining,
            self.frame_remaining - skipped
        );

        self.window.consume(skipped);
        self.frame_remaining -= skipped;
    }

    /// Appends the first `count` window bytes to `out`.
    fn copy_out<E>(&mut self, count: usize, out: &mut [u8]) -> Result<(), Error<E>> {
        let written = self.accumulator.written;

        let dest = out
            .get_mut(written..written + count)
            .ok_or(Error::OutputFull)?;
        dest.copy_from_slice(&self.window.available()[..count]);

        self.window.consume(count);
        self.accumulator.written += count;

        Ok(())
    }

    /// Blocks until the transport delivers more bytes into the window.
    fn read_more<T, D>(&mut self, poller: &mut Poller<T, D>) -> Result<(), Error<T::Error>>
    where
        T: ByteTransport,
        D: DelayMs<u32>,
    {
        self.window.compact();

        // Only a frame line or a header can fill the window, and neither is
        // allowed to be that long.
        if self.window.is_full() {
            return Err(Error::MalformedFrame);
        }

        let before = self.window.len();
        let read = poller.fill(self.window.spare_mut())?;
        self.window.commit(read);

        let chunk = &self.window.available()[before..];
        log::trace!("ipd: read {} bytes", chunk.len());
        self.observer.on_read(chunk);

        Ok(())
    }

    fn recover_from_overflow<T, D>(&mut self, poller: &mut Poller<T, D>) -> Error<T::Error>
    where
        T: ByteTransport,
        D: DelayMs<u32>,
    {
        log::warn!(
            "ipd: expected a frame line, got {} unexpected bytes; draining link",
            self.window.len()
        );

        self.window.consume(self.window.len());
        self.window.compact();

        match poller.drain(self.window.spare_mut()) {
            Ok(discarded) => {
                log::debug!("ipd: drained {} bytes", discarded);
                Error::LinkOverflow
            }
            Err(err) => err.into(),
        }
    }
}
