pub mod socket;
pub mod wifi;

use core::fmt::Write;

use embedded_hal::blocking::delay::DelayMs;
use fugit::MillisDurationU32;
use heapless::{String, Vec};

use crate::config::MAX_COMMAND_LEN;
use crate::transport::{ByteTransport, Poller};
use crate::util::ascii::find;
use crate::{Error, Rtl8720dn};

/// Reply tokens that end a command successfully. `>` is the prompt for the
/// payload of `AT+CIPSEND`.
const SUCCESS_TOKENS: [&[u8]; 3] = [b"ready", b"OK", b">"];

/// `FAIL` covers both a failed join and `SEND FAIL`.
const FAILURE_TOKENS: [&[u8]; 3] = [b"ERROR", b"FAIL", b"\r\nunknown command "];

/// Where a reply ends, and whether it ended well.
#[derive(Debug, PartialEq, Eq)]
struct Terminator {
    end: usize,
    success: bool,
}

/// Finds the earliest reply token in `reply`.
///
/// Word tokens only count at the start of a line or after a space, so that a
/// quoted SSID echoed back as part of the command cannot end it early. The
/// line break after the token belongs to the reply.
fn find_terminator(reply: &[u8]) -> Option<Terminator> {
    let tokens = SUCCESS_TOKENS
        .iter()
        .map(|token| (*token, true))
        .chain(FAILURE_TOKENS.iter().map(|token| (*token, false)));

    let mut earliest: Option<(usize, &[u8], bool)> = None;

    for (token, success) in tokens {
        let mut from = 0;

        while let Some(idx) = find(&reply[from..], token) {
            let pos = from + idx;
            let at_boundary =
                token[0] == b'\r' || pos == 0 || matches!(reply[pos - 1], b'\n' | b' ');

            if at_boundary {
                if earliest.map_or(true, |(best, _, _)| pos < best) {
                    earliest = Some((pos, token, success));
                }
                break;
            }

            from = pos + 1;
        }
    }

    earliest.map(|(pos, token, success)| {
        let mut end = pos + token.len();
        if reply[end..].starts_with(b"\r\n") {
            end += 2;
        }

        Terminator { end, success }
    })
}

impl<T, D> Rtl8720dn<T, D>
where
    T: ByteTransport,
    D: DelayMs<u32>,
{
    /// Sends `cmd` followed by `\r\n`.
    pub fn send_command(&mut self, cmd: &[u8]) -> Result<(), Error<T::Error>> {
        let mut line: Vec<u8, { MAX_COMMAND_LEN + 2 }> = Vec::new();
        line.extend_from_slice(cmd)
            .and_then(|_| line.extend_from_slice(b"\r\n"))
            .map_err(|_| Error::CommandTooLong)?;

        log::debug!(
            "at: > {}",
            core::str::from_utf8(cmd).unwrap_or("<non-utf8 command>")
        );

        self.write_all(&line)
    }

    /// Formats a command line and sends it.
    fn send_command_fmt(&mut self, args: core::fmt::Arguments) -> Result<(), Error<T::Error>> {
        let mut cmd: String<MAX_COMMAND_LEN> = String::new();
        cmd.write_fmt(args).map_err(|_| Error::CommandTooLong)?;

        self.send_command(cmd.as_bytes())
    }

    /// Sends a command and waits for its reply with the configured command
    /// timeout.
    fn command(&mut self, args: core::fmt::Arguments) -> Result<&[u8], Error<T::Error>> {
        self.send_command_fmt(args)?;

        let timeout = self.config.command_timeout;
        self.wait_response(timeout)
    }

    /// Writes raw bytes to the link, such as a socket payload after the `>`
    /// prompt.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error<T::Error>> {
        let mut poller = Poller::new(
            &mut self.transport,
            &mut self.delay,
            self.config.command_timeout,
            self.config.poll_interval,
        );

        poller.write_all(bytes).map_err(Error::from)
    }

    /// Collects a command reply until it ends in `OK`, `ready` or the `>`
    /// prompt, and returns it, echo included.
    ///
    /// Anything the co-processor sent after the reply, usually the start of an
    /// `+IPD` frame, stays in the window for the next read.
    pub fn wait_response(
        &mut self,
        timeout: MillisDurationU32,
    ) -> Result<&[u8], Error<T::Error>> {
        let mut len = self.scratch.take_pending();

        let mut poller = Poller::new(
            &mut self.transport,
            &mut self.delay,
            timeout,
            self.config.poll_interval,
        );

        loop {
            if let Some(Terminator { end, success }) = find_terminator(&self.scratch.buf[..len]) {
                self.scratch.pending = end..len;
                let reply = &self.scratch.buf[..end];

                return if success {
                    log::trace!("at: < {} bytes", reply.len());
                    Ok(reply)
                } else {
                    log::warn!(
                        "at: error reply {:?}",
                        core::str::from_utf8(reply).unwrap_or("<non-utf8 reply>")
                    );
                    Err(Error::ErrorResponse)
                };
            }

            if len == self.scratch.buf.len() {
                return Err(Error::ResponseTooLong);
            }

            let read = poller.fill(&mut self.scratch.buf[len..])?;
            len = self.scratch.discard_stale(len + read);
        }
    }
}
