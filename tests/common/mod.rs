#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::blocking::delay::DelayMs;
use rtl8720dn::transport::ByteTransport;

/// The link went away mid-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkDown;

enum Step {
    Bytes(Vec<u8>),
    /// One poll that returns nothing.
    Idle,
    Fail,
}

#[derive(Default)]
struct Script {
    steps: VecDeque<Step>,
    written: Vec<u8>,
    /// Commands we answer, in order, and the reply to queue for each, one
    /// poll per piece.
    replies: VecDeque<(Vec<u8>, Vec<Vec<u8>>)>,
    matched_up_to: usize,
    max_write: Option<usize>,
    polls: usize,
}

/// A `ByteTransport` that plays back a script. Clones share the script, so a
/// test can keep one handle while the device owns the other.
#[derive(Clone, Default)]
pub struct ScriptedTransport(Rc<RefCell<Script>>);

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `bytes` to come back from a single poll, or several if the
    /// caller's buffer is smaller.
    pub fn push(&self, bytes: &[u8]) -> &Self {
        self.0
            .borrow_mut()
            .steps
            .push_back(Step::Bytes(bytes.to_vec()));
        self
    }

    /// Queues `bytes` split into polls of at most `chunk` bytes.
    pub fn push_chunked(&self, bytes: &[u8], chunk: usize) -> &Self {
        for piece in bytes.chunks(chunk) {
            self.push(piece);
        }
        self
    }

    /// Queues `polls` polls that find nothing.
    pub fn idle(&self, polls: usize) -> &Self {
        let mut script = self.0.borrow_mut();
        for _ in 0..polls {
            script.steps.push_back(Step::Idle);
        }
        self
    }

    pub fn fail(&self) -> &Self {
        self.0.borrow_mut().steps.push_back(Step::Fail);
        self
    }

    /// Once the host has written `command`, queues `reply` to be read.
    pub fn reply_to(&self, command: &[u8], reply: &[u8]) -> &Self {
        self.reply_in_pieces(command, &[reply])
    }

    /// Same as `reply_to`, with each piece coming back from its own poll.
    pub fn reply_in_pieces(&self, command: &[u8], pieces: &[&[u8]]) -> &Self {
        let pieces = pieces.iter().map(|piece| piece.to_vec()).collect();
        self.0
            .borrow_mut()
            .replies
            .push_back((command.to_vec(), pieces));
        self
    }

    /// Accept at most `max` bytes per write.
    pub fn limit_writes(&self, max: usize) -> &Self {
        self.0.borrow_mut().max_write = Some(max);
        self
    }

    pub fn written(&self) -> Vec<u8> {
        self.0.borrow().written.clone()
    }

    pub fn written_str(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow().written).into_owned()
    }

    /// Bytes queued but not read yet.
    pub fn unread(&self) -> usize {
        self.0
            .borrow()
            .steps
            .iter()
            .map(|step| match step {
                Step::Bytes(bytes) => bytes.len(),
                _ => 0,
            })
            .sum()
    }

    pub fn polls(&self) -> usize {
        self.0.borrow().polls
    }

    pub fn unanswered(&self) -> usize {
        self.0.borrow().replies.len()
    }
}

impl ByteTransport for ScriptedTransport {
    type Error = LinkDown;

    fn poll(&mut self, buf: &mut [u8]) -> Result<usize, LinkDown> {
        let mut script = self.0.borrow_mut();
        script.polls += 1;

        match script.steps.pop_front() {
            None | Some(Step::Idle) => Ok(0),
            Some(Step::Fail) => Err(LinkDown),
            Some(Step::Bytes(mut bytes)) => {
                let count = bytes.len().min(buf.len());
                buf[..count].copy_from_slice(&bytes[..count]);

                if count < bytes.len() {
                    let rest = bytes.split_off(count);
                    script.steps.push_front(Step::Bytes(rest));
                }

                Ok(count)
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, LinkDown> {
        let mut script = self.0.borrow_mut();
        let accepted = script.max_write.map_or(buf.len(), |max| max.min(buf.len()));
        script.written.extend_from_slice(&buf[..accepted]);

        loop {
            let found = match script.replies.front() {
                Some((command, _)) => find(&script.written[script.matched_up_to..], command)
                    .map(|idx| script.matched_up_to + idx + command.len()),
                None => None,
            };

            match found {
                Some(end) => {
                    let (_, pieces) = script.replies.pop_front().unwrap();
                    script.matched_up_to = end;
                    script.steps.extend(pieces.into_iter().map(Step::Bytes));
                }
                None => break,
            }
        }

        Ok(accepted)
    }

    fn data_ready(&mut self) -> bool {
        self.0
            .borrow()
            .steps
            .iter()
            .any(|step| matches!(step, Step::Bytes(_)))
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// A `DelayMs` that only advances a counter.
#[derive(Clone, Default)]
pub struct VirtualClock(Rc<Cell<u64>>);

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.0.get()
    }
}

impl DelayMs<u32> for VirtualClock {
    fn delay_ms(&mut self, ms: u32) {
        self.0.set(self.0.get() + u64::from(ms));
    }
}

/// `\r\n+IPD,<channel>,<len>,"192.168.1.1",80:` followed by `payload`.
pub fn frame(channel: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = format!(
        "\r\n+IPD,{},{},\"192.168.1.1\",80:",
        channel,
        payload.len()
    )
    .into_bytes();
    bytes.extend_from_slice(payload);
    bytes
}

/// An HTTP response head with a matching `Content-Length`.
pub fn http_head(body_len: usize) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n",
        body_len
    )
    .into_bytes()
}

pub fn http_response(body: &[u8]) -> Vec<u8> {
    let mut bytes = http_head(body.len());
    bytes.extend_from_slice(body);
    bytes
}
