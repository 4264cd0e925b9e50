use httparse::{Header, Response, Status as HttpParseStatus};

use crate::http::Error;
use crate::util::ascii::parse_decimal;

/// Enough headers for the responses a microcontroller is likely to fetch.
/// Pass an array of this many
/// [`EMPTY_HEADER`](https://docs.rs/httparse/latest/httparse/constant.EMPTY_HEADER.html)s
/// to [`ResponseHead::parse`](struct.ResponseHead.html#method.parse).
pub const MAX_HEADERS: usize = 32;

/// Parsed version of an HTTP response’s head.
///
/// Borrows the strings from the response bytes and the header slots from the
/// caller, so parsing allocates nothing.
#[derive(Debug)]
pub struct ResponseHead<'h, 'buf> {
    pub code: u16,
    pub reason: Option<&'buf str>,
    /// Only the headers the response actually had.
    pub headers: &'h [Header<'buf>],
    /// Length of the head including the blank line. The body starts here.
    pub len: usize,
}

impl<'h, 'buf> ResponseHead<'h, 'buf> {
    /// Parses the head at the start of `bytes`, filling in `headers`.
    pub fn parse(bytes: &'buf [u8], headers: &'h mut [Header<'buf>]) -> Result<Self, Error> {
        let mut response = Response::new(headers);

        let len = match response.parse(bytes)? {
            HttpParseStatus::Complete(len) => len,
            HttpParseStatus::Partial => return Err(Error::Incomplete),
        };

        let Response {
            code,
            reason,
            headers,
            ..
        } = response;

        Ok(ResponseHead {
            code: code.unwrap_or(0),
            reason,
            headers,
            len,
        })
    }

    /// Returns the value of the header with the given name (ignoring case, per
    /// RFC 7230), or `None` if none is found.
    pub fn header(&self, name: &str) -> Option<&'buf [u8]> {
        self.headers
            .iter()
            .find(|h| name.eq_ignore_ascii_case(h.name))
            .map(|h| h.value)
    }

    pub fn content_length(&self) -> Option<usize> {
        self.header("Content-Length").and_then(parse_decimal)
    }

    /// The part of `response` after the head.
    pub fn body<'r>(&self, response: &'r [u8]) -> &'r [u8] {
        response.get(self.len..).unwrap_or(&[])
    }
}
