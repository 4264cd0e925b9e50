//! Helpers for working with the HTTP responses returned by
//! [`receive_framed`](../struct.Rtl8720dn.html#method.receive_framed) in
//! [`ResponseMode::Http`](../ipd/enum.ResponseMode.html).
//!
//! Uses the [`httparse`](https://docs.rs/httparse/) crate.
//!
//! Compile with the `http` feature to get this module.

mod response_head;

pub use response_head::{ResponseHead, MAX_HEADERS};

use httparse::Error as HttpParseError;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// The bytes ended before the blank line that closes the head.
    Incomplete,
    /// There was an error parsing the head.
    HttpParseError(HttpParseError),
}

impl From<HttpParseError> for Error {
    fn from(err: HttpParseError) -> Self {
        Error::HttpParseError(err)
    }
}
