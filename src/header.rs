//! Minimal HTTP header inspection used while parsing `+IPD` responses.

use crate::util::ascii::{find, leading_decimal};

const CONTENT_LENGTH: &[u8] = b"Content-Length: ";

/// Returns the value of the `Content-Length` header in a raw header block, or
/// `None` if it is missing or does not start with a number.
///
/// This is a literal, case-sensitive search for `"Content-Length: "`, which
/// is how the firmware's HTTP peers we care about spell it. Use
/// [`http::ResponseHead`](../http/struct.ResponseHead.html) (feature `http`)
/// when a real header parse is needed.
pub fn content_length(header: &[u8]) -> Option<usize> {
    let idx = find(header, CONTENT_LENGTH)?;

    leading_decimal(&header[idx + CONTENT_LENGTH.len()..])
}
