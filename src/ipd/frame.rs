use crate::util::ascii::{parse_decimal, parse_ipv4};

/// Every inbound socket frame from the co-processor starts with this.
pub const FRAME_PREFIX: &[u8] = b"\r\n+IPD,";

/// Longest `+IPD` line we will wait for, prefix and colon included. The
/// longest legal line (`\r\n+IPD,4,65535,"255.255.255.255",65535:`) is well
/// under this.
pub const MAX_FRAME_HEADER_LEN: usize = 64;

/// One `+IPD,<channel>,<length>[,<ip>,<port>]:` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub channel: u8,
    /// Number of raw bytes after the colon that belong to this link frame.
    /// Not the size of the whole response.
    pub length: usize,
    /// Sender address, when the firmware reports it. Informational only.
    pub remote: Option<([u8; 4], u16)>,
}

/// Result of trying to lex a frame line from the front of the window.
#[derive(Debug, PartialEq, Eq)]
pub enum Lexed {
    /// No colon yet; more bytes are needed.
    Incomplete,
    /// A full line was lexed. `consumed` covers the prefix through the colon.
    Frame {
        descriptor: FrameDescriptor,
        consumed: usize,
    },
}

#[derive(Debug, PartialEq, Eq)]
pub struct MalformedFrame;

impl FrameDescriptor {
    /// Lexes a frame line from `bytes`, which must already start with
    /// [`FRAME_PREFIX`](constant.FRAME_PREFIX.html).
    pub fn lex(bytes: &[u8]) -> Result<Lexed, MalformedFrame> {
        let searchable = &bytes[..core::cmp::min(bytes.len(), MAX_FRAME_HEADER_LEN)];

        let colon = match searchable.iter().position(|b| *b == b':') {
            Some(idx) => idx,
            None if bytes.len() >= MAX_FRAME_HEADER_LEN => return Err(MalformedFrame),
            None => return Ok(Lexed::Incomplete),
        };

        if colon < FRAME_PREFIX.len() {
            return Err(MalformedFrame);
        }

        let descriptor = Self::parse_fields(&bytes[FRAME_PREFIX.len()..colon])?;

        Ok(Lexed::Frame {
            descriptor,
            consumed: colon + 1,
        })
    }

    fn parse_fields(fields: &[u8]) -> Result<FrameDescriptor, MalformedFrame> {
        let mut fields = fields.split(|b| *b == b',');

        let channel = fields
            .next()
            .and_then(parse_decimal)
            .filter(|c| *c <= u8::MAX as usize)
            .ok_or(MalformedFrame)? as u8;

        let length = fields.next().and_then(parse_decimal).ok_or(MalformedFrame)?;

        // The address fields only show up when the firmware has +CIPDINFO
        // enabled, and we never route on them, so a garbled address is not
        // worth failing the frame over.
        let remote = match (fields.next(), fields.next()) {
            (Some(ip), Some(port)) => parse_ipv4(ip).zip(
                parse_decimal(port)
                    .filter(|p| *p <= u16::MAX as usize)
                    .map(|p| p as u16),
            ),
            _ => None,
        };

        Ok(FrameDescriptor {
            channel,
            length,
            remote,
        })
    }
}
