//! Small byte-string helpers for the ASCII AT protocol. Everything here works on
//! `&[u8]` so that nothing has to be valid UTF-8 to be searched.

/// Returns the index of the first occurrence of `needle` in `haystack`.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }

    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}

/// Parses a field that must consist only of decimal digits.
///
/// Unlike `str::parse` this rejects a leading `+`.
pub fn parse_decimal(bytes: &[u8]) -> Option<usize> {
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }

    leading_decimal(bytes)
}

/// Parses the run of decimal digits at the start of `bytes`, ignoring anything
/// after it. `None` if there are no digits or the value overflows.
pub fn leading_decimal(bytes: &[u8]) -> Option<usize> {
    let digits = bytes.iter().take_while(|b| b.is_ascii_digit());

    let mut value: usize = 0;
    let mut seen = false;

    for d in digits {
        seen = true;
        value = value
            .checked_mul(10)?
            .checked_add((d - b'0') as usize)?;
    }

    if seen {
        Some(value)
    } else {
        None
    }
}

/// Parses `a.b.c.d`, optionally wrapped in double quotes.
pub fn parse_ipv4(bytes: &[u8]) -> Option<[u8; 4]> {
    let bytes = match bytes {
        [b'"', inner @ .., b'"'] => inner,
        _ => bytes,
    };

    let mut ip = [0u8; 4];
    let mut octets = bytes.split(|b| *b == b'.');

    for slot in ip.iter_mut() {
        let octet = parse_decimal(octets.next()?)?;
        if octet > 255 {
            return None;
        }
        *slot = octet as u8;
    }

    if octets.next().is_some() {
        return None;
    }

    Some(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_needle() {
        assert_eq!(find(b"HTTP/1.1 200 OK\r\n\r\nbody", b"\r\n\r\n"), Some(15));
        assert_eq!(find(b"abc", b"abcd"), None);
        assert!(contains(b"\r\nSEND OK\r\n", b"\nSEND OK"));
    }

    #[test]
    fn decimal_fields_are_strict() {
        assert_eq!(parse_decimal(b"1024"), Some(1024));
        assert_eq!(parse_decimal(b"+1"), None);
        assert_eq!(parse_decimal(b"12a"), None);
        assert_eq!(parse_decimal(b""), None);
        assert_eq!(parse_decimal(b"99999999999999999999999999"), None);
    }

    #[test]
    fn leading_decimal_stops_at_first_non_digit() {
        assert_eq!(leading_decimal(b"42\r\nServer: x"), Some(42));
        assert_eq!(leading_decimal(b"\r\n"), None);
    }

    #[test]
    fn ipv4_with_and_without_quotes() {
        assert_eq!(parse_ipv4(b"192.168.1.1"), Some([192, 168, 1, 1]));
        assert_eq!(parse_ipv4(b"\"10.0.0.7\""), Some([10, 0, 0, 7]));
        assert_eq!(parse_ipv4(b"10.0.0"), None);
        assert_eq!(parse_ipv4(b"10.0.0.256"), None);
        assert_eq!(parse_ipv4(b"1.2.3.4.5"), None);
    }
}
