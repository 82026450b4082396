//! Scanner primitives over raw JSON bytes.
//!
//! Everything in this module operates on `&[u8]` positions and never
//! allocates, with the single exception of [`unescape`] when the input
//! actually contains an escape sequence. The lazy node tree leans on these
//! to cut sub-slices out of the input without decoding them.

use crate::error::{Error, Result};

/// Nesting depth accepted by [`validate`]. The validator recurses once per
/// container level; this keeps adversarial inputs off the stack.
const MAX_DEPTH: usize = 512;

/// Advance `pos` over JSON whitespace (space, tab, CR, LF).
pub(crate) fn skip_ws(buf: &[u8], mut pos: usize) -> usize {
    while let Some(&(b' ' | b'\t' | b'\r' | b'\n')) = buf.get(pos) {
        pos += 1;
    }
    pos
}

/// Index of the `"` closing the string whose opening `"` is at `start`,
/// respecting `\"` and `\\`. `None` when the string is unterminated.
pub(crate) fn find_matching_quote(buf: &[u8], start: usize) -> Option<usize> {
    debug_assert_eq!(buf.get(start), Some(&b'"'));
    let mut i = start + 1;
    while i < buf.len() {
        match buf[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Index of the `}` matching the `{` at `start`, skipping strings and any
/// nested containers. `None` when unbalanced.
pub(crate) fn find_matching_brace(buf: &[u8], start: usize) -> Option<usize> {
    find_matching(buf, start, b'{', b'}')
}

/// Index of the `]` matching the `[` at `start`. `None` when unbalanced.
pub(crate) fn find_matching_bracket(buf: &[u8], start: usize) -> Option<usize> {
    find_matching(buf, start, b'[', b']')
}

fn find_matching(buf: &[u8], start: usize, open: u8, close: u8) -> Option<usize> {
    debug_assert_eq!(buf.get(start), Some(&open));
    let mut depth = 0usize;
    let mut i = start;
    while i < buf.len() {
        match buf[i] {
            b'"' => i = find_matching_quote(buf, i)?,
            b if b == open => depth += 1,
            b if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Exclusive end of the primitive literal (number, `true`, `false`,
/// `null`) starting at `start`: the first delimiter or end of input.
pub(crate) fn find_value_end(buf: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < buf.len() {
        match buf[i] {
            b',' | b']' | b'}' | b' ' | b'\t' | b'\r' | b'\n' => break,
            _ => i += 1,
        }
    }
    i
}

/// Byte range of the complete value starting at `pos`: the matched span of
/// a container or string, the literal span otherwise. `None` on unbalanced
/// input.
pub(crate) fn value_slice(buf: &[u8], pos: usize) -> Option<std::ops::Range<usize>> {
    match *buf.get(pos)? {
        b'{' => Some(pos..find_matching_brace(buf, pos)? + 1),
        b'[' => Some(pos..find_matching_bracket(buf, pos)? + 1),
        b'"' => Some(pos..find_matching_quote(buf, pos)? + 1),
        _ => Some(pos..find_value_end(buf, pos)),
    }
}

/// Decode the contents of a JSON string (the bytes between, not including,
/// the quotes). Borrows nothing; returns an owned `String`.
pub(crate) fn unescape(bytes: &[u8]) -> Result<String> {
    let plain = |bytes: &[u8], offset: usize| {
        std::str::from_utf8(bytes).map(str::to_owned).map_err(|e| Error::Syntax {
            offset: offset + e.valid_up_to(),
            message: "invalid UTF-8 in string".into(),
        })
    };
    if !bytes.contains(&b'\\') {
        return plain(bytes, 0);
    }

    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            let run_end = bytes[i..]
                .iter()
                .position(|&b| b == b'\\')
                .map_or(bytes.len(), |p| i + p);
            out.push_str(&plain(&bytes[i..run_end], i)?);
            i = run_end;
            continue;
        }
        let esc = *bytes.get(i + 1).ok_or_else(|| Error::Syntax {
            offset: i,
            message: "unterminated escape sequence".into(),
        })?;
        i += 2;
        match esc {
            b'"' => out.push('"'),
            b'\\' => out.push('\\'),
            b'/' => out.push('/'),
            b'b' => out.push('\u{0008}'),
            b'f' => out.push('\u{000C}'),
            b'n' => out.push('\n'),
            b'r' => out.push('\r'),
            b't' => out.push('\t'),
            b'u' => {
                let unit = hex4(bytes, i)?;
                i += 4;
                if (0xD800..0xDC00).contains(&unit) {
                    // High surrogate: a low surrogate escape must follow.
                    if bytes.get(i) != Some(&b'\\') || bytes.get(i + 1) != Some(&b'u') {
                        return Err(Error::Syntax {
                            offset: i,
                            message: "unpaired surrogate in \\u escape".into(),
                        });
                    }
                    let low = hex4(bytes, i + 2)?;
                    i += 6;
                    if !(0xDC00..0xE000).contains(&low) {
                        return Err(Error::Syntax {
                            offset: i,
                            message: "invalid low surrogate in \\u escape".into(),
                        });
                    }
                    let c = 0x10000 + ((unit as u32 - 0xD800) << 10) + (low as u32 - 0xDC00);
                    out.push(char::from_u32(c).expect("surrogate pair decodes"));
                } else {
                    match char::from_u32(unit as u32) {
                        Some(c) => out.push(c),
                        None => {
                            return Err(Error::Syntax {
                                offset: i - 4,
                                message: "unpaired surrogate in \\u escape".into(),
                            })
                        }
                    }
                }
            }
            other => {
                return Err(Error::Syntax {
                    offset: i - 1,
                    message: format!("invalid escape character `{}`", other as char),
                })
            }
        }
    }
    Ok(out)
}

fn hex4(bytes: &[u8], pos: usize) -> Result<u16> {
    let hex = bytes.get(pos..pos + 4).ok_or_else(|| Error::Syntax {
        offset: pos,
        message: "truncated \\u escape".into(),
    })?;
    let hex = std::str::from_utf8(hex).map_err(|_| Error::Syntax {
        offset: pos,
        message: "non-hex digits in \\u escape".into(),
    })?;
    u16::from_str_radix(hex, 16).map_err(|_| Error::Syntax {
        offset: pos,
        message: "non-hex digits in \\u escape".into(),
    })
}

/// Serialize `s` as a JSON string, quotes included, onto `out`.
pub(crate) fn write_escaped_str(out: &mut Vec<u8>, s: &str) {
    out.push(b'"');
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\u{0008}' => out.extend_from_slice(b"\\b"),
            '\u{000C}' => out.extend_from_slice(b"\\f"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            c if (c as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c => {
                let mut utf8 = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
            }
        }
    }
    out.push(b'"');
}

/// Structural well-formedness check for a whole document: exactly one JSON
/// value, optionally surrounded by whitespace. This is the eager validation
/// behind [`Document::parse`](crate::Document::parse); the lazy tree can
/// then cut sub-slices without re-checking syntax at every step.
pub(crate) fn validate(buf: &[u8]) -> Result<()> {
    let pos = skip_ws(buf, 0);
    let pos = validate_value(buf, pos, 0)?;
    let pos = skip_ws(buf, pos);
    if pos != buf.len() {
        return Err(Error::Syntax {
            offset: pos,
            message: "trailing characters after JSON value".into(),
        });
    }
    Ok(())
}

fn validate_value(buf: &[u8], pos: usize, depth: usize) -> Result<usize> {
    if depth > MAX_DEPTH {
        return Err(Error::RecursionLimit { limit: MAX_DEPTH });
    }
    match buf.get(pos) {
        None => Err(unexpected_end(buf)),
        Some(&b'{') => validate_object(buf, pos, depth),
        Some(&b'[') => validate_array(buf, pos, depth),
        Some(&b'"') => validate_string(buf, pos),
        Some(&b't') => validate_literal(buf, pos, b"true"),
        Some(&b'f') => validate_literal(buf, pos, b"false"),
        Some(&b'n') => validate_literal(buf, pos, b"null"),
        Some(&(b'-' | b'0'..=b'9')) => validate_number(buf, pos),
        Some(&c) => Err(Error::Syntax {
            offset: pos,
            message: format!("unexpected character `{}`", c as char),
        }),
    }
}

fn validate_object(buf: &[u8], pos: usize, depth: usize) -> Result<usize> {
    let mut i = skip_ws(buf, pos + 1);
    if buf.get(i) == Some(&b'}') {
        return Ok(i + 1);
    }
    loop {
        if buf.get(i) != Some(&b'"') {
            return Err(expected(buf, i, "object key"));
        }
        i = validate_string(buf, i)?;
        i = skip_ws(buf, i);
        if buf.get(i) != Some(&b':') {
            return Err(expected(buf, i, "`:`"));
        }
        i = skip_ws(buf, i + 1);
        i = validate_value(buf, i, depth + 1)?;
        i = skip_ws(buf, i);
        match buf.get(i) {
            Some(&b',') => i = skip_ws(buf, i + 1),
            Some(&b'}') => return Ok(i + 1),
            _ => return Err(expected(buf, i, "`,` or `}`")),
        }
    }
}

fn validate_array(buf: &[u8], pos: usize, depth: usize) -> Result<usize> {
    let mut i = skip_ws(buf, pos + 1);
    if buf.get(i) == Some(&b']') {
        return Ok(i + 1);
    }
    loop {
        i = validate_value(buf, i, depth + 1)?;
        i = skip_ws(buf, i);
        match buf.get(i) {
            Some(&b',') => i = skip_ws(buf, i + 1),
            Some(&b']') => return Ok(i + 1),
            _ => return Err(expected(buf, i, "`,` or `]`")),
        }
    }
}

fn validate_string(buf: &[u8], pos: usize) -> Result<usize> {
    let mut i = pos + 1;
    loop {
        match buf.get(i) {
            None => return Err(unexpected_end(buf)),
            Some(&b'"') => return Ok(i + 1),
            Some(&b'\\') => match buf.get(i + 1) {
                Some(&(b'"' | b'\\' | b'/' | b'b' | b'f' | b'n' | b'r' | b't')) => i += 2,
                Some(&b'u') => {
                    hex4(buf, i + 2).map_err(|_| Error::Syntax {
                        offset: i,
                        message: "invalid \\u escape".into(),
                    })?;
                    i += 6;
                }
                _ => {
                    return Err(Error::Syntax {
                        offset: i,
                        message: "invalid escape sequence".into(),
                    })
                }
            },
            Some(&c) if c < 0x20 => {
                return Err(Error::Syntax {
                    offset: i,
                    message: "unescaped control character in string".into(),
                })
            }
            Some(_) => i += 1,
        }
    }
}

fn validate_literal(buf: &[u8], pos: usize, lit: &'static [u8]) -> Result<usize> {
    if buf.get(pos..pos + lit.len()) == Some(lit) {
        Ok(pos + lit.len())
    } else {
        Err(Error::Syntax {
            offset: pos,
            message: format!(
                "invalid literal, expected `{}`",
                std::str::from_utf8(lit).expect("literal is ascii")
            ),
        })
    }
}

fn validate_number(buf: &[u8], pos: usize) -> Result<usize> {
    let mut i = pos;
    if buf.get(i) == Some(&b'-') {
        i += 1;
    }
    match buf.get(i) {
        Some(&b'0') => i += 1,
        Some(&(b'1'..=b'9')) => {
            while let Some(&(b'0'..=b'9')) = buf.get(i) {
                i += 1;
            }
        }
        _ => return Err(expected(buf, i, "digit")),
    }
    if buf.get(i) == Some(&b'.') {
        i += 1;
        if !matches!(buf.get(i), Some(&(b'0'..=b'9'))) {
            return Err(expected(buf, i, "fraction digit"));
        }
        while let Some(&(b'0'..=b'9')) = buf.get(i) {
            i += 1;
        }
    }
    if let Some(&(b'e' | b'E')) = buf.get(i) {
        i += 1;
        if let Some(&(b'+' | b'-')) = buf.get(i) {
            i += 1;
        }
        if !matches!(buf.get(i), Some(&(b'0'..=b'9'))) {
            return Err(expected(buf, i, "exponent digit"));
        }
        while let Some(&(b'0'..=b'9')) = buf.get(i) {
            i += 1;
        }
    }
    Ok(i)
}

fn unexpected_end(buf: &[u8]) -> Error {
    Error::Syntax {
        offset: buf.len(),
        message: "unexpected end of input".into(),
    }
}

fn expected(buf: &[u8], pos: usize, what: &str) -> Error {
    let found = match buf.get(pos) {
        Some(&c) => format!("`{}`", c as char),
        None => "end of input".into(),
    };
    Error::Syntax {
        offset: pos,
        message: format!("expected {what}, found {found}"),
    }
}
