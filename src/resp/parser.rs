//! Streaming RESP parser.
//!
//! [`parse`] looks at the front of a buffer and returns the decoded value with
//! the number of bytes it used, `Err(Incomplete)` when the frame has not fully
//! arrived yet, or `Err(Protocol(…))` on malformed input.

use crate::error::{Result, StoreError};
use crate::resp::types::RespValue;
use bytes::Bytes;
use memchr::memchr;

/// Parse one RESP value from the front of `buf`.
///
/// Bulk strings are sliced out of `buf` without copying.
pub fn parse(buf: &Bytes) -> Result<(RespValue, usize)> {
    let Some(&tag) = buf.first() else {
        return Err(StoreError::Incomplete);
    };

    match tag {
        b'+' => {
            let (line, next) = read_line(buf, 1)?;
            Ok((RespValue::SimpleString(utf8(line, "simple string")?), next))
        }
        b'-' => {
            let (line, next) = read_line(buf, 1)?;
            Ok((RespValue::Error(utf8(line, "error")?), next))
        }
        b':' => {
            let (line, next) = read_line(buf, 1)?;
            Ok((RespValue::Integer(parse_int(line)?), next))
        }
        b'$' => parse_bulk(buf),
        b'*' => parse_array(buf),
        b'_' => {
            let (line, next) = read_line(buf, 1)?;
            if !line.is_empty() {
                return Err(StoreError::Protocol("null frame carries data".into()));
            }
            Ok((RespValue::Null, next))
        }
        b'#' => {
            let (line, next) = read_line(buf, 1)?;
            match line {
                b"t" => Ok((RespValue::Boolean(true), next)),
                b"f" => Ok((RespValue::Boolean(false), next)),
                _ => Err(StoreError::Protocol("invalid boolean frame".into())),
            }
        }
        b',' => {
            let (line, next) = read_line(buf, 1)?;
            let text = utf8(line, "double")?;
            let value = match text.as_str() {
                "inf" => f64::INFINITY,
                "-inf" => f64::NEG_INFINITY,
                other => other
                    .parse()
                    .map_err(|_| StoreError::Protocol(format!("invalid double: {other}")))?,
            };
            Ok((RespValue::Double(value), next))
        }
        other => Err(StoreError::Protocol(format!(
            "unknown RESP type byte: 0x{other:02x}"
        ))),
    }
}

/// Parse from a plain slice (copies into `Bytes` first).
pub fn parse_slice(buf: &[u8]) -> Result<(RespValue, usize)> {
    parse(&Bytes::copy_from_slice(buf))
}

/// `$<len>\r\n<data>\r\n` or the RESP2 nil `$-1\r\n`.
fn parse_bulk(buf: &Bytes) -> Result<(RespValue, usize)> {
    let (line, start) = read_line(buf, 1)?;
    let len = parse_int(line)?;
    if len < 0 {
        return Ok((RespValue::Null, start));
    }

    let end = start + len as usize;
    if buf.len() < end + 2 {
        return Err(StoreError::Incomplete);
    }
    if &buf[end..end + 2] != b"\r\n" {
        return Err(StoreError::Protocol(
            "bulk string not terminated by \\r\\n".into(),
        ));
    }
    Ok((RespValue::BulkString(buf.slice(start..end)), end + 2))
}

/// `*<count>\r\n<items…>` or the RESP2 nil `*-1\r\n`.
fn parse_array(buf: &Bytes) -> Result<(RespValue, usize)> {
    let (line, mut next) = read_line(buf, 1)?;
    let count = parse_int(line)?;
    if count < 0 {
        return Ok((RespValue::Null, next));
    }

    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (item, used) = parse(&buf.slice(next..))?;
        items.push(item);
        next += used;
    }
    Ok((RespValue::Array(items), next))
}

// ── Helpers ────────────────────────────────────────────────────────

/// Line starting at `offset`, up to (not including) `\r\n`, plus the index
/// just past the terminator.
#[inline]
fn read_line(buf: &[u8], offset: usize) -> Result<(&[u8], usize)> {
    let Some(pos) = memchr(b'\r', &buf[offset..]) else {
        return Err(StoreError::Incomplete);
    };
    let cr = offset + pos;
    match buf.get(cr + 1) {
        None => Err(StoreError::Incomplete),
        Some(b'\n') => Ok((&buf[offset..cr], cr + 2)),
        Some(_) => Err(StoreError::Protocol("expected \\n after \\r".into())),
    }
}

fn parse_int(bytes: &[u8]) -> Result<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            StoreError::Protocol(format!(
                "invalid integer: {:?}",
                String::from_utf8_lossy(bytes)
            ))
        })
}

fn utf8(bytes: &[u8], what: &str) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| StoreError::Protocol(format!("invalid UTF-8 in {what}: {e}")))
}

// ── Tests ──────────────────────────────────────────────────────────
