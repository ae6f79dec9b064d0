use crate::error::{Result, StoreError};
use bytes::Bytes;

/// Values a Redis server can reply with (RESP2 plus the RESP3 scalars we
/// might see from a `HELLO 3` connection).
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// +OK\r\n
    SimpleString(String),
    /// -ERR message\r\n
    Error(String),
    /// :1000\r\n
    Integer(i64),
    /// $6\r\nfoobar\r\n
    BulkString(Bytes),
    /// *2\r\n…
    Array(Vec<RespValue>),
    /// $-1\r\n, *-1\r\n or _\r\n
    Null,
    /// #t\r\n / #f\r\n (RESP3)
    Boolean(bool),
    /// ,3.14\r\n (RESP3)
    Double(f64),
}

impl RespValue {
    /// Shorthand for the `+OK` status reply.
    pub fn ok() -> Self {
        Self::SimpleString("OK".to_string())
    }

    /// Bulk string reply built from anything string-like.
    pub fn bulk(data: impl AsRef<[u8]>) -> Self {
        Self::BulkString(Bytes::copy_from_slice(data.as_ref()))
    }

    /// Try to interpret this value as a UTF-8 string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::SimpleString(s) => Some(s),
            Self::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Try to interpret this value as i64.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to interpret this value as an array (consumes self).
    pub fn into_array(self) -> Option<Vec<RespValue>> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Returns true when this value represents null / nil.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// A reply that counts as "nothing there" when deciding whether a read
    /// should be retried elsewhere: nil and RESP3 false. Empty arrays and
    /// zero counts are real answers.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Null | Self::Boolean(false))
    }

    /// Returns true when this is a Redis error reply.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Returns the error message if this is an error value.
    pub fn as_error_msg(&self) -> Option<&str> {
        match self {
            Self::Error(msg) => Some(msg),
            _ => None,
        }
    }

    /// Turn a top-level error reply into `Err`.
    pub fn into_result(self) -> Result<Self> {
        match self {
            Self::Error(msg) => Err(StoreError::redis(msg)),
            other => Ok(other),
        }
    }

    /// Returns the type name as a static string (useful for error messages).
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SimpleString(_) => "simple_string",
            Self::Error(_) => "error",
            Self::Integer(_) => "integer",
            Self::BulkString(_) => "bulk_string",
            Self::Array(_) => "array",
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Double(_) => "double",
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
