use std::io;
use thiserror::Error;

/// Structured Redis error kinds for programmatic matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisErrorKind {
    /// Generic ERR
    Err,
    /// WRONGTYPE Operation against a key holding the wrong kind of value
    WrongType,
    /// MOVED slot host:port  (cluster)
    Moved { slot: u16, addr: String },
    /// ASK slot host:port  (cluster)
    Ask { slot: u16, addr: String },
    /// CLUSTERDOWN
    ClusterDown,
    /// LOADING Redis is loading the dataset in memory
    Loading,
    /// READONLY You can't write against a read only replica
    ReadOnly,
    /// TRYAGAIN
    TryAgain,
    /// Any other Redis error prefix
    Other(String),
}

impl RedisErrorKind {
    /// Parse from a Redis error message string (e.g. "WRONGTYPE Operation against…").
    pub fn from_error_msg(msg: &str) -> Self {
        if let Some(rest) = msg.strip_prefix("MOVED ") {
            return match parse_redirect(rest) {
                Some((slot, addr)) => Self::Moved { slot, addr },
                None => Self::Other("MOVED".to_string()),
            };
        }
        if let Some(rest) = msg.strip_prefix("ASK ") {
            return match parse_redirect(rest) {
                Some((slot, addr)) => Self::Ask { slot, addr },
                None => Self::Other("ASK".to_string()),
            };
        }

        let prefix = msg.split_whitespace().next().unwrap_or("UNKNOWN");
        match prefix {
            "ERR" => Self::Err,
            "WRONGTYPE" => Self::WrongType,
            "CLUSTERDOWN" => Self::ClusterDown,
            "LOADING" => Self::Loading,
            "READONLY" => Self::ReadOnly,
            "TRYAGAIN" => Self::TryAgain,
            other => Self::Other(other.to_string()),
        }
    }
}

/// `<slot> <host:port>` tail of a MOVED/ASK reply.
fn parse_redirect(rest: &str) -> Option<(u16, String)> {
    let (slot, addr) = rest.split_once(' ')?;
    Some((slot.parse().ok()?, addr.to_string()))
}

/// All error variants for the store layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// TCP / IO level errors
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),
    /// RESP protocol parse errors
    #[error("protocol error: {0}")]
    Protocol(String),
    /// RESP parser needs more data — not a real error, used as control flow.
    #[error("incomplete RESP message")]
    Incomplete,
    /// Redis returned an error string with structured kind
    #[error("redis error: {message}")]
    Redis {
        kind: RedisErrorKind,
        message: String,
    },
    /// Operation timed out
    #[error("timeout: {0}")]
    Timeout(String),
    /// Cluster topology errors (no node for slot, etc.)
    #[error("cluster error: {0}")]
    Cluster(String),
    /// Store configuration could not be resolved or parsed
    #[error("configuration error: {0}")]
    Config(String),
    /// A store was wired up with missing or unusable parts
    #[error("invalid store: {0}")]
    InvalidStore(String),
    /// EXEC returned nil because a watched key changed
    #[error("transaction aborted")]
    TransactionAborted,
    /// The handle does not implement the requested command
    #[error("unsupported command: {0}")]
    Unsupported(String),
}

impl StoreError {
    /// Create a Redis error from a raw error message, auto-parsing the kind.
    pub fn redis(msg: impl Into<String>) -> Self {
        let message = msg.into();
        let kind = RedisErrorKind::from_error_msg(&message);
        Self::Redis { kind, message }
    }

    /// Check if this is a MOVED redirect.
    pub fn is_moved(&self) -> bool {
        matches!(
            self,
            Self::Redis {
                kind: RedisErrorKind::Moved { .. },
                ..
            }
        )
    }

    /// Check if this is an ASK redirect.
    pub fn is_ask(&self) -> bool {
        matches!(
            self,
            Self::Redis {
                kind: RedisErrorKind::Ask { .. },
                ..
            }
        )
    }

    /// True when the cluster told us another node owns the slot.
    pub fn is_redirect(&self) -> bool {
        self.is_moved() || self.is_ask()
    }

    /// Extract MOVED slot and address if this is a MOVED error.
    pub fn moved_info(&self) -> Option<(u16, &str)> {
        match self {
            Self::Redis {
                kind: RedisErrorKind::Moved { slot, addr },
                ..
            } => Some((*slot, addr)),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Events the dual-store layer reports instead of failing.
///
/// These are logged and counted, never returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    #[error("{command}: value found on secondary, not on primary")]
    ReadFallback { command: String },
    #[error(
        "{command}: method missing{suffix}",
        suffix = if *with_block { " (called with a block)" } else { "" }
    )]
    MethodMissing { command: String, with_block: bool },
    #[error("{command}: pipelined results differ between stores")]
    PipelinedDiff { command: String },
}

impl Diagnostic {
    pub fn command(&self) -> &str {
        match self {
            Self::ReadFallback { command }
            | Self::MethodMissing { command, .. }
            | Self::PipelinedDiff { command } => command,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
