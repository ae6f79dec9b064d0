//! Typed commands and the read/write classifier.
//!
//! Every verb the dual-store layer knows about is a [`CommandName`]; its
//! [`Access`] class is fixed by an exhaustive match, so a verb cannot be both
//! a read and a write. Anything else travels as [`Command::Unclassified`] with
//! its raw name and arguments.

use crate::error::{Result, StoreError};
use bytes::Bytes;
use std::fmt;

/// How the dual-store layer treats a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Primary first, secondary on absence.
    Read,
    /// Primary best-effort, secondary authoritative.
    Write,
    /// Unknown to the classifier; secondary only.
    Unclassified,
}

impl Access {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Unclassified => "unclassified",
        }
    }
}

macro_rules! command_names {
    ($( $variant:ident => $name:literal, $access:ident; )+) => {
        /// Verbs with a fixed classification.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum CommandName {
            $( $variant, )+
        }

        impl CommandName {
            /// Every known verb, reads first.
            pub const ALL: &'static [CommandName] = &[ $( CommandName::$variant, )+ ];

            /// Lower-case verb.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )+
                }
            }

            pub fn access(self) -> Access {
                match self {
                    $( Self::$variant => Access::$access, )+
                }
            }

            /// Case-insensitive lookup.
            pub fn from_name(name: &str) -> Option<Self> {
                $(
                    if name.eq_ignore_ascii_case($name) {
                        return Some(Self::$variant);
                    }
                )+
                None
            }
        }
    };
}

command_names! {
    Get => "get", Read;
    Mget => "mget", Read;
    Exists => "exists", Read;
    Strlen => "strlen", Read;
    Ttl => "ttl", Read;
    Hget => "hget", Read;
    Hgetall => "hgetall", Read;
    Hmget => "hmget", Read;
    Hlen => "hlen", Read;
    Hexists => "hexists", Read;
    Smembers => "smembers", Read;
    Scard => "scard", Read;
    Sismember => "sismember", Read;
    Zcard => "zcard", Read;
    Zscore => "zscore", Read;
    Zrange => "zrange", Read;

    Set => "set", Write;
    Setnx => "setnx", Write;
    Setex => "setex", Write;
    Del => "del", Write;
    Unlink => "unlink", Write;
    Expire => "expire", Write;
    Incr => "incr", Write;
    Incrby => "incrby", Write;
    Hset => "hset", Write;
    Hdel => "hdel", Write;
    Hincrby => "hincrby", Write;
    Sadd => "sadd", Write;
    Srem => "srem", Write;
    Rpush => "rpush", Write;
    Zadd => "zadd", Write;
    Zrem => "zrem", Write;
    Eval => "eval", Write;
    Flushdb => "flushdb", Write;
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands whose body is a block of further commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockCommand {
    Pipelined,
    Multi,
}

impl BlockCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pipelined => "pipelined",
            Self::Multi => "multi",
        }
    }

    /// Both block forms may carry writes, so both fan out like writes.
    pub fn access(self) -> Access {
        Access::Write
    }
}

/// Classify a command or block name.
pub fn classify(name: &str) -> Access {
    if let Some(known) = CommandName::from_name(name) {
        return known.access();
    }
    if name.eq_ignore_ascii_case("pipelined") || name.eq_ignore_ascii_case("multi") {
        return Access::Write;
    }
    Access::Unclassified
}

/// One command with its arguments (name excluded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Known { name: CommandName, args: Vec<Bytes> },
    Unclassified { name: String, args: Vec<Bytes> },
}

/// Commands without a key argument, for routing purposes.
const KEYLESS: &[&str] = &[
    "ping", "echo", "info", "dbsize", "cluster", "config", "client", "command", "time",
    "randomkey", "wait", "save", "bgsave", "flushall", "lastsave", "slowlog", "multi", "exec",
    "discard", "script", "publish", "subscribe", "unsubscribe", "quit", "asking", "readonly",
];

impl Command {
    /// A known verb with arguments.
    pub fn new<I, A>(name: CommandName, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        Self::Known {
            name,
            args: to_bytes(args),
        }
    }

    /// Build from a raw verb; known verbs become [`Command::Known`].
    pub fn raw<I, A>(name: &str, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        let args = to_bytes(args);
        match CommandName::from_name(name) {
            Some(name) => Self::Known { name, args },
            None => Self::Unclassified {
                name: name.to_ascii_lowercase(),
                args,
            },
        }
    }

    /// Parse `["SET", "k", "v"]`-style input.
    pub fn parse(parts: &[&str]) -> Result<Self> {
        let Some((name, args)) = parts.split_first() else {
            return Err(StoreError::Protocol("empty command".into()));
        };
        if name.is_empty() {
            return Err(StoreError::Protocol("empty command name".into()));
        }
        Ok(Self::raw(name, args))
    }

    pub fn get(key: impl AsRef<[u8]>) -> Self {
        Self::new(CommandName::Get, [key.as_ref()])
    }

    pub fn mget<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        Self::new(CommandName::Mget, keys)
    }

    pub fn set(key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Self {
        Self::new(CommandName::Set, [key.as_ref(), value.as_ref()])
    }

    pub fn setnx(key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Self {
        Self::new(CommandName::Setnx, [key.as_ref(), value.as_ref()])
    }

    pub fn setex(key: impl AsRef<[u8]>, seconds: u64, value: impl AsRef<[u8]>) -> Self {
        let seconds = seconds.to_string();
        Self::new(
            CommandName::Setex,
            [key.as_ref(), seconds.as_bytes(), value.as_ref()],
        )
    }

    pub fn del<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        Self::new(CommandName::Del, keys)
    }

    pub fn unlink<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        Self::new(CommandName::Unlink, keys)
    }

    pub fn expire(key: impl AsRef<[u8]>, seconds: u64) -> Self {
        let seconds = seconds.to_string();
        Self::new(CommandName::Expire, [key.as_ref(), seconds.as_bytes()])
    }

    pub fn incr(key: impl AsRef<[u8]>) -> Self {
        Self::new(CommandName::Incr, [key.as_ref()])
    }

    pub fn sadd<I, M>(key: impl AsRef<[u8]>, members: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: AsRef<[u8]>,
    {
        Self::with_key(CommandName::Sadd, key, members)
    }

    pub fn srem<I, M>(key: impl AsRef<[u8]>, members: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: AsRef<[u8]>,
    {
        Self::with_key(CommandName::Srem, key, members)
    }

    pub fn smembers(key: impl AsRef<[u8]>) -> Self {
        Self::new(CommandName::Smembers, [key.as_ref()])
    }

    pub fn scard(key: impl AsRef<[u8]>) -> Self {
        Self::new(CommandName::Scard, [key.as_ref()])
    }

    pub fn hset(key: impl AsRef<[u8]>, field: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Self {
        Self::new(
            CommandName::Hset,
            [key.as_ref(), field.as_ref(), value.as_ref()],
        )
    }

    pub fn hget(key: impl AsRef<[u8]>, field: impl AsRef<[u8]>) -> Self {
        Self::new(CommandName::Hget, [key.as_ref(), field.as_ref()])
    }

    pub fn flushdb() -> Self {
        Self::new(CommandName::Flushdb, std::iter::empty::<&[u8]>())
    }

    fn with_key<I, M>(name: CommandName, key: impl AsRef<[u8]>, rest: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: AsRef<[u8]>,
    {
        let mut args = vec![Bytes::copy_from_slice(key.as_ref())];
        args.extend(to_bytes(rest));
        Self::Known { name, args }
    }

    /// Lower-case verb.
    pub fn name(&self) -> &str {
        match self {
            Self::Known { name, .. } => name.as_str(),
            Self::Unclassified { name, .. } => name,
        }
    }

    pub fn args(&self) -> &[Bytes] {
        match self {
            Self::Known { args, .. } | Self::Unclassified { args, .. } => args,
        }
    }

    pub fn access(&self) -> Access {
        match self {
            Self::Known { name, .. } => name.access(),
            Self::Unclassified { .. } => Access::Unclassified,
        }
    }

    /// The known verb, if any.
    pub fn known(&self) -> Option<CommandName> {
        match self {
            Self::Known { name, .. } => Some(*name),
            Self::Unclassified { .. } => None,
        }
    }

    /// Key that decides which cluster node serves this command.
    pub fn routing_key(&self) -> Option<&[u8]> {
        let args = self.args();
        match self {
            Self::Known {
                name: CommandName::Flushdb,
                ..
            } => None,
            Self::Known {
                name: CommandName::Eval,
                ..
            } => {
                let numkeys: usize = std::str::from_utf8(args.get(1)?).ok()?.parse().ok()?;
                if numkeys == 0 {
                    return None;
                }
                args.get(2).map(|k| &k[..])
            }
            Self::Known { .. } => args.first().map(|k| &k[..]),
            Self::Unclassified { name, .. } => {
                if KEYLESS.contains(&name.as_str()) {
                    None
                } else {
                    args.first().map(|k| &k[..])
                }
            }
        }
    }

    /// Wire form: upper-case verb followed by the arguments.
    pub fn to_args(&self) -> Vec<Bytes> {
        let mut out = Vec::with_capacity(self.args().len() + 1);
        out.push(Bytes::from(self.name().to_ascii_uppercase()));
        out.extend(self.args().iter().cloned());
        out
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        for arg in self.args() {
            write!(f, " {}", String::from_utf8_lossy(arg))?;
        }
        Ok(())
    }
}

fn to_bytes<I, A>(args: I) -> Vec<Bytes>
where
    I: IntoIterator<Item = A>,
    A: AsRef<[u8]>,
{
    args.into_iter()
        .map(|a| Bytes::copy_from_slice(a.as_ref()))
        .collect()
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_tables() {
        for name in ["get", "mget", "smembers", "scard"] {
            assert_eq!(classify(name), Access::Read, "{name}");
        }
        for name in ["set", "setnx", "setex", "sadd", "srem", "del", "pipelined", "flushdb"] {
            assert_eq!(classify(name), Access::Write, "{name}");
        }
        assert_eq!(classify("multi"), Access::Write);
        assert_eq!(classify("publish"), Access::Unclassified);
        assert_eq!(classify(""), Access::Unclassified);
    }

    #[test]
    fn classify_ignores_case() {
        assert_eq!(classify("GET"), Access::Read);
        assert_eq!(classify("FlushDB"), Access::Write);
        assert_eq!(classify("Pipelined"), Access::Write);
    }

    #[test]
    fn names_round_trip() {
        for &name in CommandName::ALL {
            assert_eq!(CommandName::from_name(name.as_str()), Some(name));
            assert_ne!(name.access(), Access::Unclassified);
        }
    }

    #[test]
    fn block_commands_are_writes() {
        assert_eq!(BlockCommand::Pipelined.access(), Access::Write);
        assert_eq!(BlockCommand::Multi.access(), Access::Write);
        assert_eq!(classify(BlockCommand::Multi.as_str()), Access::Write);
    }

    #[test]
    fn parse_known_and_unknown() {
        let set = Command::parse(&["SET", "k", "v"]).unwrap();
        assert_eq!(set, Command::set("k", "v"));
        assert_eq!(set.access(), Access::Write);

        let publish = Command::parse(&["PUBLISH", "chan", "msg"]).unwrap();
        assert_eq!(publish.name(), "publish");
        assert_eq!(publish.access(), Access::Unclassified);
        assert_eq!(publish.known(), None);

        assert!(Command::parse(&[]).is_err());
        assert!(Command::parse(&[""]).is_err());
    }

    #[test]
    fn wire_args() {
        let cmd = Command::setex("k", 60, "v");
        assert_eq!(
            cmd.to_args(),
            vec![
                Bytes::from_static(b"SETEX"),
                Bytes::from_static(b"k"),
                Bytes::from_static(b"60"),
                Bytes::from_static(b"v"),
            ]
        );
        assert_eq!(Command::flushdb().to_args(), vec![Bytes::from_static(b"FLUSHDB")]);
    }

    #[test]
    fn routing_keys() {
        assert_eq!(Command::get("a").routing_key(), Some(&b"a"[..]));
        assert_eq!(Command::sadd("s", ["m"]).routing_key(), Some(&b"s"[..]));
        assert_eq!(Command::flushdb().routing_key(), None);

        let eval = Command::raw("EVAL", ["return 1", "1", "key"]);
        assert_eq!(eval.routing_key(), Some(&b"key"[..]));
        let eval_no_keys = Command::raw("eval", ["return 1", "0"]);
        assert_eq!(eval_no_keys.routing_key(), None);

        assert_eq!(Command::raw("PING", std::iter::empty::<&str>()).routing_key(), None);
        assert_eq!(
            Command::raw("lpush", ["list", "x"]).routing_key(),
            Some(&b"list"[..])
        );
    }

    #[test]
    fn display() {
        assert_eq!(Command::set("k", "v").to_string(), "set k v");
    }
}
