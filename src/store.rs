//! The handle contract every backing store implements.
//!
//! A [`StoreHandle`] is synchronous: a call blocks until the store replies or
//! the transport gives up. `Ok(RespValue::Null)` means "key absent" and is
//! never confused with `Err`, which means the call itself failed.

use crate::command::Command;
use crate::error::{Result, StoreError};
use crate::resp::types::RespValue;
use bytes::Bytes;

/// One physical store (or something that behaves like one).
pub trait StoreHandle: Send + Sync {
    /// Identity of the physical deployment behind this handle. Two handles
    /// with equal ids read and write the same data.
    fn connection_id(&self) -> String;

    /// Run one command. A server error reply comes back as
    /// `Err(StoreError::Redis { .. })`.
    fn execute(&self, command: &Command) -> Result<RespValue>;

    /// Run a batch and return one reply per command, in order. Server error
    /// replies stay in-band as [`RespValue::Error`].
    fn pipeline(&self, commands: &[Command]) -> Result<Vec<RespValue>>;

    /// Run a batch inside MULTI/EXEC and return the EXEC replies.
    fn transaction(&self, commands: &[Command]) -> Result<Vec<RespValue>> {
        exec_replies(self.pipeline(&wrap_in_multi(commands))?)
    }

    /// Cluster routing hooks, when this handle talks to a Redis Cluster.
    fn cluster(&self) -> Option<&dyn ClusterClient> {
        None
    }
}

/// Node-level access to a Redis Cluster, used for cross-slot pipelines.
pub trait ClusterClient: Send + Sync {
    /// Node that would serve `command` if it were sent on its own.
    fn node_key(&self, command: &Command) -> Result<String>;

    /// Send `commands` as one pipeline to `node`. Fails with a redirect error
    /// if the node no longer owns a slot.
    fn pipeline_on_node(&self, node: &str, commands: &[Command]) -> Result<Vec<RespValue>>;
}

/// `MULTI`, the commands, `EXEC`.
pub(crate) fn wrap_in_multi(commands: &[Command]) -> Vec<Command> {
    let mut batch = Vec::with_capacity(commands.len() + 2);
    batch.push(Command::raw("MULTI", std::iter::empty::<&[u8]>()));
    batch.extend(commands.iter().cloned());
    batch.push(Command::raw("EXEC", std::iter::empty::<&[u8]>()));
    batch
}

/// Pull the EXEC result out of a [`wrap_in_multi`] pipeline's replies.
pub(crate) fn exec_replies(mut replies: Vec<RespValue>) -> Result<Vec<RespValue>> {
    if let Some(RespValue::Error(msg)) = replies.first() {
        return Err(StoreError::redis(msg.clone()));
    }
    match replies.pop() {
        Some(RespValue::Array(items)) => Ok(items),
        Some(RespValue::Null) => Err(StoreError::TransactionAborted),
        Some(RespValue::Error(msg)) => Err(StoreError::redis(msg)),
        Some(other) => Err(StoreError::Protocol(format!(
            "unexpected EXEC reply: {}",
            other.type_name()
        ))),
        None => Err(StoreError::Protocol("empty transaction reply".into())),
    }
}

// ── Typed helpers ──────────────────────────────────────────────────

/// Typed wrappers over [`StoreHandle::execute`] for the common verbs.
pub trait Commands: StoreHandle {
    fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        bulk_or_nil(self.execute(&Command::get(key))?)
    }

    fn mget<I, K>(&self, keys: I) -> Result<Vec<Option<Bytes>>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        match self.execute(&Command::mget(keys))? {
            RespValue::Array(items) => items.into_iter().map(bulk_or_nil).collect(),
            other => Err(unexpected("MGET", &other)),
        }
    }

    fn set(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.execute(&Command::set(key, value)).map(drop)
    }

    fn setex(&self, key: impl AsRef<[u8]>, seconds: u64, value: impl AsRef<[u8]>) -> Result<()> {
        self.execute(&Command::setex(key, seconds, value)).map(drop)
    }

    fn setnx(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<bool> {
        integer(self.execute(&Command::setnx(key, value))?, "SETNX").map(|n| n == 1)
    }

    fn del<I, K>(&self, keys: I) -> Result<i64>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        integer(self.execute(&Command::del(keys))?, "DEL")
    }

    fn expire(&self, key: impl AsRef<[u8]>, seconds: u64) -> Result<bool> {
        integer(self.execute(&Command::expire(key, seconds))?, "EXPIRE").map(|n| n == 1)
    }

    fn sadd<I, M>(&self, key: impl AsRef<[u8]>, members: I) -> Result<i64>
    where
        I: IntoIterator<Item = M>,
        M: AsRef<[u8]>,
    {
        integer(self.execute(&Command::sadd(key, members))?, "SADD")
    }

    fn srem<I, M>(&self, key: impl AsRef<[u8]>, members: I) -> Result<i64>
    where
        I: IntoIterator<Item = M>,
        M: AsRef<[u8]>,
    {
        integer(self.execute(&Command::srem(key, members))?, "SREM")
    }

    fn smembers(&self, key: impl AsRef<[u8]>) -> Result<Vec<Bytes>> {
        match self.execute(&Command::smembers(key))? {
            RespValue::Array(items) => items
                .into_iter()
                .map(|v| bulk_or_nil(v)?.ok_or_else(|| unexpected("SMEMBERS", &RespValue::Null)))
                .collect(),
            // A nil from a fallback read means neither store had the set.
            RespValue::Null => Ok(Vec::new()),
            other => Err(unexpected("SMEMBERS", &other)),
        }
    }

    fn scard(&self, key: impl AsRef<[u8]>) -> Result<i64> {
        integer(self.execute(&Command::scard(key))?, "SCARD")
    }

    fn flushdb(&self) -> Result<()> {
        self.execute(&Command::flushdb()).map(drop)
    }
}

impl<T: StoreHandle + ?Sized> Commands for T {}

fn bulk_or_nil(value: RespValue) -> Result<Option<Bytes>> {
    match value {
        RespValue::BulkString(b) => Ok(Some(b)),
        RespValue::SimpleString(s) => Ok(Some(Bytes::from(s))),
        RespValue::Null => Ok(None),
        other => Err(unexpected("bulk string", &other)),
    }
}

fn integer(value: RespValue, what: &str) -> Result<i64> {
    value.as_int().ok_or_else(|| unexpected(what, &value))
}

fn unexpected(what: &str, value: &RespValue) -> StoreError {
    StoreError::Protocol(format!("unexpected {what} reply: {}", value.type_name()))
}

// ── Tests ──────────────────────────────────────────────────────────
