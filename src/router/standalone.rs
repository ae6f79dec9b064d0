//! Single-server store handle.
//!
//! Every call checks a connection out of the pool, writes the whole request
//! in one go and reads the replies back on the shared runtime.

use crate::command::Command;
use crate::config::ConnectionConfig;
use crate::connection::pool::ConnectionPool;
use crate::error::Result;
use crate::resp::types::RespValue;
use crate::runtime;
use crate::store::StoreHandle;

use bytes::Bytes;

/// [`StoreHandle`] for one Redis server.
pub struct StandaloneStore {
    pool: ConnectionPool,
    connection_id: String,
}

impl StandaloneStore {
    /// Connections are opened lazily on first use.
    pub fn new(config: ConnectionConfig) -> Self {
        let connection_id = config.connection_id();
        Self {
            pool: ConnectionPool::new(config),
            connection_id,
        }
    }

    /// Number of idle connections in the pool.
    pub fn pool_idle_count(&self) -> usize {
        self.pool.idle_count()
    }

    /// Number of connections that can still be checked out.
    pub fn pool_available(&self) -> usize {
        self.pool.available()
    }

    async fn roundtrip(&self, commands: &[Command]) -> Result<Vec<RespValue>> {
        let wire: Vec<Vec<Bytes>> = commands.iter().map(Command::to_args).collect();
        let mut guard = self.pool.get().await?;
        let result = guard.conn()?.execute_pipeline(&wire).await;
        if let Err(e) = &result {
            // Replies may still be in flight; the socket can't be reused.
            tracing::debug!(addr = %self.pool.addr(), error = %e, "discarding connection");
            guard.discard();
        }
        result
    }
}

impl StoreHandle for StandaloneStore {
    fn connection_id(&self) -> String {
        self.connection_id.clone()
    }

    fn execute(&self, command: &Command) -> Result<RespValue> {
        let mut replies = runtime::block_on(self.roundtrip(std::slice::from_ref(command)))?;
        replies
            .pop()
            .unwrap_or(RespValue::Null)
            .into_result()
    }

    fn pipeline(&self, commands: &[Command]) -> Result<Vec<RespValue>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        runtime::block_on(self.roundtrip(commands))
    }
}

// ── Tests ──────────────────────────────────────────────────────────
