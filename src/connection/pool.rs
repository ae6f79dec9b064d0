//! Async connection pool for one Redis endpoint.
//!
//! A semaphore bounds the number of checked-out connections; idle ones sit in
//! a deque behind a `parking_lot::Mutex` so they can be returned from `Drop`.

use crate::config::ConnectionConfig;
use crate::connection::tcp::RedisConnection;
use crate::error::{Result, StoreError};

use parking_lot::Mutex as SyncMutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};

/// An async connection pool for one Redis node.
pub struct ConnectionPool {
    /// Idle connections, most recently returned last. Locked only briefly.
    idle: SyncMutex<VecDeque<RedisConnection>>,
    /// One permit per connection that may be checked out.
    semaphore: Semaphore,
    /// Node address, credentials and timeouts for new connections.
    config: ConnectionConfig,
    /// Upper bound on open connections, never below one.
    max_size: usize,
    /// Idle connections older than this are closed instead of reused.
    idle_timeout: Duration,
}

impl ConnectionPool {
    /// Create a new connection pool from config.
    pub fn new(config: ConnectionConfig) -> Self {
        let max_size = config.pool_size.max(1);
        let idle_timeout = Duration::from_millis(config.idle_timeout_ms);
        Self {
            idle: SyncMutex::new(VecDeque::with_capacity(max_size)),
            semaphore: Semaphore::new(max_size),
            config,
            max_size,
            idle_timeout,
        }
    }

    /// Check out a connection; it goes back to the pool when the guard drops.
    pub async fn get(&self) -> Result<PoolGuard<'_>> {
        let permit = self.semaphore.acquire().await.map_err(|_| {
            StoreError::Connection(std::io::Error::new(
                std::io::ErrorKind::Other,
                "pool semaphore closed",
            ))
        })?;

        let reused = {
            let mut idle = self.idle.lock();
            self.take_healthy_connection(&mut idle)
        };
        let conn = match reused {
            Some(c) => c,
            None => self.create_connection().await?,
        };

        Ok(PoolGuard {
            conn: Some(conn),
            pool: self,
            _permit: permit,
        })
    }

    /// Endpoint this pool connects to, as "host:port".
    pub fn addr(&self) -> String {
        self.config.primary_addr()
    }

    /// Return the number of currently idle connections.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Number of connections that can still be checked out right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    async fn create_connection(&self) -> Result<RedisConnection> {
        if self.config.tls {
            return Err(StoreError::Config(
                "TLS connections (rediss://) are not supported by this client".into(),
            ));
        }

        let addr = self.config.primary_addr();
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let mut conn = RedisConnection::connect(&addr, timeout, self.config.max_buffer_size).await?;
        conn.set_read_timeout(self.config.read_timeout_ms);
        conn.init(
            self.config.username.as_deref(),
            self.config.password.as_deref(),
            self.config.db,
        )
        .await?;
        if self.config.readonly {
            conn.enable_replica_reads().await?;
        }
        tracing::debug!(addr = %addr, readonly = self.config.readonly, "opened redis connection");
        Ok(conn)
    }

    /// LIFO pop, skipping connections that sat idle too long.
    fn take_healthy_connection(
        &self,
        idle: &mut VecDeque<RedisConnection>,
    ) -> Option<RedisConnection> {
        while let Some(conn) = idle.pop_back() {
            if conn.last_used.elapsed() <= self.idle_timeout {
                return Some(conn);
            }
        }
        None
    }

    fn return_connection(&self, conn: RedisConnection) {
        if conn.last_used.elapsed() > self.idle_timeout {
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() < self.max_size {
            idle.push_back(conn);
        }
    }
}

/// RAII guard that returns the connection to the pool on drop.
pub struct PoolGuard<'a> {
    conn: Option<RedisConnection>,
    pool: &'a ConnectionPool,
    _permit: SemaphorePermit<'a>,
}

impl PoolGuard<'_> {
    /// Access the underlying connection.
    pub fn conn(&mut self) -> Result<&mut RedisConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| StoreError::Protocol("connection already discarded".into()))
    }

    /// Drop the connection instead of returning it, e.g. after a protocol
    /// error left unread replies on the socket.
    pub fn discard(mut self) {
        self.conn.take();
    }
}

impl Drop for PoolGuard<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.return_connection(conn);
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resp::types::RespValue;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Mock server answering every read with +OK.
    async fn mock_redis_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    while let Ok(n) = socket.read(&mut buf).await {
                        if n == 0 || socket.write_all(b"+OK\r\n").await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        addr
    }

    fn test_config(addr: &str) -> ConnectionConfig {
        let (host, port) = addr.rsplit_once(':').unwrap();
        ConnectionConfig {
            host: host.to_string(),
            port: port.parse().unwrap(),
            pool_size: 3,
            connect_timeout_ms: 1000,
            idle_timeout_ms: 60_000,
            ..ConnectionConfig::default()
        }
    }

    #[tokio::test]
    async fn get_and_release() {
        let addr = mock_redis_server().await;
        let pool = ConnectionPool::new(test_config(&addr));
        assert_eq!(pool.available(), 3);

        let mut guard = pool.get().await.unwrap();
        assert_eq!(pool.available(), 2);
        let reply = guard.conn().unwrap().execute(&["PING"]).await.unwrap();
        assert_eq!(reply, RespValue::ok());

        drop(guard);
        assert_eq!(pool.available(), 3);
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn reuses_idle_connection() {
        let addr = mock_redis_server().await;
        let pool = ConnectionPool::new(test_config(&addr));

        drop(pool.get().await.unwrap());
        assert_eq!(pool.idle_count(), 1);
        {
            let _guard = pool.get().await.unwrap();
            assert_eq!(pool.idle_count(), 0);
        }
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn bounded_checkouts() {
        let addr = mock_redis_server().await;
        let pool = ConnectionPool::new(test_config(&addr));

        let g1 = pool.get().await.unwrap();
        let _g2 = pool.get().await.unwrap();
        let _g3 = pool.get().await.unwrap();
        assert_eq!(pool.available(), 0);

        let blocked = tokio::time::timeout(Duration::from_millis(50), pool.get()).await;
        assert!(blocked.is_err());

        drop(g1);
        assert!(pool.get().await.is_ok());
    }

    #[tokio::test]
    async fn discard_does_not_return() {
        let addr = mock_redis_server().await;
        let pool = ConnectionPool::new(test_config(&addr));
        pool.get().await.unwrap().discard();
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.available(), 3);
    }

    #[tokio::test]
    async fn tls_is_rejected() {
        let mut config = test_config("127.0.0.1:6379");
        config.tls = true;
        let pool = ConnectionPool::new(config);
        assert!(matches!(pool.get().await, Err(StoreError::Config(_))));
    }

    #[tokio::test]
    async fn connect_failure() {
        let config = ConnectionConfig {
            port: 1,
            pool_size: 1,
            connect_timeout_ms: 100,
            ..ConnectionConfig::default()
        };
        let pool = ConnectionPool::new(config);
        assert!(pool.get().await.is_err());
    }
}
