//! Async TCP connection to a single Redis server.
//!
//! Wraps a `tokio::net::TcpStream` with a read buffer and the RESP parser.

use crate::error::{Result, StoreError};
use crate::resp::parser::parse;
use crate::resp::types::RespValue;
use crate::resp::writer::{encode_command, encode_pipeline};

use bytes::BytesMut;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Initial read buffer capacity (16 KB).
const DEFAULT_BUF_CAPACITY: usize = 16 * 1024;

/// Default maximum read buffer size (512 MB).
pub const DEFAULT_MAX_BUF_SIZE: usize = 512 * 1024 * 1024;

/// A single async connection to a Redis server.
pub struct RedisConnection {
    stream: TcpStream,
    /// Bytes read from the socket but not yet consumed by the parser.
    buf: BytesMut,
    max_buf_size: usize,
    /// Zero disables the per-read timeout.
    read_timeout: Duration,
    /// Timestamp of last successful I/O (for idle checks).
    pub last_used: Instant,
}

impl RedisConnection {
    /// Connect to `addr` (e.g. "127.0.0.1:6379") within `timeout`.
    pub async fn connect(addr: &str, timeout: Duration, max_buf_size: usize) -> Result<Self> {
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(stream) => stream?,
            Err(_) => {
                return Err(StoreError::Timeout(format!(
                    "connection to {addr} timed out after {timeout:?}"
                )))
            }
        };
        stream.set_nodelay(true).ok();
        Ok(Self {
            stream,
            buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            max_buf_size,
            read_timeout: Duration::ZERO,
            last_used: Instant::now(),
        })
    }

    /// Bound how long a single response may take to arrive.
    pub fn set_read_timeout(&mut self, millis: u64) {
        self.read_timeout = Duration::from_millis(millis);
    }

    /// Send raw bytes to the server.
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.last_used = Instant::now();
        Ok(())
    }

    /// Read and parse one complete RESP value from the server.
    pub async fn read_response(&mut self) -> Result<RespValue> {
        if self.read_timeout.is_zero() {
            return self.read_frame().await;
        }
        match tokio::time::timeout(self.read_timeout, self.read_frame()).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(format!(
                "no response within {:?}",
                self.read_timeout
            ))),
        }
    }

    async fn read_frame(&mut self) -> Result<RespValue> {
        loop {
            if !self.buf.is_empty() {
                let snapshot = self.buf.split().freeze();
                match parse(&snapshot) {
                    Ok((value, consumed)) => {
                        self.buf.extend_from_slice(&snapshot[consumed..]);
                        self.last_used = Instant::now();
                        return Ok(value);
                    }
                    Err(StoreError::Incomplete) => self.buf.extend_from_slice(&snapshot),
                    Err(e) => return Err(e),
                }
            }

            if self.buf.len() >= self.max_buf_size {
                return Err(StoreError::Protocol(format!(
                    "RESP message too large: buffer would exceed {} bytes",
                    self.max_buf_size
                )));
            }
            self.buf.reserve(DEFAULT_BUF_CAPACITY);
            let n = self.stream.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(StoreError::Connection(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                )));
            }
        }
    }

    /// Send a command and read the response.
    pub async fn execute<A: AsRef<[u8]>>(&mut self, args: &[A]) -> Result<RespValue> {
        self.send_raw(&encode_command(args)).await?;
        self.read_response().await
    }

    /// Send a batch in one write and read one reply per command.
    pub async fn execute_pipeline<A: AsRef<[u8]>>(
        &mut self,
        commands: &[Vec<A>],
    ) -> Result<Vec<RespValue>> {
        self.send_raw(&encode_pipeline(commands)).await?;
        let mut replies = Vec::with_capacity(commands.len());
        for _ in commands {
            replies.push(self.read_response().await?);
        }
        Ok(replies)
    }

    /// Authenticate and select the database.
    pub async fn init(
        &mut self,
        username: Option<&str>,
        password: Option<&str>,
        db: u16,
    ) -> Result<()> {
        if let Some(pass) = password {
            let reply = match username {
                Some(user) => self.execute(&["AUTH", user, pass]).await?,
                None => self.execute(&["AUTH", pass]).await?,
            };
            expect_ok("AUTH", reply)?;
        }
        if db != 0 {
            let db = db.to_string();
            let reply = self.execute(&["SELECT", db.as_str()]).await?;
            expect_ok("SELECT", reply)?;
        }
        Ok(())
    }

    /// Allow reads on a cluster replica (`READONLY`).
    pub async fn enable_replica_reads(&mut self) -> Result<()> {
        let reply = self.execute(&["READONLY"]).await?;
        expect_ok("READONLY", reply)
    }
}

fn expect_ok(command: &str, reply: RespValue) -> Result<()> {
    match reply {
        RespValue::SimpleString(ref s) if s == "OK" => Ok(()),
        RespValue::Error(msg) => Err(StoreError::redis(msg)),
        other => Err(StoreError::Protocol(format!(
            "unexpected {command} response: {}",
            other.type_name()
        ))),
    }
}

// ── Tests ──────────────────────────────────────────────────────────
