//! Connection configuration and URL parsing.
//!
//! Supported URL schemes:
//! - `redis://[user:pass@]host[:port][/db]`                    — standalone
//! - `rediss://[user:pass@]host[:port][/db]`                   — standalone + TLS
//! - `redis+cluster://[user:pass@]host[:port][,host[:port]…]`  — cluster
//! - `rediss+cluster://…`                                      — cluster + TLS

use crate::error::{Result, StoreError};

/// Default Redis port.
pub const DEFAULT_PORT: u16 = 6379;

/// How to reach the server(s).
#[derive(Debug, Clone, PartialEq)]
pub enum Topology {
    /// Single Redis server.
    Standalone,
    /// Redis Cluster (seed nodes).
    Cluster { nodes: Vec<(String, u16)> },
}

/// Full connection configuration for one physical store.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Standalone host, or the first cluster seed.
    pub host: String,
    pub port: u16,
    /// Optional username (Redis 6+ ACL).
    pub username: Option<String>,
    pub password: Option<String>,
    /// Database index; always 0 for cluster.
    pub db: u16,
    pub tls: bool,
    pub topology: Topology,
    /// Connections per endpoint.
    pub pool_size: usize,
    pub connect_timeout_ms: u64,
    /// Per-response timeout (0 = wait forever).
    pub read_timeout_ms: u64,
    /// Connections idle longer than this are dropped.
    pub idle_timeout_ms: u64,
    /// Maximum read buffer size per connection in bytes.
    pub max_buffer_size: usize,
    /// Cluster only: serve read commands from replicas.
    pub read_from_replicas: bool,
    /// Send `READONLY` on every new connection (set per replica pool).
    pub readonly: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            db: 0,
            tls: false,
            topology: Topology::Standalone,
            pool_size: 8,
            connect_timeout_ms: 5000,
            read_timeout_ms: 30_000,
            idle_timeout_ms: 300_000,
            max_buffer_size: crate::connection::tcp::DEFAULT_MAX_BUF_SIZE,
            read_from_replicas: false,
            readonly: false,
        }
    }
}

impl ConnectionConfig {
    /// Parse a Redis URL into a ConnectionConfig.
    pub fn from_url(url: &str) -> Result<Self> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| StoreError::Config(format!("invalid URL, missing ://: {url}")))?;

        let mut config = Self::default();
        let cluster = match scheme {
            "redis" => false,
            "rediss" => {
                config.tls = true;
                false
            }
            "redis+cluster" => true,
            "rediss+cluster" => {
                config.tls = true;
                true
            }
            _ => return Err(StoreError::Config(format!("unknown URL scheme: {scheme}"))),
        };

        let (authority, db) = split_path(rest);
        if let Some(db) = db {
            config.db = db
                .parse()
                .map_err(|_| StoreError::Config(format!("invalid db number: {db}")))?;
        }

        let hosts = match authority.rsplit_once('@') {
            Some((userinfo, hosts)) => {
                let (username, password) = parse_userinfo(userinfo);
                config.username = username;
                config.password = password;
                hosts
            }
            None => authority,
        };

        if cluster {
            let nodes = hosts
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(parse_host_port)
                .collect::<Result<Vec<_>>>()?;
            let Some((host, port)) = nodes.first().cloned() else {
                return Err(StoreError::Config(
                    "cluster URL must include at least one node".into(),
                ));
            };
            config.host = host;
            config.port = port;
            config.db = 0;
            config.topology = Topology::Cluster { nodes };
        } else {
            let (host, port) = parse_host_port(hosts)?;
            config.host = host;
            config.port = port;
        }
        Ok(config)
    }

    /// Return the primary address as "host:port".
    pub fn primary_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Identity of the physical deployment these settings point at. Two
    /// configs with the same id talk to the same data.
    pub fn connection_id(&self) -> String {
        match &self.topology {
            Topology::Standalone => format!("redis://{}:{}/{}", self.host, self.port, self.db),
            Topology::Cluster { nodes } => {
                let mut seeds: Vec<String> = nodes.iter().map(|(h, p)| format!("{h}:{p}")).collect();
                seeds.sort();
                format!("redis+cluster://{}", seeds.join(","))
            }
        }
    }

    /// True when this config targets a Redis Cluster.
    pub fn is_cluster(&self) -> bool {
        matches!(self.topology, Topology::Cluster { .. })
    }
}

// ── URL parsing helpers ────────────────────────────────────────────

/// Split `rest` into (authority, Some(db)) or (rest, None).
fn split_path(rest: &str) -> (&str, Option<&str>) {
    match rest.split_once('/') {
        Some((before, after)) if !after.is_empty() => (before, Some(after)),
        Some((before, _)) => (before, None),
        None => (rest, None),
    }
}

/// `user:pass`, `:pass`, or a bare password.
fn parse_userinfo(userinfo: &str) -> (Option<String>, Option<String>) {
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
    match userinfo.split_once(':') {
        Some((user, pass)) => (non_empty(user), non_empty(pass)),
        None => (None, non_empty(userinfo)),
    }
}

/// `host[:port]`, `[ipv6]:port`, or bare IPv6.
fn parse_host_port(s: &str) -> Result<(String, u16)> {
    let (host, port) = if let Some(bracketed) = s.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| StoreError::Config(format!("unclosed IPv6 bracket: {s}")))?;
        let port = match after.strip_prefix(':') {
            Some(p) => parse_port(p)?,
            None => DEFAULT_PORT,
        };
        (host.to_string(), port)
    } else if let Some((h, p)) = s.rsplit_once(':') {
        match p.parse::<u16>() {
            Ok(port) => (h.to_string(), port),
            Err(_) if h.contains(':') => (s.to_string(), DEFAULT_PORT),
            Err(_) => return Err(StoreError::Config(format!("invalid port: {p}"))),
        }
    } else {
        (s.to_string(), DEFAULT_PORT)
    };

    let host = if host.is_empty() {
        "127.0.0.1".to_string()
    } else {
        host
    };
    Ok((host, port))
}

fn parse_port(p: &str) -> Result<u16> {
    p.parse()
        .map_err(|_| StoreError::Config(format!("invalid port: {p}")))
}

// ── Tests ──────────────────────────────────────────────────────────
