//! Redis Cluster store handle.
//!
//! Routes commands to the node that owns the hash slot of their key.
//! Single commands follow MOVED and ASK redirections; pipelines are split per
//! node by [`cross_slot`](crate::cross_slot) and fall back to single commands
//! when the slot map turns out to be stale. Read commands may be served by
//! replicas, and the slot map is refreshed in the background.

use crate::command::{Access, Command};
use crate::config::{ConnectionConfig, Topology};
use crate::connection::pool::ConnectionPool;
use crate::connection::tcp::RedisConnection;
use crate::crc16::hash_slot;
use crate::cross_slot;
use crate::error::{RedisErrorKind, Result, StoreError};
use crate::resp::types::RespValue;
use crate::runtime;
use crate::store::{exec_replies, wrap_in_multi, ClusterClient, StoreHandle};

use bytes::Bytes;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Maximum number of MOVED/ASK redirects before giving up.
const MAX_REDIRECTS: usize = 5;

/// Background slot refresh interval.
const SLOT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Pause before retrying a TRYAGAIN reply.
const TRYAGAIN_DELAY: Duration = Duration::from_millis(50);

// ── Slot map ──────────────────────────────────────────────────────

/// A range of hash slots mapped to a master and zero or more replicas.
#[derive(Debug, Clone)]
struct SlotRange {
    start: u16,
    end: u16,
    master: String,
    replicas: Vec<String>,
}

/// Sorted slot ranges for binary-search lookup.
#[derive(Debug, Clone, Default)]
struct SlotMap {
    ranges: Vec<SlotRange>,
}

impl SlotMap {
    fn range_index(&self, slot: u16) -> Option<usize> {
        self.ranges
            .binary_search_by(|r| {
                if slot < r.start {
                    Ordering::Greater
                } else if slot > r.end {
                    Ordering::Less
                } else {
                    Ordering::Equal
                }
            })
            .ok()
    }

    fn master_for_slot(&self, slot: u16) -> Option<&str> {
        self.range_index(slot)
            .map(|i| self.ranges[i].master.as_str())
    }

    /// A replica for `slot`, spread by slot number. Falls back to master.
    fn replica_for_slot(&self, slot: u16) -> Option<&str> {
        self.range_index(slot).map(|i| {
            let range = &self.ranges[i];
            if range.replicas.is_empty() {
                range.master.as_str()
            } else {
                range.replicas[slot as usize % range.replicas.len()].as_str()
            }
        })
    }

    /// Any master, for keyless commands.
    fn any_master(&self) -> Option<&str> {
        self.ranges.first().map(|r| r.master.as_str())
    }

    /// Point `slot` at `addr` after a MOVED, splitting its range.
    fn update_slot_master(&mut self, slot: u16, addr: &str) {
        let moved = SlotRange {
            start: slot,
            end: slot,
            master: addr.to_string(),
            replicas: Vec::new(),
        };
        let Some(i) = self.range_index(slot) else {
            let at = self.ranges.partition_point(|r| r.end < slot);
            self.ranges.insert(at, moved);
            return;
        };
        if self.ranges[i].master == addr {
            return;
        }

        let old = self.ranges.remove(i);
        let mut parts = Vec::with_capacity(3);
        if old.start < slot {
            parts.push(SlotRange {
                end: slot - 1,
                ..old.clone()
            });
        }
        parts.push(moved);
        if slot < old.end {
            parts.push(SlotRange {
                start: slot + 1,
                ..old
            });
        }
        self.ranges.splice(i..i, parts);
    }

    /// Parse a `CLUSTER SLOTS` reply.
    fn from_cluster_slots(resp: &RespValue) -> Result<Self> {
        let RespValue::Array(slots) = resp else {
            return Err(StoreError::Cluster(format!(
                "CLUSTER SLOTS: expected array, got {}",
                resp.type_name()
            )));
        };

        let mut ranges = Vec::with_capacity(slots.len());
        for entry in slots {
            let RespValue::Array(items) = entry else {
                continue;
            };
            if items.len() < 3 {
                continue;
            }

            let start = slot_number(&items[0], "start")?;
            let end = slot_number(&items[1], "end")?;
            let master = parse_node_addr(&items[2])?;
            let replicas = items[3..]
                .iter()
                .filter_map(|node| parse_node_addr(node).ok())
                .collect();

            ranges.push(SlotRange {
                start,
                end,
                master,
                replicas,
            });
        }

        ranges.sort_by_key(|r| r.start);
        Ok(Self { ranges })
    }

    fn nodes(&self) -> impl Iterator<Item = (&str, bool)> {
        self.ranges.iter().flat_map(|r| {
            std::iter::once((r.master.as_str(), false))
                .chain(r.replicas.iter().map(|a| (a.as_str(), true)))
        })
    }
}

fn slot_number(value: &RespValue, which: &str) -> Result<u16> {
    value
        .as_int()
        .and_then(|n| u16::try_from(n).ok())
        .ok_or_else(|| StoreError::Cluster(format!("CLUSTER SLOTS: invalid slot {which}")))
}

/// `[host, port, ...]` into "host:port".
fn parse_node_addr(val: &RespValue) -> Result<String> {
    let RespValue::Array(items) = val else {
        return Err(StoreError::Cluster(
            "CLUSTER SLOTS: expected node array".into(),
        ));
    };
    if items.len() < 2 {
        return Err(StoreError::Cluster(
            "CLUSTER SLOTS: node array too short".into(),
        ));
    }
    let host = items[0]
        .as_str()
        .ok_or_else(|| StoreError::Cluster("CLUSTER SLOTS: invalid host".into()))?;
    let port = items[1]
        .as_int()
        .ok_or_else(|| StoreError::Cluster("CLUSTER SLOTS: invalid port".into()))?;
    Ok(format!("{host}:{port}"))
}

// ── ClusterRouter ─────────────────────────────────────────────────

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// [`StoreHandle`] for a Redis Cluster.
///
/// Keeps one connection pool per node, keyed by "host:port".
pub struct ClusterRouter {
    nodes: RwLock<HashMap<String, Arc<ConnectionPool>>>,
    slot_map: RwLock<SlotMap>,
    /// Template for per-node pools.
    config: ConnectionConfig,
    connection_id: String,
}

impl ClusterRouter {
    /// Fetch the slot map from the first reachable seed and start the
    /// background refresh.
    pub fn connect(config: ConnectionConfig) -> Result<Arc<Self>> {
        let seeds = match &config.topology {
            Topology::Cluster { nodes } if !nodes.is_empty() => nodes.clone(),
            _ => {
                return Err(StoreError::Cluster(
                    "at least one seed node is required".into(),
                ))
            }
        };

        let router = Arc::new(Self {
            nodes: RwLock::new(HashMap::new()),
            slot_map: RwLock::new(SlotMap::default()),
            connection_id: config.connection_id(),
            config,
        });

        runtime::block_on(router.bootstrap(&seeds))?;
        tracing::info!(
            connection = %router.connection_id,
            nodes = router.node_count(),
            "connected to redis cluster"
        );

        let weak = Arc::downgrade(&router);
        runtime::spawn(async move {
            loop {
                tokio::time::sleep(SLOT_REFRESH_INTERVAL).await;
                let Some(router) = weak.upgrade() else {
                    break;
                };
                let addr = router.slot_map.read().any_master().map(str::to_string);
                if let Some(addr) = addr {
                    if let Err(e) = router.refresh_slots_from(&addr).await {
                        tracing::warn!(addr = %addr, error = %e, "cluster slot refresh failed");
                    }
                }
            }
        });

        Ok(router)
    }

    async fn bootstrap(&self, seeds: &[(String, u16)]) -> Result<()> {
        let mut last_err = None;
        for (host, port) in seeds {
            let addr = format!("{host}:{port}");
            match self.refresh_slots_from(&addr).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::debug!(seed = %addr, error = %e, "cluster seed unavailable");
                    last_err = Some(e);
                }
            }
        }
        Err(StoreError::Cluster(format!(
            "could not connect to any seed node: {}",
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Number of nodes with a connection pool.
    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    async fn refresh_slots_from(&self, addr: &str) -> Result<()> {
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let mut conn = RedisConnection::connect(addr, timeout, self.config.max_buffer_size).await?;
        conn.set_read_timeout(self.config.read_timeout_ms);
        conn.init(
            self.config.username.as_deref(),
            self.config.password.as_deref(),
            0,
        )
        .await?;

        let resp = conn.execute(&["CLUSTER", "SLOTS"]).await?.into_result()?;
        let new_map = SlotMap::from_cluster_slots(&resp)?;
        if new_map.ranges.is_empty() {
            return Err(StoreError::Cluster(format!("{addr} reported no slots")));
        }

        {
            let mut nodes = self.nodes.write();
            for (node, replica) in new_map.nodes() {
                self.ensure_pool(&mut nodes, node, replica)?;
            }
        }
        tracing::debug!(addr, ranges = new_map.ranges.len(), "refreshed cluster slot map");
        *self.slot_map.write() = new_map;
        Ok(())
    }

    fn ensure_pool(
        &self,
        nodes: &mut HashMap<String, Arc<ConnectionPool>>,
        addr: &str,
        replica: bool,
    ) -> Result<()> {
        if nodes.contains_key(addr) {
            return Ok(());
        }
        let (host, port) = addr
            .rsplit_once(':')
            .and_then(|(h, p)| Some((h, p.parse::<u16>().ok()?)))
            .ok_or_else(|| StoreError::Cluster(format!("invalid node address: {addr}")))?;
        let mut cfg = self.config.clone();
        cfg.host = host.to_string();
        cfg.port = port;
        cfg.db = 0;
        cfg.readonly = replica;
        nodes.insert(addr.to_string(), Arc::new(ConnectionPool::new(cfg)));
        Ok(())
    }

    fn get_pool(&self, addr: &str) -> Result<Arc<ConnectionPool>> {
        if let Some(pool) = self.nodes.read().get(addr) {
            return Ok(pool.clone());
        }
        let mut nodes = self.nodes.write();
        self.ensure_pool(&mut nodes, addr, false)?;
        nodes
            .get(addr)
            .cloned()
            .ok_or_else(|| StoreError::Cluster(format!("no pool for node {addr}")))
    }

    /// Node that serves `command`.
    fn node_for(&self, command: &Command, allow_replica: bool) -> Result<String> {
        let map = self.slot_map.read();
        let node = match command.routing_key() {
            Some(key) => {
                let slot = hash_slot(key);
                let use_replica = allow_replica
                    && self.config.read_from_replicas
                    && command.access() == Access::Read;
                let node = if use_replica {
                    map.replica_for_slot(slot)
                } else {
                    map.master_for_slot(slot)
                };
                node.ok_or_else(|| StoreError::Cluster(format!("no node serves slot {slot}")))?
            }
            None => map
                .any_master()
                .ok_or_else(|| StoreError::Cluster("no node available for command".into()))?,
        };
        Ok(node.to_string())
    }

    /// Send `args` to `addr`, following redirects.
    fn execute_on<'a>(
        &'a self,
        addr: String,
        args: &'a [Bytes],
        redirects_left: usize,
    ) -> BoxFuture<'a, Result<RespValue>> {
        Box::pin(async move {
            let pool = self.get_pool(&addr)?;
            let result = {
                let mut guard = pool.get().await?;
                let reply = guard.conn()?.execute(args).await;
                if reply.is_err() {
                    guard.discard();
                }
                reply?
            };

            let RespValue::Error(msg) = &result else {
                return Ok(result);
            };
            match RedisErrorKind::from_error_msg(msg) {
                RedisErrorKind::Moved { slot, addr: target } => {
                    if redirects_left == 0 {
                        return Err(StoreError::Cluster("too many MOVED redirects".into()));
                    }
                    tracing::debug!(slot, from = %addr, to = %target, "MOVED");
                    self.slot_map.write().update_slot_master(slot, &target);
                    self.execute_on(target, args, redirects_left - 1).await
                }
                RedisErrorKind::Ask { slot, addr: target } => {
                    if redirects_left == 0 {
                        return Err(StoreError::Cluster("too many ASK redirects".into()));
                    }
                    tracing::debug!(slot, from = %addr, to = %target, "ASK");
                    self.ask(&target, args).await
                }
                RedisErrorKind::TryAgain if redirects_left > 0 => {
                    tokio::time::sleep(TRYAGAIN_DELAY).await;
                    self.execute_on(addr, args, redirects_left - 1).await
                }
                RedisErrorKind::ClusterDown => Err(StoreError::Cluster(msg.clone())),
                _ => Ok(result),
            }
        })
    }

    /// `ASKING` then the command, on the node importing the slot.
    async fn ask(&self, addr: &str, args: &[Bytes]) -> Result<RespValue> {
        let pool = self.get_pool(addr)?;
        let mut guard = pool.get().await?;
        let batch = [vec![Bytes::from_static(b"ASKING")], args.to_vec()];
        let result = guard.conn()?.execute_pipeline(&batch).await;
        match result {
            Ok(mut replies) => Ok(replies.pop().unwrap_or(RespValue::Null)),
            Err(e) => {
                guard.discard();
                Err(e)
            }
        }
    }

    async fn pipeline_on(&self, addr: &str, commands: &[Command]) -> Result<Vec<RespValue>> {
        let wire: Vec<Vec<Bytes>> = commands.iter().map(Command::to_args).collect();
        let pool = self.get_pool(addr)?;
        let mut guard = pool.get().await?;
        let result = guard.conn()?.execute_pipeline(&wire).await;
        if result.is_err() {
            guard.discard();
        }
        result
    }
}

impl StoreHandle for ClusterRouter {
    fn connection_id(&self) -> String {
        self.connection_id.clone()
    }

    fn execute(&self, command: &Command) -> Result<RespValue> {
        let addr = self.node_for(command, true)?;
        let args = command.to_args();
        runtime::block_on(self.execute_on(addr, &args, MAX_REDIRECTS))?.into_result()
    }

    fn pipeline(&self, commands: &[Command]) -> Result<Vec<RespValue>> {
        cross_slot::run(self, commands.iter().cloned())
    }

    /// All commands must live on one node.
    fn transaction(&self, commands: &[Command]) -> Result<Vec<RespValue>> {
        let nodes: BTreeSet<String> = commands
            .iter()
            .map(|c| self.node_for(c, false))
            .collect::<Result<_>>()?;
        let node = match nodes.len() {
            0 => return Ok(Vec::new()),
            1 => nodes.into_iter().next().unwrap_or_default(),
            _ => {
                return Err(StoreError::Cluster(format!(
                    "transaction keys span {} nodes",
                    nodes.len()
                )))
            }
        };
        let replies = runtime::block_on(self.pipeline_on(&node, &wrap_in_multi(commands)))?;
        exec_replies(replies)
    }

    fn cluster(&self) -> Option<&dyn ClusterClient> {
        Some(self)
    }
}

impl ClusterClient for ClusterRouter {
    fn node_key(&self, command: &Command) -> Result<String> {
        self.node_for(command, true)
    }

    /// Fails on the first MOVED/ASK reply. Every MOVED still updates the
    /// slot map so a retry goes straight to the new owner.
    fn pipeline_on_node(&self, node: &str, commands: &[Command]) -> Result<Vec<RespValue>> {
        let replies = runtime::block_on(self.pipeline_on(node, commands))?;
        let mut redirect = None;
        for reply in &replies {
            let RespValue::Error(msg) = reply else {
                continue;
            };
            match RedisErrorKind::from_error_msg(msg) {
                RedisErrorKind::Moved { slot, addr } => {
                    self.slot_map.write().update_slot_master(slot, &addr);
                }
                RedisErrorKind::Ask { .. } => {}
                _ => continue,
            }
            if redirect.is_none() {
                redirect = Some(msg.clone());
            }
        }
        match redirect {
            Some(msg) => Err(StoreError::redis(msg)),
            None => Ok(replies),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::mock;
    use crate::store::Commands;
    use parking_lot::Mutex;

    fn three_node_map() -> SlotMap {
        SlotMap {
            ranges: vec![
                SlotRange {
                    start: 0,
                    end: 5460,
                    master: "node1:6379".into(),
                    replicas: vec!["node1r:6379".into()],
                },
                SlotRange {
                    start: 5461,
                    end: 10922,
                    master: "node2:6379".into(),
                    replicas: vec![],
                },
                SlotRange {
                    start: 10923,
                    end: 16383,
                    master: "node3:6379".into(),
                    replicas: vec!["node3r:6379".into(), "node3r2:6379".into()],
                },
            ],
        }
    }

    // ── SlotMap ──

    #[test]
    fn slot_map_lookup() {
        let map = three_node_map();
        assert_eq!(map.master_for_slot(0), Some("node1:6379"));
        assert_eq!(map.master_for_slot(5460), Some("node1:6379"));
        assert_eq!(map.master_for_slot(5461), Some("node2:6379"));
        assert_eq!(map.master_for_slot(10923), Some("node3:6379"));
        assert_eq!(map.master_for_slot(16383), Some("node3:6379"));
        assert_eq!(SlotMap::default().master_for_slot(0), None);
    }

    #[test]
    fn slot_map_replicas() {
        let map = three_node_map();
        assert_eq!(map.replica_for_slot(100), Some("node1r:6379"));
        assert_eq!(map.replica_for_slot(6000), Some("node2:6379"));
        let r = map.replica_for_slot(11000);
        assert!(r == Some("node3r:6379") || r == Some("node3r2:6379"));
    }

    #[test]
    fn slot_map_update_master() {
        let mut map = three_node_map();
        map.update_slot_master(100, "new:6379");
        assert_eq!(map.master_for_slot(100), Some("new:6379"));
        assert_eq!(map.master_for_slot(99), Some("node1:6379"));
        assert_eq!(map.master_for_slot(101), Some("node1:6379"));
        assert_eq!(map.replica_for_slot(101), Some("node1r:6379"));
        assert_eq!(map.master_for_slot(6000), Some("node2:6379"));
        assert_eq!(map.ranges.len(), 5);

        map.update_slot_master(0, "edge:6379");
        assert_eq!(map.master_for_slot(0), Some("edge:6379"));
        assert_eq!(map.master_for_slot(1), Some("node1:6379"));
    }

    #[test]
    fn slot_map_update_unmapped_slot() {
        let mut map = SlotMap::default();
        map.update_slot_master(42, "n:1");
        assert_eq!(map.master_for_slot(42), Some("n:1"));
        assert_eq!(map.master_for_slot(41), None);
    }

    #[test]
    fn slot_map_from_cluster_slots() {
        let node = |port| {
            RespValue::Array(vec![
                RespValue::bulk("127.0.0.1"),
                RespValue::Integer(port),
            ])
        };
        let resp = RespValue::Array(vec![
            RespValue::Array(vec![
                RespValue::Integer(5461),
                RespValue::Integer(16383),
                node(7001),
            ]),
            RespValue::Array(vec![
                RespValue::Integer(0),
                RespValue::Integer(5460),
                node(7000),
                node(7003),
            ]),
        ]);

        let map = SlotMap::from_cluster_slots(&resp).unwrap();
        assert_eq!(map.ranges.len(), 2);
        assert_eq!(map.ranges[0].start, 0);
        assert_eq!(map.master_for_slot(0), Some("127.0.0.1:7000"));
        assert_eq!(map.master_for_slot(5461), Some("127.0.0.1:7001"));
        assert_eq!(map.replica_for_slot(0), Some("127.0.0.1:7003"));
        assert_eq!(map.nodes().count(), 3);
        assert_eq!(map.nodes().filter(|(_, replica)| *replica).count(), 1);
    }

    #[test]
    fn slot_map_rejects_non_array() {
        assert!(SlotMap::from_cluster_slots(&RespValue::Null).is_err());
    }

    // ── Against mock nodes ──

    /// `CLUSTER SLOTS` reply for `(start, end, "host:port")` ranges.
    fn slots_reply(ranges: &[(u16, u16, &str)]) -> String {
        let mut out = format!("*{}\r\n", ranges.len());
        for (start, end, addr) in ranges {
            let (host, port) = addr.rsplit_once(':').unwrap();
            out.push_str(&format!(
                "*3\r\n:{start}\r\n:{end}\r\n*2\r\n{}:{port}\r\n",
                mock::bulk(host)
            ));
        }
        out
    }

    fn cluster_config(seed: &str) -> ConnectionConfig {
        let url = format!("redis+cluster://{seed}");
        let mut config = ConnectionConfig::from_url(&url).unwrap();
        config.connect_timeout_ms = 1000;
        config.read_timeout_ms = 2000;
        config
    }

    /// Two mock nodes; "foo" (slot 12182) belongs to `b`, "bar" (slot 5061)
    /// to `a`. Each node prefixes values with its own tag.
    fn split_cluster() -> (String, String) {
        let (la, a) = mock::bind();
        let (lb, b) = mock::bind();
        let slots = slots_reply(&[(0, 8191, a.as_str()), (8192, 16383, b.as_str())]);
        for (listener, tag) in [(la, "a"), (lb, "b")] {
            let slots = slots.clone();
            mock::serve(listener, move |words| match words[0].as_str() {
                "CLUSTER" => slots.clone(),
                "GET" => mock::bulk(&format!("{tag}:{}", words[1])),
                "MULTI" => "+OK\r\n".into(),
                "EXEC" => "*0\r\n".into(),
                _ => "+QUEUED\r\n".into(),
            });
        }
        (a, b)
    }

    #[test]
    fn routes_by_slot() {
        let (a, _b) = split_cluster();
        let router = ClusterRouter::connect(cluster_config(&a)).unwrap();
        assert_eq!(router.node_count(), 2);
        assert_eq!(router.get("foo").unwrap(), Some(Bytes::from_static(b"b:foo")));
        assert_eq!(router.get("bar").unwrap(), Some(Bytes::from_static(b"a:bar")));
    }

    #[test]
    fn cross_slot_pipeline_keeps_call_order() {
        let (a, _b) = split_cluster();
        let router = ClusterRouter::connect(cluster_config(&a)).unwrap();
        let replies = router
            .pipeline(&[Command::get("foo"), Command::get("bar"), Command::get("foo")])
            .unwrap();
        assert_eq!(
            replies,
            vec![
                RespValue::bulk("b:foo"),
                RespValue::bulk("a:bar"),
                RespValue::bulk("b:foo"),
            ]
        );
    }

    #[test]
    fn transaction_must_stay_on_one_node() {
        let (a, _b) = split_cluster();
        let router = ClusterRouter::connect(cluster_config(&a)).unwrap();
        let err = router
            .transaction(&[Command::incr("foo"), Command::incr("bar")])
            .unwrap_err();
        assert!(matches!(err, StoreError::Cluster(_)));
        assert!(router.transaction(&[Command::incr("foo")]).unwrap().is_empty());
    }

    /// `a` claims every slot but has handed "foo" to `b`.
    fn stale_cluster(redirect: &'static str) -> (String, String, Arc<Mutex<Vec<String>>>) {
        let (la, a) = mock::bind();
        let (lb, b) = mock::bind();
        let slots = slots_reply(&[(0, 16383, a.as_str())]);
        let b_seen: Arc<Mutex<Vec<String>>> = Arc::default();

        let target = b.clone();
        mock::serve(la, move |words| match words[0].as_str() {
            "CLUSTER" => slots.clone(),
            "GET" if words[1] == "foo" => format!("-{redirect} 12182 {target}\r\n"),
            "GET" => mock::bulk(&format!("a:{}", words[1])),
            _ => "-ERR unexpected\r\n".into(),
        });
        let seen = b_seen.clone();
        mock::serve(lb, move |words| {
            seen.lock().push(words[0].clone());
            match words[0].as_str() {
                "ASKING" => "+OK\r\n".into(),
                "GET" => mock::bulk(&format!("b:{}", words[1])),
                _ => "-ERR unexpected\r\n".into(),
            }
        });
        (a, b, b_seen)
    }

    #[test]
    fn execute_follows_moved_and_remembers_it() {
        let (a, b, _) = stale_cluster("MOVED");
        let router = ClusterRouter::connect(cluster_config(&a)).unwrap();

        assert_eq!(router.get("foo").unwrap(), Some(Bytes::from_static(b"b:foo")));
        assert_eq!(router.node_key(&Command::get("foo")).unwrap(), b);
        assert_eq!(router.node_key(&Command::get("bar")).unwrap(), a);
    }

    #[test]
    fn execute_follows_ask_without_remapping() {
        let (a, _b, b_seen) = stale_cluster("ASK");
        let router = ClusterRouter::connect(cluster_config(&a)).unwrap();

        assert_eq!(router.get("foo").unwrap(), Some(Bytes::from_static(b"b:foo")));
        assert_eq!(*b_seen.lock(), ["ASKING", "GET"]);
        assert_eq!(router.node_key(&Command::get("foo")).unwrap(), a);
    }

    #[test]
    fn redirect_mid_pipeline_retries_sequentially() {
        let (a, _b, _) = stale_cluster("MOVED");
        let router = ClusterRouter::connect(cluster_config(&a)).unwrap();

        let replies = router
            .pipeline(&[Command::get("bar"), Command::get("zap"), Command::get("foo")])
            .unwrap();
        assert_eq!(
            replies,
            vec![
                RespValue::bulk("a:bar"),
                RespValue::bulk("a:zap"),
                RespValue::bulk("b:foo"),
            ]
        );

        let err = router
            .pipeline_on_node(&a, &[Command::get("bar"), Command::get("foo")])
            .unwrap_err();
        assert!(err.is_moved());
    }

    #[test]
    fn no_reachable_seed() {
        let config = cluster_config("127.0.0.1:1");
        assert!(matches!(
            ClusterRouter::connect(config),
            Err(StoreError::Cluster(_))
        ));
    }
}
