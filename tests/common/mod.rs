//! Shared helpers for integration tests.
//!
//! Everything here runs in-process: [`MemoryStore`] stands in for a Redis
//! server and [`FakeCluster`] for a Redis Cluster. The live tests talk to a
//! real server at `REDIS_URL` and skip themselves when none is reachable.

#![allow(dead_code)]

use multistore::crc16::{hash_slot, SLOT_COUNT};
use multistore::cross_slot;
use multistore::{
    ClusterClient, Command, ConnectionConfig, DualStoreMode, MemoryStore, ModeProvider,
    MultiStore, MultiStoreMetrics, RespValue, Result, StandaloneStore, StoreError, StoreHandle,
};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Global counter for generating unique key prefixes per test.
static TEST_ID: AtomicUsize = AtomicUsize::new(0);

/// Return a unique prefix for test keys to avoid collisions between tests.
pub fn test_prefix() -> String {
    let id = TEST_ID.fetch_add(1, Ordering::Relaxed);
    format!("multistore_test_{}_{}", std::process::id(), id)
}

/// A dual store over two fresh memory stores.
pub struct Pair {
    pub store: MultiStore,
    pub primary: MemoryStore,
    pub secondary: MemoryStore,
}

impl Pair {
    pub fn metrics(&self) -> &MultiStoreMetrics {
        self.store.metrics()
    }
}

pub fn pair() -> Pair {
    pair_with_mode(Arc::new(DualStoreMode::Enabled))
}

pub fn pair_with_mode(mode: Arc<dyn ModeProvider>) -> Pair {
    let primary = MemoryStore::new("memory://primary");
    let secondary = MemoryStore::new("memory://secondary");
    let store = MultiStore::builder()
        .primary(Arc::new(primary.clone()))
        .secondary(Arc::new(secondary.clone()))
        .instance_name("test_store")
        .mode(mode)
        .build()
        .expect("valid pair");
    Pair {
        store,
        primary,
        secondary,
    }
}

// ── Fake cluster ───────────────────────────────────────────────────

/// In-process cluster: slots are split evenly across memory-backed nodes.
///
/// [`make_stale`](Self::make_stale) makes the routing table wrong for one
/// key, so the next pipeline that touches it gets a MOVED reply.
pub struct FakeCluster {
    nodes: Vec<(String, MemoryStore)>,
    /// Slots whose routing points at the wrong node.
    stale: Mutex<HashMap<u16, String>>,
    /// `(node, batch size)` for every per-node pipeline.
    batches: Mutex<Vec<(String, usize)>>,
}

impl FakeCluster {
    pub fn new(node_count: usize) -> Self {
        let nodes = (0..node_count)
            .map(|i| {
                let id = format!("10.0.0.{}:7000", i + 1);
                (id.clone(), MemoryStore::new(id))
            })
            .collect();
        Self {
            nodes,
            stale: Mutex::new(HashMap::new()),
            batches: Mutex::new(Vec::new()),
        }
    }

    /// Node that really owns `slot`.
    pub fn owner(&self, slot: u16) -> &(String, MemoryStore) {
        let index = slot as usize * self.nodes.len() / SLOT_COUNT as usize;
        &self.nodes[index]
    }

    /// Store behind the node that owns `key`.
    pub fn node_for_key(&self, key: &str) -> &MemoryStore {
        &self.owner(hash_slot(key.as_bytes())).1
    }

    /// Route `key` to a node that does not own it.
    pub fn make_stale(&self, key: &str) {
        let slot = hash_slot(key.as_bytes());
        let owner = &self.owner(slot).0;
        let wrong = self
            .nodes
            .iter()
            .map(|(id, _)| id)
            .find(|id| *id != owner)
            .expect("at least two nodes");
        self.stale.lock().insert(slot, wrong.clone());
    }

    pub fn batches(&self) -> Vec<(String, usize)> {
        self.batches.lock().clone()
    }

    fn slot_of(command: &Command) -> Option<u16> {
        command.routing_key().map(hash_slot)
    }

    fn store_by_id(&self, id: &str) -> Result<&MemoryStore> {
        self.nodes
            .iter()
            .find(|(node, _)| node == id)
            .map(|(_, store)| store)
            .ok_or_else(|| StoreError::Cluster(format!("unknown node {id}")))
    }
}

impl StoreHandle for FakeCluster {
    fn connection_id(&self) -> String {
        "fake-cluster".into()
    }

    /// Single commands always reach the owner, as if MOVED was followed.
    fn execute(&self, command: &Command) -> Result<RespValue> {
        let slot = Self::slot_of(command).unwrap_or(0);
        self.stale.lock().remove(&slot);
        self.owner(slot).1.execute(command)
    }

    fn pipeline(&self, commands: &[Command]) -> Result<Vec<RespValue>> {
        cross_slot::run(self, commands.iter().cloned())
    }

    fn cluster(&self) -> Option<&dyn ClusterClient> {
        Some(self)
    }
}

impl ClusterClient for FakeCluster {
    fn node_key(&self, command: &Command) -> Result<String> {
        let slot = Self::slot_of(command).unwrap_or(0);
        if let Some(node) = self.stale.lock().get(&slot) {
            return Ok(node.clone());
        }
        Ok(self.owner(slot).0.clone())
    }

    fn pipeline_on_node(&self, node: &str, commands: &[Command]) -> Result<Vec<RespValue>> {
        self.batches.lock().push((node.to_string(), commands.len()));
        for command in commands {
            let slot = Self::slot_of(command).unwrap_or(0);
            let (owner, _) = self.owner(slot);
            if owner != node {
                self.stale.lock().remove(&slot);
                return Err(StoreError::redis(format!("MOVED {slot} {owner}")));
            }
        }
        self.store_by_id(node)?.pipeline(commands)
    }
}

// ── Live server ────────────────────────────────────────────────────

/// Store on the test server's database `db`, or `None` when no server
/// answers at `REDIS_URL`.
pub fn live_store(db: u16) -> Option<StandaloneStore> {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
    let mut config = ConnectionConfig::from_url(&url).expect("invalid REDIS_URL");
    config.db = db;
    config.connect_timeout_ms = 500;
    let store = StandaloneStore::new(config);
    match store.execute(&Command::raw("PING", std::iter::empty::<&str>())) {
        Ok(RespValue::SimpleString(ref s)) if s == "PONG" => Some(store),
        _ => {
            eprintln!("skipping: no Redis server at {url}");
            None
        }
    }
}
