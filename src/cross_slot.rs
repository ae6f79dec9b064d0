//! Pipelines whose keys span hash slots on a Redis Cluster.
//!
//! A cluster rejects a pipeline that touches slots on more than one node, so
//! commands are grouped by the node that owns them, each group is sent as its
//! own pipeline, and the replies are stitched back into call order.
//!
//! If a node answers MOVED or ASK mid-batch the slot map is stale. The whole
//! batch is then replayed one command at a time through the handle's regular
//! redirect-following path.
//!
//! Handles that are not cluster clients get a plain pipeline.

use crate::command::Command;
use crate::error::{Result, StoreError};
use crate::pipeline::Pipeline;
use crate::resp::types::RespValue;
use crate::store::{ClusterClient, StoreHandle};

use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Where a [`CrossSlotPipeline`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Accepting commands.
    Collecting,
    /// Node groups are in flight.
    Executing,
    /// A redirect was seen; replaying commands one by one.
    SequentialRetry,
    /// Every reply is available.
    Resolved,
}

/// Placeholder for one reply. Filled exactly once, read after that.
#[derive(Debug, Default)]
pub struct PendingReply {
    value: Option<RespValue>,
}

impl PendingReply {
    pub fn is_resolved(&self) -> bool {
        self.value.is_some()
    }

    fn resolve(&mut self, value: RespValue) -> Result<()> {
        if self.value.is_some() {
            return Err(StoreError::Protocol("pipeline reply resolved twice".into()));
        }
        self.value = Some(value);
        Ok(())
    }

    fn take(self) -> Result<RespValue> {
        self.value
            .ok_or_else(|| StoreError::Protocol("pipeline reply read before it arrived".into()))
    }
}

/// A batch of commands bound for a possibly-clustered store.
///
/// Runs once. Every state it passes through is kept in
/// [`history`](Self::history), so callers can see whether a redirect forced
/// the sequential path.
pub struct CrossSlotPipeline<'a> {
    store: &'a dyn StoreHandle,
    commands: Vec<Command>,
    history: Vec<PipelineState>,
}

impl<'a> CrossSlotPipeline<'a> {
    pub fn new(store: &'a dyn StoreHandle) -> Self {
        Self {
            store,
            commands: Vec::new(),
            history: vec![PipelineState::Collecting],
        }
    }

    /// Queue a command.
    pub fn add(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Current state.
    pub fn state(&self) -> PipelineState {
        self.history
            .last()
            .copied()
            .unwrap_or(PipelineState::Collecting)
    }

    /// States passed through so far, oldest first.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    fn enter(&mut self, state: PipelineState) {
        tracing::debug!(from = ?self.state(), to = ?state, "cross-slot pipeline state");
        self.history.push(state);
    }

    /// Send everything and return one reply per command, in call order.
    ///
    /// Fails if the pipeline already left [`PipelineState::Collecting`].
    pub fn execute(&mut self) -> Result<Vec<RespValue>> {
        if self.state() != PipelineState::Collecting {
            return Err(StoreError::Protocol(
                "cross-slot pipeline already executed".into(),
            ));
        }
        let store = self.store;
        if self.commands.is_empty() {
            self.enter(PipelineState::Resolved);
            return Ok(Vec::new());
        }
        let Some(cluster) = store.cluster() else {
            self.enter(PipelineState::Executing);
            let replies = store.pipeline(&self.commands)?;
            self.enter(PipelineState::Resolved);
            return Ok(replies);
        };

        // Group by owning node, remembering each command's node in call order.
        let mut groups: BTreeMap<String, Vec<Command>> = BTreeMap::new();
        let mut order = Vec::with_capacity(self.commands.len());
        for command in &self.commands {
            let node = cluster.node_key(command)?;
            groups.entry(node.clone()).or_default().push(command.clone());
            order.push(node);
        }

        self.enter(PipelineState::Executing);
        let results = match run_groups(cluster, groups) {
            Ok(results) => results,
            Err(e) if e.is_redirect() => {
                tracing::debug!(
                    commands = self.commands.len(),
                    error = %e,
                    "redirection during cross-slot pipeline, retrying sequentially"
                );
                self.enter(PipelineState::SequentialRetry);
                let replies = self.run_sequentially()?;
                self.enter(PipelineState::Resolved);
                return Ok(replies);
            }
            Err(e) => return Err(e),
        };

        let replies = stitch(order, results)?;
        self.enter(PipelineState::Resolved);
        Ok(replies)
    }

    fn run_sequentially(&self) -> Result<Vec<RespValue>> {
        self.commands
            .iter()
            .map(|command| match self.store.execute(command) {
                Ok(value) => Ok(value),
                Err(StoreError::Redis { message, .. }) => Ok(RespValue::Error(message)),
                Err(e) => Err(e),
            })
            .collect()
    }
}

fn run_groups(
    cluster: &dyn ClusterClient,
    groups: BTreeMap<String, Vec<Command>>,
) -> Result<HashMap<String, VecDeque<RespValue>>> {
    let mut results = HashMap::with_capacity(groups.len());
    for (node, batch) in groups {
        let replies = cluster.pipeline_on_node(&node, &batch)?;
        if replies.len() != batch.len() {
            return Err(StoreError::Protocol(format!(
                "node {node} returned {} replies for {} commands",
                replies.len(),
                batch.len()
            )));
        }
        results.insert(node, VecDeque::from(replies));
    }
    Ok(results)
}

/// Walk the original call order, taking each node's replies FIFO.
fn stitch(
    order: Vec<String>,
    mut results: HashMap<String, VecDeque<RespValue>>,
) -> Result<Vec<RespValue>> {
    let mut pending: Vec<PendingReply> = order.iter().map(|_| PendingReply::default()).collect();
    for (slot, node) in pending.iter_mut().zip(&order) {
        let reply = results
            .get_mut(node)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| StoreError::Protocol(format!("missing reply from node {node}")))?;
        slot.resolve(reply)?;
    }
    pending.into_iter().map(PendingReply::take).collect()
}

/// Run a closure-built batch through a [`CrossSlotPipeline`].
pub fn pipelined<F>(store: &dyn StoreHandle, body: F) -> Result<Vec<RespValue>>
where
    F: FnOnce(&mut Pipeline),
{
    let mut batch = Pipeline::new();
    body(&mut batch);
    run(store, batch.into_commands())
}

/// Run already-built commands through a [`CrossSlotPipeline`].
pub fn run(store: &dyn StoreHandle, commands: impl IntoIterator<Item = Command>) -> Result<Vec<RespValue>> {
    let mut pipeline = CrossSlotPipeline::new(store);
    for command in commands {
        pipeline.add(command);
    }
    pipeline.execute()
}

/// Fetch many keys. One MGET on a single node, per-key GETs on a cluster.
pub fn batch_get<K: AsRef<[u8]>>(store: &dyn StoreHandle, keys: &[K]) -> Result<Vec<Option<Bytes>>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let replies = if store.cluster().is_some() {
        run(store, keys.iter().map(Command::get))?
    } else {
        match store.execute(&Command::mget(keys))? {
            RespValue::Array(items) => items,
            other => {
                return Err(StoreError::Protocol(format!(
                    "unexpected MGET reply: {}",
                    other.type_name()
                )))
            }
        }
    };
    replies.into_iter().map(bulk_or_nil).collect()
}

/// Unlink many keys and return how many existed.
pub fn batch_unlink<K: AsRef<[u8]>>(store: &dyn StoreHandle, keys: &[K]) -> Result<i64> {
    if keys.is_empty() {
        return Ok(0);
    }
    if store.cluster().is_none() {
        let reply = store.execute(&Command::unlink(keys))?;
        return integer(reply);
    }
    run(store, keys.iter().map(|k| Command::unlink([k])))?
        .into_iter()
        .map(integer)
        .sum()
}

fn bulk_or_nil(value: RespValue) -> Result<Option<Bytes>> {
    match value {
        RespValue::BulkString(b) => Ok(Some(b)),
        RespValue::Null => Ok(None),
        RespValue::Error(msg) => Err(StoreError::redis(msg)),
        other => Err(StoreError::Protocol(format!(
            "unexpected GET reply: {}",
            other.type_name()
        ))),
    }
}

fn integer(value: RespValue) -> Result<i64> {
    match value {
        RespValue::Integer(n) => Ok(n),
        RespValue::Error(msg) => Err(StoreError::redis(msg)),
        other => Err(StoreError::Protocol(format!(
            "unexpected UNLINK reply: {}",
            other.type_name()
        ))),
    }
}

// ── Tests ──────────────────────────────────────────────────────────
