//! Dual-store access layer for migrating traffic between two Redis
//! deployments.
//!
//! During a migration every call goes through a [`MultiStore`] that wraps
//! the new deployment (*primary*) and the current system of record
//! (*secondary*):
//!
//! * reads try primary first and fall back to secondary when primary has
//!   nothing or fails;
//! * writes go to primary best-effort, then to secondary, whose reply is
//!   what the caller sees;
//! * anything the classifier does not know goes to secondary only.
//!
//! Primary failures are logged and counted, never raised. Secondary errors
//! propagate unchanged. There is no atomicity across the two stores: a write
//! can land on secondary and not on primary.
//!
//! When the mode provider says dual-store mode is off, or both handles point
//! at the same deployment, every call goes to secondary exactly once.

use crate::command::{Access, BlockCommand, Command};
use crate::error::{Diagnostic, Result, StoreError};
use crate::metrics::MultiStoreMetrics;
use crate::mode::{DualStoreMode, ModeProvider};
use crate::pipeline::Pipeline;
use crate::resp::types::RespValue;
use crate::store::StoreHandle;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Which of the two wrapped stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Primary,
    Secondary,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A primary/secondary pair behaving like one store.
pub struct MultiStore {
    primary: Arc<dyn StoreHandle>,
    secondary: Arc<dyn StoreHandle>,
    instance_name: String,
    mode: Arc<dyn ModeProvider>,
    metrics: Arc<MultiStoreMetrics>,
    /// Store pinned by a running block, per calling thread.
    pins: Mutex<HashMap<ThreadId, Role>>,
}

impl MultiStore {
    /// Dual-store mode on, private metrics registry.
    pub fn new(
        primary: Arc<dyn StoreHandle>,
        secondary: Arc<dyn StoreHandle>,
        instance_name: impl Into<String>,
    ) -> Result<Self> {
        Self::builder()
            .primary(primary)
            .secondary(secondary)
            .instance_name(instance_name)
            .build()
    }

    pub fn builder() -> MultiStoreBuilder {
        MultiStoreBuilder::default()
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn primary(&self) -> &Arc<dyn StoreHandle> {
        &self.primary
    }

    pub fn secondary(&self) -> &Arc<dyn StoreHandle> {
        &self.secondary
    }

    pub fn metrics(&self) -> &Arc<MultiStoreMetrics> {
        &self.metrics
    }

    /// True when both handles reach the same physical deployment.
    pub fn same_store(&self) -> bool {
        Arc::as_ptr(&self.primary) as *const () == Arc::as_ptr(&self.secondary) as *const ()
            || self.primary.connection_id() == self.secondary.connection_id()
    }

    /// Whether the current call should use both stores.
    pub fn use_primary_and_secondary_stores(&self) -> bool {
        self.mode.mode(&self.instance_name) == DualStoreMode::Enabled
    }

    /// Store pinned for the calling thread, if a block is running.
    pub fn pinned_store(&self) -> Option<Role> {
        self.pins.lock().get(&thread::current().id()).copied()
    }

    /// Run `body` with every call on this instance routed to `role`.
    ///
    /// The previous pin is restored when `body` returns or unwinds.
    pub fn with_pinned_store<R>(&self, role: Role, body: impl FnOnce(&Self) -> R) -> R {
        let _guard = PinGuard::pin(self, role);
        body(self)
    }

    fn store(&self, role: Role) -> &dyn StoreHandle {
        match role {
            Role::Primary => &*self.primary,
            Role::Secondary => &*self.secondary,
        }
    }

    fn dual_mode(&self) -> bool {
        self.use_primary_and_secondary_stores() && !self.same_store()
    }

    // ── Single commands ────────────────────────────────────────────

    /// Run one command through the dual-store protocol.
    pub fn execute(&self, command: &Command) -> Result<RespValue> {
        if let Some(role) = self.pinned_store() {
            return self.store(role).execute(command);
        }

        let access = command.access();
        if access == Access::Unclassified {
            self.report(Diagnostic::MethodMissing {
                command: command.name().to_string(),
                with_block: false,
            });
            return self.secondary.execute(command);
        }
        if !self.dual_mode() {
            return self.secondary.execute(command);
        }

        match access {
            Access::Read => self.read_one_with_fallback(command),
            Access::Write => self.write_both(command),
            Access::Unclassified => self.secondary.execute(command),
        }
    }

    fn read_one_with_fallback(&self, command: &Command) -> Result<RespValue> {
        let value = match self.primary.execute(command) {
            Ok(value) => value,
            Err(e) => {
                self.primary_failed(command.name(), &e, "failed to read from primary");
                RespValue::Null
            }
        };
        if !value.is_absent() {
            return Ok(value);
        }

        let value = self.secondary.execute(command)?;
        if !value.is_absent() {
            self.report(Diagnostic::ReadFallback {
                command: command.name().to_string(),
            });
        }
        Ok(value)
    }

    fn write_both(&self, command: &Command) -> Result<RespValue> {
        if let Err(e) = self.primary.execute(command) {
            self.primary_failed(command.name(), &e, "failed to write to primary");
        }
        self.secondary.execute(command)
    }

    // ── Block commands ─────────────────────────────────────────────

    /// Queue commands in `body` and send them as one pipeline.
    pub fn pipelined<F>(&self, body: F) -> Result<Vec<RespValue>>
    where
        F: FnOnce(&mut Pipeline),
    {
        let mut pipeline = Pipeline::new();
        body(&mut pipeline);
        self.run_batch(BlockCommand::Pipelined, pipeline.commands())
    }

    /// Queue commands in `body` and send them inside MULTI/EXEC.
    pub fn multi<F>(&self, body: F) -> Result<Vec<RespValue>>
    where
        F: FnOnce(&mut Pipeline),
    {
        let mut pipeline = Pipeline::new();
        body(&mut pipeline);
        self.run_batch(BlockCommand::Multi, pipeline.commands())
    }

    fn run_batch(&self, block: BlockCommand, commands: &[Command]) -> Result<Vec<RespValue>> {
        let send = |store: &dyn StoreHandle| match block {
            BlockCommand::Pipelined => store.pipeline(commands),
            BlockCommand::Multi => store.transaction(commands),
        };

        if let Some(role) = self.pinned_store() {
            return send(self.store(role));
        }
        if !self.dual_mode() {
            return self.with_pinned_store(Role::Secondary, |ms| send(&*ms.secondary));
        }

        let from_primary = match self.with_pinned_store(Role::Primary, |ms| send(&*ms.primary)) {
            Ok(replies) => Some(replies),
            Err(e) => {
                self.primary_failed(block.as_str(), &e, "failed to write to primary");
                None
            }
        };
        let from_secondary = self.with_pinned_store(Role::Secondary, |ms| send(&*ms.secondary))?;

        if from_primary.is_some_and(|p| p != from_secondary) {
            self.report(Diagnostic::PipelinedDiff {
                command: block.as_str().to_string(),
            });
        }
        Ok(from_secondary)
    }

    /// Run a block-taking command: `command` runs on the chosen store and
    /// `body` runs with that store pinned, so nested calls on this instance
    /// reach the same store.
    ///
    /// Reads run pinned to primary and retry pinned to secondary when the
    /// body's result is absent or primary fails. Writes run pinned to
    /// primary (failures logged) and then pinned to secondary, whose result
    /// is returned. `body` may therefore run twice.
    pub fn with_block<F>(&self, command: &Command, body: F) -> Result<RespValue>
    where
        F: Fn(&MultiStore) -> Result<RespValue>,
    {
        let run_on = |role: Role| {
            self.with_pinned_store(role, |ms| {
                ms.store(role).execute(command)?;
                body(ms)
            })
        };

        if let Some(role) = self.pinned_store() {
            return run_on(role);
        }

        let access = command.access();
        if access == Access::Unclassified {
            self.report(Diagnostic::MethodMissing {
                command: command.name().to_string(),
                with_block: true,
            });
            return run_on(Role::Secondary);
        }
        if !self.dual_mode() {
            return run_on(Role::Secondary);
        }

        match access {
            Access::Read => {
                match run_on(Role::Primary) {
                    Ok(value) if !value.is_absent() => return Ok(value),
                    Ok(_) => {}
                    Err(e) => self.primary_failed(command.name(), &e, "failed to read from primary"),
                }
                let value = run_on(Role::Secondary)?;
                if !value.is_absent() {
                    self.report(Diagnostic::ReadFallback {
                        command: command.name().to_string(),
                    });
                }
                Ok(value)
            }
            Access::Write | Access::Unclassified => {
                if let Err(e) = run_on(Role::Primary) {
                    self.primary_failed(command.name(), &e, "failed to write to primary");
                }
                run_on(Role::Secondary)
            }
        }
    }

    // ── Reporting ──────────────────────────────────────────────────

    fn primary_failed(&self, command: &str, error: &StoreError, message: &'static str) {
        tracing::warn!(
            command,
            instance_name = %self.instance_name,
            error = %error,
            "{message}"
        );
        self.metrics.primary_error(command, &self.instance_name);
    }

    fn report(&self, diagnostic: Diagnostic) {
        let command = diagnostic.command();
        let instance_name = self.instance_name.as_str();
        match &diagnostic {
            Diagnostic::ReadFallback { .. } => {
                tracing::warn!(command, instance_name, "value found on secondary, not on primary");
                self.metrics.read_fallback(command, instance_name);
            }
            Diagnostic::MethodMissing { with_block, .. } => {
                tracing::warn!(
                    command,
                    instance_name,
                    with_block = *with_block,
                    error = %diagnostic,
                    "method missing"
                );
                self.metrics.method_missing(command, instance_name);
            }
            Diagnostic::PipelinedDiff { .. } => {
                tracing::warn!(command, instance_name, "pipelined results differ between stores");
                self.metrics.pipelined_diff(command, instance_name);
            }
        }
    }
}

impl StoreHandle for MultiStore {
    fn connection_id(&self) -> String {
        format!(
            "multi_store[{}]({}, {})",
            self.instance_name,
            self.primary.connection_id(),
            self.secondary.connection_id()
        )
    }

    fn execute(&self, command: &Command) -> Result<RespValue> {
        MultiStore::execute(self, command)
    }

    fn pipeline(&self, commands: &[Command]) -> Result<Vec<RespValue>> {
        self.run_batch(BlockCommand::Pipelined, commands)
    }

    fn transaction(&self, commands: &[Command]) -> Result<Vec<RespValue>> {
        self.run_batch(BlockCommand::Multi, commands)
    }

    // Never a cluster client, even when one of the stores is: each store
    // does its own routing.
}

impl fmt::Debug for MultiStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiStore")
            .field("instance_name", &self.instance_name)
            .field("primary", &self.primary.connection_id())
            .field("secondary", &self.secondary.connection_id())
            .finish()
    }
}

/// Pins a store for the current thread until dropped.
struct PinGuard<'a> {
    store: &'a MultiStore,
    thread: ThreadId,
    previous: Option<Role>,
}

impl<'a> PinGuard<'a> {
    fn pin(store: &'a MultiStore, role: Role) -> Self {
        let thread = thread::current().id();
        let previous = store.pins.lock().insert(thread, role);
        Self {
            store,
            thread,
            previous,
        }
    }
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        let mut pins = self.store.pins.lock();
        match self.previous {
            Some(role) => {
                pins.insert(self.thread, role);
            }
            None => {
                pins.remove(&self.thread);
            }
        }
    }
}

/// Builder for [`MultiStore`].
#[derive(Default)]
pub struct MultiStoreBuilder {
    primary: Option<Arc<dyn StoreHandle>>,
    secondary: Option<Arc<dyn StoreHandle>>,
    instance_name: Option<String>,
    mode: Option<Arc<dyn ModeProvider>>,
    metrics: Option<Arc<MultiStoreMetrics>>,
}

impl MultiStoreBuilder {
    pub fn primary(mut self, store: Arc<dyn StoreHandle>) -> Self {
        self.primary = Some(store);
        self
    }

    pub fn secondary(mut self, store: Arc<dyn StoreHandle>) -> Self {
        self.secondary = Some(store);
        self
    }

    /// Label used in logs, metrics and the feature flag name.
    pub fn instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = Some(name.into());
        self
    }

    /// Defaults to [`DualStoreMode::Enabled`].
    pub fn mode(mut self, mode: Arc<dyn ModeProvider>) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Share a registry between instances.
    pub fn metrics(mut self, metrics: Arc<MultiStoreMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<MultiStore> {
        let primary = self
            .primary
            .ok_or_else(|| StoreError::InvalidStore("primary store is required".into()))?;
        let secondary = self
            .secondary
            .ok_or_else(|| StoreError::InvalidStore("secondary store is required".into()))?;
        let instance_name = self
            .instance_name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| StoreError::InvalidStore("instance name is required".into()))?;

        Ok(MultiStore {
            primary,
            secondary,
            instance_name,
            mode: self.mode.unwrap_or_else(|| Arc::new(DualStoreMode::Enabled)),
            metrics: self.metrics.unwrap_or_default(),
            pins: Mutex::new(HashMap::new()),
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────
