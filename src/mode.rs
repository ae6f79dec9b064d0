//! Runtime switch between dual-store and pass-through behaviour.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Whether a [`MultiStore`](crate::multi_store::MultiStore) fans out to both
/// stores or forwards everything to secondary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DualStoreMode {
    #[default]
    Enabled,
    Disabled,
}

impl DualStoreMode {
    pub fn is_enabled(self) -> bool {
        self == Self::Enabled
    }
}

/// Source of the current mode, consulted once per call.
pub trait ModeProvider: Send + Sync {
    fn mode(&self, instance_name: &str) -> DualStoreMode;
}

/// A fixed mode.
impl ModeProvider for DualStoreMode {
    fn mode(&self, _instance_name: &str) -> DualStoreMode {
        *self
    }
}

/// Named boolean flags. Flags nobody has set read as enabled.
#[derive(Debug, Default)]
pub struct FeatureFlags {
    flags: RwLock<HashMap<String, bool>>,
}

impl FeatureFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag controlling the store labelled `instance_name`.
    pub fn flag_name(instance_name: &str) -> String {
        format!("use_primary_and_secondary_stores_for_{instance_name}")
    }

    pub fn enable(&self, flag: impl Into<String>) {
        self.set(flag, true);
    }

    pub fn disable(&self, flag: impl Into<String>) {
        self.set(flag, false);
    }

    pub fn is_enabled(&self, flag: &str) -> bool {
        self.flags.read().get(flag).copied().unwrap_or(true)
    }

    fn set(&self, flag: impl Into<String>, on: bool) {
        let flag = flag.into();
        tracing::info!(flag = %flag, enabled = on, "feature flag changed");
        self.flags.write().insert(flag, on);
    }
}

impl ModeProvider for FeatureFlags {
    fn mode(&self, instance_name: &str) -> DualStoreMode {
        if self.is_enabled(&Self::flag_name(instance_name)) {
            DualStoreMode::Enabled
        } else {
            DualStoreMode::Disabled
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
