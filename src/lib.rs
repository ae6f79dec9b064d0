//! Dual-backend Redis access for migrating live traffic between deployments.
//!
//! A [`MultiStore`] wraps two [`StoreHandle`]s. Writes go to both, reads
//! prefer the new deployment (primary) and fall back to the old one
//! (secondary), and secondary stays the source of truth for replies until the
//! migration is switched off with a [`ModeProvider`].
//!
//! ```no_run
//! use multistore::{Commands, ConfigResolver, MultiStore};
//!
//! # fn main() -> multistore::Result<()> {
//! let resolver = ConfigResolver::new(".").with_fallback("sessions_new", "sessions");
//! let store = MultiStore::new(
//!     resolver.connect("sessions_new")?,
//!     resolver.connect("sessions")?,
//!     "sessions",
//! )?;
//! store.set("user:1", "alice")?;
//! assert!(store.get("user:1")?.is_some());
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod connection;
pub mod crc16;
pub mod cross_slot;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod mode;
pub mod multi_store;
pub mod pipeline;
pub mod resp;
pub mod router;
pub mod runtime;
pub mod store;

pub use command::{classify, Access, BlockCommand, Command, CommandName};
pub use config::{ConfigResolver, ConfigSource, ConnectionConfig, ResolvedStore, Topology};
pub use cross_slot::{batch_get, batch_unlink, CrossSlotPipeline};
pub use error::{Diagnostic, RedisErrorKind, Result, StoreError};
pub use memory::MemoryStore;
pub use metrics::MultiStoreMetrics;
pub use mode::{DualStoreMode, FeatureFlags, ModeProvider};
pub use multi_store::{MultiStore, MultiStoreBuilder, Role};
pub use pipeline::Pipeline;
pub use resp::types::RespValue;
pub use router::{ClusterRouter, StandaloneStore};
pub use store::{ClusterClient, Commands, StoreHandle};
