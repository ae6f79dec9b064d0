pub mod connection;
pub mod resolver;

pub use connection::{ConnectionConfig, Topology, DEFAULT_PORT};
pub use resolver::{ConfigResolver, ConfigSource, ResolvedStore, DEFAULT_REDIS_URL};
