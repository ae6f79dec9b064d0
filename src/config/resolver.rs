//! Resolution of logical store names to connection settings.
//!
//! A logical store (`sessions`, `cache`, …) finds its settings by walking a
//! fixed chain and stopping at the first source that exists:
//!
//! 1. `REDIS_<NAME>_CONFIG_FILE` environment variable
//! 2. `<root>/config/redis.<name>.yml`
//! 3. the registered fallback store's own resolution
//! 4. `REDIS_CONFIG_FILE` environment variable
//! 5. `<root>/config/redis.yml`
//! 6. [`DEFAULT_REDIS_URL`]
//!
//! Step 3 is what lets a new store be split off an existing one before it
//! has dedicated configuration.

use crate::config::connection::{ConnectionConfig, Topology, DEFAULT_PORT};
use crate::error::{Result, StoreError};
use crate::router;
use crate::store::StoreHandle;

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Last-resort connection URL.
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// Global config file override.
pub const GLOBAL_CONFIG_ENV: &str = "REDIS_CONFIG_FILE";

/// Global config file, relative to the resolver root.
pub const GLOBAL_CONFIG_FILE: &str = "config/redis.yml";

/// Environment section used when none is configured.
pub const DEFAULT_ENVIRONMENT: &str = "production";

/// Where a store's settings came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Step 1: the store's own environment variable.
    InstanceEnv(PathBuf),
    /// Step 2: `config/redis.<name>.yml`.
    ConventionalFile(PathBuf),
    /// Step 3: borrowed from another logical store.
    Fallback {
        store: String,
        source: Box<ConfigSource>,
    },
    /// Step 4: `REDIS_CONFIG_FILE`.
    GlobalEnv(PathBuf),
    /// Step 5: `config/redis.yml`.
    GlobalFile(PathBuf),
    /// Step 6: [`DEFAULT_REDIS_URL`].
    Default,
}

/// Outcome of resolving one logical store.
#[derive(Debug, Clone)]
pub struct ResolvedStore {
    pub name: String,
    pub source: ConfigSource,
    pub config: ConnectionConfig,
}

/// One cluster node as written in YAML.
#[derive(Debug, Clone, Deserialize)]
struct NodeEntry {
    host: String,
    #[serde(default)]
    port: Option<u16>,
}

/// Body of an environment section.
#[derive(Debug, Clone, Default, Deserialize)]
struct StoreParams {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    cluster: Vec<NodeEntry>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    db: Option<u16>,
    #[serde(default)]
    pool_size: Option<usize>,
    #[serde(default)]
    connect_timeout_ms: Option<u64>,
    #[serde(default)]
    read_timeout_ms: Option<u64>,
    #[serde(default)]
    read_from_replicas: Option<bool>,
}

/// An environment section is either a bare URL or a parameter map.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Section {
    Url(String),
    Params(StoreParams),
}

impl StoreParams {
    fn into_connection_config(self) -> Result<ConnectionConfig> {
        let mut config = match &self.url {
            Some(url) => ConnectionConfig::from_url(url)?,
            None if self.cluster.is_empty() => ConnectionConfig::from_url(DEFAULT_REDIS_URL)?,
            None => ConnectionConfig::default(),
        };

        if !self.cluster.is_empty() {
            let nodes: Vec<(String, u16)> = self
                .cluster
                .into_iter()
                .map(|n| (n.host, n.port.unwrap_or(DEFAULT_PORT)))
                .collect();
            config.host = nodes[0].0.clone();
            config.port = nodes[0].1;
            config.db = 0;
            config.topology = Topology::Cluster { nodes };
        }
        if self.username.is_some() {
            config.username = self.username;
        }
        if self.password.is_some() {
            config.password = self.password;
        }
        if let Some(db) = self.db {
            if !config.is_cluster() {
                config.db = db;
            }
        }
        if let Some(size) = self.pool_size {
            config.pool_size = size;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout_ms = ms;
        }
        if let Some(ms) = self.read_timeout_ms {
            config.read_timeout_ms = ms;
        }
        if let Some(replicas) = self.read_from_replicas {
            config.read_from_replicas = replicas;
        }
        Ok(config)
    }
}

/// Resolves logical store names through the fallback chain.
pub struct ConfigResolver {
    root: PathBuf,
    environment: String,
    fallbacks: HashMap<String, String>,
    /// When set, replaces the process environment for lookups.
    env_overrides: Option<HashMap<String, String>>,
}

impl ConfigResolver {
    /// Resolver rooted at `root` (the directory holding `config/`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            fallbacks: HashMap::new(),
            env_overrides: None,
        }
    }

    /// Select which top-level YAML section to read.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Let `store` borrow `fallback`'s settings until it has its own.
    pub fn with_fallback(mut self, store: impl Into<String>, fallback: impl Into<String>) -> Self {
        self.fallbacks.insert(store.into(), fallback.into());
        self
    }

    /// Use `vars` instead of the process environment.
    pub fn with_env(mut self, vars: HashMap<String, String>) -> Self {
        self.env_overrides = Some(vars);
        self
    }

    /// Name of the per-store override variable, e.g. `REDIS_SESSIONS_CONFIG_FILE`.
    pub fn instance_env_var(store: &str) -> String {
        format!("REDIS_{}_CONFIG_FILE", store.to_ascii_uppercase())
    }

    /// Conventional per-store file path.
    pub fn conventional_file(&self, store: &str) -> PathBuf {
        self.root
            .join("config")
            .join(format!("redis.{}.yml", store.to_ascii_lowercase()))
    }

    /// Resolve `store` to connection settings.
    pub fn resolve(&self, store: &str) -> Result<ResolvedStore> {
        let mut visiting = Vec::new();
        let resolved = self.resolve_inner(store, &mut visiting)?;
        tracing::info!(
            store,
            source = ?resolved.source,
            connection = %resolved.config.connection_id(),
            "resolved redis store configuration"
        );
        Ok(resolved)
    }

    /// Resolve and open a network handle for `store`.
    pub fn connect(&self, store: &str) -> Result<Arc<dyn StoreHandle>> {
        let resolved = self.resolve(store)?;
        router::connect(resolved.config)
    }

    fn resolve_inner(&self, store: &str, visiting: &mut Vec<String>) -> Result<ResolvedStore> {
        if visiting.iter().any(|s| s == store) {
            visiting.push(store.to_string());
            return Err(StoreError::Config(format!(
                "config fallback cycle: {}",
                visiting.join(" -> ")
            )));
        }
        visiting.push(store.to_string());

        let finish = |source: ConfigSource, config: ConnectionConfig| ResolvedStore {
            name: store.to_string(),
            source,
            config,
        };

        if let Some(path) = self.env_var(&Self::instance_env_var(store)) {
            let path = PathBuf::from(path);
            let config = self.load_file(&path)?;
            return Ok(finish(ConfigSource::InstanceEnv(path), config));
        }

        let conventional = self.conventional_file(store);
        if conventional.is_file() {
            let config = self.load_file(&conventional)?;
            return Ok(finish(ConfigSource::ConventionalFile(conventional), config));
        }

        if let Some(fallback) = self.fallbacks.get(store) {
            let inherited = self.resolve_inner(fallback, visiting)?;
            tracing::debug!(store, fallback = %fallback, "using fallback store configuration");
            return Ok(finish(
                ConfigSource::Fallback {
                    store: fallback.clone(),
                    source: Box::new(inherited.source),
                },
                inherited.config,
            ));
        }

        if let Some(path) = self.env_var(GLOBAL_CONFIG_ENV) {
            let path = PathBuf::from(path);
            let config = self.load_file(&path)?;
            return Ok(finish(ConfigSource::GlobalEnv(path), config));
        }

        let global = self.root.join(GLOBAL_CONFIG_FILE);
        if global.is_file() {
            let config = self.load_file(&global)?;
            return Ok(finish(ConfigSource::GlobalFile(global), config));
        }

        Ok(finish(
            ConfigSource::Default,
            ConnectionConfig::from_url(DEFAULT_REDIS_URL)?,
        ))
    }

    fn env_var(&self, name: &str) -> Option<String> {
        match &self.env_overrides {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        }
        .filter(|v| !v.is_empty())
    }

    fn load_file(&self, path: &Path) -> Result<ConnectionConfig> {
        let path = if path.is_relative() {
            self.root.join(path)
        } else {
            path.to_path_buf()
        };
        let content = std::fs::read_to_string(&path)
            .map_err(|e| StoreError::Config(format!("cannot read {}: {e}", path.display())))?;
        self.parse_document(&content)
            .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))
    }

    fn parse_document(&self, content: &str) -> Result<ConnectionConfig> {
        let mut sections: HashMap<String, Section> =
            serde_yaml::from_str(content).map_err(|e| StoreError::Config(e.to_string()))?;

        match sections.remove(&self.environment) {
            Some(Section::Url(url)) => ConnectionConfig::from_url(&url),
            Some(Section::Params(params)) => params.into_connection_config(),
            None => {
                tracing::warn!(
                    environment = %self.environment,
                    "config file has no section for environment, using default url"
                );
                ConnectionConfig::from_url(DEFAULT_REDIS_URL)
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ConfigResolver {
        ConfigResolver::new("/nonexistent").with_env(HashMap::new())
    }

    #[test]
    fn url_section() {
        let c = resolver()
            .parse_document("production: redis://cache.internal:6380/2\n")
            .unwrap();
        assert_eq!(c.host, "cache.internal");
        assert_eq!(c.port, 6380);
        assert_eq!(c.db, 2);
    }

    #[test]
    fn params_section_overrides_url() {
        let yaml = "production:\n  url: redis://h:1/0\n  password: s3cret\n  db: 5\n  pool_size: 2\n";
        let c = resolver().parse_document(yaml).unwrap();
        assert_eq!(c.password.as_deref(), Some("s3cret"));
        assert_eq!(c.db, 5);
        assert_eq!(c.pool_size, 2);
    }

    #[test]
    fn cluster_section() {
        let yaml = "production:\n  cluster:\n    - host: n1\n      port: 7000\n    - host: n2\n";
        let c = resolver().parse_document(yaml).unwrap();
        assert_eq!(
            c.topology,
            Topology::Cluster {
                nodes: vec![("n1".into(), 7000), ("n2".into(), 6379)]
            }
        );
        assert_eq!(c.primary_addr(), "n1:7000");
    }

    #[test]
    fn environment_selection() {
        let yaml = "production: redis://prod:1\ndevelopment: redis://dev:2\n";
        let c = resolver()
            .with_environment("development")
            .parse_document(yaml)
            .unwrap();
        assert_eq!(c.host, "dev");
    }

    #[test]
    fn missing_section_uses_default() {
        let c = resolver().parse_document("test: redis://t:1\n").unwrap();
        assert_eq!(c.host, "localhost");
        assert_eq!(c.port, 6379);
    }

    #[test]
    fn malformed_yaml() {
        assert!(matches!(
            resolver().parse_document("production: [unclosed"),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn env_var_names() {
        assert_eq!(
            ConfigResolver::instance_env_var("shared_state"),
            "REDIS_SHARED_STATE_CONFIG_FILE"
        );
    }

    #[test]
    fn nothing_configured_is_default() {
        let resolved = resolver().resolve("sessions").unwrap();
        assert_eq!(resolved.source, ConfigSource::Default);
        assert_eq!(resolved.config.primary_addr(), "localhost:6379");
    }

    #[test]
    fn fallback_cycle_is_an_error() {
        let r = resolver().with_fallback("a", "b").with_fallback("b", "a");
        let err = r.resolve("a").unwrap_err();
        assert!(err.to_string().contains("a -> b -> a"));
    }
}
