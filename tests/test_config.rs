//! Integration tests: config fallback chain.

use multistore::config::resolver::{GLOBAL_CONFIG_ENV, GLOBAL_CONFIG_FILE};
use multistore::{ConfigResolver, ConfigSource, Topology};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn root() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("config")).unwrap();
    dir
}

fn write(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
}

fn env(pairs: &[(&str, &PathBuf)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.display().to_string()))
        .collect()
}

#[test]
fn instance_env_var_wins() {
    let dir = root();
    let custom = dir.path().join("custom.yml");
    write(&custom, "production: redis://from-env:7001\n");
    write(
        &dir.path().join("config/redis.sessions.yml"),
        "production: redis://from-file:7002\n",
    );

    let resolver = ConfigResolver::new(dir.path())
        .with_env(env(&[("REDIS_SESSIONS_CONFIG_FILE", &custom)]));
    let resolved = resolver.resolve("sessions").unwrap();

    assert_eq!(resolved.source, ConfigSource::InstanceEnv(custom));
    assert_eq!(resolved.config.primary_addr(), "from-env:7001");
}

#[test]
fn conventional_file_beats_global() {
    let dir = root();
    write(
        &dir.path().join("config/redis.sessions.yml"),
        "production: redis://sessions:7002\n",
    );
    write(&dir.path().join(GLOBAL_CONFIG_FILE), "production: redis://global:7000\n");

    let resolved = ConfigResolver::new(dir.path())
        .with_env(HashMap::new())
        .resolve("sessions")
        .unwrap();
    assert!(matches!(resolved.source, ConfigSource::ConventionalFile(_)));
    assert_eq!(resolved.config.primary_addr(), "sessions:7002");
}

#[test]
fn new_store_borrows_fallback_config() {
    let dir = root();
    write(
        &dir.path().join("config/redis.shared_state.yml"),
        "production:\n  url: redis://shared:7003/4\n  pool_size: 3\n",
    );
    write(&dir.path().join(GLOBAL_CONFIG_FILE), "production: redis://global:7000\n");

    let resolved = ConfigResolver::new(dir.path())
        .with_env(HashMap::new())
        .with_fallback("sessions", "shared_state")
        .resolve("sessions")
        .unwrap();

    assert_eq!(resolved.name, "sessions");
    match &resolved.source {
        ConfigSource::Fallback { store, source } => {
            assert_eq!(store, "shared_state");
            assert!(matches!(**source, ConfigSource::ConventionalFile(_)));
        }
        other => panic!("expected fallback source, got {other:?}"),
    }
    assert_eq!(resolved.config.primary_addr(), "shared:7003");
    assert_eq!(resolved.config.db, 4);
    assert_eq!(resolved.config.pool_size, 3);
}

#[test]
fn own_file_overrides_fallback() {
    let dir = root();
    write(
        &dir.path().join("config/redis.shared_state.yml"),
        "production: redis://shared:7003\n",
    );
    write(
        &dir.path().join("config/redis.sessions.yml"),
        "production: redis://sessions:7002\n",
    );

    let resolved = ConfigResolver::new(dir.path())
        .with_env(HashMap::new())
        .with_fallback("sessions", "shared_state")
        .resolve("sessions")
        .unwrap();
    assert!(matches!(resolved.source, ConfigSource::ConventionalFile(_)));
}

#[test]
fn global_env_then_global_file() {
    let dir = root();
    let global_env = dir.path().join("elsewhere.yml");
    write(&global_env, "production: redis://global-env:7004\n");
    write(&dir.path().join(GLOBAL_CONFIG_FILE), "production: redis://global-file:7005\n");

    let with_env = ConfigResolver::new(dir.path())
        .with_env(env(&[(GLOBAL_CONFIG_ENV, &global_env)]))
        .resolve("cache")
        .unwrap();
    assert_eq!(with_env.source, ConfigSource::GlobalEnv(global_env));
    assert_eq!(with_env.config.primary_addr(), "global-env:7004");

    let without_env = ConfigResolver::new(dir.path())
        .with_env(HashMap::new())
        .resolve("cache")
        .unwrap();
    assert!(matches!(without_env.source, ConfigSource::GlobalFile(_)));
    assert_eq!(without_env.config.primary_addr(), "global-file:7005");
}

#[test]
fn default_url_when_nothing_exists() {
    let dir = root();
    let resolved = ConfigResolver::new(dir.path())
        .with_env(HashMap::new())
        .resolve("cache")
        .unwrap();
    assert_eq!(resolved.source, ConfigSource::Default);
    assert_eq!(resolved.config.primary_addr(), "localhost:6379");
}

#[test]
fn cluster_file_and_environment_sections() {
    let dir = root();
    write(
        &dir.path().join("config/redis.cache.yml"),
        "production:\n  cluster:\n    - host: c1\n      port: 7000\n    - host: c2\n      port: 7001\n  read_from_replicas: true\n\
         development: redis://localhost:6380\n",
    );

    let prod = ConfigResolver::new(dir.path())
        .with_env(HashMap::new())
        .resolve("cache")
        .unwrap();
    assert!(prod.config.is_cluster());
    assert!(prod.config.read_from_replicas);
    assert_eq!(
        prod.config.topology,
        Topology::Cluster {
            nodes: vec![("c1".into(), 7000), ("c2".into(), 7001)]
        }
    );

    let dev = ConfigResolver::new(dir.path())
        .with_env(HashMap::new())
        .with_environment("development")
        .resolve("cache")
        .unwrap();
    assert_eq!(dev.config.primary_addr(), "localhost:6380");
}

#[test]
fn missing_env_file_is_an_error() {
    let dir = root();
    let missing = dir.path().join("nope.yml");
    let err = ConfigResolver::new(dir.path())
        .with_env(env(&[("REDIS_CACHE_CONFIG_FILE", &missing)]))
        .resolve("cache")
        .unwrap_err();
    assert!(err.to_string().contains("nope.yml"));
}
