//! Counters for the dual-store layer, labelled by command and instance.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metric names.
pub mod names {
    /// A read found nothing on primary and something on secondary.
    pub const READ_FALLBACK: &str = "multi_store_read_fallback_total";
    /// An unclassified command was invoked.
    pub const METHOD_MISSING: &str = "multi_store_method_missing_total";
    /// `pipelined`/`multi` replies differed between the stores.
    pub const PIPELINED_DIFF: &str = "multi_store_pipelined_diff_total";
    /// A call against primary failed and was swallowed.
    pub const PRIMARY_ERROR: &str = "multi_store_primary_error_total";

    pub const ALL: [&str; 4] = [READ_FALLBACK, METHOD_MISSING, PIPELINED_DIFF, PRIMARY_ERROR];
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct SeriesKey {
    metric: &'static str,
    command: String,
    instance_name: String,
}

/// One counter series in a [`MultiStoreMetrics::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSample {
    pub metric: &'static str,
    pub command: String,
    pub instance_name: String,
    pub value: u64,
}

/// Registry of labelled counters. Cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct MultiStoreMetrics {
    counters: RwLock<HashMap<SeriesKey, AtomicU64>>,
}

impl MultiStoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, metric: &'static str, command: &str, instance_name: &str) {
        let key = SeriesKey {
            metric,
            command: command.to_string(),
            instance_name: instance_name.to_string(),
        };
        if let Some(counter) = self.counters.read().get(&key) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.counters
            .write()
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn read_fallback(&self, command: &str, instance_name: &str) {
        self.increment(names::READ_FALLBACK, command, instance_name);
    }

    pub fn method_missing(&self, command: &str, instance_name: &str) {
        self.increment(names::METHOD_MISSING, command, instance_name);
    }

    pub fn pipelined_diff(&self, command: &str, instance_name: &str) {
        self.increment(names::PIPELINED_DIFF, command, instance_name);
    }

    pub fn primary_error(&self, command: &str, instance_name: &str) {
        self.increment(names::PRIMARY_ERROR, command, instance_name);
    }

    /// Current value of one series; 0 if it was never incremented.
    pub fn get(&self, metric: &str, command: &str, instance_name: &str) -> u64 {
        self.counters
            .read()
            .iter()
            .find(|(k, _)| {
                k.metric == metric && k.command == command && k.instance_name == instance_name
            })
            .map(|(_, v)| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Sum of a metric over all labels.
    pub fn total(&self, metric: &str) -> u64 {
        self.counters
            .read()
            .iter()
            .filter(|(k, _)| k.metric == metric)
            .map(|(_, v)| v.load(Ordering::Relaxed))
            .sum()
    }

    /// All series, sorted by metric then labels.
    pub fn snapshot(&self) -> Vec<CounterSample> {
        let sorted: BTreeMap<SeriesKey, u64> = self
            .counters
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect();
        sorted
            .into_iter()
            .map(|(k, value)| CounterSample {
                metric: k.metric,
                command: k.command,
                instance_name: k.instance_name,
                value,
            })
            .collect()
    }

    /// Prometheus text exposition of every series.
    pub fn export_prometheus(&self) -> String {
        let mut out = String::new();
        let mut current: Option<&'static str> = None;
        for sample in self.snapshot() {
            if current != Some(sample.metric) {
                let _ = writeln!(out, "# TYPE {} counter", sample.metric);
                current = Some(sample.metric);
            }
            let _ = writeln!(
                out,
                "{}{{command=\"{}\",instance_name=\"{}\"}} {}",
                sample.metric,
                escape_label(&sample.command),
                escape_label(&sample.instance_name),
                sample.value
            );
        }
        out
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

// ── Tests ──────────────────────────────────────────────────────────
