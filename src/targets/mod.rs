use std::collections::btree_map::{self, BTreeMap};

use serde::Serialize;

pub mod file;

/// One entry of a Prometheus file based service discovery document.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PrometheusTarget {
    pub targets: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

impl PrometheusTarget {
    pub fn new(endpoint: String) -> Self {
        PrometheusTarget {
            targets: vec![endpoint],
            labels: BTreeMap::new(),
        }
    }

    /// Sets a label, skipping empty values. Later calls win over earlier ones.
    pub fn add_label(&mut self, key: &str, value: &str) {
        if !value.is_empty() {
            self.labels.insert(key.to_owned(), value.to_owned());
        }
    }
}

/// Targets of one discovery cycle, keyed by `ip:port<metrics path>`.
///
/// The first target stored under a key is kept; later ones are dropped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TargetMap {
    targets: BTreeMap<String, PrometheusTarget>,
}

impl TargetMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(ip: &str, port: u16, metrics_path: &str) -> String {
        format!("{}:{}{}", ip, port, metrics_path)
    }

    /// Stores the target built by `build` unless `key` is already taken.
    /// Returns whether the target was stored.
    pub fn insert_with(&mut self, key: String, build: impl FnOnce() -> PrometheusTarget) -> bool {
        match self.targets.entry(key) {
            btree_map::Entry::Occupied(_) => false,
            btree_map::Entry::Vacant(entry) => {
                entry.insert(build());
                true
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&PrometheusTarget> {
        self.targets.get(key)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Targets ordered by key.
    pub fn values(&self) -> impl Iterator<Item = &PrometheusTarget> {
        self.targets.values()
    }
}
