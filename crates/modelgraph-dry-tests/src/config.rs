// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory config store fake for testing without filesystem I/O.

use modelgraph_core::config::{ConfigError, ConfigStore, IndexerConfig};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory implementation of [`ConfigStore`] for testing.
///
/// Clones share state, so a test can hand one clone to the code under test
/// and inspect the other. Call counters include failed attempts.
///
/// # Example
///
/// ```
/// use modelgraph_dry_tests::InMemoryConfigStore;
/// use modelgraph_core::IndexerConfig;
///
/// let store = InMemoryConfigStore::new();
/// IndexerConfig::default().save(&store).unwrap();
/// assert_eq!(store.save_count(), 1);
/// assert!(store.contains_key("indexer"));
/// ```
#[derive(Clone, Default)]
pub struct InMemoryConfigStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    data: HashMap<String, Vec<u8>>,
    load_count: usize,
    save_count: usize,
    fail_on_load: bool,
    fail_on_save: bool,
}

impl InMemoryConfigStore {
    /// Create a new empty in-memory config store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with the given key-value pairs.
    pub fn with_data(data: HashMap<String, Vec<u8>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                data,
                ..Inner::default()
            })),
        }
    }

    /// Create a store holding `config` under the indexer key, with counters at zero.
    pub fn with_indexer_config(config: &IndexerConfig) -> Result<Self, ConfigError> {
        let store = Self::new();
        config.save(&store)?;
        store.lock().save_count = 0;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Configure the store to fail on load operations.
    pub fn set_fail_on_load(&self, fail: bool) {
        self.lock().fail_on_load = fail;
    }

    /// Configure the store to fail on save operations.
    pub fn set_fail_on_save(&self, fail: bool) {
        self.lock().fail_on_save = fail;
    }

    /// Number of reads, failed ones included.
    pub fn load_count(&self) -> usize {
        self.lock().load_count
    }

    /// Number of writes, failed ones included.
    pub fn save_count(&self) -> usize {
        self.lock().save_count
    }

    /// Check if a key exists in the store.
    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().data.contains_key(key)
    }

    /// Raw bytes stored under `key`.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().data.get(key).cloned()
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, ConfigError> {
        let mut inner = self.lock();
        inner.load_count += 1;
        if inner.fail_on_load {
            return Err(ConfigError::Unavailable("simulated read failure".into()));
        }
        Ok(inner.data.get(key).cloned())
    }

    fn write(&self, key: &str, document: &[u8]) -> Result<(), ConfigError> {
        let mut inner = self.lock();
        inner.save_count += 1;
        if inner.fail_on_save {
            return Err(ConfigError::Unavailable("simulated write failure".into()));
        }
        inner.data.insert(key.to_owned(), document.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use modelgraph_core::config::INDEXER_CONFIG_KEY;

    #[test]
    fn missing_keys_read_as_none_and_are_counted() {
        let store = InMemoryConfigStore::new();
        assert!(store.read("missing").unwrap().is_none());
        assert_eq!(store.load_count(), 1);
    }

    #[test]
    fn failures_are_counted_and_store_nothing() {
        let store = InMemoryConfigStore::new();
        store.set_fail_on_save(true);
        assert!(matches!(store.write("k", b"v"), Err(ConfigError::Unavailable(_))));
        assert_eq!(store.save_count(), 1);
        assert!(!store.contains_key("k"));

        store.set_fail_on_save(false);
        store.write("k", b"v").unwrap();
        store.set_fail_on_load(true);
        assert!(store.read("k").is_err());
        store.set_fail_on_load(false);
        assert_eq!(store.read("k").unwrap().as_deref(), Some(&b"v"[..]));
    }

    #[test]
    fn clones_share_state() {
        let a = InMemoryConfigStore::new();
        let b = a.clone();
        a.write("shared", b"1").unwrap();
        assert_eq!(b.read("shared").unwrap().as_deref(), Some(&b"1"[..]));
        assert_eq!(b.save_count(), 1);
    }

    #[test]
    fn seeded_indexer_config_loads_back() {
        let cfg = IndexerConfig {
            repository_separator: "::".into(),
            ..IndexerConfig::default()
        };
        let store = InMemoryConfigStore::with_indexer_config(&cfg).unwrap();
        assert_eq!(IndexerConfig::load_or_default(&store).unwrap(), cfg);
        let raw: serde_json::Value =
            serde_json::from_slice(&store.raw(INDEXER_CONFIG_KEY).unwrap()).unwrap();
        assert_eq!(raw["repository_separator"], "::");
    }
}
