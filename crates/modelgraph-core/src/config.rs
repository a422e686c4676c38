// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Indexer settings and the storage port they are persisted through.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key under which [`IndexerConfig`] is persisted.
pub const INDEXER_CONFIG_KEY: &str = "indexer";

/// Holds settings documents (JSON) under logical keys.
pub trait ConfigStore {
    /// Document stored under `key`, `None` when nothing is stored.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, ConfigError>;
    /// Replaces the document stored under `key`.
    fn write(&self, key: &str, document: &[u8]) -> Result<(), ConfigError>;
}

/// Loading or saving settings failed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the backing storage failed.
    #[error("config i/o failed: {0}")]
    Io(#[from] std::io::Error),
    /// The stored document is not a valid indexer config.
    #[error("malformed indexer config: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The store cannot be reached at all.
    #[error("config store unavailable: {0}")]
    Unavailable(String),
}

/// Tunables of an indexing session.
///
/// Missing fields take their defaults, so a partial JSON document is valid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Joins repository URL and file path into a file key.
    pub repository_separator: String,
    /// Elements between two progress log lines during batch insertion.
    pub progress_interval: usize,
    /// Run batch insertion under the store's bulk-load mode.
    pub bulk_load: bool,
    /// Resolve proxies pointing at a file right after inserting it.
    pub resolve_proxies_on_insert: bool,
    /// Characters of derivation logic echoed in log lines.
    pub derivation_log_snippet: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            repository_separator: "||||".to_owned(),
            progress_interval: 50_000,
            bulk_load: true,
            resolve_proxies_on_insert: true,
            derivation_log_snippet: 100,
        }
    }
}

impl IndexerConfig {
    /// Loads the persisted config. A missing or empty document yields the
    /// defaults and writes nothing.
    pub fn load_or_default<S: ConfigStore + ?Sized>(store: &S) -> Result<Self, ConfigError> {
        match store.read(INDEXER_CONFIG_KEY)? {
            Some(document) if !document.is_empty() => Ok(serde_json::from_slice(&document)?),
            _ => Ok(Self::default()),
        }
    }

    /// Persists the config as pretty-printed JSON.
    pub fn save<S: ConfigStore + ?Sized>(&self, store: &S) -> Result<(), ConfigError> {
        store.write(INDEXER_CONFIG_KEY, &serde_json::to_vec_pretty(self)?)
    }

    /// File key of `path` in `repository`.
    #[must_use]
    pub fn file_key(&self, repository: &str, path: &str) -> String {
        format!("{repository}{}{path}", self.repository_separator)
    }

    /// First `derivation_log_snippet` characters of `logic`.
    #[must_use]
    pub fn snippet<'a>(&self, logic: &'a str) -> &'a str {
        match logic.char_indices().nth(self.derivation_log_snippet) {
            Some((at, _)) => &logic[..at],
            None => logic,
        }
    }
}
