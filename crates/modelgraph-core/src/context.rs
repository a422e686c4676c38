// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Borrowed state threaded through every indexing pass.
use crate::cache::TypeCache;
use crate::change_log::{ChangeCategory, ChangeLog, ChangeOp};
use crate::config::IndexerConfig;
use crate::constants::{INDEX_FILES, KEY_ID, PROP_ID, PROP_REPOSITORY};
use crate::error::IndexError;
use crate::ident::NodeId;
use crate::store::{single_node, GraphStore};
use crate::value::PropertyValue;

/// Store, caches, change log and settings of one indexer, borrowed for a pass.
pub struct IndexContext<'a, S: GraphStore + ?Sized> {
    /// Backing store.
    pub store: &'a mut S,
    /// Type and descriptor cache.
    pub cache: &'a mut TypeCache,
    /// Change sink.
    pub log: &'a mut ChangeLog,
    /// Settings.
    pub config: &'a IndexerConfig,
}

impl<'a, S: GraphStore + ?Sized> IndexContext<'a, S> {
    /// Bundles the parts.
    pub fn new(
        store: &'a mut S,
        cache: &'a mut TypeCache,
        log: &'a mut ChangeLog,
        config: &'a IndexerConfig,
    ) -> Self {
        Self {
            store,
            cache,
            log,
            config,
        }
    }

    /// Runs `f` with commit-or-rollback semantics.
    ///
    /// On rollback the change records appended by `f` are discarded and the
    /// type cache is flushed, since both may describe writes that no longer
    /// exist. In bulk mode there is no transaction and `f` runs directly; the
    /// caller owns recovery in that case.
    pub fn in_tx<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, IndexError>,
    ) -> Result<T, IndexError> {
        if self.store.is_bulk_mode() {
            return f(self);
        }
        let tx = self.store.begin_tx()?;
        let mark = self.log.mark();
        match f(self) {
            Ok(value) => {
                self.store.commit(tx)?;
                Ok(value)
            }
            Err(err) => {
                // The original error is more useful than a rollback failure.
                let _ = self.store.rollback(tx);
                self.log.truncate(mark);
                self.cache.invalidate_all();
                Err(err)
            }
        }
    }

    /// Appends a change record.
    pub fn emit(
        &mut self,
        op: ChangeOp,
        category: ChangeCategory,
        identifier: impl Into<String>,
        value: Option<PropertyValue>,
        transient: bool,
    ) {
        self.log.emit(op, category, identifier, value, transient);
    }

    /// File node stored under `file_key`.
    pub fn file_node(&self, file_key: &str) -> Option<NodeId> {
        single_node(&*self.store, INDEX_FILES, KEY_ID, file_key)
    }

    /// File key of a file node.
    pub fn file_key_of(&self, file_node: NodeId) -> Option<String> {
        let path = self.store.property(file_node, PROP_ID)?;
        let repository = self.store.property(file_node, PROP_REPOSITORY)?;
        Some(self.config.file_key(repository.as_str()?, path.as_str()?))
    }
}
