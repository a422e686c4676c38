// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Indexer facade.
//!
//! [`ModelIndexer`] owns one store together with the type cache, the change
//! log and the settings, and routes every operation through a freshly borrowed
//! [`IndexContext`]. It is the single writer of its store.
use tracing::{info, instrument};

use crate::batch::{self, FileDescriptor, InsertStats};
use crate::cache::{find_type_node, TypeCache};
use crate::cascade::{self, DeletionReport, FileDeletion};
use crate::change_log::{ChangeLog, ChangeRecord, ChangeStats};
use crate::config::IndexerConfig;
use crate::constants::{attribute_index_name, INDEX_FILES, INDEX_ROOTS, KEY_ID, KEY_ROOT_FILE};
use crate::context::IndexContext;
use crate::derived::{self, DerivationEngine, DerivationReport, DerivedAttributeSpec};
use crate::error::IndexError;
use crate::ident::NodeId;
use crate::incremental::{self, UpdateStats};
use crate::instance::file_contents;
use crate::model::ModelElement;
use crate::proxy::{self, ProxyResolution};
use crate::registrar::{self, RegistrationReport};
use crate::schema::{PackageDef, TypeRef};
use crate::store::{single_node, GraphStore, IndexQuery};
use crate::value::IndexKey;

/// Which inserter [`ModelIndexer::insert_file`] uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IndexerMode {
    /// Initial load: batch insertion, batch-origin (transient) changes.
    #[default]
    InitialLoad,
    /// Live: transactional insertion, non-transient changes.
    Live,
}

impl From<UpdateStats> for InsertStats {
    fn from(u: UpdateStats) -> Self {
        Self {
            elements: u.added + u.changed + u.unchanged + u.failures.len(),
            inserted: u.added,
            skipped: 0,
            references: u.references_created,
            proxies: u.proxies,
            resolved_proxies: u.resolved_proxies,
            unresolved_proxies: u.unresolved_proxies,
            failures: u.failures,
        }
    }
}

/// Single-writer indexer over a [`GraphStore`].
#[derive(Debug)]
pub struct ModelIndexer<S: GraphStore> {
    store: S,
    cache: TypeCache,
    log: ChangeLog,
    config: IndexerConfig,
    mode: IndexerMode,
}

impl<S: GraphStore> ModelIndexer<S> {
    /// Wraps `store`, starting in [`IndexerMode::InitialLoad`].
    pub fn new(store: S, config: IndexerConfig) -> Self {
        Self {
            store,
            cache: TypeCache::new(),
            log: ChangeLog::new(),
            config,
            mode: IndexerMode::InitialLoad,
        }
    }

    fn ctx(&mut self) -> IndexContext<'_, S> {
        IndexContext::new(&mut self.store, &mut self.cache, &mut self.log, &self.config)
    }

    /// Backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Backing store, mutably. Flushes the type cache, since direct writes may
    /// touch type nodes.
    pub fn store_mut(&mut self) -> &mut S {
        self.cache.invalidate_all();
        &mut self.store
    }

    /// Gives the store back.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Settings.
    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Current insertion mode.
    pub fn mode(&self) -> IndexerMode {
        self.mode
    }

    /// Switches the insertion mode.
    pub fn set_mode(&mut self, mode: IndexerMode) {
        if mode != self.mode {
            info!(from = ?self.mode, to = ?mode, "indexer mode switched");
        }
        self.mode = mode;
    }

    /// Ends the initial load; every later insertion is transactional.
    pub fn go_live(&mut self) {
        self.set_mode(IndexerMode::Live);
    }

    /// Registers packages. See [`registrar::register_packages`].
    pub fn register_packages(&mut self, packages: &[PackageDef]) -> Result<RegistrationReport, IndexError> {
        registrar::register_packages(&mut self.ctx(), packages)
    }

    /// Removes packages and their dependents. See [`cascade::delete_packages`].
    pub fn unregister_packages(&mut self, uris: &[String]) -> Result<DeletionReport, IndexError> {
        registrar::unregister_packages(&mut self.ctx(), uris)
    }

    /// Inserts a new file with the inserter of the current mode.
    #[instrument(level = "debug", skip(self, elements), fields(mode = ?self.mode))]
    pub fn insert_file<E: ModelElement>(
        &mut self,
        file: &FileDescriptor,
        elements: &[E],
    ) -> Result<InsertStats, IndexError> {
        match self.mode {
            IndexerMode::InitialLoad => batch::insert_file(&mut self.ctx(), file, elements),
            IndexerMode::Live => {
                if self.file_node(&file.repository, &file.path).is_some() {
                    let key = self.config.file_key(&file.repository, &file.path);
                    return Err(IndexError::FileAlreadyIndexed(key));
                }
                incremental::update_file(&mut self.ctx(), file, elements).map(InsertStats::from)
            }
        }
    }

    /// Applies a new revision of a file. See [`incremental::update_file`].
    pub fn update_file<E: ModelElement>(
        &mut self,
        file: &FileDescriptor,
        elements: &[E],
    ) -> Result<UpdateStats, IndexError> {
        incremental::update_file(&mut self.ctx(), file, elements)
    }

    /// Deletes a file and its instances.
    pub fn delete_file(&mut self, repository: &str, path: &str) -> Result<FileDeletion, IndexError> {
        let key = self.config.file_key(repository, path);
        let transient = self.mode == IndexerMode::InitialLoad;
        cascade::delete_file(&mut self.ctx(), &key, transient)
    }

    /// Resolves the proxies pointing into an indexed file.
    ///
    /// Insertion does this on its own unless `resolve_proxies_on_insert` is
    /// off; this is the deferred path for that setting.
    pub fn resolve_proxies(&mut self, repository: &str, path: &str) -> Result<ProxyResolution, IndexError> {
        let key = self.config.file_key(repository, path);
        let file = self
            .file_node(repository, path)
            .ok_or_else(|| IndexError::FileNotIndexed(key.clone()))?;
        let contents = file_contents(&self.store, file);
        let transient = self.mode == IndexerMode::InitialLoad;
        self.ctx()
            .in_tx(|ctx| proxy::resolve_pending(ctx, &key, &contents, transient))
    }

    /// See [`derived::add_derived_attribute`].
    pub fn add_derived_attribute(
        &mut self,
        package: &str,
        type_name: &str,
        spec: &DerivedAttributeSpec,
    ) -> Result<bool, IndexError> {
        derived::add_derived_attribute(&mut self.ctx(), package, type_name, spec)
    }

    /// See [`derived::remove_derived_attribute`].
    pub fn remove_derived_attribute(
        &mut self,
        package: &str,
        type_name: &str,
        feature: &str,
    ) -> Result<usize, IndexError> {
        derived::remove_derived_attribute(&mut self.ctx(), package, type_name, feature)
    }

    /// See [`derived::propagate_derived_attribute`].
    pub fn propagate_derived_attribute(
        &mut self,
        package: &str,
        type_name: &str,
        feature: &str,
    ) -> Result<usize, IndexError> {
        derived::propagate_derived_attribute(&mut self.ctx(), package, type_name, feature)
    }

    /// See [`derived::add_indexed_attribute`].
    pub fn add_indexed_attribute(
        &mut self,
        package: &str,
        type_name: &str,
        attribute: &str,
    ) -> Result<bool, IndexError> {
        derived::add_indexed_attribute(&mut self.ctx(), package, type_name, attribute)
    }

    /// See [`derived::remove_indexed_attribute`].
    pub fn remove_indexed_attribute(
        &mut self,
        package: &str,
        type_name: &str,
        attribute: &str,
    ) -> Result<bool, IndexError> {
        derived::remove_indexed_attribute(&mut self.ctx(), package, type_name, attribute)
    }

    /// See [`derived::propagate_indexed_attribute`].
    pub fn propagate_indexed_attribute(
        &mut self,
        package: &str,
        type_name: &str,
        attribute: &str,
    ) -> Result<usize, IndexError> {
        derived::propagate_indexed_attribute(&mut self.ctx(), package, type_name, attribute)
    }

    /// Re-marks derived holders affected by `changes`. See [`derived::mark_dirty`].
    pub fn mark_dirty(&mut self, changes: &[ChangeRecord]) -> Result<usize, IndexError> {
        derived::mark_dirty(&mut self.ctx(), changes)
    }

    /// Derives pending holders. See [`derived::derive_pending`].
    pub fn derive_pending<D: DerivationEngine>(&mut self, engine: &mut D) -> Result<DerivationReport, IndexError> {
        derived::derive_pending(&mut self.ctx(), engine)
    }

    /// Changes recorded since the last [`take_changes`](Self::take_changes).
    pub fn changes(&self) -> &[ChangeRecord] {
        self.log.records()
    }

    /// Hands the recorded changes to their consumer and clears the log.
    pub fn take_changes(&mut self) -> Vec<ChangeRecord> {
        self.log.take()
    }

    /// Per-category counts of the recorded changes.
    pub fn change_stats(&self) -> ChangeStats {
        self.log.stats()
    }

    /// Proxy entries still waiting for their target.
    pub fn unresolved_proxy_count(&self) -> usize {
        proxy::unresolved_count(&self.store)
    }

    /// Derived holders still waiting for derivation.
    pub fn pending_derivations(&self) -> usize {
        derived::pending_derivations(&self.store)
    }

    /// Node of a registered type.
    pub fn type_node(&self, type_ref: &TypeRef) -> Option<NodeId> {
        find_type_node(&self.store, type_ref)
    }

    /// Node of an indexed file.
    pub fn file_node(&self, repository: &str, path: &str) -> Option<NodeId> {
        let key = self.config.file_key(repository, path);
        single_node(&self.store, INDEX_FILES, KEY_ID, &key)
    }

    /// Instance of `identifier` in an indexed file.
    pub fn instance(&self, repository: &str, path: &str, identifier: &str) -> Option<NodeId> {
        let file = self.file_node(repository, path)?;
        file_contents(&self.store, file).get(identifier).copied()
    }

    /// Root instances of an indexed file.
    pub fn roots(&self, repository: &str, path: &str) -> Vec<NodeId> {
        self.file_node(repository, path).map_or_else(Vec::new, |file| {
            self.store
                .index_get(INDEX_ROOTS, KEY_ROOT_FILE, &IndexKey::from(file.to_string().as_str()))
        })
    }

    /// Instances of `package#type_name` whose indexed `attribute` matches `query`.
    pub fn query_indexed(
        &self,
        package: &str,
        type_name: &str,
        attribute: &str,
        query: &IndexQuery,
    ) -> Vec<NodeId> {
        self.store
            .index_query(&attribute_index_name(package, type_name, attribute), attribute, query)
    }
}
