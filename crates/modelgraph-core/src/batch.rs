// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Two-pass batch insertion of one file.
//!
//! The element pass creates every instance node and fills an in-memory
//! `identifier -> node` table; the reference pass then wires references using
//! that table, falling back to the graph for other files and to proxies for
//! targets that are not indexed yet. The table lives for one file only.
//!
//! Element errors are recorded and the element is skipped. Any other error
//! fails the whole file: everything written for it is deleted again, so a file
//! is never left half indexed.
use rustc_hash::FxHashMap;
use tracing::{info, instrument, warn};

use crate::cascade::delete_file;
use crate::change_log::{ChangeCategory, ChangeOp};
use crate::constants::{INDEX_FILES, KEY_ID, LABEL_FILE, PROP_ID, PROP_REPOSITORY, PROP_REVISION};
use crate::context::IndexContext;
use crate::error::{ElementError, IndexError};
use crate::ident::NodeId;
use crate::instance::{create_instance, sync_references, type_info_of, TargetResolver};
use crate::model::ModelElement;
use crate::proxy::resolve_pending;
use crate::record::Properties;
use crate::store::GraphStore;
use crate::value::PropertyValue;

/// Identity of a file within a repository.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileDescriptor {
    /// Repository the file belongs to.
    pub repository: String,
    /// Repository-relative path.
    pub path: String,
    /// Revision being indexed.
    pub revision: String,
}

impl FileDescriptor {
    /// Describes `path` at `revision` in `repository`.
    pub fn new(
        repository: impl Into<String>,
        path: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            path: path.into(),
            revision: revision.into(),
        }
    }
}

/// An element that was skipped, and why.
#[derive(Debug)]
pub struct ElementFailure {
    /// Element identifier.
    pub identifier: String,
    /// Non-fatal error.
    pub error: IndexError,
}

/// Counts of one file insertion.
#[derive(Debug, Default)]
pub struct InsertStats {
    /// Elements handed in.
    pub elements: usize,
    /// Instance nodes created.
    pub inserted: usize,
    /// Proxy elements ignored.
    pub skipped: usize,
    /// Reference edges created by the reference pass.
    pub references: usize,
    /// Proxies recorded for targets outside the graph.
    pub proxies: usize,
    /// Proxies elsewhere that this file resolved.
    pub resolved_proxies: usize,
    /// Proxies into this file that are still missing their target.
    pub unresolved_proxies: usize,
    /// Elements skipped because of element errors.
    pub failures: Vec<ElementFailure>,
}

/// Creates and indexes the node of `file`.
pub(crate) fn create_file_node<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    file: &FileDescriptor,
    key: &str,
    transient: bool,
) -> Result<NodeId, IndexError> {
    let mut props = Properties::new();
    props.insert(PROP_ID.to_owned(), file.path.clone().into());
    props.insert(PROP_REPOSITORY.to_owned(), file.repository.clone().into());
    props.insert(PROP_REVISION.to_owned(), file.revision.clone().into());
    let node = ctx.store.create_node(LABEL_FILE, props)?;
    ctx.store
        .index_add(INDEX_FILES, node, KEY_ID, &PropertyValue::Str(key.to_owned()))?;
    let revision = Some(PropertyValue::Str(file.revision.clone()));
    ctx.emit(ChangeOp::Add, ChangeCategory::File, key, revision, transient);
    Ok(node)
}

/// Records a skipped element if `err` is an element error, else hands it back.
pub(crate) fn record_failure(
    failures: &mut Vec<ElementFailure>,
    identifier: &str,
    err: IndexError,
) -> Result<(), IndexError> {
    if err.is_fatal() {
        return Err(err);
    }
    warn!(element = identifier, error = %err, "element skipped");
    failures.push(ElementFailure {
        identifier: identifier.to_owned(),
        error: err,
    });
    Ok(())
}

/// Inserts a file that is not indexed yet.
///
/// With `bulk_load` configured the store is switched to bulk mode for the
/// duration of the call and switched back on every path.
#[instrument(level = "info", skip(ctx, elements), fields(elements = elements.len()))]
pub fn insert_file<S: GraphStore + ?Sized, E: ModelElement>(
    ctx: &mut IndexContext<'_, S>,
    file: &FileDescriptor,
    elements: &[E],
) -> Result<InsertStats, IndexError> {
    let key = ctx.config.file_key(&file.repository, &file.path);
    if ctx.file_node(&key).is_some() {
        return Err(IndexError::FileAlreadyIndexed(key));
    }
    if !ctx.config.bulk_load {
        return ctx
            .in_tx(|ctx| load(ctx, file, &key, elements))
            .map_err(|source| IndexError::FileFailed {
                file: key,
                source: Box::new(source),
            });
    }

    let mark = ctx.log.mark();
    ctx.store.enter_bulk_mode()?;
    let outcome = load(ctx, file, &key, elements).map_err(|source| {
        warn!(file = %key, error = %source, "file insertion failed, removing partial state");
        if ctx.file_node(&key).is_some() {
            if let Err(cleanup) = delete_file(ctx, &key, true) {
                warn!(file = %key, error = %cleanup, "partial state could not be removed");
            }
        }
        ctx.log.truncate(mark);
        ctx.cache.invalidate_all();
        IndexError::FileFailed {
            file: key,
            source: Box::new(source),
        }
    });
    ctx.store.exit_bulk_mode()?;
    outcome
}

fn load<S: GraphStore + ?Sized, E: ModelElement>(
    ctx: &mut IndexContext<'_, S>,
    file: &FileDescriptor,
    key: &str,
    elements: &[E],
) -> Result<InsertStats, IndexError> {
    let file_node = create_file_node(ctx, file, key, true)?;
    let mut stats = InsertStats {
        elements: elements.len(),
        ..InsertStats::default()
    };

    let interval = ctx.config.progress_interval;
    let mut next_progress = interval;
    let mut table: FxHashMap<String, NodeId> = FxHashMap::default();
    let mut created: Vec<(&E, NodeId)> = Vec::with_capacity(elements.len());
    for (done, element) in elements.iter().enumerate() {
        if interval > 0 && done >= next_progress {
            info!(file = key, done, total = elements.len(), "element pass progress");
            next_progress += interval;
        }
        if element.is_proxy() {
            stats.skipped += 1;
            continue;
        }
        let identifier = element.identifier();
        if table.contains_key(identifier) {
            let err = ElementError::DuplicateIdentifier(identifier.to_owned()).into();
            record_failure(&mut stats.failures, identifier, err)?;
            continue;
        }
        match create_instance(ctx, element, file_node, true) {
            Ok(node) => {
                table.insert(identifier.to_owned(), node);
                created.push((element, node));
                stats.inserted += 1;
            }
            Err(err) => record_failure(&mut stats.failures, identifier, err)?,
        }
    }

    let mut resolver = TargetResolver::new(file.repository.clone(), key, table);
    for (element, node) in created {
        let info = type_info_of(ctx, element)?;
        match sync_references(ctx, node, element, &info, &mut resolver, true) {
            Ok(sync) => {
                stats.references += sync.created;
                stats.proxies += sync.proxies;
            }
            Err(err) => record_failure(&mut stats.failures, element.identifier(), err)?,
        }
    }

    if ctx.config.resolve_proxies_on_insert {
        let resolution = resolve_pending(ctx, key, resolver.own(), true)?;
        stats.resolved_proxies = resolution.resolved;
        stats.unresolved_proxies = resolution.unresolved.len();
    }
    info!(
        file = key,
        inserted = stats.inserted,
        failed = stats.failures.len(),
        references = stats.references,
        proxies = stats.proxies,
        resolved = stats.resolved_proxies,
        "file inserted"
    );
    Ok(stats)
}
