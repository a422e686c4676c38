// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Transactional, delta-based update of one file.
//!
//! The new element set is compared with the instances already indexed for the
//! file, by identifier and content hash. Only the difference is written, in a
//! single transaction, and every change is logged as non-transient so that
//! derived attributes depending on it are re-evaluated.
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{info, instrument};

use crate::batch::{create_file_node, record_failure, ElementFailure, FileDescriptor};
use crate::cache::TypeInfo;
use crate::constants::{EDGE_PROP_DERIVED, EDGE_TYPE_OF, PROP_HASH, PROP_REVISION};
use crate::context::IndexContext;
use crate::encode::content_hash;
use crate::error::{ElementError, IndexError};
use crate::ident::{hash_hex, NodeId};
use crate::instance::{
    create_instance, file_contents, remove_instance, sync_references, type_info_of,
    update_attributes, TargetResolver,
};
use crate::model::ModelElement;
use crate::proxy::{clear_proxies, resolve_pending};
use crate::store::GraphStore;

/// Counts of one file update.
#[derive(Debug, Default)]
pub struct UpdateStats {
    /// Instances created.
    pub added: usize,
    /// Instances whose content changed.
    pub changed: usize,
    /// Instances left as they were.
    pub unchanged: usize,
    /// Instances deleted.
    pub removed: usize,
    /// Reference edges created.
    pub references_created: usize,
    /// Reference edges deleted.
    pub references_removed: usize,
    /// Proxies recorded for targets outside the graph.
    pub proxies: usize,
    /// Proxies elsewhere that this file resolved.
    pub resolved_proxies: usize,
    /// Proxies into this file that are still missing their target.
    pub unresolved_proxies: usize,
    /// Elements skipped because of element errors.
    pub failures: Vec<ElementFailure>,
}

enum Delta<'e, E> {
    Added(&'e E),
    Changed(&'e E, NodeId),
    Unchanged(&'e E, NodeId),
}

fn declared_type<S: GraphStore + ?Sized>(store: &S, node: NodeId) -> Option<NodeId> {
    store.outgoing(node, Some(EDGE_TYPE_OF)).first().map(|e| e.to)
}

/// Brings the indexed state of `file` in line with `elements`.
///
/// The file node is created if the file is not indexed yet. An element whose
/// declared type changed is removed and added again. Instances that are gone
/// are removed first; incoming references from other files are demoted to
/// proxies and come back if the element reappears.
#[instrument(level = "info", skip(ctx, elements), fields(elements = elements.len()))]
pub fn update_file<S: GraphStore + ?Sized, E: ModelElement>(
    ctx: &mut IndexContext<'_, S>,
    file: &FileDescriptor,
    elements: &[E],
) -> Result<UpdateStats, IndexError> {
    let key = ctx.config.file_key(&file.repository, &file.path);
    ctx.in_tx(|ctx| {
        let mut stats = UpdateStats::default();
        let file_node = match ctx.file_node(&key) {
            Some(node) => node,
            None => create_file_node(ctx, file, &key, false)?,
        };
        let mut existing = file_contents(&*ctx.store, file_node);

        let mut seen = FxHashSet::default();
        let mut deltas: Vec<Delta<'_, E>> = Vec::new();
        let mut removed: Vec<NodeId> = Vec::new();
        for element in elements.iter().filter(|e| !e.is_proxy()) {
            let identifier = element.identifier();
            if !seen.insert(identifier) {
                let err = ElementError::DuplicateIdentifier(identifier.to_owned()).into();
                record_failure(&mut stats.failures, identifier, err)?;
                continue;
            }
            let info: Arc<TypeInfo> = match type_info_of(ctx, element) {
                Ok(info) => info,
                Err(err) => {
                    record_failure(&mut stats.failures, identifier, err)?;
                    continue;
                }
            };
            let Some(node) = existing.remove(identifier) else {
                deltas.push(Delta::Added(element));
                continue;
            };
            if declared_type(&*ctx.store, node) != Some(info.node) {
                removed.push(node);
                deltas.push(Delta::Added(element));
                continue;
            }
            let stored = ctx.store.property(node, PROP_HASH);
            let fresh = hash_hex(&content_hash(element, &info));
            if stored.as_ref().and_then(|v| v.as_str()) == Some(fresh.as_str()) {
                deltas.push(Delta::Unchanged(element, node));
            } else {
                deltas.push(Delta::Changed(element, node));
            }
        }
        removed.extend(existing.into_values());

        // Unchanged elements pointing at removed ones lose those edges and
        // must be wired again.
        let removed_set: FxHashSet<NodeId> = removed.iter().copied().collect();
        for delta in &mut deltas {
            if let Delta::Unchanged(element, node) = *delta {
                let points_at_removed = ctx
                    .store
                    .outgoing(node, None)
                    .iter()
                    .any(|e| !e.has_flag(EDGE_PROP_DERIVED) && removed_set.contains(&e.to));
                if points_at_removed {
                    *delta = Delta::Changed(element, node);
                }
            }
        }

        for node in removed {
            remove_instance(ctx, node, Some(file_node), false)?;
            stats.removed += 1;
        }

        let mut table: FxHashMap<String, NodeId> = file_contents(&*ctx.store, file_node);
        let mut touched: Vec<(&E, NodeId)> = Vec::new();
        for delta in deltas {
            match delta {
                Delta::Added(element) => match create_instance(ctx, element, file_node, false) {
                    Ok(node) => {
                        table.insert(element.identifier().to_owned(), node);
                        touched.push((element, node));
                        stats.added += 1;
                    }
                    Err(err) => record_failure(&mut stats.failures, element.identifier(), err)?,
                },
                Delta::Changed(element, node) => match update_attributes(ctx, node, element, false) {
                    Ok(_) => {
                        clear_proxies(ctx, node)?;
                        touched.push((element, node));
                        stats.changed += 1;
                    }
                    Err(err) => record_failure(&mut stats.failures, element.identifier(), err)?,
                },
                Delta::Unchanged(..) => stats.unchanged += 1,
            }
        }

        let mut resolver = TargetResolver::new(file.repository.clone(), key.clone(), table);
        for (element, node) in touched {
            let info = type_info_of(ctx, element)?;
            let sync = sync_references(ctx, node, element, &info, &mut resolver, false)?;
            stats.references_created += sync.created;
            stats.references_removed += sync.removed;
            stats.proxies += sync.proxies;
        }

        ctx.store
            .set_property(file_node, PROP_REVISION, file.revision.clone().into())?;
        if ctx.config.resolve_proxies_on_insert {
            let resolution = resolve_pending(ctx, &key, resolver.own(), false)?;
            stats.resolved_proxies = resolution.resolved;
            stats.unresolved_proxies = resolution.unresolved.len();
        }
        info!(
            file = %key,
            revision = %file.revision,
            added = stats.added,
            changed = stats.changed,
            unchanged = stats.unchanged,
            removed = stats.removed,
            "file updated"
        );
        Ok(stats)
    })
}
