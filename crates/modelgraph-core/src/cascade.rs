// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Deletion cascade for packages and single files.
//!
//! Deleting a package first collects every package that depends on it
//! (transitively, through incoming `dependency` edges) and sorts the set
//! topologically. Each collected package is then torn down in its own
//! transaction by a small state machine, so a failure rolls back only the
//! package being deleted. Dependents go first: a package is never left behind
//! while something it depends on is gone. Packages that depend on each other
//! in a cycle are deleted in reverse discovery order.
//!
//! Edges never outlive their endpoints: every instance is fully dereferenced
//! before its node is deleted, and files are deleted only once no instance
//! points at them any more.
use std::collections::{BTreeSet, VecDeque};

use rustc_hash::FxHashMap;
use tracing::{debug, info, instrument, warn};

use crate::cache::type_ref_of;
use crate::change_log::{ChangeCategory, ChangeOp};
use crate::constants::{
    attribute_index_prefix, EDGE_DEPENDENCY, EDGE_EPACKAGE, EDGE_FILE, EDGE_KIND_OF, EDGE_TYPE_OF,
    INDEX_PACKAGES, KEY_ID, PROP_REVISION,
};
use crate::context::IndexContext;
use crate::error::IndexError;
use crate::ident::NodeId;
use crate::instance::{delete_instance_node, dereference_instance, remove_instance};
use crate::store::{node_identifier, single_node, GraphStore};

/// Progress of one package through the cascade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CascadeStage {
    /// Deletion asked for.
    Requested,
    /// The full dependent set is known.
    DependentsCollected,
    /// Dependency edges, the package index entry and attribute indices are gone.
    EdgesSevered,
    /// Type nodes are gone; their instances are collected.
    TypesDeleted,
    /// Collected instances have no edges left.
    InstancesDereferenced,
    /// Collected instance nodes are gone.
    InstancesDeleted,
    /// Files left without instances are known.
    FilesCollected,
    /// Orphaned files are gone.
    FilesDeleted,
    /// The package node is gone.
    Done,
}

impl CascadeStage {
    /// Stage that follows this one. `Done` is terminal.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Requested => Self::DependentsCollected,
            Self::DependentsCollected => Self::EdgesSevered,
            Self::EdgesSevered => Self::TypesDeleted,
            Self::TypesDeleted => Self::InstancesDereferenced,
            Self::InstancesDereferenced => Self::InstancesDeleted,
            Self::InstancesDeleted => Self::FilesCollected,
            Self::FilesCollected => Self::FilesDeleted,
            Self::FilesDeleted | Self::Done => Self::Done,
        }
    }
}

/// What a package deletion removed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeletionReport {
    /// URIs of the deleted packages, in deletion order.
    pub packages: Vec<String>,
    /// Type nodes deleted.
    pub types: usize,
    /// Instance nodes deleted.
    pub instances: usize,
    /// File nodes deleted.
    pub files: usize,
}

/// What a single-file deletion removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileDeletion {
    /// Instance nodes deleted.
    pub instances: usize,
    /// Incoming cross-file references turned back into proxies.
    pub demoted: usize,
}

/// Every package reachable from `roots` through incoming `dependency` edges,
/// roots included, in discovery order.
pub fn collect_dependents<S: GraphStore + ?Sized>(store: &S, roots: &[NodeId]) -> Vec<NodeId> {
    let mut seen: BTreeSet<NodeId> = BTreeSet::new();
    let mut worklist: Vec<NodeId> = Vec::new();
    for root in roots {
        if seen.insert(*root) {
            worklist.push(*root);
        }
    }
    let mut i = 0;
    while i < worklist.len() {
        for edge in store.incoming(worklist[i], Some(EDGE_DEPENDENCY)) {
            if seen.insert(edge.from) {
                worklist.push(edge.from);
            }
        }
        i += 1;
    }
    worklist
}

/// Orders `collected` so that every package precedes the packages it depends
/// on (Kahn's algorithm over the `dependency` edges inside the set).
pub fn deletion_order<S: GraphStore + ?Sized>(store: &S, collected: &[NodeId]) -> Vec<NodeId> {
    let members: BTreeSet<NodeId> = collected.iter().copied().collect();
    // Number of not yet ordered dependents per package.
    let mut waiting: FxHashMap<NodeId, usize> = collected
        .iter()
        .map(|p| {
            let dependents = store
                .incoming(*p, Some(EDGE_DEPENDENCY))
                .iter()
                .filter(|e| e.from != *p && members.contains(&e.from))
                .map(|e| e.from)
                .collect::<BTreeSet<_>>()
                .len();
            (*p, dependents)
        })
        .collect();
    let mut ready: VecDeque<NodeId> = collected
        .iter()
        .copied()
        .filter(|p| waiting.get(p) == Some(&0))
        .collect();
    let mut order = Vec::with_capacity(collected.len());
    let mut placed = BTreeSet::new();
    while let Some(package) = ready.pop_front() {
        if !placed.insert(package) {
            continue;
        }
        order.push(package);
        let dependencies: BTreeSet<NodeId> = store
            .outgoing(package, Some(EDGE_DEPENDENCY))
            .iter()
            .map(|e| e.to)
            .filter(|d| *d != package && members.contains(d))
            .collect();
        for dependency in dependencies {
            if let Some(count) = waiting.get_mut(&dependency) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.push_back(dependency);
                }
            }
        }
    }
    if order.len() < collected.len() {
        warn!(
            cyclic = collected.len() - order.len(),
            "packages depend on each other in a cycle"
        );
        order.extend(collected.iter().rev().filter(|p| !placed.contains(p)));
    }
    order
}

struct PackageDeletion {
    package: NodeId,
    uri: String,
    stage: CascadeStage,
    instances: BTreeSet<NodeId>,
    files: BTreeSet<NodeId>,
    orphans: Vec<NodeId>,
    types: usize,
}

impl PackageDeletion {
    fn new(package: NodeId, uri: String) -> Self {
        Self {
            package,
            uri,
            stage: CascadeStage::DependentsCollected,
            instances: BTreeSet::new(),
            files: BTreeSet::new(),
            orphans: Vec::new(),
            types: 0,
        }
    }

    fn run<S: GraphStore + ?Sized>(&mut self, ctx: &mut IndexContext<'_, S>) -> Result<(), IndexError> {
        while self.stage != CascadeStage::Done {
            self.step(ctx)?;
            self.stage = self.stage.next();
            debug!(package = %self.uri, stage = ?self.stage, "cascade advanced");
        }
        Ok(())
    }

    fn step<S: GraphStore + ?Sized>(&mut self, ctx: &mut IndexContext<'_, S>) -> Result<(), IndexError> {
        match self.stage {
            CascadeStage::Requested | CascadeStage::Done => {}
            CascadeStage::DependentsCollected => self.sever(ctx)?,
            CascadeStage::EdgesSevered => self.delete_types(ctx)?,
            CascadeStage::TypesDeleted => {
                for &instance in &self.instances {
                    for edge in ctx.store.outgoing(instance, Some(EDGE_FILE)) {
                        self.files.insert(edge.to);
                        ctx.store.delete_edge(edge.id)?;
                    }
                    dereference_instance(ctx, instance, None, false)?;
                }
            }
            CascadeStage::InstancesDereferenced => {
                for instance in &self.instances {
                    delete_instance_node(ctx, *instance, false)?;
                }
            }
            CascadeStage::InstancesDeleted => {
                self.orphans = self
                    .files
                    .iter()
                    .copied()
                    .filter(|f| ctx.store.incoming(*f, Some(EDGE_FILE)).is_empty())
                    .collect();
            }
            CascadeStage::FilesCollected => {
                for file in &self.orphans {
                    let key = ctx.file_key_of(*file).unwrap_or_default();
                    let revision = ctx.store.property(*file, PROP_REVISION);
                    ctx.store.delete_node(*file)?;
                    ctx.emit(ChangeOp::Remove, ChangeCategory::File, key, revision, false);
                }
            }
            CascadeStage::FilesDeleted => {
                ctx.store.delete_node(self.package)?;
                ctx.emit(
                    ChangeOp::Remove,
                    ChangeCategory::Metamodel,
                    self.uri.clone(),
                    None,
                    false,
                );
            }
        }
        Ok(())
    }

    fn sever<S: GraphStore + ?Sized>(&self, ctx: &mut IndexContext<'_, S>) -> Result<(), IndexError> {
        let edges = ctx
            .store
            .outgoing(self.package, Some(EDGE_DEPENDENCY))
            .into_iter()
            .chain(ctx.store.incoming(self.package, Some(EDGE_DEPENDENCY)));
        for edge in edges.collect::<Vec<_>>() {
            ctx.store.delete_edge(edge.id)?;
        }
        ctx.store
            .index_remove(INDEX_PACKAGES, self.package, Some(KEY_ID), None)?;
        let prefix = attribute_index_prefix(&self.uri);
        for name in ctx.store.index_names() {
            if name.starts_with(&prefix) {
                ctx.store.drop_index(&name)?;
            }
        }
        Ok(())
    }

    fn delete_types<S: GraphStore + ?Sized>(
        &mut self,
        ctx: &mut IndexContext<'_, S>,
    ) -> Result<(), IndexError> {
        for epackage in ctx.store.incoming(self.package, Some(EDGE_EPACKAGE)) {
            let type_node = epackage.from;
            let type_ref = type_ref_of(&*ctx.store, type_node);
            for label in [EDGE_TYPE_OF, EDGE_KIND_OF] {
                for edge in ctx.store.incoming(type_node, Some(label)) {
                    self.instances.insert(edge.from);
                    ctx.store.delete_edge(edge.id)?;
                }
            }
            ctx.store.delete_edge(epackage.id)?;
            ctx.store.delete_node(type_node)?;
            ctx.cache.invalidate(type_node);
            self.types += 1;
            let identifier = type_ref.map_or_else(
                || node_identifier(&*ctx.store, type_node).unwrap_or_default(),
                |t| t.to_string(),
            );
            ctx.emit(ChangeOp::Remove, ChangeCategory::Type, identifier, None, false);
        }
        Ok(())
    }
}

/// Deletes the packages named by `uris` and everything that depends on them.
///
/// Unknown URIs are skipped with a warning. Each package is deleted in its own
/// transaction; on failure, packages already deleted stay deleted and are
/// listed in [`IndexError::CascadeFailed`].
#[instrument(level = "info", skip(ctx))]
pub fn delete_packages<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    uris: &[String],
) -> Result<DeletionReport, IndexError> {
    let mut roots = Vec::new();
    for uri in uris {
        match single_node(&*ctx.store, INDEX_PACKAGES, KEY_ID, uri) {
            Some(node) => roots.push(node),
            None => warn!(package = %uri, "package is not registered, nothing to delete"),
        }
    }
    debug!(stage = ?CascadeStage::Requested, roots = roots.len(), "cascade requested");
    let collected = collect_dependents(&*ctx.store, &roots);
    if collected.len() > roots.len() {
        info!(dependents = collected.len() - roots.len(), "dependent packages will be deleted too");
    }

    let mut report = DeletionReport::default();
    for package in deletion_order(&*ctx.store, &collected) {
        let uri = node_identifier(&*ctx.store, package).unwrap_or_default();
        let mut deletion = PackageDeletion::new(package, uri.clone());
        let outcome = ctx.in_tx(|ctx| deletion.run(ctx));
        if let Err(source) = outcome {
            warn!(package = %uri, stage = ?deletion.stage, error = %source, "package deletion rolled back");
            return Err(IndexError::CascadeFailed {
                package: uri,
                completed: report.packages,
                source: Box::new(source),
            });
        }
        report.types += deletion.types;
        report.instances += deletion.instances.len();
        report.files += deletion.orphans.len();
        report.packages.push(uri);
    }
    ctx.cache.invalidate_all();
    info!(
        packages = report.packages.len(),
        types = report.types,
        instances = report.instances,
        files = report.files,
        "packages deleted"
    );
    Ok(report)
}

/// Deletes one file and every instance in it.
///
/// Incoming references from other files are demoted to proxies first, so
/// re-inserting the file restores them.
#[instrument(level = "info", skip(ctx))]
pub fn delete_file<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    file_key: &str,
    transient: bool,
) -> Result<FileDeletion, IndexError> {
    ctx.in_tx(|ctx| {
        let file = ctx
            .file_node(file_key)
            .ok_or_else(|| IndexError::FileNotIndexed(file_key.to_owned()))?;
        let mut deletion = FileDeletion::default();
        for edge in ctx.store.incoming(file, Some(EDGE_FILE)) {
            deletion.demoted += remove_instance(ctx, edge.from, Some(file), transient)?;
            deletion.instances += 1;
        }
        let revision = ctx.store.property(file, PROP_REVISION);
        ctx.store.delete_node(file)?;
        ctx.emit(
            ChangeOp::Remove,
            ChangeCategory::File,
            file_key,
            revision,
            transient,
        );
        info!(
            file = file_key,
            instances = deletion.instances,
            demoted = deletion.demoted,
            "file deleted"
        );
        Ok(deletion)
    })
}
