// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Instance node writer shared by the batch and incremental inserters.
//!
//! Creates instance nodes with their classification edges, derived
//! placeholders and attribute index entries; synchronizes reference edges
//! against a target resolver; rewrites attributes; and removes instances,
//! demoting cross-file incoming references back to proxies.
use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::cache::TypeInfo;
use crate::change_log::{ChangeCategory, ChangeOp, ChangeRecord};
use crate::constants::{
    attribute_index_name, DERIVED_PROP_LANGUAGE, DERIVED_PROP_LOGIC, DERIVED_PROP_MANY,
    DERIVED_PROP_ORDERED, DERIVED_PROP_TYPE, DERIVED_PROP_UNIQUE, EDGE_FILE, EDGE_KIND_OF,
    EDGE_PROP_DERIVED, EDGE_TYPE_OF, INDEX_PENDING_DERIVED, INDEX_ROOTS, KEY_DERIVED,
    KEY_ROOT_FILE, LABEL_DERIVED, LABEL_INSTANCE, NOT_YET_DERIVED, PENDING_MARK, PROP_HASH,
    PROP_ID,
};
use crate::context::IndexContext;
use crate::descriptor::{FeatureDescriptor, FeatureKind};
use crate::encode::{content_hash, encode_attributes};
use crate::error::{ElementError, IndexError};
use crate::ident::{hash_hex, NodeId};
use crate::model::{ElementRef, FeatureValue, ModelElement};
use crate::proxy::{record_proxy, ProxyTarget, ReferenceFlags};
use crate::record::Properties;
use crate::store::{node_identifier, GraphStore, StoreError};
use crate::value::PropertyValue;

/// Result of looking up a reference target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The target is in the graph.
    Found(NodeId),
    /// The target is not in the graph yet.
    Pending(ProxyTarget),
}

/// Resolves [`ElementRef`]s for one file.
///
/// Fragments of the file being indexed come from an explicit table; other
/// files of the repository are read from the graph once and memoized.
#[derive(Debug)]
pub struct TargetResolver {
    repository: String,
    own_key: String,
    own: FxHashMap<String, NodeId>,
    others: FxHashMap<String, FxHashMap<String, NodeId>>,
}

impl TargetResolver {
    /// Resolver for the file `own_key` in `repository`, seeded with its contents.
    pub fn new(
        repository: impl Into<String>,
        own_key: impl Into<String>,
        own: FxHashMap<String, NodeId>,
    ) -> Self {
        Self {
            repository: repository.into(),
            own_key: own_key.into(),
            own,
            others: FxHashMap::default(),
        }
    }

    /// Fragment table of the file being indexed.
    #[must_use]
    pub fn own(&self) -> &FxHashMap<String, NodeId> {
        &self.own
    }

    /// Adds a fragment of the file being indexed.
    pub fn insert(&mut self, fragment: impl Into<String>, node: NodeId) {
        self.own.insert(fragment.into(), node);
    }

    /// Looks up `target`.
    pub fn resolve<S: GraphStore + ?Sized>(
        &mut self,
        ctx: &IndexContext<'_, S>,
        target: &ElementRef,
    ) -> Resolution {
        let key = match target {
            ElementRef::Local(_) => self.own_key.clone(),
            ElementRef::External { path, .. } => ctx.config.file_key(&self.repository, path),
        };
        let fragment = target.fragment();
        let found = if key == self.own_key {
            self.own.get(fragment).copied()
        } else {
            self.others
                .entry(key.clone())
                .or_insert_with(|| {
                    ctx.file_node(&key)
                        .map(|f| file_contents(&*ctx.store, f))
                        .unwrap_or_default()
                })
                .get(fragment)
                .copied()
        };
        found.map_or_else(
            || {
                Resolution::Pending(ProxyTarget {
                    file_key: key,
                    fragment: fragment.to_owned(),
                })
            },
            Resolution::Found,
        )
    }
}

/// Fragment → instance table of an indexed file.
pub fn file_contents<S: GraphStore + ?Sized>(
    store: &S,
    file_node: NodeId,
) -> FxHashMap<String, NodeId> {
    store
        .incoming(file_node, Some(EDGE_FILE))
        .into_iter()
        .filter_map(|e| node_identifier(store, e.from).map(|id| (id, e.from)))
        .collect()
}

/// The declared type followed by every supertype that is registered.
pub fn lineage<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    info: &Arc<TypeInfo>,
) -> Result<Vec<Arc<TypeInfo>>, IndexError> {
    let mut out = vec![Arc::clone(info)];
    for node in &info.supertypes {
        if let Some(sup) = ctx.cache.resolve_node(&*ctx.store, *node)? {
            out.push(sup);
        }
    }
    Ok(out)
}

/// Resolves the declared type of `element`.
pub fn type_info_of<S: GraphStore + ?Sized, E: ModelElement + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    element: &E,
) -> Result<Arc<TypeInfo>, IndexError> {
    ctx.cache
        .resolve(&*ctx.store, element.type_ref())?
        .ok_or_else(|| {
            ElementError::UnregisteredType {
                element: element.identifier().to_owned(),
                type_ref: element.type_ref().to_string(),
            }
            .into()
        })
}

/// Node of the derived holder of `feature` on `instance`.
pub fn placeholder_of<S: GraphStore + ?Sized>(
    store: &S,
    instance: NodeId,
    feature: &str,
) -> Option<NodeId> {
    store
        .outgoing(instance, Some(feature))
        .into_iter()
        .find(|e| e.has_flag(EDGE_PROP_DERIVED))
        .map(|e| e.to)
}

/// Marks a derived holder as pending with its not-yet-derived value.
pub fn mark_pending<S: GraphStore + ?Sized>(
    store: &mut S,
    placeholder: NodeId,
    feature: &str,
    logic: &str,
) -> Result<(), StoreError> {
    store.set_property(
        placeholder,
        feature,
        PropertyValue::Str(format!("{NOT_YET_DERIVED}{logic}")),
    )?;
    store.index_add(
        INDEX_PENDING_DERIVED,
        placeholder,
        KEY_DERIVED,
        &PropertyValue::from(PENDING_MARK),
    )
}

/// Creates the derived holder of `feature` on `instance`, pending derivation.
pub fn create_placeholder<S: GraphStore + ?Sized>(
    store: &mut S,
    instance: NodeId,
    feature: &str,
    descriptor: &FeatureDescriptor,
) -> Result<NodeId, StoreError> {
    let (language, logic) = descriptor.derivation().unwrap_or(("", ""));
    let mut props = Properties::new();
    props.insert(DERIVED_PROP_MANY.to_owned(), descriptor.many.into());
    props.insert(DERIVED_PROP_ORDERED.to_owned(), descriptor.ordered.into());
    props.insert(DERIVED_PROP_UNIQUE.to_owned(), descriptor.unique.into());
    props.insert(
        DERIVED_PROP_TYPE.to_owned(),
        descriptor.target_type.clone().into(),
    );
    props.insert(DERIVED_PROP_LANGUAGE.to_owned(), language.into());
    props.insert(DERIVED_PROP_LOGIC.to_owned(), logic.into());
    let placeholder = store.create_node(LABEL_DERIVED, props)?;
    let mut edge_props = Properties::new();
    edge_props.insert(EDGE_PROP_DERIVED.to_owned(), PropertyValue::Bool(true));
    store.create_edge(instance, placeholder, feature, edge_props)?;
    mark_pending(store, placeholder, feature, logic)?;
    Ok(placeholder)
}

/// Creates holders for every derived feature along the type lineage.
fn create_placeholders<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    instance: NodeId,
    types: &[Arc<TypeInfo>],
) -> Result<usize, StoreError> {
    let mut seen = BTreeSet::new();
    for info in types {
        for (name, d) in &info.descriptors {
            if d.kind() == FeatureKind::Derived && seen.insert(name.clone()) {
                create_placeholder(&mut *ctx.store, instance, name, d)?;
            }
        }
    }
    Ok(seen.len())
}

/// Adds attribute values to the indices of every type in the lineage that
/// marks them indexed.
fn index_attributes<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    instance: NodeId,
    types: &[Arc<TypeInfo>],
    attributes: &[(String, PropertyValue)],
) -> Result<(), StoreError> {
    for info in types {
        for (name, value) in attributes {
            if info.descriptors.get(name).is_some_and(FeatureDescriptor::is_indexed) {
                let index = attribute_index_name(&info.type_ref.package_uri, &info.type_ref.name, name);
                ctx.store.index_add(&index, instance, name, value)?;
            }
        }
    }
    Ok(())
}

fn unindex_attribute<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    instance: NodeId,
    types: &[Arc<TypeInfo>],
    name: &str,
) -> Result<(), StoreError> {
    for info in types {
        if info.descriptors.get(name).is_some_and(FeatureDescriptor::is_indexed) {
            let index = attribute_index_name(&info.type_ref.package_uri, &info.type_ref.name, name);
            ctx.store.index_remove(&index, instance, Some(name), None)?;
        }
    }
    Ok(())
}

/// Creates the instance node of `element` in `file_node`.
///
/// Attributes are encoded before anything is written, so an element that
/// fails to encode leaves no trace.
pub fn create_instance<S: GraphStore + ?Sized, E: ModelElement + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    element: &E,
    file_node: NodeId,
    transient: bool,
) -> Result<NodeId, IndexError> {
    let info = type_info_of(ctx, element)?;
    let attributes = encode_attributes(element, &info)?;
    let types = lineage(ctx, &info)?;

    let mut props = Properties::new();
    props.insert(PROP_ID.to_owned(), element.identifier().into());
    props.insert(
        PROP_HASH.to_owned(),
        hash_hex(&content_hash(element, &info)).into(),
    );
    for (name, value) in &attributes {
        props.insert(name.clone(), value.clone());
    }
    let node = ctx.store.create_node(LABEL_INSTANCE, props)?;
    ctx.store
        .create_edge(node, info.node, EDGE_TYPE_OF, Properties::new())?;
    for sup in &info.supertypes {
        ctx.store
            .create_edge(node, *sup, EDGE_KIND_OF, Properties::new())?;
    }
    ctx.store
        .create_edge(node, file_node, EDGE_FILE, Properties::new())?;
    if element.is_root() {
        ctx.store.index_add(
            INDEX_ROOTS,
            node,
            KEY_ROOT_FILE,
            &PropertyValue::Str(file_node.to_string()),
        )?;
    }
    index_attributes(ctx, node, &types, &attributes)?;
    create_placeholders(ctx, node, &types)?;

    ctx.emit(
        ChangeOp::Add,
        ChangeCategory::Instance,
        node.to_string(),
        Some(element.identifier().into()),
        transient,
    );
    for (name, value) in attributes {
        ctx.emit(
            ChangeOp::Add,
            ChangeCategory::Property,
            ChangeRecord::property_id(node, &name),
            Some(value),
            transient,
        );
    }
    Ok(node)
}

/// Rewrites the attributes of an existing instance, emitting a remove/add pair
/// for every value that changed. Returns the number of changed attributes.
pub fn update_attributes<S: GraphStore + ?Sized, E: ModelElement + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    node: NodeId,
    element: &E,
    transient: bool,
) -> Result<usize, IndexError> {
    let info = type_info_of(ctx, element)?;
    let attributes: FxHashMap<String, PropertyValue> =
        encode_attributes(element, &info)?.into_iter().collect();
    let types = lineage(ctx, &info)?;
    let mut changed = 0;
    for (name, descriptor) in &info.descriptors {
        if descriptor.kind() != FeatureKind::Attribute {
            continue;
        }
        let old = ctx.store.property(node, name);
        let new = attributes.get(name);
        if old.as_ref() == new {
            continue;
        }
        changed += 1;
        let id = ChangeRecord::property_id(node, name);
        if let Some(old) = old {
            ctx.store.remove_property(node, name)?;
            unindex_attribute(ctx, node, &types, name)?;
            ctx.emit(ChangeOp::Remove, ChangeCategory::Property, id.clone(), Some(old), transient);
        }
        if let Some(new) = new {
            ctx.store.set_property(node, name, new.clone())?;
            index_attributes(ctx, node, &types, &[(name.clone(), new.clone())])?;
            ctx.emit(ChangeOp::Add, ChangeCategory::Property, id, Some(new.clone()), transient);
        }
    }
    ctx.store.set_property(
        node,
        PROP_HASH,
        hash_hex(&content_hash(element, &info)).into(),
    )?;
    Ok(changed)
}

/// Counts of one reference synchronization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReferenceSync {
    /// Edges created.
    pub created: usize,
    /// Edges deleted.
    pub removed: usize,
    /// Proxies recorded.
    pub proxies: usize,
}

/// Makes the outgoing reference edges of `node` match the element's references.
///
/// Existing edges to still-wanted targets are kept; targets that are not in
/// the graph become proxies.
pub fn sync_references<S: GraphStore + ?Sized, E: ModelElement + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    node: NodeId,
    element: &E,
    info: &TypeInfo,
    resolver: &mut TargetResolver,
    transient: bool,
) -> Result<ReferenceSync, IndexError> {
    let mut sync = ReferenceSync::default();
    for (name, descriptor) in &info.descriptors {
        if descriptor.kind() != FeatureKind::Reference {
            continue;
        }
        let (targets, flags) = match element.get(name).filter(|_| element.is_set(name)) {
            Some(FeatureValue::References(r)) => (
                r.targets,
                ReferenceFlags {
                    containment: r.containment,
                    container: r.container,
                },
            ),
            _ => (Vec::new(), ReferenceFlags::default()),
        };
        let mut wanted = Vec::new();
        for target in &targets {
            match resolver.resolve(ctx, target) {
                Resolution::Found(n) => {
                    if !wanted.contains(&n) {
                        wanted.push(n);
                    }
                }
                Resolution::Pending(proxy) => {
                    if record_proxy(ctx, node, &proxy, name, flags)? {
                        sync.proxies += 1;
                    }
                }
            }
        }
        let existing: Vec<_> = ctx
            .store
            .outgoing(node, Some(name))
            .into_iter()
            .filter(|e| !e.has_flag(EDGE_PROP_DERIVED))
            .collect();
        let mut kept = BTreeSet::new();
        for edge in existing {
            if wanted.contains(&edge.to) && kept.insert(edge.to) {
                continue;
            }
            ctx.store.delete_edge(edge.id)?;
            sync.removed += 1;
            ctx.emit(
                ChangeOp::Remove,
                ChangeCategory::Reference,
                ChangeRecord::property_id(node, name),
                Some(edge.to.to_string().into()),
                transient,
            );
        }
        for target in wanted {
            if kept.contains(&target) {
                continue;
            }
            ctx.store
                .create_edge(node, target, name, flags.edge_properties())?;
            sync.created += 1;
            ctx.emit(
                ChangeOp::Add,
                ChangeCategory::Reference,
                ChangeRecord::property_id(node, name),
                Some(target.to_string().into()),
                transient,
            );
        }
    }
    Ok(sync)
}

/// Deletes every edge touching `instance`, and its derived holders.
///
/// With `demote_from = Some(file)`, incoming references from instances that do
/// not belong to `file` are recorded as proxies on their source first, so
/// re-inserting the file restores them. Returns the number of demotions.
pub fn dereference_instance<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    instance: NodeId,
    demote_from: Option<NodeId>,
    transient: bool,
) -> Result<usize, IndexError> {
    let identifier = node_identifier(&*ctx.store, instance).unwrap_or_default();
    let own_key = demote_from.and_then(|f| ctx.file_key_of(f));
    let mut demoted = 0;
    for edge in ctx.store.incoming(instance, None) {
        if let (Some(file), Some(key)) = (demote_from, own_key.as_ref()) {
            let same_file = ctx
                .store
                .outgoing(edge.from, Some(EDGE_FILE))
                .iter()
                .any(|f| f.to == file);
            if !same_file {
                let target = ProxyTarget {
                    file_key: key.clone(),
                    fragment: identifier.clone(),
                };
                record_proxy(ctx, edge.from, &target, &edge.label, ReferenceFlags::of_edge(&edge))?;
                demoted += 1;
            }
        }
        ctx.store.delete_edge(edge.id)?;
        ctx.emit(
            ChangeOp::Remove,
            ChangeCategory::Reference,
            ChangeRecord::property_id(edge.from, &edge.label),
            Some(instance.to_string().into()),
            transient,
        );
    }
    for edge in ctx.store.outgoing(instance, None) {
        ctx.store.delete_edge(edge.id)?;
        if edge.has_flag(EDGE_PROP_DERIVED) {
            ctx.store.delete_node(edge.to)?;
        } else if ![EDGE_TYPE_OF, EDGE_KIND_OF, EDGE_FILE].contains(&edge.label.as_str()) {
            ctx.emit(
                ChangeOp::Remove,
                ChangeCategory::Reference,
                ChangeRecord::property_id(instance, &edge.label),
                Some(edge.to.to_string().into()),
                transient,
            );
        }
    }
    if demoted > 0 {
        debug!(%instance, demoted, "incoming references demoted to proxies");
    }
    Ok(demoted)
}

/// Deletes an instance node that has no edges left.
pub fn delete_instance_node<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    instance: NodeId,
    transient: bool,
) -> Result<(), IndexError> {
    let identifier = node_identifier(&*ctx.store, instance).unwrap_or_default();
    ctx.store.delete_node(instance)?;
    ctx.emit(
        ChangeOp::Remove,
        ChangeCategory::Instance,
        instance.to_string(),
        Some(identifier.into()),
        transient,
    );
    Ok(())
}

/// [`dereference_instance`] followed by [`delete_instance_node`].
pub fn remove_instance<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    instance: NodeId,
    demote_from: Option<NodeId>,
    transient: bool,
) -> Result<usize, IndexError> {
    let demoted = dereference_instance(ctx, instance, demote_from, transient)?;
    delete_instance_node(ctx, instance, transient)?;
    Ok(demoted)
}
