// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-session cache of type nodes and their feature descriptors.
//!
//! Owned by the indexer and passed by reference through every pass. Any write
//! to a type's descriptors must call [`TypeCache::invalidate`] for that type
//! node; package deletion calls [`TypeCache::invalidate_all`].
use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::constants::{
    EDGE_EPACKAGE, EDGE_KIND_OF, EDGE_TYPE_OF, INDEX_PACKAGES, KEY_ID, PROP_SUPERTYPES,
};
use crate::descriptor::{Descriptors, FeatureDescriptor};
use crate::error::{DescriptorError, IndexError};
use crate::ident::NodeId;
use crate::schema::TypeRef;
use crate::store::{node_identifier, single_node, GraphStore};

/// Resolved view of one type node.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    /// Type node.
    pub node: NodeId,
    /// Qualified name.
    pub type_ref: TypeRef,
    /// Nodes of the supertype closure, in declaration order.
    pub supertypes: Vec<NodeId>,
    /// Decoded descriptors.
    pub descriptors: Descriptors,
}

/// Cache of [`TypeInfo`] keyed by qualified name and by node.
#[derive(Debug, Default)]
pub struct TypeCache {
    by_ref: FxHashMap<TypeRef, Arc<TypeInfo>>,
    by_node: FxHashMap<NodeId, TypeRef>,
}

impl TypeCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_ref.len()
    }

    /// Returns `true` when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_ref.is_empty()
    }

    /// Looks up a type, reading the store on a miss. `Ok(None)` if unregistered.
    pub fn resolve<S: GraphStore + ?Sized>(
        &mut self,
        store: &S,
        type_ref: &TypeRef,
    ) -> Result<Option<Arc<TypeInfo>>, IndexError> {
        if let Some(hit) = self.by_ref.get(type_ref) {
            return Ok(Some(Arc::clone(hit)));
        }
        let Some(node) = find_type_node(store, type_ref) else {
            return Ok(None);
        };
        let descriptors = read_descriptors(store, node)?;
        let supertypes = store
            .property(node, PROP_SUPERTYPES)
            .and_then(|v| v.as_str_array().map(<[String]>::to_vec))
            .unwrap_or_default()
            .iter()
            .filter_map(|s| {
                let found = TypeRef::parse(s).and_then(|t| find_type_node(store, &t));
                if found.is_none() {
                    warn!(type_ref = %type_ref, supertype = %s, "supertype is not registered");
                }
                found
            })
            .collect();
        let info = Arc::new(TypeInfo {
            node,
            type_ref: type_ref.clone(),
            supertypes,
            descriptors,
        });
        self.by_ref.insert(type_ref.clone(), Arc::clone(&info));
        self.by_node.insert(node, type_ref.clone());
        Ok(Some(info))
    }

    /// Looks up a type by its node.
    pub fn resolve_node<S: GraphStore + ?Sized>(
        &mut self,
        store: &S,
        node: NodeId,
    ) -> Result<Option<Arc<TypeInfo>>, IndexError> {
        if let Some(type_ref) = self.by_node.get(&node).cloned() {
            return self.resolve(store, &type_ref);
        }
        match type_ref_of(store, node) {
            Some(type_ref) => self.resolve(store, &type_ref),
            None => Ok(None),
        }
    }

    /// Drops the cached entry of one type node.
    pub fn invalidate(&mut self, node: NodeId) {
        if let Some(type_ref) = self.by_node.remove(&node) {
            self.by_ref.remove(&type_ref);
        }
    }

    /// Drops everything.
    pub fn invalidate_all(&mut self) {
        self.by_ref.clear();
        self.by_node.clear();
    }
}

/// Finds the node of a registered type.
pub fn find_type_node<S: GraphStore + ?Sized>(store: &S, type_ref: &TypeRef) -> Option<NodeId> {
    let package = single_node(store, INDEX_PACKAGES, KEY_ID, &type_ref.package_uri)?;
    store
        .incoming(package, Some(EDGE_EPACKAGE))
        .into_iter()
        .map(|e| e.from)
        .find(|t| node_identifier(store, *t).as_deref() == Some(type_ref.name.as_str()))
}

/// Qualified name of a type node, read through its `epackage` edge.
pub fn type_ref_of<S: GraphStore + ?Sized>(store: &S, type_node: NodeId) -> Option<TypeRef> {
    let name = node_identifier(store, type_node)?;
    let package = store.outgoing(type_node, Some(EDGE_EPACKAGE)).first()?.to;
    Some(TypeRef::new(node_identifier(store, package)?, name))
}

/// Decodes every descriptor stored on a type node.
pub fn read_descriptors<S: GraphStore + ?Sized>(
    store: &S,
    type_node: NodeId,
) -> Result<Descriptors, DescriptorError> {
    let mut out = Descriptors::new();
    for key in store.property_keys(type_node) {
        if key.starts_with('_') {
            continue;
        }
        if let Some(value) = store.property(type_node, &key) {
            let descriptor = FeatureDescriptor::decode(&key, &value)?;
            out.insert(key, descriptor);
        }
    }
    Ok(out)
}

/// Every instance whose declared type or supertype closure contains the type.
pub fn instances_of<S: GraphStore + ?Sized>(store: &S, type_node: NodeId) -> Vec<NodeId> {
    let mut out = BTreeSet::new();
    for label in [EDGE_TYPE_OF, EDGE_KIND_OF] {
        out.extend(store.incoming(type_node, Some(label)).into_iter().map(|e| e.from));
    }
    out.into_iter().collect()
}

/// Returns `true` if at least one instance points at the type.
pub fn has_instances<S: GraphStore + ?Sized>(store: &S, type_node: NodeId) -> bool {
    [EDGE_TYPE_OF, EDGE_KIND_OF]
        .iter()
        .any(|label| !store.incoming(type_node, Some(label)).is_empty())
}
