// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Storage contract consumed by the indexing engine.
//!
//! Every backend (embedded, remote, in-memory) implements [`GraphStore`]; the
//! engine is written once against the trait. Two modes exist and are mutually
//! exclusive for a given handle:
//!
//! - **transactional**: writes happen between [`GraphStore::begin_tx`] and
//!   [`GraphStore::commit`]/[`GraphStore::rollback`]; partial writes of a
//!   rolled-back transaction never become visible.
//! - **bulk**: entered with [`GraphStore::enter_bulk_mode`]; no transaction
//!   boundaries and no isolation. Switching modes flushes pending writes.
use thiserror::Error;

use crate::ident::{EdgeId, NodeId, TxId};
use crate::record::{EdgeRecord, Properties};
use crate::value::{IndexKey, PropertyValue};

/// Errors reported by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The node does not exist.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),
    /// The edge does not exist.
    #[error("edge not found: {0}")]
    EdgeNotFound(EdgeId),
    /// The node still has incident edges; delete them first.
    #[error("node {0} still has incident edges")]
    NodeHasEdges(NodeId),
    /// A transaction is already open on this handle.
    #[error("a transaction is already open")]
    TxAlreadyOpen,
    /// The transaction id is not the open transaction.
    #[error("transaction not active: {0}")]
    UnknownTx(TxId),
    /// Transactions are unavailable while the store is in bulk mode.
    #[error("store is in bulk mode")]
    BulkModeActive,
    /// Bulk mode cannot be entered while a transaction is open.
    #[error("cannot switch modes while a transaction is open")]
    TxOpenDuringModeSwitch,
    /// The index does not exist.
    #[error("index not found: {0}")]
    IndexNotFound(String),
    /// Backend-specific failure.
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Lookup performed against one key of a named index.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexQuery {
    /// Every node indexed under the key, whatever its value.
    Any,
    /// Nodes whose value equals the key.
    Exact(IndexKey),
    /// Integer values in `min..=max`.
    IntRange {
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
    },
    /// Real values in `min..=max`.
    RealRange {
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },
}

/// Graph storage contract.
///
/// Reads return owned snapshots so adapters are free to keep their data
/// behind locks or on disk.
pub trait GraphStore {
    /// Opens a transaction.
    ///
    /// # Errors
    /// [`StoreError::BulkModeActive`] in bulk mode, [`StoreError::TxAlreadyOpen`]
    /// if one is already open.
    fn begin_tx(&mut self) -> Result<TxId, StoreError>;

    /// Commits the open transaction.
    fn commit(&mut self, tx: TxId) -> Result<(), StoreError>;

    /// Discards every write made since [`GraphStore::begin_tx`].
    fn rollback(&mut self, tx: TxId) -> Result<(), StoreError>;

    /// Returns `true` while a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Switches to bulk mode, flushing pending writes first.
    fn enter_bulk_mode(&mut self) -> Result<(), StoreError>;

    /// Leaves bulk mode, flushing pending writes first.
    fn exit_bulk_mode(&mut self) -> Result<(), StoreError>;

    /// Returns `true` while in bulk mode.
    fn is_bulk_mode(&self) -> bool;

    /// Creates a node with `label` and initial `properties`.
    fn create_node(&mut self, label: &str, properties: Properties) -> Result<NodeId, StoreError>;

    /// Deletes an isolated node and removes it from every index.
    ///
    /// # Errors
    /// [`StoreError::NodeHasEdges`] if edges still touch the node.
    fn delete_node(&mut self, node: NodeId) -> Result<(), StoreError>;

    /// Returns `true` if the node exists.
    fn contains_node(&self, node: NodeId) -> bool;

    /// Label of the node, if it exists.
    fn node_label(&self, node: NodeId) -> Option<String>;

    /// Reads one property.
    fn property(&self, node: NodeId, key: &str) -> Option<PropertyValue>;

    /// Writes one property, replacing any previous value.
    fn set_property(&mut self, node: NodeId, key: &str, value: PropertyValue)
        -> Result<(), StoreError>;

    /// Removes one property, returning its previous value.
    fn remove_property(&mut self, node: NodeId, key: &str)
        -> Result<Option<PropertyValue>, StoreError>;

    /// Property keys of the node, in deterministic order.
    fn property_keys(&self, node: NodeId) -> Vec<String>;

    /// Creates a directed edge.
    fn create_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        label: &str,
        properties: Properties,
    ) -> Result<EdgeId, StoreError>;

    /// Deletes an edge.
    fn delete_edge(&mut self, edge: EdgeId) -> Result<(), StoreError>;

    /// Reads an edge.
    fn edge(&self, edge: EdgeId) -> Option<EdgeRecord>;

    /// Outgoing edges of `node`, optionally restricted to `label`.
    fn outgoing(&self, node: NodeId, label: Option<&str>) -> Vec<EdgeRecord>;

    /// Incoming edges of `node`, optionally restricted to `label`.
    fn incoming(&self, node: NodeId, label: Option<&str>) -> Vec<EdgeRecord>;

    /// Creates a named index if it does not exist yet.
    fn create_index(&mut self, name: &str) -> Result<(), StoreError>;

    /// Drops a named index and all of its entries.
    fn drop_index(&mut self, name: &str) -> Result<(), StoreError>;

    /// Names of every existing index.
    fn index_names(&self) -> Vec<String>;

    /// Exact-match lookup.
    fn index_get(&self, index: &str, key: &str, value: &IndexKey) -> Vec<NodeId>;

    /// Lookup by [`IndexQuery`].
    fn index_query(&self, index: &str, key: &str, query: &IndexQuery) -> Vec<NodeId>;

    /// Indexes `node` under `key`; array values index every element. Creates
    /// the index on first use.
    fn index_add(
        &mut self,
        index: &str,
        node: NodeId,
        key: &str,
        value: &PropertyValue,
    ) -> Result<(), StoreError>;

    /// Removes entries of `node`: all of them (`key = None`), those under a
    /// key, or the single `(key, value)` entry.
    fn index_remove(
        &mut self,
        index: &str,
        node: NodeId,
        key: Option<&str>,
        value: Option<&IndexKey>,
    ) -> Result<(), StoreError>;
}

/// Single node indexed under `(key, value)`, if exactly one exists.
pub fn single_node<S: GraphStore + ?Sized>(
    store: &S,
    index: &str,
    key: &str,
    value: &str,
) -> Option<NodeId> {
    let hits = store.index_get(index, key, &IndexKey::from(value));
    match hits.as_slice() {
        [one] => Some(*one),
        _ => None,
    }
}

/// Reads the `_id` property of a node as a string.
pub fn node_identifier<S: GraphStore + ?Sized>(store: &S, node: NodeId) -> Option<String> {
    store
        .property(node, crate::constants::PROP_ID)
        .and_then(|v| v.as_str().map(str::to_owned))
}
