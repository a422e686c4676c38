// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Store wrapper with injectable failures.

use std::collections::BTreeSet;

use modelgraph_core::{
    EdgeId, EdgeRecord, GraphStore, IndexKey, IndexQuery, MemoryStore, NodeId, Properties,
    PropertyValue, StoreError, TxId,
};

/// [`GraphStore`] that delegates to an inner store but fails selected writes
/// with [`StoreError::Backend`].
///
/// Used to drive rollback and cascade-failure paths. Reads never fail.
#[derive(Debug, Default)]
pub struct FaultyStore<S = MemoryStore> {
    inner: S,
    edge_labels: BTreeSet<String>,
    node_labels: BTreeSet<String>,
    fail_node_deletes: bool,
    failures: usize,
}

impl<S: GraphStore> FaultyStore<S> {
    /// Wraps `inner` with no failures armed.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            edge_labels: BTreeSet::new(),
            node_labels: BTreeSet::new(),
            fail_node_deletes: false,
            failures: 0,
        }
    }

    /// Fails every `create_edge` with `label`.
    pub fn fail_edges(&mut self, label: &str) {
        self.edge_labels.insert(label.to_owned());
    }

    /// Fails every `create_node` with `label`.
    pub fn fail_nodes(&mut self, label: &str) {
        self.node_labels.insert(label.to_owned());
    }

    /// Fails every `delete_node`.
    pub fn fail_node_deletes(&mut self, fail: bool) {
        self.fail_node_deletes = fail;
    }

    /// Disarms every failure.
    pub fn heal(&mut self) {
        self.edge_labels.clear();
        self.node_labels.clear();
        self.fail_node_deletes = false;
    }

    /// Number of injected failures so far.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Inner store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Gives the inner store back.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn injected(&mut self, what: &str) -> StoreError {
        self.failures += 1;
        StoreError::Backend(format!("injected failure: {what}"))
    }
}

impl<S: GraphStore> GraphStore for FaultyStore<S> {
    fn begin_tx(&mut self) -> Result<TxId, StoreError> {
        self.inner.begin_tx()
    }

    fn commit(&mut self, tx: TxId) -> Result<(), StoreError> {
        self.inner.commit(tx)
    }

    fn rollback(&mut self, tx: TxId) -> Result<(), StoreError> {
        self.inner.rollback(tx)
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    fn enter_bulk_mode(&mut self) -> Result<(), StoreError> {
        self.inner.enter_bulk_mode()
    }

    fn exit_bulk_mode(&mut self) -> Result<(), StoreError> {
        self.inner.exit_bulk_mode()
    }

    fn is_bulk_mode(&self) -> bool {
        self.inner.is_bulk_mode()
    }

    fn create_node(&mut self, label: &str, properties: Properties) -> Result<NodeId, StoreError> {
        if self.node_labels.contains(label) {
            return Err(self.injected(label));
        }
        self.inner.create_node(label, properties)
    }

    fn delete_node(&mut self, node: NodeId) -> Result<(), StoreError> {
        if self.fail_node_deletes {
            return Err(self.injected("delete_node"));
        }
        self.inner.delete_node(node)
    }

    fn contains_node(&self, node: NodeId) -> bool {
        self.inner.contains_node(node)
    }

    fn node_label(&self, node: NodeId) -> Option<String> {
        self.inner.node_label(node)
    }

    fn property(&self, node: NodeId, key: &str) -> Option<PropertyValue> {
        self.inner.property(node, key)
    }

    fn set_property(
        &mut self,
        node: NodeId,
        key: &str,
        value: PropertyValue,
    ) -> Result<(), StoreError> {
        self.inner.set_property(node, key, value)
    }

    fn remove_property(
        &mut self,
        node: NodeId,
        key: &str,
    ) -> Result<Option<PropertyValue>, StoreError> {
        self.inner.remove_property(node, key)
    }

    fn property_keys(&self, node: NodeId) -> Vec<String> {
        self.inner.property_keys(node)
    }

    fn create_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        label: &str,
        properties: Properties,
    ) -> Result<EdgeId, StoreError> {
        if self.edge_labels.contains(label) {
            return Err(self.injected(label));
        }
        self.inner.create_edge(from, to, label, properties)
    }

    fn delete_edge(&mut self, edge: EdgeId) -> Result<(), StoreError> {
        self.inner.delete_edge(edge)
    }

    fn edge(&self, edge: EdgeId) -> Option<EdgeRecord> {
        self.inner.edge(edge)
    }

    fn outgoing(&self, node: NodeId, label: Option<&str>) -> Vec<EdgeRecord> {
        self.inner.outgoing(node, label)
    }

    fn incoming(&self, node: NodeId, label: Option<&str>) -> Vec<EdgeRecord> {
        self.inner.incoming(node, label)
    }

    fn create_index(&mut self, name: &str) -> Result<(), StoreError> {
        self.inner.create_index(name)
    }

    fn drop_index(&mut self, name: &str) -> Result<(), StoreError> {
        self.inner.drop_index(name)
    }

    fn index_names(&self) -> Vec<String> {
        self.inner.index_names()
    }

    fn index_get(&self, index: &str, key: &str, value: &IndexKey) -> Vec<NodeId> {
        self.inner.index_get(index, key, value)
    }

    fn index_query(&self, index: &str, key: &str, query: &IndexQuery) -> Vec<NodeId> {
        self.inner.index_query(index, key, query)
    }

    fn index_add(
        &mut self,
        index: &str,
        node: NodeId,
        key: &str,
        value: &PropertyValue,
    ) -> Result<(), StoreError> {
        self.inner.index_add(index, node, key, value)
    }

    fn index_remove(
        &mut self,
        index: &str,
        node: NodeId,
        key: Option<&str>,
        value: Option<&IndexKey>,
    ) -> Result<(), StoreError> {
        self.inner.index_remove(index, node, key, value)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn armed_labels_fail_and_healing_restores_writes() {
        let mut store = FaultyStore::new(MemoryStore::new());
        let a = store.create_node("instance", Properties::new()).unwrap();
        let b = store.create_node("instance", Properties::new()).unwrap();
        store.fail_edges("typeOf");
        store.fail_nodes("file");
        assert!(matches!(
            store.create_edge(a, b, "typeOf", Properties::new()),
            Err(StoreError::Backend(_))
        ));
        assert!(store.create_node("file", Properties::new()).is_err());
        store.create_edge(a, b, "next", Properties::new()).unwrap();
        assert_eq!(store.failures(), 2);

        store.heal();
        store.create_edge(a, b, "typeOf", Properties::new()).unwrap();
        assert_eq!(store.inner().edge_count(), 2);
    }
}
