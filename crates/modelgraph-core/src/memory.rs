// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory [`GraphStore`] adapter.
//!
//! Used by tests and small embedded deployments. Transactions are implemented
//! by snapshotting the whole state on `begin_tx` and restoring it on
//! `rollback`; that is linear in the graph size and fine for the workloads this
//! adapter targets.
use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::ident::{EdgeId, NodeId, TxId};
use crate::record::{EdgeRecord, NodeRecord, Properties};
use crate::store::{GraphStore, IndexQuery, StoreError};
use crate::value::{IndexKey, OrderedReal, PropertyValue};

/// Entries of one named index.
#[derive(Debug, Clone, Default)]
struct IndexTable {
    /// key → value → nodes.
    entries: BTreeMap<String, BTreeMap<IndexKey, BTreeSet<NodeId>>>,
    /// Reverse map so a node can be dropped without scanning every key.
    by_node: BTreeMap<NodeId, BTreeSet<(String, IndexKey)>>,
}

impl IndexTable {
    fn add(&mut self, node: NodeId, key: &str, value: IndexKey) {
        self.entries
            .entry(key.to_owned())
            .or_default()
            .entry(value.clone())
            .or_default()
            .insert(node);
        self.by_node
            .entry(node)
            .or_default()
            .insert((key.to_owned(), value));
    }

    fn remove_entry(&mut self, node: NodeId, key: &str, value: &IndexKey) {
        if let Some(values) = self.entries.get_mut(key) {
            if let Some(nodes) = values.get_mut(value) {
                nodes.remove(&node);
                if nodes.is_empty() {
                    values.remove(value);
                }
            }
            if values.is_empty() {
                self.entries.remove(key);
            }
        }
        if let Some(owned) = self.by_node.get_mut(&node) {
            owned.remove(&(key.to_owned(), value.clone()));
            if owned.is_empty() {
                self.by_node.remove(&node);
            }
        }
    }

    fn remove_node(&mut self, node: NodeId, key: Option<&str>) {
        let Some(owned) = self.by_node.get(&node) else {
            return;
        };
        let doomed: Vec<(String, IndexKey)> = owned
            .iter()
            .filter(|(k, _)| key.is_none_or(|want| want == k))
            .cloned()
            .collect();
        for (k, v) in doomed {
            self.remove_entry(node, &k, &v);
        }
    }

    fn query(&self, key: &str, query: &IndexQuery) -> Vec<NodeId> {
        let Some(values) = self.entries.get(key) else {
            return Vec::new();
        };
        let mut out = BTreeSet::new();
        match query {
            IndexQuery::Any => values.values().for_each(|n| out.extend(n)),
            IndexQuery::Exact(k) => {
                if let Some(n) = values.get(k) {
                    out.extend(n);
                }
            }
            IndexQuery::IntRange { min, max } => {
                if min <= max {
                    values
                        .range(IndexKey::Int(*min)..=IndexKey::Int(*max))
                        .for_each(|(_, n)| out.extend(n));
                }
            }
            IndexQuery::RealRange { min, max } => {
                let (lo, hi) = (OrderedReal(*min), OrderedReal(*max));
                if lo <= hi {
                    values
                        .range(IndexKey::Real(lo)..=IndexKey::Real(hi))
                        .for_each(|(_, n)| out.extend(n));
                }
            }
        }
        out.into_iter().collect()
    }
}

/// Everything that a rollback must restore.
#[derive(Debug, Clone, Default)]
struct MemoryState {
    nodes: BTreeMap<NodeId, NodeRecord>,
    /// Source node → outbound edge records.
    edges_from: BTreeMap<NodeId, Vec<EdgeRecord>>,
    /// Destination node → inbound edge ids.
    edges_to: BTreeMap<NodeId, Vec<EdgeId>>,
    /// Reverse index of `EdgeId -> from`.
    edge_index: BTreeMap<EdgeId, NodeId>,
    /// Reverse index of `EdgeId -> to`.
    edge_to_index: BTreeMap<EdgeId, NodeId>,
    indices: BTreeMap<String, IndexTable>,
}

/// Counters exposed for tests and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    /// Committed transactions.
    pub commits: u64,
    /// Rolled-back transactions.
    pub rollbacks: u64,
    /// Completed bulk-mode switches (enter and exit).
    pub mode_switches: u64,
}

/// Ordered-map graph store with snapshot transactions.
///
/// Invariants
/// - `edge_index` and `edge_to_index` contain exactly the ids present in the
///   `edges_from` buckets.
/// - Node and edge ids are never reused, even across rollbacks.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: MemoryState,
    snapshot: Option<(TxId, MemoryState)>,
    bulk: bool,
    next_node: u64,
    next_edge: u64,
    next_tx: u64,
    stats: MemoryStoreStats,
}

impl MemoryStore {
    /// Creates an empty store in transactional mode.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.state.nodes.len()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.state.edge_index.len()
    }

    /// Returns a node record when it exists.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&NodeRecord> {
        self.state.nodes.get(&id)
    }

    /// Iterates over every node in id order.
    pub fn iter_nodes(&self) -> impl Iterator<Item = (&NodeId, &NodeRecord)> {
        self.state.nodes.iter()
    }

    /// Ids of every node carrying `label`.
    #[must_use]
    pub fn nodes_with_label(&self, label: &str) -> Vec<NodeId> {
        self.state
            .nodes
            .iter()
            .filter(|(_, r)| r.label == label)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Transaction and mode-switch counters.
    #[must_use]
    pub fn stats(&self) -> MemoryStoreStats {
        self.stats
    }

    fn check_tx(&self, tx: TxId) -> Result<(), StoreError> {
        match &self.snapshot {
            Some((open, _)) if *open == tx => Ok(()),
            _ => Err(StoreError::UnknownTx(tx)),
        }
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut NodeRecord, StoreError> {
        self.state
            .nodes
            .get_mut(&node)
            .ok_or(StoreError::NodeNotFound(node))
    }

    fn flush(&mut self) {
        // Writes are applied eagerly; a switch only has to be counted.
        self.stats.mode_switches += 1;
    }
}

fn filter_label(edge: &EdgeRecord, label: Option<&str>) -> bool {
    label.is_none_or(|l| edge.label == l)
}

impl GraphStore for MemoryStore {
    fn begin_tx(&mut self) -> Result<TxId, StoreError> {
        if self.bulk {
            return Err(StoreError::BulkModeActive);
        }
        if self.snapshot.is_some() {
            return Err(StoreError::TxAlreadyOpen);
        }
        self.next_tx = self.next_tx.wrapping_add(1);
        if self.next_tx == 0 {
            self.next_tx = 1;
        }
        let tx = TxId::from_raw(self.next_tx);
        self.snapshot = Some((tx, self.state.clone()));
        trace!(tx = tx.value(), "begin");
        Ok(tx)
    }

    fn commit(&mut self, tx: TxId) -> Result<(), StoreError> {
        self.check_tx(tx)?;
        self.snapshot = None;
        self.stats.commits += 1;
        trace!(tx = tx.value(), "commit");
        Ok(())
    }

    fn rollback(&mut self, tx: TxId) -> Result<(), StoreError> {
        self.check_tx(tx)?;
        if let Some((_, saved)) = self.snapshot.take() {
            self.state = saved;
        }
        self.stats.rollbacks += 1;
        trace!(tx = tx.value(), "rollback");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    fn enter_bulk_mode(&mut self) -> Result<(), StoreError> {
        if self.snapshot.is_some() {
            return Err(StoreError::TxOpenDuringModeSwitch);
        }
        if !self.bulk {
            self.flush();
            self.bulk = true;
        }
        Ok(())
    }

    fn exit_bulk_mode(&mut self) -> Result<(), StoreError> {
        if self.bulk {
            self.flush();
            self.bulk = false;
        }
        Ok(())
    }

    fn is_bulk_mode(&self) -> bool {
        self.bulk
    }

    fn create_node(&mut self, label: &str, properties: Properties) -> Result<NodeId, StoreError> {
        self.next_node += 1;
        let id = NodeId(self.next_node);
        self.state.nodes.insert(
            id,
            NodeRecord {
                label: label.to_owned(),
                properties,
            },
        );
        Ok(id)
    }

    fn delete_node(&mut self, node: NodeId) -> Result<(), StoreError> {
        if !self.state.nodes.contains_key(&node) {
            return Err(StoreError::NodeNotFound(node));
        }
        let has_out = self.state.edges_from.get(&node).is_some_and(|e| !e.is_empty());
        let has_in = self.state.edges_to.get(&node).is_some_and(|e| !e.is_empty());
        if has_out || has_in {
            return Err(StoreError::NodeHasEdges(node));
        }
        self.state.nodes.remove(&node);
        self.state.edges_from.remove(&node);
        self.state.edges_to.remove(&node);
        for table in self.state.indices.values_mut() {
            table.remove_node(node, None);
        }
        Ok(())
    }

    fn contains_node(&self, node: NodeId) -> bool {
        self.state.nodes.contains_key(&node)
    }

    fn node_label(&self, node: NodeId) -> Option<String> {
        self.state.nodes.get(&node).map(|r| r.label.clone())
    }

    fn property(&self, node: NodeId, key: &str) -> Option<PropertyValue> {
        self.state
            .nodes
            .get(&node)
            .and_then(|r| r.properties.get(key))
            .cloned()
    }

    fn set_property(
        &mut self,
        node: NodeId,
        key: &str,
        value: PropertyValue,
    ) -> Result<(), StoreError> {
        self.node_mut(node)?.properties.insert(key.to_owned(), value);
        Ok(())
    }

    fn remove_property(
        &mut self,
        node: NodeId,
        key: &str,
    ) -> Result<Option<PropertyValue>, StoreError> {
        Ok(self.node_mut(node)?.properties.remove(key))
    }

    fn property_keys(&self, node: NodeId) -> Vec<String> {
        self.state
            .nodes
            .get(&node)
            .map(|r| r.properties.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn create_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        label: &str,
        properties: Properties,
    ) -> Result<EdgeId, StoreError> {
        if !self.state.nodes.contains_key(&from) {
            return Err(StoreError::NodeNotFound(from));
        }
        if !self.state.nodes.contains_key(&to) {
            return Err(StoreError::NodeNotFound(to));
        }
        self.next_edge += 1;
        let id = EdgeId(self.next_edge);
        self.state.edge_index.insert(id, from);
        self.state.edge_to_index.insert(id, to);
        self.state.edges_from.entry(from).or_default().push(EdgeRecord {
            id,
            from,
            to,
            label: label.to_owned(),
            properties,
        });
        self.state.edges_to.entry(to).or_default().push(id);
        Ok(id)
    }

    fn delete_edge(&mut self, edge: EdgeId) -> Result<(), StoreError> {
        let Some(from) = self.state.edge_index.remove(&edge) else {
            return Err(StoreError::EdgeNotFound(edge));
        };
        let to = self.state.edge_to_index.remove(&edge);
        debug_assert!(to.is_some(), "edge-to index missing edge id: {edge:?}");
        let bucket_is_empty = self.state.edges_from.get_mut(&from).map_or_else(
            || {
                debug_assert!(false, "edge index referenced a missing bucket: {edge:?}");
                false
            },
            |edges| {
                edges.retain(|e| e.id != edge);
                edges.is_empty()
            },
        );
        if bucket_is_empty {
            self.state.edges_from.remove(&from);
        }
        if let Some(to) = to {
            let inbound_is_empty = self.state.edges_to.get_mut(&to).is_some_and(|ids| {
                ids.retain(|id| *id != edge);
                ids.is_empty()
            });
            if inbound_is_empty {
                self.state.edges_to.remove(&to);
            }
        }
        Ok(())
    }

    fn edge(&self, edge: EdgeId) -> Option<EdgeRecord> {
        let from = self.state.edge_index.get(&edge)?;
        self.state
            .edges_from
            .get(from)?
            .iter()
            .find(|e| e.id == edge)
            .cloned()
    }

    fn outgoing(&self, node: NodeId, label: Option<&str>) -> Vec<EdgeRecord> {
        self.state
            .edges_from
            .get(&node)
            .into_iter()
            .flatten()
            .filter(|e| filter_label(e, label))
            .cloned()
            .collect()
    }

    fn incoming(&self, node: NodeId, label: Option<&str>) -> Vec<EdgeRecord> {
        self.state
            .edges_to
            .get(&node)
            .into_iter()
            .flatten()
            .filter_map(|id| self.edge(*id))
            .filter(|e| filter_label(e, label))
            .collect()
    }

    fn create_index(&mut self, name: &str) -> Result<(), StoreError> {
        self.state.indices.entry(name.to_owned()).or_default();
        Ok(())
    }

    fn drop_index(&mut self, name: &str) -> Result<(), StoreError> {
        self.state
            .indices
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::IndexNotFound(name.to_owned()))
    }

    fn index_names(&self) -> Vec<String> {
        self.state.indices.keys().cloned().collect()
    }

    fn index_get(&self, index: &str, key: &str, value: &IndexKey) -> Vec<NodeId> {
        self.index_query(index, key, &IndexQuery::Exact(value.clone()))
    }

    fn index_query(&self, index: &str, key: &str, query: &IndexQuery) -> Vec<NodeId> {
        self.state
            .indices
            .get(index)
            .map(|t| t.query(key, query))
            .unwrap_or_default()
    }

    fn index_add(
        &mut self,
        index: &str,
        node: NodeId,
        key: &str,
        value: &PropertyValue,
    ) -> Result<(), StoreError> {
        if !self.state.nodes.contains_key(&node) {
            return Err(StoreError::NodeNotFound(node));
        }
        let table = self.state.indices.entry(index.to_owned()).or_default();
        for k in value.index_keys() {
            table.add(node, key, k);
        }
        Ok(())
    }

    fn index_remove(
        &mut self,
        index: &str,
        node: NodeId,
        key: Option<&str>,
        value: Option<&IndexKey>,
    ) -> Result<(), StoreError> {
        let Some(table) = self.state.indices.get_mut(index) else {
            return Ok(());
        };
        match (key, value) {
            (Some(k), Some(v)) => table.remove_entry(node, k, v),
            (k, _) => table.remove_node(node, k),
        }
        Ok(())
    }
}
