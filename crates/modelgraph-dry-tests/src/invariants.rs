// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Graph-shape assertions shared by integration tests.
//!
//! These panic with a descriptive message; they are meant for test code only.
#![allow(clippy::panic)]

use modelgraph_core::constants::{
    EDGE_FILE, EDGE_TYPE_OF, INDEX_FILES, INDEX_PROXIES, KEY_ID, KEY_PROXY, LABEL_FILE,
    LABEL_INSTANCE, LABEL_TYPE,
};
use modelgraph_core::{GraphStore, IndexKey, IndexQuery, MemoryStore};

/// Number of instance nodes.
pub fn instance_count(store: &MemoryStore) -> usize {
    store.nodes_with_label(LABEL_INSTANCE).len()
}

/// Every instance has exactly one `typeOf` edge, and it ends at a type node.
pub fn assert_type_edges(store: &MemoryStore) {
    for node in store.nodes_with_label(LABEL_INSTANCE) {
        let edges = store.outgoing(node, Some(EDGE_TYPE_OF));
        let [edge] = edges.as_slice() else {
            panic!("instance {node} has {} typeOf edges", edges.len());
        };
        assert_eq!(
            store.node_label(edge.to).as_deref(),
            Some(LABEL_TYPE),
            "typeOf of {node} ends at a non-type node"
        );
    }
}

/// Every instance belongs to exactly one file, and every file node is indexed.
pub fn assert_file_membership(store: &MemoryStore) {
    for node in store.nodes_with_label(LABEL_INSTANCE) {
        let edges = store.outgoing(node, Some(EDGE_FILE));
        let [edge] = edges.as_slice() else {
            panic!("instance {node} has {} file edges", edges.len());
        };
        assert_eq!(store.node_label(edge.to).as_deref(), Some(LABEL_FILE));
    }
    let indexed = store.index_query(INDEX_FILES, KEY_ID, &IndexQuery::Any);
    for file in store.nodes_with_label(LABEL_FILE) {
        assert!(indexed.contains(&file), "file node {file} is not indexed");
    }
}

/// Nodes indexed as waiting for `file_key` still exist.
pub fn assert_no_dangling_proxies(store: &MemoryStore, file_key: &str) {
    for node in store.index_get(INDEX_PROXIES, KEY_PROXY, &IndexKey::from(file_key)) {
        assert!(
            store.contains_node(node),
            "proxy index points at deleted node {node}"
        );
    }
}
