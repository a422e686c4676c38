// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Graph record types: nodes and edges.
use std::collections::BTreeMap;

use crate::ident::{EdgeId, NodeId};
use crate::value::PropertyValue;

/// Property map attached to a node or edge, in deterministic key order.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Materialised record for a single node.
///
/// Invariants
/// - The node identifier is not embedded here; the store supplies it externally.
/// - `label` is fixed at creation time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeRecord {
    /// Node label (`package`, `type`, `instance`, `file`, `derived`).
    pub label: String,
    /// Node properties.
    pub properties: Properties,
}

/// Materialised record for a single directed edge.
///
/// Invariants
/// - `from` and `to` reference existing nodes in the same store.
/// - `id` is unique across the store for the lifetime of the edge.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeRecord {
    /// Store-assigned identifier.
    pub id: EdgeId,
    /// Source node.
    pub from: NodeId,
    /// Destination node.
    pub to: NodeId,
    /// Edge label (`typeOf`, `kindOf`, `file`, a feature name, ...).
    pub label: String,
    /// Edge properties (`isContainment`, `isDerived`, ...).
    pub properties: Properties,
}

impl EdgeRecord {
    /// Returns `true` if the edge carries a (truthy) flag property.
    #[must_use]
    pub fn has_flag(&self, key: &str) -> bool {
        match self.properties.get(key) {
            Some(PropertyValue::Bool(b)) => *b,
            Some(PropertyValue::Str(s)) => s == "true",
            Some(_) => true,
            None => false,
        }
    }
}
