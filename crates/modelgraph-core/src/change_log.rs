// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Append-only change log.
//!
//! [`ChangeLog`] collects [`ChangeRecord`]s emitted by every mutating component
//! in the order they happened. A single consumer drains it with
//! [`ChangeLog::take`]; the log is not designed for concurrent readers.
//!
//! Identifiers follow one shape per category:
//!
//! | category    | identifier               | value                  |
//! |-------------|--------------------------|------------------------|
//! | `Metamodel` | namespace URI            | `None`                 |
//! | `Type`      | `uri#Type`               | `None`                 |
//! | `File`      | `repository||||path`     | revision               |
//! | `Instance`  | `n42`                    | element identifier     |
//! | `Property`  | `n42::radius`            | stored value           |
//! | `Reference` | `n42::next`              | target node (`"n7"`)   |
use std::fmt;

use crate::ident::NodeId;
use crate::value::PropertyValue;

/// Kind of mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeOp {
    /// Something was created.
    Add,
    /// Something was deleted.
    Remove,
}

/// What the change touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeCategory {
    /// A package (metamodel).
    Metamodel,
    /// A type within a package.
    Type,
    /// An instance node.
    Instance,
    /// An instance attribute value.
    Property,
    /// A reference edge between instances.
    Reference,
    /// A file node.
    File,
}

/// One structured change.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeRecord {
    /// Add or remove.
    pub op: ChangeOp,
    /// What was touched.
    pub category: ChangeCategory,
    /// Category-specific identifier (see the module docs).
    pub identifier: String,
    /// Optional value.
    pub value: Option<PropertyValue>,
    /// `true` for batch-origin changes whose post-load state is already final.
    pub transient: bool,
}

impl ChangeRecord {
    /// Identifier of a property change on `node`.
    #[must_use]
    pub fn property_id(node: NodeId, name: &str) -> String {
        format!("{node}::{name}")
    }
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            ChangeOp::Add => "add",
            ChangeOp::Remove => "remove",
        };
        write!(f, "{op}({:?}) {}", self.category, self.identifier)?;
        if let Some(v) = &self.value {
            write!(f, " = {v}")?;
        }
        Ok(())
    }
}

/// Per-category counts of a batch of changes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeStats {
    /// Metamodel changes.
    pub metamodels: usize,
    /// Type changes.
    pub types: usize,
    /// Instance changes.
    pub instances: usize,
    /// Property changes.
    pub properties: usize,
    /// Reference changes.
    pub references: usize,
    /// File changes.
    pub files: usize,
}

/// Ordered, append-only list of changes.
#[derive(Debug, Default)]
pub struct ChangeLog {
    records: Vec<ChangeRecord>,
}

impl ChangeLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record.
    pub fn emit(
        &mut self,
        op: ChangeOp,
        category: ChangeCategory,
        identifier: impl Into<String>,
        value: Option<PropertyValue>,
        transient: bool,
    ) {
        self.records.push(ChangeRecord {
            op,
            category,
            identifier: identifier.into(),
            value,
            transient,
        });
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in insertion order.
    #[must_use]
    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    /// Current position, for a later [`ChangeLog::truncate`].
    #[must_use]
    pub fn mark(&self) -> usize {
        self.records.len()
    }

    /// Discards everything appended after `mark`.
    ///
    /// Used when a file pass is rolled back: its changes never happened.
    pub fn truncate(&mut self, mark: usize) {
        self.records.truncate(mark);
    }

    /// Hands every record to the consumer and clears the log.
    pub fn take(&mut self) -> Vec<ChangeRecord> {
        std::mem::take(&mut self.records)
    }

    /// Counts records per category.
    #[must_use]
    pub fn stats(&self) -> ChangeStats {
        stats_of(&self.records)
    }
}

/// Counts records per category.
#[must_use]
pub fn stats_of(records: &[ChangeRecord]) -> ChangeStats {
    let mut stats = ChangeStats::default();
    for r in records {
        let slot = match r.category {
            ChangeCategory::Metamodel => &mut stats.metamodels,
            ChangeCategory::Type => &mut stats.types,
            ChangeCategory::Instance => &mut stats.instances,
            ChangeCategory::Property => &mut stats.properties,
            ChangeCategory::Reference => &mut stats.references,
            ChangeCategory::File => &mut stats.files,
        };
        *slot += 1;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_and_truncate_drop_a_failed_pass() {
        let mut log = ChangeLog::new();
        log.emit(ChangeOp::Add, ChangeCategory::Metamodel, "urn:a", None, false);
        let mark = log.mark();
        log.emit(ChangeOp::Add, ChangeCategory::Instance, "n1", None, true);
        log.emit(ChangeOp::Add, ChangeCategory::Property, "n1::x", Some(1_i64.into()), true);
        assert_eq!(log.stats().properties, 1);
        log.truncate(mark);
        assert_eq!(log.len(), 1);
        assert_eq!(log.records()[0].category, ChangeCategory::Metamodel);
    }

    #[test]
    fn take_clears_the_log() {
        let mut log = ChangeLog::new();
        log.emit(ChangeOp::Remove, ChangeCategory::Reference, "n1::next", Some("n2".into()), false);
        let drained = log.take();
        assert_eq!(drained.len(), 1);
        assert!(log.is_empty());
        assert_eq!(drained[0].to_string(), "remove(Reference) n1::next = n2");
    }
}
