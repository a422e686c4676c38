// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs, clippy::unwrap_used)]

mod common;

use common::{extension, file, node, shapes_indexer, REPO};
use modelgraph_core::constants::{EDGE_KIND_OF, EDGE_TYPE_OF, INDEX_FILES, KEY_ID, LABEL_INSTANCE};
use modelgraph_core::{
    ChangeCategory, ChangeOp, DerivedAttributeSpec, ErrorKind, GraphStore, IndexError, IndexQuery,
    IndexerConfig, MemoryStore, ModelIndexer, PropertyValue, Scalar, TypeRef,
};
use modelgraph_dry_tests::{
    assert_file_membership, assert_type_edges, init_test_tracing, instance_count, shapes,
    shapes_package, FaultyStore, FixtureElement, SHAPES_URI,
};

fn star(id: &str) -> FixtureElement {
    FixtureElement::new(TypeRef::new("urn:ext", "Star"), id).attr("points", Scalar::Int(5))
}

fn circle(id: &str) -> FixtureElement {
    FixtureElement::new(shapes("Circle"), id).attr("radius", Scalar::Real(1.0))
}

/// f1 mixes both packages, f2 holds only extension instances.
fn populate<S: GraphStore>(indexer: &mut ModelIndexer<S>) {
    indexer
        .insert_file(&file("f1"), &[circle("c1"), star("s1").reference("around", &["c1"])])
        .unwrap();
    indexer.insert_file(&file("f2"), &[star("s2")]).unwrap();
    indexer.take_changes();
}

fn indexed_files(store: &MemoryStore) -> usize {
    store.index_query(INDEX_FILES, KEY_ID, &IndexQuery::Any).len()
}

#[test]
fn deleting_an_extension_keeps_files_still_in_use() {
    let mut indexer = shapes_indexer();
    indexer.register_packages(&[extension()]).unwrap();
    populate(&mut indexer);
    let c1 = node(&indexer, "f1", "c1");

    let report = indexer.unregister_packages(&["urn:ext".to_owned()]).unwrap();
    assert_eq!(report.packages, vec!["urn:ext".to_owned()]);
    assert_eq!((report.types, report.instances, report.files), (1, 2, 1));

    assert!(indexer.file_node(REPO, "f2").is_none());
    assert!(indexer.file_node(REPO, "f1").is_some());
    assert_eq!(indexer.instance(REPO, "f1", "c1"), Some(c1));
    assert!(indexer.instance(REPO, "f1", "s1").is_none());
    assert!(indexer.store().incoming(c1, None).is_empty());
    assert_eq!(instance_count(indexer.store()), 1);
    assert_eq!(indexed_files(indexer.store()), 1);
    assert_type_edges(indexer.store());
    assert_file_membership(indexer.store());

    let f2_key = indexer.config().file_key(REPO, "f2");
    let changes = indexer.changes();
    assert!(changes.iter().any(|c| c.op == ChangeOp::Remove
        && c.category == ChangeCategory::File
        && c.identifier == f2_key
        && c.value == Some(PropertyValue::from("r1"))));
    let last = changes.last().unwrap();
    assert_eq!(
        (last.op, last.category, last.identifier.as_str()),
        (ChangeOp::Remove, ChangeCategory::Metamodel, "urn:ext")
    );
    assert!(changes.iter().all(|c| !c.transient));
}

#[test]
fn deleting_a_base_package_takes_its_dependents_first() {
    let mut indexer = shapes_indexer();
    indexer.register_packages(&[extension()]).unwrap();
    indexer
        .add_indexed_attribute(SHAPES_URI, "Circle", "radius")
        .unwrap();
    populate(&mut indexer);

    let report = indexer.unregister_packages(&[SHAPES_URI.to_owned()]).unwrap();
    assert_eq!(report.packages, vec!["urn:ext".to_owned(), SHAPES_URI.to_owned()]);
    assert_eq!((report.types, report.instances, report.files), (6, 3, 2));

    let store = indexer.store();
    assert_eq!(store.node_count(), 0);
    assert_eq!(store.edge_count(), 0);
    assert_eq!(indexed_files(store), 0);
    assert!(store.index_names().iter().all(|n| !n.starts_with(SHAPES_URI)));
    assert!(indexer.type_node(&shapes("Circle")).is_none());
}

#[test]
fn unknown_packages_are_skipped() {
    let mut indexer = shapes_indexer();
    let report = indexer
        .unregister_packages(&["urn:missing".to_owned()])
        .unwrap();
    assert!(report.packages.is_empty());
    assert!(indexer.type_node(&shapes("Circle")).is_some());
}

#[test]
fn a_failing_package_deletion_is_rolled_back() {
    init_test_tracing();
    let mut indexer = ModelIndexer::new(FaultyStore::new(MemoryStore::new()), IndexerConfig::default());
    indexer
        .register_packages(&[shapes_package(), extension()])
        .unwrap();
    populate(&mut indexer);
    let before = (
        indexer.store().inner().node_count(),
        indexer.store().inner().edge_count(),
    );

    indexer.store_mut().fail_node_deletes(true);
    let err = indexer
        .unregister_packages(&[SHAPES_URI.to_owned()])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CascadeFailure);
    let IndexError::CascadeFailed { package, completed, .. } = &err else {
        unreachable!("cascade failure expected, got {err:?}");
    };
    assert_eq!(package, "urn:ext");
    assert!(completed.is_empty());
    assert!(indexer.store().failures() > 0);

    let inner = indexer.store().inner();
    assert_eq!((inner.node_count(), inner.edge_count()), before);
    for (label, count) in [(EDGE_TYPE_OF, 3), (EDGE_KIND_OF, 3)] {
        let edges: usize = inner
            .nodes_with_label(LABEL_INSTANCE)
            .into_iter()
            .map(|n| inner.outgoing(n, Some(label)).len())
            .sum();
        assert_eq!(edges, count, "{label}");
    }

    indexer.store_mut().heal();
    let report = indexer
        .unregister_packages(&[SHAPES_URI.to_owned()])
        .unwrap();
    assert_eq!(report.packages.len(), 2);
    assert_eq!(indexer.store().inner().node_count(), 0);
}

#[test]
fn deleting_a_file_removes_its_holders_and_index_entries() {
    let mut indexer = shapes_indexer();
    indexer
        .add_indexed_attribute(SHAPES_URI, "Circle", "radius")
        .unwrap();
    let spec = DerivedAttributeSpec::single("diameter", "EDouble", "double", "radius");
    indexer
        .add_derived_attribute(SHAPES_URI, "Circle", &spec)
        .unwrap();
    indexer.insert_file(&file("f1"), &[circle("c1")]).unwrap();
    assert_eq!(indexer.pending_derivations(), 1);

    let deletion = indexer.delete_file(REPO, "f1").unwrap();
    assert_eq!((deletion.instances, deletion.demoted), (1, 0));
    assert_eq!(indexer.pending_derivations(), 0);
    assert!(indexer
        .query_indexed(SHAPES_URI, "Circle", "radius", &IndexQuery::Any)
        .is_empty());
    assert_eq!(instance_count(indexer.store()), 0);
    assert_eq!(indexed_files(indexer.store()), 0);
}
