// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs, clippy::unwrap_used)]

mod common;

use std::collections::BTreeSet;

use common::{extension, file, node};
use modelgraph_core::constants::{
    EDGE_DEPENDENCY, EDGE_EPACKAGE, EDGE_KIND_OF, INDEX_PACKAGES, KEY_ID, LABEL_PACKAGE,
    LABEL_TYPE, PROP_SUPERTYPES,
};
use modelgraph_core::{
    single_node, ChangeCategory, ChangeOp, ErrorKind, FeatureDescriptor, FeatureKind, GraphStore,
    IndexError, IndexerConfig, MemoryStore, ModelIndexer, PackageDef, PropertyValue, Scalar,
    SchemaError, TypeRef,
};
use modelgraph_dry_tests::{
    assert_type_edges, shapes, shapes_package, FixtureElement, PackageBuilder, TypeBuilder,
    SHAPES_URI,
};

fn fresh() -> ModelIndexer<MemoryStore> {
    modelgraph_dry_tests::init_test_tracing();
    ModelIndexer::new(MemoryStore::new(), IndexerConfig::default())
}

#[test]
fn registering_shapes_creates_package_and_type_nodes() {
    let mut indexer = fresh();
    let report = indexer.register_packages(&[shapes_package()]).unwrap();
    assert_eq!(report.added, vec![SHAPES_URI.to_owned()]);

    let store = indexer.store();
    let pkg = single_node(store, INDEX_PACKAGES, KEY_ID, SHAPES_URI).unwrap();
    assert_eq!(store.nodes_with_label(LABEL_PACKAGE), vec![pkg]);
    assert_eq!(store.nodes_with_label(LABEL_TYPE).len(), 5);
    assert_eq!(store.incoming(pkg, Some(EDGE_EPACKAGE)).len(), 5);

    let circle = indexer.type_node(&shapes("Circle")).unwrap();
    let radius = store.property(circle, "radius").unwrap();
    let d = FeatureDescriptor::decode("radius", &radius).unwrap();
    assert_eq!(d.kind(), FeatureKind::Attribute);
    assert!(!d.is_indexed());
    assert!(store.property(circle, "name").is_some(), "inherited features are stored");
    assert!(store.property(circle, PROP_SUPERTYPES).is_some());

    let changes = indexer.changes();
    assert_eq!(changes[0].op, ChangeOp::Add);
    assert_eq!(changes[0].category, ChangeCategory::Metamodel);
    assert_eq!(changes[0].identifier, SHAPES_URI);
    let stats = indexer.change_stats();
    assert_eq!((stats.metamodels, stats.types), (1, 5));
}

#[test]
fn re_registration_changes_nothing() {
    let mut indexer = fresh();
    indexer.register_packages(&[shapes_package()]).unwrap();
    let nodes = indexer.store().node_count();
    indexer.take_changes();

    let report = indexer.register_packages(&[shapes_package()]).unwrap();
    assert_eq!(report.skipped, vec![SHAPES_URI.to_owned()]);
    assert!(report.is_complete());
    assert_eq!(indexer.store().node_count(), nodes);
    assert!(indexer.changes().is_empty());
}

#[test]
fn dependencies_must_be_registered_first() {
    let mut indexer = fresh();
    let report = indexer.register_packages(&[extension()]).unwrap();
    assert!(!report.is_complete());
    let (uri, err) = &report.failed[0];
    assert_eq!(uri, "urn:ext");
    assert_eq!(
        err,
        &SchemaError::UnregisteredDependency {
            package: "urn:ext".into(),
            dependency: SHAPES_URI.into(),
        }
    );
    assert_eq!(
        IndexError::from(err.clone()).kind(),
        ErrorKind::SchemaOrdering
    );
    assert_eq!(indexer.store().node_count(), 0, "the failed package is rolled back");
    let last = indexer.changes().last().unwrap();
    assert_eq!(
        (last.op, last.category, last.identifier.as_str()),
        (ChangeOp::Remove, ChangeCategory::Metamodel, "urn:ext")
    );

    indexer.register_packages(&[shapes_package()]).unwrap();
    let report = indexer.register_packages(&[extension()]).unwrap();
    assert_eq!(report.added, vec!["urn:ext".to_owned()]);
    let store = indexer.store();
    let ext = single_node(store, INDEX_PACKAGES, KEY_ID, "urn:ext").unwrap();
    let deps = store.outgoing(ext, Some(EDGE_DEPENDENCY));
    assert_eq!(deps.len(), 1, "supertype and reference target share one edge");
    assert_eq!(
        Some(deps[0].to),
        single_node(store, INDEX_PACKAGES, KEY_ID, SHAPES_URI)
    );
}

#[test]
fn one_batch_may_list_a_dependent_before_its_dependency() {
    let mut indexer = fresh();
    let report = indexer
        .register_packages(&[extension(), shapes_package()])
        .unwrap();
    assert!(report.is_complete());
    assert_eq!(report.added.len(), 2);
}

#[test]
fn unregistering_removes_dependents_as_well() {
    let mut indexer = fresh();
    indexer
        .register_packages(&[shapes_package(), extension()])
        .unwrap();
    let report = indexer
        .unregister_packages(&[SHAPES_URI.to_owned()])
        .unwrap();
    assert_eq!(
        report.packages,
        vec!["urn:ext".to_owned(), SHAPES_URI.to_owned()],
        "dependents are deleted first"
    );
    assert_eq!(report.types, 6);
    assert_eq!(indexer.store().node_count(), 0);
    assert_eq!(indexer.store().edge_count(), 0);
    assert!(indexer.type_node(&shapes("Circle")).is_none());
}

/// `urn:top`: `Nova extends ext::Star { mass: EDouble }`.
fn novae() -> PackageDef {
    PackageBuilder::new("urn:top")
        .with(
            TypeBuilder::new("Nova")
                .extends(TypeRef::new("urn:ext", "Star"))
                .attribute("mass", "EDouble"),
        )
        .build()
}

#[test]
fn inheritance_spans_a_chain_of_packages() {
    let mut indexer = fresh();
    for package in [shapes_package(), extension(), novae()] {
        assert!(indexer.register_packages(&[package]).unwrap().is_complete());
    }
    let star_type = TypeRef::new("urn:ext", "Star");
    let nova_type = TypeRef::new("urn:top", "Nova");
    let elements = [
        FixtureElement::new(star_type.clone(), "polaris").text("name", "polaris"),
        FixtureElement::new(nova_type.clone(), "sn1987a")
            .text("name", "sn1987a")
            .attr("points", Scalar::Int(12))
            .attr("mass", Scalar::Real(18.0)),
    ];
    indexer.insert_file(&file("sky"), &elements).unwrap();

    let star = node(&indexer, "sky", "polaris");
    let nova = node(&indexer, "sky", "sn1987a");
    let store = indexer.store();
    assert_eq!(store.property(star, "name"), Some(PropertyValue::from("polaris")));
    assert_eq!(store.property(nova, "name"), Some(PropertyValue::from("sn1987a")));
    assert_eq!(store.property(nova, "points"), Some(PropertyValue::Int(12)));

    let kinds: BTreeSet<_> = store
        .outgoing(nova, Some(EDGE_KIND_OF))
        .into_iter()
        .map(|e| e.to)
        .collect();
    let expected: BTreeSet<_> = [star_type, shapes("Shape")]
        .iter()
        .map(|t| indexer.type_node(t).unwrap())
        .collect();
    assert_eq!(kinds, expected);

    let nova_node = indexer.type_node(&nova_type).unwrap();
    assert_eq!(
        store.property(nova_node, PROP_SUPERTYPES),
        Some(PropertyValue::StrArray(vec![
            "urn:ext#Star".to_owned(),
            format!("{SHAPES_URI}#Shape"),
        ]))
    );
    let top = single_node(store, INDEX_PACKAGES, KEY_ID, "urn:top").unwrap();
    assert_eq!(store.outgoing(top, Some(EDGE_DEPENDENCY)).len(), 2);
    assert_type_edges(store);
}

#[test]
fn a_diamond_of_packages_is_deleted_dependents_first() {
    let mut indexer = fresh();
    let a = PackageBuilder::new("urn:a")
        .with(TypeBuilder::new("A").attribute("a", "EInt"))
        .build();
    let b = PackageBuilder::new("urn:b")
        .with(TypeBuilder::new("B").extends(TypeRef::new("urn:a", "A")))
        .build();
    let c = PackageBuilder::new("urn:c")
        .with(
            TypeBuilder::new("C")
                .extends(TypeRef::new("urn:b", "B"))
                .extends(TypeRef::new("urn:a", "A")),
        )
        .build();
    let report = indexer.register_packages(&[a, c, b]).unwrap();
    assert!(report.is_complete());

    let report = indexer.unregister_packages(&["urn:a".to_owned()]).unwrap();
    assert_eq!(
        report.packages,
        ["urn:c", "urn:b", "urn:a"].map(String::from).to_vec()
    );
    assert_eq!(indexer.store().node_count(), 0);
}
