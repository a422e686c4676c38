// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs, clippy::unwrap_used)]

mod common;

use common::{file, node, shapes_indexer, REPO};
use modelgraph_core::constants::{INDEX_PROXIES, KEY_PROXY};
use modelgraph_core::{pending_files, GraphStore, IndexKey, MemoryStore, ModelIndexer, Scalar};
use modelgraph_dry_tests::{assert_no_dangling_proxies, shapes, FixtureElement};

fn link(id: &str, target: &str) -> FixtureElement {
    FixtureElement::new(shapes("Link"), id).reference("target", &[target])
}

fn circle(id: &str) -> FixtureElement {
    FixtureElement::new(shapes("Circle"), id).attr("radius", Scalar::Real(1.0))
}

fn f2_key(indexer: &ModelIndexer<MemoryStore>) -> String {
    indexer.config().file_key(REPO, "f2")
}

#[test]
fn reference_into_a_later_file_is_resolved_when_it_arrives() {
    let mut indexer = shapes_indexer();
    let stats = indexer.insert_file(&file("f1"), &[link("a", "f2#b")]).unwrap();
    assert_eq!((stats.references, stats.proxies), (0, 1));

    let a = node(&indexer, "f1", "a");
    let key = f2_key(&indexer);
    assert_eq!(
        indexer
            .store()
            .index_get(INDEX_PROXIES, KEY_PROXY, &IndexKey::from(key.as_str())),
        vec![a]
    );
    assert_eq!(pending_files(indexer.store(), a), vec![key.clone()]);
    assert_eq!(indexer.unresolved_proxy_count(), 1);

    let stats = indexer.insert_file(&file("f2"), &[circle("b")]).unwrap();
    assert_eq!((stats.resolved_proxies, stats.unresolved_proxies), (1, 0));

    let b = node(&indexer, "f2", "b");
    let edges = indexer.store().outgoing(a, Some("target"));
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].to, b);
    assert_eq!(indexer.unresolved_proxy_count(), 0);
    assert!(indexer
        .store()
        .index_get(INDEX_PROXIES, KEY_PROXY, &IndexKey::from(key.as_str()))
        .is_empty());
    assert!(pending_files(indexer.store(), a).is_empty());
    assert_no_dangling_proxies(indexer.store(), &key);
}

#[test]
fn reference_into_an_earlier_file_is_wired_immediately() {
    let mut indexer = shapes_indexer();
    indexer.insert_file(&file("f2"), &[circle("b")]).unwrap();
    let stats = indexer.insert_file(&file("f1"), &[link("a", "f2#b")]).unwrap();
    assert_eq!((stats.references, stats.proxies), (1, 0));
    assert_eq!(indexer.unresolved_proxy_count(), 0);
}

#[test]
fn missing_targets_stay_pending_and_are_reported() {
    let mut indexer = shapes_indexer();
    indexer.insert_file(&file("f1"), &[link("a", "f2#b")]).unwrap();
    let stats = indexer.insert_file(&file("f2"), &[circle("not-b")]).unwrap();
    assert_eq!((stats.resolved_proxies, stats.unresolved_proxies), (0, 1));
    assert_eq!(indexer.unresolved_proxy_count(), 1);
    assert!(indexer
        .store()
        .outgoing(node(&indexer, "f1", "a"), Some("target"))
        .is_empty());
}

#[test]
fn deleting_a_target_file_demotes_references_back_to_proxies() {
    let mut indexer = shapes_indexer();
    indexer.insert_file(&file("f1"), &[link("a", "f2#b")]).unwrap();
    indexer.insert_file(&file("f2"), &[circle("b")]).unwrap();
    let a = node(&indexer, "f1", "a");

    let deletion = indexer.delete_file(REPO, "f2").unwrap();
    assert_eq!((deletion.instances, deletion.demoted), (1, 1));
    assert!(indexer.file_node(REPO, "f2").is_none());
    assert!(indexer.store().outgoing(a, Some("target")).is_empty());
    assert_eq!(indexer.unresolved_proxy_count(), 1);

    indexer.insert_file(&file("f2"), &[circle("b")]).unwrap();
    let b = node(&indexer, "f2", "b");
    let edges = indexer.store().outgoing(a, Some("target"));
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].to, b);
    assert_eq!(indexer.unresolved_proxy_count(), 0);
}

#[test]
fn deleting_an_unknown_file_is_an_error() {
    let mut indexer = shapes_indexer();
    assert!(matches!(
        indexer.delete_file(REPO, "nope"),
        Err(modelgraph_core::IndexError::FileNotIndexed(_))
    ));
}
