// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs, clippy::unwrap_used)]

mod common;

use std::collections::HashMap;

use common::{file, node, shapes_indexer_with, REPO};
use modelgraph_core::config::INDEXER_CONFIG_KEY;
use modelgraph_core::{ConfigError, GraphStore, IndexerConfig, Scalar};
use modelgraph_dry_tests::{shapes, FixtureElement, InMemoryConfigStore};

#[test]
fn missing_config_loads_defaults_without_writing() {
    let store = InMemoryConfigStore::new();
    assert_eq!(
        IndexerConfig::load_or_default(&store).unwrap(),
        IndexerConfig::default()
    );
    assert_eq!((store.load_count(), store.save_count()), (1, 0));
}

#[test]
fn partial_documents_keep_other_defaults() {
    let mut data = HashMap::new();
    data.insert(
        INDEXER_CONFIG_KEY.to_owned(),
        br#"{ "repository_separator": "!", "bulk_load": false }"#.to_vec(),
    );
    let store = InMemoryConfigStore::with_data(data);
    let cfg = IndexerConfig::load_or_default(&store).unwrap();
    assert_eq!(cfg.repository_separator, "!");
    assert!(!cfg.bulk_load);
    assert!(cfg.resolve_proxies_on_insert);
    assert_eq!(cfg.file_key("r", "p"), "r!p");
}

#[test]
fn malformed_documents_and_store_failures_surface() {
    let mut data = HashMap::new();
    data.insert(INDEXER_CONFIG_KEY.to_owned(), b"{ not json".to_vec());
    let store = InMemoryConfigStore::with_data(data);
    assert!(matches!(
        IndexerConfig::load_or_default(&store),
        Err(ConfigError::Malformed(_))
    ));

    let store = InMemoryConfigStore::new();
    store.set_fail_on_save(true);
    assert!(matches!(
        IndexerConfig::default().save(&store),
        Err(ConfigError::Unavailable(_))
    ));
    assert!(!store.contains_key(INDEXER_CONFIG_KEY));
}

#[test]
fn loaded_settings_drive_the_indexer() {
    let seeded = IndexerConfig {
        repository_separator: "::".into(),
        resolve_proxies_on_insert: false,
        ..IndexerConfig::default()
    };
    let store = InMemoryConfigStore::with_indexer_config(&seeded).unwrap();
    let cfg = IndexerConfig::load_or_default(&store).unwrap();
    let mut indexer = shapes_indexer_with(cfg);
    assert_eq!(indexer.config().file_key(REPO, "f1"), format!("{REPO}::f1"));

    let link = FixtureElement::new(shapes("Link"), "a").reference("target", &["f2#b"]);
    let circle = FixtureElement::new(shapes("Circle"), "b").attr("radius", Scalar::Real(1.0));
    indexer.insert_file(&file("f1"), &[link]).unwrap();
    let stats = indexer.insert_file(&file("f2"), &[circle]).unwrap();
    assert_eq!(stats.resolved_proxies, 0);
    assert_eq!(indexer.unresolved_proxy_count(), 1);

    let resolution = indexer.resolve_proxies(REPO, "f2").unwrap();
    assert_eq!(resolution.resolved, 1);
    assert!(resolution.unresolved.is_empty());
    assert_eq!(indexer.unresolved_proxy_count(), 0);
    let edges = indexer.store().outgoing(node(&indexer, "f1", "a"), Some("target"));
    assert_eq!(edges[0].to, node(&indexer, "f2", "b"));
}
