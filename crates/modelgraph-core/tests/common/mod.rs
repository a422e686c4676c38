// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code, clippy::unwrap_used, clippy::panic)]

use modelgraph_core::{FileDescriptor, IndexerConfig, MemoryStore, ModelIndexer, NodeId, PackageDef};
use modelgraph_dry_tests::{init_test_tracing, shapes, shapes_package, PackageBuilder, TypeBuilder};

pub const REPO: &str = "git://example.org/models";

/// Indexer over a fresh memory store with the `shapes` metamodel registered.
pub fn shapes_indexer() -> ModelIndexer<MemoryStore> {
    shapes_indexer_with(IndexerConfig::default())
}

pub fn shapes_indexer_with(config: IndexerConfig) -> ModelIndexer<MemoryStore> {
    init_test_tracing();
    let mut indexer = ModelIndexer::new(MemoryStore::new(), config);
    let report = indexer.register_packages(&[shapes_package()]).unwrap();
    assert!(report.is_complete());
    indexer.take_changes();
    indexer
}

/// `urn:ext`: `Star extends shapes::Shape { points: EInt, around: shapes::Circle }`.
pub fn extension() -> PackageDef {
    PackageBuilder::new("urn:ext")
        .with(
            TypeBuilder::new("Star")
                .extends(shapes("Shape"))
                .attribute("points", "EInt")
                .reference("around", shapes("Circle"), false),
        )
        .build()
}

pub fn file(path: &str) -> FileDescriptor {
    FileDescriptor::new(REPO, path, "r1")
}

pub fn node(indexer: &ModelIndexer<MemoryStore>, path: &str, id: &str) -> NodeId {
    indexer
        .instance(REPO, path, id)
        .unwrap_or_else(|| panic!("{path}#{id} is not indexed"))
}
