// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for modelgraph crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`config`] - In-memory config store fake for testing without filesystem
//! - [`element`] - Map-backed model elements
//! - [`invariants`] - Graph-shape assertions
//! - [`logging`] - Log capture for test runs
//! - [`schema`] - Package/type builders and the sample `shapes` metamodel
//! - [`store`] - Store wrapper with injectable failures

pub mod config;
pub mod element;
pub mod invariants;
pub mod logging;
pub mod schema;
pub mod store;

pub use config::InMemoryConfigStore;
pub use element::FixtureElement;
pub use invariants::{
    assert_file_membership, assert_no_dangling_proxies, assert_type_edges, instance_count,
};
pub use logging::init_test_tracing;
pub use schema::{shapes, shapes_package, PackageBuilder, TypeBuilder, SHAPES_URI};
pub use store::FaultyStore;
