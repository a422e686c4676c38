// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! modelgraph-core: incremental model-to-graph indexing engine.
//!
//! Turns metamodel schemas (packages of types) and model elements (instances
//! of those types, grouped by file) into nodes, edges and named indices of a
//! property graph behind the [`GraphStore`] trait, and keeps that graph in
//! step as files are inserted, updated and deleted. Every mutation is also
//! recorded in an ordered [`ChangeLog`] for a single downstream consumer.
//!
//! The pipeline is synchronous and single-writer. [`ModelIndexer`] is the
//! usual entry point; the per-component functions are public for callers
//! that manage their own [`IndexContext`].
#![forbid(unsafe_code)]

mod batch;
mod cache;
mod cascade;
mod change_log;
/// Settings and the config persistence port.
pub mod config;
/// Reserved labels, property names and index names of the graph layout.
pub mod constants;
mod context;
mod derived;
mod descriptor;
mod encode;
mod error;
mod ident;
mod incremental;
mod indexer;
mod instance;
mod memory;
mod model;
mod proxy;
mod record;
mod registrar;
mod schema;
mod store;
mod value;

/// Two-pass batch insertion of a file.
pub use batch::{insert_file, ElementFailure, FileDescriptor, InsertStats};
/// Type node cache and schema lookups.
pub use cache::{find_type_node, has_instances, instances_of, type_ref_of, TypeCache, TypeInfo};
/// Package and file deletion.
pub use cascade::{
    collect_dependents, delete_file, delete_packages, deletion_order, CascadeStage, DeletionReport,
    FileDeletion,
};
/// Ordered change records.
pub use change_log::{stats_of, ChangeCategory, ChangeLog, ChangeOp, ChangeRecord, ChangeStats};
/// Settings.
pub use config::{ConfigError, ConfigStore, IndexerConfig};
/// Borrowed state of one indexing pass.
pub use context::IndexContext;
/// Derived and indexed attributes.
pub use derived::{
    add_derived_attribute, add_indexed_attribute, derive_pending, holder_spec, mark_dirty,
    pending_derivations, pending_holders, propagate_derived_attribute,
    propagate_indexed_attribute, remove_derived_attribute, remove_indexed_attribute, Access,
    DerivationEngine, DerivationOutcome, DerivationReport, DerivationRequest,
    DerivedAttributeSpec,
};
/// Stored feature descriptors.
pub use descriptor::{DescriptorTail, Descriptors, FeatureDescriptor, FeatureKind};
/// Attribute encoding and content hashing.
pub use encode::{content_hash, encode_attribute, encode_attributes};
/// Error taxonomy.
pub use error::{DescriptorError, ElementError, ErrorKind, IndexError, SchemaError};
/// Identifiers and hashing.
pub use ident::{hash_hex, ContentHasher, EdgeId, Hash, NodeId, TxId};
/// Delta update of a file.
pub use incremental::{update_file, UpdateStats};
/// Facade owning a store.
pub use indexer::{IndexerMode, ModelIndexer};
/// Instance node writer.
pub use instance::{
    create_instance, dereference_instance, file_contents, placeholder_of, remove_instance,
    sync_references, update_attributes, ReferenceSync, Resolution, TargetResolver,
};
/// In-memory reference store.
pub use memory::{MemoryStore, MemoryStoreStats};
/// Element capability interface.
pub use model::{AttributeValue, ElementRef, FeatureValue, ModelElement, ReferenceValue};
/// Pending cross-file references.
pub use proxy::{
    pending_files, record_proxy, resolve_pending, unresolved_count, ProxyResolution, ProxyTarget,
    ReferenceFlags, UnresolvedProxy,
};
/// Graph records.
pub use record::{EdgeRecord, NodeRecord, Properties};
/// Schema registration.
pub use registrar::{register_packages, unregister_packages, RegistrationReport};
/// Schema definitions.
pub use schema::{AttributeDef, DataType, PackageDef, ReferenceDef, TypeDef, TypeRef};
/// Storage contract.
pub use store::{node_identifier, single_node, GraphStore, IndexQuery, StoreError};
/// Property values and index keys.
pub use value::{IndexKey, OrderedReal, PropertyValue, Scalar, ScalarKind};
