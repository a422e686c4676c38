// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Derived and indexed attributes.
//!
//! `add_*`/`remove_*` change the schema only: they rewrite one descriptor on a
//! type node and report whether instances already exist. Walking those
//! instances is a separate, caller-triggered sweep (`propagate_*`).
//!
//! Every instance of a type with a derived attribute carries a holder node per
//! derived feature, reached through an `isDerived` edge labelled with the
//! feature. A holder is pending while it sits in the `derived-pending` index;
//! [`derive_pending`] hands pending holders to a [`DerivationEngine`] and
//! records which `(node, property)` pairs the derivation read in the
//! `derived-access` index, so [`mark_dirty`] can send it back to pending when
//! one of them changes.
use std::collections::BTreeSet;

use tracing::{debug, info, instrument, warn};

use crate::cache::{find_type_node, has_instances, instances_of};
use crate::change_log::{ChangeCategory, ChangeOp, ChangeRecord};
use crate::constants::{
    attribute_index_name, ACCESS_ANY, DERIVED_PROP_LANGUAGE, DERIVED_PROP_LOGIC,
    DERIVED_PROP_MANY, DERIVED_PROP_ORDERED, DERIVED_PROP_TYPE, DERIVED_PROP_UNIQUE,
    EDGE_PROP_DERIVED, EXEC_ERROR_PREFIX, INDEX_DERIVED_ACCESS, INDEX_PACKAGES,
    INDEX_PENDING_DERIVED, KEY_DERIVED, KEY_ID, PARSE_ERROR_PREFIX,
};
use crate::context::IndexContext;
use crate::descriptor::{FeatureDescriptor, FeatureKind};
use crate::error::{IndexError, SchemaError};
use crate::ident::NodeId;
use crate::instance::{create_placeholder, mark_pending, placeholder_of};
use crate::schema::TypeRef;
use crate::store::{single_node, GraphStore, IndexQuery, StoreError};
use crate::value::{IndexKey, PropertyValue};

/// Declaration of a derived attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DerivedAttributeSpec {
    /// Feature name.
    pub name: String,
    /// Multi-valued.
    pub many: bool,
    /// Values keep their order.
    pub ordered: bool,
    /// Values are distinct.
    pub unique: bool,
    /// Value type name.
    pub value_type: String,
    /// Script language.
    pub language: String,
    /// Script body.
    pub logic: String,
}

impl DerivedAttributeSpec {
    /// Single-valued derived attribute.
    pub fn single(
        name: impl Into<String>,
        value_type: impl Into<String>,
        language: impl Into<String>,
        logic: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            many: false,
            ordered: true,
            unique: true,
            value_type: value_type.into(),
            language: language.into(),
            logic: logic.into(),
        }
    }

    fn descriptor(&self) -> FeatureDescriptor {
        FeatureDescriptor::derived(
            self.many,
            self.ordered,
            self.unique,
            self.value_type.clone(),
            self.language.clone(),
            self.logic.clone(),
        )
    }
}

fn type_node<S: GraphStore + ?Sized>(
    store: &S,
    package: &str,
    type_name: &str,
) -> Result<NodeId, SchemaError> {
    if single_node(store, INDEX_PACKAGES, KEY_ID, package).is_none() {
        return Err(SchemaError::UnknownPackage(package.to_owned()));
    }
    find_type_node(store, &TypeRef::new(package, type_name)).ok_or_else(|| {
        SchemaError::UnknownType {
            package: package.to_owned(),
            type_name: type_name.to_owned(),
        }
    })
}

fn descriptor_of<S: GraphStore + ?Sized>(
    store: &S,
    node: NodeId,
    type_name: &str,
    feature: &str,
) -> Result<FeatureDescriptor, SchemaError> {
    let raw = store
        .property(node, feature)
        .filter(|_| !feature.starts_with('_'))
        .ok_or_else(|| SchemaError::UnknownFeature {
            type_name: type_name.to_owned(),
            feature: feature.to_owned(),
        })?;
    Ok(FeatureDescriptor::decode(feature, &raw)?)
}

fn attribute_descriptor<S: GraphStore + ?Sized>(
    store: &S,
    node: NodeId,
    type_name: &str,
    feature: &str,
) -> Result<FeatureDescriptor, SchemaError> {
    let d = descriptor_of(store, node, type_name, feature)?;
    if d.kind() != FeatureKind::Attribute {
        return Err(SchemaError::NotAnAttribute {
            type_name: type_name.to_owned(),
            feature: feature.to_owned(),
        });
    }
    Ok(d)
}

fn derived_descriptor<S: GraphStore + ?Sized>(
    store: &S,
    node: NodeId,
    type_name: &str,
    feature: &str,
) -> Result<FeatureDescriptor, SchemaError> {
    let d = descriptor_of(store, node, type_name, feature)?;
    if d.kind() != FeatureKind::Derived {
        return Err(SchemaError::NotDerived {
            type_name: type_name.to_owned(),
            feature: feature.to_owned(),
        });
    }
    Ok(d)
}

fn drop_index_if_present<S: GraphStore + ?Sized>(store: &mut S, name: &str) -> Result<(), StoreError> {
    match store.drop_index(name) {
        Err(StoreError::IndexNotFound(_)) => Ok(()),
        other => other,
    }
}

/// Declares a derived attribute on `package#type_name`.
///
/// A name that already carries any descriptor is left untouched and the call
/// returns `false`. Otherwise returns whether instances of the type exist, in
/// which case the caller should run [`propagate_derived_attribute`].
#[instrument(level = "info", skip(ctx, spec), fields(feature = %spec.name))]
pub fn add_derived_attribute<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    package: &str,
    type_name: &str,
    spec: &DerivedAttributeSpec,
) -> Result<bool, IndexError> {
    ctx.in_tx(|ctx| {
        let node = type_node(&*ctx.store, package, type_name)?;
        if spec.name.starts_with('_') {
            return Err(SchemaError::ReservedFeatureName {
                type_name: type_name.to_owned(),
                feature: spec.name.clone(),
            }
            .into());
        }
        if ctx.store.property(node, &spec.name).is_some() {
            warn!(type_name, feature = %spec.name, "feature already declared, derived attribute not added");
            return Ok(false);
        }
        ctx.store
            .set_property(node, &spec.name, spec.descriptor().encode())?;
        ctx.cache.invalidate(node);
        info!(
            type_name,
            feature = %spec.name,
            language = %spec.language,
            logic = ctx.config.snippet(&spec.logic),
            "derived attribute added"
        );
        Ok(has_instances(&*ctx.store, node))
    })
}

/// Marks an existing attribute as indexed and creates its value index.
///
/// Returns `false` if it was already indexed; otherwise whether instances
/// exist, in which case the caller should run [`propagate_indexed_attribute`].
#[instrument(level = "info", skip(ctx))]
pub fn add_indexed_attribute<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    package: &str,
    type_name: &str,
    attribute: &str,
) -> Result<bool, IndexError> {
    ctx.in_tx(|ctx| {
        let node = type_node(&*ctx.store, package, type_name)?;
        let d = attribute_descriptor(&*ctx.store, node, type_name, attribute)?;
        if d.is_indexed() {
            warn!(type_name, attribute, "attribute already indexed");
            return Ok(false);
        }
        ctx.store
            .set_property(node, attribute, d.with_indexed(true).encode())?;
        ctx.store
            .create_index(&attribute_index_name(package, type_name, attribute))?;
        ctx.cache.invalidate(node);
        info!(type_name, attribute, "attribute indexed");
        Ok(has_instances(&*ctx.store, node))
    })
}

/// Clears the indexed flag of an attribute and drops its value index.
///
/// Returns `false` if it was not indexed.
#[instrument(level = "info", skip(ctx))]
pub fn remove_indexed_attribute<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    package: &str,
    type_name: &str,
    attribute: &str,
) -> Result<bool, IndexError> {
    ctx.in_tx(|ctx| {
        let node = type_node(&*ctx.store, package, type_name)?;
        let d = attribute_descriptor(&*ctx.store, node, type_name, attribute)?;
        if !d.is_indexed() {
            return Ok(false);
        }
        ctx.store
            .set_property(node, attribute, d.with_indexed(false).encode())?;
        drop_index_if_present(
            &mut *ctx.store,
            &attribute_index_name(package, type_name, attribute),
        )?;
        ctx.cache.invalidate(node);
        info!(type_name, attribute, "attribute no longer indexed");
        Ok(true)
    })
}

/// Removes a derived attribute with every holder node of its instances.
///
/// Returns the number of holders deleted.
#[instrument(level = "info", skip(ctx))]
pub fn remove_derived_attribute<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    package: &str,
    type_name: &str,
    feature: &str,
) -> Result<usize, IndexError> {
    ctx.in_tx(|ctx| {
        let node = type_node(&*ctx.store, package, type_name)?;
        derived_descriptor(&*ctx.store, node, type_name, feature)?;
        let mut removed = 0;
        for instance in instances_of(&*ctx.store, node) {
            for edge in ctx.store.outgoing(instance, Some(feature)) {
                if edge.has_flag(EDGE_PROP_DERIVED) {
                    ctx.store.delete_edge(edge.id)?;
                    ctx.store.delete_node(edge.to)?;
                    removed += 1;
                }
            }
        }
        ctx.store.remove_property(node, feature)?;
        ctx.cache.invalidate(node);
        info!(type_name, feature, holders = removed, "derived attribute removed");
        Ok(removed)
    })
}

/// Gives every existing instance of the type a pending holder for `feature`.
///
/// Instances that already have one are reset to pending. Returns the number
/// of holders touched.
#[instrument(level = "info", skip(ctx))]
pub fn propagate_derived_attribute<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    package: &str,
    type_name: &str,
    feature: &str,
) -> Result<usize, IndexError> {
    ctx.in_tx(|ctx| {
        let node = type_node(&*ctx.store, package, type_name)?;
        let d = derived_descriptor(&*ctx.store, node, type_name, feature)?;
        let logic = d.derivation().map_or("", |(_, logic)| logic);
        let instances = instances_of(&*ctx.store, node);
        for &instance in &instances {
            match placeholder_of(&*ctx.store, instance, feature) {
                Some(holder) => {
                    mark_pending(&mut *ctx.store, holder, feature, logic)?;
                    ctx.store
                        .index_remove(INDEX_DERIVED_ACCESS, holder, None, None)?;
                }
                None => {
                    create_placeholder(&mut *ctx.store, instance, feature, &d)?;
                }
            }
        }
        debug!(type_name, feature, instances = instances.len(), "derived attribute propagated");
        Ok(instances.len())
    })
}

/// Indexes the current value of `attribute` on every existing instance.
///
/// Returns the number of instances that carry a value.
#[instrument(level = "info", skip(ctx))]
pub fn propagate_indexed_attribute<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    package: &str,
    type_name: &str,
    attribute: &str,
) -> Result<usize, IndexError> {
    ctx.in_tx(|ctx| {
        let node = type_node(&*ctx.store, package, type_name)?;
        let d = attribute_descriptor(&*ctx.store, node, type_name, attribute)?;
        if !d.is_indexed() {
            return Ok(0);
        }
        let index = attribute_index_name(package, type_name, attribute);
        let mut indexed = 0;
        for instance in instances_of(&*ctx.store, node) {
            if let Some(value) = ctx.store.property(instance, attribute) {
                ctx.store
                    .index_remove(&index, instance, Some(attribute), None)?;
                ctx.store.index_add(&index, instance, attribute, &value)?;
                indexed += 1;
            }
        }
        Ok(indexed)
    })
}

/// A `(node, property)` pair read by a derivation. `property = None` means
/// the derivation depends on the node as a whole.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Access {
    /// Node read.
    pub node: NodeId,
    /// Property read.
    pub property: Option<String>,
}

/// What a derivation engine produced for one holder.
#[derive(Clone, Debug, PartialEq)]
pub enum DerivationOutcome {
    /// The derived value and the accesses that produced it.
    Value {
        /// Value to store.
        value: PropertyValue,
        /// Everything the derivation read.
        accessed: Vec<Access>,
    },
    /// The script did not parse.
    ParseError(String),
    /// The script failed while running.
    ExecutionError(String),
}

/// One holder handed to a derivation engine.
#[derive(Clone, Copy, Debug)]
pub struct DerivationRequest<'a> {
    /// Holder node.
    pub holder: NodeId,
    /// Instance the value belongs to (`self` in the script).
    pub instance: NodeId,
    /// Feature name.
    pub feature: &'a str,
    /// Script language.
    pub language: &'a str,
    /// Script body.
    pub logic: &'a str,
    /// Declared value type.
    pub value_type: &'a str,
    /// Multi-valued.
    pub many: bool,
}

/// Evaluates derivation scripts. Script content is opaque to the indexer.
pub trait DerivationEngine {
    /// Returns `true` if the engine can run scripts in `language`.
    fn supports(&self, language: &str) -> bool;

    /// Evaluates one holder against a read-only store.
    fn derive<S: GraphStore + ?Sized>(
        &mut self,
        store: &S,
        request: &DerivationRequest<'_>,
    ) -> DerivationOutcome;
}

/// Counts of one [`derive_pending`] run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DerivationReport {
    /// Holders given a value.
    pub derived: usize,
    /// Holders given an error sentinel.
    pub failed: usize,
    /// Holders left pending because no engine supports their language.
    pub skipped: usize,
}

fn owner_of<S: GraphStore + ?Sized>(store: &S, holder: NodeId) -> Option<(NodeId, String)> {
    store
        .incoming(holder, None)
        .into_iter()
        .find(|e| e.has_flag(EDGE_PROP_DERIVED))
        .map(|e| (e.from, e.label))
}

fn string_prop<S: GraphStore + ?Sized>(store: &S, node: NodeId, key: &str) -> String {
    store
        .property(node, key)
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_default()
}

/// Holders currently waiting for derivation.
pub fn pending_holders<S: GraphStore + ?Sized>(store: &S) -> Vec<NodeId> {
    store.index_query(INDEX_PENDING_DERIVED, KEY_DERIVED, &IndexQuery::Any)
}

/// Number of holders currently waiting for derivation.
pub fn pending_derivations<S: GraphStore + ?Sized>(store: &S) -> usize {
    pending_holders(store).len()
}

/// Derives every pending holder whose language `engine` supports.
///
/// The value, or an error sentinel, is stored on the holder under the feature
/// name and the holder leaves the pending index. Its recorded accesses are
/// replaced by the ones reported by the engine.
#[instrument(level = "info", skip_all)]
pub fn derive_pending<S: GraphStore + ?Sized, D: DerivationEngine>(
    ctx: &mut IndexContext<'_, S>,
    engine: &mut D,
) -> Result<DerivationReport, IndexError> {
    ctx.in_tx(|ctx| {
        let mut report = DerivationReport::default();
        for holder in pending_holders(&*ctx.store) {
            let Some((instance, feature)) = owner_of(&*ctx.store, holder) else {
                warn!(%holder, "derived holder has no owner, dropping it from the pending index");
                ctx.store
                    .index_remove(INDEX_PENDING_DERIVED, holder, None, None)?;
                continue;
            };
            let language = string_prop(&*ctx.store, holder, DERIVED_PROP_LANGUAGE);
            let logic = string_prop(&*ctx.store, holder, DERIVED_PROP_LOGIC);
            if !engine.supports(&language) {
                warn!(%holder, language = %language, "no engine for derivation language");
                report.skipped += 1;
                continue;
            }
            let value_type = string_prop(&*ctx.store, holder, DERIVED_PROP_TYPE);
            let many = ctx
                .store
                .property(holder, DERIVED_PROP_MANY)
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let request = DerivationRequest {
                holder,
                instance,
                feature: &feature,
                language: &language,
                logic: &logic,
                value_type: &value_type,
                many,
            };
            let value = match engine.derive(&*ctx.store, &request) {
                DerivationOutcome::Value { value, accessed } => {
                    ctx.store
                        .index_remove(INDEX_DERIVED_ACCESS, holder, None, None)?;
                    for access in accessed {
                        let read = access.property.unwrap_or_else(|| ACCESS_ANY.to_owned());
                        ctx.store.index_add(
                            INDEX_DERIVED_ACCESS,
                            holder,
                            &access.node.to_string(),
                            &PropertyValue::Str(read),
                        )?;
                    }
                    report.derived += 1;
                    value
                }
                DerivationOutcome::ParseError(msg) => {
                    warn!(%holder, logic = ctx.config.snippet(&logic), error = %msg, "derivation did not parse");
                    report.failed += 1;
                    PropertyValue::Str(format!("{PARSE_ERROR_PREFIX}{msg}"))
                }
                DerivationOutcome::ExecutionError(msg) => {
                    warn!(%holder, logic = ctx.config.snippet(&logic), error = %msg, "derivation failed");
                    report.failed += 1;
                    PropertyValue::Str(format!("{EXEC_ERROR_PREFIX}{msg}"))
                }
            };
            ctx.store.set_property(holder, &feature, value.clone())?;
            ctx.store
                .index_remove(INDEX_PENDING_DERIVED, holder, Some(KEY_DERIVED), None)?;
            ctx.emit(
                ChangeOp::Add,
                ChangeCategory::Property,
                ChangeRecord::property_id(instance, &feature),
                Some(value),
                false,
            );
        }
        info!(
            derived = report.derived,
            failed = report.failed,
            skipped = report.skipped,
            "pending derivations processed"
        );
        Ok(report)
    })
}

fn affected_holders<S: GraphStore + ?Sized>(store: &S, change: &ChangeRecord) -> Vec<NodeId> {
    match change.category {
        ChangeCategory::Property | ChangeCategory::Reference => {
            let Some((node, property)) = change.identifier.split_once("::") else {
                return Vec::new();
            };
            let mut out = store.index_get(INDEX_DERIVED_ACCESS, node, &IndexKey::from(property));
            out.extend(store.index_get(INDEX_DERIVED_ACCESS, node, &IndexKey::from(ACCESS_ANY)));
            out
        }
        ChangeCategory::Instance => {
            store.index_query(INDEX_DERIVED_ACCESS, &change.identifier, &IndexQuery::Any)
        }
        ChangeCategory::Metamodel | ChangeCategory::Type | ChangeCategory::File => Vec::new(),
    }
}

/// Sends every holder whose recorded accesses intersect a non-transient change
/// back to pending. Returns the number of holders reset.
#[instrument(level = "debug", skip_all, fields(changes = changes.len()))]
pub fn mark_dirty<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    changes: &[ChangeRecord],
) -> Result<usize, IndexError> {
    ctx.in_tx(|ctx| {
        let dirty: BTreeSet<NodeId> = changes
            .iter()
            .filter(|c| !c.transient)
            .flat_map(|c| affected_holders(&*ctx.store, c))
            .collect();
        let mut reset = 0;
        for holder in dirty {
            if !ctx.store.contains_node(holder) {
                continue;
            }
            let Some((_, feature)) = owner_of(&*ctx.store, holder) else {
                continue;
            };
            let logic = string_prop(&*ctx.store, holder, DERIVED_PROP_LOGIC);
            mark_pending(&mut *ctx.store, holder, &feature, &logic)?;
            ctx.store
                .index_remove(INDEX_DERIVED_ACCESS, holder, None, None)?;
            reset += 1;
        }
        if reset > 0 {
            debug!(reset, "derived holders marked dirty");
        }
        Ok(reset)
    })
}

/// Reads back the declaration stored on a holder node.
pub fn holder_spec<S: GraphStore + ?Sized>(store: &S, holder: NodeId) -> Option<DerivedAttributeSpec> {
    let (_, name) = owner_of(store, holder)?;
    let flag = |key| store.property(holder, key).and_then(|v| v.as_bool()).unwrap_or(false);
    Some(DerivedAttributeSpec {
        many: flag(DERIVED_PROP_MANY),
        ordered: flag(DERIVED_PROP_ORDERED),
        unique: flag(DERIVED_PROP_UNIQUE),
        value_type: string_prop(store, holder, DERIVED_PROP_TYPE),
        language: string_prop(store, holder, DERIVED_PROP_LANGUAGE),
        logic: string_prop(store, holder, DERIVED_PROP_LOGIC),
        name,
    })
}
