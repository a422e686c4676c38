// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Schema registration: packages, their types and feature descriptors.
//!
//! Registration runs in two phases. The first creates a node for every new
//! package of the batch, so packages of the same batch may refer to each other
//! in any order. The second adds the types of each package in its own
//! transaction. A type that refers to a package that is neither registered nor
//! part of the batch fails its package; that package (and everything that came
//! to depend on it) is removed again and reported, and the remaining packages
//! carry on. There is no implicit multi-pass resolution.
//!
//! Before a type is stored its supertype closure is completed across packages,
//! nearest first, and the features it inherits along that closure are merged
//! in. Supertypes are looked up in the batch, then in the schema snapshots of
//! packages registered earlier. Own features shadow inherited ones.
use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use tracing::{info, instrument, warn};

use crate::cascade::{delete_packages, DeletionReport};
use crate::change_log::{ChangeCategory, ChangeOp};
use crate::constants::{
    EDGE_DEPENDENCY, EDGE_EPACKAGE, INDEX_PACKAGES, KEY_ID, LABEL_PACKAGE, LABEL_TYPE, PROP_ID,
    PROP_KIND, PROP_SCHEMA, PROP_SUPERTYPES,
};
use crate::context::IndexContext;
use crate::descriptor::FeatureDescriptor;
use crate::error::{IndexError, SchemaError};
use crate::ident::NodeId;
use crate::record::Properties;
use crate::schema::{PackageDef, TypeDef, TypeRef};
use crate::store::{single_node, GraphStore};
use crate::value::PropertyValue;

/// Outcome of one registration batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistrationReport {
    /// Packages registered by this call.
    pub added: Vec<String>,
    /// Packages that were already registered (left untouched).
    pub skipped: Vec<String>,
    /// Packages rolled back, with the reason.
    pub failed: Vec<(String, SchemaError)>,
}

impl RegistrationReport {
    /// Returns `true` when nothing failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

fn validate_features(type_def: &TypeDef) -> Result<(), SchemaError> {
    let mut names = BTreeSet::new();
    let features = type_def
        .attributes
        .iter()
        .map(|a| a.name.as_str())
        .chain(type_def.references.iter().map(|r| r.name.as_str()));
    for name in features {
        if name.starts_with('_') {
            return Err(SchemaError::ReservedFeatureName {
                type_name: type_def.name.clone(),
                feature: name.to_owned(),
            });
        }
        if !names.insert(name) {
            return Err(SchemaError::DuplicateFeature {
                type_name: type_def.name.clone(),
                feature: name.to_owned(),
            });
        }
    }
    Ok(())
}

fn type_properties(type_def: &TypeDef) -> Properties {
    let mut props = Properties::new();
    props.insert(PROP_ID.to_owned(), type_def.name.clone().into());
    props.insert(
        PROP_SUPERTYPES.to_owned(),
        PropertyValue::StrArray(type_def.supertypes.iter().map(TypeRef::to_string).collect()),
    );
    for a in &type_def.attributes {
        props.insert(a.name.clone(), FeatureDescriptor::attribute(a).encode());
    }
    for r in &type_def.references {
        props.insert(r.name.clone(), FeatureDescriptor::reference(r).encode());
    }
    props
}

/// Type definitions visible to one registration batch.
struct SchemaView<'a, S: ?Sized> {
    store: &'a S,
    batch: &'a [&'a PackageDef],
    stored: FxHashMap<String, Option<PackageDef>>,
}

impl<'a, S: GraphStore + ?Sized> SchemaView<'a, S> {
    fn new(store: &'a S, batch: &'a [&'a PackageDef]) -> Self {
        Self {
            store,
            batch,
            stored: FxHashMap::default(),
        }
    }

    fn type_def(&mut self, type_ref: &TypeRef) -> Option<TypeDef> {
        let uri = &type_ref.package_uri;
        if let Some(package) = self.batch.iter().find(|p| &p.uri == uri) {
            return package.types.iter().find(|t| t.name == type_ref.name).cloned();
        }
        let store = self.store;
        let package = self.stored.entry(uri.clone()).or_insert_with(|| {
            let node = single_node(store, INDEX_PACKAGES, KEY_ID, uri)?;
            let schema = store.property(node, PROP_SCHEMA)?;
            PackageDef::from_snapshot(schema.as_str()?)
        });
        package
            .as_ref()?
            .types
            .iter()
            .find(|t| t.name == type_ref.name)
            .cloned()
    }

    fn resolve_type(&mut self, package_uri: &str, type_def: &TypeDef) -> TypeDef {
        let mut resolved = TypeDef {
            supertypes: Vec::new(),
            ..type_def.clone()
        };
        let mut seen = BTreeSet::from([TypeRef::new(package_uri, type_def.name.clone())]);
        let mut frontier = type_def.supertypes.clone();
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for sup in frontier {
                if !seen.insert(sup.clone()) {
                    continue;
                }
                if let Some(def) = self.type_def(&sup) {
                    next.extend(def.supertypes.iter().cloned());
                    inherit(&mut resolved, def);
                }
                resolved.supertypes.push(sup);
            }
            frontier = next;
        }
        resolved
    }

    fn resolve_package(&mut self, package: &PackageDef) -> PackageDef {
        PackageDef {
            uri: package.uri.clone(),
            name: package.name.clone(),
            kind: package.kind.clone(),
            types: package
                .types
                .iter()
                .map(|t| self.resolve_type(&package.uri, t))
                .collect(),
        }
    }
}

/// Appends the features of `supertype` that `target` does not declare.
fn inherit(target: &mut TypeDef, supertype: TypeDef) {
    let declared = |t: &TypeDef, name: &str| {
        t.attributes.iter().any(|a| a.name == name) || t.references.iter().any(|r| r.name == name)
    };
    for a in supertype.attributes {
        if !declared(target, &a.name) {
            target.attributes.push(a);
        }
    }
    for r in supertype.references {
        if !declared(target, &r.name) {
            target.references.push(r);
        }
    }
}

/// Adds a `dependency` edge from `package` to `dependency` unless one exists.
fn link_dependency<S: GraphStore + ?Sized>(
    store: &mut S,
    package: NodeId,
    dependency: NodeId,
) -> Result<bool, IndexError> {
    let exists = store
        .outgoing(package, Some(EDGE_DEPENDENCY))
        .iter()
        .any(|e| e.to == dependency);
    if exists {
        return Ok(false);
    }
    store.create_edge(package, dependency, EDGE_DEPENDENCY, Properties::new())?;
    Ok(true)
}

fn add_types<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    package: &PackageDef,
    package_node: NodeId,
) -> Result<usize, IndexError> {
    let mut dependencies = BTreeSet::new();
    for type_def in &package.types {
        for uri in type_def.external_packages(&package.uri) {
            let node = single_node(&*ctx.store, INDEX_PACKAGES, KEY_ID, uri).ok_or_else(|| {
                SchemaError::UnregisteredDependency {
                    package: package.uri.clone(),
                    dependency: uri.to_owned(),
                }
            })?;
            dependencies.insert(node);
        }
        validate_features(type_def)?;

        let type_node = ctx.store.create_node(LABEL_TYPE, type_properties(type_def))?;
        ctx.store
            .create_edge(type_node, package_node, EDGE_EPACKAGE, Properties::new())?;
        ctx.emit(
            ChangeOp::Add,
            ChangeCategory::Type,
            TypeRef::new(package.uri.clone(), type_def.name.clone()).to_string(),
            None,
            false,
        );
    }
    for dependency in dependencies {
        link_dependency(&mut *ctx.store, package_node, dependency)?;
    }
    let snapshot = package
        .snapshot()
        .map_err(|e| SchemaError::Snapshot(e.to_string()))?;
    ctx.store
        .set_property(package_node, PROP_SCHEMA, PropertyValue::Str(snapshot))?;
    Ok(package.types.len())
}

/// Registers every package of `packages` that is not registered yet.
///
/// Already registered packages are skipped with a warning; their stored schema
/// is not compared with the new definition. Schema errors roll back only the
/// failing package and its dependents and are reported in
/// [`RegistrationReport::failed`]; storage errors abort the call.
#[instrument(level = "info", skip_all, fields(packages = packages.len()))]
pub fn register_packages<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    packages: &[PackageDef],
) -> Result<RegistrationReport, IndexError> {
    let mut report = RegistrationReport::default();
    let fresh: Vec<(&PackageDef, NodeId)> = ctx.in_tx(|ctx| {
        let mut fresh: Vec<(&PackageDef, NodeId)> = Vec::new();
        for package in packages {
            let known = single_node(&*ctx.store, INDEX_PACKAGES, KEY_ID, &package.uri).is_some();
            if known || fresh.iter().any(|(p, _)| p.uri == package.uri) {
                warn!(package = %package.uri, "package already registered, skipping");
                report.skipped.push(package.uri.clone());
                continue;
            }
            let mut props = Properties::new();
            props.insert(PROP_ID.to_owned(), package.uri.clone().into());
            props.insert(PROP_KIND.to_owned(), package.kind.clone().into());
            let node = ctx.store.create_node(LABEL_PACKAGE, props)?;
            ctx.store.index_add(
                INDEX_PACKAGES,
                node,
                KEY_ID,
                &PropertyValue::Str(package.uri.clone()),
            )?;
            ctx.emit(
                ChangeOp::Add,
                ChangeCategory::Metamodel,
                package.uri.clone(),
                None,
                false,
            );
            fresh.push((package, node));
        }
        Ok(fresh)
    })?;

    let batch: Vec<&PackageDef> = fresh.iter().map(|(p, _)| *p).collect();
    for (package, node) in fresh {
        if !ctx.store.contains_node(node) {
            // Removed together with a failed package earlier in the batch.
            continue;
        }
        let resolved = SchemaView::new(&*ctx.store, &batch).resolve_package(package);
        match ctx.in_tx(|ctx| add_types(ctx, &resolved, node)) {
            Ok(types) => {
                info!(package = %package.uri, types, "package registered");
                report.added.push(package.uri.clone());
            }
            Err(err) => {
                warn!(package = %package.uri, error = %err, "package registration rolled back");
                let removed = delete_packages(ctx, std::slice::from_ref(&package.uri))?;
                reclassify_dependents(&mut report, &package.uri, &removed);
                match err {
                    IndexError::Schema(schema) => report.failed.push((package.uri.clone(), schema)),
                    other => return Err(other),
                }
            }
        }
    }
    Ok(report)
}

/// Reports packages that went down together with `failed`.
fn reclassify_dependents(report: &mut RegistrationReport, failed: &str, removed: &DeletionReport) {
    for uri in removed.packages.iter().filter(|u| u.as_str() != failed) {
        report.added.retain(|a| a != uri);
        report.failed.push((
            uri.clone(),
            SchemaError::DependencyRolledBack {
                package: uri.clone(),
                dependency: failed.to_owned(),
            },
        ));
    }
}

/// Removes packages and everything that depends on them.
#[instrument(level = "info", skip(ctx))]
pub fn unregister_packages<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    uris: &[String],
) -> Result<DeletionReport, IndexError> {
    delete_packages(ctx, uris)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::cache::{find_type_node, TypeCache};
    use crate::change_log::ChangeLog;
    use crate::config::IndexerConfig;
    use crate::descriptor::FeatureKind;
    use crate::memory::MemoryStore;
    use crate::schema::{AttributeDef, DataType, ReferenceDef};

    fn package(uri: &str, types: Vec<TypeDef>) -> PackageDef {
        PackageDef {
            uri: uri.into(),
            name: uri.rsplit('/').next().unwrap_or(uri).into(),
            kind: "ecore".into(),
            types,
        }
    }

    fn ty(name: &str, supertypes: &[TypeRef]) -> TypeDef {
        TypeDef {
            name: name.into(),
            supertypes: supertypes.to_vec(),
            attributes: vec![AttributeDef {
                name: "label".into(),
                data_type: DataType::builtin("EString"),
                many: false,
                ordered: true,
                unique: true,
            }],
            references: Vec::new(),
        }
    }

    fn with_ctx<T>(store: &mut MemoryStore, f: impl FnOnce(&mut IndexContext<'_, MemoryStore>) -> T) -> T {
        let (mut cache, mut log, config) = (TypeCache::new(), ChangeLog::new(), IndexerConfig::default());
        let mut ctx = IndexContext::new(store, &mut cache, &mut log, &config);
        f(&mut ctx)
    }

    #[test]
    fn types_and_descriptors_are_stored() {
        let mut store = MemoryStore::new();
        let mut node = ty("Node", &[]);
        node.references.push(ReferenceDef {
            name: "next".into(),
            target: TypeRef::new("urn:g", "Node"),
            many: false,
            ordered: true,
            unique: true,
            containment: false,
            container: false,
        });
        let report = with_ctx(&mut store, |ctx| {
            register_packages(ctx, &[package("urn:g", vec![node])]).unwrap()
        });
        assert_eq!(report.added, vec!["urn:g".to_owned()]);
        let t = find_type_node(&store, &TypeRef::new("urn:g", "Node")).unwrap();
        let next = store.property(t, "next").unwrap();
        assert_eq!(
            FeatureDescriptor::decode("next", &next).unwrap().kind(),
            FeatureKind::Reference
        );
        let p = single_node(&store, INDEX_PACKAGES, KEY_ID, "urn:g").unwrap();
        let schema = store.property(p, PROP_SCHEMA).unwrap();
        assert_eq!(
            PackageDef::from_snapshot(schema.as_str().unwrap()).unwrap().uri,
            "urn:g"
        );
    }

    #[test]
    fn re_registration_is_a_no_op() {
        let mut store = MemoryStore::new();
        let p = package("urn:a", vec![ty("A", &[])]);
        with_ctx(&mut store, |ctx| register_packages(ctx, &[p.clone()]).unwrap());
        let nodes = store.node_count();
        let report = with_ctx(&mut store, |ctx| register_packages(ctx, &[p]).unwrap());
        assert_eq!(report.skipped, vec!["urn:a".to_owned()]);
        assert!(report.added.is_empty());
        assert_eq!(store.node_count(), nodes);
    }

    #[test]
    fn missing_dependency_fails_only_that_package() {
        let mut store = MemoryStore::new();
        let orphan = package("urn:b", vec![ty("B", &[TypeRef::new("urn:missing", "X")])]);
        let fine = package("urn:c", vec![ty("C", &[])]);
        let report = with_ctx(&mut store, |ctx| register_packages(ctx, &[orphan, fine]).unwrap());
        assert_eq!(report.added, vec!["urn:c".to_owned()]);
        assert!(matches!(
            &report.failed[..],
            [(uri, SchemaError::UnregisteredDependency { dependency, .. })]
                if uri == "urn:b" && dependency == "urn:missing"
        ));
        assert!(single_node(&store, INDEX_PACKAGES, KEY_ID, "urn:b").is_none());
        assert_eq!(store.nodes_with_label(LABEL_TYPE).len(), 1);
    }

    #[test]
    fn batch_members_may_refer_forward_and_dependencies_are_deduplicated() {
        let mut store = MemoryStore::new();
        let base = TypeRef::new("urn:base", "Base");
        let derived = package(
            "urn:derived",
            vec![ty("D1", &[base.clone()]), ty("D2", &[base])],
        );
        let report = with_ctx(&mut store, |ctx| {
            register_packages(ctx, &[derived, package("urn:base", vec![ty("Base", &[])])]).unwrap()
        });
        assert!(report.is_complete());
        let d = single_node(&store, INDEX_PACKAGES, KEY_ID, "urn:derived").unwrap();
        assert_eq!(store.outgoing(d, Some(EDGE_DEPENDENCY)).len(), 1);
    }

    fn single(name: &str, supertypes: &[TypeRef], attribute: &str) -> TypeDef {
        let mut t = ty(name, supertypes);
        t.attributes[0].name = attribute.into();
        t
    }

    fn stored_supertypes(store: &MemoryStore, t: &TypeRef) -> Vec<String> {
        let node = find_type_node(store, t).unwrap();
        let value = store.property(node, PROP_SUPERTYPES).unwrap();
        value.as_str_array().unwrap().to_vec()
    }

    #[test]
    fn closures_and_inherited_features_cross_package_boundaries() {
        let mut store = MemoryStore::new();
        let base = package("urn:base", vec![single("Root", &[], "name")]);
        with_ctx(&mut store, |ctx| register_packages(ctx, &[base]).unwrap());
        // The middle package arrives after the top one in the same batch.
        let top = package(
            "urn:top",
            vec![single("Leaf", &[TypeRef::new("urn:mid", "Mid")], "depth")],
        );
        let mid = package(
            "urn:mid",
            vec![single("Mid", &[TypeRef::new("urn:base", "Root")], "width")],
        );
        let report = with_ctx(&mut store, |ctx| register_packages(ctx, &[top, mid]).unwrap());
        assert!(report.is_complete());

        let leaf = TypeRef::new("urn:top", "Leaf");
        assert_eq!(
            stored_supertypes(&store, &leaf),
            vec!["urn:mid#Mid".to_owned(), "urn:base#Root".to_owned()]
        );
        let node = find_type_node(&store, &leaf).unwrap();
        for feature in ["depth", "width", "name"] {
            assert!(store.property(node, feature).is_some(), "{feature}");
        }
        let top = single_node(&store, INDEX_PACKAGES, KEY_ID, "urn:top").unwrap();
        assert_eq!(store.outgoing(top, Some(EDGE_DEPENDENCY)).len(), 2);
        let snapshot = store.property(top, PROP_SCHEMA).unwrap();
        let stored = PackageDef::from_snapshot(snapshot.as_str().unwrap()).unwrap();
        assert_eq!(stored.types[0].supertypes.len(), 2);
    }

    #[test]
    fn own_features_shadow_inherited_ones() {
        let mut store = MemoryStore::new();
        let mut root = single("Root", &[], "label");
        root.attributes[0].many = true;
        let child = single("Child", &[TypeRef::new("urn:s", "Root")], "label");
        with_ctx(&mut store, |ctx| {
            register_packages(ctx, &[package("urn:s", vec![root, child])]).unwrap()
        });
        let node = find_type_node(&store, &TypeRef::new("urn:s", "Child")).unwrap();
        let label = store.property(node, "label").unwrap();
        assert!(!FeatureDescriptor::decode("label", &label).unwrap().many);
    }

    #[test]
    fn dependents_in_the_batch_go_down_with_a_failed_package() {
        let mut store = MemoryStore::new();
        let user = package("urn:user", vec![ty("U", &[TypeRef::new("urn:lib", "L")])]);
        let mut broken = ty("L", &[]);
        broken.attributes[0].name = "_reserved".into();
        let lib = package("urn:lib", vec![broken]);
        let report = with_ctx(&mut store, |ctx| register_packages(ctx, &[user, lib]).unwrap());
        assert!(report.added.is_empty());
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed.iter().any(|(uri, e)| uri == "urn:user"
            && matches!(e, SchemaError::DependencyRolledBack { .. })));
        assert!(report.failed.iter().any(|(uri, e)| uri == "urn:lib"
            && matches!(e, SchemaError::ReservedFeatureName { .. })));
        assert_eq!(store.node_count(), 0);
    }
}
