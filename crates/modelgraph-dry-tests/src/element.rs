// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Map-backed model elements.

use std::collections::BTreeMap;

use modelgraph_core::{
    AttributeValue, ElementRef, FeatureValue, ModelElement, ReferenceValue, Scalar, TypeRef,
};

/// Model element whose features live in a map.
///
/// Built fluently; unset features are simply absent.
///
/// ```
/// use modelgraph_core::{ModelElement, Scalar, TypeRef};
/// use modelgraph_dry_tests::FixtureElement;
///
/// let c = FixtureElement::new(TypeRef::new("urn:s", "Circle"), "c1")
///     .root()
///     .attr("radius", Scalar::Real(2.0));
/// assert!(c.is_set("radius"));
/// assert!(!c.is_set("name"));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct FixtureElement {
    type_ref: TypeRef,
    identifier: String,
    root: bool,
    proxy: bool,
    features: BTreeMap<String, FeatureValue>,
}

impl FixtureElement {
    /// Element `identifier` of type `type_ref` with no features set.
    pub fn new(type_ref: TypeRef, identifier: impl Into<String>) -> Self {
        Self {
            type_ref,
            identifier: identifier.into(),
            root: false,
            proxy: false,
            features: BTreeMap::new(),
        }
    }

    /// Marks the element as a top-level element of its file.
    pub fn root(mut self) -> Self {
        self.root = true;
        self
    }

    /// Marks the element as an unresolved stand-in.
    pub fn proxy(mut self) -> Self {
        self.proxy = true;
        self
    }

    /// Sets a single-valued attribute.
    pub fn attr(mut self, name: &str, value: Scalar) -> Self {
        self.features.insert(
            name.to_owned(),
            FeatureValue::Attribute(AttributeValue::Single(value)),
        );
        self
    }

    /// Sets a string attribute.
    pub fn text(self, name: &str, value: &str) -> Self {
        self.attr(name, Scalar::Str(value.to_owned()))
    }

    /// Sets a multi-valued attribute.
    pub fn attrs(mut self, name: &str, values: Vec<Scalar>) -> Self {
        self.features.insert(
            name.to_owned(),
            FeatureValue::Attribute(AttributeValue::Many(values)),
        );
        self
    }

    /// Sets a plain reference. Targets use the `path#fragment` form; a bare
    /// fragment is local to the file.
    pub fn reference(self, name: &str, targets: &[&str]) -> Self {
        self.references(name, targets, false, false)
    }

    /// Sets a containment reference.
    pub fn contains(self, name: &str, targets: &[&str]) -> Self {
        self.references(name, targets, true, false)
    }

    /// Sets a container reference.
    pub fn container(self, name: &str, target: &str) -> Self {
        self.references(name, &[target], false, true)
    }

    fn references(mut self, name: &str, targets: &[&str], containment: bool, container: bool) -> Self {
        let targets = targets.iter().filter_map(|t| ElementRef::parse(t)).collect();
        self.features.insert(
            name.to_owned(),
            FeatureValue::References(ReferenceValue {
                targets,
                containment,
                container,
            }),
        );
        self
    }

    /// Clears a feature.
    pub fn unset(mut self, name: &str) -> Self {
        self.features.remove(name);
        self
    }

    /// Same element under another type.
    pub fn retyped(mut self, type_ref: TypeRef) -> Self {
        self.type_ref = type_ref;
        self
    }
}

impl ModelElement for FixtureElement {
    fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn is_proxy(&self) -> bool {
        self.proxy
    }

    fn is_root(&self) -> bool {
        self.root
    }

    fn is_set(&self, feature: &str) -> bool {
        self.features.contains_key(feature)
    }

    fn get(&self, feature: &str) -> Option<FeatureValue> {
        self.features.get(feature).cloned()
    }
}
