// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Schema definitions handed to the registrar.
//!
//! These mirror what a reflective modelling framework exposes about a package:
//! its namespace URI, its types, and for each type its structural features and
//! supertypes. Direct supertypes are enough; registration completes the
//! closure and the inherited features across packages.
use std::fmt;

use serde::{Deserialize, Serialize};

/// Fully qualified reference to a type: namespace URI plus type name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeRef {
    /// Namespace URI of the owning package.
    pub package_uri: String,
    /// Type name, unique within the package.
    pub name: String,
}

impl TypeRef {
    /// Builds a reference.
    #[must_use]
    pub fn new(package_uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package_uri: package_uri.into(),
            name: name.into(),
        }
    }

    /// Parses the `uri#Name` form produced by [`fmt::Display`].
    #[must_use]
    pub fn parse(qualified: &str) -> Option<Self> {
        let (uri, name) = qualified.rsplit_once('#')?;
        if uri.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(uri, name))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.package_uri, self.name)
    }
}

/// Value type of an attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataType {
    /// Instance type name (`EDouble`, `java.lang.String`, `Colour`, ...).
    pub name: String,
    /// Package declaring the data type, when it is not a built-in.
    pub package_uri: Option<String>,
}

impl DataType {
    /// Built-in data type.
    #[must_use]
    pub fn builtin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package_uri: None,
        }
    }
}

/// Attribute declared on a type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    /// Feature name.
    pub name: String,
    /// Declared value type.
    pub data_type: DataType,
    /// Upper bound greater than one.
    pub many: bool,
    /// Values keep their order.
    pub ordered: bool,
    /// Values are distinct.
    pub unique: bool,
}

/// Reference declared on a type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDef {
    /// Feature name.
    pub name: String,
    /// Declared target type.
    pub target: TypeRef,
    /// Upper bound greater than one.
    pub many: bool,
    /// Targets keep their order.
    pub ordered: bool,
    /// Targets are distinct.
    pub unique: bool,
    /// The reference owns its targets.
    pub containment: bool,
    /// The reference is the opposite of a containment.
    pub container: bool,
}

/// Type declared in a package.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    /// Type name.
    pub name: String,
    /// Supertypes, nearest first. Stored schemas hold the full closure.
    pub supertypes: Vec<TypeRef>,
    /// Attributes. Stored schemas include inherited ones.
    pub attributes: Vec<AttributeDef>,
    /// References. Stored schemas include inherited ones.
    pub references: Vec<ReferenceDef>,
}

impl TypeDef {
    /// Namespace URIs this type needs registered before it can be stored.
    pub fn external_packages<'a>(&'a self, own_uri: &'a str) -> impl Iterator<Item = &'a str> {
        let supers = self.supertypes.iter().map(|t| t.package_uri.as_str());
        let targets = self.references.iter().map(|r| r.target.package_uri.as_str());
        let data = self
            .attributes
            .iter()
            .filter_map(|a| a.data_type.package_uri.as_deref());
        supers
            .chain(targets)
            .chain(data)
            .filter(move |uri| *uri != own_uri)
    }
}

/// Namespace grouping related types (a metamodel).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDef {
    /// Globally unique namespace URI.
    pub uri: String,
    /// Human readable name.
    pub name: String,
    /// Store-specific kind tag (`ecore`, `xsd`, ...).
    pub kind: String,
    /// Declared types.
    pub types: Vec<TypeDef>,
}

impl PackageDef {
    /// CBOR snapshot of the package, hex-encoded for storage as a string property.
    pub fn snapshot(&self) -> Result<String, ciborium::ser::Error<std::io::Error>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)?;
        Ok(hex::encode(buf))
    }

    /// Decodes a snapshot written by [`PackageDef::snapshot`].
    #[must_use]
    pub fn from_snapshot(hex_snapshot: &str) -> Option<Self> {
        let bytes = hex::decode(hex_snapshot).ok()?;
        ciborium::de::from_reader(bytes.as_slice()).ok()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn type_refs_parse_their_display_form() {
        let t = TypeRef::new("http://example.org/shapes", "Circle");
        assert_eq!(TypeRef::parse(&t.to_string()), Some(t));
        assert_eq!(TypeRef::parse("NoHash"), None);
        assert_eq!(TypeRef::parse("#Circle"), None);
    }

    #[test]
    fn snapshot_survives_storage_as_hex() {
        let pkg = PackageDef {
            uri: "urn:shapes".into(),
            name: "shapes".into(),
            kind: "ecore".into(),
            types: vec![TypeDef {
                name: "Circle".into(),
                supertypes: vec![TypeRef::new("urn:base", "Shape")],
                attributes: vec![AttributeDef {
                    name: "radius".into(),
                    data_type: DataType::builtin("EDouble"),
                    many: false,
                    ordered: true,
                    unique: true,
                }],
                references: Vec::new(),
            }],
        };
        let snap = pkg.snapshot().unwrap();
        assert_eq!(PackageDef::from_snapshot(&snap), Some(pkg.clone()));
        let deps: Vec<_> = pkg.types[0].external_packages(&pkg.uri).collect();
        assert_eq!(deps, vec!["urn:base"]);
    }
}
