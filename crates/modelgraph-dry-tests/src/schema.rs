// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Package and type builders, plus the sample `shapes` metamodel.
//!
//! [`PackageBuilder::build`] fills in what a reflective framework would report
//! within one package: the supertype closure over local types and the features
//! inherited from them. Supertypes in other packages are left as declared; the
//! registrar completes them.

use std::collections::BTreeSet;

use modelgraph_core::{AttributeDef, DataType, PackageDef, ReferenceDef, TypeDef, TypeRef};

/// Namespace URI of the sample metamodel.
pub const SHAPES_URI: &str = "http://example.org/shapes";

/// Reference to a type of the sample metamodel.
pub fn shapes(name: &str) -> TypeRef {
    TypeRef::new(SHAPES_URI, name)
}

/// Builder for one type.
#[derive(Clone, Debug)]
pub struct TypeBuilder {
    name: String,
    supertypes: Vec<TypeRef>,
    attributes: Vec<AttributeDef>,
    references: Vec<ReferenceDef>,
}

impl TypeBuilder {
    /// Type `name` with no features.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supertypes: Vec::new(),
            attributes: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Adds a direct supertype.
    pub fn extends(mut self, supertype: TypeRef) -> Self {
        self.supertypes.push(supertype);
        self
    }

    /// Adds a single-valued attribute of data type `data_type`.
    pub fn attribute(mut self, name: &str, data_type: &str) -> Self {
        self.attributes.push(AttributeDef {
            name: name.to_owned(),
            data_type: DataType::builtin(data_type),
            many: false,
            ordered: true,
            unique: true,
        });
        self
    }

    /// Adds an ordered, non-unique multi-valued attribute.
    pub fn many_attribute(mut self, name: &str, data_type: &str) -> Self {
        self.attributes.push(AttributeDef {
            name: name.to_owned(),
            data_type: DataType::builtin(data_type),
            many: true,
            ordered: true,
            unique: false,
        });
        self
    }

    /// Adds an attribute whose data type is declared by another package.
    pub fn custom_attribute(mut self, name: &str, data_type: &str, package_uri: &str) -> Self {
        self.attributes.push(AttributeDef {
            name: name.to_owned(),
            data_type: DataType {
                name: data_type.to_owned(),
                package_uri: Some(package_uri.to_owned()),
            },
            many: false,
            ordered: true,
            unique: true,
        });
        self
    }

    /// Adds a plain reference.
    pub fn reference(self, name: &str, target: TypeRef, many: bool) -> Self {
        self.push_reference(name, target, many, false)
    }

    /// Adds a containment reference.
    pub fn containment(self, name: &str, target: TypeRef, many: bool) -> Self {
        self.push_reference(name, target, many, true)
    }

    fn push_reference(mut self, name: &str, target: TypeRef, many: bool, containment: bool) -> Self {
        self.references.push(ReferenceDef {
            name: name.to_owned(),
            target,
            many,
            ordered: true,
            unique: true,
            containment,
            container: false,
        });
        self
    }
}

/// Builder for one package.
#[derive(Clone, Debug)]
pub struct PackageBuilder {
    uri: String,
    name: String,
    kind: String,
    types: Vec<TypeBuilder>,
}

impl PackageBuilder {
    /// Package `uri`, named after its last path segment, of kind `ecore`.
    pub fn new(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let name = uri
            .rsplit(['/', ':'])
            .find(|s| !s.is_empty())
            .unwrap_or("package")
            .to_owned();
        Self {
            uri,
            name,
            kind: "ecore".to_owned(),
            types: Vec::new(),
        }
    }

    /// Overrides the kind tag.
    pub fn kind(mut self, kind: &str) -> Self {
        self.kind = kind.to_owned();
        self
    }

    /// Adds a type.
    pub fn with(mut self, ty: TypeBuilder) -> Self {
        self.types.push(ty);
        self
    }

    fn local(&self, type_ref: &TypeRef) -> Option<&TypeBuilder> {
        if type_ref.package_uri != self.uri {
            return None;
        }
        self.types.iter().find(|t| t.name == type_ref.name)
    }

    /// Supertype closure of `ty`, nearest first.
    fn closure(&self, ty: &TypeBuilder) -> Vec<TypeRef> {
        let mut out: Vec<TypeRef> = Vec::new();
        let mut seen = BTreeSet::new();
        let mut frontier: Vec<TypeRef> = ty.supertypes.clone();
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for sup in frontier {
                if sup.package_uri == self.uri && sup.name == ty.name {
                    continue;
                }
                if !seen.insert(sup.clone()) {
                    continue;
                }
                if let Some(local) = self.local(&sup) {
                    next.extend(local.supertypes.iter().cloned());
                }
                out.push(sup);
            }
            frontier = next;
        }
        out
    }

    /// Resolves closures and inherited features into a [`PackageDef`].
    pub fn build(self) -> PackageDef {
        let types = self
            .types
            .iter()
            .map(|ty| {
                let supertypes = self.closure(ty);
                let mut attributes = ty.attributes.clone();
                let mut references = ty.references.clone();
                for sup in supertypes.iter().filter_map(|s| self.local(s)) {
                    for a in &sup.attributes {
                        if !attributes.iter().any(|x| x.name == a.name) {
                            attributes.push(a.clone());
                        }
                    }
                    for r in &sup.references {
                        if !references.iter().any(|x| x.name == r.name) {
                            references.push(r.clone());
                        }
                    }
                }
                TypeDef {
                    name: ty.name.clone(),
                    supertypes,
                    attributes,
                    references,
                }
            })
            .collect();
        PackageDef {
            uri: self.uri,
            name: self.name,
            kind: self.kind,
            types,
        }
    }
}

/// Sample metamodel.
///
/// - `Shape { name: EString }`
/// - `Circle extends Shape { radius: EDouble }`
/// - `Square extends Shape { side: EDouble }`
/// - `Group extends Shape { tags: EString[*], children: Shape[*] (containment) }`
/// - `Link extends Shape { target: Shape, others: Shape[*] }`
pub fn shapes_package() -> PackageDef {
    PackageBuilder::new(SHAPES_URI)
        .with(TypeBuilder::new("Shape").attribute("name", "EString"))
        .with(
            TypeBuilder::new("Circle")
                .extends(shapes("Shape"))
                .attribute("radius", "EDouble"),
        )
        .with(
            TypeBuilder::new("Square")
                .extends(shapes("Shape"))
                .attribute("side", "EDouble"),
        )
        .with(
            TypeBuilder::new("Group")
                .extends(shapes("Shape"))
                .many_attribute("tags", "EString")
                .containment("children", shapes("Shape"), true),
        )
        .with(
            TypeBuilder::new("Link")
                .extends(shapes("Shape"))
                .reference("target", shapes("Shape"), false)
                .reference("others", shapes("Shape"), true),
        )
        .build()
}
