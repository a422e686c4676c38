// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Feature descriptors stored on type nodes.
//!
//! A descriptor is a fixed-shape string array kept under the feature's name on
//! the owning type node:
//!
//! ```text
//! attribute / reference: [kind, many, ordered, unique, target, indexed]
//! derived:               [kind, many, ordered, unique, target, language, logic]
//! ```
//!
//! `kind` is `a`, `r` or `d`; flags are `t` or `f`. The descriptor is always
//! written with a single property write, so it is either absent or complete.
use std::collections::BTreeMap;

use crate::error::DescriptorError;
use crate::schema::{AttributeDef, ReferenceDef};
use crate::value::{PropertyValue, ScalarKind};

/// Kind of a described feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    /// Stored attribute.
    Attribute,
    /// Reference to other elements.
    Reference,
    /// Attribute computed by a derivation script.
    Derived,
}

impl FeatureKind {
    const fn tag(self) -> &'static str {
        match self {
            Self::Attribute => "a",
            Self::Reference => "r",
            Self::Derived => "d",
        }
    }
}

/// Kind-specific trailing slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DescriptorTail {
    /// Attributes and references: whether a value index is maintained.
    Indexed(bool),
    /// Derived attributes: how the value is computed.
    Derivation {
        /// Script language understood by the derivation engine.
        language: String,
        /// Script source.
        logic: String,
    },
}

/// Decoded feature descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureDescriptor {
    kind: FeatureKind,
    /// Multi-valued.
    pub many: bool,
    /// Values keep their order.
    pub ordered: bool,
    /// Values are distinct.
    pub unique: bool,
    /// Attribute data type name or reference target type name.
    pub target_type: String,
    tail: DescriptorTail,
}

/// Descriptors of one type, keyed by feature name.
pub type Descriptors = BTreeMap<String, FeatureDescriptor>;

fn flag(b: bool) -> String {
    if b { "t" } else { "f" }.to_owned()
}

impl FeatureDescriptor {
    /// Descriptor of a stored attribute (not indexed).
    #[must_use]
    pub fn attribute(def: &AttributeDef) -> Self {
        Self {
            kind: FeatureKind::Attribute,
            many: def.many,
            ordered: def.ordered,
            unique: def.unique,
            target_type: def.data_type.name.clone(),
            tail: DescriptorTail::Indexed(false),
        }
    }

    /// Descriptor of a reference.
    #[must_use]
    pub fn reference(def: &ReferenceDef) -> Self {
        Self {
            kind: FeatureKind::Reference,
            many: def.many,
            ordered: def.ordered,
            unique: def.unique,
            target_type: def.target.name.clone(),
            tail: DescriptorTail::Indexed(false),
        }
    }

    /// Descriptor of a derived attribute.
    #[must_use]
    pub fn derived(
        many: bool,
        ordered: bool,
        unique: bool,
        value_type: impl Into<String>,
        language: impl Into<String>,
        logic: impl Into<String>,
    ) -> Self {
        Self {
            kind: FeatureKind::Derived,
            many,
            ordered,
            unique,
            target_type: value_type.into(),
            tail: DescriptorTail::Derivation {
                language: language.into(),
                logic: logic.into(),
            },
        }
    }

    /// Feature kind.
    #[must_use]
    pub const fn kind(&self) -> FeatureKind {
        self.kind
    }

    /// Kind-specific slots.
    #[must_use]
    pub const fn tail(&self) -> &DescriptorTail {
        &self.tail
    }

    /// `true` for indexed attributes.
    #[must_use]
    pub const fn is_indexed(&self) -> bool {
        matches!(self.tail, DescriptorTail::Indexed(true))
    }

    /// Same descriptor with the indexed flag set to `indexed`.
    ///
    /// Derived descriptors have no indexed slot and are returned unchanged.
    #[must_use]
    pub fn with_indexed(&self, indexed: bool) -> Self {
        let mut out = self.clone();
        if matches!(out.tail, DescriptorTail::Indexed(_)) {
            out.tail = DescriptorTail::Indexed(indexed);
        }
        out
    }

    /// `(language, logic)` of a derived attribute.
    #[must_use]
    pub fn derivation(&self) -> Option<(&str, &str)> {
        match &self.tail {
            DescriptorTail::Derivation { language, logic } => Some((language, logic)),
            DescriptorTail::Indexed(_) => None,
        }
    }

    /// Storage kind of attribute values.
    #[must_use]
    pub fn scalar_kind(&self) -> ScalarKind {
        ScalarKind::from_type_name(&self.target_type)
    }

    /// Encodes the descriptor as its stored string array.
    #[must_use]
    pub fn encode(&self) -> PropertyValue {
        let mut out = vec![
            self.kind.tag().to_owned(),
            flag(self.many),
            flag(self.ordered),
            flag(self.unique),
            self.target_type.clone(),
        ];
        match &self.tail {
            DescriptorTail::Indexed(b) => out.push(flag(*b)),
            DescriptorTail::Derivation { language, logic } => {
                out.push(language.clone());
                out.push(logic.clone());
            }
        }
        PropertyValue::StrArray(out)
    }

    /// Decodes a stored descriptor of `feature`.
    pub fn decode(feature: &str, value: &PropertyValue) -> Result<Self, DescriptorError> {
        let parts = value.as_str_array().ok_or_else(|| DescriptorError::NotAnArray {
            feature: feature.to_owned(),
        })?;
        let tag = parts.first().map_or("", String::as_str);
        let (kind, expected) = match tag {
            "a" => (FeatureKind::Attribute, 6),
            "r" => (FeatureKind::Reference, 6),
            "d" => (FeatureKind::Derived, 7),
            other => {
                return Err(DescriptorError::UnknownKind {
                    feature: feature.to_owned(),
                    tag: other.to_owned(),
                })
            }
        };
        if parts.len() != expected {
            return Err(DescriptorError::WrongLength {
                feature: feature.to_owned(),
                len: parts.len(),
                expected,
            });
        }
        let parse = |s: &str| match s {
            "t" => Ok(true),
            "f" => Ok(false),
            other => Err(DescriptorError::BadFlag {
                feature: feature.to_owned(),
                flag: other.to_owned(),
            }),
        };
        let tail = if kind == FeatureKind::Derived {
            DescriptorTail::Derivation {
                language: parts[5].clone(),
                logic: parts[6].clone(),
            }
        } else {
            DescriptorTail::Indexed(parse(&parts[5])?)
        };
        Ok(Self {
            kind,
            many: parse(&parts[1])?,
            ordered: parse(&parts[2])?,
            unique: parse(&parts[3])?,
            target_type: parts[4].clone(),
            tail,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::schema::DataType;

    #[test]
    fn attribute_descriptor_has_six_slots() {
        let d = FeatureDescriptor::attribute(&AttributeDef {
            name: "radius".into(),
            data_type: DataType::builtin("EDouble"),
            many: false,
            ordered: true,
            unique: true,
        });
        let stored = d.encode();
        assert_eq!(
            stored,
            PropertyValue::StrArray(
                ["a", "f", "t", "t", "EDouble", "f"].map(String::from).to_vec()
            )
        );
        assert_eq!(FeatureDescriptor::decode("radius", &stored).unwrap(), d);
        assert_eq!(d.scalar_kind(), ScalarKind::Real);
        assert!(d.with_indexed(true).is_indexed());
    }

    #[test]
    fn derived_descriptor_keeps_its_script() {
        let d = FeatureDescriptor::derived(true, false, false, "int", "EOL", "self.x.size()");
        let back = FeatureDescriptor::decode("sizes", &d.encode()).unwrap();
        assert_eq!(back.derivation(), Some(("EOL", "self.x.size()")));
        assert_eq!(back.kind(), FeatureKind::Derived);
        assert_eq!(back.with_indexed(true), back);
    }

    #[test]
    fn malformed_descriptors_are_rejected() {
        let short = PropertyValue::StrArray(vec!["a".into(), "t".into()]);
        assert!(matches!(
            FeatureDescriptor::decode("x", &short),
            Err(DescriptorError::WrongLength { expected: 6, .. })
        ));
        let bad = PropertyValue::StrArray(["a", "y", "t", "t", "EInt", "f"].map(String::from).to_vec());
        assert!(matches!(
            FeatureDescriptor::decode("x", &bad),
            Err(DescriptorError::BadFlag { .. })
        ));
        assert!(matches!(
            FeatureDescriptor::decode("x", &PropertyValue::Int(1)),
            Err(DescriptorError::NotAnArray { .. })
        ));
        let kind = PropertyValue::StrArray(vec!["m".into()]);
        assert!(matches!(
            FeatureDescriptor::decode("x", &kind),
            Err(DescriptorError::UnknownKind { .. })
        ));
    }
}
