// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Reflective element capability consumed by the inserters.
//!
//! The engine never depends on a modelling framework. Front-ends wrap their
//! objects in [`ModelElement`]; the engine asks for values feature by feature,
//! driven by the descriptors stored on the type node.
use crate::schema::TypeRef;
use crate::value::Scalar;

/// Value of an attribute as reported by the element.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    /// Single-valued attribute.
    Single(Scalar),
    /// Multi-valued attribute, in the element's own order.
    Many(Vec<Scalar>),
}

/// Target of a reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementRef {
    /// Element of the same file, by fragment.
    Local(String),
    /// Element of another file in the same repository.
    External {
        /// Repository-relative path of the target file.
        path: String,
        /// In-file fragment.
        fragment: String,
    },
}

impl ElementRef {
    /// Splits a `path#fragment` URI; `#fragment` and a bare fragment are local.
    ///
    /// Returns `None` for an empty fragment.
    #[must_use]
    pub fn parse(uri: &str) -> Option<Self> {
        let (path, fragment) = match uri.split_once('#') {
            Some((p, f)) => (p, f),
            None => ("", uri),
        };
        if fragment.is_empty() {
            return None;
        }
        if path.is_empty() {
            Some(Self::Local(fragment.to_owned()))
        } else {
            Some(Self::External {
                path: path.to_owned(),
                fragment: fragment.to_owned(),
            })
        }
    }

    /// In-file fragment of the target.
    #[must_use]
    pub fn fragment(&self) -> &str {
        match self {
            Self::Local(f) | Self::External { fragment: f, .. } => f,
        }
    }
}

/// Reference value as reported by the element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceValue {
    /// Targets in the element's own order.
    pub targets: Vec<ElementRef>,
    /// The reference owns its targets.
    pub containment: bool,
    /// The reference points at its container.
    pub container: bool,
}

/// Value of a set feature.
#[derive(Clone, Debug, PartialEq)]
pub enum FeatureValue {
    /// Attribute values.
    Attribute(AttributeValue),
    /// Reference targets.
    References(ReferenceValue),
}

/// Reflective view over one model element.
pub trait ModelElement {
    /// Declared type.
    fn type_ref(&self) -> &TypeRef;

    /// Identifier unique within the element's file (its fragment).
    fn identifier(&self) -> &str;

    /// `true` for unresolved stand-ins of elements that live elsewhere.
    fn is_proxy(&self) -> bool {
        false
    }

    /// `true` for top-level elements of their file.
    fn is_root(&self) -> bool {
        false
    }

    /// `true` if the feature has a value.
    fn is_set(&self, feature: &str) -> bool;

    /// Value of a set feature.
    fn get(&self, feature: &str) -> Option<FeatureValue>;
}

impl<T: ModelElement + ?Sized> ModelElement for &T {
    fn type_ref(&self) -> &TypeRef {
        (**self).type_ref()
    }

    fn identifier(&self) -> &str {
        (**self).identifier()
    }

    fn is_proxy(&self) -> bool {
        (**self).is_proxy()
    }

    fn is_root(&self) -> bool {
        (**self).is_root()
    }

    fn is_set(&self, feature: &str) -> bool {
        (**self).is_set(feature)
    }

    fn get(&self, feature: &str) -> Option<FeatureValue> {
        (**self).get(feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uris_split_into_path_and_fragment() {
        assert_eq!(ElementRef::parse("b"), Some(ElementRef::Local("b".into())));
        assert_eq!(ElementRef::parse("#b"), Some(ElementRef::Local("b".into())));
        assert_eq!(
            ElementRef::parse("models/f2.xmi#//b"),
            Some(ElementRef::External {
                path: "models/f2.xmi".into(),
                fragment: "//b".into()
            })
        );
        assert_eq!(ElementRef::parse("f2.xmi#"), None);
        assert_eq!(ElementRef::parse(""), None);
    }
}
