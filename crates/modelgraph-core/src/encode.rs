// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Attribute encoding and element content hashing.
//!
//! Shared by the batch and incremental inserters so both paths store exactly
//! the same values for the same element.
use std::cmp::Ordering;

use crate::cache::TypeInfo;
use crate::descriptor::{FeatureDescriptor, FeatureKind};
use crate::error::ElementError;
use crate::ident::{ContentHasher, Hash};
use crate::model::{AttributeValue, ElementRef, FeatureValue, ModelElement};
use crate::value::{IndexKey, PropertyValue, Scalar, ScalarKind};

const TAG_TYPE: u8 = 1;
const TAG_IDENTIFIER: u8 = 2;
const TAG_ATTRIBUTE: u8 = 3;
const TAG_REFERENCE: u8 = 4;
const TAG_TARGET: u8 = 5;
const TAG_VALUE: u8 = 0x10;

fn value_error(element: &str, feature: &str, reason: impl Into<String>) -> ElementError {
    ElementError::ValueShape {
        element: element.to_owned(),
        feature: feature.to_owned(),
        reason: reason.into(),
    }
}

/// Converts one value to the storage kind of the descriptor.
///
/// Anything can become a string; integers widen to reals; nothing else converts.
#[allow(clippy::cast_precision_loss)]
fn coerce(kind: ScalarKind, value: Scalar) -> Result<Scalar, Scalar> {
    match (kind, value) {
        (k, v) if v.kind() == k => Ok(v),
        (ScalarKind::Str, v) => Ok(Scalar::Str(v.to_string())),
        (ScalarKind::Real, Scalar::Int(i)) => Ok(Scalar::Real(i as f64)),
        (_, v) => Err(v),
    }
}

fn key_order(a: &Scalar, b: &Scalar) -> Ordering {
    IndexKey::from(a.clone()).cmp(&IndexKey::from(b.clone()))
}

/// Encodes one attribute value according to its descriptor.
///
/// Multi-valued attributes follow the descriptor's collection semantics before
/// being flattened into a homogeneous array:
///
/// | ordered | unique | collection  | stored order          |
/// |---------|--------|-------------|-----------------------|
/// | yes     | yes    | ordered set | first occurrence      |
/// | yes     | no     | list        | as given              |
/// | no      | yes    | set         | sorted, deduplicated  |
/// | no      | no     | bag         | sorted                |
pub fn encode_attribute(
    element: &str,
    feature: &str,
    descriptor: &FeatureDescriptor,
    value: AttributeValue,
) -> Result<PropertyValue, ElementError> {
    let kind = descriptor.scalar_kind();
    let convert = |v: Scalar| {
        coerce(kind, v).map_err(|bad| {
            value_error(
                element,
                feature,
                format!("expected {} value, found `{bad}`", kind.type_name()),
            )
        })
    };
    let values = match (descriptor.many, value) {
        (false, AttributeValue::Single(v)) => return Ok(PropertyValue::scalar(convert(v)?)),
        (false, AttributeValue::Many(mut vs)) => {
            if vs.len() != 1 {
                return Err(value_error(
                    element,
                    feature,
                    format!("{} values for a single-valued attribute", vs.len()),
                ));
            }
            return Ok(PropertyValue::scalar(convert(vs.remove(0))?));
        }
        (true, AttributeValue::Single(v)) => vec![v],
        (true, AttributeValue::Many(vs)) => vs,
    };
    let mut converted = values
        .into_iter()
        .map(convert)
        .collect::<Result<Vec<_>, _>>()?;
    match (descriptor.ordered, descriptor.unique) {
        (true, true) => {
            let mut seen: Vec<Scalar> = Vec::with_capacity(converted.len());
            for v in converted {
                if !seen.iter().any(|s| s.same_as(&v)) {
                    seen.push(v);
                }
            }
            converted = seen;
        }
        (true, false) => {}
        (false, unique) => {
            converted.sort_by(key_order);
            if unique {
                converted.dedup_by(|a, b| a.same_as(b));
            }
        }
    }
    PropertyValue::array(kind, converted).ok_or_else(|| ElementError::NonHomogeneousArray {
        element: element.to_owned(),
        feature: feature.to_owned(),
    })
}

/// Encodes every set attribute of `element`, in feature-name order.
pub fn encode_attributes<E: ModelElement + ?Sized>(
    element: &E,
    info: &TypeInfo,
) -> Result<Vec<(String, PropertyValue)>, ElementError> {
    let mut out = Vec::new();
    for (name, descriptor) in &info.descriptors {
        if descriptor.kind() != FeatureKind::Attribute || !element.is_set(name) {
            continue;
        }
        match element.get(name) {
            Some(FeatureValue::Attribute(v)) => {
                out.push((
                    name.clone(),
                    encode_attribute(element.identifier(), name, descriptor, v)?,
                ));
            }
            Some(FeatureValue::References(_)) => {
                return Err(value_error(
                    element.identifier(),
                    name,
                    "reference value for an attribute",
                ))
            }
            None => {}
        }
    }
    Ok(out)
}

fn hash_scalar(h: &mut ContentHasher, v: &Scalar) {
    let tag = match v.kind() {
        ScalarKind::Bool => 0,
        ScalarKind::Int => 1,
        ScalarKind::Real => 2,
        ScalarKind::Str => 3,
    };
    match v {
        Scalar::Real(r) => h.bytes(TAG_VALUE + tag, &r.to_bits().to_le_bytes()),
        other => h.field(TAG_VALUE + tag, &other.to_string()),
    };
}

fn hash_target(h: &mut ContentHasher, target: &ElementRef) {
    match target {
        ElementRef::Local(f) => h.field(TAG_TARGET, f),
        ElementRef::External { path, fragment } => h.field(TAG_TARGET, path).field(TAG_TARGET, fragment),
    };
}

/// Content hash of an element: type, identifier, attribute values and
/// reference targets of every described feature, in feature-name order.
///
/// Used by incremental updates to tell unchanged elements apart.
pub fn content_hash<E: ModelElement + ?Sized>(element: &E, info: &TypeInfo) -> Hash {
    let mut h = ContentHasher::new();
    h.field(TAG_TYPE, &info.type_ref.to_string())
        .field(TAG_IDENTIFIER, element.identifier());
    for (name, descriptor) in &info.descriptors {
        if descriptor.kind() == FeatureKind::Derived || !element.is_set(name) {
            continue;
        }
        match element.get(name) {
            Some(FeatureValue::Attribute(v)) => {
                h.field(TAG_ATTRIBUTE, name);
                match &v {
                    AttributeValue::Single(s) => hash_scalar(&mut h, s),
                    AttributeValue::Many(vs) => vs.iter().for_each(|s| hash_scalar(&mut h, s)),
                }
            }
            Some(FeatureValue::References(r)) => {
                h.field(TAG_REFERENCE, name);
                r.targets.iter().for_each(|t| hash_target(&mut h, t));
            }
            None => {}
        }
    }
    h.finish()
}
