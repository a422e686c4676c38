// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Property values stored on graph nodes and edges.
//!
//! The storage contract only knows typed scalars and homogeneous arrays of
//! them. Anything richer (enums, dates, custom data types) is flattened to its
//! string form before it reaches the store.
use std::cmp::Ordering;
use std::fmt;

/// Scalar element type of a stored property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// Boolean values.
    Bool,
    /// 64-bit signed integers.
    Int,
    /// 64-bit floating point values.
    Real,
    /// UTF-8 strings; the fallback for every non-primitive data type.
    Str,
}

impl ScalarKind {
    /// Maps a declared data-type name (instance type name) to its storage kind.
    ///
    /// Recognises the usual spellings of modelling frameworks (`EInt`,
    /// `java.lang.Integer`, `double`, ...). Unknown names map to [`ScalarKind::Str`].
    #[must_use]
    pub fn from_type_name(name: &str) -> Self {
        let bare = name.rsplit('.').next().unwrap_or(name);
        match bare.trim_start_matches('E').to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Self::Bool,
            "int" | "integer" | "long" | "short" | "byte" | "biginteger" => Self::Int,
            "double" | "float" | "real" | "bigdecimal" => Self::Real,
            _ => Self::Str,
        }
    }

    /// Canonical type name written into feature descriptors.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Bool => "boolean",
            Self::Int => "integer",
            Self::Real => "real",
            Self::Str => "string",
        }
    }
}

/// A single typed value as produced by a model element.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Real value.
    Real(f64),
    /// String value (also used for enum literals and custom data types).
    Str(String),
}

impl Scalar {
    /// Storage kind of this value.
    #[must_use]
    pub const fn kind(&self) -> ScalarKind {
        match self {
            Self::Bool(_) => ScalarKind::Bool,
            Self::Int(_) => ScalarKind::Int,
            Self::Real(_) => ScalarKind::Real,
            Self::Str(_) => ScalarKind::Str,
        }
    }

    /// Equality that treats reals bitwise, so `NaN == NaN` for set semantics.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Real(a), Self::Real(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
        }
    }
}

/// Value stored under a property key: a scalar or a homogeneous array.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Real scalar.
    Real(f64),
    /// String scalar.
    Str(String),
    /// Homogeneous boolean array.
    BoolArray(Vec<bool>),
    /// Homogeneous integer array.
    IntArray(Vec<i64>),
    /// Homogeneous real array.
    RealArray(Vec<f64>),
    /// Homogeneous string array.
    StrArray(Vec<String>),
}

impl PropertyValue {
    /// Wraps a single scalar.
    #[must_use]
    pub fn scalar(value: Scalar) -> Self {
        match value {
            Scalar::Bool(v) => Self::Bool(v),
            Scalar::Int(v) => Self::Int(v),
            Scalar::Real(v) => Self::Real(v),
            Scalar::Str(v) => Self::Str(v),
        }
    }

    /// Builds a homogeneous array of `kind` from already-converted scalars.
    ///
    /// Returns `None` if any element is not of `kind`.
    #[must_use]
    pub fn array(kind: ScalarKind, values: Vec<Scalar>) -> Option<Self> {
        let out = match kind {
            ScalarKind::Bool => Self::BoolArray(
                values
                    .into_iter()
                    .map(|v| match v {
                        Scalar::Bool(b) => Some(b),
                        _ => None,
                    })
                    .collect::<Option<_>>()?,
            ),
            ScalarKind::Int => Self::IntArray(
                values
                    .into_iter()
                    .map(|v| match v {
                        Scalar::Int(i) => Some(i),
                        _ => None,
                    })
                    .collect::<Option<_>>()?,
            ),
            ScalarKind::Real => Self::RealArray(
                values
                    .into_iter()
                    .map(|v| match v {
                        Scalar::Real(r) => Some(r),
                        _ => None,
                    })
                    .collect::<Option<_>>()?,
            ),
            ScalarKind::Str => Self::StrArray(
                values
                    .into_iter()
                    .map(|v| match v {
                        Scalar::Str(s) => Some(s),
                        _ => None,
                    })
                    .collect::<Option<_>>()?,
            ),
        };
        Some(out)
    }

    /// Returns `true` for the array variants.
    #[must_use]
    pub const fn is_array(&self) -> bool {
        matches!(
            self,
            Self::BoolArray(_) | Self::IntArray(_) | Self::RealArray(_) | Self::StrArray(_)
        )
    }

    /// Borrows a string scalar.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrows a string array.
    #[must_use]
    pub fn as_str_array(&self) -> Option<&[String]> {
        match self {
            Self::StrArray(v) => Some(v),
            _ => None,
        }
    }

    /// Returns an integer scalar.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a boolean scalar.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Flattens the value into its scalar elements (one for scalars).
    #[must_use]
    pub fn scalars(&self) -> Vec<Scalar> {
        match self {
            Self::Bool(v) => vec![Scalar::Bool(*v)],
            Self::Int(v) => vec![Scalar::Int(*v)],
            Self::Real(v) => vec![Scalar::Real(*v)],
            Self::Str(v) => vec![Scalar::Str(v.clone())],
            Self::BoolArray(v) => v.iter().copied().map(Scalar::Bool).collect(),
            Self::IntArray(v) => v.iter().copied().map(Scalar::Int).collect(),
            Self::RealArray(v) => v.iter().copied().map(Scalar::Real).collect(),
            Self::StrArray(v) => v.iter().cloned().map(Scalar::Str).collect(),
        }
    }

    /// Index keys for this value: one per scalar element.
    #[must_use]
    pub fn index_keys(&self) -> Vec<IndexKey> {
        self.scalars().into_iter().map(IndexKey::from).collect()
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_array() {
            f.write_str("[")?;
            for (i, s) in self.scalars().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{s}")?;
            }
            f.write_str("]")
        } else {
            match self.scalars().first() {
                Some(s) => write!(f, "{s}"),
                None => Ok(()),
            }
        }
    }
}

/// Totally ordered real used as an index key.
#[derive(Clone, Copy, Debug)]
pub struct OrderedReal(pub f64);

impl PartialEq for OrderedReal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderedReal {}

impl PartialOrd for OrderedReal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedReal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Orderable key stored in a named index.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum IndexKey {
    /// Boolean key.
    Bool(bool),
    /// Integer key (supports range queries).
    Int(i64),
    /// Real key (supports range queries).
    Real(OrderedReal),
    /// String key.
    Str(String),
}

impl From<Scalar> for IndexKey {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Bool(v) => Self::Bool(v),
            Scalar::Int(v) => Self::Int(v),
            Scalar::Real(v) => Self::Real(OrderedReal(v)),
            Scalar::Str(v) => Self::Str(v),
        }
    }
}

impl From<&str> for IndexKey {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_map_to_storage_kinds() {
        assert_eq!(ScalarKind::from_type_name("EInt"), ScalarKind::Int);
        assert_eq!(ScalarKind::from_type_name("java.lang.Double"), ScalarKind::Real);
        assert_eq!(ScalarKind::from_type_name("EBoolean"), ScalarKind::Bool);
        assert_eq!(ScalarKind::from_type_name("real"), ScalarKind::Real);
        assert_eq!(ScalarKind::from_type_name("EString"), ScalarKind::Str);
        assert_eq!(ScalarKind::from_type_name("Colour"), ScalarKind::Str);
    }

    #[test]
    fn arrays_reject_mixed_kinds() {
        let mixed = vec![Scalar::Int(1), Scalar::Str("x".into())];
        assert!(PropertyValue::array(ScalarKind::Int, mixed).is_none());
        let ok = PropertyValue::array(ScalarKind::Int, vec![Scalar::Int(1), Scalar::Int(2)]);
        assert_eq!(ok, Some(PropertyValue::IntArray(vec![1, 2])));
    }

    #[test]
    fn real_keys_are_totally_ordered() {
        let mut keys = vec![
            IndexKey::Real(OrderedReal(2.5)),
            IndexKey::Real(OrderedReal(-1.0)),
            IndexKey::Real(OrderedReal(0.0)),
        ];
        keys.sort();
        assert_eq!(keys[0], IndexKey::Real(OrderedReal(-1.0)));
        assert_eq!(keys[2], IndexKey::Real(OrderedReal(2.5)));
    }
}
