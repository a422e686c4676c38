// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error types for schema registration, element encoding and indexing passes.
use thiserror::Error;

use crate::store::StoreError;

/// A feature descriptor property is not a well-formed descriptor tuple.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// The stored value is not a string array.
    #[error("descriptor for `{feature}` is not a string array")]
    NotAnArray {
        /// Feature name.
        feature: String,
    },
    /// The array has the wrong number of entries for its kind.
    #[error("descriptor for `{feature}` has {len} entries, expected {expected}")]
    WrongLength {
        /// Feature name.
        feature: String,
        /// Entries found.
        len: usize,
        /// Entries required by the kind tag.
        expected: usize,
    },
    /// The kind tag is not one of `a`, `r`, `d`.
    #[error("descriptor for `{feature}` has unknown kind `{tag}`")]
    UnknownKind {
        /// Feature name.
        feature: String,
        /// Tag found.
        tag: String,
    },
    /// A boolean slot is neither `t` nor `f`.
    #[error("descriptor for `{feature}` has malformed flag `{flag}`")]
    BadFlag {
        /// Feature name.
        feature: String,
        /// Flag found.
        flag: String,
    },
}

/// Failures of schema registration and schema mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A supertype or feature type lives in a package that is not registered.
    #[error("package `{package}` depends on `{dependency}`, which must be registered first")]
    UnregisteredDependency {
        /// Package being registered.
        package: String,
        /// Namespace URI that is missing.
        dependency: String,
    },
    /// The package was registered in the same batch but removed again because
    /// a package it depends on failed.
    #[error("package `{package}` was rolled back with its failed dependency `{dependency}`")]
    DependencyRolledBack {
        /// Package that was removed.
        package: String,
        /// Package whose failure caused the removal.
        dependency: String,
    },
    /// Feature names starting with `_` are reserved for bookkeeping properties.
    #[error("feature `{feature}` of `{type_name}` uses the reserved `_` prefix")]
    ReservedFeatureName {
        /// Owning type.
        type_name: String,
        /// Offending name.
        feature: String,
    },
    /// Two features of one type share a name.
    #[error("type `{type_name}` declares feature `{feature}` more than once")]
    DuplicateFeature {
        /// Owning type.
        type_name: String,
        /// Repeated name.
        feature: String,
    },
    /// No package with this namespace URI is registered.
    #[error("unknown package `{0}`")]
    UnknownPackage(String),
    /// The package has no type with this name.
    #[error("unknown type `{type_name}` in package `{package}`")]
    UnknownType {
        /// Namespace URI.
        package: String,
        /// Type name.
        type_name: String,
    },
    /// The type has no feature with this name.
    #[error("type `{type_name}` has no feature `{feature}`")]
    UnknownFeature {
        /// Type name.
        type_name: String,
        /// Feature name.
        feature: String,
    },
    /// The feature is not a derived attribute.
    #[error("feature `{feature}` of `{type_name}` is not derived")]
    NotDerived {
        /// Type name.
        type_name: String,
        /// Feature name.
        feature: String,
    },
    /// Only attributes can be indexed.
    #[error("feature `{feature}` of `{type_name}` is not an attribute")]
    NotAnAttribute {
        /// Type name.
        type_name: String,
        /// Feature name.
        feature: String,
    },
    /// A stored descriptor could not be decoded.
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    /// The schema snapshot could not be serialized.
    #[error("schema snapshot encoding failed: {0}")]
    Snapshot(String),
}

/// Per-element failure; the element is skipped and the pass continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ElementError {
    /// The element's type is not registered.
    #[error("element `{element}` has unregistered type `{type_ref}`")]
    UnregisteredType {
        /// Element identifier.
        element: String,
        /// `uri#Name` of the missing type.
        type_ref: String,
    },
    /// A multi-valued attribute mixes value kinds.
    #[error("attribute `{feature}` of `{element}` is not homogeneous")]
    NonHomogeneousArray {
        /// Element identifier.
        element: String,
        /// Feature name.
        feature: String,
    },
    /// A value cannot be stored with the descriptor's declared type.
    #[error("attribute `{feature}` of `{element}`: {reason}")]
    ValueShape {
        /// Element identifier.
        element: String,
        /// Feature name.
        feature: String,
        /// Human readable cause.
        reason: String,
    },
    /// Two elements of one file share an identifier.
    #[error("duplicate element identifier `{0}`")]
    DuplicateIdentifier(String),
    /// A reference target URI is malformed and cannot even become a proxy.
    #[error("reference `{feature}` of `{element}` has invalid target `{target}`")]
    InvalidReference {
        /// Element identifier.
        element: String,
        /// Feature name.
        feature: String,
        /// Offending target.
        target: String,
    },
}

/// Classification of failures used by callers to decide on retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A package references an unregistered package.
    SchemaOrdering,
    /// A reference could not be resolved.
    UnresolvedReference,
    /// An element could not be encoded.
    ElementEncoding,
    /// A whole file pass failed and was rolled back.
    FileFailure,
    /// A schema mutation conflicts with existing schema state.
    SchemaMutationConflict,
    /// A package deletion failed.
    CascadeFailure,
    /// The storage backend failed.
    Storage,
}

impl ErrorKind {
    /// Returns `true` if the surrounding file or package pass must roll back.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        !matches!(
            self,
            Self::UnresolvedReference | Self::ElementEncoding | Self::SchemaMutationConflict
        )
    }
}

/// Top-level error of every indexing operation.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Schema failure.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// Element failure.
    #[error(transparent)]
    Element(#[from] ElementError),
    /// Descriptor decoding failure.
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    /// The file is already present; use an incremental update instead.
    #[error("file `{0}` is already indexed")]
    FileAlreadyIndexed(String),
    /// The file is not present.
    #[error("file `{0}` is not indexed")]
    FileNotIndexed(String),
    /// A file pass failed and every change made for it was rolled back.
    #[error("indexing `{file}` failed and was rolled back: {source}")]
    FileFailed {
        /// File key.
        file: String,
        /// Cause.
        source: Box<IndexError>,
    },
    /// A package deletion failed; packages in `completed` stay deleted.
    #[error("deleting package `{package}` failed: {source}")]
    CascadeFailed {
        /// Package whose pass was rolled back.
        package: String,
        /// Packages deleted before the failure.
        completed: Vec<String>,
        /// Cause.
        source: Box<IndexError>,
    },
}

impl IndexError {
    /// Classifies the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(_) => ErrorKind::Storage,
            Self::Schema(
                SchemaError::UnregisteredDependency { .. } | SchemaError::DependencyRolledBack { .. },
            ) => ErrorKind::SchemaOrdering,
            Self::Schema(_) | Self::Descriptor(_) => ErrorKind::SchemaMutationConflict,
            Self::Element(ElementError::InvalidReference { .. }) => ErrorKind::UnresolvedReference,
            Self::Element(_) => ErrorKind::ElementEncoding,
            Self::FileAlreadyIndexed(_) | Self::FileNotIndexed(_) | Self::FileFailed { .. } => {
                ErrorKind::FileFailure
            }
            Self::CascadeFailed { .. } => ErrorKind::CascadeFailure,
        }
    }

    /// Shorthand for `self.kind().is_fatal()`.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }
}
