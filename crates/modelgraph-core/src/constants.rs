// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Labels, property keys and index names shared by every component.
//!
//! Reserved property keys start with `_` so they can never collide with a
//! feature name (the registrar rejects features named with a leading `_`).

/// Node label of a registered package.
pub const LABEL_PACKAGE: &str = "package";
/// Node label of a declared type.
pub const LABEL_TYPE: &str = "type";
/// Node label of an indexed model element.
pub const LABEL_INSTANCE: &str = "instance";
/// Node label of an originating file.
pub const LABEL_FILE: &str = "file";
/// Node label of a per-instance derived-feature holder.
pub const LABEL_DERIVED: &str = "derived";

/// Type → owning package.
pub const EDGE_EPACKAGE: &str = "epackage";
/// Package → package it depends on.
pub const EDGE_DEPENDENCY: &str = "dependency";
/// Instance → declared type.
pub const EDGE_TYPE_OF: &str = "typeOf";
/// Instance → every supertype of its declared type.
pub const EDGE_KIND_OF: &str = "kindOf";
/// Instance → originating file.
pub const EDGE_FILE: &str = "file";

/// Model identifier of a node (namespace URI, type name, element fragment, file path).
pub const PROP_ID: &str = "_id";
/// Hex content hash of an instance.
pub const PROP_HASH: &str = "_hash";
/// Store-specific kind tag of a package (e.g. `ecore`).
pub const PROP_KIND: &str = "_kind";
/// Serialized schema snapshot of a package.
pub const PROP_SCHEMA: &str = "_schema";
/// Repository URL of a file node.
pub const PROP_REPOSITORY: &str = "_repository";
/// Revision of a file node.
pub const PROP_REVISION: &str = "_revision";
/// Supertype closure of a type node, as `uri#Name` strings.
pub const PROP_SUPERTYPES: &str = "_supertypes";
/// Prefix of the per-target-file proxy property on an instance node.
pub const PROP_PROXY_PREFIX: &str = "_proxyRef:";

/// Reference edge flag: the reference is a containment.
pub const EDGE_PROP_CONTAINMENT: &str = "isContainment";
/// Reference edge flag: the reference is the opposite of a containment.
pub const EDGE_PROP_CONTAINER: &str = "isContainer";
/// Instance → derived holder edge flag.
pub const EDGE_PROP_DERIVED: &str = "isDerived";

/// Derived holder: multiplicity flag.
pub const DERIVED_PROP_MANY: &str = "_isMany";
/// Derived holder: ordering flag.
pub const DERIVED_PROP_ORDERED: &str = "_isOrdered";
/// Derived holder: uniqueness flag.
pub const DERIVED_PROP_UNIQUE: &str = "_isUnique";
/// Derived holder: declared value type.
pub const DERIVED_PROP_TYPE: &str = "_attributeType";
/// Derived holder: derivation language.
pub const DERIVED_PROP_LANGUAGE: &str = "_derivationLanguage";
/// Derived holder: derivation logic.
pub const DERIVED_PROP_LOGIC: &str = "_derivationLogic";

/// Marker prefixed to a derived value that still has to be computed.
pub const NOT_YET_DERIVED: &str = "_NYD##";
/// Sentinel prefix stored when the derivation script does not parse.
pub const PARSE_ERROR_PREFIX: &str = "_PARSE_ERROR##";
/// Sentinel prefix stored when the derivation script fails at runtime.
pub const EXEC_ERROR_PREFIX: &str = "_EXEC_ERROR##";

/// Package index (key [`KEY_ID`] → namespace URI).
pub const INDEX_PACKAGES: &str = "packages";
/// File index (key [`KEY_ID`] → `repository + separator + path`).
pub const INDEX_FILES: &str = "files";
/// Pending proxies (key [`KEY_PROXY`] → full target file key).
pub const INDEX_PROXIES: &str = "proxies";
/// Derived holders awaiting computation (key [`KEY_DERIVED`]).
pub const INDEX_PENDING_DERIVED: &str = "derived-pending";
/// Derivation accesses (key = accessed node, value = property or [`ACCESS_ANY`]).
pub const INDEX_DERIVED_ACCESS: &str = "derived-access";
/// Root elements (key [`KEY_ROOT_FILE`] → file node handle).
pub const INDEX_ROOTS: &str = "roots";

/// Identifier key used by the package and file indices.
pub const KEY_ID: &str = "id";
/// Key used by the proxy index.
pub const KEY_PROXY: &str = "_proxyRef";
/// Key used by the pending-derivation index.
pub const KEY_DERIVED: &str = "derived";
/// Value stored under [`KEY_DERIVED`].
pub const PENDING_MARK: &str = "_";
/// Key used by the roots index.
pub const KEY_ROOT_FILE: &str = "file";
/// Access-index value meaning "any property of the node".
pub const ACCESS_ANY: &str = "*";

/// Separator between package URI, type name and attribute in attribute-index names.
pub const ATTRIBUTE_INDEX_SEPARATOR: &str = "##";

/// Name of the value index kept for an indexed attribute.
#[must_use]
pub fn attribute_index_name(package_uri: &str, type_name: &str, attribute: &str) -> String {
    format!(
        "{package_uri}{ATTRIBUTE_INDEX_SEPARATOR}{type_name}{ATTRIBUTE_INDEX_SEPARATOR}{attribute}"
    )
}

/// Prefix shared by every attribute index of a package.
#[must_use]
pub fn attribute_index_prefix(package_uri: &str) -> String {
    format!("{package_uri}{ATTRIBUTE_INDEX_SEPARATOR}")
}
