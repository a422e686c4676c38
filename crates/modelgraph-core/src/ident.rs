// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identifier and hashing utilities.
use blake3::Hasher;

/// Canonical 256-bit digest used for element content hashes.
pub type Hash = [u8; 32];

/// Opaque handle for a node, assigned by the backing store.
///
/// Handles are only meaningful for the store that issued them. Tooling must
/// not assume they are dense, stable across stores, or reversible into any
/// model identifier; the model identifier lives in the node's `_id` property.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Returns the raw handle value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Opaque handle for a directed edge, assigned by the backing store.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct EdgeId(pub u64);

impl EdgeId {
    /// Returns the raw handle value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Thin wrapper around a transaction identifier.
///
/// # Invariants
/// - Zero (`TxId(0)`) is reserved as invalid; stores never issue it.
/// - The underlying `u64` may wrap; stores resume at `1` when it does.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct TxId(u64);

impl TxId {
    /// Constructs a `TxId` from a raw `u64` value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for TxId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Incremental, domain-separated BLAKE3 hasher for element contents.
///
/// Every field is length-prefixed so that adjacent strings cannot alias
/// (`"ab" + "c"` vs `"a" + "bc"`).
pub struct ContentHasher {
    inner: Hasher,
}

impl ContentHasher {
    /// Starts a new hash under the `element:` domain.
    #[must_use]
    pub fn new() -> Self {
        let mut inner = Hasher::new();
        inner.update(b"element:");
        Self { inner }
    }

    /// Mixes a tag byte followed by a length-prefixed string.
    pub fn field(&mut self, tag: u8, value: &str) -> &mut Self {
        self.inner.update(&[tag]);
        self.inner.update(&(value.len() as u64).to_le_bytes());
        self.inner.update(value.as_bytes());
        self
    }

    /// Mixes raw bytes under a tag.
    pub fn bytes(&mut self, tag: u8, value: &[u8]) -> &mut Self {
        self.inner.update(&[tag]);
        self.inner.update(&(value.len() as u64).to_le_bytes());
        self.inner.update(value);
        self
    }

    /// Finalizes the digest.
    #[must_use]
    pub fn finish(&self) -> Hash {
        self.inner.finalize().into()
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hex form of a digest as stored in instance nodes.
#[must_use]
pub fn hash_hex(hash: &Hash) -> String {
    hex::encode(hash)
}
