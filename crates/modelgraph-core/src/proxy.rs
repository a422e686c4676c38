// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pending references to elements that are not in the graph yet.
//!
//! A proxy lives on the source instance node as the string-array property
//! `_proxyRef:<target file key>`, holding `(fragment, feature, flag)` triples
//! flattened one after the other. The node is also indexed in the `proxies`
//! index under the target file key, so inserting that file can enumerate
//! exactly the nodes waiting for it.
use rustc_hash::FxHashMap;
use tracing::{debug, instrument, warn};

use crate::change_log::{ChangeCategory, ChangeOp, ChangeRecord};
use crate::constants::{
    EDGE_PROP_CONTAINER, EDGE_PROP_CONTAINMENT, INDEX_PROXIES, KEY_PROXY, PROP_PROXY_PREFIX,
};
use crate::context::IndexContext;
use crate::error::IndexError;
use crate::ident::NodeId;
use crate::record::{EdgeRecord, Properties};
use crate::store::{GraphStore, IndexQuery, StoreError};
use crate::value::{IndexKey, PropertyValue};

/// Where a pending reference points.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProxyTarget {
    /// `repository + separator + path` of the target file.
    pub file_key: String,
    /// In-file fragment of the target element.
    pub fragment: String,
}

/// Edge flags carried by a reference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ReferenceFlags {
    /// The reference owns its target.
    pub containment: bool,
    /// The reference points at its container.
    pub container: bool,
}

impl ReferenceFlags {
    /// Flags of an existing reference edge.
    #[must_use]
    pub fn of_edge(edge: &EdgeRecord) -> Self {
        Self {
            containment: edge.has_flag(EDGE_PROP_CONTAINMENT),
            container: edge.has_flag(EDGE_PROP_CONTAINER),
        }
    }

    /// Edge properties for these flags.
    #[must_use]
    pub fn edge_properties(self) -> Properties {
        let mut props = Properties::new();
        if self.containment {
            props.insert(EDGE_PROP_CONTAINMENT.to_owned(), PropertyValue::Bool(true));
        }
        if self.container {
            props.insert(EDGE_PROP_CONTAINER.to_owned(), PropertyValue::Bool(true));
        }
        props
    }

    const fn tag(self) -> &'static str {
        if self.containment {
            "c"
        } else if self.container {
            "p"
        } else {
            ""
        }
    }

    fn from_tag(tag: &str) -> Self {
        Self {
            containment: tag == "c",
            container: tag == "p",
        }
    }
}

/// One proxy entry left unresolved by [`resolve_pending`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnresolvedProxy {
    /// Node holding the reference.
    pub source: NodeId,
    /// Missing fragment.
    pub fragment: String,
    /// Reference feature.
    pub feature: String,
}

/// Outcome of resolving the proxies of one file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProxyResolution {
    /// Entries turned into edges (or found already present).
    pub resolved: usize,
    /// Entries whose target is still missing.
    pub unresolved: Vec<UnresolvedProxy>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Entry {
    fragment: String,
    feature: String,
    flags: ReferenceFlags,
}

fn property_key(file_key: &str) -> String {
    format!("{PROP_PROXY_PREFIX}{file_key}")
}

fn read_entries<S: GraphStore + ?Sized>(store: &S, node: NodeId, key: &str) -> Vec<Entry> {
    let Some(value) = store.property(node, key) else {
        return Vec::new();
    };
    value
        .as_str_array()
        .unwrap_or_default()
        .chunks_exact(3)
        .map(|c| Entry {
            fragment: c[0].clone(),
            feature: c[1].clone(),
            flags: ReferenceFlags::from_tag(&c[2]),
        })
        .collect()
}

fn encode_entries(entries: &[Entry]) -> PropertyValue {
    PropertyValue::StrArray(
        entries
            .iter()
            .flat_map(|e| [e.fragment.clone(), e.feature.clone(), e.flags.tag().to_owned()])
            .collect(),
    )
}

/// Records a pending reference from `source` to `target`.
///
/// Returns `false` if the same entry was already pending.
pub fn record_proxy<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    source: NodeId,
    target: &ProxyTarget,
    feature: &str,
    flags: ReferenceFlags,
) -> Result<bool, StoreError> {
    let key = property_key(&target.file_key);
    let mut entries = read_entries(&*ctx.store, source, &key);
    let entry = Entry {
        fragment: target.fragment.clone(),
        feature: feature.to_owned(),
        flags,
    };
    if entries.contains(&entry) {
        return Ok(false);
    }
    entries.push(entry);
    ctx.store.set_property(source, &key, encode_entries(&entries))?;
    ctx.store.index_add(
        INDEX_PROXIES,
        source,
        KEY_PROXY,
        &PropertyValue::Str(target.file_key.clone()),
    )?;
    debug!(%source, file = %target.file_key, fragment = %target.fragment, feature, "proxy recorded");
    Ok(true)
}

/// Resolves every proxy pointing into `file_key`.
///
/// `contents` maps fragments of the target file to their nodes. Edges that
/// already exist are not duplicated; entries whose fragment is missing stay
/// pending and are reported.
#[instrument(level = "debug", skip(ctx, contents), fields(targets = contents.len()))]
pub fn resolve_pending<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    file_key: &str,
    contents: &FxHashMap<String, NodeId>,
    transient: bool,
) -> Result<ProxyResolution, IndexError> {
    let key = property_key(file_key);
    let sources = ctx
        .store
        .index_get(INDEX_PROXIES, KEY_PROXY, &IndexKey::from(file_key));
    let mut report = ProxyResolution::default();
    for source in sources {
        let mut remaining = Vec::new();
        for entry in read_entries(&*ctx.store, source, &key) {
            let Some(&target) = contents.get(&entry.fragment) else {
                report.unresolved.push(UnresolvedProxy {
                    source,
                    fragment: entry.fragment.clone(),
                    feature: entry.feature.clone(),
                });
                remaining.push(entry);
                continue;
            };
            let exists = ctx
                .store
                .outgoing(source, Some(&entry.feature))
                .iter()
                .any(|e| e.to == target);
            if !exists {
                ctx.store.create_edge(
                    source,
                    target,
                    &entry.feature,
                    entry.flags.edge_properties(),
                )?;
                ctx.emit(
                    ChangeOp::Add,
                    ChangeCategory::Reference,
                    ChangeRecord::property_id(source, &entry.feature),
                    Some(PropertyValue::Str(target.to_string())),
                    transient,
                );
            }
            report.resolved += 1;
        }
        if remaining.is_empty() {
            ctx.store.remove_property(source, &key)?;
            ctx.store.index_remove(
                INDEX_PROXIES,
                source,
                Some(KEY_PROXY),
                Some(&IndexKey::from(file_key)),
            )?;
        } else {
            ctx.store.set_property(source, &key, encode_entries(&remaining))?;
        }
    }
    if !report.unresolved.is_empty() {
        warn!(
            file = file_key,
            resolved = report.resolved,
            unresolved = report.unresolved.len(),
            "proxies left unresolved"
        );
    }
    Ok(report)
}

/// Drops every pending proxy held by `node`, returning how many entries went.
pub fn clear_proxies<S: GraphStore + ?Sized>(
    ctx: &mut IndexContext<'_, S>,
    node: NodeId,
) -> Result<usize, StoreError> {
    let mut dropped = 0;
    for key in ctx.store.property_keys(node) {
        if key.starts_with(PROP_PROXY_PREFIX) {
            dropped += read_entries(&*ctx.store, node, &key).len();
            ctx.store.remove_property(node, &key)?;
        }
    }
    ctx.store
        .index_remove(INDEX_PROXIES, node, Some(KEY_PROXY), None)?;
    Ok(dropped)
}

/// Number of proxy entries still pending anywhere in the graph.
pub fn unresolved_count<S: GraphStore + ?Sized>(store: &S) -> usize {
    store
        .index_query(INDEX_PROXIES, KEY_PROXY, &IndexQuery::Any)
        .into_iter()
        .map(|node| {
            store
                .property_keys(node)
                .iter()
                .filter(|k| k.starts_with(PROP_PROXY_PREFIX))
                .map(|k| read_entries(store, node, k).len())
                .sum::<usize>()
        })
        .sum()
}

/// Target file keys for which `node` holds pending proxies.
pub fn pending_files<S: GraphStore + ?Sized>(store: &S, node: NodeId) -> Vec<String> {
    store
        .property_keys(node)
        .into_iter()
        .filter_map(|k| k.strip_prefix(PROP_PROXY_PREFIX).map(str::to_owned))
        .collect()
}
