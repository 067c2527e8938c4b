// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Reference storage with bidirectional adjacency.
use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::ident::NodeId;
use crate::record::{ReferenceId, ReferenceKey, ReferenceRecord};

/// One node's sorted outgoing and incoming reference triples.
#[cfg(test)]
pub(crate) type AdjacencyRow = (NodeId, Vec<ReferenceKey>, Vec<ReferenceKey>);

/// Arena of references keyed by [`ReferenceId`] plus adjacency indices.
///
/// Each reference is stored once in its forward direction. `outgoing` buckets
/// by source and `incoming` buckets by target, so neighbour lookup is O(1)
/// expected from either endpoint. Buckets preserve insertion order; empty
/// buckets are removed so that add-then-remove restores the indices exactly.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReferenceGraph {
    /// Materialised references.
    refs: BTreeMap<ReferenceId, ReferenceRecord>,
    /// Forward adjacency: source node to reference ids.
    outgoing: FxHashMap<NodeId, Vec<ReferenceId>>,
    /// Inverse adjacency: target node to reference ids.
    incoming: FxHashMap<NodeId, Vec<ReferenceId>>,
    /// Identity index for duplicate detection.
    by_key: FxHashMap<ReferenceKey, ReferenceId>,
    next_id: u64,
}

impl ReferenceGraph {
    pub(crate) fn len(&self) -> usize {
        self.refs.len()
    }

    pub(crate) fn get(&self, id: ReferenceId) -> Option<&ReferenceRecord> {
        self.refs.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ReferenceId) -> Option<&mut ReferenceRecord> {
        self.refs.get_mut(&id)
    }

    pub(crate) fn find(&self, key: &ReferenceKey) -> Option<ReferenceId> {
        self.by_key.get(key).copied()
    }

    pub(crate) fn contains(&self, key: &ReferenceKey) -> bool {
        self.by_key.contains_key(key)
    }

    /// Iterates all references in id (insertion) order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &ReferenceRecord> {
        self.refs.values()
    }

    /// References whose forward source is `node`, in insertion order.
    pub(crate) fn outgoing(&self, node: &NodeId) -> impl Iterator<Item = &ReferenceRecord> {
        self.outgoing
            .get(node)
            .into_iter()
            .flatten()
            .filter_map(|id| self.refs.get(id))
    }

    /// References whose forward target is `node`, in insertion order.
    pub(crate) fn incoming(&self, node: &NodeId) -> impl Iterator<Item = &ReferenceRecord> {
        self.incoming
            .get(node)
            .into_iter()
            .flatten()
            .filter_map(|id| self.refs.get(id))
    }

    /// Ids of every reference touching `node` from either side.
    pub(crate) fn incident(&self, node: &NodeId) -> Vec<ReferenceId> {
        let mut ids: Vec<ReferenceId> = self
            .outgoing
            .get(node)
            .into_iter()
            .chain(self.incoming.get(node))
            .flatten()
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Inserts a reference, assigning a fresh id.
    ///
    /// Callers check [`ReferenceGraph::contains`] first; inserting a duplicate
    /// key replaces the identity index entry and is a logic error.
    pub(crate) fn insert(&mut self, mut record: ReferenceRecord) -> ReferenceId {
        self.next_id += 1;
        let id = ReferenceId(self.next_id);
        record.id = id;
        let prev = self.by_key.insert(record.key(), id);
        debug_assert!(prev.is_none(), "duplicate reference key inserted");
        self.outgoing
            .entry(record.source.clone())
            .or_default()
            .push(id);
        self.incoming
            .entry(record.target.clone())
            .or_default()
            .push(id);
        self.refs.insert(id, record);
        id
    }

    /// Removes a reference and its index entries.
    pub(crate) fn remove(&mut self, id: ReferenceId) -> Option<ReferenceRecord> {
        let record = self.refs.remove(&id)?;
        self.by_key.remove(&record.key());
        Self::unlink(&mut self.outgoing, &record.source, id);
        Self::unlink(&mut self.incoming, &record.target, id);
        Some(record)
    }

    fn unlink(index: &mut FxHashMap<NodeId, Vec<ReferenceId>>, node: &NodeId, id: ReferenceId) {
        let Some(ids) = index.get_mut(node) else {
            return;
        };
        ids.retain(|r| *r != id);
        if ids.is_empty() {
            index.remove(node);
        }
    }

    /// Rebuilds every index after rewriting node ids through `f`.
    ///
    /// Reference ids and bucket order are preserved.
    pub(crate) fn remap(&self, f: &impl Fn(&NodeId) -> NodeId) -> Self {
        let mut out = Self {
            next_id: self.next_id,
            ..Self::default()
        };
        for record in self.refs.values() {
            let mut record = record.clone();
            record.remap(f);
            let id = record.id;
            out.by_key.insert(record.key(), id);
            out.outgoing
                .entry(record.source.clone())
                .or_default()
                .push(id);
            out.incoming
                .entry(record.target.clone())
                .or_default()
                .push(id);
            out.refs.insert(id, record);
        }
        out
    }

    /// Sorted `(source, target, type)` triples of the forward and inverse
    /// indices; equal fingerprints mean identical adjacency.
    #[cfg(test)]
    pub(crate) fn adjacency_fingerprint(&self) -> Vec<AdjacencyRow> {
        let mut nodes: Vec<&NodeId> = self.outgoing.keys().chain(self.incoming.keys()).collect();
        nodes.sort();
        nodes.dedup();
        nodes
            .into_iter()
            .map(|n| {
                let mut out: Vec<ReferenceKey> = self.outgoing(n).map(ReferenceRecord::key).collect();
                let mut inc: Vec<ReferenceKey> = self.incoming(n).map(ReferenceRecord::key).collect();
                out.sort();
                inc.sort();
                (n.clone(), out, inc)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn n(v: u32) -> NodeId {
        NodeId::numeric(1, v)
    }

    #[test]
    fn remove_updates_both_indices() {
        let mut g = ReferenceGraph::default();
        let ty = NodeId::ns0(47);
        let ab = g.insert(ReferenceRecord::new(n(1), n(2), ty.clone()));
        let cb = g.insert(ReferenceRecord::new(n(3), n(2), ty.clone()));
        let ac = g.insert(ReferenceRecord::new(n(1), n(3), ty));

        assert_eq!(g.incident(&n(2)), vec![ab, cb]);
        let removed = g.remove(ab).unwrap();
        assert_eq!(removed.source, n(1));
        assert!(!g.contains(&removed.key()));
        assert_eq!(g.outgoing(&n(1)).map(|r| r.id).collect::<Vec<_>>(), vec![ac]);
        assert_eq!(g.incoming(&n(2)).map(|r| r.id).collect::<Vec<_>>(), vec![cb]);

        g.remove(cb).unwrap();
        assert!(!g.incoming.contains_key(&n(2)));
        assert!(!g.outgoing.contains_key(&n(3)));
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn insert_then_remove_restores_fingerprint() {
        let mut g = ReferenceGraph::default();
        let ty = NodeId::ns0(35);
        g.insert(ReferenceRecord::new(n(1), n(2), ty.clone()));
        let before = g.adjacency_fingerprint();
        let id = g.insert(ReferenceRecord::new(n(2), n(3), ty));
        g.remove(id).unwrap();
        assert_eq!(g.adjacency_fingerprint(), before);
    }

    #[test]
    fn remap_rewrites_keys_and_buckets() {
        let mut g = ReferenceGraph::default();
        g.insert(ReferenceRecord::new(n(1), n(2), NodeId::ns0(35)));
        let moved = g.remap(&|id: &NodeId| {
            if id.namespace == 1 {
                id.with_namespace(2)
            } else {
                id.clone()
            }
        });
        let key = ReferenceKey {
            source: NodeId::numeric(2, 1),
            target: NodeId::numeric(2, 2),
            reference_type: NodeId::ns0(35),
        };
        assert!(moved.contains(&key));
        assert_eq!(moved.outgoing(&NodeId::numeric(2, 1)).count(), 1);
        assert_eq!(moved.outgoing(&n(1)).count(), 0);
    }
}
