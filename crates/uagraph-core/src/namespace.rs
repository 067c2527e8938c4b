// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Ordered namespace registry.
//!
//! The position of a [`Namespace`] in the table is its index. Index 0 is the
//! standard OPC UA namespace and never moves.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::GraphError;
use crate::ident::{ExpandedNodeId, NodeId};
use crate::notify::NamespaceChangeType;
use crate::record::NodeRecord;
use crate::space::AddressSpace;
use crate::standard::{NAMESPACE_ZERO_URI, NAMESPACE_ZERO_VERSION};

/// One registered namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    /// Namespace URI (unique in the table).
    pub uri: String,
    /// Model version.
    pub version: String,
    /// Publication date as supplied by the model (ISO 8601 text).
    pub publication_date: Option<String>,
    /// File the namespace was imported from, if any.
    pub filename: Option<String>,
    /// Locked namespaces reject edits to their nodes.
    pub is_locked: bool,
    /// Declared dependencies (namespace URIs).
    pub depends_on: BTreeSet<String>,
    /// Next candidate for automatic numeric NodeId allocation.
    #[serde(skip)]
    pub(crate) next_numeric: u32,
}

impl Namespace {
    fn new(uri: String, version: String, next_numeric: u32) -> Self {
        Self {
            uri,
            version,
            publication_date: None,
            filename: None,
            is_locked: false,
            depends_on: BTreeSet::new(),
            next_numeric,
        }
    }
}

/// Namespace attribute editable through `set_namespace_attribute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamespaceAttribute {
    /// Namespace URI.
    Uri,
    /// Model version.
    Version,
    /// Publication date.
    PublicationDate,
    /// Source filename.
    Filename,
}

/// Ordered registry of namespaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceTable {
    entries: Vec<Namespace>,
    current: u16,
}

impl NamespaceTable {
    /// Table holding only namespace zero.
    pub fn new() -> Self {
        let zero = Namespace::new(
            NAMESPACE_ZERO_URI.to_owned(),
            NAMESPACE_ZERO_VERSION.to_owned(),
            u32::MAX,
        );
        Self {
            entries: vec![zero],
            current: 0,
        }
    }

    /// Number of namespaces, including namespace zero.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`: namespace zero is permanent.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Namespace URIs in index order.
    pub fn uris(&self) -> Vec<String> {
        self.entries.iter().map(|ns| ns.uri.clone()).collect()
    }

    /// Iterates `(index, namespace)` in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Namespace)> {
        (0u16..).zip(self.entries.iter())
    }

    /// Namespace at `index`.
    pub fn get(&self, index: u16) -> Option<&Namespace> {
        self.entries.get(usize::from(index))
    }

    pub(crate) fn get_mut(&mut self, index: u16) -> Option<&mut Namespace> {
        self.entries.get_mut(usize::from(index))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Namespace> {
        self.entries.iter_mut()
    }

    /// Index of `uri`, if registered.
    pub fn index_of(&self, uri: &str) -> Option<u16> {
        self.entries
            .iter()
            .position(|ns| ns.uri == uri)
            .and_then(|i| u16::try_from(i).ok())
    }

    /// Index of `uri`, or `NamespaceNotFound`.
    pub fn require(&self, uri: &str) -> Result<u16, GraphError> {
        self.index_of(uri)
            .ok_or_else(|| GraphError::NamespaceNotFound(uri.to_owned()))
    }

    /// Returns `true` when `uri` is registered.
    pub fn is_available(&self, uri: &str) -> bool {
        self.index_of(uri).is_some()
    }

    /// Index used to resolve unqualified names.
    pub fn current(&self) -> u16 {
        self.current
    }

    /// Sets the current namespace by index.
    pub fn set_current(&mut self, index: u16) -> Result<(), GraphError> {
        if self.get(index).is_none() {
            return Err(GraphError::NamespaceIndexNotFound(index));
        }
        self.current = index;
        Ok(())
    }

    /// Sets the current namespace by URI.
    pub fn set_current_uri(&mut self, uri: &str) -> Result<(), GraphError> {
        let index = self.require(uri)?;
        self.current = index;
        Ok(())
    }

    /// Appends a namespace and returns its index.
    pub(crate) fn create(
        &mut self,
        uri: &str,
        version: &str,
        first_numeric_id: u32,
    ) -> Result<u16, GraphError> {
        if uri.trim().is_empty() {
            return Err(GraphError::invalid("namespace uri must not be empty"));
        }
        if self.index_of(uri).is_some() {
            return Err(GraphError::NamespaceExists(uri.to_owned()));
        }
        let index = u16::try_from(self.entries.len())
            .map_err(|_| GraphError::invalid("namespace table is full"))?;
        self.entries.push(Namespace::new(
            uri.to_owned(),
            version.to_owned(),
            first_numeric_id,
        ));
        Ok(index)
    }

    /// Resolves an expanded id to a local node id.
    ///
    /// A present `namespace_uri` overrides the index; remote ids (non-zero
    /// server index) and unknown URIs resolve to `None`.
    pub fn resolve(&self, id: &ExpandedNodeId) -> Option<NodeId> {
        if !id.is_local() {
            return None;
        }
        match &id.namespace_uri {
            Some(uri) => self.index_of(uri).map(|idx| id.node_id.with_namespace(idx)),
            None => self.get(id.node_id.namespace).map(|_| id.node_id.clone()),
        }
    }

    /// Old-to-new index map for a permutation of the current URIs.
    ///
    /// Namespace zero must stay first and every URI must appear exactly once.
    pub(crate) fn permutation(&self, order: &[String]) -> Result<Vec<u16>, GraphError> {
        if order.len() != self.entries.len() {
            return Err(GraphError::invalid(format!(
                "namespace order lists {} uris, table has {}",
                order.len(),
                self.entries.len()
            )));
        }
        if order.first().map(String::as_str) != Some(NAMESPACE_ZERO_URI) {
            return Err(GraphError::invalid("namespace zero must stay at index 0"));
        }
        let mut map = vec![u16::MAX; self.entries.len()];
        for (new_index, uri) in (0u16..).zip(order) {
            let old = self.require(uri)?;
            let slot = &mut map[usize::from(old)];
            if *slot != u16::MAX {
                return Err(GraphError::invalid(format!("namespace listed twice: {uri}")));
            }
            *slot = new_index;
        }
        Ok(map)
    }

    /// Reorders entries according to an old-to-new index map.
    pub(crate) fn apply_permutation(&mut self, map: &[u16]) {
        let mut slots: Vec<Option<Namespace>> = vec![None; self.entries.len()];
        for (old, ns) in self.entries.drain(..).enumerate() {
            slots[usize::from(map[old])] = Some(ns);
        }
        self.entries = slots.into_iter().flatten().collect();
        self.current = map
            .get(usize::from(self.current))
            .copied()
            .unwrap_or(0);
    }

    /// Drops the entry at `index`; callers remap node ids first.
    pub(crate) fn remove(&mut self, index: u16) -> Option<Namespace> {
        let idx = usize::from(index);
        if idx == 0 || idx >= self.entries.len() {
            return None;
        }
        if self.current == index {
            self.current = 0;
        } else if self.current > index {
            self.current -= 1;
        }
        Some(self.entries.remove(idx))
    }
}

impl Default for NamespaceTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Project view of one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectNode {
    /// Namespace URI.
    pub uri: String,
    /// Current index.
    pub index: u16,
    /// Model version.
    pub version: String,
    /// Publication date.
    pub publication_date: Option<String>,
    /// Source filename.
    pub filename: Option<String>,
    /// Lock state.
    pub is_locked: bool,
    /// Declared dependencies in URI order.
    pub depends_on: Vec<String>,
    /// Nodes of this namespace whose hierarchical parents all live elsewhere.
    pub children: Vec<NodeId>,
    /// Dependencies resolve and form no cycle.
    pub is_consistent: bool,
}

/// Dependency diagnostics for one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceDependencies {
    /// Namespace URI.
    pub uri: String,
    /// Declared direct dependencies.
    pub depends_on: Vec<String>,
    /// Dependencies that name no registered namespace.
    pub unresolved: Vec<String>,
    /// Whether the namespace depends on itself, directly or transitively.
    pub in_cycle: bool,
}

/// Result of [`AddressSpace::check_dependencies`], in index order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyReport {
    /// One entry per namespace.
    pub namespaces: Vec<NamespaceDependencies>,
}

impl DependencyReport {
    /// No unresolved dependency and no cycle anywhere.
    pub fn is_consistent(&self) -> bool {
        self.namespaces
            .iter()
            .all(|ns| ns.unresolved.is_empty() && !ns.in_cycle)
    }

    /// Entry for `uri`.
    pub fn get(&self, uri: &str) -> Option<&NamespaceDependencies> {
        self.namespaces.iter().find(|ns| ns.uri == uri)
    }
}

/// Whether `start` reaches `target` through `depends_on` edges.
fn depends_transitively(table: &NamespaceTable, start: &str, target: &str) -> bool {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<&str> = table
        .index_of(start)
        .and_then(|i| table.get(i))
        .map(|ns| ns.depends_on.iter().map(String::as_str).collect())
        .unwrap_or_default();
    while let Some(uri) = stack.pop() {
        if uri == target {
            return true;
        }
        if !seen.insert(uri) {
            continue;
        }
        if let Some(ns) = table.index_of(uri).and_then(|i| table.get(i)) {
            stack.extend(ns.depends_on.iter().map(String::as_str));
        }
    }
    false
}

impl AddressSpace {
    /// Registers a namespace and returns its index.
    pub fn create_namespace(&mut self, uri: &str, version: &str) -> Result<u16, GraphError> {
        let index = self
            .namespaces
            .create(uri, version, self.settings.first_numeric_id)?;
        info!(uri, version, index, "create namespace");
        self.bump();
        self.record(NamespaceChangeType::Added, format!("created namespace {uri} at {index}"));
        Ok(index)
    }

    /// Returns the index of `uri`, registering it with the implicit version
    /// from the settings when it is missing.
    pub fn create_implicit_namespace(&mut self, uri: &str) -> Result<u16, GraphError> {
        if let Some(index) = self.namespaces.index_of(uri) {
            return Ok(index);
        }
        let version = self.settings.implicit_namespace_version.clone();
        self.create_namespace(uri, &version)
    }

    /// Locks `uri` against edits; locking a locked namespace is a no-op.
    pub fn lock_namespace(&mut self, uri: &str) -> Result<(), GraphError> {
        self.set_lock(uri, true)
    }

    /// Unlocks `uri`; unlocking an unlocked namespace is a no-op.
    pub fn unlock_namespace(&mut self, uri: &str) -> Result<(), GraphError> {
        self.set_lock(uri, false)
    }

    fn set_lock(&mut self, uri: &str, locked: bool) -> Result<(), GraphError> {
        let index = self.namespaces.require(uri)?;
        if index == 0 {
            return Err(GraphError::NamespaceZeroImmutable);
        }
        let ns = self
            .namespaces
            .get_mut(index)
            .ok_or(GraphError::NamespaceIndexNotFound(index))?;
        if ns.is_locked == locked {
            return Ok(());
        }
        ns.is_locked = locked;
        info!(uri, locked, "namespace lock");
        self.bump();
        let change = if locked {
            NamespaceChangeType::Locked
        } else {
            NamespaceChangeType::Unlocked
        };
        self.record(change, format!("{} {uri}", if locked { "locked" } else { "unlocked" }));
        Ok(())
    }

    /// Sets the namespace used for unqualified names.
    pub fn set_current_namespace(&mut self, uri: &str) -> Result<(), GraphError> {
        self.namespaces.set_current_uri(uri)
    }

    /// Number of nodes whose NodeId lives in `uri`.
    pub fn count_nodes(&self, uri: &str) -> Result<usize, GraphError> {
        let index = self.namespaces.require(uri)?;
        Ok(self.nodes.keys().filter(|id| id.namespace == index).count())
    }

    /// Reassigns namespace indices to match `order` and rewrites every stored
    /// NodeId and browse name accordingly.
    ///
    /// `order` must list every registered URI once, namespace zero first. The
    /// rewritten space is built aside and swapped in whole. Passing the
    /// current order changes nothing.
    pub fn reorder_namespaces(&mut self, order: &[String]) -> Result<(), GraphError> {
        let map = self.namespaces.permutation(order)?;
        if map.iter().enumerate().all(|(i, m)| usize::from(*m) == i) {
            return Ok(());
        }
        let ns_fn = |i: u16| map.get(usize::from(i)).copied().unwrap_or(i);
        self.rewrite_indices(&ns_fn);
        self.namespaces.apply_permutation(&map);
        info!(order = ?order, "reorder namespaces");
        self.bump();
        self.record(
            NamespaceChangeType::Modified,
            format!("reordered namespaces: {}", order.join(", ")),
        );
        Ok(())
    }

    /// Rebuilds nodes, references, and staleness marks under a namespace
    /// index mapping.
    fn rewrite_indices(&mut self, ns_fn: &impl Fn(u16) -> u16) {
        let id_fn = |id: &NodeId| id.with_namespace(ns_fn(id.namespace));
        let nodes: BTreeMap<NodeId, NodeRecord> = self
            .nodes
            .values()
            .map(|record| {
                let mut record = record.clone();
                record.remap(&id_fn, ns_fn);
                (record.node_id.clone(), record)
            })
            .collect();
        let graph = self.graph.remap(&id_fn);
        let touched = self
            .touched
            .iter()
            .map(|(id, generation)| (id_fn(id), *generation))
            .collect();
        self.nodes = nodes;
        self.graph = graph;
        self.touched = touched;
        self.classes.clear();
    }

    /// Removes an unlocked namespace that holds no nodes; higher indices
    /// shift down by one.
    pub fn remove_namespace(&mut self, uri: &str) -> Result<(), GraphError> {
        let index = self.namespaces.require(uri)?;
        self.ensure_writable(index)?;
        let count = self.count_nodes(uri)?;
        if count > 0 {
            return Err(GraphError::NamespaceNotEmpty {
                uri: uri.to_owned(),
                count,
            });
        }
        if let Some(user) = self
            .nodes
            .values()
            .find(|n| n.browse_name.namespace_index == index)
        {
            return Err(GraphError::invalid(format!(
                "browse name of {} still uses namespace {uri}",
                user.node_id
            )));
        }
        let ns_fn = |i: u16| if i > index { i - 1 } else { i };
        self.rewrite_indices(&ns_fn);
        self.namespaces.remove(index);
        info!(uri, index, "remove namespace");
        self.bump();
        self.record(NamespaceChangeType::Removed, format!("removed namespace {uri}"));
        Ok(())
    }

    /// Edits one namespace attribute. An empty value clears optional ones.
    pub fn set_namespace_attribute(
        &mut self,
        index: u16,
        attribute: NamespaceAttribute,
        value: &str,
    ) -> Result<(), GraphError> {
        self.ensure_writable(index)?;
        let old_uri = self
            .namespaces
            .get(index)
            .map(|ns| ns.uri.clone())
            .ok_or(GraphError::NamespaceIndexNotFound(index))?;
        let optional = |v: &str| (!v.trim().is_empty()).then(|| v.to_owned());
        match attribute {
            NamespaceAttribute::Uri => {
                if value.trim().is_empty() {
                    return Err(GraphError::invalid("namespace uri must not be empty"));
                }
                if value != old_uri && self.namespaces.is_available(value) {
                    return Err(GraphError::NamespaceExists(value.to_owned()));
                }
                for ns in self.namespaces.iter_mut() {
                    if ns.depends_on.remove(&old_uri) {
                        ns.depends_on.insert(value.to_owned());
                    }
                }
            }
            NamespaceAttribute::Version => {
                if value.trim().is_empty() {
                    return Err(GraphError::invalid("namespace version must not be empty"));
                }
            }
            NamespaceAttribute::PublicationDate | NamespaceAttribute::Filename => {}
        }
        let ns = self
            .namespaces
            .get_mut(index)
            .ok_or(GraphError::NamespaceIndexNotFound(index))?;
        match attribute {
            NamespaceAttribute::Uri => ns.uri = value.to_owned(),
            NamespaceAttribute::Version => ns.version = value.to_owned(),
            NamespaceAttribute::PublicationDate => ns.publication_date = optional(value),
            NamespaceAttribute::Filename => ns.filename = optional(value),
        }
        self.bump();
        self.record(
            NamespaceChangeType::Modified,
            format!("set {attribute:?} of namespace {old_uri}"),
        );
        Ok(())
    }

    /// Declares that `uri` depends on `dependency`.
    ///
    /// Fails with a validation error when the declaration would close a
    /// dependency cycle.
    pub fn add_namespace_dependency(&mut self, uri: &str, dependency: &str) -> Result<(), GraphError> {
        let index = self.namespaces.require(uri)?;
        self.ensure_writable(index)?;
        if uri == dependency || depends_transitively(&self.namespaces, dependency, uri) {
            return Err(GraphError::invalid(format!(
                "dependency {uri} -> {dependency} would form a cycle"
            )));
        }
        let ns = self
            .namespaces
            .get_mut(index)
            .ok_or(GraphError::NamespaceIndexNotFound(index))?;
        if ns.depends_on.insert(dependency.to_owned()) {
            self.bump();
            self.record(
                NamespaceChangeType::Modified,
                format!("{uri} now depends on {dependency}"),
            );
        }
        Ok(())
    }

    /// Reports direct dependencies, unresolved URIs, and cycle membership for
    /// every namespace. Never fails.
    pub fn check_dependencies(&self) -> DependencyReport {
        let namespaces = self
            .namespaces
            .iter()
            .map(|(_, ns)| NamespaceDependencies {
                uri: ns.uri.clone(),
                depends_on: ns.depends_on.iter().cloned().collect(),
                unresolved: ns
                    .depends_on
                    .iter()
                    .filter(|d| !self.namespaces.is_available(d))
                    .cloned()
                    .collect(),
                in_cycle: depends_transitively(&self.namespaces, &ns.uri, &ns.uri),
            })
            .collect();
        DependencyReport { namespaces }
    }

    /// Project view of `uri`: metadata plus its root nodes, the ones without a
    /// hierarchical parent inside the same namespace.
    pub fn project_node(&self, uri: &str) -> Result<ProjectNode, GraphError> {
        let index = self.namespaces.require(uri)?;
        let ns = self
            .namespaces
            .get(index)
            .ok_or(GraphError::NamespaceIndexNotFound(index))?;
        let hierarchical = self.hierarchical_types();
        let children = self
            .nodes
            .keys()
            .filter(|id| id.namespace == index)
            .filter(|id| {
                self.graph.incoming(id).all(|r| {
                    !hierarchical.contains(&r.reference_type) || r.source.namespace != index
                })
            })
            .cloned()
            .collect();
        let report = self.check_dependencies();
        let is_consistent = report
            .get(uri)
            .is_some_and(|d| d.unresolved.is_empty() && !d.in_cycle);
        Ok(ProjectNode {
            uri: ns.uri.clone(),
            index,
            version: ns.version.clone(),
            publication_date: ns.publication_date.clone(),
            filename: ns.filename.clone(),
            is_locked: ns.is_locked,
            depends_on: ns.depends_on.iter().cloned().collect(),
            children,
            is_consistent,
        })
    }

    /// Resolves an expanded id against the namespace table and checks that
    /// the node exists.
    pub fn resolve(&self, id: &ExpandedNodeId) -> Result<NodeId, GraphError> {
        let local = self
            .namespaces
            .resolve(id)
            .ok_or_else(|| GraphError::NamespaceNotFound(id.to_string()))?;
        self.record_ref(&local)?;
        Ok(local)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn create_assigns_contiguous_indices() {
        let mut t = NamespaceTable::new();
        assert_eq!(t.create("urn:a", "1.0", 1000).unwrap(), 1);
        assert_eq!(t.create("urn:b", "1.0", 1000).unwrap(), 2);
        assert_eq!(
            t.create("urn:a", "2.0", 1000),
            Err(GraphError::NamespaceExists("urn:a".into()))
        );
        assert_eq!(t.uris()[0], NAMESPACE_ZERO_URI);
    }

    #[test]
    fn permutation_rejects_moving_namespace_zero() {
        let mut t = NamespaceTable::new();
        t.create("urn:a", "1.0", 1000).unwrap();
        let err = t
            .permutation(&["urn:a".into(), NAMESPACE_ZERO_URI.into()])
            .unwrap_err();
        assert!(matches!(err, GraphError::Validation(_)));
    }

    #[test]
    fn apply_permutation_tracks_current() {
        let mut t = NamespaceTable::new();
        t.create("urn:a", "1.0", 1000).unwrap();
        t.create("urn:b", "1.0", 1000).unwrap();
        t.set_current_uri("urn:a").unwrap();
        let map = t
            .permutation(&[NAMESPACE_ZERO_URI.into(), "urn:b".into(), "urn:a".into()])
            .unwrap();
        assert_eq!(map, vec![0, 2, 1]);
        t.apply_permutation(&map);
        assert_eq!(t.index_of("urn:a"), Some(2));
        assert_eq!(t.current(), 2);
    }

    #[test]
    fn resolve_prefers_uri() {
        let mut t = NamespaceTable::new();
        t.create("urn:a", "1.0", 1000).unwrap();
        let id = ExpandedNodeId {
            node_id: NodeId::numeric(9, 1),
            namespace_uri: Some("urn:a".into()),
            server_index: 0,
        };
        assert_eq!(t.resolve(&id), Some(NodeId::numeric(1, 1)));
        let remote = ExpandedNodeId {
            server_index: 2,
            ..id
        };
        assert_eq!(t.resolve(&remote), None);
    }

    #[test]
    fn dependency_cycles_are_rejected_and_reported() {
        let mut s = AddressSpace::new();
        s.create_namespace("urn:a", "1").unwrap();
        s.create_namespace("urn:b", "1").unwrap();
        s.add_namespace_dependency("urn:a", "urn:b").unwrap();
        assert!(matches!(
            s.add_namespace_dependency("urn:b", "urn:a"),
            Err(GraphError::Validation(_))
        ));
        s.add_namespace_dependency("urn:b", "urn:missing").unwrap();
        let report = s.check_dependencies();
        assert!(!report.is_consistent());
        assert_eq!(report.get("urn:b").unwrap().unresolved, vec!["urn:missing".to_owned()]);
        assert!(!report.get("urn:a").unwrap().in_cycle);
        assert!(s.project_node("urn:a").unwrap().is_consistent);
        assert!(!s.project_node("urn:b").unwrap().is_consistent);
    }

    #[test]
    fn remove_namespace_shifts_higher_indices() {
        use crate::space::AddNodeParams;
        use crate::standard::ids;

        let mut s = AddressSpace::new();
        s.create_namespace("urn:a", "1").unwrap();
        let b = s.create_namespace("urn:b", "1").unwrap();
        let node = s
            .create_node(&ids::OBJECTS_FOLDER, AddNodeParams::object("N", b))
            .unwrap();
        s.remove_namespace("urn:a").unwrap();
        assert_eq!(s.namespaces().index_of("urn:b"), Some(1));
        let moved = node.with_namespace(1);
        assert_eq!(s.node(&moved).unwrap().browse_name.namespace_index, 1);
        assert!(matches!(
            s.remove_namespace("urn:b"),
            Err(GraphError::NamespaceNotEmpty { count: 1, .. })
        ));
    }

    #[test]
    fn namespace_attributes_follow_uri_renames() {
        let mut s = AddressSpace::new();
        let a = s.create_namespace("urn:a", "1").unwrap();
        s.create_namespace("urn:b", "1").unwrap();
        s.add_namespace_dependency("urn:b", "urn:a").unwrap();
        s.set_namespace_attribute(a, NamespaceAttribute::Uri, "urn:renamed").unwrap();
        s.set_namespace_attribute(a, NamespaceAttribute::Filename, "a.xml").unwrap();
        assert!(s.check_dependencies().is_consistent());
        assert_eq!(s.namespaces().get(a).unwrap().filename.as_deref(), Some("a.xml"));
        assert_eq!(
            s.set_namespace_attribute(0, NamespaceAttribute::Version, "2"),
            Err(GraphError::NamespaceZeroImmutable)
        );
    }
}
