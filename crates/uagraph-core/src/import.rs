// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Batch import of already-decoded nodes, references, and namespaces.
//!
//! A batch is validated as a whole; every problem is collected into one
//! [`GraphError::ImportRejected`]. Nothing is applied unless the batch is
//! clean: the batch is staged on a copy of the space and the copy replaces the
//! original only after the staged graph passes its structural checks.
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{GraphError, ValidationIssue};
use crate::ident::NodeId;
use crate::notify::NamespaceChangeType;
use crate::record::{ModellingRule, NodeClass, NodeRecord, ReferenceKey, ReferenceRecord};
use crate::space::AddressSpace;
use crate::standard::{ids, NAMESPACE_ZERO_URI};

/// Namespace entry of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportNamespace {
    /// Namespace URI.
    pub uri: String,
    /// Model version.
    pub version: String,
    /// Publication date.
    pub publication_date: Option<String>,
    /// Source filename.
    pub filename: Option<String>,
    /// Declared dependencies.
    pub depends_on: Vec<String>,
}

impl ImportNamespace {
    /// Entry with only a URI and version.
    pub fn new(uri: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            version: version.into(),
            publication_date: None,
            filename: None,
            depends_on: Vec::new(),
        }
    }
}

/// Reference entry of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReference {
    /// Source as written in the batch.
    pub source: NodeId,
    /// Target as written in the batch.
    pub target: NodeId,
    /// Reference type.
    pub reference_type: NodeId,
    /// `false` stores `target -> source`.
    pub is_forward: bool,
    /// Modelling rule of an aggregating reference.
    pub modelling_rule: ModellingRule,
}

impl ImportReference {
    /// Forward reference without a modelling rule.
    pub fn forward(source: NodeId, target: NodeId, reference_type: NodeId) -> Self {
        Self {
            source,
            target,
            reference_type,
            is_forward: true,
            modelling_rule: ModellingRule::None,
        }
    }
}

/// A decoded model fragment.
///
/// Namespace indices inside the batch are batch-local: 0 is namespace zero
/// and `i > 0` refers to `namespaces[i - 1]`. They are rewritten to the
/// indices of the target space on import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportBatch {
    /// Namespaces in batch-index order.
    pub namespaces: Vec<ImportNamespace>,
    /// Node records.
    pub nodes: Vec<NodeRecord>,
    /// References between batch nodes or existing nodes.
    pub references: Vec<ImportReference>,
}

/// What an import changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Space index of each batch namespace, in batch order.
    pub namespace_indices: Vec<u16>,
    /// Number of nodes added.
    pub nodes_added: usize,
    /// Number of references added.
    pub references_added: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Target {
    UserNamespaces,
    NamespaceZero,
}

impl AddressSpace {
    /// Imports a batch into user namespaces as one all-or-nothing step.
    pub fn import(&mut self, batch: ImportBatch) -> Result<ImportReport, GraphError> {
        self.import_batch(batch, Target::UserNamespaces)
    }

    /// Extends namespace zero. The batch may declare no namespaces and every
    /// node must live in namespace zero.
    pub fn update_namespace_zero(&mut self, batch: ImportBatch) -> Result<ImportReport, GraphError> {
        self.import_batch(batch, Target::NamespaceZero)
    }

    fn import_batch(&mut self, batch: ImportBatch, target: Target) -> Result<ImportReport, GraphError> {
        let mut issues = Vec::new();
        let mut staged = self.clone();
        staged.journal.clear();

        // Namespaces: map batch index -> space index.
        let mut index_map: Vec<Option<u16>> = vec![Some(0)];
        let mut seen_uris = FxHashSet::default();
        for ns in &batch.namespaces {
            if target == Target::NamespaceZero {
                issues.push(ValidationIssue::new(&ns.uri, "namespace-zero updates cannot declare namespaces"));
                index_map.push(None);
                continue;
            }
            if ns.uri.trim().is_empty() {
                issues.push(ValidationIssue::new("<namespace>", "namespace uri must not be empty"));
                index_map.push(None);
                continue;
            }
            if ns.uri == NAMESPACE_ZERO_URI {
                issues.push(ValidationIssue::new(&ns.uri, "namespace zero changes through update_namespace_zero"));
                index_map.push(None);
                continue;
            }
            if !seen_uris.insert(ns.uri.clone()) {
                issues.push(ValidationIssue::new(&ns.uri, "namespace listed twice"));
                index_map.push(None);
                continue;
            }
            let index = match staged.namespaces.index_of(&ns.uri) {
                Some(existing) => {
                    if staged.namespaces.get(existing).is_some_and(|n| n.is_locked) {
                        issues.push(ValidationIssue::new(&ns.uri, "namespace is locked"));
                        index_map.push(None);
                        continue;
                    }
                    existing
                }
                None => match staged
                    .namespaces
                    .create(&ns.uri, &ns.version, staged.settings.first_numeric_id)
                {
                    Ok(index) => index,
                    Err(err) => {
                        issues.push(ValidationIssue::new(&ns.uri, err.to_string()));
                        index_map.push(None);
                        continue;
                    }
                },
            };
            if let Some(entry) = staged.namespaces.get_mut(index) {
                entry.version.clone_from(&ns.version);
                entry.publication_date.clone_from(&ns.publication_date);
                entry.filename.clone_from(&ns.filename);
                entry.depends_on.extend(ns.depends_on.iter().cloned());
            }
            index_map.push(Some(index));
        }
        let map_ns = |i: u16| index_map.get(usize::from(i)).copied().flatten();
        let map_id = |id: &NodeId| map_ns(id.namespace).map(|ns| id.with_namespace(ns));

        // Nodes.
        let mut added: Vec<NodeId> = Vec::new();
        for mut record in batch.nodes {
            let subject = record.node_id.clone();
            let (Some(new_id), Some(bn_ns)) = (map_id(&record.node_id), map_ns(record.browse_name.namespace_index))
            else {
                issues.push(ValidationIssue::new(&subject, "namespace index outside the batch"));
                continue;
            };
            if record.node_id.is_null() {
                issues.push(ValidationIssue::new(&subject, "null node id"));
                continue;
            }
            match target {
                Target::NamespaceZero if new_id.namespace != 0 => {
                    issues.push(ValidationIssue::new(&subject, "only namespace-zero nodes are allowed"));
                    continue;
                }
                Target::UserNamespaces if new_id.namespace == 0 => {
                    issues.push(ValidationIssue::new(&subject, "namespace zero changes through update_namespace_zero"));
                    continue;
                }
                _ => {}
            }
            if record.browse_name.name.trim().is_empty() {
                issues.push(ValidationIssue::new(&subject, "empty browse name"));
            }
            if record.node_class == NodeClass::Variable
                && (record.data_type.is_none() || record.value_rank.is_none())
            {
                issues.push(ValidationIssue::new(&subject, "variable requires data type and value rank"));
            }
            let ns_fn = |i: u16| map_ns(i).unwrap_or(i);
            let id_fn = |id: &NodeId| map_id(id).unwrap_or_else(|| id.clone());
            record.remap(&id_fn, &ns_fn);
            record.browse_name.namespace_index = bn_ns;
            record.is_selected = false;
            if staged.nodes.contains_key(&record.node_id) {
                issues.push(ValidationIssue::new(&subject, "node already exists"));
                continue;
            }
            added.push(record.node_id.clone());
            staged.nodes.insert(record.node_id.clone(), record);
        }

        // References.
        let mut refs_added = 0usize;
        let mut batch_keys: FxHashSet<ReferenceKey> = FxHashSet::default();
        for r in &batch.references {
            let subject = format!("{} -[{}]-> {}", r.source, r.reference_type, r.target);
            let (Some(s), Some(t), Some(ty)) = (map_id(&r.source), map_id(&r.target), map_id(&r.reference_type))
            else {
                issues.push(ValidationIssue::new(&subject, "namespace index outside the batch"));
                continue;
            };
            let mut problem = false;
            for end in [&s, &t] {
                if !staged.nodes.contains_key(end) {
                    issues.push(ValidationIssue::new(&subject, format!("unknown endpoint {end}")));
                    problem = true;
                }
            }
            match staged.nodes.get(&ty) {
                Some(n) if n.node_class == NodeClass::ReferenceType => {}
                Some(_) => {
                    issues.push(ValidationIssue::new(&subject, "reference type is not a ReferenceType"));
                    problem = true;
                }
                None => {
                    issues.push(ValidationIssue::new(&subject, format!("unknown reference type {ty}")));
                    problem = true;
                }
            }
            if problem {
                continue;
            }
            let (from, to) = if r.is_forward { (s, t) } else { (t, s) };
            if target == Target::UserNamespaces && from.namespace == 0 && to.namespace == 0 {
                issues.push(ValidationIssue::new(&subject, "reference between namespace-zero nodes"));
                continue;
            }
            for end in [&from, &to] {
                if end.namespace != 0 && staged.namespaces.get(end.namespace).is_some_and(|n| n.is_locked) {
                    issues.push(ValidationIssue::new(&subject, format!("{end} is in a locked namespace")));
                    problem = true;
                }
            }
            if problem {
                continue;
            }
            let mut record = ReferenceRecord::new(from, to, ty);
            record.modelling_rule = r.modelling_rule;
            let key = record.key();
            if staged.graph.contains(&key) || !batch_keys.insert(key) {
                issues.push(ValidationIssue::new(&subject, "duplicate reference"));
                continue;
            }
            staged.graph.insert(record);
            refs_added += 1;
        }

        // Whole-graph checks on the staged result.
        let hierarchical = staged.hierarchical_types();
        let reachable = staged.reachable_from_root(&hierarchical);
        for id in &added {
            let anchored = staged
                .graph
                .incoming(id)
                .any(|r| hierarchical.contains(&r.reference_type) && &r.source != id);
            if !anchored {
                issues.push(ValidationIssue::new(id, "node has no hierarchical parent"));
            } else if !reachable.contains(id) {
                issues.push(ValidationIssue::new(id, "node is not reachable from the root folder"));
            }
            if let Some(record) = staged.nodes.get(id) {
                if let Some(dt) = &record.data_type {
                    if staged.nodes.get(dt).is_none_or(|n| n.node_class != NodeClass::DataType) {
                        issues.push(ValidationIssue::new(id, format!("unresolved data type {dt}")));
                    }
                }
            }
        }
        for key in batch_keys.iter().filter(|k| hierarchical.contains(&k.reference_type)) {
            if key.source != key.target && staged.reaches_upward(&key.source, &key.target) {
                issues.push(ValidationIssue::new(
                    format!("{} -[{}]-> {}", key.source, key.reference_type, key.target),
                    "hierarchical reference closes a cycle",
                ));
            }
        }
        let dependencies = staged.check_dependencies();
        for ns in dependencies.namespaces.iter().filter(|ns| ns.in_cycle) {
            issues.push(ValidationIssue::new(&ns.uri, "namespace dependencies form a cycle"));
        }

        if !issues.is_empty() {
            warn!(issues = issues.len(), "import rejected");
            return Err(GraphError::ImportRejected(issues));
        }

        staged.bump();
        for id in &added {
            staged.touch(id);
        }
        staged.classes.clear();
        let report = ImportReport {
            namespace_indices: index_map.iter().skip(1).flatten().copied().collect(),
            nodes_added: added.len(),
            references_added: refs_added,
        };
        info!(nodes = report.nodes_added, references = report.references_added, "import applied");
        staged.record(
            NamespaceChangeType::Added,
            format!(
                "imported {} node(s) and {} reference(s)",
                report.nodes_added, report.references_added
            ),
        );
        let journal = std::mem::take(&mut staged.journal);
        let previous = std::mem::replace(self, staged);
        self.journal = previous.journal;
        self.journal.extend(journal);
        Ok(report)
    }
}

impl AddressSpace {
    /// Nodes reachable from the root folder over hierarchical references.
    fn reachable_from_root(&self, hierarchical: &FxHashSet<NodeId>) -> FxHashSet<NodeId> {
        let mut seen = FxHashSet::default();
        let mut stack = vec![ids::ROOT_FOLDER];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            stack.extend(
                self.graph
                    .outgoing(&current)
                    .filter(|r| hierarchical.contains(&r.reference_type))
                    .map(|r| r.target.clone()),
            );
        }
        seen
    }
}

/// Groups issues by subject, for hosts that render per-node diagnostics.
pub fn issues_by_subject(issues: &[ValidationIssue]) -> FxHashMap<&str, Vec<&str>> {
    let mut out: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
    for issue in issues {
        out.entry(issue.subject.as_str())
            .or_default()
            .push(issue.message.as_str());
    }
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::ident::QualifiedName;

    fn object(ns: u16, id: u32, name: &str) -> NodeRecord {
        NodeRecord::new(NodeId::numeric(ns, id), NodeClass::Object, QualifiedName::new(ns, name))
    }

    #[test]
    fn clean_batch_lands_with_remapped_indices() {
        let mut s = AddressSpace::new();
        s.create_namespace("urn:other", "1").unwrap();
        let batch = ImportBatch {
            namespaces: vec![ImportNamespace::new("urn:plant", "2.0")],
            nodes: vec![object(1, 1, "Line"), object(1, 2, "Cell")],
            references: vec![
                ImportReference::forward(ids::OBJECTS_FOLDER, NodeId::numeric(1, 1), ids::ORGANIZES),
                ImportReference::forward(NodeId::numeric(1, 1), NodeId::numeric(1, 2), ids::HAS_COMPONENT),
            ],
        };
        let report = s.import(batch).unwrap();
        assert_eq!(report.namespace_indices, vec![2]);
        assert_eq!(report.nodes_added, 2);
        let cell = s.search_node(&ids::OBJECTS_FOLDER, "2:Cell").unwrap();
        assert_eq!(cell, NodeId::numeric(2, 2));
    }

    #[test]
    fn every_problem_is_reported_and_nothing_applied() {
        let mut s = AddressSpace::new();
        let before = s.node_count();
        let mut var = NodeRecord::new(
            NodeId::numeric(1, 3),
            NodeClass::Variable,
            QualifiedName::new(1, "V"),
        );
        var.data_type = Some(NodeId::numeric(1, 99));
        var.value_rank = Some(-1);
        let batch = ImportBatch {
            namespaces: vec![ImportNamespace::new("urn:bad", "1")],
            nodes: vec![object(1, 1, "Orphan"), var, object(4, 1, "Nowhere")],
            references: vec![
                ImportReference::forward(ids::OBJECTS_FOLDER, NodeId::numeric(1, 3), ids::ORGANIZES),
                ImportReference::forward(ids::OBJECTS_FOLDER, NodeId::numeric(1, 50), ids::ORGANIZES),
            ],
        };
        let issues = match s.import(batch) {
            Err(GraphError::ImportRejected(issues)) => issues,
            other => unreachable!("expected rejection, got {other:?}"),
        };
        let grouped = issues_by_subject(&issues);
        assert!(grouped.contains_key("ns=1;i=1"), "orphan reported: {issues:?}");
        assert!(grouped.contains_key("ns=4;i=1"), "bad index reported");
        assert!(issues.iter().any(|i| i.message.contains("unresolved data type")));
        assert!(issues.iter().any(|i| i.message.contains("unknown endpoint")));
        assert_eq!(s.node_count(), before);
        assert!(!s.namespaces().is_available("urn:bad"));
    }

    #[test]
    fn namespace_zero_updates_are_restricted() {
        let mut s = AddressSpace::new();
        let ok = ImportBatch {
            nodes: vec![object(0, 50_000, "Extra")],
            references: vec![ImportReference::forward(
                ids::OBJECTS_FOLDER,
                NodeId::ns0(50_000),
                ids::ORGANIZES,
            )],
            ..ImportBatch::default()
        };
        s.update_namespace_zero(ok).unwrap();
        assert!(s.contains(&NodeId::ns0(50_000)));

        let bad = ImportBatch {
            namespaces: vec![ImportNamespace::new("urn:x", "1")],
            nodes: vec![object(1, 1, "X")],
            ..ImportBatch::default()
        };
        assert!(matches!(
            s.update_namespace_zero(bad),
            Err(GraphError::ImportRejected(_))
        ));
        let zero_in_user = ImportBatch {
            nodes: vec![object(0, 50_001, "Sneaky")],
            ..ImportBatch::default()
        };
        assert!(matches!(s.import(zero_in_user), Err(GraphError::ImportRejected(_))));
    }
}
