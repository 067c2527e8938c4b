// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Read-side views over the address space.
//!
//! Everything here is computed from the reference graph on demand. Walks are
//! guarded by visited sets, so they terminate on cyclic hierarchies and cost
//! at most O(total nodes + total references).
use std::collections::VecDeque;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::ident::{NodeId, QualifiedName};
use crate::record::{ModellingRule, NodeRecord, OpcReference};
use crate::space::AddressSpace;
use crate::standard::ids;

/// A node record together with its graph-derived views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpcNode {
    /// Stored attributes.
    pub record: NodeRecord,
    /// Targets of forward hierarchical references.
    pub children: Vec<NodeId>,
    /// Sources of inverse hierarchical references.
    pub parents: Vec<NodeId>,
    /// Target of `HasTypeDefinition`, if any.
    pub type_definition: Option<NodeId>,
    /// Attached to its parent with a modelling rule.
    pub is_declaration_instance: bool,
    /// Attached to a parent via `HasProperty`.
    pub is_property: bool,
}

impl OpcNode {
    /// Whether the node has hierarchical children.
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Whether the node has a type definition.
    pub fn has_type_definition(&self) -> bool {
        self.type_definition.is_some()
    }
}

impl AddressSpace {
    /// Node record for `id`.
    pub fn node(&self, id: &NodeId) -> Result<&NodeRecord, GraphError> {
        self.record_ref(id)
    }

    /// Whether `id` exists.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Node record plus derived views.
    pub fn opc_node(&self, id: &NodeId) -> Result<OpcNode, GraphError> {
        let record = self.record_ref(id)?.clone();
        let hierarchical = self.hierarchical_types();
        let mut is_declaration_instance = false;
        let mut is_property = false;
        let mut parents = Vec::new();
        for r in self.graph.incoming(id) {
            if hierarchical.contains(&r.reference_type) {
                parents.push(r.source.clone());
                is_declaration_instance |= r.modelling_rule != ModellingRule::None;
                is_property |= self.is_subtype_of(&r.reference_type, &ids::HAS_PROPERTY);
            }
        }
        Ok(OpcNode {
            record,
            children: self.children_with(id, &hierarchical),
            parents,
            type_definition: self.type_definition_of(id),
            is_declaration_instance,
            is_property,
        })
    }

    /// Forward hierarchical targets of `id` in insertion order.
    pub fn children(&self, id: &NodeId) -> Result<Vec<NodeId>, GraphError> {
        self.record_ref(id)?;
        Ok(self.children_with(id, &self.hierarchical_types()))
    }

    pub(crate) fn children_with(&self, id: &NodeId, hierarchical: &FxHashSet<NodeId>) -> Vec<NodeId> {
        self.graph
            .outgoing(id)
            .filter(|r| hierarchical.contains(&r.reference_type))
            .map(|r| r.target.clone())
            .collect()
    }

    /// Inverse hierarchical sources of `id` in insertion order.
    pub fn parents(&self, id: &NodeId) -> Result<Vec<NodeId>, GraphError> {
        self.record_ref(id)?;
        let hierarchical = self.hierarchical_types();
        Ok(self
            .graph
            .incoming(id)
            .filter(|r| hierarchical.contains(&r.reference_type))
            .map(|r| r.source.clone())
            .collect())
    }

    /// Target of the `HasTypeDefinition` reference of `id`.
    pub fn type_definition(&self, id: &NodeId) -> Result<Option<NodeId>, GraphError> {
        self.record_ref(id)?;
        Ok(self.type_definition_of(id))
    }

    pub(crate) fn type_definition_of(&self, id: &NodeId) -> Option<NodeId> {
        self.graph
            .outgoing(id)
            .find(|r| r.reference_type == ids::HAS_TYPE_DEFINITION)
            .map(|r| r.target.clone())
    }

    /// Every reference touching `id`, oriented from `id`.
    pub fn references_of(&self, id: &NodeId) -> Result<Vec<OpcReference>, GraphError> {
        self.record_ref(id)?;
        Ok(self
            .graph
            .incident(id)
            .into_iter()
            .filter_map(|rid| self.graph.get(rid))
            .map(|r| r.oriented(id))
            .collect())
    }

    /// Direct supertype of a type node.
    pub fn supertype(&self, id: &NodeId) -> Option<NodeId> {
        self.graph
            .incoming(id)
            .find(|r| r.reference_type == ids::HAS_SUBTYPE)
            .map(|r| r.source.clone())
    }

    /// Whether `ty` equals `base` or reaches it through `HasSubtype` parents.
    pub fn is_subtype_of(&self, ty: &NodeId, base: &NodeId) -> bool {
        let mut seen = FxHashSet::default();
        let mut queue = VecDeque::from([ty.clone()]);
        while let Some(current) = queue.pop_front() {
            if &current == base {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            for r in self.graph.incoming(&current) {
                if r.reference_type == ids::HAS_SUBTYPE {
                    queue.push_back(r.source.clone());
                }
            }
        }
        false
    }

    /// `ty` followed by its supertypes, nearest first.
    pub(crate) fn type_chain(&self, ty: &NodeId) -> Vec<NodeId> {
        let mut chain = vec![ty.clone()];
        let mut seen: FxHashSet<NodeId> = chain.iter().cloned().collect();
        while let Some(next) = chain.last().and_then(|t| self.supertype(t)) {
            if !seen.insert(next.clone()) {
                break;
            }
            chain.push(next);
        }
        chain
    }

    /// Whether `ancestor` is reachable from `child` by following hierarchical
    /// references upward.
    ///
    /// A node is its own descendant only through a self-reference or a
    /// hierarchical cycle. The walk visits each node once.
    pub fn is_descendant_from(&self, child: &NodeId, ancestor: &NodeId) -> Result<bool, GraphError> {
        self.record_ref(child)?;
        self.record_ref(ancestor)?;
        Ok(self.reaches_upward(child, ancestor))
    }

    pub(crate) fn reaches_upward(&self, child: &NodeId, ancestor: &NodeId) -> bool {
        let hierarchical = self.hierarchical_types();
        let mut seen = FxHashSet::default();
        let mut queue = VecDeque::from([child.clone()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            for r in self.graph.incoming(&current) {
                if !hierarchical.contains(&r.reference_type) {
                    continue;
                }
                if &r.source == ancestor {
                    return true;
                }
                queue.push_back(r.source.clone());
            }
        }
        false
    }

    /// Finds the first node below `parent` whose browse name matches `term`.
    ///
    /// `term` is `"<ns>:<name>"` for an exact match or a bare `"<name>"` that
    /// matches in any namespace. The subtree is walked depth-first in
    /// pre-order, `parent` itself excluded; siblings are visited by ascending
    /// browse-name namespace index, then in insertion order.
    pub fn search_node(&self, parent: &NodeId, term: &str) -> Result<NodeId, GraphError> {
        self.record_ref(parent)?;
        let (namespace, name) = QualifiedName::split_term(term);
        let hierarchical = self.hierarchical_types();
        let matches = |record: &NodeRecord| {
            record.browse_name.name == name
                && namespace.is_none_or(|ns| record.browse_name.namespace_index == ns)
        };

        let mut seen = FxHashSet::default();
        seen.insert(parent.clone());
        let mut stack = self.ordered_children(parent, &hierarchical);
        stack.reverse();
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(record) = self.nodes.get(&current) {
                if matches(record) {
                    return Ok(current);
                }
            }
            let mut next = self.ordered_children(&current, &hierarchical);
            next.reverse();
            stack.extend(next);
        }
        Err(GraphError::BrowseNameNotFound {
            parent: parent.clone(),
            term: term.to_owned(),
        })
    }

    fn ordered_children(&self, id: &NodeId, hierarchical: &FxHashSet<NodeId>) -> Vec<NodeId> {
        let mut children = self.children_with(id, hierarchical);
        children.sort_by_key(|c| {
            self.nodes
                .get(c)
                .map_or(u16::MAX, |n| n.browse_name.namespace_index)
        });
        children
    }

    /// Active type-defined references touching `id`.
    ///
    /// Classification flags are only computed by
    /// [`AddressSpace::set_references`]; this fails with
    /// `ClassificationPending` before the first pass and with
    /// `StaleClassification` when `id` changed structurally since the last one.
    pub fn active_type_references(&self, id: &NodeId) -> Result<Vec<OpcReference>, GraphError> {
        self.record_ref(id)?;
        let classified_at = self.classified_at.ok_or(GraphError::ClassificationPending)?;
        if self.touched.get(id).is_some_and(|g| *g > classified_at) {
            return Err(GraphError::StaleClassification(id.clone()));
        }
        Ok(self
            .graph
            .incident(id)
            .into_iter()
            .filter_map(|rid| self.graph.get(rid))
            .filter(|r| r.is_type_reference && r.is_active)
            .map(|r| r.oriented(id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::space::AddNodeParams;

    #[test]
    fn namespace_zero_hierarchy_is_browsable() {
        let s = AddressSpace::new();
        assert!(s.is_hierarchical(&ids::HAS_PROPERTY));
        assert!(!s.is_hierarchical(&ids::HAS_TYPE_DEFINITION));
        assert!(s.is_descendant_from(&ids::INT32, &ids::ROOT_FOLDER).unwrap());
        assert!(!s.is_descendant_from(&ids::ROOT_FOLDER, &ids::ROOT_FOLDER).unwrap());
        assert_eq!(s.search_node(&ids::ROOT_FOLDER, "0:Int32").unwrap(), ids::INT32);
    }

    #[test]
    fn search_prefers_lower_namespace_among_siblings() {
        let mut s = AddressSpace::new();
        let a = s.create_namespace("urn:a", "1").unwrap();
        let b = s.create_namespace("urn:b", "1").unwrap();
        let high = s
            .create_node(&ids::OBJECTS_FOLDER, AddNodeParams::object("Foo", b))
            .unwrap();
        let low = s
            .create_node(&ids::OBJECTS_FOLDER, AddNodeParams::object("Foo", a))
            .unwrap();
        assert_eq!(s.search_node(&ids::OBJECTS_FOLDER, "Foo").unwrap(), low);
        assert_eq!(s.search_node(&ids::OBJECTS_FOLDER, &format!("{b}:Foo")).unwrap(), high);
        assert!(matches!(
            s.search_node(&ids::OBJECTS_FOLDER, "9:Foo"),
            Err(GraphError::BrowseNameNotFound { .. })
        ));
    }

    #[test]
    fn opc_node_derives_views() {
        let mut s = AddressSpace::new();
        let ns = s.create_namespace("urn:a", "1").unwrap();
        let o = s
            .create_node(&ids::OBJECTS_FOLDER, AddNodeParams::object("O", ns))
            .unwrap();
        let p = s
            .create_node(&o, AddNodeParams::property("P", ns, ids::STRING))
            .unwrap();
        let view = s.opc_node(&p).unwrap();
        assert!(view.is_property);
        assert_eq!(view.parents, vec![o.clone()]);
        assert_eq!(view.type_definition, Some(ids::PROPERTY_TYPE));
        assert!(s.opc_node(&o).unwrap().has_children());
    }

    #[test]
    fn active_type_references_require_a_pass() {
        let mut s = AddressSpace::new();
        let ns = s.create_namespace("urn:a", "1").unwrap();
        let o = s
            .create_node(&ids::OBJECTS_FOLDER, AddNodeParams::object("O", ns))
            .unwrap();
        assert_eq!(
            s.active_type_references(&o),
            Err(GraphError::ClassificationPending)
        );
        s.set_references();
        assert!(s.active_type_references(&o).unwrap().is_empty());
        s.create_node(&o, AddNodeParams::object("Child", ns)).unwrap();
        assert_eq!(
            s.active_type_references(&o),
            Err(GraphError::StaleClassification(o.clone()))
        );
    }
}
