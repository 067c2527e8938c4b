// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The address space: node arena, reference graph, and namespace table.
//!
//! Every mutation validates completely before it changes anything, so a
//! failed call leaves the space exactly as it was. Composite edits that reuse
//! other mutations go through [`AddressSpace::atomically`], which restores a
//! snapshot on failure.
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classify::ClassCache;
use crate::error::GraphError;
use crate::graph::ReferenceGraph;
use crate::ident::{LocalizedText, NodeId, QualifiedName};
use crate::namespace::NamespaceTable;
use crate::notify::{NamespaceChange, NamespaceChangeType};
use crate::record::{
    DataTypeDefinition, ModellingRule, NodeClass, NodeRecord, OpcReference, ReferenceId,
    ReferenceKey, ReferenceRecord, Value,
};
use crate::settings::ModelSettings;
use crate::standard::{self, ids};

/// In-memory OPC UA address space.
///
/// Nodes live in an arena keyed by [`NodeId`]; references live once each in a
/// separate graph with forward and inverse indices. Derived views (children,
/// parents, type definitions) are always computed from the graph.
#[derive(Debug, Clone)]
pub struct AddressSpace {
    pub(crate) namespaces: NamespaceTable,
    pub(crate) nodes: BTreeMap<NodeId, NodeRecord>,
    pub(crate) graph: ReferenceGraph,
    pub(crate) settings: ModelSettings,
    /// Bumped once per committed mutation.
    pub(crate) generation: u64,
    /// Last generation that structurally changed each node.
    pub(crate) touched: FxHashMap<NodeId, u64>,
    /// Generation of the last classification pass.
    pub(crate) classified_at: Option<u64>,
    pub(crate) classes: ClassCache,
    pub(crate) journal: Vec<NamespaceChange>,
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// Class-specific part of a node creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeClassSpec {
    /// Object instance.
    Object {
        /// Type definition; defaults to `BaseObjectType`.
        type_definition: Option<NodeId>,
        /// `EventNotifier` bits.
        event_notifier: u8,
    },
    /// Variable instance.
    Variable {
        /// Required data type.
        data_type: Option<NodeId>,
        /// Required value rank.
        value_rank: Option<i32>,
        /// Array dimensions.
        array_dimensions: Vec<u32>,
        /// Initial value.
        value: Option<Value>,
        /// Type definition; defaults to `PropertyType` under `HasProperty`,
        /// otherwise `BaseDataVariableType`.
        type_definition: Option<NodeId>,
        /// `AccessLevel` bits.
        access_level: u8,
    },
    /// Method.
    Method {
        /// `Executable`.
        executable: bool,
    },
    /// Object type.
    ObjectType {
        /// `IsAbstract`.
        is_abstract: bool,
    },
    /// Variable type.
    VariableType {
        /// Data type; defaults to the supertype's.
        data_type: Option<NodeId>,
        /// Value rank; defaults to the supertype's.
        value_rank: Option<i32>,
        /// `IsAbstract`.
        is_abstract: bool,
    },
    /// Reference type.
    ReferenceType {
        /// `IsAbstract`.
        is_abstract: bool,
        /// `Symmetric`.
        symmetric: bool,
        /// `InverseName`.
        inverse_name: Option<LocalizedText>,
    },
    /// Data type.
    DataType {
        /// `IsAbstract`.
        is_abstract: bool,
        /// Structure or enumeration definition.
        definition: Option<DataTypeDefinition>,
    },
    /// View.
    View {
        /// `ContainsNoLoops`.
        contains_no_loops: bool,
        /// `EventNotifier` bits.
        event_notifier: u8,
    },
}

impl NodeClassSpec {
    /// Node class this spec creates.
    pub fn node_class(&self) -> NodeClass {
        match self {
            Self::Object { .. } => NodeClass::Object,
            Self::Variable { .. } => NodeClass::Variable,
            Self::Method { .. } => NodeClass::Method,
            Self::ObjectType { .. } => NodeClass::ObjectType,
            Self::VariableType { .. } => NodeClass::VariableType,
            Self::ReferenceType { .. } => NodeClass::ReferenceType,
            Self::DataType { .. } => NodeClass::DataType,
            Self::View { .. } => NodeClass::View,
        }
    }
}

/// Request to create one node under a parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddNodeParams {
    /// Browse name text; qualified with `namespace_index`.
    pub browse_name: String,
    /// Namespace the new node belongs to.
    pub namespace_index: u16,
    /// Explicit NodeId; allocated numerically when absent.
    pub node_id: Option<NodeId>,
    /// Hierarchical reference from the parent; defaulted per class when absent.
    pub reference_type: Option<NodeId>,
    /// Display name; defaults to the browse name.
    pub display_name: Option<LocalizedText>,
    /// Description.
    pub description: Option<LocalizedText>,
    /// Modelling rule stored on the parent reference.
    pub modelling_rule: ModellingRule,
    /// Class-specific attributes.
    pub class: NodeClassSpec,
}

impl AddNodeParams {
    fn with_class(browse_name: impl Into<String>, namespace_index: u16, class: NodeClassSpec) -> Self {
        Self {
            browse_name: browse_name.into(),
            namespace_index,
            node_id: None,
            reference_type: None,
            display_name: None,
            description: None,
            modelling_rule: ModellingRule::None,
            class,
        }
    }

    /// Object of the default type.
    pub fn object(browse_name: impl Into<String>, namespace_index: u16) -> Self {
        Self::with_class(
            browse_name,
            namespace_index,
            NodeClassSpec::Object {
                type_definition: None,
                event_notifier: 0,
            },
        )
    }

    /// Scalar or array variable.
    pub fn variable(
        browse_name: impl Into<String>,
        namespace_index: u16,
        data_type: NodeId,
        value_rank: i32,
    ) -> Self {
        Self::with_class(
            browse_name,
            namespace_index,
            NodeClassSpec::Variable {
                data_type: Some(data_type),
                value_rank: Some(value_rank),
                array_dimensions: Vec::new(),
                value: None,
                type_definition: None,
                access_level: 1,
            },
        )
    }

    /// Scalar property (`HasProperty`, `PropertyType`).
    pub fn property(browse_name: impl Into<String>, namespace_index: u16, data_type: NodeId) -> Self {
        Self::variable(browse_name, namespace_index, data_type, -1)
            .with_reference_type(ids::HAS_PROPERTY)
    }

    /// Executable method.
    pub fn method(browse_name: impl Into<String>, namespace_index: u16) -> Self {
        Self::with_class(
            browse_name,
            namespace_index,
            NodeClassSpec::Method { executable: true },
        )
    }

    /// Concrete object type.
    pub fn object_type(browse_name: impl Into<String>, namespace_index: u16) -> Self {
        Self::with_class(
            browse_name,
            namespace_index,
            NodeClassSpec::ObjectType { is_abstract: false },
        )
    }

    /// Variable type inheriting data type and rank from its supertype.
    pub fn variable_type(browse_name: impl Into<String>, namespace_index: u16) -> Self {
        Self::with_class(
            browse_name,
            namespace_index,
            NodeClassSpec::VariableType {
                data_type: None,
                value_rank: None,
                is_abstract: false,
            },
        )
    }

    /// Concrete, asymmetric reference type.
    pub fn reference_type(browse_name: impl Into<String>, namespace_index: u16) -> Self {
        Self::with_class(
            browse_name,
            namespace_index,
            NodeClassSpec::ReferenceType {
                is_abstract: false,
                symmetric: false,
                inverse_name: None,
            },
        )
    }

    /// Data type without a definition.
    pub fn data_type(browse_name: impl Into<String>, namespace_index: u16) -> Self {
        Self::with_class(
            browse_name,
            namespace_index,
            NodeClassSpec::DataType {
                is_abstract: false,
                definition: None,
            },
        )
    }

    /// View.
    pub fn view(browse_name: impl Into<String>, namespace_index: u16) -> Self {
        Self::with_class(
            browse_name,
            namespace_index,
            NodeClassSpec::View {
                contains_no_loops: false,
                event_notifier: 0,
            },
        )
    }

    /// Sets an explicit NodeId.
    pub fn with_node_id(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    /// Sets the parent reference type.
    pub fn with_reference_type(mut self, reference_type: NodeId) -> Self {
        self.reference_type = Some(reference_type);
        self
    }

    /// Sets the modelling rule on the parent reference.
    pub fn with_modelling_rule(mut self, rule: ModellingRule) -> Self {
        self.modelling_rule = rule;
        self
    }

    /// Sets the type definition of an Object or Variable.
    pub fn with_type_definition(mut self, type_definition: NodeId) -> Self {
        match &mut self.class {
            NodeClassSpec::Object {
                type_definition: t, ..
            }
            | NodeClassSpec::Variable {
                type_definition: t, ..
            } => *t = Some(type_definition),
            _ => {}
        }
        self
    }
}

/// Nodes and references removed by one delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    /// Removed nodes in id order.
    pub removed_nodes: Vec<NodeId>,
    /// Removed references as forward triples, in id order.
    pub removed_references: Vec<ReferenceKey>,
}

impl AddressSpace {
    /// Address space holding only namespace zero, with default settings.
    pub fn new() -> Self {
        Self::with_settings(ModelSettings::default())
    }

    /// Address space holding only namespace zero.
    pub fn with_settings(settings: ModelSettings) -> Self {
        let mut space = Self {
            namespaces: NamespaceTable::new(),
            nodes: BTreeMap::new(),
            graph: ReferenceGraph::default(),
            settings,
            generation: 0,
            touched: FxHashMap::default(),
            classified_at: None,
            classes: ClassCache::default(),
            journal: Vec::new(),
        };
        let (nodes, refs) = standard::namespace_zero();
        for node in nodes {
            space.nodes.insert(node.node_id.clone(), node);
        }
        for reference in refs {
            space.graph.insert(reference);
        }
        space
    }

    /// Active settings.
    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    /// Namespace table.
    pub fn namespaces(&self) -> &NamespaceTable {
        &self.namespaces
    }

    /// Mutation counter; increases with every committed change.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of nodes, namespace zero included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of stored references.
    pub fn reference_count(&self) -> usize {
        self.graph.len()
    }

    /// All node records in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    /// All references in creation order, forward direction.
    pub fn references(&self) -> impl Iterator<Item = &ReferenceRecord> {
        self.graph.iter()
    }

    /// Whether nodes in namespace `index` may be edited.
    pub fn writable(&self, index: u16) -> bool {
        index != 0 && self.namespaces.get(index).is_some_and(|ns| !ns.is_locked)
    }

    pub(crate) fn record_ref(&self, id: &NodeId) -> Result<&NodeRecord, GraphError> {
        self.nodes
            .get(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))
    }

    pub(crate) fn record_mut(&mut self, id: &NodeId) -> Result<&mut NodeRecord, GraphError> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))
    }

    /// Fails unless nodes in `index` may be created, edited, or deleted.
    pub(crate) fn ensure_writable(&self, index: u16) -> Result<(), GraphError> {
        if index == 0 {
            return Err(GraphError::NamespaceZeroImmutable);
        }
        self.ensure_unlocked(index)
    }

    /// Fails if `index` is unknown or locked; namespace zero passes.
    pub(crate) fn ensure_unlocked(&self, index: u16) -> Result<(), GraphError> {
        let ns = self
            .namespaces
            .get(index)
            .ok_or(GraphError::NamespaceIndexNotFound(index))?;
        if ns.is_locked {
            return Err(GraphError::NamespaceLocked(ns.uri.clone()));
        }
        Ok(())
    }

    /// Checks that the reference `from -> to` may be added or removed.
    ///
    /// A hierarchical reference belongs to its child, other references to
    /// their source. The owner must be writable; the other endpoint must not
    /// sit in a locked namespace. Endpoints in `doomed` are being deleted and
    /// were checked already.
    pub(crate) fn ensure_reference_editable(
        &self,
        from: &NodeId,
        to: &NodeId,
        hierarchical: bool,
        doomed: &BTreeSet<NodeId>,
    ) -> Result<(), GraphError> {
        let (owner, other) = if hierarchical { (to, from) } else { (from, to) };
        if !doomed.contains(owner) {
            self.ensure_writable(owner.namespace)?;
        }
        if !doomed.contains(other) {
            self.ensure_unlocked(other.namespace)?;
        }
        Ok(())
    }

    /// Marks `id` as structurally changed in the current generation.
    pub(crate) fn touch(&mut self, id: &NodeId) {
        self.touched.insert(id.clone(), self.generation);
    }

    /// Starts a new generation; call before touching nodes.
    pub(crate) fn bump(&mut self) {
        self.generation += 1;
    }

    pub(crate) fn record(&mut self, change_type: NamespaceChangeType, message: impl Into<String>) {
        self.journal.push(NamespaceChange::new(change_type, message));
    }

    /// Drains events recorded since the last call.
    pub(crate) fn take_journal(&mut self) -> Vec<NamespaceChange> {
        std::mem::take(&mut self.journal)
    }

    /// Runs `f` as one all-or-nothing step.
    ///
    /// On error the space is restored to its state before the call. On success
    /// the events recorded by `f` collapse into the single event returned by
    /// `summary`. Costs one clone of the whole space.
    pub(crate) fn atomically<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, GraphError>,
        summary: impl FnOnce(&T) -> NamespaceChange,
    ) -> Result<T, GraphError> {
        let backup = self.clone();
        let mark = self.journal.len();
        match f(self) {
            Ok(value) => {
                self.journal.truncate(mark);
                self.journal.push(summary(&value));
                Ok(value)
            }
            Err(err) => {
                *self = backup;
                Err(err)
            }
        }
    }

    /// Reference types reachable from `HierarchicalReferences` by `HasSubtype`.
    ///
    /// Computed per call; bounded by the number of reference-type nodes.
    pub(crate) fn hierarchical_types(&self) -> FxHashSet<NodeId> {
        let mut out = FxHashSet::default();
        let mut queue = VecDeque::from([ids::HIERARCHICAL_REFERENCES]);
        while let Some(ty) = queue.pop_front() {
            if !out.insert(ty.clone()) {
                continue;
            }
            for r in self.graph.outgoing(&ty) {
                if r.reference_type == ids::HAS_SUBTYPE {
                    queue.push_back(r.target.clone());
                }
            }
        }
        out
    }

    /// Whether `reference_type` is `HierarchicalReferences` or a subtype of it.
    pub fn is_hierarchical(&self, reference_type: &NodeId) -> bool {
        self.is_subtype_of(reference_type, &ids::HIERARCHICAL_REFERENCES)
    }

    fn allocate_id(&mut self, index: u16) -> Result<NodeId, GraphError> {
        let ns = self
            .namespaces
            .get_mut(index)
            .ok_or(GraphError::NamespaceIndexNotFound(index))?;
        let mut candidate = ns.next_numeric.max(self.settings.first_numeric_id);
        while self.nodes.contains_key(&NodeId::numeric(index, candidate)) {
            candidate = candidate
                .checked_add(1)
                .ok_or_else(|| GraphError::invalid(format!("numeric ids exhausted in {}", ns.uri)))?;
        }
        ns.next_numeric = candidate.saturating_add(1);
        Ok(NodeId::numeric(index, candidate))
    }

    fn default_reference_type(&self, parent: &NodeRecord, class: &NodeClassSpec) -> NodeId {
        match class {
            NodeClassSpec::ObjectType { .. }
            | NodeClassSpec::VariableType { .. }
            | NodeClassSpec::ReferenceType { .. }
            | NodeClassSpec::DataType { .. } => ids::HAS_SUBTYPE,
            NodeClassSpec::Variable { .. } | NodeClassSpec::Method { .. } => ids::HAS_COMPONENT,
            NodeClassSpec::View { .. } => ids::ORGANIZES,
            NodeClassSpec::Object { .. } => {
                let folder = parent.node_class == NodeClass::Object
                    && self
                        .type_definition_of(&parent.node_id)
                        .is_some_and(|t| self.is_subtype_of(&t, &ids::FOLDER_TYPE));
                if folder || parent.node_class == NodeClass::View {
                    ids::ORGANIZES
                } else {
                    ids::HAS_COMPONENT
                }
            }
        }
    }

    /// Validates that `id` names a concrete node of class `class`.
    fn require_class(&self, id: &NodeId, class: NodeClass, what: &str) -> Result<(), GraphError> {
        let record = self.record_ref(id)?;
        if record.node_class != class {
            return Err(GraphError::invalid(format!(
                "{what} {id} is a {:?}, expected {class:?}",
                record.node_class
            )));
        }
        Ok(())
    }

    /// Validates a reference type for use in a new reference.
    pub(crate) fn require_reference_type(&self, reference_type: &NodeId) -> Result<(), GraphError> {
        self.require_class(reference_type, NodeClass::ReferenceType, "reference type")?;
        if self.record_ref(reference_type)?.is_abstract {
            return Err(GraphError::invalid(format!(
                "reference type {reference_type} is abstract"
            )));
        }
        Ok(())
    }

    /// Creates a node and attaches it under `parent`.
    ///
    /// Objects and variables also get a `HasTypeDefinition` reference. Type
    /// nodes must hang below a type of the same class via `HasSubtype`.
    pub fn create_node(&mut self, parent: &NodeId, params: AddNodeParams) -> Result<NodeId, GraphError> {
        let parent_record = self.record_ref(parent)?;
        let class = params.class.node_class();
        let index = params.namespace_index;
        if self.namespaces.get(index).is_none() {
            return Err(GraphError::NamespaceIndexNotFound(index));
        }
        self.ensure_writable(index)?;
        self.ensure_unlocked(parent.namespace)?;
        if params.browse_name.trim().is_empty() {
            return Err(GraphError::invalid("browse name must not be empty"));
        }
        if let Some(limit) = self.settings.max_node_limit {
            if self.nodes.len() >= limit {
                return Err(GraphError::invalid(format!("node limit of {limit} reached")));
            }
        }

        let reference_type = params
            .reference_type
            .clone()
            .unwrap_or_else(|| self.default_reference_type(parent_record, &params.class));
        self.require_reference_type(&reference_type)?;
        if !self.is_hierarchical(&reference_type) {
            return Err(GraphError::invalid(format!(
                "{reference_type} is not hierarchical and cannot attach a child"
            )));
        }
        let via_subtype = reference_type == ids::HAS_SUBTYPE;
        if class.is_type() {
            if !via_subtype || parent_record.node_class != class {
                return Err(GraphError::invalid(format!(
                    "a {class:?} must be a HasSubtype child of another {class:?}"
                )));
            }
        } else if via_subtype {
            return Err(GraphError::invalid("HasSubtype only links type nodes"));
        }

        let node_id = match &params.node_id {
            Some(id) => {
                if id.is_null() {
                    return Err(GraphError::invalid("node id must not be null"));
                }
                if id.namespace != index {
                    return Err(GraphError::invalid(format!(
                        "node id {id} is outside namespace {index}"
                    )));
                }
                if self.nodes.contains_key(id) {
                    return Err(GraphError::NodeExists(id.clone()));
                }
                id.clone()
            }
            None => self.allocate_id(index)?,
        };

        let mut record = NodeRecord::new(
            node_id.clone(),
            class,
            QualifiedName::new(index, params.browse_name.trim()),
        );
        record.display_name = params.display_name.unwrap_or_else(|| LocalizedText {
            locale: self.settings.default_locale.clone(),
            text: params.browse_name.trim().to_owned(),
        });
        record.description = params.description;

        let is_property = self.is_subtype_of(&reference_type, &ids::HAS_PROPERTY);
        let type_definition = self.fill_class_attributes(&mut record, params.class, parent, is_property)?;

        info!(node = %node_id, parent = %parent, class = ?class, "create node");
        self.bump();
        self.nodes.insert(node_id.clone(), record);
        let mut link = ReferenceRecord::new(parent.clone(), node_id.clone(), reference_type);
        link.modelling_rule = params.modelling_rule;
        self.graph.insert(link);
        if let Some(type_definition) = type_definition {
            self.graph.insert(ReferenceRecord::new(
                node_id.clone(),
                type_definition,
                ids::HAS_TYPE_DEFINITION,
            ));
        }
        if via_subtype {
            self.classes.clear();
        }
        self.touch(&node_id);
        self.touch(parent);
        self.record(
            NamespaceChangeType::Added,
            format!("added {class:?} {node_id} under {parent}"),
        );
        Ok(node_id)
    }

    /// Copies class-specific attributes into `record`; returns the type
    /// definition to link, if the class carries one.
    fn fill_class_attributes(
        &self,
        record: &mut NodeRecord,
        class: NodeClassSpec,
        parent: &NodeId,
        is_property: bool,
    ) -> Result<Option<NodeId>, GraphError> {
        match class {
            NodeClassSpec::Object {
                type_definition,
                event_notifier,
            } => {
                let td = type_definition.unwrap_or(ids::BASE_OBJECT_TYPE);
                self.require_class(&td, NodeClass::ObjectType, "type definition")?;
                if self.record_ref(&td)?.is_abstract {
                    return Err(GraphError::invalid(format!("object type {td} is abstract")));
                }
                record.event_notifier = event_notifier;
                Ok(Some(td))
            }
            NodeClassSpec::Variable {
                data_type,
                value_rank,
                array_dimensions,
                value,
                type_definition,
                access_level,
            } => {
                let data_type =
                    data_type.ok_or_else(|| GraphError::invalid("variable requires a data type"))?;
                let value_rank =
                    value_rank.ok_or_else(|| GraphError::invalid("variable requires a value rank"))?;
                self.require_class(&data_type, NodeClass::DataType, "data type")?;
                let td = type_definition.unwrap_or(if is_property {
                    ids::PROPERTY_TYPE
                } else {
                    ids::BASE_DATA_VARIABLE_TYPE
                });
                self.require_class(&td, NodeClass::VariableType, "type definition")?;
                record.data_type = Some(data_type);
                record.value_rank = Some(value_rank);
                record.array_dimensions = array_dimensions;
                record.value = value;
                record.access_level = access_level;
                Ok(Some(td))
            }
            NodeClassSpec::Method { executable } => {
                record.executable = executable;
                Ok(None)
            }
            NodeClassSpec::ObjectType { is_abstract } => {
                record.is_abstract = is_abstract;
                Ok(None)
            }
            NodeClassSpec::VariableType {
                data_type,
                value_rank,
                is_abstract,
            } => {
                let supertype = self.record_ref(parent)?;
                let data_type = data_type
                    .or_else(|| supertype.data_type.clone())
                    .unwrap_or(ids::BASE_DATA_TYPE);
                self.require_class(&data_type, NodeClass::DataType, "data type")?;
                record.data_type = Some(data_type);
                record.value_rank = value_rank.or(supertype.value_rank).or(Some(-2));
                record.is_abstract = is_abstract;
                Ok(None)
            }
            NodeClassSpec::ReferenceType {
                is_abstract,
                symmetric,
                inverse_name,
            } => {
                record.is_abstract = is_abstract;
                record.symmetric = symmetric;
                record.inverse_name = inverse_name;
                Ok(None)
            }
            NodeClassSpec::DataType {
                is_abstract,
                definition,
            } => {
                if let Some(DataTypeDefinition::Structure { fields, .. }) = &definition {
                    for field in fields {
                        self.require_class(&field.data_type, NodeClass::DataType, "field data type")?;
                    }
                }
                record.is_abstract = is_abstract;
                record.definition = definition;
                Ok(None)
            }
            NodeClassSpec::View {
                contains_no_loops,
                event_notifier,
            } => {
                record.contains_no_loops = contains_no_loops;
                record.event_notifier = event_notifier;
                Ok(None)
            }
        }
    }

    /// Adds a reference between existing nodes.
    ///
    /// `is_forward = false` stores the reference as `target -> source`.
    /// Hierarchical references fail with `CycleDetected` when the child is
    /// already an ancestor of the parent; a node may reference itself.
    pub fn add_reference(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        reference_type: &NodeId,
        is_forward: bool,
    ) -> Result<OpcReference, GraphError> {
        self.add_reference_with_rule(source, target, reference_type, is_forward, ModellingRule::None)
    }

    /// [`AddressSpace::add_reference`] carrying a modelling rule.
    pub fn add_reference_with_rule(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        reference_type: &NodeId,
        is_forward: bool,
        modelling_rule: ModellingRule,
    ) -> Result<OpcReference, GraphError> {
        self.record_ref(source)?;
        self.record_ref(target)?;
        self.require_reference_type(reference_type)?;
        let (from, to) = if is_forward {
            (source, target)
        } else {
            (target, source)
        };
        let mut record = ReferenceRecord::new(from.clone(), to.clone(), reference_type.clone());
        record.modelling_rule = modelling_rule;
        if self.graph.contains(&record.key()) {
            return Err(GraphError::DuplicateReference {
                from: from.clone(),
                to: to.clone(),
                reference_type: reference_type.clone(),
            });
        }
        let hierarchical = self.is_hierarchical(reference_type);
        self.ensure_reference_editable(from, to, hierarchical, &BTreeSet::new())?;
        if hierarchical && from != to && self.reaches_upward(from, to) {
            return Err(GraphError::CycleDetected {
                parent: from.clone(),
                child: to.clone(),
            });
        }

        debug!(from = %from, to = %to, reference_type = %reference_type, "add reference");
        self.bump();
        let id = self.graph.insert(record);
        if Self::affects_classes(reference_type) {
            self.classes.clear();
        }
        self.touch(from);
        self.touch(to);
        self.record(
            NamespaceChangeType::Modified,
            format!("added reference {from} -[{reference_type}]-> {to}"),
        );
        let stored = self
            .graph
            .get(id)
            .ok_or_else(|| GraphError::invalid("reference vanished after insert"))?;
        Ok(stored.oriented(source))
    }

    /// Removes the reference `source -[type]-> target`, trying the reverse
    /// direction when no forward match exists.
    ///
    /// Removing the last hierarchical reference of a node deletes it, and the
    /// deletion cascades to every node left without a hierarchical parent.
    pub fn remove_reference(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        reference_type: &NodeId,
    ) -> Result<DeleteReport, GraphError> {
        let forward = ReferenceKey {
            source: source.clone(),
            target: target.clone(),
            reference_type: reference_type.clone(),
        };
        let backward = ReferenceKey {
            source: target.clone(),
            target: source.clone(),
            reference_type: reference_type.clone(),
        };
        let id = self
            .graph
            .find(&forward)
            .or_else(|| self.graph.find(&backward))
            .ok_or_else(|| GraphError::ReferenceNotFound {
                from: source.clone(),
                to: target.clone(),
                reference_type: reference_type.clone(),
            })?;
        let record = self
            .graph
            .get(id)
            .cloned()
            .ok_or_else(|| GraphError::invalid("reference index out of sync"))?;

        let hierarchical = self.hierarchical_types();
        let candidates = if hierarchical.contains(&record.reference_type) {
            vec![record.target.clone()]
        } else {
            Vec::new()
        };
        let doomed = self.doomed_closure(Vec::new(), candidates, Some(id), &hierarchical);
        let report = self.apply_delete(&doomed, Some(id), &hierarchical)?;
        let message = if report.removed_nodes.is_empty() {
            format!("removed reference {} -[{}]-> {}", record.source, record.reference_type, record.target)
        } else {
            format!(
                "removed reference {} -[{}]-> {} and {} orphaned node(s)",
                record.source,
                record.reference_type,
                record.target,
                report.removed_nodes.len()
            )
        };
        let change = if report.removed_nodes.is_empty() {
            NamespaceChangeType::Modified
        } else {
            NamespaceChangeType::Removed
        };
        self.record(change, message);
        Ok(report)
    }

    /// Deletes `id`, every reference touching it, and every node that is
    /// left without a hierarchical parent as a result (transitively).
    ///
    /// The doomed set is a fixed point over the reference graph, O(total
    /// references) in the worst case.
    pub fn delete_node(&mut self, id: &NodeId) -> Result<DeleteReport, GraphError> {
        self.record_ref(id)?;
        let hierarchical = self.hierarchical_types();
        let doomed = self.doomed_closure(vec![id.clone()], Vec::new(), None, &hierarchical);
        let report = self.apply_delete(&doomed, None, &hierarchical)?;
        info!(node = %id, removed = report.removed_nodes.len(), "delete node");
        self.record(
            NamespaceChangeType::Removed,
            format!("removed {id} and {} dependent node(s)", report.removed_nodes.len().saturating_sub(1)),
        );
        Ok(report)
    }

    /// Computes the set of nodes that die when `seeds` are deleted and the
    /// reference `dropped` is gone. `candidates` lost a parent and are
    /// rechecked even if no seed is their parent.
    fn doomed_closure(
        &self,
        seeds: Vec<NodeId>,
        candidates: Vec<NodeId>,
        dropped: Option<ReferenceId>,
        hierarchical: &FxHashSet<NodeId>,
    ) -> BTreeSet<NodeId> {
        let mut doomed: BTreeSet<NodeId> = seeds.iter().cloned().collect();
        let mut frontier = seeds;
        let mut check = candidates;
        loop {
            while let Some(node) = frontier.pop() {
                for r in self.graph.outgoing(&node) {
                    if Some(r.id) != dropped
                        && r.target != node
                        && hierarchical.contains(&r.reference_type)
                        && !doomed.contains(&r.target)
                    {
                        check.push(r.target.clone());
                    }
                }
            }
            while let Some(node) = check.pop() {
                if doomed.contains(&node) {
                    continue;
                }
                let anchored = self.graph.incoming(&node).any(|r| {
                    Some(r.id) != dropped
                        && r.source != node
                        && hierarchical.contains(&r.reference_type)
                        && !doomed.contains(&r.source)
                });
                if !anchored {
                    doomed.insert(node.clone());
                    frontier.push(node);
                }
            }
            if frontier.is_empty() {
                break;
            }
        }
        doomed
    }

    /// Validates and applies the removal of `doomed` plus `dropped`.
    fn apply_delete(
        &mut self,
        doomed: &BTreeSet<NodeId>,
        dropped: Option<ReferenceId>,
        hierarchical: &FxHashSet<NodeId>,
    ) -> Result<DeleteReport, GraphError> {
        for node in doomed {
            self.ensure_writable(node.namespace)?;
        }
        let mut ref_ids: Vec<ReferenceId> = dropped.into_iter().collect();
        for node in doomed {
            ref_ids.extend(self.graph.incident(node));
        }
        ref_ids.sort_unstable();
        ref_ids.dedup();
        let mut class_change = !doomed.is_empty();
        for rid in &ref_ids {
            if let Some(r) = self.graph.get(*rid) {
                let is_h = hierarchical.contains(&r.reference_type);
                self.ensure_reference_editable(&r.source, &r.target, is_h, doomed)?;
                class_change |= Self::affects_classes(&r.reference_type);
            }
        }
        if !doomed.is_empty() {
            self.ensure_not_in_use(doomed)?;
        }

        self.bump();
        let mut report = DeleteReport::default();
        for rid in ref_ids {
            if let Some(r) = self.graph.remove(rid) {
                for end in [&r.source, &r.target] {
                    if !doomed.contains(end) {
                        self.touched.insert(end.clone(), self.generation);
                    }
                }
                report.removed_references.push(r.key());
            }
        }
        for node in doomed {
            if let Some(record) = self.nodes.remove(node) {
                self.touched.remove(node);
                if !record.mapping.is_empty() {
                    self.refresh_mapping_states(&record.mapping);
                }
                report.removed_nodes.push(record.node_id);
            }
        }
        if class_change {
            self.classes.clear();
        }
        Ok(report)
    }

    /// Rejects deleting types, data types, or reference types that surviving
    /// nodes still depend on.
    fn ensure_not_in_use(&self, doomed: &BTreeSet<NodeId>) -> Result<(), GraphError> {
        for r in self.graph.iter() {
            if doomed.contains(&r.reference_type)
                && !(doomed.contains(&r.source) || doomed.contains(&r.target))
            {
                return Err(GraphError::InUse {
                    node: r.reference_type.clone(),
                    used_by: format!("{} -> {}", r.source, r.target),
                });
            }
            if r.reference_type == ids::HAS_TYPE_DEFINITION
                && doomed.contains(&r.target)
                && !doomed.contains(&r.source)
            {
                return Err(GraphError::InUse {
                    node: r.target.clone(),
                    used_by: r.source.to_string(),
                });
            }
        }
        for record in self.nodes.values() {
            if doomed.contains(&record.node_id) {
                continue;
            }
            if let Some(dt) = record.data_type.as_ref().filter(|dt| doomed.contains(*dt)) {
                return Err(GraphError::InUse {
                    node: dt.clone(),
                    used_by: record.node_id.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Moves `node` from `from` to `to` as one step.
    ///
    /// The hierarchical reference `from -> node` is replaced by one of the
    /// same type and modelling rule from `to`. Nothing changes if any check
    /// fails. Moving onto the current parent is a no-op.
    pub fn move_node(&mut self, node: &NodeId, from: &NodeId, to: &NodeId) -> Result<(), GraphError> {
        self.record_ref(node)?;
        self.record_ref(from)?;
        self.record_ref(to)?;
        if from == to {
            return Ok(());
        }
        let hierarchical = self.hierarchical_types();
        let old = self
            .graph
            .outgoing(from)
            .find(|r| &r.target == node && hierarchical.contains(&r.reference_type))
            .cloned()
            .ok_or_else(|| GraphError::ReferenceNotFound {
                from: from.clone(),
                to: node.clone(),
                reference_type: ids::HIERARCHICAL_REFERENCES,
            })?;
        if to == node || self.reaches_upward(to, node) {
            return Err(GraphError::CycleDetected {
                parent: to.clone(),
                child: node.clone(),
            });
        }
        let none = BTreeSet::new();
        self.ensure_reference_editable(from, node, true, &none)?;
        self.ensure_reference_editable(to, node, true, &none)?;
        let mut moved = ReferenceRecord::new(to.clone(), node.clone(), old.reference_type.clone());
        moved.modelling_rule = old.modelling_rule;
        if self.graph.contains(&moved.key()) {
            return Err(GraphError::DuplicateReference {
                from: to.clone(),
                to: node.clone(),
                reference_type: old.reference_type,
            });
        }

        info!(node = %node, from = %from, to = %to, "move node");
        self.bump();
        self.graph.remove(old.id);
        self.graph.insert(moved);
        if Self::affects_classes(&old.reference_type) {
            self.classes.clear();
        }
        self.touch(node);
        self.touch(from);
        self.touch(to);
        self.record(
            NamespaceChangeType::Modified,
            format!("moved {node} from {from} to {to}"),
        );
        Ok(())
    }

    /// Reference types whose edits change special node classes.
    pub(crate) fn affects_classes(reference_type: &NodeId) -> bool {
        *reference_type == ids::HAS_SUBTYPE
            || *reference_type == ids::HAS_TYPE_DEFINITION
            || *reference_type == ids::HAS_INTERFACE
    }

    /// Recomputes the mapping state of every node carrying `mapping`.
    pub(crate) fn refresh_mapping_states(&mut self, mapping: &str) {
        let holders: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.mapping == mapping)
            .map(|n| n.node_id.clone())
            .collect();
        let state = if holders.len() > 1 {
            crate::record::MappingState::Conflict
        } else {
            crate::record::MappingState::Mapped
        };
        for id in holders {
            if let Some(n) = self.nodes.get_mut(&id) {
                n.mapping_state = state;
            }
        }
    }
}
