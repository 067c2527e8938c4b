// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Graph record types: nodes, references, and their attribute values.
use serde::{Deserialize, Serialize};

use crate::ident::{LocalizedText, NodeId, QualifiedName};
use crate::standard::ids;

/// OPC UA node class (values are the standard bit-mask values).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum NodeClass {
    /// Object instance.
    Object = 1,
    /// Variable instance.
    Variable = 2,
    /// Method.
    Method = 4,
    /// Object type.
    ObjectType = 8,
    /// Variable type.
    VariableType = 16,
    /// Reference type.
    ReferenceType = 32,
    /// Data type.
    DataType = 64,
    /// View.
    View = 128,
}

impl NodeClass {
    /// Returns `true` for the four type classes.
    pub fn is_type(self) -> bool {
        matches!(
            self,
            Self::ObjectType | Self::VariableType | Self::ReferenceType | Self::DataType
        )
    }

    /// Returns `true` for classes that can carry a `HasTypeDefinition`.
    pub fn is_typed_instance(self) -> bool {
        matches!(self, Self::Object | Self::Variable)
    }
}

/// Whether a node is bound to an external (PLC) symbol.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum MappingState {
    /// No mapping set.
    #[default]
    Unmapped,
    /// Mapping set and unique.
    Mapped,
    /// Another node carries the same mapping.
    Conflict,
}

/// Modelling rule attached to an aggregating reference.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum ModellingRule {
    /// No rule (plain instance).
    #[default]
    None,
    /// Instances must contain the declaration.
    Mandatory,
    /// Instances may contain the declaration.
    Optional,
    /// Instances contain one or more instances of the placeholder.
    MandatoryPlaceholder,
    /// Instances contain zero or more instances of the placeholder.
    OptionalPlaceholder,
    /// Array items are exposed as individual variables.
    ExposesItsArray,
}

impl ModellingRule {
    /// Returns the namespace-zero object id of this rule, if any.
    pub fn node_id(self) -> Option<NodeId> {
        match self {
            Self::None => None,
            Self::Mandatory => Some(ids::MODELLING_RULE_MANDATORY),
            Self::Optional => Some(ids::MODELLING_RULE_OPTIONAL),
            Self::MandatoryPlaceholder => Some(ids::MODELLING_RULE_MANDATORY_PLACEHOLDER),
            Self::OptionalPlaceholder => Some(ids::MODELLING_RULE_OPTIONAL_PLACEHOLDER),
            Self::ExposesItsArray => Some(ids::MODELLING_RULE_EXPOSES_ITS_ARRAY),
        }
    }

    /// Returns `true` for the two placeholder rules.
    pub fn is_placeholder(self) -> bool {
        matches!(self, Self::MandatoryPlaceholder | Self::OptionalPlaceholder)
    }
}

/// One method argument (`Argument` structure).
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct MethodArgument {
    /// Argument name, unique within one argument list.
    pub name: String,
    /// Data type of the argument.
    pub data_type: NodeId,
    /// Value rank (-1 scalar, 1 one-dimensional array, ...).
    pub value_rank: i32,
    /// Array dimensions; empty when unspecified.
    pub array_dimensions: Vec<u32>,
    /// Optional description.
    pub description: Option<LocalizedText>,
}

impl MethodArgument {
    /// Scalar argument of the given data type.
    pub fn scalar(name: impl Into<String>, data_type: NodeId) -> Self {
        Self {
            name: name.into(),
            data_type,
            value_rank: -1,
            array_dimensions: Vec::new(),
            description: None,
        }
    }
}

/// One field of a structured data type definition.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct StructureField {
    /// Field name, unique within the structure.
    pub name: String,
    /// Field data type.
    pub data_type: NodeId,
    /// Value rank of the field.
    pub value_rank: i32,
    /// Array dimensions; empty when unspecified.
    pub array_dimensions: Vec<u32>,
    /// Whether the field may be absent in an encoded value.
    pub is_optional: bool,
    /// Whether subtypes of `data_type` are allowed.
    pub allow_sub_types: bool,
    /// Maximum string length (0 = unlimited).
    pub max_string_length: u32,
    /// Optional description.
    pub description: Option<LocalizedText>,
}

impl StructureField {
    /// Mandatory scalar field.
    pub fn new(name: impl Into<String>, data_type: NodeId) -> Self {
        Self {
            name: name.into(),
            data_type,
            value_rank: -1,
            array_dimensions: Vec::new(),
            is_optional: false,
            allow_sub_types: false,
            max_string_length: 0,
            description: None,
        }
    }
}

/// One value of an enumeration data type.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct EnumField {
    /// Integer value.
    pub value: i64,
    /// Symbolic name.
    pub name: String,
    /// Optional description.
    pub description: Option<LocalizedText>,
}

/// `DataTypeDefinition` attribute of a DataType node.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum DataTypeDefinition {
    /// Structure or union fields.
    Structure {
        /// Fields in declaration order.
        fields: Vec<StructureField>,
        /// Whether only one field is present at a time.
        is_union: bool,
    },
    /// Enumeration values.
    Enumeration {
        /// Values in declaration order.
        fields: Vec<EnumField>,
    },
}

/// Value attribute of a variable or variable type.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Value {
    /// Boolean.
    Boolean(bool),
    /// Any signed integer.
    Int64(i64),
    /// Any unsigned integer.
    UInt64(u64),
    /// Any floating point number.
    Double(f64),
    /// String.
    String(String),
    /// Byte string.
    ByteString(Vec<u8>),
    /// Node id.
    NodeId(NodeId),
    /// Qualified name.
    QualifiedName(QualifiedName),
    /// Localized text.
    LocalizedText(LocalizedText),
    /// Array of localized text (`EnumStrings`).
    LocalizedTextArray(Vec<LocalizedText>),
    /// Array of `Argument` (`InputArguments` / `OutputArguments`).
    Arguments(Vec<MethodArgument>),
}

impl Value {
    fn remap(&mut self, f: &impl Fn(&NodeId) -> NodeId) {
        match self {
            Self::NodeId(id) => *id = f(id),
            Self::Arguments(args) => {
                for arg in args {
                    arg.data_type = f(&arg.data_type);
                }
            }
            _ => {}
        }
    }
}

/// Materialised record for a single node.
///
/// Invariants
/// - `node_id` never changes after creation, except for the namespace index
///   rewrite performed by a namespace reorder.
/// - Class-specific attributes that do not apply to `node_class` stay at their
///   defaults (`None`, empty, `false`).
/// - Derived views (children, parents, type definition) are never stored here;
///   they are computed from the reference graph.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Identity.
    pub node_id: NodeId,
    /// Node class.
    pub node_class: NodeClass,
    /// Browse name.
    pub browse_name: QualifiedName,
    /// Display name.
    pub display_name: LocalizedText,
    /// Description.
    pub description: Option<LocalizedText>,
    /// Write mask.
    pub write_mask: u32,
    /// `IsAbstract` (type classes).
    pub is_abstract: bool,
    /// `Symmetric` (reference types).
    pub symmetric: bool,
    /// `InverseName` (reference types).
    pub inverse_name: Option<LocalizedText>,
    /// `ContainsNoLoops` (views).
    pub contains_no_loops: bool,
    /// `EventNotifier` (objects, views).
    pub event_notifier: u8,
    /// `Value` (variables, variable types).
    pub value: Option<Value>,
    /// `DataType` (variables, variable types).
    pub data_type: Option<NodeId>,
    /// `ValueRank` (variables, variable types).
    pub value_rank: Option<i32>,
    /// `ArrayDimensions` (variables, variable types).
    pub array_dimensions: Vec<u32>,
    /// `AccessLevel` (variables).
    pub access_level: u8,
    /// `MinimumSamplingInterval` (variables).
    pub minimum_sampling_interval: f64,
    /// `Historizing` (variables).
    pub historizing: bool,
    /// `Executable` (methods).
    pub executable: bool,
    /// `DataTypeDefinition` (data types).
    pub definition: Option<DataTypeDefinition>,
    /// External binding string.
    pub mapping: String,
    /// State of `mapping`.
    pub mapping_state: MappingState,
    /// UI selection flag; transient and never exported.
    pub is_selected: bool,
}

impl NodeRecord {
    /// Record with default attributes for `node_class`.
    pub fn new(node_id: NodeId, node_class: NodeClass, browse_name: QualifiedName) -> Self {
        let display_name = LocalizedText::plain(browse_name.name.clone());
        Self {
            node_id,
            node_class,
            browse_name,
            display_name,
            description: None,
            write_mask: 0,
            is_abstract: false,
            symmetric: false,
            inverse_name: None,
            contains_no_loops: false,
            event_notifier: 0,
            value: None,
            data_type: None,
            value_rank: None,
            array_dimensions: Vec::new(),
            access_level: 0,
            minimum_sampling_interval: 0.0,
            historizing: false,
            executable: false,
            definition: None,
            mapping: String::new(),
            mapping_state: MappingState::Unmapped,
            is_selected: false,
        }
    }

    /// Rewrites every embedded node id (and the browse-name namespace) through `f`.
    pub(crate) fn remap(&mut self, f: &impl Fn(&NodeId) -> NodeId, ns: &impl Fn(u16) -> u16) {
        self.node_id = f(&self.node_id);
        self.browse_name.namespace_index = ns(self.browse_name.namespace_index);
        if let Some(dt) = &mut self.data_type {
            *dt = f(dt);
        }
        if let Some(value) = &mut self.value {
            value.remap(f);
        }
        if let Some(DataTypeDefinition::Structure { fields, .. }) = &mut self.definition {
            for field in fields {
                field.data_type = f(&field.data_type);
            }
        }
    }
}

/// Store-local identifier of one stored reference.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct ReferenceId(pub u64);

/// Materialised record for a single reference, stored once in its forward
/// direction (`source` → `target`).
///
/// Invariants
/// - `source`, `target`, and `reference_type` name existing nodes.
/// - `(source, target, reference_type)` is unique in the store.
/// - `is_type_reference`, `is_interface_reference`, `is_placeholder_instance`,
///   and `original_target_in_types` are only meaningful after the last
///   classification pass; edits made since then leave them stale.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ReferenceRecord {
    /// Store-local identifier.
    pub id: ReferenceId,
    /// Forward source.
    pub source: NodeId,
    /// Forward target.
    pub target: NodeId,
    /// Reference type node.
    pub reference_type: NodeId,
    /// Modelling rule of an aggregating reference.
    pub modelling_rule: ModellingRule,
    /// Whether a type-defined reference is instantiated.
    pub is_active: bool,
    /// Defined by the source's type definition.
    pub is_type_reference: bool,
    /// Defined by an interface of the source.
    pub is_interface_reference: bool,
    /// Instance of a placeholder declaration.
    pub is_placeholder_instance: bool,
    /// Matching instance declaration inside the type.
    pub original_target_in_types: Option<NodeId>,
}

impl ReferenceRecord {
    /// Unclassified forward reference.
    pub fn new(source: NodeId, target: NodeId, reference_type: NodeId) -> Self {
        Self {
            id: ReferenceId(0),
            source,
            target,
            reference_type,
            modelling_rule: ModellingRule::None,
            is_active: true,
            is_type_reference: false,
            is_interface_reference: false,
            is_placeholder_instance: false,
            original_target_in_types: None,
        }
    }

    /// The `(source, target, type)` identity of this reference.
    pub fn key(&self) -> ReferenceKey {
        ReferenceKey {
            source: self.source.clone(),
            target: self.target.clone(),
            reference_type: self.reference_type.clone(),
        }
    }

    /// Views the reference from `endpoint` (forward when it is the source).
    pub fn oriented(&self, endpoint: &NodeId) -> OpcReference {
        let is_forward = &self.source == endpoint;
        let (source, target) = if is_forward {
            (self.source.clone(), self.target.clone())
        } else {
            (self.target.clone(), self.source.clone())
        };
        OpcReference {
            source,
            target,
            reference_type: self.reference_type.clone(),
            is_forward,
            modelling_rule: self.modelling_rule,
            is_active: self.is_active,
            is_type_reference: self.is_type_reference,
            is_interface_reference: self.is_interface_reference,
            is_placeholder_instance: self.is_placeholder_instance,
            original_target_in_types: self.original_target_in_types.clone(),
        }
    }

    pub(crate) fn remap(&mut self, f: &impl Fn(&NodeId) -> NodeId) {
        self.source = f(&self.source);
        self.target = f(&self.target);
        self.reference_type = f(&self.reference_type);
        if let Some(orig) = &mut self.original_target_in_types {
            *orig = f(orig);
        }
    }
}

/// Identity triple of a stored reference.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct ReferenceKey {
    /// Forward source.
    pub source: NodeId,
    /// Forward target.
    pub target: NodeId,
    /// Reference type.
    pub reference_type: NodeId,
}

/// A reference as seen from one of its endpoints.
///
/// `source` is the endpoint the reference was queried from; `is_forward`
/// tells whether that matches the stored direction.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct OpcReference {
    /// Endpoint the reference is viewed from.
    pub source: NodeId,
    /// Opposite endpoint.
    pub target: NodeId,
    /// Reference type node.
    pub reference_type: NodeId,
    /// `true` when `source` is the stored forward source.
    pub is_forward: bool,
    /// Modelling rule of an aggregating reference.
    pub modelling_rule: ModellingRule,
    /// Whether a type-defined reference is instantiated.
    pub is_active: bool,
    /// Defined by the source's type definition (valid after classification).
    pub is_type_reference: bool,
    /// Defined by an interface (valid after classification).
    pub is_interface_reference: bool,
    /// Instance of a placeholder declaration.
    pub is_placeholder_instance: bool,
    /// Matching instance declaration inside the type.
    pub original_target_in_types: Option<NodeId>,
}
