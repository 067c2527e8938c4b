// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Attribute reads and writes by OPC UA attribute id.
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GraphError;
use crate::ident::{LocalizedText, NodeId, QualifiedName};
use crate::notify::NamespaceChangeType;
use crate::record::{MappingState, ModellingRule, NodeClass, NodeRecord, Value};
use crate::space::AddressSpace;

/// Standard attribute ids 1..=22.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum AttributeId {
    /// `NodeId` (read-only).
    NodeId = 1,
    /// `NodeClass` (read-only).
    NodeClass = 2,
    /// `BrowseName`.
    BrowseName = 3,
    /// `DisplayName`.
    DisplayName = 4,
    /// `Description`.
    Description = 5,
    /// `WriteMask`.
    WriteMask = 6,
    /// `UserWriteMask` (mirrors `WriteMask`).
    UserWriteMask = 7,
    /// `IsAbstract`.
    IsAbstract = 8,
    /// `Symmetric`.
    Symmetric = 9,
    /// `InverseName`.
    InverseName = 10,
    /// `ContainsNoLoops`.
    ContainsNoLoops = 11,
    /// `EventNotifier`.
    EventNotifier = 12,
    /// `Value`.
    Value = 13,
    /// `DataType`.
    DataType = 14,
    /// `ValueRank`.
    ValueRank = 15,
    /// `ArrayDimensions`.
    ArrayDimensions = 16,
    /// `AccessLevel`.
    AccessLevel = 17,
    /// `UserAccessLevel` (mirrors `AccessLevel`).
    UserAccessLevel = 18,
    /// `MinimumSamplingInterval`.
    MinimumSamplingInterval = 19,
    /// `Historizing`.
    Historizing = 20,
    /// `Executable`.
    Executable = 21,
    /// `UserExecutable` (mirrors `Executable`).
    UserExecutable = 22,
}

impl AttributeId {
    /// Attribute for a numeric id.
    pub fn from_u32(id: u32) -> Option<Self> {
        use AttributeId as A;
        const ALL: [AttributeId; 22] = [
            A::NodeId,
            A::NodeClass,
            A::BrowseName,
            A::DisplayName,
            A::Description,
            A::WriteMask,
            A::UserWriteMask,
            A::IsAbstract,
            A::Symmetric,
            A::InverseName,
            A::ContainsNoLoops,
            A::EventNotifier,
            A::Value,
            A::DataType,
            A::ValueRank,
            A::ArrayDimensions,
            A::AccessLevel,
            A::UserAccessLevel,
            A::MinimumSamplingInterval,
            A::Historizing,
            A::Executable,
            A::UserExecutable,
        ];
        let index = usize::try_from(id.checked_sub(1)?).ok()?;
        ALL.get(index).copied()
    }

    fn name(self) -> &'static str {
        match self {
            Self::NodeId => "NodeId",
            Self::NodeClass => "NodeClass",
            Self::BrowseName => "BrowseName",
            Self::DisplayName => "DisplayName",
            Self::Description => "Description",
            Self::WriteMask => "WriteMask",
            Self::UserWriteMask => "UserWriteMask",
            Self::IsAbstract => "IsAbstract",
            Self::Symmetric => "Symmetric",
            Self::InverseName => "InverseName",
            Self::ContainsNoLoops => "ContainsNoLoops",
            Self::EventNotifier => "EventNotifier",
            Self::Value => "Value",
            Self::DataType => "DataType",
            Self::ValueRank => "ValueRank",
            Self::ArrayDimensions => "ArrayDimensions",
            Self::AccessLevel => "AccessLevel",
            Self::UserAccessLevel => "UserAccessLevel",
            Self::MinimumSamplingInterval => "MinimumSamplingInterval",
            Self::Historizing => "Historizing",
            Self::Executable => "Executable",
            Self::UserExecutable => "UserExecutable",
        }
    }

    /// Whether nodes of `class` carry this attribute.
    pub fn applies_to(self, class: NodeClass) -> bool {
        use NodeClass as C;
        match self {
            Self::NodeId
            | Self::NodeClass
            | Self::BrowseName
            | Self::DisplayName
            | Self::Description
            | Self::WriteMask
            | Self::UserWriteMask => true,
            Self::IsAbstract => class.is_type(),
            Self::Symmetric | Self::InverseName => class == C::ReferenceType,
            Self::ContainsNoLoops => class == C::View,
            Self::EventNotifier => matches!(class, C::Object | C::View),
            Self::Value | Self::DataType | Self::ValueRank | Self::ArrayDimensions => {
                matches!(class, C::Variable | C::VariableType)
            }
            Self::AccessLevel
            | Self::UserAccessLevel
            | Self::MinimumSamplingInterval
            | Self::Historizing => class == C::Variable,
            Self::Executable | Self::UserExecutable => class == C::Method,
        }
    }
}

/// Attribute value as read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// `NodeId`, `DataType`.
    NodeId(NodeId),
    /// `NodeClass`.
    NodeClass(NodeClass),
    /// `BrowseName`.
    QualifiedName(QualifiedName),
    /// `DisplayName`, `Description`, `InverseName`.
    LocalizedText(Option<LocalizedText>),
    /// Boolean attributes.
    Boolean(bool),
    /// `EventNotifier`, access levels.
    Byte(u8),
    /// Write masks.
    UInt32(u32),
    /// `ValueRank`.
    Int32(i32),
    /// `MinimumSamplingInterval`.
    Double(f64),
    /// `ArrayDimensions`.
    Dimensions(Vec<u32>),
    /// `Value`.
    Value(Option<Value>),
}

/// One attribute write. `NodeId`, `NodeClass`, and the `User*` mirrors have
/// no variant and cannot be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeUpdate {
    /// `BrowseName`.
    BrowseName(QualifiedName),
    /// `DisplayName`.
    DisplayName(LocalizedText),
    /// `Description`.
    Description(Option<LocalizedText>),
    /// `WriteMask`.
    WriteMask(u32),
    /// `IsAbstract`.
    IsAbstract(bool),
    /// `Symmetric`.
    Symmetric(bool),
    /// `InverseName`.
    InverseName(Option<LocalizedText>),
    /// `ContainsNoLoops`.
    ContainsNoLoops(bool),
    /// `EventNotifier`.
    EventNotifier(u8),
    /// `Value`.
    Value(Option<Value>),
    /// `DataType`.
    DataType(NodeId),
    /// `ValueRank`.
    ValueRank(i32),
    /// `ArrayDimensions`.
    ArrayDimensions(Vec<u32>),
    /// `AccessLevel`.
    AccessLevel(u8),
    /// `MinimumSamplingInterval`.
    MinimumSamplingInterval(f64),
    /// `Historizing`.
    Historizing(bool),
    /// `Executable`.
    Executable(bool),
}

impl AttributeUpdate {
    /// Attribute this update writes.
    pub fn attribute_id(&self) -> AttributeId {
        match self {
            Self::BrowseName(_) => AttributeId::BrowseName,
            Self::DisplayName(_) => AttributeId::DisplayName,
            Self::Description(_) => AttributeId::Description,
            Self::WriteMask(_) => AttributeId::WriteMask,
            Self::IsAbstract(_) => AttributeId::IsAbstract,
            Self::Symmetric(_) => AttributeId::Symmetric,
            Self::InverseName(_) => AttributeId::InverseName,
            Self::ContainsNoLoops(_) => AttributeId::ContainsNoLoops,
            Self::EventNotifier(_) => AttributeId::EventNotifier,
            Self::Value(_) => AttributeId::Value,
            Self::DataType(_) => AttributeId::DataType,
            Self::ValueRank(_) => AttributeId::ValueRank,
            Self::ArrayDimensions(_) => AttributeId::ArrayDimensions,
            Self::AccessLevel(_) => AttributeId::AccessLevel,
            Self::MinimumSamplingInterval(_) => AttributeId::MinimumSamplingInterval,
            Self::Historizing(_) => AttributeId::Historizing,
            Self::Executable(_) => AttributeId::Executable,
        }
    }

    fn apply(self, record: &mut NodeRecord) {
        match self {
            Self::BrowseName(v) => record.browse_name = v,
            Self::DisplayName(v) => record.display_name = v,
            Self::Description(v) => record.description = v,
            Self::WriteMask(v) => record.write_mask = v,
            Self::IsAbstract(v) => record.is_abstract = v,
            Self::Symmetric(v) => record.symmetric = v,
            Self::InverseName(v) => record.inverse_name = v,
            Self::ContainsNoLoops(v) => record.contains_no_loops = v,
            Self::EventNotifier(v) => record.event_notifier = v,
            Self::Value(v) => record.value = v,
            Self::DataType(v) => record.data_type = Some(v),
            Self::ValueRank(v) => record.value_rank = Some(v),
            Self::ArrayDimensions(v) => record.array_dimensions = v,
            Self::AccessLevel(v) => record.access_level = v,
            Self::MinimumSamplingInterval(v) => record.minimum_sampling_interval = v,
            Self::Historizing(v) => record.historizing = v,
            Self::Executable(v) => record.executable = v,
        }
    }
}

fn unsupported(node: &NodeId, attribute: AttributeId) -> GraphError {
    GraphError::AttributeNotSupported {
        node: node.clone(),
        attribute: attribute.name(),
    }
}

impl AddressSpace {
    /// Reads one attribute.
    pub fn attribute(&self, node: &NodeId, attribute: AttributeId) -> Result<AttributeValue, GraphError> {
        let r = self.record_ref(node)?;
        if !attribute.applies_to(r.node_class) {
            return Err(unsupported(node, attribute));
        }
        Ok(match attribute {
            AttributeId::NodeId => AttributeValue::NodeId(r.node_id.clone()),
            AttributeId::NodeClass => AttributeValue::NodeClass(r.node_class),
            AttributeId::BrowseName => AttributeValue::QualifiedName(r.browse_name.clone()),
            AttributeId::DisplayName => AttributeValue::LocalizedText(Some(r.display_name.clone())),
            AttributeId::Description => AttributeValue::LocalizedText(r.description.clone()),
            AttributeId::WriteMask | AttributeId::UserWriteMask => AttributeValue::UInt32(r.write_mask),
            AttributeId::IsAbstract => AttributeValue::Boolean(r.is_abstract),
            AttributeId::Symmetric => AttributeValue::Boolean(r.symmetric),
            AttributeId::InverseName => AttributeValue::LocalizedText(r.inverse_name.clone()),
            AttributeId::ContainsNoLoops => AttributeValue::Boolean(r.contains_no_loops),
            AttributeId::EventNotifier => AttributeValue::Byte(r.event_notifier),
            AttributeId::Value => AttributeValue::Value(r.value.clone()),
            AttributeId::DataType => r
                .data_type
                .clone()
                .map_or(AttributeValue::Value(None), AttributeValue::NodeId),
            AttributeId::ValueRank => AttributeValue::Int32(r.value_rank.unwrap_or(-2)),
            AttributeId::ArrayDimensions => AttributeValue::Dimensions(r.array_dimensions.clone()),
            AttributeId::AccessLevel | AttributeId::UserAccessLevel => {
                AttributeValue::Byte(r.access_level)
            }
            AttributeId::MinimumSamplingInterval => {
                AttributeValue::Double(r.minimum_sampling_interval)
            }
            AttributeId::Historizing => AttributeValue::Boolean(r.historizing),
            AttributeId::Executable | AttributeId::UserExecutable => {
                AttributeValue::Boolean(r.executable)
            }
        })
    }

    /// Writes one attribute.
    pub fn set_attribute(&mut self, node: &NodeId, update: AttributeUpdate) -> Result<(), GraphError> {
        let class = self.record_ref(node)?.node_class;
        let attribute = update.attribute_id();
        if !attribute.applies_to(class) {
            return Err(unsupported(node, attribute));
        }
        self.ensure_writable(node.namespace)?;
        match &update {
            AttributeUpdate::BrowseName(name) => {
                if name.name.trim().is_empty() {
                    return Err(GraphError::invalid("browse name must not be empty"));
                }
                if self.namespaces.get(name.namespace_index).is_none() {
                    return Err(GraphError::NamespaceIndexNotFound(name.namespace_index));
                }
            }
            AttributeUpdate::DataType(dt) => {
                if self.record_ref(dt)?.node_class != NodeClass::DataType {
                    return Err(GraphError::invalid(format!("{dt} is not a data type")));
                }
            }
            _ => {}
        }
        let structural = matches!(update, AttributeUpdate::BrowseName(_));
        let abstract_change = matches!(update, AttributeUpdate::IsAbstract(_));

        debug!(node = %node, attribute = attribute.name(), "set attribute");
        self.bump();
        update.apply(self.record_mut(node)?);
        if structural {
            self.touch(node);
        }
        if structural || abstract_change {
            self.classes.clear();
        }
        self.record(
            NamespaceChangeType::Modified,
            format!("set {} of {node}", attribute.name()),
        );
        Ok(())
    }

    /// Binds `node` to an external symbol and refreshes mapping states.
    ///
    /// An empty mapping unbinds; a mapping shared with another node puts
    /// every holder into `Conflict`.
    pub fn set_mapping(&mut self, node: &NodeId, mapping: &str) -> Result<MappingState, GraphError> {
        self.ensure_writable(node.namespace)?;
        let previous = std::mem::replace(&mut self.record_mut(node)?.mapping, mapping.to_owned());
        self.bump();
        if mapping.is_empty() {
            self.record_mut(node)?.mapping_state = MappingState::Unmapped;
        } else {
            self.refresh_mapping_states(mapping);
        }
        if !previous.is_empty() && previous != mapping {
            self.refresh_mapping_states(&previous);
        }
        let state = self.record_ref(node)?.mapping_state;
        self.record(
            NamespaceChangeType::Modified,
            format!("mapped {node} to '{mapping}' ({state:?})"),
        );
        Ok(state)
    }

    /// Sets the modelling rule on every hierarchical reference targeting `node`.
    pub fn set_modelling_rule(&mut self, node: &NodeId, rule: ModellingRule) -> Result<(), GraphError> {
        self.record_ref(node)?;
        self.ensure_writable(node.namespace)?;
        let hierarchical = self.hierarchical_types();
        let targets: Vec<_> = self
            .graph
            .incoming(node)
            .filter(|r| hierarchical.contains(&r.reference_type))
            .map(|r| r.id)
            .collect();
        if targets.is_empty() {
            return Err(GraphError::invalid(format!("{node} has no hierarchical parent")));
        }
        self.bump();
        for id in targets {
            if let Some(r) = self.graph.get_mut(id) {
                r.modelling_rule = rule;
            }
        }
        self.touch(node);
        self.record(
            NamespaceChangeType::Modified,
            format!("set modelling rule of {node} to {rule:?}"),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::space::AddNodeParams;
    use crate::standard::ids;

    fn fixture() -> (AddressSpace, u16, NodeId) {
        let mut s = AddressSpace::new();
        let ns = s.create_namespace("urn:attr", "1.0").unwrap();
        let v = s
            .create_node(&ids::OBJECTS_FOLDER, AddNodeParams::variable("V", ns, ids::DOUBLE, -1))
            .unwrap();
        (s, ns, v)
    }

    #[test]
    fn ids_round_trip_through_numbers() {
        assert_eq!(AttributeId::from_u32(1), Some(AttributeId::NodeId));
        assert_eq!(AttributeId::from_u32(22), Some(AttributeId::UserExecutable));
        assert_eq!(AttributeId::from_u32(0), None);
        assert_eq!(AttributeId::from_u32(23), None);
        assert_eq!(AttributeId::Value as u32, 13);
    }

    #[test]
    fn class_gates_reads_and_writes() {
        let (mut s, _ns, v) = fixture();
        assert_eq!(
            s.attribute(&v, AttributeId::DataType).unwrap(),
            AttributeValue::NodeId(ids::DOUBLE)
        );
        assert!(matches!(
            s.attribute(&v, AttributeId::Executable),
            Err(GraphError::AttributeNotSupported { .. })
        ));
        assert!(s.set_attribute(&v, AttributeUpdate::Symmetric(true)).is_err());
        s.set_attribute(&v, AttributeUpdate::ValueRank(1)).unwrap();
        assert_eq!(s.attribute(&v, AttributeId::ValueRank).unwrap(), AttributeValue::Int32(1));
    }

    #[test]
    fn namespace_zero_attributes_are_immutable() {
        let (mut s, _ns, _v) = fixture();
        assert_eq!(
            s.set_attribute(&ids::OBJECTS_FOLDER, AttributeUpdate::WriteMask(1)),
            Err(GraphError::NamespaceZeroImmutable)
        );
    }

    #[test]
    fn shared_mapping_conflicts_until_released() {
        let (mut s, ns, v) = fixture();
        let w = s
            .create_node(&ids::OBJECTS_FOLDER, AddNodeParams::variable("W", ns, ids::DOUBLE, -1))
            .unwrap();
        assert_eq!(s.set_mapping(&v, "DB1.X").unwrap(), MappingState::Mapped);
        assert_eq!(s.set_mapping(&w, "DB1.X").unwrap(), MappingState::Conflict);
        assert_eq!(s.node(&v).unwrap().mapping_state, MappingState::Conflict);
        assert_eq!(s.set_mapping(&w, "").unwrap(), MappingState::Unmapped);
        assert_eq!(s.node(&v).unwrap().mapping_state, MappingState::Mapped);
    }

    #[test]
    fn modelling_rule_lands_on_parent_reference() {
        let (mut s, _ns, v) = fixture();
        s.set_modelling_rule(&v, ModellingRule::Mandatory).unwrap();
        let parent_link = s
            .references_of(&v)
            .unwrap()
            .into_iter()
            .find(|r| !r.is_forward)
            .unwrap();
        assert_eq!(parent_link.modelling_rule, ModellingRule::Mandatory);
    }

    #[test]
    fn renaming_refreshes_special_classes() {
        let (mut s, _ns, v) = fixture();
        assert!(!s.special_node_classes(&v).unwrap().is_enum_strings);
        s.set_attribute(
            &v,
            AttributeUpdate::BrowseName(crate::ident::QualifiedName::new(0, crate::standard::ENUM_STRINGS)),
        )
        .unwrap();
        assert!(s.special_node_classes(&v).unwrap().is_enum_strings);
    }
}
