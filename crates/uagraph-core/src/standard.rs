// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Well-known namespace-zero identifiers and the minimal namespace zero every
//! address space starts with.
use crate::ident::{NodeId, QualifiedName};
use crate::record::{NodeClass, NodeRecord, ReferenceRecord};

/// URI of the standard OPC UA namespace (index 0).
pub const NAMESPACE_ZERO_URI: &str = "http://opcfoundation.org/UA/";

/// Version stamped on the bootstrap namespace zero.
pub const NAMESPACE_ZERO_VERSION: &str = "1.05.03";

/// Numeric ids from the standard `NodeIds.csv`.
pub mod ids {
    use crate::ident::NodeId;

    /// `Boolean` data type.
    pub const BOOLEAN: NodeId = NodeId::ns0(1);
    /// `SByte` data type.
    pub const SBYTE: NodeId = NodeId::ns0(2);
    /// `Byte` data type.
    pub const BYTE: NodeId = NodeId::ns0(3);
    /// `Int16` data type.
    pub const INT16: NodeId = NodeId::ns0(4);
    /// `UInt16` data type.
    pub const UINT16: NodeId = NodeId::ns0(5);
    /// `Int32` data type.
    pub const INT32: NodeId = NodeId::ns0(6);
    /// `UInt32` data type.
    pub const UINT32: NodeId = NodeId::ns0(7);
    /// `Int64` data type.
    pub const INT64: NodeId = NodeId::ns0(8);
    /// `UInt64` data type.
    pub const UINT64: NodeId = NodeId::ns0(9);
    /// `Float` data type.
    pub const FLOAT: NodeId = NodeId::ns0(10);
    /// `Double` data type.
    pub const DOUBLE: NodeId = NodeId::ns0(11);
    /// `String` data type.
    pub const STRING: NodeId = NodeId::ns0(12);
    /// `LocalizedText` data type.
    pub const LOCALIZED_TEXT: NodeId = NodeId::ns0(21);
    /// `Structure` data type.
    pub const STRUCTURE: NodeId = NodeId::ns0(22);
    /// `BaseDataType`.
    pub const BASE_DATA_TYPE: NodeId = NodeId::ns0(24);
    /// `Number` data type.
    pub const NUMBER: NodeId = NodeId::ns0(26);
    /// `Integer` data type.
    pub const INTEGER: NodeId = NodeId::ns0(27);
    /// `UInteger` data type.
    pub const UINTEGER: NodeId = NodeId::ns0(28);
    /// `Enumeration` data type.
    pub const ENUMERATION: NodeId = NodeId::ns0(29);
    /// `Argument` structure.
    pub const ARGUMENT: NodeId = NodeId::ns0(296);
    /// `EnumValueType` structure.
    pub const ENUM_VALUE_TYPE: NodeId = NodeId::ns0(7594);
    /// `OptionSet` structure.
    pub const OPTION_SET: NodeId = NodeId::ns0(12755);
    /// `Union` structure.
    pub const UNION: NodeId = NodeId::ns0(12756);

    /// `References`.
    pub const REFERENCES: NodeId = NodeId::ns0(31);
    /// `NonHierarchicalReferences`.
    pub const NON_HIERARCHICAL_REFERENCES: NodeId = NodeId::ns0(32);
    /// `HierarchicalReferences`.
    pub const HIERARCHICAL_REFERENCES: NodeId = NodeId::ns0(33);
    /// `HasChild`.
    pub const HAS_CHILD: NodeId = NodeId::ns0(34);
    /// `Organizes`.
    pub const ORGANIZES: NodeId = NodeId::ns0(35);
    /// `HasEventSource`.
    pub const HAS_EVENT_SOURCE: NodeId = NodeId::ns0(36);
    /// `HasModellingRule`.
    pub const HAS_MODELLING_RULE: NodeId = NodeId::ns0(37);
    /// `HasEncoding`.
    pub const HAS_ENCODING: NodeId = NodeId::ns0(38);
    /// `HasDescription`.
    pub const HAS_DESCRIPTION: NodeId = NodeId::ns0(39);
    /// `HasTypeDefinition`.
    pub const HAS_TYPE_DEFINITION: NodeId = NodeId::ns0(40);
    /// `GeneratesEvent`.
    pub const GENERATES_EVENT: NodeId = NodeId::ns0(41);
    /// `Aggregates`.
    pub const AGGREGATES: NodeId = NodeId::ns0(44);
    /// `HasSubtype`.
    pub const HAS_SUBTYPE: NodeId = NodeId::ns0(45);
    /// `HasProperty`.
    pub const HAS_PROPERTY: NodeId = NodeId::ns0(46);
    /// `HasComponent`.
    pub const HAS_COMPONENT: NodeId = NodeId::ns0(47);
    /// `HasNotifier`.
    pub const HAS_NOTIFIER: NodeId = NodeId::ns0(48);
    /// `HasOrderedComponent`.
    pub const HAS_ORDERED_COMPONENT: NodeId = NodeId::ns0(49);
    /// `HasInterface`.
    pub const HAS_INTERFACE: NodeId = NodeId::ns0(17603);
    /// `HasAddIn`.
    pub const HAS_ADD_IN: NodeId = NodeId::ns0(17604);

    /// `BaseObjectType`.
    pub const BASE_OBJECT_TYPE: NodeId = NodeId::ns0(58);
    /// `FolderType`.
    pub const FOLDER_TYPE: NodeId = NodeId::ns0(61);
    /// `BaseVariableType`.
    pub const BASE_VARIABLE_TYPE: NodeId = NodeId::ns0(62);
    /// `BaseDataVariableType`.
    pub const BASE_DATA_VARIABLE_TYPE: NodeId = NodeId::ns0(63);
    /// `PropertyType`.
    pub const PROPERTY_TYPE: NodeId = NodeId::ns0(68);
    /// `ModellingRuleType`.
    pub const MODELLING_RULE_TYPE: NodeId = NodeId::ns0(77);
    /// `BaseEventType`.
    pub const BASE_EVENT_TYPE: NodeId = NodeId::ns0(2041);
    /// `StateMachineType`.
    pub const STATE_MACHINE_TYPE: NodeId = NodeId::ns0(2299);
    /// `StateType`.
    pub const STATE_TYPE: NodeId = NodeId::ns0(2307);
    /// `TransitionType`.
    pub const TRANSITION_TYPE: NodeId = NodeId::ns0(2310);
    /// `FiniteStateMachineType`.
    pub const FINITE_STATE_MACHINE_TYPE: NodeId = NodeId::ns0(2771);
    /// `GuardVariableType`.
    pub const GUARD_VARIABLE_TYPE: NodeId = NodeId::ns0(15113);
    /// `ExpressionGuardVariableType`.
    pub const EXPRESSION_GUARD_VARIABLE_TYPE: NodeId = NodeId::ns0(15128);
    /// `ElseGuardVariableType`.
    pub const ELSE_GUARD_VARIABLE_TYPE: NodeId = NodeId::ns0(15317);
    /// `BaseInterfaceType`.
    pub const BASE_INTERFACE_TYPE: NodeId = NodeId::ns0(17602);

    /// `ModellingRule_Mandatory`.
    pub const MODELLING_RULE_MANDATORY: NodeId = NodeId::ns0(78);
    /// `ModellingRule_Optional`.
    pub const MODELLING_RULE_OPTIONAL: NodeId = NodeId::ns0(80);
    /// `ModellingRule_ExposesItsArray`.
    pub const MODELLING_RULE_EXPOSES_ITS_ARRAY: NodeId = NodeId::ns0(83);
    /// `ModellingRule_OptionalPlaceholder`.
    pub const MODELLING_RULE_OPTIONAL_PLACEHOLDER: NodeId = NodeId::ns0(11508);
    /// `ModellingRule_MandatoryPlaceholder`.
    pub const MODELLING_RULE_MANDATORY_PLACEHOLDER: NodeId = NodeId::ns0(11510);

    /// `Root` folder.
    pub const ROOT_FOLDER: NodeId = NodeId::ns0(84);
    /// `Objects` folder.
    pub const OBJECTS_FOLDER: NodeId = NodeId::ns0(85);
    /// `Types` folder.
    pub const TYPES_FOLDER: NodeId = NodeId::ns0(86);
    /// `Views` folder.
    pub const VIEWS_FOLDER: NodeId = NodeId::ns0(87);
    /// `ObjectTypes` folder.
    pub const OBJECT_TYPES_FOLDER: NodeId = NodeId::ns0(88);
    /// `VariableTypes` folder.
    pub const VARIABLE_TYPES_FOLDER: NodeId = NodeId::ns0(89);
    /// `DataTypes` folder.
    pub const DATA_TYPES_FOLDER: NodeId = NodeId::ns0(90);
    /// `ReferenceTypes` folder.
    pub const REFERENCE_TYPES_FOLDER: NodeId = NodeId::ns0(91);
}

/// Browse name of the input-argument property of a method.
pub const INPUT_ARGUMENTS: &str = "InputArguments";
/// Browse name of the output-argument property of a method.
pub const OUTPUT_ARGUMENTS: &str = "OutputArguments";
/// Browse name of an enumeration's string table property.
pub const ENUM_STRINGS: &str = "EnumStrings";
/// Browse name of an enumeration's value table property.
pub const ENUM_VALUES: &str = "EnumValues";
/// Browse name of an option set's bit-name property.
pub const OPTION_SET_VALUES: &str = "OptionSetValues";

/// Built-in data types occupy ids 1..=29 of namespace zero.
pub fn is_builtin_data_type(id: &NodeId) -> bool {
    id.namespace == 0
        && matches!(id.identifier, crate::ident::Identifier::Numeric(n) if (1..=29).contains(&n))
}

/// (id, browse name, class, parent, parent reference type, abstract)
type Seed = (u32, &'static str, NodeClass, u32, u32, bool);

const ORG: u32 = 35;
const SUB: u32 = 45;
const OBJ: NodeClass = NodeClass::Object;
const RT: NodeClass = NodeClass::ReferenceType;
const OT: NodeClass = NodeClass::ObjectType;
const VT: NodeClass = NodeClass::VariableType;
const DT: NodeClass = NodeClass::DataType;

#[rustfmt::skip]
const SEEDS: &[Seed] = &[
    (85, "Objects", OBJ, 84, ORG, false),
    (86, "Types", OBJ, 84, ORG, false),
    (87, "Views", OBJ, 84, ORG, false),
    (88, "ObjectTypes", OBJ, 86, ORG, false),
    (89, "VariableTypes", OBJ, 86, ORG, false),
    (90, "DataTypes", OBJ, 86, ORG, false),
    (91, "ReferenceTypes", OBJ, 86, ORG, false),
    // reference types
    (31, "References", RT, 91, ORG, true),
    (33, "HierarchicalReferences", RT, 31, SUB, true),
    (32, "NonHierarchicalReferences", RT, 31, SUB, true),
    (34, "HasChild", RT, 33, SUB, true),
    (35, "Organizes", RT, 33, SUB, false),
    (36, "HasEventSource", RT, 33, SUB, false),
    (48, "HasNotifier", RT, 36, SUB, false),
    (44, "Aggregates", RT, 34, SUB, true),
    (45, "HasSubtype", RT, 34, SUB, false),
    (47, "HasComponent", RT, 44, SUB, false),
    (46, "HasProperty", RT, 44, SUB, false),
    (49, "HasOrderedComponent", RT, 47, SUB, false),
    (17604, "HasAddIn", RT, 47, SUB, false),
    (40, "HasTypeDefinition", RT, 32, SUB, false),
    (37, "HasModellingRule", RT, 32, SUB, false),
    (38, "HasEncoding", RT, 32, SUB, false),
    (39, "HasDescription", RT, 32, SUB, false),
    (41, "GeneratesEvent", RT, 32, SUB, false),
    (17603, "HasInterface", RT, 32, SUB, false),
    // object types
    (58, "BaseObjectType", OT, 88, ORG, false),
    (61, "FolderType", OT, 58, SUB, false),
    (77, "ModellingRuleType", OT, 58, SUB, false),
    (2041, "BaseEventType", OT, 58, SUB, true),
    (17602, "BaseInterfaceType", OT, 58, SUB, true),
    (2299, "StateMachineType", OT, 58, SUB, false),
    (2771, "FiniteStateMachineType", OT, 2299, SUB, true),
    (2307, "StateType", OT, 58, SUB, false),
    (2310, "TransitionType", OT, 58, SUB, false),
    // variable types
    (62, "BaseVariableType", VT, 89, ORG, true),
    (63, "BaseDataVariableType", VT, 62, SUB, false),
    (68, "PropertyType", VT, 62, SUB, false),
    (15113, "GuardVariableType", VT, 63, SUB, false),
    (15128, "ExpressionGuardVariableType", VT, 15113, SUB, false),
    (15317, "ElseGuardVariableType", VT, 15113, SUB, false),
    // data types
    (24, "BaseDataType", DT, 90, ORG, true),
    (1, "Boolean", DT, 24, SUB, false),
    (26, "Number", DT, 24, SUB, true),
    (27, "Integer", DT, 26, SUB, true),
    (28, "UInteger", DT, 26, SUB, true),
    (10, "Float", DT, 26, SUB, false),
    (11, "Double", DT, 26, SUB, false),
    (2, "SByte", DT, 27, SUB, false),
    (4, "Int16", DT, 27, SUB, false),
    (6, "Int32", DT, 27, SUB, false),
    (8, "Int64", DT, 27, SUB, false),
    (3, "Byte", DT, 28, SUB, false),
    (5, "UInt16", DT, 28, SUB, false),
    (7, "UInt32", DT, 28, SUB, false),
    (9, "UInt64", DT, 28, SUB, false),
    (12, "String", DT, 24, SUB, false),
    (13, "DateTime", DT, 24, SUB, false),
    (14, "Guid", DT, 24, SUB, false),
    (15, "ByteString", DT, 24, SUB, false),
    (16, "XmlElement", DT, 24, SUB, false),
    (17, "NodeId", DT, 24, SUB, false),
    (18, "ExpandedNodeId", DT, 24, SUB, false),
    (19, "StatusCode", DT, 24, SUB, false),
    (20, "QualifiedName", DT, 24, SUB, false),
    (21, "LocalizedText", DT, 24, SUB, false),
    (22, "Structure", DT, 24, SUB, true),
    (23, "DataValue", DT, 24, SUB, false),
    (25, "DiagnosticInfo", DT, 24, SUB, false),
    (29, "Enumeration", DT, 24, SUB, true),
    (12756, "Union", DT, 22, SUB, true),
    (12755, "OptionSet", DT, 22, SUB, false),
    (296, "Argument", DT, 22, SUB, false),
    (7594, "EnumValueType", DT, 22, SUB, false),
];

/// Builds the minimal namespace zero: the folder skeleton plus the reference,
/// object, variable, and data type hierarchies the engine relies on.
pub(crate) fn namespace_zero() -> (Vec<NodeRecord>, Vec<ReferenceRecord>) {
    let mut nodes = Vec::with_capacity(SEEDS.len() + 1);
    let mut refs = Vec::with_capacity(SEEDS.len() * 2);

    nodes.push(NodeRecord::new(
        ids::ROOT_FOLDER,
        NodeClass::Object,
        QualifiedName::new(0, "Root"),
    ));
    refs.push(ReferenceRecord::new(
        ids::ROOT_FOLDER,
        ids::FOLDER_TYPE,
        ids::HAS_TYPE_DEFINITION,
    ));

    for &(id, name, class, parent, ref_type, is_abstract) in SEEDS {
        let node_id = NodeId::ns0(id);
        let mut record = NodeRecord::new(node_id.clone(), class, QualifiedName::new(0, name));
        record.is_abstract = is_abstract;
        if class == NodeClass::VariableType {
            record.data_type = Some(ids::BASE_DATA_TYPE);
            record.value_rank = Some(-2);
        }
        if class == NodeClass::ReferenceType && id == 45 {
            record.inverse_name = Some(crate::ident::LocalizedText::plain("HasSupertype"));
        }
        nodes.push(record);
        refs.push(ReferenceRecord::new(
            NodeId::ns0(parent),
            node_id.clone(),
            NodeId::ns0(ref_type),
        ));
        if class == NodeClass::Object {
            refs.push(ReferenceRecord::new(
                node_id,
                ids::FOLDER_TYPE,
                ids::HAS_TYPE_DEFINITION,
            ));
        }
    }
    (nodes, refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashSet;

    #[test]
    fn every_seed_parent_is_seeded() {
        let (nodes, refs) = namespace_zero();
        let known: FxHashSet<_> = nodes.iter().map(|n| n.node_id.clone()).collect();
        for r in &refs {
            assert!(known.contains(&r.source), "missing source {}", r.source);
            assert!(known.contains(&r.target), "missing target {}", r.target);
            assert!(known.contains(&r.reference_type), "missing type {}", r.reference_type);
        }
    }

    #[test]
    fn seeds_are_unique() {
        let (nodes, _) = namespace_zero();
        let unique: FxHashSet<_> = nodes.iter().map(|n| n.node_id.clone()).collect();
        assert_eq!(unique.len(), nodes.len());
    }

    #[test]
    fn builtin_range() {
        assert!(is_builtin_data_type(&ids::BOOLEAN));
        assert!(is_builtin_data_type(&ids::ENUMERATION));
        assert!(!is_builtin_data_type(&ids::ARGUMENT));
        assert!(!is_builtin_data_type(&NodeId::numeric(1, 5)));
    }
}
