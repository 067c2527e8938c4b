// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Method arguments and structured data types.
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::ident::{NodeId, QualifiedName};
use crate::notify::{NamespaceChange, NamespaceChangeType};
use crate::record::{DataTypeDefinition, MethodArgument, ModellingRule, NodeClass, StructureField, Value};
use crate::space::{AddNodeParams, AddressSpace, NodeClassSpec};
use crate::standard::{self, ids};

/// Which argument list of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgumentKind {
    /// `InputArguments`.
    Input,
    /// `OutputArguments`.
    Output,
}

impl ArgumentKind {
    fn browse_name(self) -> &'static str {
        match self {
            Self::Input => standard::INPUT_ARGUMENTS,
            Self::Output => standard::OUTPUT_ARGUMENTS,
        }
    }
}

fn check_unique(owner: &NodeId, args: &[MethodArgument]) -> Result<(), GraphError> {
    for (i, arg) in args.iter().enumerate() {
        if arg.name.trim().is_empty() {
            return Err(GraphError::invalid("argument name must not be empty"));
        }
        if args[..i].iter().any(|a| a.name == arg.name) {
            return Err(GraphError::MemberExists {
                owner: owner.clone(),
                name: arg.name.clone(),
            });
        }
    }
    Ok(())
}

impl AddressSpace {
    fn require_data_type(&self, id: &NodeId) -> Result<(), GraphError> {
        if self.record_ref(id)?.node_class != NodeClass::DataType {
            return Err(GraphError::invalid(format!("{id} is not a data type")));
        }
        Ok(())
    }

    fn require_method(&self, method: &NodeId) -> Result<(), GraphError> {
        if self.record_ref(method)?.node_class != NodeClass::Method {
            return Err(GraphError::invalid(format!("{method} is not a method")));
        }
        Ok(())
    }

    /// The `InputArguments`/`OutputArguments` property of `method`.
    fn argument_property(&self, method: &NodeId, kind: ArgumentKind) -> Option<NodeId> {
        let name = QualifiedName::new(0, kind.browse_name());
        self.graph
            .outgoing(method)
            .filter(|r| r.reference_type == ids::HAS_PROPERTY)
            .map(|r| &r.target)
            .find(|t| self.nodes.get(*t).is_some_and(|n| n.browse_name == name))
            .cloned()
    }

    fn create_argument_property(
        &mut self,
        method: &NodeId,
        kind: ArgumentKind,
        args: Vec<MethodArgument>,
    ) -> Result<NodeId, GraphError> {
        let dims = vec![u32::try_from(args.len()).unwrap_or(u32::MAX)];
        let mut params = AddNodeParams::property(kind.browse_name(), method.namespace, ids::ARGUMENT)
            .with_modelling_rule(ModellingRule::Mandatory);
        if let NodeClassSpec::Variable {
            value_rank,
            array_dimensions,
            value,
            ..
        } = &mut params.class
        {
            *value_rank = Some(1);
            *array_dimensions = dims;
            *value = Some(Value::Arguments(args));
        }
        let property = self.create_node(method, params)?;
        self.record_mut(&property)?.browse_name = QualifiedName::new(0, kind.browse_name());
        Ok(property)
    }

    /// Creates a method under `parent` with its argument properties.
    ///
    /// Empty argument lists create no property.
    pub fn add_method(
        &mut self,
        parent: &NodeId,
        browse_name: &str,
        namespace_index: u16,
        inputs: Vec<MethodArgument>,
        outputs: Vec<MethodArgument>,
    ) -> Result<NodeId, GraphError> {
        for arg in inputs.iter().chain(&outputs) {
            self.require_data_type(&arg.data_type)?;
        }
        let parent = parent.clone();
        self.atomically(
            |space| {
                let method = space.create_node(&parent, AddNodeParams::method(browse_name, namespace_index))?;
                check_unique(&method, &inputs)?;
                check_unique(&method, &outputs)?;
                if !inputs.is_empty() {
                    space.create_argument_property(&method, ArgumentKind::Input, inputs)?;
                }
                if !outputs.is_empty() {
                    space.create_argument_property(&method, ArgumentKind::Output, outputs)?;
                }
                Ok(method)
            },
            |method| {
                NamespaceChange::new(
                    NamespaceChangeType::Added,
                    format!("added method {method} under {parent}"),
                )
            },
        )
    }

    /// All arguments of one list; empty when the property does not exist.
    pub fn get_all_method_arguments(
        &self,
        method: &NodeId,
        kind: ArgumentKind,
    ) -> Result<Vec<MethodArgument>, GraphError> {
        self.require_method(method)?;
        let Some(property) = self.argument_property(method, kind) else {
            return Ok(Vec::new());
        };
        match &self.record_ref(&property)?.value {
            Some(Value::Arguments(args)) => Ok(args.clone()),
            _ => Ok(Vec::new()),
        }
    }

    /// One argument by name.
    pub fn get_method_argument(
        &self,
        method: &NodeId,
        kind: ArgumentKind,
        name: &str,
    ) -> Result<MethodArgument, GraphError> {
        self.get_all_method_arguments(method, kind)?
            .into_iter()
            .find(|a| a.name == name)
            .ok_or_else(|| GraphError::MemberNotFound {
                owner: method.clone(),
                name: name.to_owned(),
            })
    }

    fn write_arguments(
        &mut self,
        method: &NodeId,
        kind: ArgumentKind,
        args: Vec<MethodArgument>,
    ) -> Result<(), GraphError> {
        match self.argument_property(method, kind) {
            Some(property) => {
                self.bump();
                let record = self.record_mut(&property)?;
                record.array_dimensions = vec![u32::try_from(args.len()).unwrap_or(u32::MAX)];
                record.value = Some(Value::Arguments(args));
                self.record(
                    NamespaceChangeType::Modified,
                    format!("updated {} of {method}", kind.browse_name()),
                );
                Ok(())
            }
            None => {
                let method = method.clone();
                self.atomically(
                    |space| space.create_argument_property(&method, kind, args),
                    |property| {
                        NamespaceChange::new(
                            NamespaceChangeType::Added,
                            format!("added {property} to {method}"),
                        )
                    },
                )
                .map(|_| ())
            }
        }
    }

    /// Appends an argument to one list.
    pub fn add_method_argument(
        &mut self,
        method: &NodeId,
        kind: ArgumentKind,
        argument: MethodArgument,
    ) -> Result<(), GraphError> {
        self.require_method(method)?;
        self.ensure_writable(method.namespace)?;
        self.require_data_type(&argument.data_type)?;
        let mut args = self.get_all_method_arguments(method, kind)?;
        args.push(argument);
        check_unique(method, &args)?;
        self.write_arguments(method, kind, args)
    }

    /// Replaces the argument named `name`.
    pub fn edit_method_argument(
        &mut self,
        method: &NodeId,
        kind: ArgumentKind,
        name: &str,
        argument: MethodArgument,
    ) -> Result<(), GraphError> {
        self.require_method(method)?;
        self.ensure_writable(method.namespace)?;
        self.require_data_type(&argument.data_type)?;
        let mut args = self.get_all_method_arguments(method, kind)?;
        let slot = args
            .iter_mut()
            .find(|a| a.name == name)
            .ok_or_else(|| GraphError::MemberNotFound {
                owner: method.clone(),
                name: name.to_owned(),
            })?;
        *slot = argument;
        check_unique(method, &args)?;
        self.write_arguments(method, kind, args)
    }

    /// Removes the argument named `name`; the property stays, possibly empty.
    pub fn delete_method_argument(
        &mut self,
        method: &NodeId,
        kind: ArgumentKind,
        name: &str,
    ) -> Result<(), GraphError> {
        self.require_method(method)?;
        self.ensure_writable(method.namespace)?;
        let mut args = self.get_all_method_arguments(method, kind)?;
        let before = args.len();
        args.retain(|a| a.name != name);
        if args.len() == before {
            return Err(GraphError::MemberNotFound {
                owner: method.clone(),
                name: name.to_owned(),
            });
        }
        self.write_arguments(method, kind, args)
    }

    /// Appends a field to a structured data type.
    pub fn add_structure_item(&mut self, data_type: &NodeId, field: StructureField) -> Result<(), GraphError> {
        self.require_data_type(data_type)?;
        if !self.is_subtype_of(data_type, &ids::STRUCTURE) {
            return Err(GraphError::invalid(format!("{data_type} is not a structure")));
        }
        self.ensure_writable(data_type.namespace)?;
        self.require_data_type(&field.data_type)?;
        if field.name.trim().is_empty() {
            return Err(GraphError::invalid("field name must not be empty"));
        }
        let is_union = self.is_subtype_of(data_type, &ids::UNION);
        let record = self.record_ref(data_type)?;
        let fields = match &record.definition {
            None => Vec::new(),
            Some(DataTypeDefinition::Structure { fields, .. }) => fields.clone(),
            Some(DataTypeDefinition::Enumeration { .. }) => {
                return Err(GraphError::invalid(format!(
                    "{data_type} carries an enumeration definition"
                )))
            }
        };
        if fields.iter().any(|f| f.name == field.name) {
            return Err(GraphError::MemberExists {
                owner: data_type.clone(),
                name: field.name,
            });
        }
        let name = field.name.clone();
        let mut fields = fields;
        fields.push(field);
        self.bump();
        self.record_mut(data_type)?.definition = Some(DataTypeDefinition::Structure { fields, is_union });
        self.record(
            NamespaceChangeType::Modified,
            format!("added field {name} to {data_type}"),
        );
        Ok(())
    }

    /// Builds `<Name>Type`, a subtype of `BaseDataVariableType` with one
    /// child variable per field of the structured `data_type`.
    ///
    /// Optional fields become optional declarations, all others mandatory.
    pub fn create_variable_type_from_data_type(&mut self, data_type: &NodeId) -> Result<NodeId, GraphError> {
        self.require_data_type(data_type)?;
        let record = self.record_ref(data_type)?;
        let Some(DataTypeDefinition::Structure { fields, .. }) = record.definition.clone() else {
            return Err(GraphError::invalid(format!(
                "{data_type} has no structure definition"
            )));
        };
        let name = format!("{}Type", record.browse_name.name);
        let ns = data_type.namespace;
        let data_type = data_type.clone();
        self.atomically(
            |space| {
                let mut params = AddNodeParams::variable_type(name.as_str(), ns);
                if let NodeClassSpec::VariableType {
                    data_type: dt,
                    value_rank,
                    ..
                } = &mut params.class
                {
                    *dt = Some(data_type.clone());
                    *value_rank = Some(-1);
                }
                let ty = space.create_node(&ids::BASE_DATA_VARIABLE_TYPE, params)?;
                for field in fields {
                    let rule = if field.is_optional {
                        ModellingRule::Optional
                    } else {
                        ModellingRule::Mandatory
                    };
                    let mut child = AddNodeParams::variable(field.name, ns, field.data_type, field.value_rank)
                        .with_modelling_rule(rule);
                    if let NodeClassSpec::Variable { array_dimensions, .. } = &mut child.class {
                        *array_dimensions = field.array_dimensions;
                    }
                    child.description = field.description;
                    space.create_node(&ty, child)?;
                }
                Ok(ty)
            },
            |ty| {
                NamespaceChange::new(
                    NamespaceChangeType::Added,
                    format!("created variable type {ty} from {data_type}"),
                )
            },
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn space() -> (AddressSpace, u16) {
        let mut s = AddressSpace::new();
        let ns = s.create_namespace("urn:m", "1.0").unwrap();
        (s, ns)
    }

    #[test]
    fn method_arguments_crud() {
        let (mut s, ns) = space();
        let obj = s.create_node(&ids::OBJECTS_FOLDER, AddNodeParams::object("Pump", ns)).unwrap();
        let m = s
            .add_method(
                &obj,
                "Start",
                ns,
                vec![MethodArgument::scalar("Speed", ids::DOUBLE)],
                Vec::new(),
            )
            .unwrap();
        assert_eq!(s.get_all_method_arguments(&m, ArgumentKind::Input).unwrap().len(), 1);
        assert!(s.get_all_method_arguments(&m, ArgumentKind::Output).unwrap().is_empty());

        s.add_method_argument(&m, ArgumentKind::Output, MethodArgument::scalar("Ok", ids::BOOLEAN))
            .unwrap();
        assert_eq!(
            s.add_method_argument(&m, ArgumentKind::Input, MethodArgument::scalar("Speed", ids::INT32)),
            Err(GraphError::MemberExists {
                owner: m.clone(),
                name: "Speed".into()
            })
        );
        s.edit_method_argument(&m, ArgumentKind::Input, "Speed", MethodArgument::scalar("Rpm", ids::INT32))
            .unwrap();
        assert_eq!(
            s.get_method_argument(&m, ArgumentKind::Input, "Rpm").unwrap().data_type,
            ids::INT32
        );
        s.delete_method_argument(&m, ArgumentKind::Input, "Rpm").unwrap();
        assert!(s.get_all_method_arguments(&m, ArgumentKind::Input).unwrap().is_empty());
        assert!(matches!(
            s.delete_method_argument(&m, ArgumentKind::Input, "Rpm"),
            Err(GraphError::MemberNotFound { .. })
        ));
    }

    #[test]
    fn duplicate_inputs_roll_back_the_method() {
        let (mut s, ns) = space();
        let before = s.node_count();
        let err = s
            .add_method(
                &ids::OBJECTS_FOLDER,
                "Bad",
                ns,
                vec![
                    MethodArgument::scalar("A", ids::DOUBLE),
                    MethodArgument::scalar("A", ids::DOUBLE),
                ],
                Vec::new(),
            )
            .unwrap_err();
        assert!(matches!(err, GraphError::MemberExists { .. }));
        assert_eq!(s.node_count(), before);
    }

    #[test]
    fn structure_to_variable_type() {
        let (mut s, ns) = space();
        let dt = s
            .create_node(&ids::STRUCTURE, AddNodeParams::data_type("Point", ns))
            .unwrap();
        s.add_structure_item(&dt, StructureField::new("X", ids::DOUBLE)).unwrap();
        let mut y = StructureField::new("Y", ids::DOUBLE);
        y.is_optional = true;
        s.add_structure_item(&dt, y).unwrap();
        assert!(matches!(
            s.add_structure_item(&dt, StructureField::new("X", ids::INT32)),
            Err(GraphError::MemberExists { .. })
        ));

        let vt = s.create_variable_type_from_data_type(&dt).unwrap();
        assert_eq!(s.node(&vt).unwrap().browse_name.name, "PointType");
        assert_eq!(s.node(&vt).unwrap().data_type, Some(dt.clone()));
        assert!(s.is_subtype_of(&vt, &ids::BASE_DATA_VARIABLE_TYPE));
        let y_decl = s.search_node(&vt, "Y").unwrap();
        let link = s
            .references_of(&y_decl)
            .unwrap()
            .into_iter()
            .find(|r| r.target == vt)
            .unwrap();
        assert_eq!(link.modelling_rule, ModellingRule::Optional);
    }

    #[test]
    fn enumerations_reject_structure_items() {
        let (mut s, ns) = space();
        let e = s
            .create_node(&ids::ENUMERATION, AddNodeParams::data_type("Mode", ns))
            .unwrap();
        assert!(matches!(
            s.add_structure_item(&e, StructureField::new("X", ids::DOUBLE)),
            Err(GraphError::Validation(_))
        ));
    }
}
