// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Reference classification and special node classes.
//!
//! [`AddressSpace::set_references`] is an explicit, graph-wide pass: it
//! matches every hierarchical reference of an instance against the instance
//! declarations of the source's type (and interfaces) and records the result
//! on the reference. Edits made afterwards leave those flags stale until the
//! next pass.
use std::sync::{Mutex, PoisonError};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::GraphError;
use crate::ident::{NodeId, QualifiedName};
use crate::notify::{NamespaceChange, NamespaceChangeType};
use crate::record::{ModellingRule, NodeClass, ReferenceId, ReferenceKey};
use crate::space::{AddNodeParams, AddressSpace, NodeClassSpec};
use crate::standard::{self, ids};

/// Flags classifying a node against well-known type categories.
///
/// Type nodes are classified by their own supertype chain; objects and
/// variables by the chain of their type definition.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpecialNodeClasses {
    /// Built-in data type (namespace zero, ids 1..=29).
    pub is_base_data_type: bool,
    /// Data type that is not built in.
    pub is_derived_data_type: bool,
    /// Subtype of `Enumeration`.
    pub is_enumeration: bool,
    /// Subtype of `Structure`.
    pub is_structure: bool,
    /// Subtype of `Union`.
    pub is_union: bool,
    /// Subtype of `OptionSet`.
    pub is_option_set: bool,
    /// `StateMachineType` or an instance of it.
    pub is_state_machine: bool,
    /// `FiniteStateMachineType` or an instance of it.
    pub is_finite_state_machine: bool,
    /// `StateType` or an instance of it.
    pub is_state: bool,
    /// `TransitionType` or an instance of it.
    pub is_transition: bool,
    /// `GuardVariableType` or an instance of it.
    pub is_guard: bool,
    /// `ExpressionGuardVariableType` or an instance of it.
    pub is_expression_guard: bool,
    /// `ElseGuardVariableType` or an instance of it.
    pub is_else_guard: bool,
    /// `BaseInterfaceType` or an instance of it.
    pub is_interface: bool,
    /// `BaseEventType` or an instance of it.
    pub is_event_type: bool,
    /// `EnumStrings` property.
    pub is_enum_strings: bool,
    /// `EnumValues` property.
    pub is_enum_values: bool,
    /// `OptionSetValues` property.
    pub is_option_set_values: bool,
}

/// Memoized [`SpecialNodeClasses`] keyed by node.
///
/// Interior mutability lets read-only queries fill the cache while the space
/// is shared behind a read lock. Cleared whenever a type chain may change.
#[derive(Debug, Default)]
pub(crate) struct ClassCache(Mutex<FxHashMap<NodeId, SpecialNodeClasses>>);

impl Clone for ClassCache {
    fn clone(&self) -> Self {
        let map = self.0.lock().unwrap_or_else(PoisonError::into_inner).clone();
        Self(Mutex::new(map))
    }
}

impl ClassCache {
    pub(crate) fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn get(&self, id: &NodeId) -> Option<SpecialNodeClasses> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .copied()
    }

    fn put(&self, id: NodeId, classes: SpecialNodeClasses) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, classes);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// One instance declaration visible to an instance.
#[derive(Debug, Clone)]
struct Declaration {
    target: NodeId,
    browse_name: QualifiedName,
    reference_type: NodeId,
    modelling_rule: ModellingRule,
    type_definition: Option<NodeId>,
    from_interface: bool,
}

/// Memo for declaration lookups during one pass.
#[derive(Default)]
struct DeclarationMemo {
    by_node: FxHashMap<NodeId, Vec<Declaration>>,
    in_progress: FxHashSet<NodeId>,
}

impl AddressSpace {
    /// Classifies every hierarchical reference from an instance as a
    /// type reference, interface reference, or placeholder instance.
    ///
    /// Full recomputation, O(total references × declarations per type). Does
    /// not change `is_active` and emits no change event.
    pub fn set_references(&mut self) {
        let hierarchical = self.hierarchical_types();
        let mut memo = DeclarationMemo::default();
        let mut updates: Vec<(ReferenceId, Option<(Declaration, bool)>)> = Vec::new();

        for r in self.graph.iter() {
            let skip = r.reference_type == ids::HAS_TYPE_DEFINITION
                || r.reference_type == ids::HAS_SUBTYPE
                || r.reference_type == ids::HAS_INTERFACE
                || !hierarchical.contains(&r.reference_type);
            let source_is_instance = self
                .nodes
                .get(&r.source)
                .is_some_and(|n| n.node_class.is_typed_instance());
            if skip || !source_is_instance {
                updates.push((r.id, None));
                continue;
            }
            let found = self.match_declaration(&r.source, &r.target, &r.reference_type, &hierarchical, &mut memo);
            updates.push((r.id, found));
        }

        let mut typed = 0usize;
        for (id, found) in updates {
            if let Some(r) = self.graph.get_mut(id) {
                r.is_type_reference = false;
                r.is_interface_reference = false;
                r.is_placeholder_instance = false;
                r.original_target_in_types = None;
                if let Some((decl, placeholder)) = found {
                    typed += 1;
                    r.is_interface_reference = decl.from_interface;
                    r.is_type_reference = !decl.from_interface;
                    r.is_placeholder_instance = placeholder;
                    r.original_target_in_types = Some(decl.target);
                }
            }
        }
        self.classified_at = Some(self.generation);
        info!(generation = self.generation, typed, "classified references");
    }

    fn match_declaration(
        &self,
        source: &NodeId,
        child: &NodeId,
        reference_type: &NodeId,
        hierarchical: &FxHashSet<NodeId>,
        memo: &mut DeclarationMemo,
    ) -> Option<(Declaration, bool)> {
        let child_record = self.nodes.get(child)?;
        let decls = self.declarations(source, hierarchical, memo);
        if let Some(d) = decls
            .iter()
            .find(|d| d.browse_name == child_record.browse_name)
        {
            return Some((d.clone(), false));
        }
        let child_type = self.type_definition_of(child);
        decls
            .iter()
            .find(|d| {
                d.modelling_rule.is_placeholder()
                    && &d.reference_type == reference_type
                    && d.type_definition == child_type
            })
            .map(|d| (d.clone(), true))
    }

    /// Instance declarations visible to `instance`: those of its type chain,
    /// those of its interfaces, and the children of its own counterpart
    /// declaration when `instance` is itself a declared child.
    fn declarations(
        &self,
        instance: &NodeId,
        hierarchical: &FxHashSet<NodeId>,
        memo: &mut DeclarationMemo,
    ) -> Vec<Declaration> {
        if let Some(found) = memo.by_node.get(instance) {
            return found.clone();
        }
        if !memo.in_progress.insert(instance.clone()) {
            return Vec::new();
        }
        let mut out: Vec<Declaration> = Vec::new();
        let mut owners: Vec<NodeId> = Vec::new();
        if let Some(td) = self.type_definition_of(instance) {
            owners.extend(self.type_chain(&td));
        }
        for owner in &owners {
            self.push_declarations(owner, false, hierarchical, &mut out);
        }

        if let Some(counterpart) = self.counterpart(instance, hierarchical, memo) {
            self.push_declarations(&counterpart, false, hierarchical, &mut out);
        }

        let mut interface_holders = vec![instance.clone()];
        interface_holders.extend(owners);
        for holder in interface_holders {
            let interfaces: Vec<NodeId> = self
                .graph
                .outgoing(&holder)
                .filter(|r| r.reference_type == ids::HAS_INTERFACE)
                .map(|r| r.target.clone())
                .collect();
            for interface in interfaces {
                for ty in self.type_chain(&interface) {
                    self.push_declarations(&ty, true, hierarchical, &mut out);
                }
            }
        }

        memo.in_progress.remove(instance);
        memo.by_node.insert(instance.clone(), out.clone());
        out
    }

    /// The declaration inside a type that `instance` instantiates, found by
    /// browse name among the declarations of its hierarchical parents.
    fn counterpart(
        &self,
        instance: &NodeId,
        hierarchical: &FxHashSet<NodeId>,
        memo: &mut DeclarationMemo,
    ) -> Option<NodeId> {
        let name = &self.nodes.get(instance)?.browse_name;
        let parents: Vec<NodeId> = self
            .graph
            .incoming(instance)
            .filter(|r| {
                hierarchical.contains(&r.reference_type)
                    && r.reference_type != ids::HAS_SUBTYPE
                    && r.source != *instance
            })
            .map(|r| r.source.clone())
            .collect();
        for parent in parents {
            if !self
                .nodes
                .get(&parent)
                .is_some_and(|n| n.node_class.is_typed_instance())
            {
                continue;
            }
            if let Some(d) = self
                .declarations(&parent, hierarchical, memo)
                .into_iter()
                .find(|d| &d.browse_name == name)
            {
                return Some(d.target);
            }
        }
        None
    }

    /// Appends the declared children of `owner`; earlier entries win on
    /// browse-name clashes so subtypes override their supertypes.
    fn push_declarations(
        &self,
        owner: &NodeId,
        from_interface: bool,
        hierarchical: &FxHashSet<NodeId>,
        out: &mut Vec<Declaration>,
    ) {
        for r in self.graph.outgoing(owner) {
            if r.reference_type == ids::HAS_SUBTYPE || !hierarchical.contains(&r.reference_type) {
                continue;
            }
            let Some(target) = self.nodes.get(&r.target) else {
                continue;
            };
            if out.iter().any(|d| d.browse_name == target.browse_name) {
                continue;
            }
            out.push(Declaration {
                target: r.target.clone(),
                browse_name: target.browse_name.clone(),
                reference_type: r.reference_type.clone(),
                modelling_rule: r.modelling_rule,
                type_definition: self.type_definition_of(&r.target),
                from_interface,
            });
        }
    }

    /// Resolves the instance declaration of `source`'s type named
    /// `browse_name`, then toggles `is_active` on the child reference that
    /// realises it, or instantiates the declaration when there is none yet.
    /// Children no declaration backs are never toggled.
    ///
    /// Returns the resulting `is_active` state. Instantiation copies the
    /// declaration and, recursively, its mandatory children.
    pub fn activate_type_reference(
        &mut self,
        source: &NodeId,
        browse_name: &str,
        reference_type: Option<&NodeId>,
    ) -> Result<bool, GraphError> {
        self.record_ref(source)?;
        self.ensure_writable(source.namespace)?;
        let hierarchical = self.hierarchical_types();
        let (namespace, name) = QualifiedName::split_term(browse_name);
        let name_matches = |qn: &QualifiedName| {
            qn.name == name && namespace.is_none_or(|ns| qn.namespace_index == ns)
        };
        let type_matches = |ty: &NodeId| reference_type.is_none_or(|want| want == ty);

        let mut memo = DeclarationMemo::default();
        let decl = self
            .declarations(source, &hierarchical, &mut memo)
            .into_iter()
            .find(|d| name_matches(&d.browse_name) && type_matches(&d.reference_type))
            .ok_or_else(|| GraphError::BrowseNameNotFound {
                parent: source.clone(),
                term: browse_name.to_owned(),
            })?;

        // Same pairing as `set_references`: the instance child carrying the
        // declaration's browse name.
        let existing = self
            .graph
            .outgoing(source)
            .find(|r| {
                hierarchical.contains(&r.reference_type)
                    && r.reference_type != ids::HAS_SUBTYPE
                    && self.nodes.get(&r.target).is_some_and(|n| n.browse_name == decl.browse_name)
            })
            .map(|r| r.id);
        if let Some(id) = existing {
            let state = match self.graph.get_mut(id) {
                Some(r) => {
                    r.is_active = !r.is_active;
                    r.is_active
                }
                None => return Err(GraphError::invalid("reference index out of sync")),
            };
            self.bump();
            self.record(
                NamespaceChangeType::Modified,
                format!("set {browse_name} of {source} active={state}"),
            );
            return Ok(state);
        }

        let source = source.clone();
        let label = browse_name.to_owned();
        self.atomically(
            |space| {
                let mut visiting = FxHashSet::default();
                space.instantiate(&source, &decl, &mut visiting)?;
                Ok(true)
            },
            |_| {
                NamespaceChange::new(
                    NamespaceChangeType::Added,
                    format!("instantiated {label} under {source}"),
                )
            },
        )
    }

    fn instantiate(
        &mut self,
        parent: &NodeId,
        decl: &Declaration,
        visiting: &mut FxHashSet<NodeId>,
    ) -> Result<NodeId, GraphError> {
        if !visiting.insert(decl.target.clone()) {
            return Err(GraphError::CycleDetected {
                parent: parent.clone(),
                child: decl.target.clone(),
            });
        }
        let template = self.record_ref(&decl.target)?.clone();
        let class = match template.node_class {
            NodeClass::Object => NodeClassSpec::Object {
                type_definition: decl.type_definition.clone(),
                event_notifier: template.event_notifier,
            },
            NodeClass::Variable => NodeClassSpec::Variable {
                data_type: template.data_type.clone(),
                value_rank: template.value_rank,
                array_dimensions: template.array_dimensions.clone(),
                value: template.value.clone(),
                type_definition: decl.type_definition.clone(),
                access_level: template.access_level,
            },
            NodeClass::Method => NodeClassSpec::Method {
                executable: template.executable,
            },
            other => {
                return Err(GraphError::invalid(format!(
                    "{other:?} declarations cannot be instantiated"
                )))
            }
        };
        let params = AddNodeParams {
            browse_name: template.browse_name.name.clone(),
            namespace_index: parent.namespace,
            node_id: None,
            reference_type: Some(decl.reference_type.clone()),
            display_name: Some(template.display_name.clone()),
            description: template.description.clone(),
            modelling_rule: ModellingRule::None,
            class,
        };
        let created = self.create_node(parent, params)?;
        let link = ReferenceKey {
            source: parent.clone(),
            target: created.clone(),
            reference_type: decl.reference_type.clone(),
        };
        if let Some(id) = self.graph.find(&link) {
            if let Some(r) = self.graph.get_mut(id) {
                r.is_type_reference = !decl.from_interface;
                r.is_interface_reference = decl.from_interface;
                r.original_target_in_types = Some(decl.target.clone());
            }
        }
        if let Some(name) = self.nodes.get_mut(&created).map(|n| &mut n.browse_name) {
            *name = template.browse_name.clone();
        }
        debug!(declaration = %decl.target, instance = %created, "instantiated declaration");

        let hierarchical = self.hierarchical_types();
        let mut nested = Vec::new();
        self.push_declarations(&decl.target, decl.from_interface, &hierarchical, &mut nested);
        for child in nested {
            if child.modelling_rule == ModellingRule::Mandatory {
                self.instantiate(&created, &child, visiting)?;
            }
        }
        visiting.remove(&decl.target);
        Ok(created)
    }

    /// Special node classes of `id`, memoized until the type hierarchy changes.
    pub fn special_node_classes(&self, id: &NodeId) -> Result<SpecialNodeClasses, GraphError> {
        let record = self.record_ref(id)?;
        if let Some(hit) = self.classes.get(id) {
            return Ok(hit);
        }
        let base = if record.node_class.is_type() {
            Some(id.clone())
        } else {
            self.type_definition_of(id)
        };
        let sub = |target: &NodeId| base.as_ref().is_some_and(|b| self.is_subtype_of(b, target));
        let is_data_type = record.node_class == NodeClass::DataType;
        let is_variable = record.node_class == NodeClass::Variable;
        let named = |n: &str| {
            is_variable && record.browse_name.namespace_index == 0 && record.browse_name.name == n
        };
        let classes = SpecialNodeClasses {
            is_base_data_type: is_data_type && standard::is_builtin_data_type(id),
            is_derived_data_type: is_data_type && !standard::is_builtin_data_type(id),
            is_enumeration: is_data_type && sub(&ids::ENUMERATION),
            is_structure: is_data_type && sub(&ids::STRUCTURE),
            is_union: is_data_type && sub(&ids::UNION),
            is_option_set: is_data_type && sub(&ids::OPTION_SET),
            is_state_machine: sub(&ids::STATE_MACHINE_TYPE),
            is_finite_state_machine: sub(&ids::FINITE_STATE_MACHINE_TYPE),
            is_state: sub(&ids::STATE_TYPE),
            is_transition: sub(&ids::TRANSITION_TYPE),
            is_guard: sub(&ids::GUARD_VARIABLE_TYPE),
            is_expression_guard: sub(&ids::EXPRESSION_GUARD_VARIABLE_TYPE),
            is_else_guard: sub(&ids::ELSE_GUARD_VARIABLE_TYPE),
            is_interface: sub(&ids::BASE_INTERFACE_TYPE),
            is_event_type: sub(&ids::BASE_EVENT_TYPE),
            is_enum_strings: named(standard::ENUM_STRINGS),
            is_enum_values: named(standard::ENUM_VALUES),
            is_option_set_values: named(standard::OPTION_SET_VALUES),
        };
        self.classes.put(id.clone(), classes);
        Ok(classes)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    /// `PumpType` with a mandatory `Speed`, an optional `Mode`, and an
    /// optional placeholder `<Sensor>`; `pump` is an instance with `Speed`.
    fn pump_fixture() -> (AddressSpace, u16, NodeId, NodeId) {
        let mut s = AddressSpace::new();
        let ns = s.create_namespace("urn:pumps", "1.0").unwrap();
        let ty = s
            .create_node(&ids::BASE_OBJECT_TYPE, AddNodeParams::object_type("PumpType", ns))
            .unwrap();
        s.create_node(
            &ty,
            AddNodeParams::variable("Speed", ns, ids::DOUBLE, -1)
                .with_modelling_rule(ModellingRule::Mandatory),
        )
        .unwrap();
        s.create_node(
            &ty,
            AddNodeParams::variable("Mode", ns, ids::INT32, -1)
                .with_modelling_rule(ModellingRule::Optional),
        )
        .unwrap();
        s.create_node(
            &ty,
            AddNodeParams::object("<Sensor>", ns).with_modelling_rule(ModellingRule::OptionalPlaceholder),
        )
        .unwrap();
        let pump = s
            .create_node(
                &ids::OBJECTS_FOLDER,
                AddNodeParams::object("Pump1", ns).with_type_definition(ty.clone()),
            )
            .unwrap();
        s.create_node(&pump, AddNodeParams::variable("Speed", ns, ids::DOUBLE, -1))
            .unwrap();
        (s, ns, ty, pump)
    }

    #[test]
    fn pass_marks_declared_and_placeholder_children() {
        let (mut s, ns, _ty, pump) = pump_fixture();
        let extra = s
            .create_node(&pump, AddNodeParams::object("TempSensor", ns))
            .unwrap();
        let plain = s
            .create_node(&pump, AddNodeParams::variable("Unrelated", ns, ids::STRING, -1))
            .unwrap();
        s.set_references();

        let refs = s.active_type_references(&pump).unwrap();
        assert_eq!(refs.len(), 2, "Speed and the placeholder instance");
        let sensor = s.references_of(&extra).unwrap();
        let link = sensor.iter().find(|r| r.target == pump).unwrap();
        assert!(link.is_placeholder_instance);
        let unrelated = s.references_of(&plain).unwrap();
        assert!(unrelated.iter().all(|r| !r.is_type_reference));
    }

    #[test]
    fn activate_toggles_then_instantiates() {
        let (mut s, _ns, _ty, pump) = pump_fixture();
        assert!(!s.activate_type_reference(&pump, "Speed", None).unwrap());
        assert!(s.activate_type_reference(&pump, "Speed", None).unwrap());

        assert!(s.activate_type_reference(&pump, "Mode", None).unwrap());
        let mode = s.search_node(&pump, "Mode").unwrap();
        assert_eq!(s.node(&mode).unwrap().data_type, Some(ids::INT32));

        assert!(matches!(
            s.activate_type_reference(&pump, "Missing", None),
            Err(GraphError::BrowseNameNotFound { .. })
        ));
    }

    #[test]
    fn undeclared_children_are_not_toggled() {
        let (mut s, ns, _ty, pump) = pump_fixture();
        let plain = s
            .create_node(&pump, AddNodeParams::variable("Unrelated", ns, ids::STRING, -1))
            .unwrap();
        let before = s.references_of(&plain).unwrap();
        assert!(matches!(
            s.activate_type_reference(&pump, "Unrelated", None),
            Err(GraphError::BrowseNameNotFound { .. })
        ));
        assert_eq!(s.references_of(&plain).unwrap(), before);
    }

    #[test]
    fn special_classes_follow_the_type_chain() {
        let mut s = AddressSpace::new();
        let ns = s.create_namespace("urn:sm", "1.0").unwrap();
        let sm = s
            .create_node(
                &ids::FINITE_STATE_MACHINE_TYPE,
                AddNodeParams::object_type("MyMachine", ns),
            )
            .unwrap();
        let inst = s
            .create_node(
                &ids::OBJECTS_FOLDER,
                AddNodeParams::object("M1", ns).with_type_definition(sm.clone()),
            )
            .unwrap();
        let c = s.special_node_classes(&inst).unwrap();
        assert!(c.is_state_machine && c.is_finite_state_machine);
        assert!(!c.is_state);

        let dt = s.special_node_classes(&ids::INT32).unwrap();
        assert!(dt.is_base_data_type && !dt.is_structure);
        assert!(s.classes.len() >= 2);
        s.delete_node(&inst).unwrap();
        assert_eq!(s.classes.len(), 0);
    }
}
