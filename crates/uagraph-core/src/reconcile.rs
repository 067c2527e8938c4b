// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Comparison of live server results against the offline graph.
//!
//! Online results arrive with the server's namespace indices; they are
//! translated through the server's namespace array into local indices before
//! comparison. Reconciliation is read-only: it reports what differs and leaves
//! every fix to explicit mutation calls.
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::attributes::{AttributeId, AttributeValue};
use crate::ident::{ExpandedNodeId, NodeId};
use crate::space::AddressSpace;
use crate::standard::NAMESPACE_ZERO_URI;

/// One attribute read from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineRead {
    /// Node as addressed on the server.
    pub node_id: NodeId,
    /// Attribute read.
    pub attribute: AttributeId,
    /// Value returned; `None` when the server reported the node unknown.
    pub value: Option<AttributeValue>,
}

/// One reference returned by a server browse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineReference {
    /// Reference type (server indices).
    pub reference_type: NodeId,
    /// Far endpoint.
    pub target: ExpandedNodeId,
    /// Direction as seen from the browsed node.
    pub is_forward: bool,
}

/// Browse result for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineBrowse {
    /// Browsed node (server indices).
    pub node_id: NodeId,
    /// Every reference the server returned.
    pub references: Vec<OnlineReference>,
}

/// One difference between server and offline graph. Ids are local.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Discrepancy {
    /// The server namespace has no local counterpart.
    UnmappedNamespace {
        /// Server namespace URI (or the index as text when out of range).
        uri: String,
    },
    /// The server has a node the offline graph lacks.
    MissingOffline {
        /// Local id of the node.
        node_id: NodeId,
    },
    /// The server reported a node unknown that exists offline.
    MissingOnline {
        /// Local id of the node.
        node_id: NodeId,
    },
    /// An attribute differs.
    AttributeMismatch {
        /// Local id of the node.
        node_id: NodeId,
        /// Attribute compared.
        attribute: AttributeId,
        /// Offline value; `None` when the attribute does not apply offline.
        offline: Option<AttributeValue>,
        /// Online value.
        online: AttributeValue,
    },
    /// The server has a reference the offline graph lacks.
    MissingReference {
        /// Browsed node.
        node_id: NodeId,
        /// Far endpoint.
        target: NodeId,
        /// Reference type.
        reference_type: NodeId,
        /// Direction from `node_id`.
        is_forward: bool,
    },
    /// The offline graph has a reference the browse did not return.
    ExtraReference {
        /// Browsed node.
        node_id: NodeId,
        /// Far endpoint.
        target: NodeId,
        /// Reference type.
        reference_type: NodeId,
        /// Direction from `node_id`.
        is_forward: bool,
    },
}

/// Outcome of [`AddressSpace::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Every difference found, in input order.
    pub discrepancies: Vec<Discrepancy>,
    /// Number of distinct local nodes compared.
    pub checked_nodes: usize,
}

impl ReconcileReport {
    /// Returns `true` when nothing differs.
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

struct ServerIndex<'a> {
    space: &'a AddressSpace,
    server_namespaces: &'a [String],
    unmapped: FxHashSet<String>,
    report: ReconcileReport,
}

impl ServerIndex<'_> {
    fn local_ns(&mut self, server_index: u16) -> Option<u16> {
        let uri = match self.server_namespaces.get(usize::from(server_index)) {
            Some(uri) => uri.clone(),
            None if server_index == 0 => NAMESPACE_ZERO_URI.to_owned(),
            None => {
                self.unmapped(server_index.to_string());
                return None;
            }
        };
        let local = self.space.namespaces.index_of(&uri);
        if local.is_none() {
            self.unmapped(uri);
        }
        local
    }

    fn unmapped(&mut self, uri: String) {
        if self.unmapped.insert(uri.clone()) {
            self.report
                .discrepancies
                .push(Discrepancy::UnmappedNamespace { uri });
        }
    }

    fn local_id(&mut self, id: &NodeId) -> Option<NodeId> {
        self.local_ns(id.namespace).map(|ns| id.with_namespace(ns))
    }

    fn local_expanded(&mut self, id: &ExpandedNodeId) -> Option<NodeId> {
        if !id.is_local() {
            return None;
        }
        match &id.namespace_uri {
            Some(uri) => {
                let local = self.space.namespaces.index_of(uri);
                if local.is_none() {
                    self.unmapped(uri.clone());
                }
                local.map(|ns| id.node_id.with_namespace(ns))
            }
            None => self.local_id(&id.node_id),
        }
    }

    fn local_value(&mut self, value: AttributeValue) -> Option<AttributeValue> {
        Some(match value {
            AttributeValue::NodeId(id) => AttributeValue::NodeId(self.local_id(&id)?),
            AttributeValue::QualifiedName(mut name) => {
                name.namespace_index = self.local_ns(name.namespace_index)?;
                AttributeValue::QualifiedName(name)
            }
            other => other,
        })
    }
}

impl AddressSpace {
    /// Compares server reads and browses with the offline graph.
    ///
    /// `server_namespaces` is the server's namespace array. Remote targets
    /// (non-zero server index) are skipped. Offline references are compared
    /// only for browsed nodes, so a partial browse never reports the rest of
    /// the graph as extra.
    pub fn reconcile(
        &self,
        server_namespaces: &[String],
        reads: &[OnlineRead],
        browses: &[OnlineBrowse],
    ) -> ReconcileReport {
        let mut idx = ServerIndex {
            space: self,
            server_namespaces,
            unmapped: FxHashSet::default(),
            report: ReconcileReport::default(),
        };
        let mut checked: FxHashSet<NodeId> = FxHashSet::default();
        let mut missing: FxHashSet<NodeId> = FxHashSet::default();

        for read in reads {
            let Some(id) = idx.local_id(&read.node_id) else {
                continue;
            };
            checked.insert(id.clone());
            let known = self.nodes.contains_key(&id);
            match (&read.value, known) {
                (None, true) => {
                    if missing.insert(id.clone()) {
                        idx.report
                            .discrepancies
                            .push(Discrepancy::MissingOnline { node_id: id });
                    }
                }
                (None, false) => {}
                (Some(_), false) => {
                    if missing.insert(id.clone()) {
                        idx.report
                            .discrepancies
                            .push(Discrepancy::MissingOffline { node_id: id });
                    }
                }
                (Some(value), true) => {
                    let Some(online) = idx.local_value(value.clone()) else {
                        continue;
                    };
                    let offline = self.attribute(&id, read.attribute).ok();
                    if offline.as_ref() != Some(&online) {
                        idx.report.discrepancies.push(Discrepancy::AttributeMismatch {
                            node_id: id,
                            attribute: read.attribute,
                            offline,
                            online,
                        });
                    }
                }
            }
        }

        for browse in browses {
            let Some(id) = idx.local_id(&browse.node_id) else {
                continue;
            };
            checked.insert(id.clone());
            if !self.nodes.contains_key(&id) {
                if missing.insert(id.clone()) {
                    idx.report
                        .discrepancies
                        .push(Discrepancy::MissingOffline { node_id: id });
                }
                continue;
            }
            let mut online: FxHashSet<(NodeId, NodeId, bool)> = FxHashSet::default();
            for r in &browse.references {
                let (Some(target), Some(ty)) =
                    (idx.local_expanded(&r.target), idx.local_id(&r.reference_type))
                else {
                    continue;
                };
                online.insert((target, ty, r.is_forward));
            }
            let offline: FxHashSet<(NodeId, NodeId, bool)> = self
                .graph
                .outgoing(&id)
                .map(|r| (r.target.clone(), r.reference_type.clone(), true))
                .chain(
                    self.graph
                        .incoming(&id)
                        .map(|r| (r.source.clone(), r.reference_type.clone(), false)),
                )
                .collect();
            let mut missing_refs: Vec<_> = online.difference(&offline).cloned().collect();
            missing_refs.sort();
            for (target, reference_type, is_forward) in missing_refs {
                idx.report.discrepancies.push(Discrepancy::MissingReference {
                    node_id: id.clone(),
                    target,
                    reference_type,
                    is_forward,
                });
            }
            let mut extra: Vec<_> = offline.difference(&online).cloned().collect();
            extra.sort();
            for (target, reference_type, is_forward) in extra {
                idx.report.discrepancies.push(Discrepancy::ExtraReference {
                    node_id: id.clone(),
                    target,
                    reference_type,
                    is_forward,
                });
            }
        }

        let mut report = idx.report;
        report.checked_nodes = checked.len();
        debug!(
            checked = report.checked_nodes,
            discrepancies = report.discrepancies.len(),
            "reconciled online results"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::ident::QualifiedName;
    use crate::space::AddNodeParams;
    use crate::standard::ids;

    fn offline() -> (AddressSpace, NodeId) {
        let mut s = AddressSpace::new();
        let ns = s.create_namespace("urn:plant", "1.0").unwrap();
        let pump = s
            .create_node(&ids::OBJECTS_FOLDER, AddNodeParams::object("Pump", ns))
            .unwrap();
        (s, pump)
    }

    // Server lists the plant namespace at index 3.
    fn server_ns() -> Vec<String> {
        vec![
            NAMESPACE_ZERO_URI.to_owned(),
            "urn:a".into(),
            "urn:b".into(),
            "urn:plant".into(),
        ]
    }

    #[test]
    fn matching_reads_are_consistent_after_translation() {
        let (s, pump) = offline();
        let server_pump = pump.with_namespace(3);
        let reads = vec![OnlineRead {
            node_id: server_pump,
            attribute: AttributeId::BrowseName,
            value: Some(AttributeValue::QualifiedName(QualifiedName::new(3, "Pump"))),
        }];
        let report = s.reconcile(&server_ns(), &reads, &[]);
        assert!(report.is_consistent(), "{report:?}");
        assert_eq!(report.checked_nodes, 1);
    }

    #[test]
    fn differences_are_reported_without_mutation() {
        let (s, pump) = offline();
        let before = s.generation();
        let reads = vec![
            OnlineRead {
                node_id: pump.with_namespace(3),
                attribute: AttributeId::BrowseName,
                value: Some(AttributeValue::QualifiedName(QualifiedName::new(3, "Motor"))),
            },
            OnlineRead {
                node_id: NodeId::numeric(3, 4242),
                attribute: AttributeId::BrowseName,
                value: Some(AttributeValue::QualifiedName(QualifiedName::new(3, "Valve"))),
            },
            OnlineRead {
                node_id: NodeId::numeric(1, 1),
                attribute: AttributeId::BrowseName,
                value: None,
            },
        ];
        let report = s.reconcile(&server_ns(), &reads, &[]);
        assert!(report
            .discrepancies
            .iter()
            .any(|d| matches!(d, Discrepancy::AttributeMismatch { .. })));
        assert!(report
            .discrepancies
            .contains(&Discrepancy::MissingOffline { node_id: NodeId::numeric(1, 4242) }));
        assert!(report
            .discrepancies
            .contains(&Discrepancy::UnmappedNamespace { uri: "urn:a".into() }));
        assert_eq!(s.generation(), before);
    }

    #[test]
    fn browse_compares_both_directions() {
        let (s, pump) = offline();
        let browse = OnlineBrowse {
            node_id: pump.with_namespace(3),
            references: vec![
                OnlineReference {
                    reference_type: ids::ORGANIZES,
                    target: ExpandedNodeId::local(ids::OBJECTS_FOLDER),
                    is_forward: false,
                },
                OnlineReference {
                    reference_type: ids::HAS_COMPONENT,
                    target: ExpandedNodeId::local(NodeId::numeric(3, 9)),
                    is_forward: true,
                },
            ],
        };
        let report = s.reconcile(&server_ns(), &[], &[browse]);
        assert!(report.discrepancies.contains(&Discrepancy::MissingReference {
            node_id: pump.clone(),
            target: NodeId::numeric(1, 9),
            reference_type: ids::HAS_COMPONENT,
            is_forward: true,
        }));
        // The offline type definition was not returned by the browse.
        assert!(report.discrepancies.contains(&Discrepancy::ExtraReference {
            node_id: pump,
            target: ids::BASE_OBJECT_TYPE,
            reference_type: ids::HAS_TYPE_DEFINITION,
            is_forward: true,
        }));
    }
}
