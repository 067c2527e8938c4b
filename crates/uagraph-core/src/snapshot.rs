// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Export snapshots with deterministic serialization.
//!
//! A [`ModelSnapshot`] rewrites namespace indices to snapshot-local ones (0 is
//! namespace zero, exported namespaces follow in table order, namespaces that
//! are only referenced come last), sorts nodes and references, and drops UI
//! state. Two spaces with the same exported content produce byte-identical
//! canonical encodings regardless of their namespace order or edit history.
use std::cell::RefCell;
use std::collections::BTreeSet;

use ciborium::ser::into_writer;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GraphError;
use crate::ident::NodeId;
use crate::import::{ImportBatch, ImportNamespace, ImportReference};
use crate::record::{MappingState, NodeRecord};
use crate::space::AddressSpace;
use crate::standard::NAMESPACE_ZERO_URI;

/// Blake3 digest of a snapshot's canonical bytes.
pub type SnapshotDigest = [u8; 32];

/// What a snapshot contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Namespaces to export; empty exports every user namespace.
    pub namespace_uris: Vec<String>,
    /// Keep external mappings and their state.
    pub include_mappings: bool,
    /// Keep variable values.
    pub include_values: bool,
    /// Also export the namespace-zero nodes.
    pub include_namespace_zero: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            namespace_uris: Vec::new(),
            include_mappings: true,
            include_values: true,
            include_namespace_zero: false,
        }
    }
}

/// Self-contained export of part of an address space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    /// Exported namespaces; snapshot index `i + 1`.
    pub namespaces: Vec<ImportNamespace>,
    /// Namespaces referenced by exported content but not exported themselves;
    /// indices continue after `namespaces`.
    pub referenced_namespaces: Vec<ImportNamespace>,
    /// Nodes sorted by id.
    pub nodes: Vec<NodeRecord>,
    /// References in stored direction, sorted by (source, target, type).
    pub references: Vec<ImportReference>,
}

impl ModelSnapshot {
    /// Canonical CBOR encoding.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, GraphError> {
        let mut bytes = Vec::new();
        into_writer(self, &mut bytes).map_err(|e| GraphError::Encode(e.to_string()))?;
        Ok(bytes)
    }

    /// Blake3 hash of the canonical form.
    pub fn digest(&self) -> Result<SnapshotDigest, GraphError> {
        Ok(blake3::hash(&self.to_canonical_bytes()?).into())
    }

    /// Lower-case hex of [`ModelSnapshot::digest`].
    pub fn digest_hex(&self) -> Result<String, GraphError> {
        Ok(hex::encode(self.digest()?))
    }

    /// Converts the snapshot into a batch for [`AddressSpace::import`].
    ///
    /// Namespace-zero nodes and references between them are left out; they
    /// only load through `update_namespace_zero`.
    pub fn into_import_batch(self) -> ImportBatch {
        let mut namespaces = self.namespaces;
        namespaces.extend(self.referenced_namespaces);
        ImportBatch {
            namespaces,
            nodes: self
                .nodes
                .into_iter()
                .filter(|n| n.node_id.namespace != 0)
                .collect(),
            references: self
                .references
                .into_iter()
                .filter(|r| r.source.namespace != 0 || r.target.namespace != 0)
                .collect(),
        }
    }
}

fn export_namespace(space: &AddressSpace, index: u16) -> Option<ImportNamespace> {
    space.namespaces.get(index).map(|ns| ImportNamespace {
        uri: ns.uri.clone(),
        version: ns.version.clone(),
        publication_date: ns.publication_date.clone(),
        filename: ns.filename.clone(),
        depends_on: ns.depends_on.iter().cloned().collect(),
    })
}

impl AddressSpace {
    /// Takes an export snapshot.
    pub fn snapshot(&self, options: &ExportOptions) -> Result<ModelSnapshot, GraphError> {
        let exported: Vec<u16> = if options.namespace_uris.is_empty() {
            self.namespaces.iter().map(|(i, _)| i).filter(|&i| i != 0).collect()
        } else {
            let mut picked = BTreeSet::new();
            for uri in options.namespace_uris.iter().filter(|u| *u != NAMESPACE_ZERO_URI) {
                picked.insert(self.namespaces.require(uri)?);
            }
            picked.into_iter().collect()
        };
        let in_scope = |ns: u16| (ns == 0 && options.include_namespace_zero) || exported.contains(&ns);

        let nodes: Vec<&NodeRecord> = self
            .nodes
            .values()
            .filter(|n| in_scope(n.node_id.namespace))
            .collect();
        let references: Vec<_> = self
            .graph
            .iter()
            .filter(|r| {
                let (s, t) = (r.source.namespace, r.target.namespace);
                (in_scope(s) || in_scope(t)) && (in_scope(s) || s == 0) && (in_scope(t) || t == 0)
            })
            .collect();

        // Namespaces referenced from exported content, beyond the exported set.
        let seen = RefCell::new(BTreeSet::new());
        let note_id = |id: &NodeId| {
            seen.borrow_mut().insert(id.namespace);
            id.clone()
        };
        let note_ns = |ns: u16| {
            seen.borrow_mut().insert(ns);
            ns
        };
        for node in &nodes {
            let mut probe = (*node).clone();
            probe.remap(&note_id, &note_ns);
        }
        for r in &references {
            note_id(&r.reference_type);
        }
        let referenced: Vec<u16> = seen
            .into_inner()
            .into_iter()
            .filter(|&ns| ns != 0 && !exported.contains(&ns))
            .collect();

        let local = |ns: u16| -> u16 {
            if ns == 0 {
                return 0;
            }
            let position = exported
                .iter()
                .chain(referenced.iter())
                .position(|&i| i == ns)
                .unwrap_or(usize::from(ns));
            u16::try_from(position + 1).unwrap_or(ns)
        };
        let local_id = |id: &NodeId| id.with_namespace(local(id.namespace));

        let mut out_nodes: Vec<NodeRecord> = nodes
            .into_iter()
            .map(|n| {
                let mut record = n.clone();
                record.remap(&local_id, &local);
                record.is_selected = false;
                if !options.include_values {
                    record.value = None;
                }
                if !options.include_mappings {
                    record.mapping.clear();
                    record.mapping_state = MappingState::Unmapped;
                }
                record
            })
            .collect();
        out_nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));

        let mut out_refs: Vec<ImportReference> = references
            .into_iter()
            .map(|r| ImportReference {
                source: local_id(&r.source),
                target: local_id(&r.target),
                reference_type: local_id(&r.reference_type),
                is_forward: true,
                modelling_rule: r.modelling_rule,
            })
            .collect();
        out_refs.sort_by(|a, b| {
            (&a.source, &a.target, &a.reference_type).cmp(&(&b.source, &b.target, &b.reference_type))
        });

        debug!(
            namespaces = exported.len(),
            nodes = out_nodes.len(),
            references = out_refs.len(),
            "snapshot taken"
        );
        Ok(ModelSnapshot {
            namespaces: exported.iter().filter_map(|&i| export_namespace(self, i)).collect(),
            referenced_namespaces: referenced
                .iter()
                .filter_map(|&i| export_namespace(self, i))
                .collect(),
            nodes: out_nodes,
            references: out_refs,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::space::AddNodeParams;
    use crate::standard::ids;

    fn plant(uri: &str) -> (AddressSpace, NodeId) {
        let mut s = AddressSpace::new();
        let ns = s.create_namespace(uri, "1.0").unwrap();
        let pump = s
            .create_node(&ids::OBJECTS_FOLDER, AddNodeParams::object("Pump", ns))
            .unwrap();
        s.create_node(&pump, AddNodeParams::variable("Speed", ns, ids::DOUBLE, -1))
            .unwrap();
        (s, pump)
    }

    #[test]
    fn digest_is_independent_of_namespace_position() {
        let (a, _) = plant("urn:plant");
        let mut b = AddressSpace::new();
        b.create_namespace("urn:unrelated", "1").unwrap();
        let ns = b.create_namespace("urn:plant", "1.0").unwrap();
        let pump = b
            .create_node(&ids::OBJECTS_FOLDER, AddNodeParams::object("Pump", ns))
            .unwrap();
        b.create_node(&pump, AddNodeParams::variable("Speed", ns, ids::DOUBLE, -1))
            .unwrap();
        let only_plant = ExportOptions {
            namespace_uris: vec!["urn:plant".into()],
            ..ExportOptions::default()
        };
        assert_eq!(
            a.snapshot(&only_plant).unwrap().digest().unwrap(),
            b.snapshot(&only_plant).unwrap().digest().unwrap()
        );
    }

    #[test]
    fn snapshot_round_trips_through_import() {
        let (a, _) = plant("urn:plant");
        let snap = a.snapshot(&ExportOptions::default()).unwrap();
        let mut b = AddressSpace::new();
        let report = b.import(snap.clone().into_import_batch()).unwrap();
        assert_eq!(report.nodes_added, 2);
        assert_eq!(b.node_count(), a.node_count());
        let again = b.snapshot(&ExportOptions::default()).unwrap();
        assert_eq!(again.digest_hex().unwrap(), snap.digest_hex().unwrap());
    }

    #[test]
    fn mappings_can_be_left_out() {
        let (mut a, pump) = plant("urn:plant");
        a.set_mapping(&pump, "DB1.Pump").unwrap();
        let without = ExportOptions {
            include_mappings: false,
            ..ExportOptions::default()
        };
        let snap = a.snapshot(&without).unwrap();
        assert!(snap.nodes.iter().all(|n| n.mapping.is_empty()));
        let with = a.snapshot(&ExportOptions::default()).unwrap();
        assert_ne!(snap.digest().unwrap(), with.digest().unwrap());
    }

    #[test]
    fn unknown_namespace_is_not_found() {
        let (a, _) = plant("urn:plant");
        let opts = ExportOptions {
            namespace_uris: vec!["urn:missing".into()],
            ..ExportOptions::default()
        };
        assert!(matches!(
            a.snapshot(&opts),
            Err(GraphError::NamespaceNotFound(_))
        ));
    }
}
