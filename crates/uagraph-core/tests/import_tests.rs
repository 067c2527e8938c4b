// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Batch import is all-or-nothing and reports every problem at once.
#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{object, space_with_ns, TEST_NS};
use uagraph_core::standard::ids;
use uagraph_core::{
    issues_by_subject, ExportOptions, GraphError, ImportBatch, ImportNamespace, ImportReference,
    Model, NamespaceChangeType, NodeClass, NodeId, NodeRecord, QualifiedName,
};

fn object_record(ns: u16, id: u32, name: &str) -> NodeRecord {
    NodeRecord::new(
        NodeId::numeric(ns, id),
        NodeClass::Object,
        QualifiedName::new(ns, name),
    )
}

fn plant_batch() -> ImportBatch {
    ImportBatch {
        namespaces: vec![ImportNamespace {
            uri: "urn:plant".to_owned(),
            version: "2.1".to_owned(),
            publication_date: Some("2026-01-01".to_owned()),
            filename: Some("plant.xml".to_owned()),
            depends_on: vec![TEST_NS.to_owned()],
        }],
        nodes: vec![object_record(1, 10, "Line"), object_record(1, 11, "Cell")],
        references: vec![
            ImportReference::forward(ids::OBJECTS_FOLDER, NodeId::numeric(1, 10), ids::ORGANIZES),
            ImportReference::forward(
                NodeId::numeric(1, 10),
                NodeId::numeric(1, 11),
                ids::HAS_COMPONENT,
            ),
            ImportReference::forward(
                NodeId::numeric(1, 10),
                ids::BASE_OBJECT_TYPE,
                ids::HAS_TYPE_DEFINITION,
            ),
        ],
    }
}

#[test]
fn clean_batch_lands_in_one_event() {
    let model = Model::new();
    model.create_namespace(TEST_NS, "1.0").unwrap();
    let sub = model.subscribe();
    sub.drain();

    let report = model.import(plant_batch()).unwrap();
    assert_eq!(report.nodes_added, 2);
    assert_eq!(report.references_added, 3);
    assert_eq!(report.namespace_indices, vec![2]);

    let events = sub.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].change_type, NamespaceChangeType::Added);

    let project = model.read(|s| s.project_node("urn:plant")).unwrap().unwrap();
    assert_eq!(project.version, "2.1");
    assert_eq!(project.filename.as_deref(), Some("plant.xml"));
    assert!(project.is_consistent);
    let cell = model.search_node(&ids::OBJECTS_FOLDER, "2:Cell").unwrap();
    assert_eq!(cell, NodeId::numeric(2, 11));
}

#[test]
fn rejected_batch_lists_every_issue_and_changes_nothing() {
    let model = Model::new();
    let before = model
        .snapshot(&ExportOptions {
            include_namespace_zero: true,
            ..ExportOptions::default()
        })
        .unwrap()
        .digest()
        .unwrap();
    let sub = model.subscribe();

    let mut batch = plant_batch();
    batch.nodes.push(object_record(1, 12, "Orphan"));
    batch.nodes.push(object_record(1, 10, "DuplicateId"));
    batch.nodes.push(NodeRecord::new(
        NodeId::numeric(1, 13),
        NodeClass::Variable,
        QualifiedName::new(1, "NoType"),
    ));
    batch.references.push(ImportReference::forward(
        NodeId::numeric(1, 10),
        NodeId::numeric(1, 99),
        ids::HAS_COMPONENT,
    ));
    batch.references.push(ImportReference::forward(
        NodeId::numeric(1, 10),
        NodeId::numeric(1, 11),
        ids::HAS_COMPONENT,
    ));

    let issues = match model.import(batch) {
        Err(GraphError::ImportRejected(issues)) => issues,
        other => unreachable!("expected rejection, got {other:?}"),
    };
    let grouped = issues_by_subject(&issues);
    assert!(grouped.contains_key("ns=1;i=12"), "orphan: {issues:?}");
    assert!(grouped.contains_key("ns=1;i=10"), "duplicate id: {issues:?}");
    assert!(grouped.contains_key("ns=1;i=13"), "missing data type: {issues:?}");
    assert!(issues.iter().any(|i| i.message.contains("unknown endpoint")));
    assert!(issues.iter().any(|i| i.message.contains("duplicate reference")));

    let after = model
        .snapshot(&ExportOptions {
            include_namespace_zero: true,
            ..ExportOptions::default()
        })
        .unwrap()
        .digest()
        .unwrap();
    assert_eq!(before, after);
    assert!(sub.drain().is_empty());
}

#[test]
fn imports_into_locked_namespaces_are_rejected() {
    let (mut s, ns) = space_with_ns();
    object(&mut s, &ids::OBJECTS_FOLDER, "Existing", ns);
    s.lock_namespace(TEST_NS).unwrap();
    let batch = ImportBatch {
        namespaces: vec![ImportNamespace::new(TEST_NS, "1.0")],
        nodes: vec![object_record(1, 5000, "Late")],
        references: vec![ImportReference::forward(
            ids::OBJECTS_FOLDER,
            NodeId::numeric(1, 5000),
            ids::ORGANIZES,
        )],
    };
    assert!(matches!(s.import(batch), Err(GraphError::ImportRejected(_))));
    assert_eq!(s.count_nodes(TEST_NS).unwrap(), 1);
}

#[test]
fn exported_snapshot_reimports_elsewhere() {
    let source = Model::new();
    source.create_namespace("urn:plant", "1.0").unwrap();
    source.import(plant_batch_without_dependency()).unwrap();
    let snapshot = source.snapshot(&ExportOptions::default()).unwrap();

    let target = Model::new();
    target.create_namespace("urn:other", "1.0").unwrap();
    target.import(snapshot.clone().into_import_batch()).unwrap();
    assert_eq!(
        target.snapshot(&ExportOptions {
            namespace_uris: vec!["urn:plant".to_owned()],
            ..ExportOptions::default()
        })
        .unwrap()
        .digest()
        .unwrap(),
        snapshot.digest().unwrap()
    );
}

fn plant_batch_without_dependency() -> ImportBatch {
    let mut batch = plant_batch();
    batch.namespaces[0].depends_on.clear();
    batch
}

#[test]
fn detached_islands_are_orphans() {
    let model = Model::new();
    let batch = ImportBatch {
        namespaces: vec![ImportNamespace::new("urn:island", "1.0")],
        nodes: vec![object_record(1, 1, "B"), object_record(1, 2, "C")],
        references: vec![
            ImportReference::forward(NodeId::numeric(1, 1), NodeId::numeric(1, 2), ids::HAS_COMPONENT),
            ImportReference::forward(NodeId::numeric(1, 2), NodeId::numeric(1, 1), ids::HAS_COMPONENT),
        ],
    };
    let issues = match model.import(batch) {
        Err(GraphError::ImportRejected(issues)) => issues,
        other => unreachable!("expected rejection, got {other:?}"),
    };
    let grouped = issues_by_subject(&issues);
    assert!(grouped.contains_key("ns=1;i=1"), "{issues:?}");
    assert!(grouped.contains_key("ns=1;i=2"), "{issues:?}");
    assert!(issues.iter().any(|i| i.message.contains("not reachable from the root")));
    assert!(!model.read(|s| s.namespaces().is_available("urn:island")).unwrap());
}

#[test]
fn hierarchical_cycles_are_rejected_like_direct_edits() {
    let model = Model::new();
    let batch = ImportBatch {
        namespaces: vec![ImportNamespace::new("urn:loop", "1.0")],
        nodes: vec![object_record(1, 1, "A"), object_record(1, 2, "B")],
        references: vec![
            ImportReference::forward(ids::OBJECTS_FOLDER, NodeId::numeric(1, 1), ids::ORGANIZES),
            ImportReference::forward(NodeId::numeric(1, 1), NodeId::numeric(1, 2), ids::HAS_COMPONENT),
            ImportReference::forward(NodeId::numeric(1, 2), NodeId::numeric(1, 1), ids::HAS_COMPONENT),
        ],
    };
    let issues = match model.import(batch) {
        Err(GraphError::ImportRejected(issues)) => issues,
        other => unreachable!("expected rejection, got {other:?}"),
    };
    assert!(issues.iter().any(|i| i.message.contains("closes a cycle")), "{issues:?}");
    assert!(!model.read(|s| s.namespaces().is_available("urn:loop")).unwrap());
}
