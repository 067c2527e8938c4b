// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{adjacency, chain, object, reference_keys, space_with_ns};
use proptest::prelude::*;
use uagraph_core::standard::ids;
use uagraph_core::{ErrorKind, GraphError, NodeId};

#[test]
fn references_are_queryable_from_both_ends() {
    let (mut s, ns) = space_with_ns();
    let a = object(&mut s, &ids::OBJECTS_FOLDER, "A", ns);
    let b = object(&mut s, &ids::OBJECTS_FOLDER, "B", ns);
    let seen_from_b = s.add_reference(&b, &a, &ids::GENERATES_EVENT, false).unwrap();
    assert_eq!(seen_from_b.source, b);
    assert!(!seen_from_b.is_forward);

    let from_a = s.references_of(&a).unwrap();
    let stored = from_a
        .iter()
        .find(|r| r.reference_type == ids::GENERATES_EVENT)
        .unwrap();
    assert_eq!(stored.target, b);
    assert!(stored.is_forward);
}

#[test]
fn duplicate_triples_are_rejected() {
    let (mut s, ns) = space_with_ns();
    let a = object(&mut s, &ids::OBJECTS_FOLDER, "A", ns);
    let b = object(&mut s, &ids::OBJECTS_FOLDER, "B", ns);
    s.add_reference(&a, &b, &ids::GENERATES_EVENT, true).unwrap();
    let err = s
        .add_reference(&b, &a, &ids::GENERATES_EVENT, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[test]
fn hierarchical_back_edges_are_cycles() {
    let (mut s, ns) = space_with_ns();
    let nodes = chain(&mut s, ns, 3);
    let before = reference_keys(&s);
    let err = s
        .add_reference(&nodes[2], &nodes[0], &ids::HAS_COMPONENT, true)
        .unwrap_err();
    assert!(matches!(err, GraphError::CycleDetected { .. }));
    assert_eq!(reference_keys(&s), before);
    // Non-hierarchical back edges are fine.
    s.add_reference(&nodes[2], &nodes[0], &ids::GENERATES_EVENT, true)
        .unwrap();
}

#[test]
fn move_is_atomic() {
    let (mut s, ns) = space_with_ns();
    let nodes = chain(&mut s, ns, 3);
    let other = object(&mut s, &ids::OBJECTS_FOLDER, "Other", ns);
    let before = adjacency(&s);

    // Moving N0 below its own grandchild would close a cycle.
    let err = s
        .move_node(&nodes[0], &ids::OBJECTS_FOLDER, &nodes[2])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CycleDetected);
    assert_eq!(adjacency(&s), before);

    s.move_node(&nodes[1], &nodes[0], &other).unwrap();
    assert_eq!(s.parents(&nodes[1]).unwrap(), vec![other.clone()]);
    assert!(s.is_descendant_from(&nodes[2], &other).unwrap());
    assert!(!s.is_descendant_from(&nodes[2], &nodes[0]).unwrap());
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Organizes,
    HasComponent,
    GeneratesEvent,
    HasNotifier,
}

impl Kind {
    fn id(self) -> NodeId {
        match self {
            Self::Organizes => ids::ORGANIZES,
            Self::HasComponent => ids::HAS_COMPONENT,
            Self::GeneratesEvent => ids::GENERATES_EVENT,
            Self::HasNotifier => ids::HAS_NOTIFIER,
        }
    }
}

fn kind() -> impl Strategy<Value = Kind> {
    prop_oneof![
        Just(Kind::Organizes),
        Just(Kind::HasComponent),
        Just(Kind::GeneratesEvent),
        Just(Kind::HasNotifier),
    ]
}

proptest! {
    // A successful add followed by a remove with the same arguments restores
    // the adjacency of every node exactly. A failed add changes nothing.
    #[test]
    fn add_then_remove_restores_adjacency(
        len in 2usize..8,
        picks in prop::collection::vec((any::<prop::sample::Index>(), any::<prop::sample::Index>(), kind(), any::<bool>()), 1..16),
    ) {
        let (mut s, ns) = space_with_ns();
        let nodes = chain(&mut s, ns, len);
        for (a, b, k, forward) in picks {
            let source = nodes[a.index(len)].clone();
            let target = nodes[b.index(len)].clone();
            let before = adjacency(&s);
            match s.add_reference(&source, &target, &k.id(), forward) {
                Ok(_) => {
                    let report = s.remove_reference(&source, &target, &k.id()).unwrap();
                    prop_assert!(report.removed_nodes.is_empty());
                    prop_assert_eq!(adjacency(&s), before);
                }
                Err(_) => prop_assert_eq!(adjacency(&s), before),
            }
        }
    }
}
