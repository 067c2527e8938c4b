// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code)]

use uagraph_core::standard::ids;
use uagraph_core::{AddNodeParams, AddressSpace, NodeId, OpcReference, ReferenceKey};

/// Namespace URI used by most fixtures.
pub const TEST_NS: &str = "http://test/ns1";

/// Fresh space with one writable namespace.
pub fn space_with_ns() -> (AddressSpace, u16) {
    let mut space = AddressSpace::new();
    let ns = space.create_namespace(TEST_NS, "1.0").expect("create namespace");
    (space, ns)
}

/// Adds an object named `name` under `parent`.
pub fn object(space: &mut AddressSpace, parent: &NodeId, name: &str, ns: u16) -> NodeId {
    space
        .create_node(parent, AddNodeParams::object(name, ns))
        .expect("create object")
}

/// Builds a chain `Objects -> n0 -> n1 -> ... -> n(len-1)` and returns it.
pub fn chain(space: &mut AddressSpace, ns: u16, len: usize) -> Vec<NodeId> {
    let mut out = Vec::with_capacity(len);
    let mut parent = ids::OBJECTS_FOLDER;
    for i in 0..len {
        let id = object(space, &parent, &format!("N{i}"), ns);
        out.push(id.clone());
        parent = id;
    }
    out
}

/// Every stored reference, sorted.
pub fn reference_keys(space: &AddressSpace) -> Vec<ReferenceKey> {
    let mut keys: Vec<ReferenceKey> = space.references().map(|r| r.key()).collect();
    keys.sort();
    keys
}

/// Per-node view of every incident reference, ordered by node id.
pub fn adjacency(space: &AddressSpace) -> Vec<(NodeId, Vec<OpcReference>)> {
    space
        .nodes()
        .map(|n| {
            let refs = space.references_of(&n.node_id).expect("node exists");
            (n.node_id.clone(), refs)
        })
        .collect()
}
