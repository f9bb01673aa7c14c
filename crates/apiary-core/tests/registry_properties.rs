//! Property-based tests for the node registry.
//!
//! The merge rule must behave as a join: order of discovery never changes
//! what the registry ends up knowing about a node.

use apiary_core::{
    proto::{Addr16, Addr64},
    NodeRole, RemoteNode, XbeeNetwork,
};
use proptest::prelude::*;

/// A small pool of 64-bit addresses so merges actually collide.
fn arbitrary_addr64() -> impl Strategy<Value = Addr64> {
    prop_oneof![
        Just(Addr64::UNKNOWN),
        (0u64..8).prop_map(|n| Addr64::from_u64(0x0013_A200_0000_0000 | n)),
    ]
}

fn arbitrary_addr16() -> impl Strategy<Value = Addr16> {
    prop_oneof![Just(Addr16::UNKNOWN), (0u16..8).prop_map(Addr16::from_u16)]
}

fn arbitrary_node() -> impl Strategy<Value = RemoteNode> {
    (
        arbitrary_addr64(),
        arbitrary_addr16(),
        prop::option::of("[A-Z]{1,4}"),
        prop::option::of(0u8..4),
        prop::option::of(any::<u8>()),
    )
        .prop_map(|(addr64, addr16, node_id, role, rssi)| {
            let mut node = RemoteNode::new(addr64, addr16);
            node.node_id = node_id;
            node.role = role.map(NodeRole::from_u8);
            node.rssi = rssi;
            node
        })
}

/// Nodes with a known 64-bit address, for identity-stability properties.
fn arbitrary_identified_node() -> impl Strategy<Value = RemoteNode> {
    arbitrary_node().prop_filter("needs known addr64", RemoteNode::has_addr64)
}

fn sorted_by_addr(mut nodes: Vec<RemoteNode>) -> Vec<RemoteNode> {
    nodes.sort_by_key(|node| (node.addr64, node.addr16));
    nodes
}

#[test]
fn prop_merge_is_order_independent_per_identity() {
    proptest!(|(mut variants in prop::collection::vec(arbitrary_node(), 1..6), addr in 0u64..4)| {
        // Pin every variant to one identity so they all merge.
        for node in &mut variants {
            node.addr64 = Addr64::from_u64(0x0013_A200_0000_0000 | addr);
        }

        let forward = XbeeNetwork::new();
        for node in &variants {
            forward.add(node.clone());
        }

        let backward = XbeeNetwork::new();
        for node in variants.iter().rev() {
            backward.add(node.clone());
        }

        // PROPERTY: both orders keep exactly one record for the identity
        prop_assert_eq!(forward.len(), 1);
        prop_assert_eq!(backward.len(), 1);

        // PROPERTY: the identity itself never changes with order
        let addr64 = Addr64::from_u64(0x0013_A200_0000_0000 | addr);
        prop_assert_eq!(forward.get_by_addr64(addr64).unwrap().addr64, addr64);
        prop_assert_eq!(backward.get_by_addr64(addr64).unwrap().addr64, addr64);
    });
}

#[test]
fn prop_add_is_idempotent() {
    proptest!(|(node in arbitrary_identified_node())| {
        let network = XbeeNetwork::new();
        let first = network.add(node.clone());
        let second = network.add(node);

        // PROPERTY: re-adding changes nothing
        prop_assert_eq!(first, second);
        prop_assert_eq!(network.len(), 1);
    });
}

#[test]
fn prop_known_addr64_is_permanent() {
    proptest!(|(nodes in prop::collection::vec(arbitrary_identified_node(), 1..12))| {
        let network = XbeeNetwork::new();
        for node in &nodes {
            network.add(node.clone());
        }

        // PROPERTY: every identified node stays retrievable under the
        // 64-bit address it first reported
        for node in &nodes {
            let stored = network.get_by_addr64(node.addr64);
            prop_assert!(stored.is_some(), "lost node {}", node.addr64);
            prop_assert_eq!(stored.unwrap().addr64, node.addr64);
        }
    });
}

#[test]
fn prop_registry_size_counts_identities() {
    proptest!(|(nodes in prop::collection::vec(arbitrary_identified_node(), 0..12))| {
        let network = XbeeNetwork::new();
        for node in &nodes {
            network.add(node.clone());
        }

        let mut identities: Vec<Addr64> = nodes.iter().map(|n| n.addr64).collect();
        identities.sort_unstable();
        identities.dedup();

        // PROPERTY: one record per distinct 64-bit identity
        prop_assert_eq!(network.len(), identities.len());

        let stored = sorted_by_addr(network.nodes());
        prop_assert_eq!(stored.len(), identities.len());
    });
}
