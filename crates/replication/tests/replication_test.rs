//! Replication over a live in-process ring.

use std::sync::Arc;

use corelib::{ChordNode, IdSpace, Ring, RingBuilder, RingId};
use replication::{NeighborStrategy, ReplicatedStore, ReplicationStrategy, SimpleStrategy};

fn ring_with(ids: &[u64]) -> anyhow::Result<(Ring, Vec<Arc<ChordNode>>)> {
    let ring = RingBuilder::new().with_id_bits(8).build()?;
    let mut nodes = Vec::new();
    for id in ids {
        let node = ring.create_node_with_id(&format!("node-{id}:7000"), RingId(*id))?;
        ring.join(&node)?;
        nodes.push(node);
    }
    ring.converge_until_quiet(32);
    Ok((ring, nodes))
}

fn holds(ring: &Ring, id: RingId, key: RingId) -> bool {
    ring.dump_state()
        .iter()
        .find(|n| n.id == id)
        .map(|n| n.keys.contains_key(&key))
        .unwrap_or(false)
}

// ============================================================================
// NeighborStrategy
// ============================================================================

#[test]
fn test_owner_successor_and_predecessor_hold_key() -> anyhow::Result<()> {
    let (ring, nodes) = ring_with(&[5, 20, 50, 100, 200])?;
    let store = ReplicatedStore::new(NeighborStrategy);

    let receipt = store.store(&nodes[2], "x", "1")?;
    let owner = ring.node(&receipt.owner.address).expect("owner is a member");
    let successor = owner.successor();
    let predecessor = owner.predecessor().expect("converged ring has predecessors");

    assert_eq!(receipt.replicas.len(), 2);
    assert!(receipt.replicas.contains(&successor));
    assert!(receipt.replicas.contains(&predecessor));
    for id in [owner.id(), successor.id, predecessor.id] {
        assert!(holds(&ring, id, receipt.key), "node {id} should hold the key");
    }

    // The other two nodes hold nothing.
    let holders = ring.dump_state().iter().filter(|n| n.keys.contains_key(&receipt.key)).count();
    assert_eq!(holders, 3);
    Ok(())
}

#[test]
fn test_lookup_from_every_node() -> anyhow::Result<()> {
    let (_ring, nodes) = ring_with(&[5, 20, 50, 100, 200])?;
    let store = ReplicatedStore::default();
    store.store(&nodes[0], "alpha", "a")?;
    store.store(&nodes[4], "beta", "b")?;

    for node in &nodes {
        assert_eq!(store.lookup(node, "alpha")?, Some("a".to_string()));
        assert_eq!(store.lookup(node, "beta")?, Some("b".to_string()));
        assert_eq!(store.lookup(node, "gamma")?, None);
    }
    Ok(())
}

#[test]
fn test_small_rings_have_fewer_replicas() -> anyhow::Result<()> {
    let (_ring, nodes) = ring_with(&[7])?;
    let store = ReplicatedStore::default();
    let receipt = store.store(&nodes[0], "k", "v")?;
    assert!(receipt.replicas.is_empty());

    let (_ring, nodes) = ring_with(&[7, 90])?;
    let receipt = store.store(&nodes[0], "k", "v")?;
    assert_eq!(receipt.replicas.len(), 1);
    assert_ne!(receipt.replicas[0], receipt.owner);
    Ok(())
}

#[test]
fn test_value_survives_owner_leave() -> anyhow::Result<()> {
    let (ring, nodes) = ring_with(&[5, 20, 50, 100, 200])?;
    let store = ReplicatedStore::default();
    let receipt = store.store(&nodes[0], "x", "kept")?;

    let owner = ring.node(&receipt.owner.address).expect("owner is a member");
    ring.leave(&owner)?;

    for node in nodes.iter().filter(|n| n.id() != owner.id()) {
        assert_eq!(store.lookup(node, "x")?, Some("kept".to_string()));
    }
    Ok(())
}

#[test]
fn test_stale_replica_does_not_override_owner_on_leave() -> anyhow::Result<()> {
    // Place the ring around wherever "k" hashes so the key's owner is fixed.
    let space = IdSpace::new(8)?;
    let key = space.hash("k");
    let owner = key;
    let first = space.sub(owner, 90);
    let last = space.add(owner, 100);
    let joiner = space.sub(owner, 40);

    let (ring, _nodes) = ring_with(&[first.0, owner.0, last.0])?;
    let entry = ring.node(&format!("node-{}:7000", owner.0)).expect("owner is a member");
    let store = ReplicatedStore::default();

    let receipt = store.store(&entry, "k", "v1")?;
    assert_eq!(receipt.owner.id, owner);
    assert!(holds(&ring, first, key), "predecessor keeps a replica");

    let newcomer = ring.create_node_with_id(&format!("node-{}:7000", joiner.0), joiner)?;
    ring.join(&newcomer)?;
    ring.converge_until_quiet(32);

    // Replicas now go to the newcomer; the old predecessor keeps "v1".
    store.store(&entry, "k", "v2")?;
    assert_eq!(store.lookup(&entry, "k")?, Some("v2".to_string()));

    ring.leave(&newcomer)?;
    assert_eq!(store.lookup(&entry, "k")?, Some("v2".to_string()));

    let stale = ring.node(&format!("node-{}:7000", first.0)).expect("first is a member");
    ring.leave(&stale)?;
    assert_eq!(store.lookup(&entry, "k")?, Some("v2".to_string()));
    Ok(())
}

// ============================================================================
// SimpleStrategy
// ============================================================================

#[test]
fn test_simple_strategy_walks_successors() -> anyhow::Result<()> {
    let (ring, nodes) = ring_with(&[5, 20, 50, 100, 200])?;
    let strategy = SimpleStrategy::new(3)?;
    let owner = nodes[1].descriptor().clone();

    let replicas = strategy.replicas(&nodes[0], &owner)?;
    let ids: Vec<u64> = replicas.iter().map(|r| r.id.0).collect();
    assert_eq!(ids, vec![50, 100]);

    let store = ReplicatedStore::new(strategy);
    let receipt = store.store(&nodes[3], "x", "v")?;
    for replica in &receipt.replicas {
        assert!(holds(&ring, replica.id, receipt.key));
    }
    Ok(())
}

#[test]
fn test_simple_strategy_stops_at_ring_size() -> anyhow::Result<()> {
    let (_ring, nodes) = ring_with(&[5, 20, 50])?;
    let strategy = SimpleStrategy::new(10)?;
    let replicas = strategy.replicas(&nodes[0], nodes[0].descriptor())?;
    assert_eq!(replicas.len(), 2);
    Ok(())
}
