//! `chordctl` subcommands.
//!
//! Every command builds its own in-process ring, runs, and returns a
//! [`CommandResult`] that the caller prints as text or JSON.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Subcommand;
use corelib::{spawn_maintenance, NodeSnapshot, Ring, RingBuilder, RingConfig, RingId, Route};
use replication::{NeighborStrategy, ReplicatedStore};
use serde::Serialize;
use tracing::{info, warn};

/// Identifiers used by `demo`.
const DEMO_IDS: [u64; 5] = [5, 20, 50, 100, 200];

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Build the five-node reference ring, store a key and look it up from
    /// every node, then remove one node and look again.
    Demo,

    /// Join nodes with hashed identifiers, store keys, optionally remove
    /// some nodes, and check every key is still reachable.
    Simulate {
        /// Nodes to join.
        #[arg(short, long, default_value_t = 16)]
        nodes: usize,

        /// Keys to store.
        #[arg(short, long, default_value_t = 32)]
        keys: usize,

        /// Nodes to remove after the keys are stored.
        #[arg(short, long, default_value_t = 0)]
        leave: usize,

        /// Converge through the background maintenance task instead of
        /// stabilizing on every join.
        #[arg(long)]
        background: bool,

        /// Give up waiting for background convergence after this long.
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
    },

    /// Print the ring identifier a key hashes to.
    Hash {
        key: String,
    },
}

/// Outcome of a command.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandResult {
    Demo(DemoReport),
    Simulate(SimulationReport),
    Hash { key: String, id: RingId, bits: u8 },
}

#[derive(Debug, Clone, Serialize)]
pub struct DemoReport {
    /// Routes for identifiers 21 and 250, queried from the first node.
    pub routes: Vec<Route>,
    pub strategy: &'static str,
    pub key: RingId,
    pub owner: RingId,
    pub replicas: Vec<RingId>,
    /// Value read back from each node before and after the leave.
    pub reads_before_leave: Vec<(RingId, Option<String>)>,
    pub departed: RingId,
    pub reads_after_leave: Vec<(RingId, Option<String>)>,
    pub nodes: Vec<NodeSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub joined: usize,
    /// Addresses whose hash collided with an existing member.
    pub skipped: Vec<String>,
    pub departed: usize,
    pub consistent: bool,
    pub cycle: Vec<RingId>,
    pub keys_stored: usize,
    pub keys_found: usize,
}

impl Command {
    pub async fn execute(&self, config: RingConfig) -> anyhow::Result<CommandResult> {
        match self {
            Command::Demo => demo(config).map(CommandResult::Demo),
            Command::Simulate {
                nodes,
                keys,
                leave,
                background,
                timeout_ms,
            } => {
                if leave >= nodes {
                    bail!("cannot remove {leave} of {nodes} nodes");
                }
                let sim = Simulation {
                    nodes: *nodes,
                    keys: *keys,
                    leave: *leave,
                    background: *background,
                    timeout: Duration::from_millis(*timeout_ms),
                };
                sim.run(config).await.map(CommandResult::Simulate)
            }
            Command::Hash { key } => {
                let space = config.validate()?;
                Ok(CommandResult::Hash {
                    key: key.clone(),
                    id: space.hash(key),
                    bits: space.bits(),
                })
            }
        }
    }
}

fn demo(config: RingConfig) -> anyhow::Result<DemoReport> {
    let ring = RingBuilder::from_config(config).build()?;
    if ring.space().size() <= 200 {
        bail!("demo needs at least 8 identifier bits");
    }

    let mut nodes = Vec::with_capacity(DEMO_IDS.len());
    for id in DEMO_IDS {
        let node = ring.create_node_with_id(&format!("node-{id}:7000"), RingId(id))?;
        ring.join(&node)?;
        nodes.push(node);
    }
    if !ring.converge_until_quiet(32).1 {
        warn!("ring still changing after 32 rounds");
    }

    let first = &nodes[0];
    let routes = vec![
        first.find_successor_traced(RingId(21))?,
        first.find_successor_traced(RingId(250))?,
    ];

    let store = ReplicatedStore::new(NeighborStrategy);
    let receipt = store.store(first, "x", "demo-value")?;
    let reads_before_leave = read_everywhere(&ring, &store, "x")?;

    let departed = ring
        .node(&receipt.owner.address)
        .context("owner is not a member")?;
    ring.leave(&departed)?;
    let reads_after_leave = read_everywhere(&ring, &store, "x")?;

    Ok(DemoReport {
        routes,
        strategy: store.strategy_name(),
        key: receipt.key,
        owner: receipt.owner.id,
        replicas: receipt.replicas.iter().map(|r| r.id).collect(),
        reads_before_leave,
        departed: departed.id(),
        reads_after_leave,
        nodes: ring.dump_state(),
    })
}

fn read_everywhere(
    ring: &Ring,
    store: &ReplicatedStore,
    key: &str,
) -> anyhow::Result<Vec<(RingId, Option<String>)>> {
    let mut reads = Vec::new();
    for member in ring.members() {
        let node = ring
            .node(&member.address)
            .with_context(|| format!("{member} vanished"))?;
        reads.push((member.id, store.lookup(&node, key)?));
    }
    Ok(reads)
}

struct Simulation {
    nodes: usize,
    keys: usize,
    leave: usize,
    background: bool,
    timeout: Duration,
}

impl Simulation {
    async fn run(&self, mut config: RingConfig) -> anyhow::Result<SimulationReport> {
        if self.background {
            config.stabilization_rounds = 0;
        }
        let ring = Arc::new(RingBuilder::from_config(config).build()?);
        let maintenance = self.background.then(|| spawn_maintenance(Arc::clone(&ring)));

        let mut skipped = Vec::new();
        for i in 0..self.nodes {
            let address = format!("10.0.{}.{}:7000", i / 256, i % 256);
            let node = ring.create_node(&address)?;
            if let Err(e) = ring.join(&node) {
                warn!(address = %address, error = %e, "join rejected");
                ring.network().deregister(&address);
                skipped.push(address);
            }
        }

        if self.background {
            let deadline = tokio::time::Instant::now() + self.timeout;
            while !ring.is_consistent() {
                if tokio::time::Instant::now() >= deadline {
                    bail!("ring did not converge within {:?}", self.timeout);
                }
                tokio::time::sleep(ring.config().maintenance_interval()).await;
            }
        } else {
            ring.converge_until_quiet(64);
        }

        let store = ReplicatedStore::default();
        let members = ring.members();
        let entry = ring
            .node(&members.first().context("no node joined")?.address)
            .context("entry node missing")?;
        for k in 0..self.keys {
            store.store(&entry, &format!("key-{k}"), &format!("value-{k}"))?;
        }

        // Remove from the back so the entry node survives.
        let mut departed = 0;
        for member in members.iter().rev().take(self.leave.min(members.len() - 1)) {
            if let Some(node) = ring.node(&member.address) {
                ring.leave(&node)?;
                departed += 1;
            }
        }
        ring.converge_until_quiet(64);

        let mut keys_found = 0;
        for k in 0..self.keys {
            if store.lookup(&entry, &format!("key-{k}"))?.as_deref() == Some(format!("value-{k}").as_str()) {
                keys_found += 1;
            }
        }

        if let Some(handle) = maintenance {
            handle.shutdown().await;
        }

        let report = SimulationReport {
            joined: self.nodes - skipped.len(),
            skipped,
            departed,
            consistent: ring.is_consistent(),
            cycle: ring.successor_cycle()?,
            keys_stored: self.keys,
            keys_found,
        };
        info!(joined = report.joined, departed, keys_found, "simulation finished");
        Ok(report)
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResult::Hash { key, id, bits } => {
                write!(f, "{key} -> {id} (M = {bits})")
            }
            CommandResult::Demo(r) => {
                for route in &r.routes {
                    let hops: Vec<String> = route.hops.iter().map(|h| h.to_string()).collect();
                    writeln!(f, "route -> {}  via [{}]", route.owner.id, hops.join(", "))?;
                }
                let replicas: Vec<String> = r.replicas.iter().map(|id| id.to_string()).collect();
                writeln!(
                    f,
                    "key \"x\" = {} owned by {}, replicas [{}] ({})",
                    r.key,
                    r.owner,
                    replicas.join(", "),
                    r.strategy
                )?;
                for (id, value) in &r.reads_before_leave {
                    writeln!(f, "  read from {id}: {}", value.as_deref().unwrap_or("<missing>"))?;
                }
                writeln!(f, "node {} left", r.departed)?;
                for (id, value) in &r.reads_after_leave {
                    writeln!(f, "  read from {id}: {}", value.as_deref().unwrap_or("<missing>"))?;
                }
                for node in &r.nodes {
                    let pred = node.predecessor.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
                    write!(
                        f,
                        "\n{:>5}  succ {:>5}  pred {:>5}  keys {}",
                        node.id.0,
                        node.successor.0,
                        pred,
                        node.keys.len()
                    )?;
                }
                Ok(())
            }
            CommandResult::Simulate(r) => {
                writeln!(f, "joined {} (skipped {}), left {}", r.joined, r.skipped.len(), r.departed)?;
                writeln!(f, "consistent: {}  cycle length: {}", r.consistent, r.cycle.len())?;
                write!(f, "keys found: {}/{}", r.keys_found, r.keys_stored)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_reads_survive_leave() {
        let result = Command::Demo.execute(RingConfig::default()).await.unwrap();
        let CommandResult::Demo(report) = result else {
            panic!("expected demo report");
        };
        assert_eq!(report.routes[0].owner.id, RingId(50));
        assert_eq!(report.routes[1].owner.id, RingId(5));
        assert_eq!(report.strategy, "NeighborStrategy");
        assert_eq!(report.reads_before_leave.len(), 5);
        assert_eq!(report.reads_after_leave.len(), 4);
        for (_, value) in report.reads_before_leave.iter().chain(&report.reads_after_leave) {
            assert_eq!(value.as_deref(), Some("demo-value"));
        }
    }

    #[tokio::test]
    async fn test_simulate_with_leaves() {
        let command = Command::Simulate {
            nodes: 12,
            keys: 20,
            leave: 3,
            background: false,
            timeout_ms: 1_000,
        };
        let CommandResult::Simulate(report) = command.execute(RingConfig::default()).await.unwrap() else {
            panic!("expected simulation report");
        };
        assert!(report.consistent);
        assert_eq!(report.departed, 3);
        assert_eq!(report.cycle.len(), report.joined - 3);
        assert_eq!(report.keys_found, 20);
    }

    #[tokio::test]
    async fn test_hash_is_in_range() {
        let config = RingConfig {
            id_bits: 6,
            ..RingConfig::default()
        };
        let result = Command::Hash { key: "x".into() }.execute(config).await.unwrap();
        match result {
            CommandResult::Hash { id, bits, .. } => {
                assert_eq!(bits, 6);
                assert!(id.0 < 64);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cannot_remove_every_node() {
        let command = Command::Simulate {
            nodes: 2,
            keys: 0,
            leave: 2,
            background: false,
            timeout_ms: 1_000,
        };
        assert!(command.execute(RingConfig::default()).await.is_err());
    }
}
