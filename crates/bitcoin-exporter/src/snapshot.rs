// Numan Thabit 2025
//! Immutable metric snapshots built around ArcSwap publication.

use std::sync::Arc;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use prometheus::{opts, proto, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use serde::Serialize;

use crate::{
    discovery::Target,
    rpc::{BlockchainInfo, NetworkInfo},
};

/// One target's decoded chain state, or its failure marker.
///
/// A report is either complete (`up` with every value present) or a
/// failure (`up == false`, no values); a target is never half-recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetReport {
    pub target: Target,
    pub up: bool,
    pub blocks: Option<u64>,
    pub peers: Option<u64>,
    pub connections: Option<u64>,
    pub difficulty: Option<f64>,
    pub verification_progress: Option<f64>,
}

impl TargetReport {
    pub fn healthy(target: Target, chain: BlockchainInfo, peers: u64, network: NetworkInfo) -> Self {
        Self {
            target,
            up: true,
            blocks: Some(chain.blocks),
            peers: Some(peers),
            connections: Some(network.connections),
            difficulty: Some(chain.difficulty),
            verification_progress: Some(chain.verification_progress),
        }
    }

    pub fn failed(target: Target) -> Self {
        Self {
            target,
            up: false,
            blocks: None,
            peers: None,
            connections: None,
            difficulty: None,
            verification_progress: None,
        }
    }
}

/// The full result of one completed collection pass.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub reports: Vec<TargetReport>,
    /// Number of targets the pass attempted; zero signals that
    /// discovery resolved nothing.
    pub discovered: usize,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            reports: Vec::new(),
            discovered: 0,
        }
    }

    pub fn new(discovered: usize, mut reports: Vec<TargetReport>) -> Self {
        reports.sort_by(|a, b| a.target.name.cmp(&b.target.name));
        Self {
            reports,
            discovered,
        }
    }

    /// Render the snapshot in the Prometheus text format.
    ///
    /// Families and series are sorted, so rendering the same snapshot
    /// twice produces byte-identical output.
    pub fn render(&self) -> Result<String> {
        let registry = Registry::new_custom(Some("bitcoin".into()), None)
            .context("failed to create snapshot registry")?;

        let up = GaugeVec::new(
            opts!(
                "up",
                "Whether the node's RPC endpoint responded during the last collection pass"
            ),
            &["target"],
        )
        .context("failed to build up gauge")?;
        let blocks = GaugeVec::new(opts!("blocks", "Current block height"), &["target"])
            .context("failed to build blocks gauge")?;
        let peers = GaugeVec::new(opts!("peers", "Number of connected peers"), &["target"])
            .context("failed to build peers gauge")?;
        let connections = GaugeVec::new(
            opts!("connections", "Number of network connections"),
            &["target"],
        )
        .context("failed to build connections gauge")?;
        let difficulty = GaugeVec::new(
            opts!("difficulty", "Current network difficulty"),
            &["target"],
        )
        .context("failed to build difficulty gauge")?;
        let verification_progress = GaugeVec::new(
            opts!(
                "verification_progress",
                "Blockchain verification progress (0-1)"
            ),
            &["target"],
        )
        .context("failed to build verification progress gauge")?;
        let targets_discovered = Gauge::with_opts(opts!(
            "targets_discovered",
            "Number of node replicas resolved by the last discovery pass"
        ))
        .context("failed to build discovery gauge")?;

        registry
            .register(Box::new(up.clone()))
            .context("register up")?;
        registry
            .register(Box::new(blocks.clone()))
            .context("register blocks")?;
        registry
            .register(Box::new(peers.clone()))
            .context("register peers")?;
        registry
            .register(Box::new(connections.clone()))
            .context("register connections")?;
        registry
            .register(Box::new(difficulty.clone()))
            .context("register difficulty")?;
        registry
            .register(Box::new(verification_progress.clone()))
            .context("register verification progress")?;
        registry
            .register(Box::new(targets_discovered.clone()))
            .context("register targets discovered")?;

        for report in &self.reports {
            let name = report.target.name.as_str();
            up.with_label_values(&[name])
                .set(if report.up { 1.0 } else { 0.0 });
            if let Some(value) = report.blocks {
                blocks.with_label_values(&[name]).set(value as f64);
            }
            if let Some(value) = report.peers {
                peers.with_label_values(&[name]).set(value as f64);
            }
            if let Some(value) = report.connections {
                connections.with_label_values(&[name]).set(value as f64);
            }
            if let Some(value) = report.difficulty {
                difficulty.with_label_values(&[name]).set(value);
            }
            if let Some(value) = report.verification_progress {
                verification_progress.with_label_values(&[name]).set(value);
            }
        }
        targets_discovered.set(self.discovered as f64);

        let mut families = registry.gather();
        families.retain(|family| !family.get_metric().is_empty());
        families.sort_by(|a, b| a.get_name().cmp(b.get_name()));
        for family in &mut families {
            family.mut_metric().sort_by(|a, b| label_set(a).cmp(&label_set(b)));
        }

        let mut buffer = Vec::with_capacity(4096);
        TextEncoder::new()
            .encode(&families, &mut buffer)
            .context("failed to encode metrics")?;
        String::from_utf8(buffer).context("prometheus output was not utf8")
    }
}

fn label_set(metric: &proto::Metric) -> Vec<(&str, &str)> {
    metric
        .get_label()
        .iter()
        .map(|pair| (pair.get_name(), pair.get_value()))
        .collect()
}

/// Holds exactly one snapshot at a time; replaced wholesale by each
/// pass via an atomic reference swap, so readers never observe samples
/// from two different passes mixed together.
#[derive(Debug)]
pub struct SnapshotStore {
    inner: ArcSwap<Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::new(Arc::new(Snapshot::empty())),
        }
    }

    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        self.inner.store(snapshot.clone());
        snapshot
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.load_full()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{BlockchainInfo, NetworkInfo};

    fn target(name: &str) -> Target {
        Target {
            name: name.to_string(),
            host: format!("{name}.bitcoin-stack.bitcoin.svc.cluster.local"),
            port: 18332,
        }
    }

    fn healthy(name: &str, blocks: u64) -> TargetReport {
        TargetReport::healthy(
            target(name),
            BlockchainInfo {
                blocks,
                difficulty: 1.5,
                verification_progress: 0.75,
            },
            4,
            NetworkInfo { connections: 6 },
        )
    }

    #[test]
    fn up_series_cover_every_target_values_only_reachable() {
        let snapshot = Snapshot::new(
            3,
            vec![
                healthy("bitcoin-stack-0", 100),
                TargetReport::failed(target("bitcoin-stack-1")),
                healthy("bitcoin-stack-2", 102),
            ],
        );
        let text = snapshot.render().expect("render snapshot");

        assert!(text.contains(r#"bitcoin_up{target="bitcoin-stack-0"} 1"#));
        assert!(text.contains(r#"bitcoin_up{target="bitcoin-stack-1"} 0"#));
        assert!(text.contains(r#"bitcoin_up{target="bitcoin-stack-2"} 1"#));
        assert!(text.contains(r#"bitcoin_blocks{target="bitcoin-stack-0"} 100"#));
        assert!(text.contains(r#"bitcoin_blocks{target="bitcoin-stack-2"} 102"#));
        assert!(!text.contains(r#"bitcoin_blocks{target="bitcoin-stack-1"}"#));
        assert!(text.contains(r#"bitcoin_peers{target="bitcoin-stack-0"} 4"#));
        assert!(text.contains(r#"bitcoin_connections{target="bitcoin-stack-0"} 6"#));
        assert!(text.contains(r#"bitcoin_difficulty{target="bitcoin-stack-0"} 1.5"#));
        assert!(text.contains(r#"bitcoin_verification_progress{target="bitcoin-stack-0"} 0.75"#));
        assert!(text.contains("bitcoin_targets_discovered 3"));
    }

    #[test]
    fn rendering_is_deterministic_regardless_of_report_order() {
        let forward = Snapshot::new(
            3,
            vec![
                healthy("bitcoin-stack-0", 100),
                healthy("bitcoin-stack-1", 101),
                TargetReport::failed(target("bitcoin-stack-2")),
            ],
        );
        let shuffled = Snapshot::new(
            3,
            vec![
                TargetReport::failed(target("bitcoin-stack-2")),
                healthy("bitcoin-stack-1", 101),
                healthy("bitcoin-stack-0", 100),
            ],
        );

        let first = forward.render().expect("render forward");
        let second = forward.render().expect("render forward again");
        let third = shuffled.render().expect("render shuffled");
        assert_eq!(first, second);
        assert_eq!(first, third);
    }

    #[test]
    fn empty_snapshot_signals_zero_discovered_targets() {
        let text = Snapshot::empty().render().expect("render empty snapshot");
        assert!(text.contains("bitcoin_targets_discovered 0"));
        assert!(!text.contains("bitcoin_up{"));
        assert!(!text.contains("bitcoin_blocks{"));
    }

    #[test]
    fn store_swaps_snapshots_wholesale() {
        let store = SnapshotStore::new();
        assert_eq!(store.snapshot().discovered, 0);

        let first = store.publish(Snapshot::new(1, vec![healthy("bitcoin-stack-0", 100)]));
        assert!(Arc::ptr_eq(&first, &store.snapshot()));

        store.publish(Snapshot::new(
            1,
            vec![TargetReport::failed(target("bitcoin-stack-0"))],
        ));
        let current = store.snapshot();
        assert!(!Arc::ptr_eq(&first, &current));
        assert!(!current.reports[0].up);
    }
}
