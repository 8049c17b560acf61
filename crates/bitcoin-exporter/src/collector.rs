// Numan Thabit 2025
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::sync::Mutex;

use crate::{
    discovery::{Discovery, Target},
    rpc::RpcClient,
    snapshot::{Snapshot, SnapshotStore, TargetReport},
};

/// Runs collection passes: discovery, per-target fan-out, snapshot
/// publication. Concurrent scrapes are collapsed into one pass.
pub struct Collector {
    client: Arc<RpcClient>,
    discovery: Discovery,
    store: SnapshotStore,
    pass_lock: Mutex<()>,
    pass_seq: AtomicU64,
}

impl Collector {
    pub fn new(client: RpcClient, discovery: Discovery) -> Self {
        Self {
            client: Arc::new(client),
            discovery,
            store: SnapshotStore::new(),
            pass_lock: Mutex::new(()),
            pass_seq: AtomicU64::new(0),
        }
    }

    /// Most recently published snapshot, without triggering a pass.
    pub fn latest(&self) -> Arc<Snapshot> {
        self.store.snapshot()
    }

    /// Run one collection pass and publish its snapshot.
    ///
    /// Scrapes that arrive while a pass is in flight wait for that pass
    /// and reuse its snapshot instead of hammering the nodes again.
    pub async fn scrape(&self) -> Arc<Snapshot> {
        let observed = self.pass_seq.load(Ordering::Relaxed);
        let _guard = self.pass_lock.lock().await;
        if self.pass_seq.load(Ordering::Relaxed) != observed {
            // Another scrape completed a pass while we waited.
            return self.store.snapshot();
        }

        let targets = self.discovery.list_targets().await;
        let snapshot = self.collect(targets).await;
        let published = self.store.publish(snapshot);
        self.pass_seq.fetch_add(1, Ordering::Relaxed);
        published
    }

    /// Query every target concurrently and assemble the pass snapshot.
    /// One target's failure never suppresses another's samples.
    pub async fn collect(&self, targets: Vec<Target>) -> Snapshot {
        let discovered = targets.len();
        if discovered == 0 {
            tracing::warn!("collection pass ran with zero targets");
            return Snapshot::empty();
        }

        let handles: Vec<_> = targets
            .into_iter()
            .map(|target| {
                let client = self.client.clone();
                tokio::spawn(async move { probe_target(&client, target).await })
            })
            .collect();

        let mut reports = Vec::with_capacity(discovered);
        for handle in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(err) => tracing::error!(error = %err, "target probe task failed to join"),
            }
        }
        Snapshot::new(discovered, reports)
    }
}

async fn probe_target(client: &RpcClient, target: Target) -> TargetReport {
    let (chain, peers, network) = tokio::join!(
        client.blockchain_info(&target),
        client.peer_count(&target),
        client.network_info(&target),
    );

    match (chain, peers, network) {
        (Ok(chain), Ok(peers), Ok(network)) => {
            TargetReport::healthy(target, chain, peers, network)
        }
        (chain, peers, network) => {
            if let Some(error) = chain.err().or(peers.err()).or(network.err()) {
                tracing::debug!(target = %target.name, error = %error, "target collection failed");
            }
            TargetReport::failed(target)
        }
    }
}
