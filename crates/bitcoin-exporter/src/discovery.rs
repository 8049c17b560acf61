// Numan Thabit 2025
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::net;

use crate::config::DiscoveryConfig;

/// One node replica's RPC endpoint plus its stable identity label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Pod ordinal DNS label, e.g. `bitcoin-stack-3`.
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn rpc_url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

/// Resolves the current replica set from the StatefulSet naming
/// convention. The target list is rebuilt from scratch on every pass;
/// nothing from a previous pass is assumed to still exist.
pub struct Discovery {
    config: DiscoveryConfig,
    rpc_port: u16,
}

impl Discovery {
    pub fn new(config: DiscoveryConfig, rpc_port: u16) -> Self {
        Self { config, rpc_port }
    }

    /// Candidate endpoints for every possible pod ordinal, in ordinal
    /// order: `{service}-{i}.{service}.{namespace}.svc.{domain}`.
    pub fn candidates(&self) -> Vec<Target> {
        let DiscoveryConfig {
            service,
            namespace,
            cluster_domain,
            max_replicas,
            ..
        } = &self.config;
        (0..*max_replicas)
            .map(|ordinal| {
                let name = format!("{service}-{ordinal}");
                let host = format!("{name}.{service}.{namespace}.svc.{cluster_domain}");
                Target {
                    name,
                    host,
                    port: self.rpc_port,
                }
            })
            .collect()
    }

    /// Best-effort resolution of the currently reachable replicas.
    ///
    /// Every ordinal is probed concurrently; a hole in the sequence
    /// (normal during rolling restarts) does not hide the replicas
    /// above it. Returns whatever subset resolved, in ordinal order.
    pub async fn list_targets(&self) -> Vec<Target> {
        if !self.config.static_targets.is_empty() {
            return self.config.static_targets.clone();
        }

        let probes = self.candidates().into_iter().map(|target| async move {
            let resolved = net::lookup_host((target.host.as_str(), target.port))
                .await
                .map(|mut addrs| addrs.next().is_some());
            match resolved {
                Ok(reachable) => reachable.then_some(target),
                Err(err) => {
                    tracing::debug!(host = %target.host, error = %err, "candidate did not resolve");
                    None
                }
            }
        });

        let targets: Vec<Target> = join_all(probes).await.into_iter().flatten().collect();
        if targets.is_empty() {
            tracing::warn!(
                service = %self.config.service,
                namespace = %self.config.namespace,
                "no node replicas resolved"
            );
        }
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_follow_statefulset_convention() {
        let discovery = Discovery::new(DiscoveryConfig::default(), 18332);
        let candidates = discovery.candidates();
        assert_eq!(candidates.len(), 10);
        assert_eq!(candidates[0].name, "bitcoin-stack-0");
        assert_eq!(
            candidates[0].host,
            "bitcoin-stack-0.bitcoin-stack.bitcoin.svc.cluster.local"
        );
        assert_eq!(candidates[0].port, 18332);
        assert_eq!(candidates[9].name, "bitcoin-stack-9");
    }

    #[test]
    fn candidates_respect_configured_bounds() {
        let config = DiscoveryConfig {
            service: "btc".into(),
            namespace: "mainnet".into(),
            max_replicas: 3,
            ..DiscoveryConfig::default()
        };
        let discovery = Discovery::new(config, 8332);
        let candidates = discovery.candidates();
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[2].host, "btc-2.btc.mainnet.svc.cluster.local");
        assert_eq!(candidates[2].port, 8332);
    }

    #[tokio::test]
    async fn static_targets_bypass_dns() {
        let wanted = vec![Target {
            name: "node-a".into(),
            host: "127.0.0.1".into(),
            port: 18443,
        }];
        let config = DiscoveryConfig {
            static_targets: wanted.clone(),
            ..DiscoveryConfig::default()
        };
        let discovery = Discovery::new(config, 18332);
        assert_eq!(discovery.list_targets().await, wanted);
    }

    #[test]
    fn rpc_url_targets_endpoint_root() {
        let target = Target {
            name: "bitcoin-stack-0".into(),
            host: "bitcoin-stack-0.bitcoin-stack.bitcoin.svc.cluster.local".into(),
            port: 18332,
        };
        assert_eq!(
            target.rpc_url(),
            "http://bitcoin-stack-0.bitcoin-stack.bitcoin.svc.cluster.local:18332/"
        );
    }
}
