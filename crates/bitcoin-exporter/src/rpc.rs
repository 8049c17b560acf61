// Numan Thabit 2025
use anyhow::{Context, Result};
use bytes::Bytes;
use once_cell::sync::Lazy;
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::{
    config::{Credentials, RpcConfig},
    discovery::Target,
};

static BLOCKCHAIN_INFO_PAYLOAD: Lazy<Bytes> = Lazy::new(|| {
    Bytes::from_static(
        br#"{"jsonrpc":"1.0","id":"exporter","method":"getblockchaininfo","params":[]}"#,
    )
});
static PEER_INFO_PAYLOAD: Lazy<Bytes> = Lazy::new(|| {
    Bytes::from_static(br#"{"jsonrpc":"1.0","id":"exporter","method":"getpeerinfo","params":[]}"#)
});
static NETWORK_INFO_PAYLOAD: Lazy<Bytes> = Lazy::new(|| {
    Bytes::from_static(
        br#"{"jsonrpc":"1.0","id":"exporter","method":"getnetworkinfo","params":[]}"#,
    )
});

/// Whitelisted chain-state queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMethod {
    GetBlockchainInfo,
    GetPeerInfo,
    GetNetworkInfo,
}

impl RpcMethod {
    pub fn name(self) -> &'static str {
        match self {
            Self::GetBlockchainInfo => "getblockchaininfo",
            Self::GetPeerInfo => "getpeerinfo",
            Self::GetNetworkInfo => "getnetworkinfo",
        }
    }

    fn payload(self) -> Bytes {
        match self {
            Self::GetBlockchainInfo => BLOCKCHAIN_INFO_PAYLOAD.clone(),
            Self::GetPeerInfo => PEER_INFO_PAYLOAD.clone(),
            Self::GetNetworkInfo => NETWORK_INFO_PAYLOAD.clone(),
        }
    }
}

/// Per-target call failure, recorded as data by the collector.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("rpc endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("rpc authentication rejected")]
    AuthFailed,
    #[error("unexpected rpc response: {0}")]
    Protocol(String),
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcFault>,
}

#[derive(Debug, Deserialize)]
struct RpcFault {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockchainInfo {
    pub blocks: u64,
    pub difficulty: f64,
    #[serde(rename = "verificationprogress")]
    pub verification_progress: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkInfo {
    pub connections: u64,
}

/// JSON-RPC client shared by every per-target task. No retries: a
/// failed call stays failed until the next scrape.
pub struct RpcClient {
    http: Client,
    credentials: Credentials,
}

impl RpcClient {
    pub fn new(config: &RpcConfig, credentials: Credentials) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .tcp_nodelay(true)
            .pool_idle_timeout(Some(std::time::Duration::from_secs(10)))
            .pool_max_idle_per_host(2)
            .build()
            .context("failed to construct rpc client")?;
        Ok(Self { http, credentials })
    }

    pub async fn call(&self, target: &Target, method: RpcMethod) -> Result<Value, RpcError> {
        let response = self
            .http
            .post(target.rpc_url())
            .header(CONTENT_TYPE, "application/json")
            .basic_auth(&self.credentials.user, Some(&self.credentials.password))
            .body(method.payload())
            .send()
            .await
            .map_err(|err| RpcError::Unreachable(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RpcError::AuthFailed);
        }
        if !status.is_success() {
            return Err(RpcError::Protocol(format!(
                "{} returned status {status}",
                method.name()
            )));
        }

        let envelope = response
            .json::<RpcEnvelope>()
            .await
            .map_err(|err| RpcError::Protocol(format!("undecodable rpc body: {err}")))?;

        if let Some(fault) = envelope.error {
            return Err(RpcError::Protocol(format!(
                "rpc error {}: {}",
                fault.code, fault.message
            )));
        }
        envelope
            .result
            .ok_or_else(|| RpcError::Protocol(format!("{} returned no result", method.name())))
    }

    pub async fn blockchain_info(&self, target: &Target) -> Result<BlockchainInfo, RpcError> {
        let result = self.call(target, RpcMethod::GetBlockchainInfo).await?;
        serde_json::from_value(result)
            .map_err(|err| RpcError::Protocol(format!("malformed blockchain info: {err}")))
    }

    /// Peer count is the length of the `getpeerinfo` array.
    pub async fn peer_count(&self, target: &Target) -> Result<u64, RpcError> {
        let result = self.call(target, RpcMethod::GetPeerInfo).await?;
        let peers: Vec<Value> = serde_json::from_value(result)
            .map_err(|err| RpcError::Protocol(format!("malformed peer info: {err}")))?;
        Ok(peers.len() as u64)
    }

    pub async fn network_info(&self, target: &Target) -> Result<NetworkInfo, RpcError> {
        let result = self.call(target, RpcMethod::GetNetworkInfo).await?;
        serde_json::from_value(result)
            .map_err(|err| RpcError::Protocol(format!("malformed network info: {err}")))
    }
}
