// Numan Thabit 2025
use std::{
    fmt,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, DurationSeconds};
use tokio::fs;

use crate::discovery::Target;

const ENV_RPC_USER: &str = "BITCOIN_RPC_USER";
const ENV_RPC_PASSWORD: &str = "BITCOIN_RPC_PASSWORD";

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
}

impl ExporterConfig {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw = fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read config file at {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse {} as TOML", path.display()))?;
        Ok(config)
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Headless service backing the node StatefulSet.
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_cluster_domain")]
    pub cluster_domain: String,
    /// Upper bound on probed pod ordinals.
    #[serde(default = "default_max_replicas")]
    pub max_replicas: usize,
    /// Explicit endpoint list; when non-empty, DNS discovery is skipped.
    #[serde(default)]
    pub static_targets: Vec<Target>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service: default_service(),
            namespace: default_namespace(),
            cluster_domain: default_cluster_domain(),
            max_replicas: default_max_replicas(),
            static_targets: Vec::new(),
        }
    }
}

fn default_service() -> String {
    "bitcoin-stack".to_string()
}

fn default_namespace() -> String {
    "bitcoin".to_string()
}

fn default_cluster_domain() -> String {
    "cluster.local".to_string()
}

fn default_max_replicas() -> usize {
    10
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_port")]
    pub port: u16,
    #[serde(default)]
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub user_file: Option<PathBuf>,
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            port: default_rpc_port(),
            timeout: None,
            user: None,
            password: None,
            user_file: None,
            password_file: None,
        }
    }
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or_else(|| Duration::from_secs(3))
    }

    /// Resolve credentials once at startup: environment first, then
    /// secret-mount files, then inline config values.
    pub async fn credentials(&self) -> Result<Credentials> {
        let user = resolve_secret(ENV_RPC_USER, self.user_file.as_deref(), self.user.as_deref())
            .await?
            .with_context(|| {
                format!("rpc user not configured; set {ENV_RPC_USER}, rpc.user_file or rpc.user")
            })?;
        let password = resolve_secret(
            ENV_RPC_PASSWORD,
            self.password_file.as_deref(),
            self.password.as_deref(),
        )
        .await?
        .with_context(|| {
            format!(
                "rpc password not configured; set {ENV_RPC_PASSWORD}, rpc.password_file or rpc.password"
            )
        })?;
        Ok(Credentials { user, password })
    }
}

fn default_rpc_port() -> u16 {
    18332
}

async fn resolve_secret(
    env_key: &str,
    file: Option<&Path>,
    inline: Option<&str>,
) -> Result<Option<String>> {
    if let Ok(value) = std::env::var(env_key) {
        if !value.is_empty() {
            return Ok(Some(value));
        }
    }
    if let Some(path) = file {
        let raw = fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read secret file at {}", path.display()))?;
        return Ok(Some(raw.trim().to_string()));
    }
    Ok(inline.map(str::to_string))
}

/// RPC basic-auth pair, immutable for the process lifetime.
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn empty_config_falls_back_to_defaults() {
        let config: ExporterConfig = toml::from_str("").expect("empty config should parse");
        assert_eq!(config.listen, "0.0.0.0:8000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.discovery.service, "bitcoin-stack");
        assert_eq!(config.discovery.namespace, "bitcoin");
        assert_eq!(config.discovery.cluster_domain, "cluster.local");
        assert_eq!(config.discovery.max_replicas, 10);
        assert!(config.discovery.static_targets.is_empty());
        assert_eq!(config.rpc.port, 18332);
        assert_eq!(config.rpc.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn shipped_example_config_parses() {
        let raw = include_str!("../../../ops/bitcoin-exporter.example.toml");
        let config: ExporterConfig = toml::from_str(raw).expect("example config should parse");
        assert_eq!(config.discovery.service, "bitcoin-stack");
        assert!(config.rpc.user_file.is_some());
    }

    #[tokio::test]
    async fn credentials_read_from_secret_files() {
        let mut user_file = NamedTempFile::new().expect("create user file");
        writeln!(user_file, "alice").expect("write user");
        let mut password_file = NamedTempFile::new().expect("create password file");
        writeln!(password_file, "hunter2").expect("write password");

        let config = RpcConfig {
            user_file: Some(user_file.path().to_path_buf()),
            password_file: Some(password_file.path().to_path_buf()),
            ..RpcConfig::default()
        };
        let credentials = config.credentials().await.expect("resolve credentials");
        assert_eq!(credentials.user, "alice");
        assert_eq!(credentials.password, "hunter2");
    }

    #[tokio::test]
    async fn inline_credentials_are_accepted() {
        let config = RpcConfig {
            user: Some("bitcoin".into()),
            password: Some("bitcoin".into()),
            ..RpcConfig::default()
        };
        let credentials = config.credentials().await.expect("resolve credentials");
        assert_eq!(credentials.user, "bitcoin");
        assert_eq!(credentials.password, "bitcoin");
    }

    #[test]
    fn debug_output_redacts_password() {
        let credentials = Credentials {
            user: "alice".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }
}
