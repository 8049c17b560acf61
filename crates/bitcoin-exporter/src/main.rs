// Numan Thabit 2025
use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use bitcoin_exporter::{
    collector::Collector, config::ExporterConfig, discovery::Discovery, http, rpc::RpcClient,
};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(author, version, about = "Prometheus exporter for a pool of Bitcoin node replicas")]
struct Cli {
    /// Path to the exporter configuration file
    #[arg(
        long,
        env = "BITCOIN_EXPORTER_CONFIG",
        default_value = "ops/bitcoin-exporter.example.toml"
    )]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let config = ExporterConfig::load(cli.config).await?;
    let credentials = config.rpc.credentials().await?;

    let client = RpcClient::new(&config.rpc, credentials)?;
    let discovery = Discovery::new(config.discovery.clone(), config.rpc.port);
    let collector = Arc::new(Collector::new(client, discovery));

    http::serve(config.listen, collector).await
}
