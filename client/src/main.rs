//! `artifact-sync` CLI: sync one artifact from a registry to a local path.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use artifact_sync::{ClientConfig, RegistryClient, SyncMode, Syncer};

#[derive(Parser, Debug)]
#[command(name = "artifact-sync", about = "Checksum-gated artifact download")]
struct Cli {
    /// Registry base URL
    #[arg(long, env = "REGISTRY_URL")]
    url: String,

    /// Bearer token for the registry (omit for anonymous access)
    #[arg(long, env = "REGISTRY_API_KEY")]
    api_key: Option<String>,

    /// Whole-request timeout in seconds
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    /// Repository key
    repo: String,

    /// Artifact path within the repository
    path: String,

    /// Local destination path
    dest: PathBuf,

    /// Download even if the local file already matches
    #[arg(long)]
    force: bool,

    /// Treat the path as a server-resolved alias (skip checksum verification)
    #[arg(long)]
    aliased: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::new(&cli.url).with_timeout(Duration::from_secs(cli.timeout));
    if let Some(key) = &cli.api_key {
        config = config.with_api_key(key);
    }
    let syncer = Syncer::new(RegistryClient::new(config)?);

    let mode = if cli.aliased {
        SyncMode::Aliased
    } else {
        SyncMode::Verified
    };

    // Ctrl-C aborts an in-flight transfer and cleans up the partial file.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling sync");
            signal_cancel.cancel();
        }
    });

    let outcome = syncer
        .sync(mode, &cli.repo, &cli.path, &cli.dest, cli.force, &cancel)
        .await?;

    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}
