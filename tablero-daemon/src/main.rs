use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tablero_daemon::config::DaemonConfig;
use tablero_daemon::http;
use tablero_data::UserProfile;
use tablero_engine::{Engine, EngineConfig};

#[derive(Parser)]
#[command(name = "tablero-daemon", about = "Hosts the Tablero workspace sync engine")]
struct Cli {
    /// Path to config file (default: ~/.config/tablero/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the identity profile JSON (default: ~/.config/tablero/profile.json)
    #[arg(long)]
    profile: Option<PathBuf>,
}

fn default_profile_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tablero")
        .join("profile.json")
}

/// Load the identity profile produced by the login flow. The identity
/// provider itself lives outside this daemon.
fn load_profile(path: &PathBuf) -> Result<UserProfile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read profile: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse profile: {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = DaemonConfig::load(cli.config.as_ref())?;
    let profile_path = cli.profile.unwrap_or_else(default_profile_path);
    let profile = load_profile(&profile_path)?;
    info!(sub = %profile.sub, name = %profile.name, "identity loaded");

    let engine = Engine::start(
        EngineConfig {
            convex_url: config.convex_url.clone(),
            vault_root: config.vault_root.clone(),
        },
        profile,
    )
    .await?;

    let cancel = CancellationToken::new();
    let http_handle =
        http::spawn_http_server(engine.clone(), config.http_port, cancel.clone()).await?;

    info!("daemon started");

    tokio::select! {
        _ = cancel.cancelled() => {
            info!("shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
            cancel.cancel();
        }
    }

    engine.shutdown();
    http_handle.abort();
    info!("daemon stopped");
    Ok(())
}
