//! Server entry point.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use contextualize::agent::config::{AgentConfig, load_excluded_domains};
use contextualize::server::{AppState, router};
use contextualize::storage::Storage;

/// Propaganda detection and contextualization service.
///
/// Serves a websocket API that classifies propaganda techniques in
/// article text and contextualizes detected claims with web-sourced
/// citations.
#[derive(Parser, Debug)]
#[command(name = "contextualize-rs")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Socket address to listen on.
    #[arg(long, default_value = "0.0.0.0:8000", env = "CTX_BIND")]
    bind: SocketAddr,

    /// Path to the analysis database file.
    #[arg(long, default_value = "analysis.db", env = "CTX_DB_PATH")]
    db: PathBuf,

    /// File with one domain per line to exclude from search results.
    #[arg(long, env = "CTX_EXCLUDED_DOMAINS_FILE")]
    excluded_domains_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = AgentConfig::from_env().context("loading configuration")?;
    if let Some(ref path) = cli.excluded_domains_file {
        config.excluded_domains = load_excluded_domains(path)
            .with_context(|| format!("loading excluded domains from {}", path.display()))?;
        info!(
            count = config.excluded_domains.len(),
            "loaded excluded domains"
        );
    }

    let storage = Storage::open(&cli.db).context("opening analysis database")?;
    let state = Arc::new(AppState {
        config,
        storage: Arc::new(storage),
    });

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("binding {}", cli.bind))?;
    info!(addr = %cli.bind, "listening");
    axum::serve(listener, router(state))
        .await
        .context("server error")?;
    Ok(())
}
