//! sigtrack server binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sigtrack_cache::TagCache;
use sigtrack_server::config::ServerConfig;
use sigtrack_server::dispatch::BroadcastDispatcher;
use sigtrack_server::gateway::{AppState, serve};
use sigtrack_server::publish::MutationPublisher;
use sigtrack_server::registry::ConnectionRegistry;
use sigtrack_server::store::{MemoryStore, OpenAccess};

/// Real-time update distribution server for the sigtrack map.
#[derive(Parser, Debug)]
#[command(name = "sigtrack-server", version)]
struct Args {
    /// Path to a JSON config file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured port.
    #[arg(long)]
    port: Option<u16>,
}

fn load_config(args: &Args) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let registry = Arc::new(ConnectionRegistry::new(config.send_queue));
    let cache = Arc::new(TagCache::new());
    let dispatcher = Arc::new(BroadcastDispatcher::new(Arc::clone(&registry)));
    let publisher = Arc::new(MutationPublisher::new(cache, dispatcher));
    let store = Arc::new(MemoryStore::new(publisher));

    let state = AppState::new(config, registry, store, Arc::new(OpenAccess));

    let shutdown = Arc::clone(&state.shutdown);
    let _signals = tokio::spawn(async move { shutdown.watch_signals().await });

    serve(state).await
}
