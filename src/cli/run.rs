use super::config::{default_config_path, default_storage_path, TrustChainConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trustchain::api::{build_router, AppState};
use trustchain::invites::RandomCodeGenerator;
use trustchain::persistence::{SqliteStateStore, StateStore};
use trustchain::TrustNetwork;

/// Run the API service
///
/// ## Configuration Loading
///
/// 1. `--config` flag if provided
/// 2. Default config at `<data_dir>/trustchain/config.toml`
///
/// If the config file doesn't exist, a default one is generated with the
/// database adjacent to it.
///
/// ## State
///
/// With `[storage] path` set, stored state is loaded and validated; an empty
/// store is bootstrapped from `[network]` and `[poll]` and seeded with the
/// result. Without it the trust graph lives in memory for the lifetime of
/// the process.
pub async fn execute(
    config_path: Option<String>,
    bind: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    let config = if config_path.exists() {
        TrustChainConfig::load(&config_path)?
    } else {
        println!("📝 No config file found. Creating default configuration...");
        TrustChainConfig::create_default(&config_path, &default_storage_path(&config_path))?;
        println!("   Created: {}", config_path.display());
        TrustChainConfig::load(&config_path)?
    };

    init_tracing(&config.logging.level);
    tracing::info!(config = %config_path.display(), "starting trustchain");

    let state = build_state(&config).await?;
    let app = build_router(state);

    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", bind, e))?;
    tracing::info!(address = %bind, "API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    tracing::info!("shutdown complete");
    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", level)));

    // A subscriber may already be installed (tests).
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Restore or bootstrap the network and attach the store, if configured.
pub async fn build_state(
    config: &TrustChainConfig,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let network = match &config.storage.path {
        Some(path) => open_network(config, path).await?,
        None => {
            tracing::warn!("no storage path configured, state will not survive restart");
            bootstrap(config)?
        }
    };

    let mut state = AppState::new(Arc::new(network));
    match &config.server.operator_token {
        Some(token) => state = state.with_operator_token(token.clone()),
        None => tracing::info!("no operator token configured, operator routes disabled"),
    }
    Ok(state)
}

async fn open_network(
    config: &TrustChainConfig,
    path: &Path,
) -> Result<TrustNetwork, Box<dyn std::error::Error>> {
    let store = Arc::new(SqliteStateStore::open(path).await?);
    let network = match store.load().await? {
        Some(snapshot) => TrustNetwork::restore(
            snapshot,
            config.network.standard_quota,
            Box::new(RandomCodeGenerator),
        )?,
        None => {
            let network = bootstrap(config)?;
            store.save(&network.snapshot().await).await?;
            network
        }
    };
    network.verify().await?;

    Ok(network.with_store(store))
}

fn bootstrap(config: &TrustChainConfig) -> Result<TrustNetwork, Box<dyn std::error::Error>> {
    let network = TrustNetwork::with_defaults(&config.network, config.poll.clone().into_poll())?;
    tracing::info!(seeds = config.network.seeds.len() as u64, "trust network bootstrapped");
    Ok(network)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}
