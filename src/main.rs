//! SattaWala — number-betting round ledger service
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the ledger store, and runs the API server (plus the scheduled
//! result trigger) with graceful shutdown.

use anyhow::Result;
use tracing::info;

use sattawala::api::{self, AppState};
use sattawala::config::AppConfig;
use sattawala::engine::scheduler::ResultScheduler;
use sattawala::engine::settlement::SettlementEngine;
use sattawala::store::Store;

const BANNER: &str = r#"
  ____    _  _____ _____  _    __        ___    _        _
 / ___|  / \|_   _|_   _|/ \   \ \      / / \  | |      / \
 \___ \ / _ \ | |   | | / _ \   \ \ /\ / / _ \ | |     / _ \
  ___) / ___ \| |   | |/ ___ \   \ V  V / ___ \| |___ / ___ \
 |____/_/   \_\_|   |_/_/   \_\   \_/\_/_/   \_\_____/_/   \_\

  Number-betting round ledger
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        port = cfg.server.port,
        database = %cfg.database.url,
        number_range = format!("{}..={}", cfg.game.number_min, cfg.game.number_max),
        auto_announce = cfg.game.auto_announce,
        "SattaWala starting up"
    );

    // -- Open the ledger store -------------------------------------------

    let store = Store::connect(&cfg.database.url).await?;
    let state = AppState::new(store.clone(), cfg.game.clone());

    // -- Scheduled result trigger ----------------------------------------

    let scheduler = if cfg.game.auto_announce {
        let engine = SettlementEngine::new(store, cfg.game.clone());
        Some(ResultScheduler::new(engine, cfg.game.clone()).spawn())
    } else {
        info!("Auto-announce disabled; results are announced manually");
        None
    };

    // -- Serve until ctrl-c ----------------------------------------------

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received.");
    };
    api::serve(state, cfg.server.port, shutdown).await?;

    if let Some(handle) = scheduler {
        handle.abort();
    }
    info!("SattaWala shut down cleanly.");

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sattawala=info"));

    let json_logging = std::env::var("SATTAWALA_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
