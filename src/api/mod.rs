//! HTTP layer — Axum REST API over the ledger engines.
//!
//! All endpoints return JSON. Authentication is supplied by an upstream
//! gateway which forwards the caller's identity as request headers; see
//! `routes::AuthedUser`. CORS enabled for the SPA frontend.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::GameConfig;
use crate::engine::lifecycle::RoundLifecycle;
use crate::engine::placement::PlacementService;
use crate::engine::settlement::SettlementEngine;
use crate::store::Store;
use crate::wallet::WalletService;

/// Shared state accessible by all route handlers.
pub struct AppState {
    pub store: Store,
    pub placement: PlacementService,
    pub settlement: SettlementEngine,
    pub lifecycle: RoundLifecycle,
    pub wallet: WalletService,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(store: Store, game: GameConfig) -> SharedState {
        Arc::new(Self {
            placement: PlacementService::new(store.clone(), game.clone()),
            settlement: SettlementEngine::new(store.clone(), game.clone()),
            lifecycle: RoundLifecycle::new(store.clone()),
            wallet: WalletService::new(store.clone(), game),
            store,
        })
    }
}

/// Serve the API until the shutdown future resolves.
pub async fn serve(
    state: SharedState,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    info!(port, "API server listening on http://localhost:{port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        // public
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route("/api/auth/register", post(routes::register))
        // user
        .route("/api/auth/me", get(routes::me))
        .route("/api/bet/place", post(routes::place_bet))
        .route("/api/bet/current-round", get(routes::current_round))
        .route("/api/bet/history", get(routes::bet_history))
        .route("/api/payment/deposit", post(routes::submit_deposit))
        .route("/api/payment/deposits", get(routes::my_deposits))
        .route("/api/payment/withdraw", post(routes::submit_withdrawal))
        .route("/api/payment/withdrawals", get(routes::my_withdrawals))
        // admin
        .route("/api/admin/bets", get(routes::current_round_bets))
        .route(
            "/api/admin/current-round-bet-stats",
            get(routes::current_round_bet_stats),
        )
        .route("/api/admin/announce", post(routes::announce_result))
        .route("/api/admin/rounds", post(routes::open_round).get(routes::list_rounds))
        .route("/api/admin/users", get(routes::list_users))
        .route("/api/admin/stats", get(routes::platform_stats))
        .route("/api/admin/settings", put(routes::update_settings))
        .route("/api/admin/deposits", get(routes::list_deposits))
        .route("/api/admin/deposits/:id/approve", post(routes::approve_deposit))
        .route("/api/admin/deposits/:id/reject", post(routes::reject_deposit))
        .route("/api/admin/withdrawals", get(routes::list_withdrawals))
        .route(
            "/api/admin/withdrawals/:id/approve",
            post(routes::approve_withdrawal),
        )
        .route(
            "/api/admin/withdrawals/:id/reject",
            post(routes::reject_withdrawal),
        )
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
