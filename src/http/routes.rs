//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::State,
    http::{header, Method},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Upper bound for plain HTTP requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins(&state.config.client_origin))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let http_routes = Router::new()
        .route("/health", get(health_handler))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CompressionLayer::new());

    // Upgraded sockets outlive any request timeout
    Router::new()
        .merge(http_routes)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// `*` allows any origin, otherwise a comma-separated list
fn allowed_origins(client_origin: &str) -> AllowOrigin {
    if client_origin.trim() == "*" {
        return AllowOrigin::any();
    }
    let origins: Vec<header::HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();
    AllowOrigin::list(origins)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub online_players: usize,
    pub ranked_queue: usize,
    pub level_queue: usize,
    pub active_battles: usize,
    pub players_in_battle: usize,
    pub store: &'static str,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let (ranked_queue, level_queue) = state.matchmaking.queue_sizes().await;

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        online_players: state.presence.online(),
        ranked_queue,
        level_queue,
        active_battles: state.battles.active_battles(),
        players_in_battle: state.battles.total_players(),
        store: state.store.backend_name(),
    })
}
