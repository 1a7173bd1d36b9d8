//! Home Assistant REST API
//!
//! Implements the parts of the Home Assistant REST API the server exposes
//! using axum: status, config entries, discovery flows, and the Supervisor
//! push endpoint when running under a Supervisor.
//! Based on: https://developers.home-assistant.io/docs/api/rest

pub mod config_entries;

use axum::{
    routing::{delete, get, post},
    Json, Router,
};
use ha_config_entries::{ConfigEntries, FlowManager};
use ha_hassio::HassIODiscovery;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config_entries: Arc<ConfigEntries>,
    pub flows: Arc<FlowManager>,
    /// Set when running under a Supervisor
    pub hassio: Option<Arc<HassIODiscovery>>,
}

/// API status response
#[derive(Serialize)]
struct ApiStatus {
    message: &'static str,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/api/", get(api_status))
        .route("/api/health", get(health_check))
        .route(
            "/api/config/config_entries/entry",
            get(config_entries::list_config_entries),
        )
        .route(
            "/api/config/config_entries/entry/:entry_id",
            delete(config_entries::delete_config_entry),
        )
        .route(
            "/api/config/config_entries/flow",
            get(config_entries::list_flows),
        )
        .route(
            "/api/config/config_entries/flow/:flow_id",
            post(config_entries::confirm_flow).delete(config_entries::abort_flow),
        )
        .with_state(state.clone());

    if let Some(discovery) = state.hassio {
        router = router.merge(ha_hassio::create_router(discovery));
    }

    router.layer(TraceLayer::new_for_http()).layer(cors)
}

/// Start the API server
pub async fn start_server(state: AppState, addr: &str) -> std::io::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);
    axum::serve(listener, router).await
}

// ==================== Handlers ====================

/// GET /api/ - Returns API status
async fn api_status() -> Json<ApiStatus> {
    Json(ApiStatus {
        message: "API running.",
    })
}

/// GET /api/health - Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
