//! Config entry and discovery flow endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use ha_config_entries::{
    ConfigEntriesError, ConfigEntry, ConfigEntryDisabledBy, ConfigEntrySource, FlowProgress,
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use crate::AppState;

/// Entry as listed by `GET /api/config/config_entries/entry`
#[derive(Debug, Serialize)]
pub struct ConfigEntryResponse {
    pub entry_id: String,
    pub domain: String,
    pub title: String,
    pub source: ConfigEntrySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    pub disabled_by: Option<ConfigEntryDisabledBy>,
}

impl From<ConfigEntry> for ConfigEntryResponse {
    fn from(entry: ConfigEntry) -> Self {
        Self {
            entry_id: entry.entry_id,
            domain: entry.domain,
            title: entry.title,
            source: entry.source,
            unique_id: entry.unique_id,
            disabled_by: entry.disabled_by,
        }
    }
}

/// GET /api/config/config_entries/entry - List config entries
pub async fn list_config_entries(State(state): State<AppState>) -> Json<Vec<ConfigEntryResponse>> {
    let mut entries: Vec<ConfigEntryResponse> = state
        .config_entries
        .iter()
        .map(ConfigEntryResponse::from)
        .collect();
    entries.sort_by(|a, b| (&a.domain, &a.title).cmp(&(&b.domain, &b.title)));
    Json(entries)
}

/// DELETE /api/config/config_entries/entry/{entry_id} - Delete a config entry
pub async fn delete_config_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> impl IntoResponse {
    info!("HTTP DELETE config entry: {}", entry_id);

    match state.config_entries.remove(&entry_id).await {
        Ok(_) => (StatusCode::OK, Json(json!({"require_restart": false}))),
        Err(ConfigEntriesError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({"message": format!("Invalid entry specified: {}", entry_id)})),
        ),
        Err(e) => {
            error!("Failed to delete config entry {}: {}", entry_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"message": e.to_string()})),
            )
        }
    }
}

/// GET /api/config/config_entries/flow - Flows waiting for confirmation
pub async fn list_flows(State(state): State<AppState>) -> Json<Vec<FlowProgress>> {
    Json(state.flows.async_progress())
}

/// POST /api/config/config_entries/flow/{flow_id} - Confirm a discovery flow
pub async fn confirm_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
    user_input: Option<Json<serde_json::Value>>,
) -> impl IntoResponse {
    info!("HTTP POST confirm flow: {}", flow_id);

    let user_input = user_input.map(|Json(input)| input);
    match state.flows.async_confirm(&flow_id, user_input).await {
        Ok(outcome) => match serde_json::to_value(&outcome) {
            Ok(body) => (StatusCode::OK, Json(body)),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"message": e.to_string()})),
            ),
        },
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(json!({"message": format!("Invalid flow specified: {}", e)})),
        ),
    }
}

/// DELETE /api/config/config_entries/flow/{flow_id} - Abort a discovery flow
pub async fn abort_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
) -> impl IntoResponse {
    info!("HTTP DELETE (abort) flow: {}", flow_id);

    match state.flows.async_abort(&flow_id) {
        Ok(()) => (StatusCode::OK, Json(json!({"message": "Flow aborted"}))),
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(json!({"message": format!("Invalid flow specified: {}", e)})),
        ),
    }
}
