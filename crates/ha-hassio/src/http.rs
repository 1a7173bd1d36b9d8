//! Push endpoint the Supervisor calls when announcements change

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use std::sync::Arc;
use tracing::{debug, error};

use crate::announcement::DiscoveryRemoval;
use crate::discovery::HassIODiscovery;

pub const DISCOVERY_PUSH_PATH: &str = "/api/hassio_push/discovery/:uuid";

/// Router for the discovery push endpoint
pub fn create_router(discovery: Arc<HassIODiscovery>) -> Router {
    Router::new()
        .route(
            DISCOVERY_PUSH_PATH,
            post(post_discovery).delete(delete_discovery),
        )
        .with_state(discovery)
}

/// POST: the Supervisor has a new announcement
async fn post_discovery(
    State(discovery): State<Arc<HassIODiscovery>>,
    Path(uuid): Path<String>,
) -> StatusCode {
    let announcement = match discovery.supervisor().get_discovery_message(&uuid).await {
        Ok(announcement) => announcement,
        Err(err) => {
            error!("Can't read discovery data: {}", err);
            return StatusCode::SERVICE_UNAVAILABLE;
        }
    };

    if let Err(err) = discovery.process_new(announcement).await {
        debug!("Discovery {} not processed: {}", uuid, err);
    }

    StatusCode::OK
}

/// DELETE: an announcement was withdrawn
async fn delete_discovery(
    State(discovery): State<Arc<HassIODiscovery>>,
    Path(uuid): Path<String>,
    Json(removal): Json<DiscoveryRemoval>,
) -> StatusCode {
    if removal.uuid != uuid {
        debug!("Removal body uuid {} differs from path {}", removal.uuid, uuid);
    }

    if let Err(err) = discovery.process_del(removal).await {
        debug!("Discovery removal for {} not processed: {}", uuid, err);
    }

    StatusCode::OK
}
