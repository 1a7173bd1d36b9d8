//! Supervisor REST client

use async_trait::async_trait;
use reqwest::{header, Client, Method};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tracing::debug;

use crate::announcement::{AddonInfo, Announcement, DiscoveryMessages};
use crate::error::{HassioError, HassioResult};

pub const DEFAULT_SUPERVISOR_URL: &str = "http://supervisor";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// The Supervisor calls discovery depends on
#[async_trait]
pub trait SupervisorClient: Send + Sync {
    /// Fetch one announcement by uuid
    async fn get_discovery_message(&self, uuid: &str) -> HassioResult<Announcement>;

    /// Fetch every announcement the Supervisor currently holds
    async fn retrieve_discovery_messages(&self) -> HassioResult<DiscoveryMessages>;

    /// Fetch add-on metadata
    async fn addon_info(&self, slug: &str) -> HassioResult<AddonInfo>;
}

/// `{"result": "ok" | "error", "data": ..., "message": ...}`
#[derive(Debug, Deserialize)]
struct SupervisorResponse<T> {
    result: String,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the Supervisor API
#[derive(Debug, Clone)]
pub struct HassIO {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HassIO {
    /// Create a client for `supervisor`, which may be a bare host as found in
    /// the `SUPERVISOR` environment variable
    pub fn new(supervisor: &str, token: Option<String>, timeout: Duration) -> HassioResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: normalize_base_url(supervisor),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send_command<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
    ) -> HassioResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "Supervisor request");

        let mut request = self.client.request(method, &url);
        if let Some(token) = &self.token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();

        let body: SupervisorResponse<T> = response.json().await.map_err(|e| {
            HassioError::SupervisorUnavailable(format!("{} returned {}: {}", path, status, e))
        })?;

        if body.result != "ok" {
            return Err(HassioError::SupervisorUnavailable(
                body.message
                    .unwrap_or_else(|| format!("{} returned {}", path, status)),
            ));
        }

        body.data.ok_or_else(|| {
            HassioError::SupervisorUnavailable(format!("{} returned no data", path))
        })
    }
}

#[async_trait]
impl SupervisorClient for HassIO {
    async fn get_discovery_message(&self, uuid: &str) -> HassioResult<Announcement> {
        self.send_command(Method::GET, &format!("/discovery/{}", uuid))
            .await
    }

    async fn retrieve_discovery_messages(&self) -> HassioResult<DiscoveryMessages> {
        self.send_command(Method::GET, "/discovery").await
    }

    async fn addon_info(&self, slug: &str) -> HassioResult<AddonInfo> {
        self.send_command(Method::GET, &format!("/addons/{}/info", slug))
            .await
            .map_err(|e| HassioError::AddonInfoMissing {
                slug: slug.to_string(),
                reason: e.to_string(),
            })
    }
}

fn normalize_base_url(supervisor: &str) -> String {
    let trimmed = supervisor.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_SUPERVISOR_URL.to_string()
    } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("172.30.32.2"), "http://172.30.32.2");
        assert_eq!(normalize_base_url("http://supervisor/"), "http://supervisor");
        assert_eq!(normalize_base_url("https://sv:8443"), "https://sv:8443");
        assert_eq!(normalize_base_url(""), DEFAULT_SUPERVISOR_URL);
    }

    #[test]
    fn test_error_envelope_has_no_data() {
        let body: SupervisorResponse<Announcement> = serde_json::from_value(json!({
            "result": "error",
            "message": "Discovery message not found"
        }))
        .unwrap();

        assert_eq!(body.result, "error");
        assert!(body.data.is_none());
        assert_eq!(body.message.as_deref(), Some("Discovery message not found"));
    }

    #[test]
    fn test_ok_envelope() {
        let body: SupervisorResponse<AddonInfo> = serde_json::from_value(json!({
            "result": "ok",
            "data": {"name": "Mosquitto broker", "slug": "core_mosquitto", "state": "started"}
        }))
        .unwrap();

        assert_eq!(body.data.unwrap().name, "Mosquitto broker");
    }

    #[tokio::test]
    async fn test_unreachable_supervisor() {
        let hassio = HassIO::new("127.0.0.1:1", None, Duration::from_millis(500)).unwrap();
        assert_eq!(hassio.base_url(), "http://127.0.0.1:1");

        let result = hassio.retrieve_discovery_messages().await;
        assert!(matches!(result, Err(HassioError::SupervisorUnavailable(_))));

        let result = hassio.addon_info("core_mosquitto").await;
        assert!(matches!(result, Err(HassioError::AddonInfoMissing { .. })));
    }
}
