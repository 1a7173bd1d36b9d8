//! Messages exchanged with the Supervisor discovery API

use serde::{Deserialize, Serialize};

/// A service announced by an add-on
///
/// The Supervisor keeps `uuid` stable for the lifetime of the announced
/// service instance, so repeated announcements of one instance share it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    /// Integration domain the service is meant for (e.g. `mqtt`)
    pub service: String,
    /// Connection parameters, opaque to this crate
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    /// Slug of the announcing add-on
    pub addon: String,
    pub uuid: String,
}

/// Body of a push removal request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRemoval {
    pub service: String,
    pub uuid: String,
}

/// Backlog returned by `GET /discovery`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryMessages {
    #[serde(default)]
    pub discovery: Vec<Announcement>,
}

/// The part of `GET /addons/{slug}/info` we use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Discovery payload handed to config flows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HassioServiceInfo {
    /// Announcement config with the add-on name merged in under `addon`
    pub config: serde_json::Map<String, serde_json::Value>,
    /// Add-on display name
    pub name: String,
    pub slug: String,
    pub uuid: String,
}
