//! Config Entry types
//!
//! A ConfigEntry represents a single instance of an integration's configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Most discovery keys remembered per discovery domain on one entry
pub const MAX_DISCOVERY_KEYS_PER_DOMAIN: usize = 10;

/// Source of the config entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntrySource {
    /// Configured via UI/API
    #[default]
    User,
    /// Imported from YAML config
    Import,
    /// Generic discovery
    Discovery,
    /// DHCP discovery
    Dhcp,
    /// UPnP/SSDP discovery
    Ssdp,
    /// mDNS/Bonjour discovery
    Zeroconf,
    /// Bluetooth device discovery
    Bluetooth,
    /// MQTT announcement discovery
    Mqtt,
    /// Service announced by a Supervisor add-on
    Hassio,
    /// HomeKit accessory discovery
    Homekit,
    /// User hiding a discovery
    Ignore,
    /// Integration-triggered discovery
    IntegrationDiscovery,
}

impl ConfigEntrySource {
    /// Wire name of the source, as stored and shown to flows
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigEntrySource::User => "user",
            ConfigEntrySource::Import => "import",
            ConfigEntrySource::Discovery => "discovery",
            ConfigEntrySource::Dhcp => "dhcp",
            ConfigEntrySource::Ssdp => "ssdp",
            ConfigEntrySource::Zeroconf => "zeroconf",
            ConfigEntrySource::Bluetooth => "bluetooth",
            ConfigEntrySource::Mqtt => "mqtt",
            ConfigEntrySource::Hassio => "hassio",
            ConfigEntrySource::Homekit => "homekit",
            ConfigEntrySource::Ignore => "ignore",
            ConfigEntrySource::IntegrationDiscovery => "integration_discovery",
        }
    }
}

impl std::fmt::Display for ConfigEntrySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of a discovered config entry
///
/// `domain` is the integration that discovered the entry (e.g. `hassio`),
/// `key` identifies the discovered thing within that domain. The key is kept
/// as raw JSON because its shape is owned by the discovering domain and may
/// change between `version`s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryKey {
    pub domain: String,
    pub key: serde_json::Value,
    pub version: u32,
}

impl DiscoveryKey {
    pub fn new(domain: impl Into<String>, key: impl Into<serde_json::Value>, version: u32) -> Self {
        Self {
            domain: domain.into(),
            key: key.into(),
            version,
        }
    }

    /// The key as a string, if it is one
    pub fn key_str(&self) -> Option<&str> {
        self.key.as_str()
    }
}

/// Reason an entry was disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntryDisabledBy {
    /// Disabled by the user
    User,
}

/// A configuration entry for an integration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Unique identifier (ULID)
    pub entry_id: String,

    /// Integration domain (e.g., "hue", "mqtt")
    pub domain: String,

    /// Human-readable display name
    pub title: String,

    /// Immutable configuration data
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,

    /// User-configurable options
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,

    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_minor_version")]
    pub minor_version: u32,

    /// Optional unique identifier for duplicate prevention
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,

    /// Origin type
    #[serde(default)]
    pub source: ConfigEntrySource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_by: Option<ConfigEntryDisabledBy>,

    /// Discovery domain -> keys that justified this entry
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub discovery_keys: HashMap<String, Vec<DiscoveryKey>>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

fn default_minor_version() -> u32 {
    1
}

impl ConfigEntry {
    pub fn new(domain: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            entry_id: ulid::Ulid::new().to_string(),
            domain: domain.into(),
            title: title.into(),
            data: HashMap::new(),
            options: HashMap::new(),
            version: 1,
            minor_version: 1,
            unique_id: None,
            source: ConfigEntrySource::User,
            disabled_by: None,
            discovery_keys: HashMap::new(),
            created_at: now,
            modified_at: now,
        }
    }

    pub fn with_data(mut self, data: HashMap<String, serde_json::Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }

    pub fn with_source(mut self, source: ConfigEntrySource) -> Self {
        self.source = source;
        self
    }

    pub fn with_discovery_key(mut self, key: DiscoveryKey) -> Self {
        self.record_discovery_key(key);
        self
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled_by.is_some()
    }

    /// Keys recorded for one discovery domain
    pub fn discovery_keys_for(&self, domain: &str) -> &[DiscoveryKey] {
        self.discovery_keys
            .get(domain)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Record a discovery key, keeping the newest
    /// [`MAX_DISCOVERY_KEYS_PER_DOMAIN`] per domain
    ///
    /// Returns false if the key was already known.
    pub fn record_discovery_key(&mut self, key: DiscoveryKey) -> bool {
        let keys = self.discovery_keys.entry(key.domain.clone()).or_default();
        if keys.contains(&key) {
            return false;
        }
        keys.push(key);
        if keys.len() > MAX_DISCOVERY_KEYS_PER_DOMAIN {
            let excess = keys.len() - MAX_DISCOVERY_KEYS_PER_DOMAIN;
            keys.drain(..excess);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_entry_new() {
        let entry = ConfigEntry::new("hue", "Philips Hue");
        assert_eq!(entry.domain, "hue");
        assert_eq!(entry.title, "Philips Hue");
        assert_eq!(entry.source, ConfigEntrySource::User);
        assert!(entry.discovery_keys.is_empty());
        assert!(!entry.entry_id.is_empty());
    }

    #[test]
    fn test_config_entry_builder() {
        let entry = ConfigEntry::new("hue", "Hue Bridge")
            .with_unique_id("abc123")
            .with_source(ConfigEntrySource::Hassio)
            .with_discovery_key(DiscoveryKey::new("hassio", "abc123", 1));

        assert_eq!(entry.unique_id.as_deref(), Some("abc123"));
        assert_eq!(entry.source, ConfigEntrySource::Hassio);
        assert_eq!(entry.discovery_keys_for("hassio").len(), 1);
        assert!(entry.discovery_keys_for("zeroconf").is_empty());
    }

    #[test]
    fn test_record_discovery_key_dedup() {
        let mut entry = ConfigEntry::new("hue", "Hue");
        assert!(entry.record_discovery_key(DiscoveryKey::new("hassio", "abc123", 1)));
        assert!(!entry.record_discovery_key(DiscoveryKey::new("hassio", "abc123", 1)));
        assert_eq!(entry.discovery_keys_for("hassio").len(), 1);
    }

    #[test]
    fn test_record_discovery_key_keeps_newest() {
        let mut entry = ConfigEntry::new("hue", "Hue");
        for i in 0..(MAX_DISCOVERY_KEYS_PER_DOMAIN + 2) {
            entry.record_discovery_key(DiscoveryKey::new("hassio", format!("uuid-{i}"), 1));
        }

        let keys = entry.discovery_keys_for("hassio");
        assert_eq!(keys.len(), MAX_DISCOVERY_KEYS_PER_DOMAIN);
        assert_eq!(keys[0].key_str(), Some("uuid-2"));
    }

    #[test]
    fn test_discovery_key_wire_format() {
        let entry = ConfigEntry::new("hue", "Hue")
            .with_source(ConfigEntrySource::Hassio)
            .with_discovery_key(DiscoveryKey::new("hassio", "abc123", 1));

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["source"], "hassio");
        assert_eq!(
            json["discovery_keys"]["hassio"][0],
            serde_json::json!({"domain": "hassio", "key": "abc123", "version": 1})
        );
    }

    #[test]
    fn test_non_string_key_still_deserializes() {
        let key: DiscoveryKey =
            serde_json::from_value(serde_json::json!({"domain": "hassio", "key": ["a", 1], "version": 2}))
                .unwrap();
        assert_eq!(key.version, 2);
        assert!(key.key_str().is_none());
    }
}
