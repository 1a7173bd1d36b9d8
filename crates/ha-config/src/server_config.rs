//! Typed view of `configuration.yaml`

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::loader::YamlLoader;

pub const CONFIG_FILE: &str = "configuration.yaml";

pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 8123;
pub const DEFAULT_SUPERVISOR: &str = "http://supervisor";
pub const DEFAULT_SUPERVISOR_TIMEOUT: u64 = 10;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable holding the Supervisor host
pub const ENV_SUPERVISOR: &str = "SUPERVISOR";
/// Environment variable holding the Supervisor API token
pub const ENV_SUPERVISOR_TOKEN: &str = "SUPERVISOR_TOKEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            server_host: default_server_host(),
            server_port: default_server_port(),
        }
    }
}

/// Supervisor connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HassioConfig {
    /// Host or URL of the Supervisor
    #[serde(default = "default_supervisor")]
    pub supervisor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_supervisor_timeout")]
    pub timeout: u64,
}

impl Default for HassioConfig {
    fn default() -> Self {
        Self {
            supervisor: default_supervisor(),
            token: None,
            timeout: default_supervisor_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggerConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
        }
    }
}

/// The parts of `configuration.yaml` the server reads
///
/// Unknown top-level sections are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub http: HttpConfig,
    /// Absent means the Supervisor integration is not set up
    #[serde(default, deserialize_with = "deserialize_section")]
    pub hassio: Option<HassioConfig>,
    #[serde(default)]
    pub logger: LoggerConfig,
}

impl ServerConfig {
    /// Load from `<config_dir>/configuration.yaml` and apply environment
    /// overrides; a missing file yields the defaults
    pub fn load(config_dir: &Path) -> ConfigResult<Self> {
        let mut config = if config_dir.join(CONFIG_FILE).exists() {
            let value = YamlLoader::new(config_dir)?.load_file(CONFIG_FILE)?;
            Self::from_value(value)?
        } else {
            info!("No {} in {:?}, using defaults", CONFIG_FILE, config_dir);
            Self::default()
        };

        config.apply_env(|var| std::env::var(var).ok());
        Ok(config)
    }

    pub fn from_value(value: serde_yaml::Value) -> ConfigResult<Self> {
        // an empty file parses as null
        if value.is_null() {
            return Ok(Self::default());
        }

        let config: Self =
            serde_yaml::from_value(value).map_err(|e| ConfigError::InvalidValue {
                key: CONFIG_FILE.to_string(),
                reason: e.to_string(),
            })?;

        if config.hassio.as_ref().is_some_and(|hassio| hassio.timeout == 0) {
            return Err(ConfigError::InvalidValue {
                key: "hassio.timeout".to_string(),
                reason: "must be at least 1 second".to_string(),
            });
        }

        Ok(config)
    }

    /// Apply `SUPERVISOR` and `SUPERVISOR_TOKEN`
    ///
    /// Running under a Supervisor (`SUPERVISOR` set) enables the `hassio`
    /// section even when the file has none.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(supervisor) = lookup(ENV_SUPERVISOR).filter(|s| !s.is_empty()) {
            debug!("Supervisor host from {}: {}", ENV_SUPERVISOR, supervisor);
            self.hassio.get_or_insert_with(HassioConfig::default).supervisor = supervisor;
        }

        if let Some(hassio) = self.hassio.as_mut() {
            if let Some(token) = lookup(ENV_SUPERVISOR_TOKEN).filter(|s| !s.is_empty()) {
                hassio.token = Some(token);
            }
        }
    }

    /// `host:port` for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.http.server_host, self.http.server_port)
    }
}

/// `hassio:` with no body still enables the section
fn deserialize_section<'de, D>(deserializer: D) -> Result<Option<HassioConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let section: Option<Option<HassioConfig>> = Option::deserialize(deserializer)?;
    Ok(Some(section.flatten().unwrap_or_default()))
}

fn default_server_host() -> String {
    DEFAULT_SERVER_HOST.to_string()
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_supervisor() -> String {
    DEFAULT_SUPERVISOR.to_string()
}

fn default_supervisor_timeout() -> u64 {
    DEFAULT_SUPERVISOR_TIMEOUT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
