//! YAML configuration loading for Home Assistant
//!
//! Loads `configuration.yaml` with support for Home Assistant's custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR [default]` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use ha_config::ServerConfig;
//!
//! let config = ServerConfig::load(Path::new("/config"))?;
//! if let Some(hassio) = &config.hassio {
//!     println!("Supervisor at {}", hassio.supervisor);
//! }
//! ```

mod error;
mod loader;
mod secrets;
mod server_config;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, YamlLoader};
pub use secrets::Secrets;
pub use server_config::{
    HassioConfig, HttpConfig, LoggerConfig, ServerConfig, CONFIG_FILE, DEFAULT_SERVER_PORT,
    DEFAULT_SUPERVISOR, ENV_SUPERVISOR, ENV_SUPERVISOR_TOKEN,
};

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::Value;
