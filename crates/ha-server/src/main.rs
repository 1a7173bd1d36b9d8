//! Home Assistant Rust Server
//!
//! Main entry point for the Home Assistant Rust implementation.

use anyhow::{Context as _, Result};
use ha_api::{start_server, AppState};
use ha_config::{HassioConfig, ServerConfig};
use ha_config_entries::{ConfigEntries, ConfigEntry, ConfirmDiscoveryHandler, FlowManager, Storage};
use ha_core::events;
use ha_event_bus::{Dispatcher, EventBus, SharedDispatcher};
use ha_hassio::{async_setup_discovery, DiscoveryListeners, HassIO, HassIODiscovery};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_CONFIG_DIR: &str = "./config";

/// The central Home Assistant instance
pub struct HomeAssistant {
    /// Event bus for pub/sub communication
    pub bus: Arc<EventBus>,
    /// In-process signals carrying config entries
    pub dispatcher: SharedDispatcher<ConfigEntry>,
    pub config_entries: Arc<ConfigEntries>,
    pub flows: Arc<FlowManager>,
}

impl HomeAssistant {
    /// Create a new Home Assistant instance storing its state in `config_dir`
    pub fn new(config_dir: &Path) -> Self {
        let bus = Arc::new(EventBus::new());
        let dispatcher: SharedDispatcher<ConfigEntry> = Arc::new(Dispatcher::new());
        let storage = Arc::new(Storage::new(config_dir));
        let config_entries = Arc::new(ConfigEntries::new(storage, dispatcher.clone()));
        let flows = Arc::new(
            FlowManager::new(config_entries.clone())
                .with_default_handler(Arc::new(ConfirmDiscoveryHandler)),
        );

        Self {
            bus,
            dispatcher,
            config_entries,
            flows,
        }
    }

    /// Connect to the Supervisor and start add-on discovery
    pub fn setup_hassio(
        &self,
        config: &HassioConfig,
    ) -> Result<(Arc<HassIODiscovery>, DiscoveryListeners)> {
        let supervisor = HassIO::new(
            &config.supervisor,
            config.token.clone(),
            Duration::from_secs(config.timeout),
        )?;
        info!("Using Supervisor at {}", supervisor.base_url());

        let discovery = Arc::new(HassIODiscovery::new(
            Arc::new(supervisor),
            self.flows.clone(),
            self.config_entries.clone(),
        ));
        let listeners = async_setup_discovery(discovery.clone(), &self.bus, &self.dispatcher);

        Ok((discovery, listeners))
    }
}

/// First CLI argument, then `HASS_CONFIG`, then `./config`
fn config_dir(arg: Option<String>, env: Option<String>) -> PathBuf {
    arg.or(env)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR))
}

fn init_tracing(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .context("invalid log level")?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_dir = config_dir(std::env::args().nth(1), std::env::var("HASS_CONFIG").ok());
    let config = ServerConfig::load(&config_dir)
        .with_context(|| format!("failed to load configuration from {:?}", config_dir))?;

    init_tracing(&config.logger.default)?;

    info!("Starting Home Assistant (Rust) with config dir {:?}", config_dir);

    let hass = HomeAssistant::new(&config_dir);
    hass.config_entries
        .load()
        .await
        .context("failed to load config entries")?;
    info!("Loaded {} config entries", hass.config_entries.len());

    let (hassio, listeners) = match &config.hassio {
        Some(hassio_config) => {
            let (discovery, listeners) = hass.setup_hassio(hassio_config)?;
            (Some(discovery), Some(listeners))
        }
        None => {
            info!("No Supervisor configured, add-on discovery disabled");
            (None, None)
        }
    };

    let state = AppState {
        config_entries: hass.config_entries.clone(),
        flows: hass.flows.clone(),
        hassio,
    };
    let addr = config.bind_address();
    let mut server = tokio::spawn(async move { start_server(state, &addr).await });

    hass.bus
        .fire(events::lifecycle(events::HOMEASSISTANT_START));
    hass.flows.async_start().await;
    hass.bus
        .fire(events::lifecycle(events::HOMEASSISTANT_STARTED));

    info!("Home Assistant is running");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutting down...");
        }
        served = &mut server => {
            served??;
            warn!("API server stopped");
        }
    }

    hass.bus
        .fire(events::lifecycle(events::HOMEASSISTANT_STOP));
    if let Some(listeners) = listeners {
        listeners.abort();
    }
    server.abort();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir() {
        assert_eq!(
            config_dir(Some("/data".into()), Some("/env".into())),
            PathBuf::from("/data")
        );
        assert_eq!(config_dir(None, Some("/env".into())), PathBuf::from("/env"));
        assert_eq!(config_dir(None, None), PathBuf::from("./config"));
        assert_eq!(config_dir(Some(String::new()), None), PathBuf::from("./config"));
    }
}
