//! Wires discovery into the host lifecycle

use futures::future::join_all;
use ha_config_entries::{signal_discovered_config_entry_removed, ConfigEntry, DiscoveryKey};
use ha_core::events::HOMEASSISTANT_START;
use ha_event_bus::{Dispatcher, EventBus};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::discovery::HassIODiscovery;
use crate::error::{HassioError, HassioResult};
use crate::{DISCOVERY_KEY_VERSION, DOMAIN};

/// Background tasks started by [`async_setup_discovery`]
pub struct DiscoveryListeners {
    /// Runs the backlog once the host has started
    pub startup: JoinHandle<()>,
    /// Rediscovers add-ons whose config entry was removed
    pub entry_removed: JoinHandle<()>,
}

impl DiscoveryListeners {
    pub fn abort(&self) {
        self.startup.abort();
        self.entry_removed.abort();
    }
}

/// Outcome of processing the Supervisor backlog
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BacklogReport {
    pub processed: usize,
    pub failed: usize,
}

/// Set up add-on discovery
///
/// The backlog is processed once `homeassistant_start` fires, and each
/// removed config entry that was discovered through the Supervisor gets its
/// announcement replayed if the Supervisor still has it.
pub fn async_setup_discovery(
    discovery: Arc<HassIODiscovery>,
    bus: &EventBus,
    dispatcher: &Dispatcher<ConfigEntry>,
) -> DiscoveryListeners {
    let startup = bus.listen_once(HOMEASSISTANT_START, {
        let discovery = discovery.clone();
        move |_event| async move {
            // errors are logged where they happen
            let _ = process_backlog(&discovery).await;
        }
    });

    let entry_removed = dispatcher.connect_with(
        &signal_discovered_config_entry_removed(DOMAIN),
        move |entry: ConfigEntry| {
            let discovery = discovery.clone();
            async move {
                handle_config_entry_removed(&discovery, &entry).await;
            }
        },
    );

    debug!("Add-on discovery set up");

    DiscoveryListeners {
        startup,
        entry_removed,
    }
}

/// Process every announcement the Supervisor currently holds
///
/// Announcements are processed concurrently and this returns once all of them
/// are done. One failing announcement does not affect the others.
pub async fn process_backlog(discovery: &Arc<HassIODiscovery>) -> HassioResult<BacklogReport> {
    let messages = match discovery.supervisor().retrieve_discovery_messages().await {
        Ok(messages) => messages,
        Err(err) => {
            error!("Can't read discover info: {}", err);
            return Err(err);
        }
    };

    let jobs = messages.discovery.into_iter().map(|announcement| {
        let discovery = discovery.clone();
        tokio::spawn(async move { discovery.process_new(announcement).await })
    });

    let mut report = BacklogReport::default();
    for result in join_all(jobs).await {
        match result {
            Ok(Ok(())) => report.processed += 1,
            Ok(Err(_)) => report.failed += 1,
            Err(err) => {
                error!("Discovery task failed: {}", err);
                report.failed += 1;
            }
        }
    }

    info!(
        "Processed {} add-on discovery messages ({} failed)",
        report.processed, report.failed
    );

    Ok(report)
}

/// Replay the Supervisor announcements a removed entry was created from
///
/// Returns the uuids that were rediscovered.
pub async fn handle_config_entry_removed(
    discovery: &HassIODiscovery,
    entry: &ConfigEntry,
) -> Vec<String> {
    let mut rediscovered = Vec::new();

    for key in entry.discovery_keys_for(DOMAIN) {
        let uuid = match discovery_uuid(key) {
            Ok(uuid) => uuid,
            Err(err) => {
                debug!("Skipping discovery key of {}: {}", entry.entry_id, err);
                continue;
            }
        };

        debug!("Rediscover addon {}", uuid);
        if discovery.rediscover(uuid).await {
            rediscovered.push(uuid.to_string());
        }
    }

    rediscovered
}

fn discovery_uuid(key: &DiscoveryKey) -> HassioResult<&str> {
    if key.version != DISCOVERY_KEY_VERSION {
        return Err(HassioError::MalformedKey {
            version: key.version,
        });
    }

    key.key_str().ok_or(HassioError::MalformedKey {
        version: key.version,
    })
}
