//! Turns Supervisor announcements into config flows and config entry removals

use async_trait::async_trait;
use ha_config_entries::{
    ConfigEntries, ConfigEntriesResult, ConfigEntry, ConfigEntrySource, DiscoveryKey,
    FlowContext, FlowManager, FlowOutcome,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::announcement::{Announcement, DiscoveryRemoval, HassioServiceInfo};
use crate::error::{HassioError, HassioResult};
use crate::handler::SupervisorClient;
use crate::{ATTR_ADDON, DISCOVERY_KEY_VERSION, DOMAIN};

/// Where discovered services are offered to integrations
#[async_trait]
pub trait FlowSink: Send + Sync {
    async fn create_flow(
        &self,
        handler: &str,
        source: ConfigEntrySource,
        payload: serde_json::Value,
        discovery_key: DiscoveryKey,
    );
}

#[async_trait]
impl FlowSink for FlowManager {
    async fn create_flow(
        &self,
        handler: &str,
        source: ConfigEntrySource,
        payload: serde_json::Value,
        discovery_key: DiscoveryKey,
    ) {
        let context = FlowContext::discovery(source, discovery_key);
        match self.async_create_flow(handler, context, payload).await {
            FlowOutcome::Abort { reason, .. } => {
                debug!(handler, %reason, "Discovery flow aborted")
            }
            outcome => debug!(handler, ?outcome, "Discovery flow created"),
        }
    }
}

/// Read and remove access to config entries
#[async_trait]
pub trait EntryStore: Send + Sync {
    fn entries_for_service(&self, service: &str) -> Vec<ConfigEntry>;

    async fn remove_entry(&self, entry_id: &str) -> ConfigEntriesResult<()>;
}

#[async_trait]
impl EntryStore for ConfigEntries {
    fn entries_for_service(&self, service: &str) -> Vec<ConfigEntry> {
        self.get_by_domain(service)
    }

    async fn remove_entry(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        self.remove(entry_id).await.map(|_| ())
    }
}

/// Add-on discovery coordinator
pub struct HassIODiscovery {
    supervisor: Arc<dyn SupervisorClient>,
    flows: Arc<dyn FlowSink>,
    entries: Arc<dyn EntryStore>,
}

impl HassIODiscovery {
    pub fn new(
        supervisor: Arc<dyn SupervisorClient>,
        flows: Arc<dyn FlowSink>,
        entries: Arc<dyn EntryStore>,
    ) -> Self {
        Self {
            supervisor,
            flows,
            entries,
        }
    }

    pub fn supervisor(&self) -> &Arc<dyn SupervisorClient> {
        &self.supervisor
    }

    /// Offer an announced service to its integration
    ///
    /// Looks up the add-on name, stamps it into the config under `addon` and
    /// creates a hassio-sourced flow keyed by the announcement uuid. Without
    /// add-on info nothing is created.
    pub async fn process_new(&self, announcement: Announcement) -> HassioResult<()> {
        let Announcement {
            service,
            mut config,
            addon,
            uuid,
        } = announcement;

        let addon_info = match self.supervisor.addon_info(&addon).await {
            Ok(info) => info,
            Err(err) => {
                error!("Can't read add-on info: {}", err);
                return Err(err);
            }
        };

        config.insert(
            ATTR_ADDON.to_string(),
            serde_json::Value::String(addon_info.name.clone()),
        );

        let service_info = HassioServiceInfo {
            config,
            name: addon_info.name,
            slug: addon,
            uuid: uuid.clone(),
        };
        info!(
            "Discovered {} service from add-on {}",
            service, service_info.slug
        );

        let payload = serde_json::to_value(&service_info)
            .map_err(|e| HassioError::InvalidPayload(e.to_string()))?;

        self.flows
            .create_flow(
                &service,
                ConfigEntrySource::Hassio,
                payload,
                DiscoveryKey::new(DOMAIN, uuid, DISCOVERY_KEY_VERSION),
            )
            .await;

        Ok(())
    }

    /// Remove config entries created from a withdrawn announcement
    ///
    /// The Supervisor is asked first; if it still has the announcement the
    /// request is treated as spurious and nothing is removed. Otherwise every
    /// hassio-sourced entry of `service` whose unique id is the uuid goes.
    /// Returns the number of entries removed.
    pub async fn process_del(&self, removal: DiscoveryRemoval) -> HassioResult<usize> {
        let DiscoveryRemoval { service, uuid } = removal;

        if self.supervisor.get_discovery_message(&uuid).await.is_ok() {
            warn!("Retrieve wrong unload for {}", service);
            return Err(HassioError::SpuriousRemoval { service, uuid });
        }

        let mut removed = 0;
        for entry in self.entries.entries_for_service(&service) {
            if entry.source != ConfigEntrySource::Hassio
                || entry.unique_id.as_deref() != Some(uuid.as_str())
            {
                continue;
            }

            match self.entries.remove_entry(&entry.entry_id).await {
                Ok(()) => {
                    info!("Removed {} entry {} for discovery {}", service, entry.entry_id, uuid);
                    removed += 1;
                }
                Err(err) => error!(
                    "Failed to remove {} entry {}: {}",
                    service, entry.entry_id, err
                ),
            }
        }

        Ok(removed)
    }

    /// Replay an announcement the Supervisor still holds
    ///
    /// Returns whether anything was replayed. A missing announcement is
    /// normal after the add-on went away and is only logged at debug.
    pub async fn rediscover(&self, uuid: &str) -> bool {
        let announcement = match self.supervisor.get_discovery_message(uuid).await {
            Ok(announcement) => announcement,
            Err(err) => {
                debug!("Can't find discovery message {}: {}", uuid, err);
                return false;
            }
        };

        self.process_new(announcement).await.is_ok()
    }
}
