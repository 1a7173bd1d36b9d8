//! Test doubles for the discovery collaborators

#![allow(dead_code)]

use async_trait::async_trait;
use ha_config_entries::{
    ConfigEntries, ConfigEntriesError, ConfigEntriesResult, ConfigEntry, ConfigEntrySource,
    DiscoveryFlowHandler, DiscoveryKey, FlowManager, FlowStep, Storage,
};
use ha_event_bus::{Dispatcher, SharedDispatcher};
use ha_hassio::{
    AddonInfo, Announcement, DiscoveryMessages, EntryStore, FlowSink, HassioError,
    HassioResult, SupervisorClient,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub fn announcement(service: &str, addon: &str, uuid: &str) -> Announcement {
    Announcement {
        service: service.to_string(),
        config: serde_json::Map::new(),
        addon: addon.to_string(),
        uuid: uuid.to_string(),
    }
}

/// In-memory Supervisor
#[derive(Default)]
pub struct MockSupervisor {
    announcements: Mutex<HashMap<String, Announcement>>,
    addons: Mutex<HashMap<String, AddonInfo>>,
    backlog_unavailable: AtomicBool,
    lookups: Mutex<Vec<String>>,
}

impl MockSupervisor {
    pub fn announce(&self, announcement: Announcement) {
        self.announcements
            .lock()
            .unwrap()
            .insert(announcement.uuid.clone(), announcement);
    }

    pub fn purge(&self, uuid: &str) {
        self.announcements.lock().unwrap().remove(uuid);
    }

    pub fn install_addon(&self, slug: &str, name: &str) {
        self.addons.lock().unwrap().insert(
            slug.to_string(),
            AddonInfo {
                name: name.to_string(),
                slug: Some(slug.to_string()),
                version: None,
            },
        );
    }

    pub fn fail_backlog(&self) {
        self.backlog_unavailable.store(true, Ordering::SeqCst);
    }

    /// Every uuid passed to `get_discovery_message` so far
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl SupervisorClient for MockSupervisor {
    async fn get_discovery_message(&self, uuid: &str) -> HassioResult<Announcement> {
        self.lookups.lock().unwrap().push(uuid.to_string());
        self.announcements
            .lock()
            .unwrap()
            .get(uuid)
            .cloned()
            .ok_or_else(|| {
                HassioError::SupervisorUnavailable("Discovery message not found".to_string())
            })
    }

    async fn retrieve_discovery_messages(&self) -> HassioResult<DiscoveryMessages> {
        if self.backlog_unavailable.load(Ordering::SeqCst) {
            return Err(HassioError::SupervisorUnavailable(
                "connection refused".to_string(),
            ));
        }

        let mut discovery: Vec<Announcement> =
            self.announcements.lock().unwrap().values().cloned().collect();
        discovery.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        Ok(DiscoveryMessages { discovery })
    }

    async fn addon_info(&self, slug: &str) -> HassioResult<AddonInfo> {
        self.addons
            .lock()
            .unwrap()
            .get(slug)
            .cloned()
            .ok_or_else(|| HassioError::AddonInfoMissing {
                slug: slug.to_string(),
                reason: "Addon does not exist".to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowCall {
    pub handler: String,
    pub source: ConfigEntrySource,
    pub payload: serde_json::Value,
    pub discovery_key: DiscoveryKey,
}

/// Flow sink that only records
#[derive(Default)]
pub struct RecordingFlows {
    calls: Mutex<Vec<FlowCall>>,
    panicking: Mutex<HashSet<String>>,
}

impl RecordingFlows {
    pub fn calls(&self) -> Vec<FlowCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Make flows for `handler` panic instead of being recorded
    pub fn panic_for(&self, handler: &str) {
        self.panicking.lock().unwrap().insert(handler.to_string());
    }
}

#[async_trait]
impl FlowSink for RecordingFlows {
    async fn create_flow(
        &self,
        handler: &str,
        source: ConfigEntrySource,
        payload: serde_json::Value,
        discovery_key: DiscoveryKey,
    ) {
        let panics = self.panicking.lock().unwrap().contains(handler);
        if panics {
            panic!("flow handler {} crashed", handler);
        }
        self.calls.lock().unwrap().push(FlowCall {
            handler: handler.to_string(),
            source,
            payload,
            discovery_key,
        });
    }
}

/// Entry store over a plain list
#[derive(Default)]
pub struct MockEntries {
    entries: Mutex<Vec<ConfigEntry>>,
    failing: Mutex<HashSet<String>>,
    removed: Mutex<Vec<String>>,
    queries: AtomicUsize,
}

impl MockEntries {
    pub fn with_entries(entries: Vec<ConfigEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Default::default()
        }
    }

    /// Make removing `entry_id` fail
    pub fn fail_removal_of(&self, entry_id: &str) {
        self.failing.lock().unwrap().insert(entry_id.to_string());
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> Vec<ConfigEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Calls of either store operation
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntryStore for MockEntries {
    fn entries_for_service(&self, service: &str) -> Vec<ConfigEntry> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.domain == service)
            .cloned()
            .collect()
    }

    async fn remove_entry(&self, entry_id: &str) -> ConfigEntriesResult<()> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(entry_id) {
            return Err(ConfigEntriesError::NotFound(entry_id.to_string()));
        }
        self.entries
            .lock()
            .unwrap()
            .retain(|entry| entry.entry_id != entry_id);
        self.removed.lock().unwrap().push(entry_id.to_string());
        Ok(())
    }
}

pub fn hassio_entry(service: &str, uuid: &str) -> ConfigEntry {
    ConfigEntry::new(service, format!("{} {}", service, uuid))
        .with_source(ConfigEntrySource::Hassio)
        .with_unique_id(uuid)
        .with_discovery_key(DiscoveryKey::new("hassio", uuid, 1))
}

/// Creates the entry as soon as the flow starts
pub struct AutoCreate;

#[async_trait]
impl DiscoveryFlowHandler for AutoCreate {
    async fn async_step_discovery(
        &self,
        _source: &ConfigEntrySource,
        data: &serde_json::Value,
    ) -> FlowStep {
        FlowStep::CreateEntry {
            title: data["name"].as_str().unwrap_or("?").to_string(),
            data: HashMap::new(),
        }
    }

    async fn async_step_confirm(
        &self,
        _data: &serde_json::Value,
        _user_input: Option<serde_json::Value>,
    ) -> FlowStep {
        FlowStep::Abort("unexpected".to_string())
    }
}

/// Real config entries and flow manager on a temp dir
pub struct Host {
    pub dir: TempDir,
    pub dispatcher: SharedDispatcher<ConfigEntry>,
    pub entries: Arc<ConfigEntries>,
    pub flows: Arc<FlowManager>,
}

impl Host {
    pub fn new(flows: impl FnOnce(Arc<ConfigEntries>) -> FlowManager) -> Self {
        let dir = TempDir::new().unwrap();
        let dispatcher: SharedDispatcher<ConfigEntry> = Arc::new(Dispatcher::new());
        let entries = Arc::new(ConfigEntries::new(
            Arc::new(Storage::new(dir.path())),
            dispatcher.clone(),
        ));
        let flows = Arc::new(flows(entries.clone()));
        Self {
            dir,
            dispatcher,
            entries,
            flows,
        }
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
