//! Discovery Flow Manager
//!
//! Turns discovery events into config entries. A flow is started per
//! discovered thing; the integration's [`DiscoveryFlowHandler`] decides
//! whether to create an entry right away, ask the user to confirm, or abort.
//!
//! Deduplication is keyed on (handler domain, unique id), where the unique id
//! is the discovery key of the flow:
//!
//! - an existing entry with that unique id aborts the flow as
//!   `already_configured` (the discovery key is recorded on the entry)
//! - a flow in progress with that unique id aborts it as `already_in_progress`
//!
//! Flows created before [`FlowManager::async_start`] are queued and started
//! once the host is running.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

use crate::entry::{ConfigEntry, ConfigEntrySource, DiscoveryKey};
use crate::manager::{ConfigEntries, ConfigEntriesError};

pub const ABORT_ALREADY_CONFIGURED: &str = "already_configured";
pub const ABORT_ALREADY_IN_PROGRESS: &str = "already_in_progress";
pub const ABORT_NOT_IMPLEMENTED: &str = "not_implemented";
pub const ABORT_UNKNOWN: &str = "unknown";

/// Step id of a flow waiting for the user to confirm a discovery
pub const STEP_CONFIRM: &str = "discovery_confirm";

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Unknown flow: {0}")]
    UnknownFlow(String),
}

pub type FlowResult<T> = Result<T, FlowError>;

/// How a flow was started
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowContext {
    pub source: ConfigEntrySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery_key: Option<DiscoveryKey>,
}

impl FlowContext {
    pub fn discovery(source: ConfigEntrySource, discovery_key: DiscoveryKey) -> Self {
        Self {
            source,
            discovery_key: Some(discovery_key),
        }
    }

    /// Unique id claimed by flows started with this context
    fn unique_id(&self) -> Option<String> {
        self.discovery_key
            .as_ref()
            .and_then(|key| key.key_str())
            .map(str::to_string)
    }
}

/// What a handler wants to happen next
#[derive(Debug, Clone, PartialEq)]
pub enum FlowStep {
    /// Create the config entry now
    CreateEntry {
        title: String,
        data: HashMap<String, serde_json::Value>,
    },
    /// Wait for the user to confirm
    Confirm,
    /// Stop the flow
    Abort(String),
}

/// Integration side of a discovery flow
#[async_trait]
pub trait DiscoveryFlowHandler: Send + Sync {
    /// First step, called with the discovery payload
    async fn async_step_discovery(
        &self,
        source: &ConfigEntrySource,
        data: &serde_json::Value,
    ) -> FlowStep;

    /// Called when the user confirms a flow that returned [`FlowStep::Confirm`]
    async fn async_step_confirm(
        &self,
        data: &serde_json::Value,
        user_input: Option<serde_json::Value>,
    ) -> FlowStep;
}

/// Handler for integrations without their own discovery logic
///
/// Every discovery waits for confirmation; confirming creates an entry titled
/// after the payload's `name`, holding the payload's `config` mapping.
pub struct ConfirmDiscoveryHandler;

#[async_trait]
impl DiscoveryFlowHandler for ConfirmDiscoveryHandler {
    async fn async_step_discovery(
        &self,
        _source: &ConfigEntrySource,
        _data: &serde_json::Value,
    ) -> FlowStep {
        FlowStep::Confirm
    }

    async fn async_step_confirm(
        &self,
        data: &serde_json::Value,
        _user_input: Option<serde_json::Value>,
    ) -> FlowStep {
        let title = data
            .get("name")
            .and_then(|name| name.as_str())
            .unwrap_or("Discovered device")
            .to_string();
        let config = data
            .get("config")
            .and_then(|config| config.as_object())
            .map(|config| config.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        FlowStep::CreateEntry {
            title,
            data: config,
        }
    }
}

/// Result of starting or progressing a flow
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowOutcome {
    CreateEntry {
        flow_id: String,
        handler: String,
        entry_id: String,
        title: String,
    },
    Form {
        flow_id: String,
        handler: String,
        step_id: String,
    },
    Abort {
        flow_id: String,
        handler: String,
        reason: String,
    },
    /// Queued until the host has started
    Deferred { handler: String },
}

/// A flow waiting for user input
#[derive(Debug, Clone, Serialize)]
pub struct FlowProgress {
    pub flow_id: String,
    pub handler: String,
    pub step_id: String,
    pub context: FlowContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ActiveFlow {
    flow_id: String,
    handler: String,
    context: FlowContext,
    unique_id: Option<String>,
    data: serde_json::Value,
    created_at: DateTime<Utc>,
}

struct PendingFlow {
    handler: String,
    context: FlowContext,
    data: serde_json::Value,
}

/// Discovery flow manager
pub struct FlowManager {
    config_entries: Arc<ConfigEntries>,

    handlers: DashMap<String, Arc<dyn DiscoveryFlowHandler>>,

    /// Used for domains without a registered handler
    default_handler: Option<Arc<dyn DiscoveryFlowHandler>>,

    /// Flows waiting for confirmation, by flow_id
    flows: DashMap<String, ActiveFlow>,

    /// (handler, unique_id) -> flow_id of the flow holding the claim
    in_progress: DashMap<(String, String), String>,

    started: AtomicBool,

    /// Flows created before start; guarded together with `started`
    pending: Mutex<Vec<PendingFlow>>,
}

impl FlowManager {
    pub fn new(config_entries: Arc<ConfigEntries>) -> Self {
        Self {
            config_entries,
            handlers: DashMap::new(),
            default_handler: None,
            flows: DashMap::new(),
            in_progress: DashMap::new(),
            started: AtomicBool::new(false),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Use `handler` for every domain without its own handler
    pub fn with_default_handler(mut self, handler: Arc<dyn DiscoveryFlowHandler>) -> Self {
        self.default_handler = Some(handler);
        self
    }

    pub fn register_handler(&self, domain: &str, handler: Arc<dyn DiscoveryFlowHandler>) {
        self.handlers.insert(domain.to_string(), handler);
        debug!("Registered discovery flow handler for domain: {}", domain);
    }

    fn handler_for(&self, domain: &str) -> Option<Arc<dyn DiscoveryFlowHandler>> {
        self.handlers
            .get(domain)
            .map(|r| r.value().clone())
            .or_else(|| self.default_handler.clone())
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<PendingFlow>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Start a discovery flow, or queue it if the host is not running yet
    pub async fn async_create_flow(
        &self,
        handler: &str,
        context: FlowContext,
        data: serde_json::Value,
    ) -> FlowOutcome {
        {
            let mut pending = self.lock_pending();
            if !self.is_started() {
                debug!(handler, "Deferring discovery flow until start");
                pending.push(PendingFlow {
                    handler: handler.to_string(),
                    context,
                    data,
                });
                return FlowOutcome::Deferred {
                    handler: handler.to_string(),
                };
            }
        }

        self.async_init(handler, context, data).await
    }

    /// Mark the host as running and start every queued flow
    pub async fn async_start(&self) -> Vec<FlowOutcome> {
        let queued = {
            let mut pending = self.lock_pending();
            self.started.store(true, Ordering::SeqCst);
            std::mem::take(&mut *pending)
        };

        if !queued.is_empty() {
            info!("Starting {} deferred discovery flows", queued.len());
        }

        let mut outcomes = Vec::with_capacity(queued.len());
        for flow in queued {
            outcomes.push(self.async_init(&flow.handler, flow.context, flow.data).await);
        }
        outcomes
    }

    /// Start a flow now
    pub async fn async_init(
        &self,
        handler: &str,
        context: FlowContext,
        data: serde_json::Value,
    ) -> FlowOutcome {
        let flow_id = Ulid::new().to_string();
        let unique_id = context.unique_id();

        if let Some(ref unique_id) = unique_id {
            if self.config_entries.get_by_unique_id(handler, unique_id).is_some() {
                self.record_discovery_key(handler, unique_id, &context).await;
                debug!(handler, unique_id = %unique_id, "Discovered entry already configured");
                return abort(&flow_id, handler, ABORT_ALREADY_CONFIGURED);
            }

            match self
                .in_progress
                .entry((handler.to_string(), unique_id.clone()))
            {
                Entry::Occupied(_) => {
                    debug!(handler, unique_id = %unique_id, "Discovery flow already in progress");
                    return abort(&flow_id, handler, ABORT_ALREADY_IN_PROGRESS);
                }
                Entry::Vacant(slot) => {
                    slot.insert(flow_id.clone());
                }
            }
        }

        let flow = ActiveFlow {
            flow_id: flow_id.clone(),
            handler: handler.to_string(),
            context,
            unique_id,
            data,
            created_at: Utc::now(),
        };

        let Some(flow_handler) = self.handler_for(handler) else {
            warn!("No discovery flow handler for domain: {}", handler);
            self.release(&flow);
            return abort(&flow_id, handler, ABORT_NOT_IMPLEMENTED);
        };

        let step = flow_handler
            .async_step_discovery(&flow.context.source, &flow.data)
            .await;
        self.apply_step(flow, step).await
    }

    /// Continue a flow waiting for confirmation
    pub async fn async_confirm(
        &self,
        flow_id: &str,
        user_input: Option<serde_json::Value>,
    ) -> FlowResult<FlowOutcome> {
        let (_, flow) = self
            .flows
            .remove(flow_id)
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))?;

        let Some(flow_handler) = self.handler_for(&flow.handler) else {
            self.release(&flow);
            return Ok(abort(&flow.flow_id, &flow.handler, ABORT_NOT_IMPLEMENTED));
        };

        let step = flow_handler.async_step_confirm(&flow.data, user_input).await;
        Ok(self.apply_step(flow, step).await)
    }

    /// Abort a flow waiting for confirmation
    pub fn async_abort(&self, flow_id: &str) -> FlowResult<()> {
        let (_, flow) = self
            .flows
            .remove(flow_id)
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))?;
        self.release(&flow);
        info!("Aborted discovery flow {} ({})", flow_id, flow.handler);
        Ok(())
    }

    /// Flows currently waiting for confirmation
    pub fn async_progress(&self) -> Vec<FlowProgress> {
        self.flows
            .iter()
            .map(|r| {
                let flow = r.value();
                FlowProgress {
                    flow_id: flow.flow_id.clone(),
                    handler: flow.handler.clone(),
                    step_id: STEP_CONFIRM.to_string(),
                    context: flow.context.clone(),
                    unique_id: flow.unique_id.clone(),
                    created_at: flow.created_at,
                }
            })
            .collect()
    }

    async fn apply_step(&self, flow: ActiveFlow, step: FlowStep) -> FlowOutcome {
        match step {
            FlowStep::Confirm => {
                let outcome = FlowOutcome::Form {
                    flow_id: flow.flow_id.clone(),
                    handler: flow.handler.clone(),
                    step_id: STEP_CONFIRM.to_string(),
                };
                self.flows.insert(flow.flow_id.clone(), flow);
                outcome
            }
            FlowStep::Abort(reason) => {
                self.release(&flow);
                debug!("Discovery flow {} aborted: {}", flow.flow_id, reason);
                abort(&flow.flow_id, &flow.handler, &reason)
            }
            FlowStep::CreateEntry { title, data } => {
                let outcome = self.create_entry(&flow, title, data).await;
                self.release(&flow);
                outcome
            }
        }
    }

    async fn create_entry(
        &self,
        flow: &ActiveFlow,
        title: String,
        data: HashMap<String, serde_json::Value>,
    ) -> FlowOutcome {
        let mut entry = ConfigEntry::new(&flow.handler, title)
            .with_data(data)
            .with_source(flow.context.source.clone());
        if let Some(ref unique_id) = flow.unique_id {
            entry = entry.with_unique_id(unique_id);
        }
        if let Some(ref key) = flow.context.discovery_key {
            entry = entry.with_discovery_key(key.clone());
        }

        match self.config_entries.add(entry).await {
            Ok(entry) => FlowOutcome::CreateEntry {
                flow_id: flow.flow_id.clone(),
                handler: flow.handler.clone(),
                entry_id: entry.entry_id,
                title: entry.title,
            },
            Err(ConfigEntriesError::AlreadyExists { unique_id, .. }) => {
                self.record_discovery_key(&flow.handler, &unique_id, &flow.context)
                    .await;
                abort(&flow.flow_id, &flow.handler, ABORT_ALREADY_CONFIGURED)
            }
            Err(e) => {
                error!("Failed to create config entry for {}: {}", flow.handler, e);
                abort(&flow.flow_id, &flow.handler, ABORT_UNKNOWN)
            }
        }
    }

    /// Remember the flow's discovery key on the entry already configured
    /// for (handler, unique_id)
    async fn record_discovery_key(&self, handler: &str, unique_id: &str, context: &FlowContext) {
        let (Some(key), Some(existing)) = (
            context.discovery_key.as_ref(),
            self.config_entries.get_by_unique_id(handler, unique_id),
        ) else {
            return;
        };

        if let Err(e) = self
            .config_entries
            .add_discovery_key(&existing.entry_id, key.clone())
            .await
        {
            warn!("Failed to record discovery key on {}: {}", existing.entry_id, e);
        }
    }

    /// Drop the unique id claim held by `flow`
    fn release(&self, flow: &ActiveFlow) {
        if let Some(ref unique_id) = flow.unique_id {
            self.in_progress
                .remove_if(&(flow.handler.clone(), unique_id.clone()), |_, owner| {
                    *owner == flow.flow_id
                });
        }
    }
}

fn abort(flow_id: &str, handler: &str, reason: &str) -> FlowOutcome {
    FlowOutcome::Abort {
        flow_id: flow_id.to_string(),
        handler: handler.to_string(),
        reason: reason.to_string(),
    }
}
