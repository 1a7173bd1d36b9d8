//! Config Entries
//!
//! This crate provides the configuration entry system for Home Assistant.
//! Config entries represent individual integration instances; discovery flows
//! are how discovered devices and services become config entries.
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - A single integration configuration
//! - [`DiscoveryKey`] - Provenance of a discovered entry
//! - [`ConfigEntries`] - Manager for all config entries
//! - [`FlowManager`] - Deduplicating discovery flow manager
//!
//! # Storage
//!
//! Config entries are persisted in `.storage/core.config_entries` with
//! version tracking for migrations.

pub mod entry;
pub mod flow;
pub mod manager;
pub mod storage;

// Re-export main types
pub use entry::{
    ConfigEntry, ConfigEntryDisabledBy, ConfigEntrySource, DiscoveryKey,
    MAX_DISCOVERY_KEYS_PER_DOMAIN,
};

pub use flow::{
    ConfirmDiscoveryHandler, DiscoveryFlowHandler, FlowContext, FlowError, FlowManager,
    FlowOutcome, FlowProgress, FlowResult, FlowStep, ABORT_ALREADY_CONFIGURED,
    ABORT_ALREADY_IN_PROGRESS, ABORT_NOT_IMPLEMENTED, STEP_CONFIRM,
};

pub use manager::{
    signal_discovered_config_entry_removed, ConfigEntries, ConfigEntriesData, ConfigEntriesError,
    ConfigEntriesResult, STORAGE_KEY, STORAGE_MINOR_VERSION, STORAGE_VERSION,
};

pub use storage::{Storage, StorageError, StorageResult};
