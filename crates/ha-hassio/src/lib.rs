//! Home Assistant Supervisor add-on discovery
//!
//! Add-ons announce the services they provide (an MQTT broker, a Hue bridge
//! emulator, ...) to the Supervisor. This crate turns those announcements
//! into config flows for the matching integration and cleans up config
//! entries when an announcement is withdrawn.
//!
//! Announcements reach us three ways:
//!
//! - the backlog, fetched once when the host starts
//! - the push endpoint at `/api/hassio_push/discovery/:uuid`
//! - rediscovery, when a user deletes an entry the Supervisor still announces

pub mod announcement;
pub mod discovery;
pub mod error;
pub mod handler;
pub mod http;
pub mod setup;

pub use announcement::{
    AddonInfo, Announcement, DiscoveryMessages, DiscoveryRemoval, HassioServiceInfo,
};
pub use discovery::{EntryStore, FlowSink, HassIODiscovery};
pub use error::{HassioError, HassioResult};
pub use handler::{HassIO, SupervisorClient, DEFAULT_SUPERVISOR_URL, DEFAULT_TIMEOUT};
pub use http::{create_router, DISCOVERY_PUSH_PATH};
pub use setup::{
    async_setup_discovery, handle_config_entry_removed, process_backlog, BacklogReport,
    DiscoveryListeners,
};

pub const DOMAIN: &str = "hassio";

/// Version of the discovery keys this crate writes and understands
pub const DISCOVERY_KEY_VERSION: u32 = 1;

pub const ATTR_ADDON: &str = "addon";
