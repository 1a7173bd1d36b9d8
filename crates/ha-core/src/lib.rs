//! Core types for Home Assistant
//!
//! This crate provides the fundamental types shared by the rest of the
//! workspace: [`Event`] and [`Context`], plus the names of the core lifecycle
//! events fired by the host.

mod context;
mod event;

pub use context::Context;
pub use event::{Event, EventOrigin, EventType};

/// Core lifecycle events fired by the host process
pub mod events {
    use super::{Context, Event};

    /// Fired once when the host has finished booting and integrations may
    /// start talking to the outside world
    pub const HOMEASSISTANT_START: &str = "homeassistant_start";

    /// Fired once after every `homeassistant_start` listener had its chance to run
    pub const HOMEASSISTANT_STARTED: &str = "homeassistant_started";

    /// Fired when the host begins shutting down
    pub const HOMEASSISTANT_STOP: &str = "homeassistant_stop";

    /// Build the event fired for one of the lifecycle event names
    pub fn lifecycle(event_type: &str) -> Event<serde_json::Value> {
        Event::new(event_type, serde_json::json!({}), Context::new())
    }
}
