use std::sync::Arc;

use itv2_engine::{PanelStateStore, SessionConfig, SessionRegistry, SharedSessionRegistry};
use itv2_wire::{Registry, WireError};

/// Shared application state, cloned into every WebSocket and HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub session_registry: SharedSessionRegistry,
    pub panel_state: Arc<PanelStateStore>,
    pub wire_registry: Arc<Registry>,
    pub session_config_template: SessionConfig,
}

impl AppState {
    /// Fails only if `Registry::build` finds a duplicate command code — a
    /// startup-fatal programmer error (§4.4), not a runtime condition.
    pub fn new(
        default_device_class: impl Into<String>,
        session_config_template: SessionConfig,
    ) -> Result<Self, WireError> {
        Ok(Self {
            session_registry: Arc::new(SessionRegistry::default()),
            panel_state: Arc::new(PanelStateStore::new(default_device_class)),
            wire_registry: Arc::new(Registry::build()?),
            session_config_template,
        })
    }
}
