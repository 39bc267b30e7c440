use std::sync::Arc;

use crate::{config::AppConfig, services::host::HostFacade, state::EventHub};

/// Handle shared by every route.
pub type SharedState = Arc<AppState>;

/// Application state handed to the axum routers.
pub struct AppState {
    host: Arc<HostFacade>,
    hub: Arc<EventHub>,
    config: Arc<AppConfig>,
}

impl AppState {
    /// Bundle the host and its event hub.
    pub fn new(host: Arc<HostFacade>, hub: Arc<EventHub>, config: Arc<AppConfig>) -> SharedState {
        Arc::new(Self { host, hub, config })
    }

    /// The hosted game.
    pub fn host(&self) -> &Arc<HostFacade> {
        &self.host
    }

    /// Fan-out hub for SSE and WebSocket clients.
    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    /// Loaded configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
