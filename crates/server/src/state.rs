//! Application state shared across handlers.

use crate::sessions::SessionStore;
use std::sync::Arc;
use uprelay_core::config::AppConfig;
use uprelay_upstream::StorageProvider;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Storage provider receiving relayed uploads.
    pub provider: Arc<dyn StorageProvider>,
    /// Upload sessions, written by relay tasks and read by progress handlers.
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: AppConfig, provider: Arc<dyn StorageProvider>) -> Self {
        let sessions = SessionStore::new(&config.sessions);
        Self {
            config: Arc::new(config),
            provider,
            sessions,
        }
    }
}
