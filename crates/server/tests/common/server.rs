//! Server test utilities.

use httpmock::MockServer;
use std::sync::Arc;
use tempfile::TempDir;
use uprelay_core::config::{AppConfig, B2Config};
use uprelay_server::{AppState, create_router};
use uprelay_upstream::StorageProvider;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server relaying to the given provider.
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self::with_config(provider, |_| {})
    }

    /// Create a test server with custom config modifications.
    pub fn with_config<F>(provider: Arc<dyn StorageProvider>, modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let mut config = Self::test_config(&temp_dir);
        modifier(&mut config);

        let state = AppState::new(config, provider);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Create a test server whose B2 backend talks to a mock server.
    pub fn with_b2<F>(mock: &MockServer, modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let mut config = Self::test_config(&temp_dir);
        config.provider.b2 = B2Config {
            key_id: Some("keyid".to_string()),
            application_key: Some("secret".to_string()),
            bucket_id: Some("bucket-id".to_string()),
            bucket_name: Some("mybucket".to_string()),
            api_url: mock.base_url(),
        };
        modifier(&mut config);

        let provider = uprelay_upstream::from_config(&config.provider)
            .expect("Failed to create B2 provider");
        let state = AppState::new(config, provider);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Directory uploads are spooled to.
    pub fn spool_dir(&self) -> std::path::PathBuf {
        self.state.config.server.temp_dir()
    }

    /// Number of spooled files still on disk.
    pub fn spooled_files(&self) -> usize {
        std::fs::read_dir(self.spool_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    fn test_config(temp_dir: &TempDir) -> AppConfig {
        let spool = temp_dir.path().join("spool");
        std::fs::create_dir_all(&spool).expect("Failed to create spool directory");

        let mut config = AppConfig::for_testing();
        config.server.temp_dir = Some(spool);
        config.progress.stream_interval_ms = 10;
        config.progress.subscribe_grace_secs = 2;
        config
    }
}
