//! Configuration types shared across crates.

use crate::naming::ObjectNaming;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for structured environment overrides (`UPRELAY_SERVER__PORT=8080`).
pub const ENV_PREFIX: &str = "UPRELAY_";

/// Flat environment names understood for compatibility with existing
/// deployments, mapped onto their structured keys.
pub const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("B2_KEY_ID", "provider.b2.key_id"),
    ("B2_APP_KEY", "provider.b2.application_key"),
    ("B2_BUCKET_ID", "provider.b2.bucket_id"),
    ("B2_BUCKET_NAME", "provider.b2.bucket_name"),
    ("SUPABASE_URL", "provider.supabase.url"),
    ("SUPABASE_ANON_KEY", "provider.supabase.service_key"),
    ("SUPABASE_BUCKET", "provider.supabase.bucket"),
    ("PORT", "server.port"),
];

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest accepted file in bytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    /// Upper bound for the whole upstream sequence of one upload.
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
    /// Directory for spooled uploads (system temp dir when unset).
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// Stored object naming policy.
    #[serde(default)]
    pub naming: ObjectNaming,
    /// Expose `/metrics` for Prometheus scraping.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_upload_size() -> u64 {
    100 * 1024 * 1024
}

fn default_upload_timeout_secs() -> u64 {
    600
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_size: default_max_upload_size(),
            upload_timeout_secs: default_upload_timeout_secs(),
            temp_dir: None,
            naming: ObjectNaming::default(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Parse the listen address.
    pub fn socket_addr(&self) -> crate::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| crate::Error::InvalidConfig(format!("invalid listen address: {e}")))
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    /// Directory used for spooled uploads.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Progress reporting configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Event-stream tick in milliseconds.
    #[serde(default = "default_stream_interval_ms")]
    pub stream_interval_ms: u64,
    /// How long an event stream waits for an ID that does not exist yet.
    #[serde(default = "default_subscribe_grace_secs")]
    pub subscribe_grace_secs: u64,
}

fn default_stream_interval_ms() -> u64 {
    1000
}

fn default_subscribe_grace_secs() -> u64 {
    30
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            stream_interval_ms: default_stream_interval_ms(),
            subscribe_grace_secs: default_subscribe_grace_secs(),
        }
    }
}

impl ProgressConfig {
    pub fn stream_interval(&self) -> Duration {
        Duration::from_millis(self.stream_interval_ms)
    }

    pub fn subscribe_grace(&self) -> Duration {
        Duration::from_secs(self.subscribe_grace_secs)
    }
}

/// Session retention configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds a finished session stays readable.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Hard cap on any session's age, finished or not.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
    /// Seconds between eviction sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_max_age_secs() -> u64 {
    86400
}

fn default_sweep_interval_secs() -> u64 {
    30
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_age_secs: default_max_age_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> time::Duration {
        time::Duration::seconds(i64::try_from(self.ttl_secs).unwrap_or(i64::MAX))
    }

    pub fn max_age(&self) -> time::Duration {
        time::Duration::seconds(i64::try_from(self.max_age_secs).unwrap_or(i64::MAX))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.sweep_interval_secs == 0 {
            return Err(crate::Error::InvalidConfig(
                "sessions.sweep_interval_secs cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which storage provider receives uploads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Backblaze B2.
    #[default]
    B2,
    /// Supabase Storage.
    Supabase,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::B2 => "b2",
            Self::Supabase => "supabase",
        }
    }
}

/// Backblaze B2 settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct B2Config {
    /// Application key ID.
    #[serde(default)]
    pub key_id: Option<String>,
    /// Application key secret.
    #[serde(default)]
    pub application_key: Option<String>,
    /// Target bucket ID.
    #[serde(default)]
    pub bucket_id: Option<String>,
    /// Target bucket name (used in public URLs).
    #[serde(default)]
    pub bucket_name: Option<String>,
    /// Account authorization endpoint root.
    #[serde(default = "default_b2_api_url")]
    pub api_url: String,
}

fn default_b2_api_url() -> String {
    "https://api.backblazeb2.com".to_string()
}

impl Default for B2Config {
    fn default() -> Self {
        Self {
            key_id: None,
            application_key: None,
            bucket_id: None,
            bucket_name: None,
            api_url: default_b2_api_url(),
        }
    }
}

/// Validated B2 settings.
#[derive(Clone, Debug)]
pub struct B2Settings {
    pub key_id: String,
    pub application_key: String,
    pub bucket_id: String,
    pub bucket_name: String,
    pub api_url: String,
}

impl B2Config {
    /// Check every required key, reporting all that are absent.
    pub fn settings(&self) -> crate::Result<B2Settings> {
        let mut missing = Vec::new();
        let key_id = require(&self.key_id, "provider.b2.key_id", "B2_KEY_ID", &mut missing);
        let application_key = require(
            &self.application_key,
            "provider.b2.application_key",
            "B2_APP_KEY",
            &mut missing,
        );
        let bucket_id = require(
            &self.bucket_id,
            "provider.b2.bucket_id",
            "B2_BUCKET_ID",
            &mut missing,
        );
        let bucket_name = require(
            &self.bucket_name,
            "provider.b2.bucket_name",
            "B2_BUCKET_NAME",
            &mut missing,
        );

        match (key_id, application_key, bucket_id, bucket_name) {
            (Some(key_id), Some(application_key), Some(bucket_id), Some(bucket_name)) => {
                Ok(B2Settings {
                    key_id,
                    application_key,
                    bucket_id,
                    bucket_name,
                    api_url: self.api_url.trim_end_matches('/').to_string(),
                })
            }
            _ => Err(crate::Error::MissingConfig { keys: missing }),
        }
    }
}

/// Supabase Storage settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Project URL (e.g. `https://xyz.supabase.co`).
    #[serde(default)]
    pub url: Option<String>,
    /// Key sent as the bearer token. Never returned to clients.
    #[serde(default)]
    pub service_key: Option<String>,
    /// Target bucket.
    #[serde(default)]
    pub bucket: Option<String>,
}

/// Validated Supabase settings.
#[derive(Clone, Debug)]
pub struct SupabaseSettings {
    pub url: String,
    pub service_key: String,
    pub bucket: String,
}

impl SupabaseConfig {
    /// Check every required key, reporting all that are absent.
    pub fn settings(&self) -> crate::Result<SupabaseSettings> {
        let mut missing = Vec::new();
        let url = require(&self.url, "provider.supabase.url", "SUPABASE_URL", &mut missing);
        let service_key = require(
            &self.service_key,
            "provider.supabase.service_key",
            "SUPABASE_ANON_KEY",
            &mut missing,
        );
        let bucket = require(
            &self.bucket,
            "provider.supabase.bucket",
            "SUPABASE_BUCKET",
            &mut missing,
        );

        match (url, service_key, bucket) {
            (Some(url), Some(service_key), Some(bucket)) => Ok(SupabaseSettings {
                url: url.trim_end_matches('/').to_string(),
                service_key,
                bucket,
            }),
            _ => Err(crate::Error::MissingConfig { keys: missing }),
        }
    }
}

fn require(
    value: &Option<String>,
    key: &str,
    env: &str,
    missing: &mut Vec<String>,
) -> Option<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Some(v.to_string()),
        _ => {
            missing.push(format!("{key} ({env})"));
            None
        }
    }
}

/// Storage provider configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Selected provider.
    #[serde(default)]
    pub kind: ProviderKind,
    #[serde(default)]
    pub b2: B2Config,
    #[serde(default)]
    pub supabase: SupabaseConfig,
}

impl ProviderConfig {
    /// Validate the settings of the selected provider only.
    pub fn validate(&self) -> crate::Result<()> {
        match self.kind {
            ProviderKind::B2 => self.b2.settings().map(|_| ()),
            ProviderKind::Supabase => self.supabase.settings().map(|_| ()),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

impl AppConfig {
    /// Build the layered configuration source.
    ///
    /// Later layers win: TOML file, legacy flat env names, `UPRELAY_` env.
    pub fn figment(config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::new();
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::raw().filter_map(|key| {
                let key = key.as_str().to_ascii_uppercase();
                LEGACY_ENV_KEYS
                    .iter()
                    .find(|(env, _)| *env == key)
                    .map(|(_, mapped)| (*mapped).into())
            }))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate configuration.
    pub fn load(config_path: Option<&Path>) -> crate::Result<Self> {
        let config: AppConfig = Self::figment(config_path)
            .extract()
            .map_err(|e| crate::Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants. Fails fast on missing credentials.
    pub fn validate(&self) -> crate::Result<()> {
        if self.server.max_upload_size == 0 {
            return Err(crate::Error::InvalidConfig(
                "server.max_upload_size cannot be 0".to_string(),
            ));
        }
        if self.progress.stream_interval_ms == 0 {
            return Err(crate::Error::InvalidConfig(
                "progress.stream_interval_ms cannot be 0".to_string(),
            ));
        }
        self.sessions.validate()?;
        self.provider.validate()
    }

    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses dummy B2 credentials.
    pub fn for_testing() -> Self {
        Self {
            provider: ProviderConfig {
                kind: ProviderKind::B2,
                b2: B2Config {
                    key_id: Some("test-key-id".to_string()),
                    application_key: Some("test-app-key".to_string()),
                    bucket_id: Some("test-bucket-id".to_string()),
                    bucket_name: Some("test-bucket".to_string()),
                    api_url: default_b2_api_url(),
                },
                supabase: SupabaseConfig::default(),
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_upload_size, 100 * 1024 * 1024);
        assert_eq!(config.naming, ObjectNaming::Original);
        assert!(config.metrics_enabled);
        assert_eq!(
            config.socket_addr().unwrap(),
            "0.0.0.0:3000".parse().unwrap()
        );
    }

    #[test]
    fn test_missing_b2_keys_are_all_listed() {
        let config = B2Config {
            key_id: Some("id".to_string()),
            application_key: Some("   ".to_string()),
            ..Default::default()
        };

        match config.settings() {
            Err(crate::Error::MissingConfig { keys }) => {
                assert_eq!(
                    keys,
                    vec![
                        "provider.b2.application_key (B2_APP_KEY)".to_string(),
                        "provider.b2.bucket_id (B2_BUCKET_ID)".to_string(),
                        "provider.b2.bucket_name (B2_BUCKET_NAME)".to_string(),
                    ]
                );
            }
            other => panic!("expected MissingConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_only_selected_provider_is_validated() {
        let mut config = AppConfig::for_testing();
        assert!(config.validate().is_ok());

        config.provider.kind = ProviderKind::Supabase;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("SUPABASE_URL"));
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let mut config = AppConfig::for_testing();
        config.sessions.sweep_interval_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(crate::Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_from_legacy_env() {
        Jail::expect_with(|jail| {
            jail.set_env("B2_KEY_ID", "key");
            jail.set_env("B2_APP_KEY", "secret");
            jail.set_env("B2_BUCKET_ID", "bucket-id");
            jail.set_env("B2_BUCKET_NAME", "mybucket");
            jail.set_env("PORT", "8081");

            let config = AppConfig::load(None).expect("config loads");
            assert_eq!(config.server.port, 8081);
            let b2 = config.provider.b2.settings().unwrap();
            assert_eq!(b2.bucket_name, "mybucket");
            assert_eq!(b2.application_key, "secret");
            Ok(())
        });
    }

    #[test]
    fn test_prefixed_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "server.toml",
                r#"
                [server]
                port = 4000
                naming = "upload-id"

                [provider]
                kind = "supabase"

                [provider.supabase]
                url = "https://proj.supabase.co/"
                service_key = "key"
                bucket = "audio"
                "#,
            )?;
            jail.set_env("UPRELAY_SERVER__PORT", "5000");

            let config = AppConfig::load(Some(Path::new("server.toml"))).expect("config loads");
            assert_eq!(config.server.port, 5000);
            assert_eq!(config.server.naming, ObjectNaming::UploadId);
            assert_eq!(config.provider.kind, ProviderKind::Supabase);
            assert_eq!(
                config.provider.supabase.settings().unwrap().url,
                "https://proj.supabase.co"
            );
            Ok(())
        });
    }

    #[test]
    fn test_load_fails_fast_without_credentials() {
        Jail::expect_with(|_jail| {
            let err = AppConfig::load(None).unwrap_err();
            let message = err.to_string();
            assert!(message.contains("B2_KEY_ID"));
            assert!(message.contains("B2_BUCKET_NAME"));
            Ok(())
        });
    }
}
