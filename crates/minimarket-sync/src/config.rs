//! # Sync Configuration (`sync.toml`)
//!
//! Defaults, then the file from the platform config dir (or `--sync-config`),
//! then `MINIMARKET_*` environment variables. Every field is optional in the
//! file.
//!
//! ```toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Caja 1"
//!
//! [store]
//! id = "bodega-rosita"
//!
//! [sync]
//! mode = "cloud"                # cloud | offline
//! endpoint = "https://sync.example.com/v1"
//! max_ops_per_batch = 500       # provider limit per commit
//! daily_write_quota = 20000
//! scheduled_time = "12:00"      # local time of the daily run
//! ```
//!
//! | Variable                      | Field                  |
//! |-------------------------------|------------------------|
//! | `MINIMARKET_DEVICE_ID`        | `device.id`            |
//! | `MINIMARKET_DEVICE_NAME`      | `device.name`          |
//! | `MINIMARKET_STORE_ID`         | `store.id`             |
//! | `MINIMARKET_SYNC_MODE`        | `sync.mode`            |
//! | `MINIMARKET_SYNC_ENDPOINT`    | `sync.endpoint`        |
//! | `MINIMARKET_SYNC_API_KEY`     | `sync.api_key`         |
//! | `MINIMARKET_SYNC_DAILY_QUOTA` | `sync.daily_write_quota` |
//! | `MINIMARKET_SYNC_TIME`        | `sync.scheduled_time`  |

use std::path::PathBuf;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

/// Per-commit operation limit of the document store.
pub const MAX_OPS_PER_BATCH: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Cloud,
    /// Nothing is pushed; the outbox keeps growing until re-enabled.
    Offline,
}

impl SyncMode {
    pub fn is_sync_enabled(&self) -> bool {
        *self == SyncMode::Cloud
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Cloud => "cloud",
            SyncMode::Offline => "offline",
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cloud" | "online" => Ok(SyncMode::Cloud),
            "offline" | "disabled" => Ok(SyncMode::Offline),
            other => Err(SyncError::InvalidConfig(format!(
                "unknown sync mode '{}' (cloud, offline)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Generated on first run when the file has none.
    pub id: String,
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "POS Terminal".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

/// Every cloud document lives under `stores/{id}/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            id: "default-store".to_string(),
            name: "Default Store".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub mode: SyncMode,
    /// HTTP document store base URL. `None` keeps writes in memory.
    pub endpoint: Option<String>,
    /// Sent as a bearer token.
    pub api_key: Option<String>,
    pub max_ops_per_batch: usize,
    /// Document writes allowed per local calendar day.
    pub daily_write_quota: u64,
    /// "HH:MM", local time.
    pub scheduled_time: String,
    /// Scheduler clock check interval.
    pub poll_interval_secs: u64,
    pub sync_after_checkout: bool,
    pub request_timeout_secs: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_secs: u64,
    /// Give up retrying one batch after this long.
    pub max_retry_elapsed_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            mode: SyncMode::Cloud,
            endpoint: None,
            api_key: None,
            max_ops_per_batch: MAX_OPS_PER_BATCH,
            daily_write_quota: 20_000,
            scheduled_time: "12:00".to_string(),
            poll_interval_secs: 60,
            sync_after_checkout: true,
            request_timeout_secs: 30,
            initial_backoff_ms: 500,
            max_backoff_secs: 30,
            max_retry_elapsed_secs: 120,
        }
    }
}

/// Accepts "HH:MM" and "HH:MM:SS".
pub fn parse_scheduled_time(value: &str) -> SyncResult<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| {
            SyncError::InvalidConfig(format!(
                "scheduled_time must look like 12:00, got '{}'",
                value
            ))
        })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncSettings,
}

impl SyncConfig {
    /// File (if present), then environment, then [`SyncConfig::validate`].
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = match config_path.or_else(Self::default_config_path) {
            Some(path) if path.exists() => {
                info!(?path, "Loading sync config");
                toml::from_str(&std::fs::read_to_string(&path)?)?
            }
            path => {
                debug!(?path, "No sync config file, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("no config directory".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, toml::to_string_pretty(self)?)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(SyncError::MissingDeviceId);
        }
        if self.store.id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("store.id must not be empty".into()));
        }

        if let Some(endpoint) = &self.sync.endpoint {
            let url = url::Url::parse(endpoint)?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(SyncError::InvalidUrl(format!(
                    "endpoint must be http(s), got {}",
                    endpoint
                )));
            }
        }

        let s = &self.sync;
        if !(1..=MAX_OPS_PER_BATCH).contains(&s.max_ops_per_batch) {
            return Err(SyncError::InvalidConfig(format!(
                "max_ops_per_batch must be between 1 and {}",
                MAX_OPS_PER_BATCH
            )));
        }
        if s.daily_write_quota == 0 {
            return Err(SyncError::InvalidConfig("daily_write_quota must be > 0".into()));
        }
        if s.poll_interval_secs == 0 {
            return Err(SyncError::InvalidConfig("poll_interval_secs must be > 0".into()));
        }

        parse_scheduled_time(&s.scheduled_time)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        fn var(name: &str) -> Option<String> {
            let value = std::env::var(name).ok()?;
            debug!(variable = name, "Sync config override from environment");
            Some(value)
        }

        if let Some(id) = var("MINIMARKET_DEVICE_ID") {
            self.device.id = id;
        }
        if let Some(name) = var("MINIMARKET_DEVICE_NAME") {
            self.device.name = name;
        }
        if let Some(id) = var("MINIMARKET_STORE_ID") {
            self.store.id = id;
        }
        if let Some(mode) = var("MINIMARKET_SYNC_MODE") {
            match mode.parse() {
                Ok(mode) => self.sync.mode = mode,
                Err(e) => warn!(error = %e, "Ignoring MINIMARKET_SYNC_MODE"),
            }
        }
        if let Some(endpoint) = var("MINIMARKET_SYNC_ENDPOINT") {
            self.sync.endpoint = Some(endpoint);
        }
        if let Some(key) = var("MINIMARKET_SYNC_API_KEY") {
            self.sync.api_key = Some(key);
        }
        if let Some(quota) = var("MINIMARKET_SYNC_DAILY_QUOTA") {
            match quota.parse() {
                Ok(q) => self.sync.daily_write_quota = q,
                Err(_) => warn!(value = %quota, "Ignoring MINIMARKET_SYNC_DAILY_QUOTA"),
            }
        }
        if let Some(time) = var("MINIMARKET_SYNC_TIME") {
            self.sync.scheduled_time = time;
        }
    }

    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "minimarket", "pos")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    pub fn store_id(&self) -> &str {
        &self.store.id
    }

    pub fn mode(&self) -> SyncMode {
        self.sync.mode
    }

    pub fn is_sync_enabled(&self) -> bool {
        self.sync.mode.is_sync_enabled()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.sync.endpoint.as_deref()
    }

    /// Falls back to noon if the stored string does not parse.
    pub fn scheduled_time(&self) -> NaiveTime {
        parse_scheduled_time(&self.sync.scheduled_time)
            .ok()
            .or_else(|| NaiveTime::from_hms_opt(12, 0, 0))
            .unwrap_or(NaiveTime::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("cloud".parse::<SyncMode>().unwrap(), SyncMode::Cloud);
        assert_eq!(" OFFLINE ".parse::<SyncMode>().unwrap(), SyncMode::Offline);
        assert!("primary".parse::<SyncMode>().unwrap_err().is_config_error());
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncConfig::default();
        assert!(!config.device.id.is_empty());
        assert_eq!(config.sync.max_ops_per_batch, MAX_OPS_PER_BATCH);
        assert_eq!(config.sync.daily_write_quota, 20_000);
        assert_eq!(config.scheduled_time(), NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rules() {
        let mut config = SyncConfig::default();

        config.sync.max_ops_per_batch = MAX_OPS_PER_BATCH + 1;
        assert!(config.validate().is_err());
        config.sync.max_ops_per_batch = 100;
        assert!(config.validate().is_ok());

        config.sync.endpoint = Some("ftp://example.com".to_string());
        assert!(config.validate().unwrap_err().is_config_error());
        config.sync.endpoint = Some("https://sync.example.com/v1".to_string());
        assert!(config.validate().is_ok());

        config.sync.scheduled_time = "noon".to_string();
        assert!(config.validate().is_err());

        config.sync.scheduled_time = "12:30".to_string();
        config.device.id = "  ".to_string();
        assert!(matches!(config.validate(), Err(SyncError::MissingDeviceId)));
    }

    #[test]
    fn test_partial_file_keeps_defaults_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.toml");
        std::fs::write(
            &path,
            "[device]\nid = \"caja-1\"\n\n[sync]\nmode = \"offline\"\nscheduled_time = \"13:15\"\n",
        )
        .unwrap();

        let config = SyncConfig::load(Some(path.clone())).unwrap();
        assert_eq!(config.device_id(), "caja-1");
        assert!(!config.is_sync_enabled());
        assert_eq!(config.sync.max_ops_per_batch, MAX_OPS_PER_BATCH);
        assert!(config.sync.sync_after_checkout);
        assert_eq!(config.scheduled_time(), NaiveTime::from_hms_opt(13, 15, 0).unwrap());

        let copy = dir.path().join("nested").join("sync.toml");
        config.save(Some(copy.clone())).unwrap();
        let saved = std::fs::read_to_string(&copy).unwrap();
        assert!(saved.contains("[device]"));
        assert!(saved.contains("mode = \"offline\""));
    }
}
