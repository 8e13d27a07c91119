//! # Configuration State
//!
//! Terminal settings loaded at startup from `terminal.toml`.
//!
//! ## Configuration Sources (Priority Order)
//! 1. Environment variables (`MINIMARKET_*`)
//! 2. Config file (`terminal.toml` in the platform config dir)
//! 3. Defaults (this file)
//!
//! Store identity (name, address, series used at checkout) lives in the
//! company config in the settings table; `store_name` and `receipt_series`
//! here only seed it on a fresh database.
//!
//! ```toml
//! # terminal.toml
//! database_path = "/var/lib/minimarket/minimarket.db"
//! paper_width = "mm58"
//! store_name = "Bodega Rosita"
//! receipt_series = "B001"
//! expiry_warning_days = 15
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use minimarket_core::receipt::{validate_series, PaperWidth};
use minimarket_core::DEFAULT_RECEIPT_SERIES;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ApiError;

/// Terminal configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// SQLite file. Defaults to the platform data dir.
    pub database_path: Option<PathBuf>,

    pub paper_width: PaperWidth,

    /// Company name used until one is configured.
    pub store_name: String,

    /// Series used until the company config sets one.
    pub receipt_series: String,

    /// Products expiring within this many days show up in reports.
    pub expiry_warning_days: i64,

    /// Rows in the "top products" section of reports.
    pub report_top_n: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        TerminalConfig {
            database_path: None,
            paper_width: PaperWidth::default(),
            store_name: "Minimarket".to_string(),
            receipt_series: DEFAULT_RECEIPT_SERIES.to_string(),
            expiry_warning_days: 15,
            report_top_n: 10,
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "minimarket", "pos")
}

impl TerminalConfig {
    /// Loads file, then environment overrides, then validates.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let path = config_path.or_else(Self::default_config_path);

        let mut config = match path {
            Some(ref p) if p.exists() => {
                debug!(path = ?p, "Loading terminal config");
                let contents = std::fs::read_to_string(p).map_err(|e| {
                    ApiError::validation(format!("Cannot read {}: {}", p.display(), e))
                })?;
                toml::from_str(&contents).map_err(|e| {
                    ApiError::validation(format!("Invalid {}: {}", p.display(), e))
                })?
            }
            _ => {
                info!("No terminal config file, using defaults");
                TerminalConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ApiError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ApiError::internal(format!("Cannot create {}: {}", parent.display(), e)))?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ApiError::internal(format!("Cannot encode config: {}", e)))?;
        std::fs::write(path, contents)
            .map_err(|e| ApiError::internal(format!("Cannot write {}: {}", path.display(), e)))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        validate_series(&self.receipt_series)?;
        if self.store_name.trim().is_empty() {
            return Err(ApiError::validation("store_name must not be empty"));
        }
        if self.expiry_warning_days < 0 {
            return Err(ApiError::validation("expiry_warning_days must not be negative"));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("MINIMARKET_DB_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }

        if let Ok(width) = std::env::var("MINIMARKET_PAPER_WIDTH") {
            match width.parse() {
                Ok(parsed) => self.paper_width = parsed,
                Err(_) => warn!(width = %width, "Unknown paper width in environment"),
            }
        }

        if let Ok(series) = std::env::var("MINIMARKET_RECEIPT_SERIES") {
            self.receipt_series = series;
        }

        if let Ok(name) = std::env::var("MINIMARKET_STORE_NAME") {
            self.store_name = name;
        }
    }

    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("terminal.toml"))
    }

    /// Configured database path, or `minimarket.db` in the data dir.
    ///
    /// ## Platform-Specific Paths
    /// - **macOS**: `~/Library/Application Support/com.minimarket.pos/minimarket.db`
    /// - **Windows**: `%APPDATA%\minimarket\pos\data\minimarket.db`
    /// - **Linux**: `~/.local/share/pos/minimarket.db`
    pub fn database_path(&self) -> Result<PathBuf, ApiError> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }

        let dirs = project_dirs()
            .ok_or_else(|| ApiError::internal("Could not determine app data directory"))?;
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .map_err(|e| ApiError::internal(format!("Cannot create {}: {}", data_dir.display(), e)))?;
        Ok(data_dir.join("minimarket.db"))
    }
}

/// Read-only after startup.
#[derive(Debug, Clone, Default)]
pub struct ConfigState {
    config: TerminalConfig,
}

impl ConfigState {
    pub fn new(config: TerminalConfig) -> Self {
        ConfigState { config }
    }

    pub fn get(&self) -> &TerminalConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terminal.toml");

        let config = TerminalConfig {
            paper_width: PaperWidth::Mm58,
            store_name: "Bodega Rosita".into(),
            receipt_series: "F002".into(),
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = TerminalConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.paper_width, PaperWidth::Mm58);
        assert_eq!(loaded.receipt_series, "F002");
        assert_eq!(loaded.report_top_n, 10);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terminal.toml");
        std::fs::write(&path, "paper_width = \"mm80\"\n").unwrap();

        let loaded = TerminalConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.paper_width, PaperWidth::Mm80);
        assert_eq!(loaded.store_name, "Minimarket");
    }

    #[test]
    fn test_invalid_series_rejected() {
        let config = TerminalConfig {
            receipt_series: "no spaces allowed".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
