//! # Minimarket Terminal Library
//!
//! The orchestration layer of a minimarket POS terminal: state plus
//! commands. A UI shell and the `minimarket` admin CLI both drive it.
//!
//! ## Module Organization
//! ```text
//! minimarket_terminal/
//! ├── lib.rs          ◄─── You are here (Terminal setup, tracing)
//! ├── state/
//! │   ├── db.rs       ◄─── Database state wrapper
//! │   ├── cart.rs     ◄─── Cart state (Arc<Mutex<Cart>>)
//! │   ├── config.rs   ◄─── terminal.toml
//! │   ├── session.rs  ◄─── Logged-in user + permission checks
//! │   └── sync.rs     ◄─── Sync agent handle
//! ├── commands/       ◄─── cart, sale, product, category, inventory,
//! │                        report, backup, user, import, sync, config
//! └── error.rs        ◄─── API error type for commands
//! ```
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. init_tracing()       RUST_LOG or "info,minimarket=debug,sqlx=warn"  │
//! │  2. TerminalConfig::load terminal.toml + MINIMARKET_* overrides         │
//! │  3. Terminal::open       SQLite (WAL) + migrations                      │
//! │  4. seed company config  first run only                                 │
//! │  5. restore saved cart                                                  │
//! │  6. start_sync           SyncConfig::load + SyncAgent::spawn            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod commands;
pub mod error;
pub mod state;

use minimarket_core::CompanyConfig;
use minimarket_db::repository::settings::keys;
use minimarket_db::{Database, DbConfig};
use minimarket_sync::SyncConfig;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use error::ApiError;
use state::{CartState, ConfigState, DbState, SessionState, SyncState, TerminalConfig};

/// Every piece of state a command may ask for.
pub struct Terminal {
    pub db: DbState,
    pub cart: CartState,
    pub config: ConfigState,
    pub session: SessionState,
    pub sync: SyncState,
}

impl Terminal {
    /// Opens (or creates) the configured database.
    pub async fn open(config: TerminalConfig) -> Result<Self, ApiError> {
        let path = config.database_path()?;
        info!(?path, "Database path determined");

        let db = Database::new(DbConfig::new(path)).await?;
        info!("Database connected and migrations applied");

        Self::with_database(db, config).await
    }

    /// Builds the state around an open database.
    pub async fn with_database(db: Database, config: TerminalConfig) -> Result<Self, ApiError> {
        let settings = db.settings();

        if settings.get::<CompanyConfig>(keys::COMPANY).await?.is_none() {
            let company = CompanyConfig {
                name: config.store_name.clone(),
                receipt_series: config.receipt_series.clone(),
                ..Default::default()
            };
            settings.set_company_config(&company).await?;
            info!(store = %company.name, series = %company.receipt_series, "Company config seeded");
        }

        let cart = match settings.saved_cart().await? {
            Some(saved) => {
                debug!(lines = saved.item_count(), "Restored saved cart");
                CartState::with(saved)
            }
            None => CartState::new(),
        };

        Ok(Terminal {
            db: DbState::new(db),
            cart,
            config: ConfigState::new(config),
            session: SessionState::new(),
            sync: SyncState::new(),
        })
    }

    /// Starts background sync for this terminal.
    pub fn start_sync(&self, sync_config: SyncConfig) -> Result<(), ApiError> {
        self.sync.start(sync_config, self.db.inner().clone())
    }

    pub async fn shutdown(&self) {
        self.sync.stop().await;
        self.db.inner().close().await;
        info!("Terminal shut down");
    }
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=minimarket_sync=trace` - Trace the sync engine only
/// - Default: `info,minimarket=debug,sqlx=warn`
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,minimarket=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_database_seeds_company_config() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let config = TerminalConfig {
            store_name: "Bodega Rosita".into(),
            receipt_series: "F001".into(),
            ..Default::default()
        };
        let terminal = Terminal::with_database(db, config).await.unwrap();

        let company = terminal.db.inner().settings().company_config().await.unwrap();
        assert_eq!(company.name, "Bodega Rosita");
        assert_eq!(company.receipt_series, "F001");
    }
}
