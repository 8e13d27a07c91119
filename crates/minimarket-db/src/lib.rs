//! # minimarket-db: Database Layer for Minimarket POS
//!
//! This crate provides database access for the minimarket terminal.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Minimarket POS Data Flow                           │
//! │                                                                         │
//! │  Terminal command (checkout)                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  minimarket-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ product, sale │   │  (embedded)  │  │   │
//! │  │   │               │    │ inventory,    │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ user, settings│    │ 001_init.sql │  │   │
//! │  │   │               │    │ sync outbox   │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   <data dir>/minimarket/minimarket.db                           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//! - [`backup`] - Snapshot export and transactional restore
//!
//! ## Usage
//!
//! ```rust,ignore
//! use minimarket_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/minimarket.db")).await?;
//! let hits = db.products().search("inca", 20).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backup;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use backup::{export_snapshot, restore_snapshot, RestoreSummary};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::category::CategoryRepository;
pub use repository::inventory::{CountOutcome, CountSession, InventoryRepository};
pub use repository::product::ProductRepository;
pub use repository::sale::{CheckoutRequest, SaleRepository};
pub use repository::settings::{SettingsRepository, SyncQuota};
pub use repository::sync::SyncOutboxRepository;
pub use repository::user::{hash_password, verify_password, NewUser, UserRepository};
