//! # State Module
//!
//! Application state for the terminal, one focused type per concern.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    State Architecture                                   │
//! │                                                                         │
//! │  ┌──────────────┐ ┌──────────────┐ ┌──────────────┐ ┌──────────────┐   │
//! │  │   DbState    │ │  CartState   │ │ SessionState │ │  SyncState   │   │
//! │  │              │ │              │ │              │ │              │   │
//! │  │  Database    │ │  Arc<Mutex<  │ │  logged-in   │ │  agent       │   │
//! │  │  (SQLite     │ │    Cart      │ │  User        │ │  handle      │   │
//! │  │   pool)      │ │  >>          │ │              │ │              │   │
//! │  └──────────────┘ └──────────────┘ └──────────────┘ └──────────────┘   │
//! │                                                                         │
//! │  ConfigState: terminal.toml, read-only after startup                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod cart;
mod config;
mod db;
mod session;
mod sync;

pub use cart::CartState;
pub use config::{ConfigState, TerminalConfig};
pub use db::DbState;
pub use session::SessionState;
pub use sync::{LogSyncEmitter, SyncState};
