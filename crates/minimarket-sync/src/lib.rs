//! # minimarket-sync: Cloud Sync Engine for Minimarket POS
//!
//! Pushes the local sync outbox to a cloud document store. Local
//! operation never waits on this crate: checkout only queues outbox rows
//! (in `minimarket-db`) and fires a trigger.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Agent Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      SyncAgent (tokio task)                      │  │
//! │  │                                                                  │  │
//! │  │  DailySchedule: once a day after 12:00 (catches up on start)     │  │
//! │  │  SyncAgentHandle: trigger() after checkout, sync_now() from CLI  │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ OutboxProcessor│  │  batch::plan   │  │   DocumentStore        │    │
//! │  │                │─►│                │─►│                        │    │
//! │  │ Reads pending  │  │ Coalesces docs │  │ MemoryDocumentStore    │    │
//! │  │ sync_outbox    │  │ ≤ 500 per batch│  │ HttpDocumentStore      │    │
//! │  │ Retries with   │  │ Stops at daily │  │ (POST {endpoint}/batch)│    │
//! │  │ backoff        │  │ write quota    │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`agent`] - `SyncAgent`, its handle and event emitter
//! - [`batch`] - Outbox entries to bounded document batches
//! - [`config`] - Sync configuration (`sync.toml` + `MINIMARKET_*` env)
//! - [`error`] - Sync error types
//! - [`outbox`] - One sync run against the document store
//! - [`schedule`] - Once-a-day schedule
//! - [`store`] - Document store trait and implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use minimarket_sync::{SyncAgentBuilder, SyncConfig};
//!
//! let config = SyncConfig::load(None)?;
//! let handle = SyncAgentBuilder::new(config)
//!     .with_database(db.clone())
//!     .build()?
//!     .spawn();
//!
//! // after each checkout
//! handle.trigger();
//!
//! let status = handle.status().await;
//! println!("Pending: {}", status.pending_count);
//! ```

pub mod agent;
pub mod batch;
pub mod config;
pub mod error;
pub mod outbox;
pub mod schedule;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{
    store_for, NoOpEmitter, SyncAgent, SyncAgentBuilder, SyncAgentHandle, SyncEventEmitter,
    SyncStatus,
};
pub use batch::{Batch, SyncPlan};
pub use config::{SyncConfig, SyncMode, SyncSettings, MAX_OPS_PER_BATCH};
pub use error::{SyncError, SyncResult};
pub use outbox::{OutboxProcessor, SyncReport};
pub use schedule::DailySchedule;
pub use store::{DocumentStore, DocumentWrite, HttpDocumentStore, MemoryDocumentStore};
