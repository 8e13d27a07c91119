//! # Sync State
//!
//! Owns the handle of the background sync agent.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync State Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      SyncState                                  │   │
//! │  │                                                                 │   │
//! │  │  ┌─────────────────┐  ┌─────────────────────────────────────┐  │   │
//! │  │  │ SyncAgentHandle │  │  SyncStatus (last emitted)          │  │   │
//! │  │  │                 │  │                                     │  │   │
//! │  │  │ trigger()       │  │  • pending_count                    │  │   │
//! │  │  │ sync_now()      │  │  • last_sync / last_error           │  │   │
//! │  │  │ shutdown()      │  │  • quota_used / daily_quota         │  │   │
//! │  │  └─────────────────┘  └─────────────────────────────────────┘  │   │
//! │  │                                                                 │   │
//! │  │  LogSyncEmitter: agent events → tracing + cached status        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{Arc, RwLock};

use minimarket_db::Database;
use minimarket_sync::{
    SyncAgentBuilder, SyncAgentHandle, SyncConfig, SyncEventEmitter, SyncReport, SyncStatus,
};
use tracing::{debug, error, info, warn};

use crate::error::ApiError;

/// Sync events go to the log; the last status is kept for `sync_status`.
#[derive(Clone, Default)]
pub struct LogSyncEmitter {
    last_status: Arc<RwLock<Option<SyncStatus>>>,
}

impl SyncEventEmitter for LogSyncEmitter {
    fn emit_status(&self, status: &SyncStatus) {
        if let Ok(mut s) = self.last_status.write() {
            *s = Some(status.clone());
        }
        debug!(pending = status.pending_count, quota_used = status.quota_used, "sync:status");
    }

    fn emit_progress(&self, pending: i64, synced: i64) {
        info!(pending, synced, "sync:progress");
    }

    fn emit_error(&self, message: &str, retryable: bool) {
        if retryable {
            warn!(message, retryable, "sync:error");
        } else {
            error!(message, retryable, "sync:error");
        }
    }
}

#[derive(Default)]
pub struct SyncState {
    handle: RwLock<Option<SyncAgentHandle>>,
    config: RwLock<Option<SyncConfig>>,
    emitter: LogSyncEmitter,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds and spawns the agent. Offline mode starts nothing.
    pub fn start(&self, config: SyncConfig, db: Database) -> Result<(), ApiError> {
        if !config.is_sync_enabled() {
            info!("Sync is disabled (mode: offline)");
            self.set_config(config);
            return Ok(());
        }

        let handle = SyncAgentBuilder::new(config.clone())
            .with_database(db)
            .with_emitter(Arc::new(self.emitter.clone()))
            .build()?
            .spawn();

        if let Ok(mut h) = self.handle.write() {
            *h = Some(handle);
        }
        self.set_config(config);
        Ok(())
    }

    fn set_config(&self, config: SyncConfig) {
        if let Ok(mut c) = self.config.write() {
            *c = Some(config);
        }
    }

    fn handle(&self) -> Option<SyncAgentHandle> {
        self.handle.read().ok().and_then(|h| h.clone())
    }

    pub fn config(&self) -> Option<SyncConfig> {
        self.config.read().ok().and_then(|c| c.clone())
    }

    pub fn is_running(&self) -> bool {
        self.handle().is_some()
    }

    /// Fire-and-forget request after a checkout.
    pub fn after_checkout(&self) {
        let enabled = self
            .config()
            .map(|c| c.sync.sync_after_checkout)
            .unwrap_or(false);
        if let (true, Some(handle)) = (enabled, self.handle()) {
            handle.trigger();
        }
    }

    /// Runs a sync and waits for the report.
    pub async fn sync_now(&self) -> Result<SyncReport, ApiError> {
        let handle = self
            .handle()
            .ok_or_else(|| ApiError::validation("Sync is not running (offline mode)"))?;
        Ok(handle.sync_now().await?)
    }

    pub async fn status(&self) -> Option<SyncStatus> {
        match self.handle() {
            Some(handle) => Some(handle.status().await),
            None => self.emitter.last_status.read().ok().and_then(|s| s.clone()),
        }
    }

    pub async fn stop(&self) {
        let handle = self.handle.write().ok().and_then(|mut h| h.take());
        if let Some(h) = handle {
            info!("Stopping sync agent...");
            h.shutdown().await;
        }
    }
}
