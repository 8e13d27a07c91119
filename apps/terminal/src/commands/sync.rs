//! # Sync Commands
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  get_sync_status ──► agent status (or pending count when offline)       │
//! │  sync_now        ──► waits for one outbox run, returns its report       │
//! │  cleanup_outbox  ──► deletes synced rows older than N days              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::{DbState, SessionState, SyncState};
use minimarket_core::users::Permission;
use minimarket_sync::{SyncMode, SyncReport, SyncStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse {
    pub running: bool,
    pub status: SyncStatus,
}

pub async fn get_sync_status(db: &DbState, sync: &SyncState) -> Result<SyncStatusResponse, ApiError> {
    debug!("get_sync_status command");

    if let Some(status) = sync.status().await {
        return Ok(SyncStatusResponse {
            running: sync.is_running(),
            status,
        });
    }

    // Agent not started: report what is waiting locally.
    let settings = db.inner().settings();
    let mut status = SyncStatus {
        pending_count: db.inner().sync_outbox().count_pending().await?,
        last_sync: settings.last_sync_at().await?,
        mode: SyncMode::Offline,
        ..Default::default()
    };
    if let Some(config) = sync.config() {
        status.mode = config.sync.mode;
        status.daily_quota = config.sync.daily_write_quota;
    }
    Ok(SyncStatusResponse {
        running: false,
        status,
    })
}

pub async fn sync_now(session: &SessionState, sync: &SyncState) -> Result<SyncReport, ApiError> {
    let user = session.require(Permission::ForceSync)?;
    info!(by = %user.username, "Manual sync requested");
    sync.sync_now().await
}

/// Removes synced outbox rows older than `days`.
pub async fn cleanup_outbox(
    db: &DbState,
    session: &SessionState,
    days: i64,
) -> Result<u64, ApiError> {
    session.require(Permission::ForceSync)?;
    if days < 1 {
        return Err(ApiError::validation("days must be at least 1"));
    }
    let cutoff = Utc::now() - Duration::days(days);
    Ok(db.inner().sync_outbox().cleanup_synced_before(cutoff).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::testing::{seed_product, terminal};
    use minimarket_core::users::Role;
    use minimarket_sync::SyncConfig;

    #[tokio::test]
    async fn test_offline_status_counts_outbox() {
        let t = terminal(Role::Manager).await;
        seed_product(&t, "Inca Kola 500ml", "7750182000123", 10).await;

        let response = get_sync_status(&t.db, &t.sync).await.unwrap();
        assert!(!response.running);
        assert_eq!(response.status.mode, SyncMode::Offline);
        assert!(response.status.pending_count >= 1);
    }

    #[tokio::test]
    async fn test_sync_now_offline_is_validation_error() {
        let t = terminal(Role::Manager).await;
        let err = sync_now(&t.session, &t.sync).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_sync_now_pushes_to_memory_store() {
        let t = terminal(Role::Manager).await;
        seed_product(&t, "Inca Kola 500ml", "7750182000123", 10).await;

        let mut config = SyncConfig::default();
        config.sync.mode = SyncMode::Cloud;
        config.sync.endpoint = None;
        t.start_sync(config).unwrap();

        // A catch-up scheduled run may have pushed first; either way the
        // outbox ends up empty.
        sync_now(&t.session, &t.sync).await.unwrap();
        assert_eq!(t.db.inner().sync_outbox().count_pending().await.unwrap(), 0);

        t.sync.stop().await;
    }
}
