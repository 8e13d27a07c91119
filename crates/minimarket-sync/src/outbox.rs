//! # Outbox Processor
//!
//! Drains the sync_outbox table into the document store.
//!
//! ## Outbox Processing Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    One Sync Run                                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    sync_outbox Table                            │   │
//! │  │                                                                 │   │
//! │  │  id | entity_type | entity_id | payload | attempts | synced_at │   │
//! │  │  ───┼─────────────┼───────────┼─────────┼──────────┼───────────│   │
//! │  │  1  │ SALE        │ sale-001  │ {...}   │ 0        │ NULL      │   │
//! │  │  2  │ PRODUCT     │ prod-007  │ {...}   │ 1        │ NULL      │   │
//! │  │  3  │ MOVEMENT    │ mov-031   │ {...}   │ 0        │ NULL      │   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  1. Quota: writes left today = daily_write_quota - used                │
//! │  2. Read:  get_pending(...)  oldest first                              │
//! │  3. Skip:  entries that failed MAX_RETRY_ATTEMPTS times                │
//! │  4. Plan:  coalesce, chunk ≤ 500, stop at quota (batch.rs)             │
//! │  5. Commit each batch, retrying transient errors with backoff          │
//! │  6. Mark:  mark_synced(batch ids) + record quota usage                 │
//! │            or mark_failed(batch ids) and stop the run                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use minimarket_db::Database;

use crate::batch::{plan, Batch};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::store::DocumentStore;

// =============================================================================
// Constants
// =============================================================================

/// Entries that failed this many times are left for manual inspection.
pub const MAX_RETRY_ATTEMPTS: i64 = 10;

/// Upper bound on outbox entries read by one run.
const MAX_ENTRIES_PER_RUN: u32 = 50_000;

// =============================================================================
// Report
// =============================================================================

/// What one run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub batches: usize,
    pub documents_written: usize,
    /// Outbox entries acknowledged (several may share one document).
    pub entries_synced: usize,
    pub entries_invalid: usize,
    /// Entries over the retry limit.
    pub entries_skipped: usize,
    /// Entries left pending because today's quota ran out.
    pub entries_deferred: usize,
    /// Writes used today after this run.
    pub quota_used: u64,
    pub quota_exhausted: bool,
}

// =============================================================================
// Outbox Processor
// =============================================================================

/// Pushes pending outbox entries to a [`DocumentStore`].
#[derive(Clone)]
pub struct OutboxProcessor {
    db: Database,
    store: Arc<dyn DocumentStore>,
    config: Arc<SyncConfig>,
}

impl OutboxProcessor {
    pub fn new(db: Database, store: Arc<dyn DocumentStore>, config: Arc<SyncConfig>) -> Self {
        OutboxProcessor { db, store, config }
    }

    /// Runs one sync pass for the calendar day `today`.
    ///
    /// Batches committed before a failure stay synced; the failing batch
    /// is marked failed and the error returned.
    pub async fn run_once(&self, today: NaiveDate) -> SyncResult<SyncReport> {
        let quota_limit = self.config.sync.daily_write_quota;
        let used = self.db.settings().sync_quota(today).await?.writes;
        let remaining = quota_limit.saturating_sub(used);

        let mut report = SyncReport {
            quota_used: used,
            ..Default::default()
        };

        let entries = self.db.sync_outbox().get_pending(MAX_ENTRIES_PER_RUN).await?;
        if entries.is_empty() {
            debug!("No pending outbox entries");
            self.db.settings().set_last_sync_at(Utc::now()).await?;
            return Ok(report);
        }

        let (processable, skipped): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .partition(|e| e.attempts < MAX_RETRY_ATTEMPTS);
        for entry in &skipped {
            warn!(
                id = %entry.id,
                entity_type = %entry.entity_type,
                entity_id = %entry.entity_id,
                attempts = entry.attempts,
                "Skipping entry that exceeded max retry attempts"
            );
        }
        report.entries_skipped = skipped.len();

        let plan = plan(
            &processable,
            self.config.store_id(),
            self.config.sync.max_ops_per_batch,
            remaining,
        );

        for (id, err) in &plan.invalid {
            warn!(id = %id, error = %err, "Outbox entry cannot be synced");
            self.db
                .sync_outbox()
                .mark_failed(std::slice::from_ref(id), &err.to_string())
                .await?;
        }
        report.entries_invalid = plan.invalid.len();
        report.entries_deferred = plan.deferred;
        report.quota_exhausted = plan.deferred > 0;

        if report.quota_exhausted {
            warn!(
                quota = quota_limit,
                used,
                deferred = plan.deferred,
                "Daily write quota reached, deferring the rest"
            );
        }

        info!(
            store = self.store.name(),
            entries = processable.len(),
            documents = plan.total_writes(),
            batches = plan.batches.len(),
            "Starting sync run"
        );

        for batch in &plan.batches {
            let ids = batch.outbox_ids();
            match self.commit_with_retry(batch).await {
                Ok(()) => {
                    self.db.sync_outbox().mark_synced(&ids).await?;
                    let quota = self
                        .db
                        .settings()
                        .record_sync_writes(today, batch.len() as u64)
                        .await?;

                    report.batches += 1;
                    report.documents_written += batch.len();
                    report.entries_synced += ids.len();
                    report.quota_used = quota.writes;
                    debug!(documents = batch.len(), entries = ids.len(), "Batch committed");
                }
                Err(e) => {
                    error!(error = %e, documents = batch.len(), "Batch failed, stopping run");
                    self.db
                        .sync_outbox()
                        .mark_failed(&ids, &describe_failure(&e))
                        .await?;
                    return Err(e);
                }
            }
        }

        self.db.settings().set_last_sync_at(Utc::now()).await?;
        info!(
            documents = report.documents_written,
            entries = report.entries_synced,
            quota_used = report.quota_used,
            "Sync run finished"
        );
        Ok(report)
    }

    fn backoff_policy(&self) -> ExponentialBackoff {
        let sync = &self.config.sync;
        ExponentialBackoff {
            initial_interval: Duration::from_millis(sync.initial_backoff_ms),
            max_interval: Duration::from_secs(sync.max_backoff_secs),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(sync.max_retry_elapsed_secs)),
            ..Default::default()
        }
    }

    async fn commit_with_retry(&self, batch: &Batch) -> SyncResult<()> {
        let documents = batch.documents();
        backoff::future::retry(self.backoff_policy(), || async {
            self.store.commit(&documents).await.map_err(|e| {
                if e.is_retryable() {
                    warn!(error = %e, "Transient store error, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
    }
}

impl std::fmt::Debug for OutboxProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxProcessor")
            .field("store", &self.store.name())
            .field("store_id", &self.config.store_id())
            .finish()
    }
}

/// Maps a failed run to the message stored on outbox rows.
pub fn describe_failure(err: &SyncError) -> String {
    if err.is_retryable() {
        format!("{} (will retry)", err)
    } else {
        err.to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================
