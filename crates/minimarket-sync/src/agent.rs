//! # Sync Agent
//!
//! Background task that pushes the outbox to the cloud once a day and
//! whenever the terminal asks for it.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent Architecture                           │
//! │                                                                         │
//! │   checkout ── handle.trigger() ──┐   (fire-and-forget, try_send)        │
//! │   CLI sync ── handle.sync_now() ─┤   (awaits the SyncReport)            │
//! │                                  ▼                                      │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                     SyncAgent::run (tokio task)                  │  │
//! │  │                                                                  │  │
//! │  │  select! {                                                       │  │
//! │  │    interval tick  ─► DailySchedule::is_due(now, last_run)?       │  │
//! │  │    command        ─► Trigger | SyncNow(reply) | Shutdown         │  │
//! │  │  }                                                               │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               ▼                                         │
//! │                  OutboxProcessor::run_once(today)                       │
//! │                               │                                         │
//! │                               ▼                                         │
//! │                  SyncEventEmitter (status / progress / error)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use minimarket_db::Database;

use crate::config::{SyncConfig, SyncMode};
use crate::error::{SyncError, SyncResult};
use crate::outbox::{OutboxProcessor, SyncReport};
use crate::schedule::DailySchedule;
use crate::store::{DocumentStore, HttpDocumentStore, MemoryDocumentStore};

/// Queued commands beyond this are dropped; one queued trigger is enough.
const COMMAND_BUFFER: usize = 8;

// =============================================================================
// Sync Status
// =============================================================================

/// Current sync status for external queries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    pub mode: SyncMode,

    /// Whether a run is in progress.
    pub is_syncing: bool,

    /// Number of pending outbox entries.
    pub pending_count: i64,

    pub last_sync: Option<DateTime<Utc>>,

    /// Last error message (cleared by the next successful run).
    pub last_error: Option<String>,

    /// Writes used today against `daily_quota`.
    pub quota_used: u64,
    pub daily_quota: u64,

    pub last_report: Option<SyncReport>,
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives sync events (a UI, a log sink, a test probe).
pub trait SyncEventEmitter: Send + Sync {
    fn emit_status(&self, status: &SyncStatus);

    /// Emitted after each run.
    fn emit_progress(&self, pending: i64, synced: i64);

    fn emit_error(&self, message: &str, retryable: bool);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &SyncStatus) {}
    fn emit_progress(&self, _pending: i64, _synced: i64) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}

// =============================================================================
// Sync Agent
// =============================================================================

enum AgentCommand {
    Trigger,
    SyncNow(oneshot::Sender<SyncResult<SyncReport>>),
    Shutdown,
}

/// Picks the document store for a config: HTTP when an endpoint is set,
/// otherwise an in-memory store.
pub fn store_for(config: &SyncConfig) -> SyncResult<Arc<dyn DocumentStore>> {
    match config.endpoint() {
        Some(_) => Ok(Arc::new(HttpDocumentStore::new(config)?)),
        None => {
            warn!("No sync endpoint configured, using in-memory document store");
            Ok(Arc::new(MemoryDocumentStore::new()))
        }
    }
}

/// Main sync agent.
pub struct SyncAgent {
    config: Arc<SyncConfig>,
    db: Database,
    processor: OutboxProcessor,
    schedule: DailySchedule,
    status: Arc<RwLock<SyncStatus>>,
    emitter: Arc<dyn SyncEventEmitter>,
}

impl SyncAgent {
    pub fn new(config: SyncConfig, db: Database, store: Arc<dyn DocumentStore>) -> Self {
        Self::with_emitter(config, db, store, Arc::new(NoOpEmitter))
    }

    pub fn with_emitter(
        config: SyncConfig,
        db: Database,
        store: Arc<dyn DocumentStore>,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        let status = SyncStatus {
            mode: config.sync.mode,
            daily_quota: config.sync.daily_write_quota,
            ..Default::default()
        };
        let schedule = DailySchedule::new(config.scheduled_time());
        let config = Arc::new(config);

        SyncAgent {
            processor: OutboxProcessor::new(db.clone(), store, config.clone()),
            config,
            db,
            schedule,
            status: Arc::new(RwLock::new(status)),
            emitter,
        }
    }

    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// Reloads pending count, last sync and quota from the database.
    pub async fn refresh_status(&self) -> SyncResult<SyncStatus> {
        let pending = self.db.sync_outbox().count_pending().await?;
        let last_sync = self.db.settings().last_sync_at().await?;
        let quota = self
            .db
            .settings()
            .sync_quota(Local::now().date_naive())
            .await?;

        let mut s = self.status.write().await;
        s.pending_count = pending;
        s.last_sync = last_sync;
        s.quota_used = quota.writes;
        Ok(s.clone())
    }

    /// Runs one sync pass now and updates the status.
    pub async fn sync_once(&self) -> SyncResult<SyncReport> {
        if !self.config.is_sync_enabled() {
            return Err(SyncError::InvalidConfig(
                "Sync is disabled (mode: offline)".into(),
            ));
        }

        self.status.write().await.is_syncing = true;
        let result = self.processor.run_once(Local::now().date_naive()).await;

        {
            let mut s = self.status.write().await;
            s.is_syncing = false;
            match &result {
                Ok(report) => {
                    s.last_error = None;
                    s.last_report = Some(report.clone());
                }
                Err(e) => s.last_error = Some(e.to_string()),
            }
        }

        let status = match self.refresh_status().await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Failed to refresh sync status");
                self.status().await
            }
        };

        match &result {
            Ok(report) => {
                self.emitter
                    .emit_progress(status.pending_count, report.entries_synced as i64);
                if report.quota_exhausted {
                    self.emitter
                        .emit_error("Daily write quota reached; remaining changes wait for tomorrow", false);
                }
            }
            Err(e) => {
                error!(error = %e, "Sync run failed");
                self.emitter.emit_error(&e.to_string(), e.is_retryable());
            }
        }
        self.emitter.emit_status(&status);

        result
    }

    /// Spawns the agent loop on the current tokio runtime.
    pub fn spawn(self) -> SyncAgentHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = SyncAgentHandle {
            tx,
            status: self.status.clone(),
        };

        info!(
            device_id = %self.config.device_id(),
            store_id = %self.config.store_id(),
            mode = %self.config.mode(),
            scheduled_time = %self.schedule.at(),
            "Starting sync agent"
        );

        tokio::spawn(self.run(rx));
        handle
    }

    async fn run(self, mut rx: mpsc::Receiver<AgentCommand>) {
        if let Err(e) = self.refresh_status().await {
            warn!(error = %e, "Failed to load sync status");
        }

        let last_sync = self.status.read().await.last_sync;
        let mut last_run = self
            .schedule
            .satisfied_day(last_sync.map(|t| t.with_timezone(&Local)));

        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.sync.poll_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.config.is_sync_enabled() {
                        continue;
                    }
                    let now = Local::now().naive_local();
                    if self.schedule.is_due(now, last_run) {
                        info!("Scheduled sync due");
                        last_run = Some(now.date());
                        let _ = self.sync_once().await;
                    }
                }

                cmd = rx.recv() => match cmd {
                    Some(AgentCommand::Trigger) => {
                        if self.config.is_sync_enabled() {
                            debug!("Sync triggered");
                            let _ = self.sync_once().await;
                        }
                    }
                    Some(AgentCommand::SyncNow(reply)) => {
                        let _ = reply.send(self.sync_once().await);
                    }
                    Some(AgentCommand::Shutdown) | None => {
                        info!("Sync agent received shutdown");
                        break;
                    }
                }
            }
        }

        info!("Sync agent stopped");
    }
}

// =============================================================================
// Agent Handle (for external control)
// =============================================================================

/// Handle for controlling a running [`SyncAgent`].
#[derive(Clone)]
pub struct SyncAgentHandle {
    tx: mpsc::Sender<AgentCommand>,
    status: Arc<RwLock<SyncStatus>>,
}

impl SyncAgentHandle {
    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// Asks for a sync without waiting. Returns false when the request was
    /// dropped because the agent is busy or gone.
    pub fn trigger(&self) -> bool {
        match self.tx.try_send(AgentCommand::Trigger) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Sync trigger dropped");
                false
            }
        }
    }

    /// Runs a sync and waits for its report.
    pub async fn sync_now(&self) -> SyncResult<SyncReport> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(AgentCommand::SyncNow(reply_tx))
            .await
            .map_err(|_| SyncError::ShuttingDown)?;
        reply_rx
            .await
            .map_err(|e| SyncError::ChannelError(e.to_string()))?
    }

    /// Signals the agent to shut down gracefully.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(AgentCommand::Shutdown).await;
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating SyncAgent with options.
pub struct SyncAgentBuilder {
    config: SyncConfig,
    db: Option<Database>,
    store: Option<Arc<dyn DocumentStore>>,
    emitter: Option<Arc<dyn SyncEventEmitter>>,
}

impl SyncAgentBuilder {
    pub fn new(config: SyncConfig) -> Self {
        SyncAgentBuilder {
            config,
            db: None,
            store: None,
            emitter: None,
        }
    }

    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    /// Overrides the store chosen by [`store_for`].
    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Validates the config and builds the agent.
    pub fn build(self) -> SyncResult<SyncAgent> {
        self.config.validate()?;

        let db = self
            .db
            .ok_or_else(|| SyncError::InvalidConfig("Database required".into()))?;

        let store = match self.store {
            Some(store) => store,
            None => store_for(&self.config)?,
        };
        let emitter = self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter));

        Ok(SyncAgent::with_emitter(self.config, db, store, emitter))
    }
}
