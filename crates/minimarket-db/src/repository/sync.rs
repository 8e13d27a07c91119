//! # Sync Outbox
//!
//! Every write that must reach the cloud queues a full JSON snapshot of the
//! entity in the same transaction as the write itself, so a committed sale
//! always has its outbox row and a rolled-back one never does.
//!
//! ```text
//!  record_checkout ─┐
//!  restock / count ─┼─► sync_outbox (pending) ──► minimarket-sync agent
//!  product / config ┘        ▲                         │
//!                            └── mark_failed(error) ◄──┤
//!                                mark_synced(ids)   ◄──┘
//! ```
//!
//! Synced rows stay until [`SyncOutboxRepository::cleanup_synced_before`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use super::to_json;
use crate::error::DbResult;
use minimarket_core::SyncOutboxEntry;

#[derive(Debug, FromRow)]
struct OutboxRow {
    id: String,
    entity_type: String,
    entity_id: String,
    payload: String,
    attempts: i64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    attempted_at: Option<DateTime<Utc>>,
    synced_at: Option<DateTime<Utc>>,
}

impl From<OutboxRow> for SyncOutboxEntry {
    fn from(row: OutboxRow) -> Self {
        SyncOutboxEntry {
            id: row.id,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            payload: row.payload,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
            attempted_at: row.attempted_at,
            synced_at: row.synced_at,
        }
    }
}

/// Queues an entity snapshot on an existing connection (inside the caller's
/// transaction).
pub(crate) async fn queue_in(
    conn: &mut SqliteConnection,
    entity_type: &str,
    entity_id: &str,
    payload: &str,
) -> DbResult<SyncOutboxEntry> {
    let entry = SyncOutboxEntry {
        id: Uuid::new_v4().to_string(),
        entity_type: entity_type.to_string(),
        entity_id: entity_id.to_string(),
        payload: payload.to_string(),
        attempts: 0,
        last_error: None,
        created_at: Utc::now(),
        attempted_at: None,
        synced_at: None,
    };

    sqlx::query(
        r#"
        INSERT INTO sync_outbox (
            id, entity_type, entity_id, payload,
            attempts, last_error, created_at, attempted_at, synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.entity_type)
    .bind(&entry.entity_id)
    .bind(&entry.payload)
    .bind(entry.attempts)
    .bind(&entry.last_error)
    .bind(entry.created_at)
    .bind(entry.attempted_at)
    .bind(entry.synced_at)
    .execute(&mut *conn)
    .await?;

    Ok(entry)
}

/// Serializes `value` and queues it.
pub(crate) async fn queue_entity_in<T: Serialize + ?Sized>(
    conn: &mut SqliteConnection,
    entity_type: &str,
    entity_id: &str,
    value: &T,
) -> DbResult<()> {
    let payload = to_json("sync payload", value)?;
    queue_in(conn, entity_type, entity_id, &payload).await?;
    Ok(())
}

/// Repository for sync outbox operations.
#[derive(Debug, Clone)]
pub struct SyncOutboxRepository {
    pool: SqlitePool,
}

impl SyncOutboxRepository {
    /// Creates a new SyncOutboxRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncOutboxRepository { pool }
    }

    /// Queues an entity for synchronization outside any other write.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let payload = serde_json::to_string(&company)?;
    /// repo.queue_for_sync("SETTINGS", "company", &payload).await?;
    /// ```
    pub async fn queue_for_sync(
        &self,
        entity_type: &str,
        entity_id: &str,
        payload: &str,
    ) -> DbResult<SyncOutboxEntry> {
        debug!(
            entity_type = %entity_type,
            entity_id = %entity_id,
            "Queuing for sync"
        );

        let mut conn = self.pool.acquire().await?;
        queue_in(&mut conn, entity_type, entity_id, payload).await
    }

    /// Gets pending entries, oldest first.
    pub async fn get_pending(&self, limit: u32) -> DbResult<Vec<SyncOutboxEntry>> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT
                id, entity_type, entity_id, payload,
                attempts, last_error, created_at, attempted_at, synced_at
            FROM sync_outbox
            WHERE synced_at IS NULL
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SyncOutboxEntry::from).collect())
    }

    /// Marks a committed batch as synced, in one transaction.
    pub async fn mark_synced(&self, ids: &[String]) -> DbResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for id in ids {
            sqlx::query(
                "UPDATE sync_outbox SET synced_at = ?2, attempted_at = ?2, last_error = NULL WHERE id = ?1",
            )
            .bind(id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Records a failed attempt on every entry of a batch.
    pub async fn mark_failed(&self, ids: &[String], error: &str) -> DbResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for id in ids {
            sqlx::query(
                r#"
                UPDATE sync_outbox SET
                    attempts = attempts + 1,
                    last_error = ?2,
                    attempted_at = ?3
                WHERE id = ?1
                "#,
            )
            .bind(id)
            .bind(error)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Counts pending sync entries.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sync_outbox WHERE synced_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Deletes entries synced before `cutoff`. Returns the number deleted.
    pub async fn cleanup_synced_before(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            "DELETE FROM sync_outbox WHERE synced_at IS NOT NULL AND synced_at < ?1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_pending_lifecycle() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let outbox = db.sync_outbox();

        let a = outbox.queue_for_sync("SALE", "s1", "{}").await.unwrap();
        let b = outbox.queue_for_sync("SALE", "s2", "{}").await.unwrap();
        outbox.queue_for_sync("SALE", "s3", "{}").await.unwrap();

        let pending = outbox.get_pending(2).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].entity_id, "s1");

        outbox.mark_failed(&[b.id.clone()], "offline").await.unwrap();
        outbox.mark_synced(&[a.id.clone()]).await.unwrap();
        assert_eq!(outbox.count_pending().await.unwrap(), 2);

        let pending = outbox.get_pending(10).await.unwrap();
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("offline"));

        let removed = outbox
            .cleanup_synced_before(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }
}
