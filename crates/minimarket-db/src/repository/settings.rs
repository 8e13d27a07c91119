//! # Settings Repository
//!
//! Key-value store for small JSON documents that have no table of their
//! own: company config, receipt counters, the parked cart and the sync
//! agent's bookkeeping.
//!
//! ```text
//! key                 value (JSON)
//! ────────────────    ─────────────────────────────────────────
//! company             CompanyConfig
//! receipt_counters    {"B001": 42}
//! cart                Cart
//! last_sync_at        "2026-03-02T12:00:04Z"
//! sync_quota          {"date": "2026-03-02", "writes": 1730}
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use minimarket_core::cart::Cart;
use minimarket_core::receipt::ReceiptCounters;
use minimarket_core::{entity, CompanyConfig};

use super::sync::queue_entity_in;
use super::{from_json, to_json};
use crate::error::DbResult;

/// Well-known setting keys.
pub mod keys {
    pub const COMPANY: &str = "company";
    pub const RECEIPT_COUNTERS: &str = "receipt_counters";
    pub const CART: &str = "cart";
    pub const LAST_SYNC_AT: &str = "last_sync_at";
    pub const SYNC_QUOTA: &str = "sync_quota";
}

/// Document writes spent against the cloud provider's daily quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncQuota {
    pub date: NaiveDate,
    pub writes: u64,
}

impl SyncQuota {
    /// Writes already used on `today`; a quota from another day counts as 0.
    pub fn used_on(&self, today: NaiveDate) -> u64 {
        if self.date == today {
            self.writes
        } else {
            0
        }
    }
}

pub(crate) async fn get_in<T: DeserializeOwned>(
    conn: &mut SqliteConnection,
    key: &str,
) -> DbResult<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?1")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;

    value.map(|v| from_json(key, &v)).transpose()
}

pub(crate) async fn set_in<T: Serialize + ?Sized>(
    conn: &mut SqliteConnection,
    key: &str,
    value: &T,
) -> DbResult<()> {
    let json = to_json(key, value)?;
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
        ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(json)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Repository for key-value settings.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        let mut conn = self.pool.acquire().await?;
        get_in(&mut conn, key).await
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> DbResult<()> {
        debug!(key = %key, "Writing setting");
        let mut conn = self.pool.acquire().await?;
        set_in(&mut conn, key, value).await
    }

    pub async fn delete(&self, key: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Company
    // -------------------------------------------------------------------------

    /// Stored company config, or the defaults when none was saved yet.
    pub async fn company_config(&self) -> DbResult<CompanyConfig> {
        Ok(self.get(keys::COMPANY).await?.unwrap_or_default())
    }

    /// Saves the company config and queues it for sync.
    pub async fn set_company_config(&self, config: &CompanyConfig) -> DbResult<()> {
        minimarket_core::receipt::validate_series(&config.receipt_series)?;

        let mut tx = self.pool.begin().await?;
        set_in(&mut tx, keys::COMPANY, config).await?;
        queue_entity_in(&mut tx, entity::SETTINGS, keys::COMPANY, config).await?;
        tx.commit().await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Receipt counters
    // -------------------------------------------------------------------------

    pub async fn receipt_counters(&self) -> DbResult<ReceiptCounters> {
        Ok(self.get(keys::RECEIPT_COUNTERS).await?.unwrap_or_default())
    }

    // -------------------------------------------------------------------------
    // Parked cart
    // -------------------------------------------------------------------------

    /// The cart saved by the terminal, if any.
    pub async fn saved_cart(&self) -> DbResult<Option<Cart>> {
        self.get(keys::CART).await
    }

    pub async fn save_cart(&self, cart: &Cart) -> DbResult<()> {
        if cart.is_empty() {
            return self.delete(keys::CART).await;
        }
        self.set(keys::CART, cart).await
    }

    // -------------------------------------------------------------------------
    // Sync bookkeeping
    // -------------------------------------------------------------------------

    pub async fn last_sync_at(&self) -> DbResult<Option<DateTime<Utc>>> {
        self.get(keys::LAST_SYNC_AT).await
    }

    pub async fn set_last_sync_at(&self, at: DateTime<Utc>) -> DbResult<()> {
        self.set(keys::LAST_SYNC_AT, &at).await
    }

    /// Quota usage for `today` (zero when the stored day is older).
    pub async fn sync_quota(&self, today: NaiveDate) -> DbResult<SyncQuota> {
        let stored: Option<SyncQuota> = self.get(keys::SYNC_QUOTA).await?;
        Ok(SyncQuota {
            date: today,
            writes: stored.map(|q| q.used_on(today)).unwrap_or(0),
        })
    }

    /// Adds `writes` to today's usage and returns the new total.
    pub async fn record_sync_writes(&self, today: NaiveDate, writes: u64) -> DbResult<SyncQuota> {
        let mut tx = self.pool.begin().await?;
        let stored: Option<SyncQuota> = get_in(&mut tx, keys::SYNC_QUOTA).await?;
        let quota = SyncQuota {
            date: today,
            writes: stored.map(|q| q.used_on(today)).unwrap_or(0) + writes,
        };
        set_in(&mut tx, keys::SYNC_QUOTA, &quota).await?;
        tx.commit().await?;
        Ok(quota)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_company_defaults_and_roundtrip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let settings = db.settings();

        let company = settings.company_config().await.unwrap();
        assert_eq!(company.receipt_series, "B001");

        let mut company = company;
        company.name = "Bodega Rosita".to_string();
        company.receipt_series = "B002".to_string();
        settings.set_company_config(&company).await.unwrap();
        assert_eq!(settings.company_config().await.unwrap().name, "Bodega Rosita");
        assert_eq!(db.sync_outbox().count_pending().await.unwrap(), 1);

        company.receipt_series = "not a series".to_string();
        assert!(settings.set_company_config(&company).await.is_err());
    }

    #[tokio::test]
    async fn test_quota_resets_daily() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let settings = db.settings();
        let monday = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let tuesday = monday.succ_opt().unwrap();

        settings.record_sync_writes(monday, 300).await.unwrap();
        let quota = settings.record_sync_writes(monday, 200).await.unwrap();
        assert_eq!(quota.writes, 500);
        assert_eq!(settings.sync_quota(monday).await.unwrap().writes, 500);
        assert_eq!(settings.sync_quota(tuesday).await.unwrap().writes, 0);

        let quota = settings.record_sync_writes(tuesday, 10).await.unwrap();
        assert_eq!(quota.writes, 10);
    }

    #[tokio::test]
    async fn test_empty_cart_clears_saved_cart() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let settings = db.settings();

        assert!(settings.saved_cart().await.unwrap().is_none());
        settings.save_cart(&Cart::new()).await.unwrap();
        assert!(settings.saved_cart().await.unwrap().is_none());
    }
}
