//! # Backup Export and Restore
//!
//! Moves the whole terminal state in and out of a [`BackupSnapshot`].
//!
//! ## Restore
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  parse_backup(json) ── version check, v1 upgrade                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  snapshot.validate() ── duplicate ids/barcodes/receipts, balances       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │  DELETE sales, movements, products, categories, outbox, cart   │   │
//! │  │  DELETE users          (only when the snapshot carries users)  │   │
//! │  │  INSERT everything from the snapshot                           │   │
//! │  │  receipt counters = max(current, snapshot, highest restored)   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT, or nothing changed at all                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use minimarket_core::backup::{BackupSnapshot, BACKUP_FORMAT_VERSION};
use minimarket_core::receipt::{ReceiptCounters, ReceiptNumber};

use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::product::validate_product;
use crate::repository::settings::{get_in, keys, set_in};
use crate::repository::{category, inventory, product, sale, user};

/// What a restore wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreSummary {
    pub products: usize,
    pub categories: usize,
    pub sales: usize,
    pub movements: usize,
    pub users: usize,
    /// The snapshot had no users, so the existing ones were left in place.
    pub kept_existing_users: bool,
}

/// Reads the full terminal state.
pub async fn export_snapshot(db: &Database) -> DbResult<BackupSnapshot> {
    let snapshot = BackupSnapshot {
        format_version: BACKUP_FORMAT_VERSION,
        exported_at: Utc::now(),
        company: db.settings().company_config().await?,
        products: db.products().list(true).await?,
        categories: db.categories().list().await?,
        sales: db.sales().list_all().await?,
        movements: db.inventory().list_all().await?,
        users: db.users().list().await?,
        receipt_counters: db.settings().receipt_counters().await?,
    };

    info!(
        products = snapshot.products.len(),
        sales = snapshot.sales.len(),
        movements = snapshot.movements.len(),
        "Backup exported"
    );
    Ok(snapshot)
}

/// Replaces the terminal state with `snapshot`, atomically.
pub async fn restore_snapshot(db: &Database, snapshot: &BackupSnapshot) -> DbResult<RestoreSummary> {
    snapshot.validate()?;
    for p in &snapshot.products {
        validate_product(p)?;
    }

    let mut tx = db.pool().begin().await?;

    let keep_users = snapshot.users.is_empty();
    let mut tables = vec![
        "sale_payments",
        "sale_items",
        "sales",
        "inventory_movements",
        "products",
        "categories",
        "sync_outbox",
    ];
    if !keep_users {
        tables.push("users");
    }
    for table in tables {
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("DELETE FROM settings WHERE key = ?1")
        .bind(keys::CART)
        .execute(&mut *tx)
        .await?;

    for c in &snapshot.categories {
        category::insert_row(&mut tx, c).await?;
    }
    for p in &snapshot.products {
        product::insert_row(&mut tx, p).await?;
    }
    for m in &snapshot.movements {
        inventory::insert_movement_row(&mut tx, m).await?;
    }
    for s in &snapshot.sales {
        sale::insert_row(&mut tx, s).await?;
    }
    if !keep_users {
        for u in &snapshot.users {
            user::insert_row(&mut tx, u).await?;
        }
    }

    let current: ReceiptCounters = get_in(&mut tx, keys::RECEIPT_COUNTERS)
        .await?
        .unwrap_or_default();
    let mut counters = snapshot.receipt_counters.clone();
    for (series, last) in &current.0 {
        counters.observe(&ReceiptNumber {
            series: series.clone(),
            number: *last,
        });
    }
    for s in &snapshot.sales {
        match s.receipt_number.parse::<ReceiptNumber>() {
            Ok(receipt) => counters.observe(&receipt),
            Err(_) => warn!(receipt = %s.receipt_number, "Restored sale has a non-standard receipt number"),
        }
    }
    set_in(&mut tx, keys::RECEIPT_COUNTERS, &counters).await?;
    set_in(&mut tx, keys::COMPANY, &snapshot.company).await?;

    tx.commit().await?;

    let summary = RestoreSummary {
        products: snapshot.products.len(),
        categories: snapshot.categories.len(),
        sales: snapshot.sales.len(),
        movements: snapshot.movements.len(),
        users: if keep_users { 0 } else { snapshot.users.len() },
        kept_existing_users: keep_users,
    };
    info!(
        products = summary.products,
        sales = summary.sales,
        kept_existing_users = summary.kept_existing_users,
        "Backup restored"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::product::tests::{cigarettes, product};
    use crate::{DbConfig, DbError, NewUser};
    use minimarket_core::backup::parse_backup;
    use minimarket_core::cart::Cart;
    use minimarket_core::users::Role;
    use minimarket_core::{CoreError, PaymentEntry, PaymentMethod};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn seeded() -> Database {
        let db = db().await;
        db.users()
            .create(NewUser {
                username: "root".to_string(),
                display_name: "Root".to_string(),
                password: "123456".to_string(),
                role: Role::Admin,
                extra_permissions: Default::default(),
            })
            .await
            .unwrap();
        db.categories().upsert("Bebidas", &["Gaseosas".to_string()]).await.unwrap();
        let agua = db.products().insert(&product("Agua", "100", 10), "root").await.unwrap();
        db.products().insert(&cigarettes("101"), "root").await.unwrap();

        let mut cart = Cart::new();
        cart.add_item(&agua, 2, None, false).unwrap();
        let total = cart.total_cents();
        db.sales()
            .record_checkout(&crate::CheckoutRequest {
                cart,
                payments: vec![PaymentEntry::new(PaymentMethod::Cash, total)],
                cashier_id: "root".to_string(),
                series: None,
            })
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_export_restore_roundtrip() {
        let source = seeded().await;
        let snapshot = export_snapshot(&source).await.unwrap();
        assert_eq!(snapshot.products.len(), 2);
        assert_eq!(snapshot.sales.len(), 1);
        assert_eq!(snapshot.receipt_counters.last("B001"), 1);

        let json = snapshot.to_json_pretty().unwrap();
        let parsed = parse_backup(&json).unwrap();

        let target = db().await;
        let summary = restore_snapshot(&target, &parsed).await.unwrap();
        assert_eq!(summary.products, 2);
        assert!(!summary.kept_existing_users);

        let agua = target.products().get_by_barcode("100").await.unwrap().unwrap();
        assert_eq!(agua.stock, 8);
        assert_eq!(target.inventory().net_delta(&agua.id).await.unwrap(), 8);
        assert!(target.users().authenticate("root", "123456").await.is_ok());
        assert_eq!(target.sync_outbox().count_pending().await.unwrap(), 0);
        assert_eq!(target.settings().receipt_counters().await.unwrap().last("B001"), 1);
    }

    #[tokio::test]
    async fn test_restore_without_users_keeps_existing() {
        let source = seeded().await;
        let mut snapshot = export_snapshot(&source).await.unwrap();
        snapshot.users.clear();

        let target = db().await;
        target
            .users()
            .create(NewUser {
                username: "owner".to_string(),
                display_name: String::new(),
                password: "abcdef".to_string(),
                role: Role::Admin,
                extra_permissions: Default::default(),
            })
            .await
            .unwrap();

        let summary = restore_snapshot(&target, &snapshot).await.unwrap();
        assert!(summary.kept_existing_users);
        assert!(target.users().get_by_username("owner").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_counters_never_move_backwards() {
        let source = seeded().await;
        let mut snapshot = export_snapshot(&source).await.unwrap();
        snapshot.receipt_counters = ReceiptCounters::default();

        let target = db().await;
        target
            .settings()
            .set(keys::RECEIPT_COUNTERS, &serde_json::json!({ "B001": 40 }))
            .await
            .unwrap();

        restore_snapshot(&target, &snapshot).await.unwrap();
        assert_eq!(target.settings().receipt_counters().await.unwrap().last("B001"), 40);
    }

    #[tokio::test]
    async fn test_invalid_snapshot_leaves_state_untouched() {
        let source = seeded().await;
        let mut snapshot = export_snapshot(&source).await.unwrap();
        snapshot.sales[0].change_cents += 1;

        let target = seeded().await;
        let err = restore_snapshot(&target, &snapshot).await.unwrap_err();
        assert!(matches!(err, DbError::Rule(CoreError::InvalidBackup(_))));
        assert_eq!(target.sales().count().await.unwrap(), 1);
        assert_eq!(target.products().count().await.unwrap(), 2);
    }
}
