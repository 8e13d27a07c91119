//! # Inventory Repository
//!
//! Restocks, physical counts and the movement audit trail.
//!
//! ## Audited Mutation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   SINGLE TRANSACTION per stock change                   │
//! │                                                                         │
//! │  1. SELECT product                 (fresh, inside the tx)               │
//! │  2. minimarket_core::stock::*      (pure rule: restock / set_counted)   │
//! │  3. UPDATE products SET stock, boxes, loose_units                       │
//! │  4. INSERT inventory_movements     delta = after - before (CHECKed)     │
//! │  5. INSERT sync_outbox             PRODUCT + MOVEMENT                   │
//! │                                                                         │
//! │  COMMIT ← the stock row never changes without its movement             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use minimarket_core::reconciliation::{
    reconcile_line, summarize, CountEntry, ReconciliationLine, ReconciliationSummary,
};
use minimarket_core::stock::{self, Restock, StockChange};
use minimarket_core::{entity, CoreError, InventoryMovement, MovementKind, Product};

use super::product;
use super::sync::queue_entity_in;
use crate::error::{DbError, DbResult};

// =============================================================================
// Connection-level helpers
// =============================================================================

/// Builds the audit record for a stock change of `product`.
pub(crate) fn movement_for(
    product: &Product,
    kind: MovementKind,
    change: &StockChange,
    reason: impl Into<String>,
    reference: Option<&str>,
    actor: &str,
) -> InventoryMovement {
    InventoryMovement {
        id: Uuid::new_v4().to_string(),
        product_id: product.id.clone(),
        kind,
        quantity_before: change.before.stock,
        quantity_after: change.after.stock,
        delta: change.delta(),
        boxes_after: change.after.boxes,
        loose_units_after: change.after.loose_units,
        reason: reason.into(),
        reference: reference.map(str::to_string),
        actor: actor.to_string(),
        created_at: Utc::now(),
    }
}

pub(crate) async fn insert_movement(
    conn: &mut SqliteConnection,
    movement: &InventoryMovement,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO inventory_movements (
            id, product_id, kind,
            quantity_before, quantity_after, delta,
            boxes_after, loose_units_after,
            reason, reference, actor, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.product_id)
    .bind(movement.kind)
    .bind(movement.quantity_before)
    .bind(movement.quantity_after)
    .bind(movement.delta)
    .bind(movement.boxes_after)
    .bind(movement.loose_units_after)
    .bind(&movement.reason)
    .bind(&movement.reference)
    .bind(&movement.actor)
    .bind(movement.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Writes the product's new stock plus its movement, and queues both.
pub(crate) async fn apply_change(
    conn: &mut SqliteConnection,
    product: &mut Product,
    movement: &InventoryMovement,
) -> DbResult<()> {
    product::write_stock(conn, product).await?;
    insert_movement(conn, movement).await?;
    queue_entity_in(conn, entity::MOVEMENT, &movement.id, movement).await?;
    queue_entity_in(conn, entity::PRODUCT, &product.id, &*product).await?;
    Ok(())
}

const MOVEMENT_COLUMNS: &str = r#"
    id, product_id, kind, quantity_before, quantity_after, delta,
    boxes_after, loose_units_after, reason, reference, actor, created_at
"#;

#[derive(Debug, FromRow)]
struct MovementRow {
    id: String,
    product_id: String,
    kind: MovementKind,
    quantity_before: i64,
    quantity_after: i64,
    delta: i64,
    boxes_after: Option<i64>,
    loose_units_after: Option<i64>,
    reason: String,
    reference: Option<String>,
    actor: String,
    created_at: DateTime<Utc>,
}

impl From<MovementRow> for InventoryMovement {
    fn from(row: MovementRow) -> Self {
        InventoryMovement {
            id: row.id,
            product_id: row.product_id,
            kind: row.kind,
            quantity_before: row.quantity_before,
            quantity_after: row.quantity_after,
            delta: row.delta,
            boxes_after: row.boxes_after,
            loose_units_after: row.loose_units_after,
            reason: row.reason,
            reference: row.reference,
            actor: row.actor,
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// Count Sessions
// =============================================================================

/// A physical count submitted by one person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountSession {
    /// Stored as the `reference` of every adjustment movement.
    pub id: String,
    pub actor: String,
    pub entries: Vec<CountEntry>,
}

impl CountSession {
    pub fn new(actor: &str, entries: Vec<CountEntry>) -> Self {
        CountSession {
            id: format!("count-{}", Uuid::new_v4()),
            actor: actor.to_string(),
            entries,
        }
    }
}

/// Result of applying a count session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountOutcome {
    pub session_id: String,
    pub lines: Vec<ReconciliationLine>,
    pub summary: ReconciliationSummary,
    /// Movements written, one per line with a difference.
    pub movements: Vec<InventoryMovement>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for restocks, counts and movement history.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Adds received goods and records a `restock` movement.
    pub async fn restock(
        &self,
        product_id: &str,
        received: Restock,
        reason: Option<&str>,
        actor: &str,
    ) -> DbResult<(Product, InventoryMovement)> {
        let mut tx = self.pool.begin().await?;

        let mut product = product::fetch(&mut tx, product_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        let change = stock::restock(&mut product, received)?;
        let movement = movement_for(
            &product,
            MovementKind::Restock,
            &change,
            reason.unwrap_or("restock"),
            None,
            actor,
        );
        apply_change(&mut tx, &mut product, &movement).await?;
        tx.commit().await?;

        info!(
            product = %product.name,
            boxes = received.boxes,
            units = received.units,
            stock = product.stock,
            "Restocked"
        );
        Ok((product, movement))
    }

    /// Applies a physical count.
    ///
    /// Every entry is reconciled against the stock read inside the
    /// transaction. Lines with a difference get an `adjustment` movement
    /// whose delta equals `counted - system`; an invalid entry (unknown
    /// product, surplus reason on a shortage) aborts the whole session.
    pub async fn apply_count(&self, session: &CountSession) -> DbResult<CountOutcome> {
        debug!(session = %session.id, entries = session.entries.len(), "Applying count");

        let mut tx = self.pool.begin().await?;
        let mut lines = Vec::with_capacity(session.entries.len());
        let mut movements = Vec::new();

        for entry in &session.entries {
            let mut product = product::fetch(&mut tx, &entry.product_id)
                .await?
                .ok_or_else(|| CoreError::ProductNotFound(entry.product_id.clone()))?;

            let line = reconcile_line(&product, entry)?;
            if line.has_discrepancy() {
                let change = stock::set_counted(&mut product, entry.counted)?;
                let movement = movement_for(
                    &product,
                    MovementKind::Adjustment,
                    &change,
                    line.movement_reason(),
                    Some(&session.id),
                    &session.actor,
                );
                debug_assert_eq!(movement.delta, line.difference);
                apply_change(&mut tx, &mut product, &movement).await?;
                movements.push(movement);
            }
            lines.push(line);
        }

        tx.commit().await?;

        let summary = summarize(&lines);
        if summary.lines_with_discrepancy > 0 {
            warn!(
                session = %session.id,
                short = summary.units_short,
                over = summary.units_over,
                net_value_cents = summary.net_value_cents(),
                "Count found discrepancies"
            );
        } else {
            info!(session = %session.id, lines = summary.lines_counted, "Count matched stock");
        }

        Ok(CountOutcome {
            session_id: session.id.clone(),
            lines,
            summary,
            movements,
        })
    }

    /// Most recent movements of one product, newest first.
    pub async fn movements_for_product(
        &self,
        product_id: &str,
        limit: u32,
    ) -> DbResult<Vec<InventoryMovement>> {
        let sql = format!(
            "SELECT {} FROM inventory_movements WHERE product_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            MOVEMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(product_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(InventoryMovement::from).collect())
    }

    /// Movements written for one sale or count session.
    pub async fn movements_by_reference(&self, reference: &str) -> DbResult<Vec<InventoryMovement>> {
        let sql = format!(
            "SELECT {} FROM inventory_movements WHERE reference = ?1 ORDER BY created_at, rowid",
            MOVEMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(reference)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(InventoryMovement::from).collect())
    }

    /// Every movement, oldest first (backup export).
    pub async fn list_all(&self) -> DbResult<Vec<InventoryMovement>> {
        let sql = format!(
            "SELECT {} FROM inventory_movements ORDER BY created_at, rowid",
            MOVEMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, MovementRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(InventoryMovement::from).collect())
    }

    /// Sum of movement deltas for a product; equals its stock when every
    /// change has been audited since creation.
    pub async fn net_delta(&self, product_id: &str) -> DbResult<i64> {
        let total: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(delta) FROM inventory_movements WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total.unwrap_or(0))
    }
}

pub(crate) async fn insert_movement_row(
    conn: &mut SqliteConnection,
    movement: &InventoryMovement,
) -> DbResult<()> {
    if movement.delta != movement.quantity_after - movement.quantity_before {
        return Err(DbError::corrupt(
            "inventory movement",
            format!("{} delta does not match before/after", movement.id),
        ));
    }
    insert_movement(conn, movement).await
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::product::tests::{cigarettes, product};
    use crate::{Database, DbConfig};
    use minimarket_core::reconciliation::DiscrepancyReason;
    use minimarket_core::stock::CountedQuantity;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_restock_boxes_and_units() {
        let db = db().await;
        let p = db.products().insert(&cigarettes("100"), "admin").await.unwrap();

        let (after, movement) = db
            .inventory()
            .restock(&p.id, Restock { boxes: 3, units: 4 }, None, "ana")
            .await
            .unwrap();

        let closed = after.closed.unwrap();
        assert_eq!((closed.boxes, closed.loose_units), (5, 10));
        assert_eq!(after.stock, 110);
        assert_eq!(movement.delta, 64);
        assert_eq!(movement.kind, MovementKind::Restock);
        assert_eq!(movement.boxes_after, Some(5));

        let stored = db.products().get_by_id(&p.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 110);
        assert_eq!(db.inventory().net_delta(&p.id).await.unwrap(), 110);
    }

    #[tokio::test]
    async fn test_plain_product_rejects_boxes() {
        let db = db().await;
        let p = db.products().insert(&product("Agua", "200", 5), "admin").await.unwrap();
        let err = db
            .inventory()
            .restock(&p.id, Restock { boxes: 1, units: 0 }, None, "ana")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Rule(CoreError::NotClosedProduct(_))));
    }

    #[tokio::test]
    async fn test_count_session_adjusts_with_signed_delta() {
        let db = db().await;
        let agua = db.products().insert(&product("Agua", "300", 20), "admin").await.unwrap();
        let cig = db.products().insert(&cigarettes("301"), "admin").await.unwrap();
        let jugo = db.products().insert(&product("Jugo", "302", 7), "admin").await.unwrap();

        let session = CountSession::new(
            "maria",
            vec![
                CountEntry {
                    product_id: agua.id.clone(),
                    counted: CountedQuantity::Units { units: 17 },
                    reason: Some(DiscrepancyReason::Theft),
                    note: None,
                },
                CountEntry {
                    product_id: cig.id.clone(),
                    counted: CountedQuantity::Boxes { boxes: 2, loose_units: 9 },
                    reason: None,
                    note: Some("found behind counter".to_string()),
                },
                CountEntry {
                    product_id: jugo.id.clone(),
                    counted: CountedQuantity::Units { units: 7 },
                    reason: None,
                    note: None,
                },
            ],
        );

        let outcome = db.inventory().apply_count(&session).await.unwrap();
        assert_eq!(outcome.summary.lines_counted, 3);
        assert_eq!(outcome.summary.lines_with_discrepancy, 2);
        assert_eq!(outcome.summary.units_short, 3);
        assert_eq!(outcome.summary.units_over, 3);
        assert_eq!(outcome.movements.len(), 2);

        for line in outcome.lines.iter().filter(|l| l.has_discrepancy()) {
            let movement = outcome
                .movements
                .iter()
                .find(|m| m.product_id == line.product_id)
                .unwrap();
            assert_eq!(movement.delta, line.difference);
        }

        let stored = db.products().get_by_id(&cig.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 49);
        assert_eq!(stored.closed.unwrap().loose_units, 9);

        let by_session = db.inventory().movements_by_reference(&session.id).await.unwrap();
        assert_eq!(by_session.len(), 2);
        assert!(by_session.iter().any(|m| m.reason.contains("theft")));
    }

    #[tokio::test]
    async fn test_invalid_entry_rolls_back_session() {
        let db = db().await;
        let agua = db.products().insert(&product("Agua", "400", 20), "admin").await.unwrap();
        let jugo = db.products().insert(&product("Jugo", "401", 10), "admin").await.unwrap();

        let session = CountSession::new(
            "maria",
            vec![
                CountEntry {
                    product_id: agua.id.clone(),
                    counted: CountedQuantity::Units { units: 15 },
                    reason: None,
                    note: None,
                },
                CountEntry {
                    product_id: jugo.id.clone(),
                    counted: CountedQuantity::Units { units: 8 },
                    reason: Some(DiscrepancyReason::Surplus),
                    note: None,
                },
            ],
        );

        assert!(db.inventory().apply_count(&session).await.is_err());
        let agua = db.products().get_by_id(&agua.id).await.unwrap().unwrap();
        assert_eq!(agua.stock, 20);
    }
}
