//! # Inventory Commands
//!
//! Every stock change outside checkout goes through here and leaves an
//! inventory movement behind.
//!
//! ## Physical Count Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Clerk counts shelf ──► preview_count (nothing written)                  │
//! │                              │                                          │
//! │                              ▼                                          │
//! │                  lines: system vs counted, reason, value                │
//! │                              │                                          │
//! │                  clerk fixes reasons (theft / spoilage / miscount)      │
//! │                              │                                          │
//! │                              ▼                                          │
//! │                        apply_count ──► one tx: stock + adjustment       │
//! │                                        movements (delta = difference)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiError;
use crate::state::{DbState, SessionState};
use minimarket_core::reconciliation::{
    reconcile_line, summarize, CountEntry, ReconciliationLine, ReconciliationSummary,
};
use minimarket_core::stock::Restock;
use minimarket_core::users::Permission;
use minimarket_core::{CoreError, InventoryMovement, Product};
use minimarket_db::{CountOutcome, CountSession};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestockResponse {
    pub product: Product,
    pub movement: InventoryMovement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountPreview {
    pub lines: Vec<ReconciliationLine>,
    pub summary: ReconciliationSummary,
}

/// Whether the movement log explains the current stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAudit {
    pub product_id: String,
    pub stock: i64,
    pub movement_total: i64,
    pub consistent: bool,
}

pub async fn restock(
    db: &DbState,
    session: &SessionState,
    product_id: String,
    received: Restock,
    reason: Option<String>,
) -> Result<RestockResponse, ApiError> {
    let user = session.require(Permission::AdjustInventory)?;
    debug!(product_id = %product_id, boxes = received.boxes, units = received.units, "restock command");

    let (product, movement) = db
        .inner()
        .inventory()
        .restock(&product_id, received, reason.as_deref(), &user.id)
        .await?;
    Ok(RestockResponse { product, movement })
}

/// Reconciles a count against the current stock without writing anything.
pub async fn preview_count(
    db: &DbState,
    session: &SessionState,
    entries: Vec<CountEntry>,
) -> Result<CountPreview, ApiError> {
    session.require(Permission::AdjustInventory)?;

    let products = db.inner().products();
    let mut lines = Vec::with_capacity(entries.len());
    for entry in &entries {
        let product = products
            .get_by_id(&entry.product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(entry.product_id.clone()))?;
        lines.push(reconcile_line(&product, entry)?);
    }

    let summary = summarize(&lines);
    Ok(CountPreview { lines, summary })
}

/// Applies a count; all entries or none.
pub async fn apply_count(
    db: &DbState,
    session: &SessionState,
    entries: Vec<CountEntry>,
) -> Result<CountOutcome, ApiError> {
    let user = session.require(Permission::AdjustInventory)?;
    if entries.is_empty() {
        return Err(ApiError::validation("A count needs at least one product"));
    }

    let count = CountSession::new(&user.id, entries);
    Ok(db.inner().inventory().apply_count(&count).await?)
}

pub async fn product_movements(
    db: &DbState,
    product_id: String,
    limit: Option<u32>,
) -> Result<Vec<InventoryMovement>, ApiError> {
    Ok(db
        .inner()
        .inventory()
        .movements_for_product(&product_id, limit.unwrap_or(50).min(500))
        .await?)
}

/// Movements of one sale or count session.
pub async fn movements_by_reference(
    db: &DbState,
    reference: String,
) -> Result<Vec<InventoryMovement>, ApiError> {
    Ok(db.inner().inventory().movements_by_reference(&reference).await?)
}

pub async fn audit_stock(db: &DbState, product_id: String) -> Result<StockAudit, ApiError> {
    let product = db
        .inner()
        .products()
        .get_by_id(&product_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product", &product_id))?;
    let movement_total = db.inner().inventory().net_delta(&product_id).await?;

    Ok(StockAudit {
        consistent: movement_total == product.stock,
        product_id,
        stock: product.stock,
        movement_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::testing::{seed_product, terminal};
    use minimarket_core::reconciliation::DiscrepancyReason;
    use minimarket_core::stock::CountedQuantity;
    use minimarket_core::users::Role;

    fn counted(product_id: &str, units: i64, reason: Option<DiscrepancyReason>) -> CountEntry {
        CountEntry {
            product_id: product_id.to_string(),
            counted: CountedQuantity::Units { units },
            reason,
            note: None,
        }
    }

    #[tokio::test]
    async fn test_restock_then_audit() {
        let t = terminal(Role::Manager).await;
        let product = seed_product(&t, "Leche Gloria", "7750001", 12).await;

        let response = restock(
            &t.db,
            &t.session,
            product.id.clone(),
            Restock { boxes: 0, units: 24 },
            Some("supplier delivery".into()),
        )
        .await
        .unwrap();
        assert_eq!(response.product.stock, 36);
        assert_eq!(response.movement.delta, 24);

        let audit = audit_stock(&t.db, product.id).await.unwrap();
        assert!(audit.consistent);
    }

    #[tokio::test]
    async fn test_preview_writes_nothing() {
        let t = terminal(Role::Manager).await;
        let product = seed_product(&t, "Leche Gloria", "7750001", 12).await;

        let preview = preview_count(
            &t.db,
            &t.session,
            vec![counted(&product.id, 9, Some(DiscrepancyReason::Theft))],
        )
        .await
        .unwrap();

        assert_eq!(preview.lines[0].difference, -3);
        assert_eq!(preview.summary.units_short, 3);
        let stored = t.db.inner().products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 12);
    }

    #[tokio::test]
    async fn test_apply_count_adjusts_stock_with_movement() {
        let t = terminal(Role::Manager).await;
        let product = seed_product(&t, "Leche Gloria", "7750001", 12).await;

        let outcome = apply_count(
            &t.db,
            &t.session,
            vec![counted(&product.id, 10, Some(DiscrepancyReason::Spoilage))],
        )
        .await
        .unwrap();

        assert_eq!(outcome.movements.len(), 1);
        assert_eq!(outcome.movements[0].delta, -2);

        let by_session = movements_by_reference(&t.db, outcome.session_id).await.unwrap();
        assert_eq!(by_session.len(), 1);
        assert!(audit_stock(&t.db, product.id).await.unwrap().consistent);
    }

    #[tokio::test]
    async fn test_surplus_reason_on_shortage_rejected() {
        let t = terminal(Role::Manager).await;
        let product = seed_product(&t, "Leche Gloria", "7750001", 12).await;

        let err = apply_count(
            &t.db,
            &t.session,
            vec![counted(&product.id, 10, Some(DiscrepancyReason::Surplus))],
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_cashier_cannot_restock() {
        let t = terminal(Role::Cashier).await;
        let err = restock(&t.db, &t.session, "p1".into(), Restock::default(), None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PermissionDenied);
    }
}
