//! # Sale Repository
//!
//! Checkout, void, reprint and sale history.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. CHECKOUT (one transaction)                                         │
//! │     ├── settle payments        split, change from cash only            │
//! │     ├── re-validate cart       against stock read inside the tx        │
//! │     ├── next receipt number    settings.receipt_counters[series] + 1   │
//! │     ├── INSERT sales, sale_items, sale_payments                        │
//! │     ├── per line: decrement stock + `sale` movement                    │
//! │     └── outbox: SALE, PRODUCT, MOVEMENT                                │
//! │                                                                         │
//! │  2. (OPTIONAL) REPRINT                                                 │
//! │     └── record_reprint() → reprint_count + 1, outbox: SALE             │
//! │                                                                         │
//! │  3. (OPTIONAL) VOID                                                    │
//! │     └── void_sale() → units back to stock, `void_return` movements     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use minimarket_core::cart::Cart;
use minimarket_core::payment::settle;
use minimarket_core::receipt::{validate_series, ReceiptCounters};
use minimarket_core::stock;
use minimarket_core::{
    entity, CompanyConfig, CoreError, MovementKind, PaymentEntry, PaymentMethod, Product, Sale,
    SaleItem,
};

use super::inventory::{apply_change, movement_for};
use super::product;
use super::settings::{get_in, keys, set_in};
use super::sync::queue_entity_in;
use crate::error::{DbError, DbResult};

/// Everything needed to turn a cart into a sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub cart: Cart,
    pub payments: Vec<PaymentEntry>,
    pub cashier_id: String,
    /// Receipt series; `None` uses the company config's series.
    #[serde(default)]
    pub series: Option<String>,
}

// =============================================================================
// Rows
// =============================================================================

const SALE_COLUMNS: &str = r#"
    id, receipt_number, total_cents, change_cents, cashier_id,
    voided, voided_at, void_reason, reprint_count, created_at, sync_version
"#;

#[derive(Debug, FromRow)]
struct SaleRow {
    id: String,
    receipt_number: String,
    total_cents: i64,
    change_cents: i64,
    cashier_id: String,
    voided: bool,
    voided_at: Option<DateTime<Utc>>,
    void_reason: Option<String>,
    reprint_count: i64,
    created_at: DateTime<Utc>,
    sync_version: i64,
}

impl SaleRow {
    fn into_sale(self, items: Vec<SaleItem>, payments: Vec<PaymentEntry>) -> Sale {
        Sale {
            id: self.id,
            receipt_number: self.receipt_number,
            created_at: self.created_at,
            items,
            total_cents: self.total_cents,
            payments,
            change_cents: self.change_cents,
            cashier_id: self.cashier_id,
            voided: self.voided,
            voided_at: self.voided_at,
            void_reason: self.void_reason,
            reprint_count: self.reprint_count,
            sync_version: self.sync_version,
        }
    }
}

#[derive(Debug, FromRow)]
struct ItemRow {
    sale_id: String,
    product_id: String,
    name: String,
    category: String,
    subcategory: Option<String>,
    quantity: i64,
    sold_by_unit: bool,
    units: i64,
    unit_price_cents: i64,
    line_total_cents: i64,
}

impl From<ItemRow> for SaleItem {
    fn from(row: ItemRow) -> Self {
        SaleItem {
            product_id: row.product_id,
            name: row.name,
            category: row.category,
            subcategory: row.subcategory,
            quantity: row.quantity,
            sold_by_unit: row.sold_by_unit,
            units: row.units,
            unit_price_cents: row.unit_price_cents,
            line_total_cents: row.line_total_cents,
        }
    }
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    sale_id: String,
    method: PaymentMethod,
    amount_cents: i64,
}

// =============================================================================
// Connection-level helpers
// =============================================================================

/// Inserts a sale with its lines and payments. Used by checkout and restore.
pub(crate) async fn insert_row(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO sales (
            id, receipt_number, total_cents, change_cents, cashier_id,
            voided, voided_at, void_reason, reprint_count, created_at, sync_version
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.receipt_number)
    .bind(sale.total_cents)
    .bind(sale.change_cents)
    .bind(&sale.cashier_id)
    .bind(sale.voided)
    .bind(sale.voided_at)
    .bind(&sale.void_reason)
    .bind(sale.reprint_count)
    .bind(sale.created_at)
    .bind(sale.sync_version)
    .execute(&mut *conn)
    .await;

    match result {
        Err(sqlx::Error::Database(e)) if e.message().contains("sales.receipt_number") => {
            return Err(DbError::duplicate("receipt_number", &sale.receipt_number));
        }
        other => {
            other?;
        }
    }

    for (line_no, item) in sale.items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO sale_items (
                sale_id, line_no, product_id, name, category, subcategory,
                quantity, sold_by_unit, units, unit_price_cents, line_total_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&sale.id)
        .bind(line_no as i64)
        .bind(&item.product_id)
        .bind(&item.name)
        .bind(&item.category)
        .bind(&item.subcategory)
        .bind(item.quantity)
        .bind(item.sold_by_unit)
        .bind(item.units)
        .bind(item.unit_price_cents)
        .bind(item.line_total_cents)
        .execute(&mut *conn)
        .await?;
    }

    for payment in &sale.payments {
        sqlx::query("INSERT INTO sale_payments (sale_id, method, amount_cents) VALUES (?1, ?2, ?3)")
            .bind(&sale.id)
            .bind(payment.method)
            .bind(payment.amount_cents)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Loads lines and payments for the sales selected by `filter`, a WHERE
/// clause over `sales` sharing the bind parameters `?1` and `?2`.
async fn hydrate(
    conn: &mut SqliteConnection,
    rows: Vec<SaleRow>,
    filter: &str,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> DbResult<Vec<Sale>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let items_sql = format!(
        r#"
        SELECT sale_id, product_id, name, category, subcategory,
               quantity, sold_by_unit, units, unit_price_cents, line_total_cents
        FROM sale_items
        WHERE sale_id IN (SELECT id FROM sales WHERE {})
        ORDER BY sale_id, line_no
        "#,
        filter
    );
    let item_rows = sqlx::query_as::<_, ItemRow>(&items_sql)
        .bind(from)
        .bind(to)
        .fetch_all(&mut *conn)
        .await?;

    let payments_sql = format!(
        r#"
        SELECT sale_id, method, amount_cents
        FROM sale_payments
        WHERE sale_id IN (SELECT id FROM sales WHERE {})
        "#,
        filter
    );
    let payment_rows = sqlx::query_as::<_, PaymentRow>(&payments_sql)
        .bind(from)
        .bind(to)
        .fetch_all(&mut *conn)
        .await?;

    let mut items: HashMap<String, Vec<SaleItem>> = HashMap::new();
    for row in item_rows {
        items.entry(row.sale_id.clone()).or_default().push(row.into());
    }

    let mut payments: HashMap<String, Vec<PaymentEntry>> = HashMap::new();
    for row in payment_rows {
        payments
            .entry(row.sale_id)
            .or_default()
            .push(PaymentEntry::new(row.method, row.amount_cents));
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let sale_items = items.remove(&row.id).unwrap_or_default();
            let mut sale_payments = payments.remove(&row.id).unwrap_or_default();
            sale_payments.sort_by_key(|p| p.method);
            row.into_sale(sale_items, sale_payments)
        })
        .collect())
}

const BETWEEN: &str = "(?1 IS NULL OR created_at >= ?1) AND (?2 IS NULL OR created_at < ?2)";

async fn fetch_sale(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
    let sql = format!("SELECT {} FROM sales WHERE id = ?1", SALE_COLUMNS);
    let row = sqlx::query_as::<_, SaleRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let items_sql = r#"
        SELECT sale_id, product_id, name, category, subcategory,
               quantity, sold_by_unit, units, unit_price_cents, line_total_cents
        FROM sale_items WHERE sale_id = ?1 ORDER BY line_no
    "#;
    let items = sqlx::query_as::<_, ItemRow>(items_sql)
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

    let mut payments: Vec<PaymentEntry> = sqlx::query_as::<_, PaymentRow>(
        "SELECT sale_id, method, amount_cents FROM sale_payments WHERE sale_id = ?1",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|p| PaymentEntry::new(p.method, p.amount_cents))
    .collect();
    payments.sort_by_key(|p| p.method);

    Ok(Some(row.into_sale(
        items.into_iter().map(SaleItem::from).collect(),
        payments,
    )))
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for sales.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Turns a cart into a committed sale.
    ///
    /// Nothing is written unless every step succeeds: a stale cart that no
    /// longer fits the stock, a short payment or a duplicate receipt number
    /// roll the whole checkout back.
    pub async fn record_checkout(&self, request: &CheckoutRequest) -> DbResult<Sale> {
        if request.cart.is_empty() {
            return Err(CoreError::EmptyCart.into());
        }

        let total_cents = request.cart.total_cents();
        let settlement = settle(total_cents, &request.payments)?;

        let mut tx = self.pool.begin().await?;

        let mut products: HashMap<String, Product> = HashMap::new();
        for item in &request.cart.items {
            if products.contains_key(&item.product_id) {
                continue;
            }
            if let Some(p) = product::fetch(&mut tx, &item.product_id).await? {
                products.insert(p.id.clone(), p);
            }
        }
        request
            .cart
            .validate_stock(|id| products.get(id).cloned())?;

        let series = match &request.series {
            Some(series) => series.clone(),
            None => {
                let company: Option<CompanyConfig> = get_in(&mut tx, keys::COMPANY).await?;
                company.unwrap_or_default().receipt_series
            }
        };
        validate_series(&series)?;

        let mut counters: ReceiptCounters =
            get_in(&mut tx, keys::RECEIPT_COUNTERS).await?.unwrap_or_default();
        let receipt = counters.next(&series);
        set_in(&mut tx, keys::RECEIPT_COUNTERS, &counters).await?;

        let sale = Sale {
            id: Uuid::new_v4().to_string(),
            receipt_number: receipt.to_string(),
            created_at: Utc::now(),
            items: request.cart.to_sale_items(),
            total_cents,
            payments: settlement.payments,
            change_cents: settlement.change_cents,
            cashier_id: request.cashier_id.clone(),
            voided: false,
            voided_at: None,
            void_reason: None,
            reprint_count: 0,
            sync_version: 1,
        };

        debug!(
            receipt = %sale.receipt_number,
            lines = sale.items.len(),
            total_cents = sale.total_cents,
            "Recording checkout"
        );

        insert_row(&mut tx, &sale).await?;

        let reason = format!("sale {}", sale.receipt_number);
        for item in &sale.items {
            let product = products
                .get_mut(&item.product_id)
                .ok_or_else(|| CoreError::ProductNotFound(item.name.clone()))?;
            // The snapshot's units are what leaves stock and what a void returns.
            let change = stock::remove_units(product, item.units)?;
            if change.is_short() {
                warn!(product = %product.name, "Sale line exceeded stock, floored at zero");
            }
            let movement = movement_for(
                product,
                MovementKind::Sale,
                &change,
                reason.as_str(),
                Some(&sale.id),
                &sale.cashier_id,
            );
            apply_change(&mut tx, product, &movement).await?;
        }

        queue_entity_in(&mut tx, entity::SALE, &sale.id, &sale).await?;
        tx.commit().await?;

        info!(
            receipt = %sale.receipt_number,
            total_cents = sale.total_cents,
            change_cents = sale.change_cents,
            "Sale completed"
        );
        Ok(sale)
    }

    /// Gets a sale with its lines and payments.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        fetch_sale(&mut conn, id).await
    }

    pub async fn get_by_receipt_number(&self, receipt_number: &str) -> DbResult<Option<Sale>> {
        let id: Option<String> =
            sqlx::query_scalar("SELECT id FROM sales WHERE receipt_number = ?1")
                .bind(receipt_number.trim())
                .fetch_optional(&self.pool)
                .await?;

        match id {
            Some(id) => self.get_by_id(&id).await,
            None => Ok(None),
        }
    }

    /// Sales with `from <= created_at < to`, oldest first. Either bound may
    /// be open.
    pub async fn list_between(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<Sale>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {} FROM sales WHERE {} ORDER BY created_at, rowid",
            SALE_COLUMNS, BETWEEN
        );
        let rows = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&mut *conn)
            .await?;

        hydrate(&mut conn, rows, BETWEEN, from, to).await
    }

    /// Every sale, oldest first (backup export).
    pub async fn list_all(&self) -> DbResult<Vec<Sale>> {
        self.list_between(None, None).await
    }

    /// Most recent sales, newest first.
    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<Sale>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM sales ORDER BY created_at DESC, rowid DESC LIMIT ?1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;

        let mut conn = self.pool.acquire().await?;
        let mut sales = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(sale) = fetch_sale(&mut conn, &id).await? {
                sales.push(sale);
            }
        }
        Ok(sales)
    }

    /// Voids a sale and returns its units to stock.
    ///
    /// Box lines come back as sealed boxes, unit lines as loose units.
    /// Lines whose product no longer exists are skipped.
    pub async fn void_sale(&self, id: &str, reason: &str, actor: &str) -> DbResult<Sale> {
        let mut tx = self.pool.begin().await?;

        let mut sale = fetch_sale(&mut tx, id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(id.to_string()))?;
        if sale.voided {
            return Err(CoreError::SaleAlreadyVoided(sale.receipt_number).into());
        }

        let movement_reason = format!("void {}", sale.receipt_number);
        for item in &sale.items {
            let Some(mut product) = product::fetch(&mut tx, &item.product_id).await? else {
                warn!(product_id = %item.product_id, "Voided line refers to a missing product");
                continue;
            };
            let change = stock::return_units(&mut product, item.units, !item.sold_by_unit)?;
            let movement = movement_for(
                &product,
                MovementKind::VoidReturn,
                &change,
                movement_reason.as_str(),
                Some(&sale.id),
                actor,
            );
            apply_change(&mut tx, &mut product, &movement).await?;
        }

        let now = Utc::now();
        sale.voided = true;
        sale.voided_at = Some(now);
        sale.void_reason = Some(reason.trim().to_string()).filter(|r| !r.is_empty());
        sale.sync_version += 1;

        sqlx::query(
            r#"
            UPDATE sales SET
                voided = 1,
                voided_at = ?2,
                void_reason = ?3,
                sync_version = ?4
            WHERE id = ?1
            "#,
        )
        .bind(&sale.id)
        .bind(sale.voided_at)
        .bind(&sale.void_reason)
        .bind(sale.sync_version)
        .execute(&mut *tx)
        .await?;

        queue_entity_in(&mut tx, entity::SALE, &sale.id, &sale).await?;
        tx.commit().await?;

        info!(receipt = %sale.receipt_number, actor = %actor, "Sale voided");
        Ok(sale)
    }

    /// Counts a reprint and returns the new reprint count.
    ///
    /// The updated sale is queued for sync like any other change to it.
    pub async fn record_reprint(&self, id: &str) -> DbResult<i64> {
        let mut tx = self.pool.begin().await?;

        let mut sale = fetch_sale(&mut tx, id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(id.to_string()))?;
        sale.reprint_count += 1;
        sale.sync_version += 1;

        sqlx::query("UPDATE sales SET reprint_count = ?2, sync_version = ?3 WHERE id = ?1")
            .bind(&sale.id)
            .bind(sale.reprint_count)
            .bind(sale.sync_version)
            .execute(&mut *tx)
            .await?;

        queue_entity_in(&mut tx, entity::SALE, &sale.id, &sale).await?;
        tx.commit().await?;

        debug!(receipt = %sale.receipt_number, reprints = sale.reprint_count, "Reprint recorded");
        Ok(sale.reprint_count)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
