//! # Product Repository
//!
//! Database operations for products.
//!
//! ## Key Operations
//! - Barcode lookup (scanner) and name search
//! - CRUD operations with an outbox entry per change
//! - Stock writes used by the checkout, void and count transactions
//!
//! ## Closed Products on Disk
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products row                                                           │
//! │                                                                         │
//! │  plain  : stock=24  units_per_box=NULL boxes=NULL loose=NULL            │
//! │  closed : stock=46  units_per_box=20   boxes=2    loose=6               │
//! │                                                                         │
//! │  CHECK (stock = boxes * units_per_box + loose_units) rejects any write  │
//! │  that breaks the box/unit split, whatever code path issued it.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock never changes through [`ProductRepository::update`]; it moves only
//! through checkout, void, restock and counts, each of which writes an
//! inventory movement in the same transaction.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use minimarket_core::stock::{self, StockChange};
use minimarket_core::validation::{
    validate_barcode, validate_category_name, validate_price_cents, validate_product_name,
    validate_search_query, validate_stock_level, validate_units_per_box,
};
use minimarket_core::{entity, ClosedStock, MovementKind, Product, ValidationError};

use super::inventory::{insert_movement, movement_for};
use super::sync::queue_entity_in;
use super::{from_json, to_json};
use crate::error::{DbError, DbResult};

pub(crate) const PRODUCT_COLUMNS: &str = r#"
    id, name, barcode, category, subcategory,
    price_cents, subcategory_prices, cost_cents,
    stock, min_stock,
    units_per_box, boxes, loose_units, unit_price_cents,
    expiration_date, is_active, created_at, updated_at, sync_version
"#;

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, FromRow)]
pub(crate) struct ProductRow {
    id: String,
    name: String,
    barcode: Option<String>,
    category: String,
    subcategory: Option<String>,
    price_cents: i64,
    subcategory_prices: String,
    cost_cents: Option<i64>,
    stock: i64,
    min_stock: i64,
    units_per_box: Option<i64>,
    boxes: Option<i64>,
    loose_units: Option<i64>,
    unit_price_cents: Option<i64>,
    expiration_date: Option<NaiveDate>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    sync_version: i64,
}

impl TryFrom<ProductRow> for Product {
    type Error = DbError;

    fn try_from(row: ProductRow) -> DbResult<Self> {
        let subcategory_prices: BTreeMap<String, i64> =
            from_json("products.subcategory_prices", &row.subcategory_prices)?;

        let closed = match (row.units_per_box, row.boxes, row.loose_units, row.unit_price_cents) {
            (Some(units_per_box), Some(boxes), Some(loose_units), Some(unit_price_cents)) => {
                Some(ClosedStock {
                    units_per_box,
                    boxes,
                    loose_units,
                    unit_price_cents,
                })
            }
            _ => None,
        };

        Ok(Product {
            id: row.id,
            name: row.name,
            barcode: row.barcode,
            category: row.category,
            subcategory: row.subcategory,
            price_cents: row.price_cents,
            subcategory_prices,
            cost_cents: row.cost_cents,
            stock: row.stock,
            min_stock: row.min_stock,
            closed,
            expiration_date: row.expiration_date,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
            sync_version: row.sync_version,
        })
    }
}

fn into_products(rows: Vec<ProductRow>) -> DbResult<Vec<Product>> {
    rows.into_iter().map(Product::try_from).collect()
}

// =============================================================================
// Connection-level helpers (shared with other repositories' transactions)
// =============================================================================

/// Loads a product (active or not) on an existing connection.
pub(crate) async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);
    let row = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(Product::try_from).transpose()
}

/// Persists the stock fields of `product`, bumping its version.
pub(crate) async fn write_stock(conn: &mut SqliteConnection, product: &mut Product) -> DbResult<()> {
    product.updated_at = Utc::now();
    product.sync_version += 1;

    let closed = product.closed;
    sqlx::query(
        r#"
        UPDATE products SET
            stock = ?2,
            units_per_box = ?3,
            boxes = ?4,
            loose_units = ?5,
            unit_price_cents = ?6,
            updated_at = ?7,
            sync_version = ?8
        WHERE id = ?1
        "#,
    )
    .bind(&product.id)
    .bind(product.stock)
    .bind(closed.map(|c| c.units_per_box))
    .bind(closed.map(|c| c.boxes))
    .bind(closed.map(|c| c.loose_units))
    .bind(closed.map(|c| c.unit_price_cents))
    .bind(product.updated_at)
    .bind(product.sync_version)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Inserts a full product row.
pub(crate) async fn insert_row(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
    let closed = product.closed;
    let result = sqlx::query(
        r#"
        INSERT INTO products (
            id, name, barcode, category, subcategory,
            price_cents, subcategory_prices, cost_cents,
            stock, min_stock,
            units_per_box, boxes, loose_units, unit_price_cents,
            expiration_date, is_active, created_at, updated_at, sync_version
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8,
            ?9, ?10,
            ?11, ?12, ?13, ?14,
            ?15, ?16, ?17, ?18, ?19
        )
        "#,
    )
    .bind(&product.id)
    .bind(&product.name)
    .bind(&product.barcode)
    .bind(&product.category)
    .bind(&product.subcategory)
    .bind(product.price_cents)
    .bind(to_json("products.subcategory_prices", &product.subcategory_prices)?)
    .bind(product.cost_cents)
    .bind(product.stock)
    .bind(product.min_stock)
    .bind(closed.map(|c| c.units_per_box))
    .bind(closed.map(|c| c.boxes))
    .bind(closed.map(|c| c.loose_units))
    .bind(closed.map(|c| c.unit_price_cents))
    .bind(product.expiration_date)
    .bind(product.is_active)
    .bind(product.created_at)
    .bind(product.updated_at)
    .bind(product.sync_version)
    .execute(&mut *conn)
    .await;

    match result {
        Err(sqlx::Error::Database(e)) if e.message().contains("products.barcode") => Err(
            DbError::duplicate("barcode", product.barcode.clone().unwrap_or_default()),
        ),
        other => {
            other?;
            Ok(())
        }
    }
}

/// Checks the catalog fields of a product before it is written.
pub(crate) fn validate_product(product: &Product) -> DbResult<()> {
    validate_product_name(&product.name)?;
    if let Some(barcode) = &product.barcode {
        validate_barcode(barcode)?;
    }
    if !product.category.trim().is_empty() {
        validate_category_name(&product.category)?;
    }
    validate_price_cents(product.price_cents)?;
    for price in product.subcategory_prices.values() {
        validate_price_cents(*price)?;
    }
    validate_stock_level("stock", product.stock)?;
    validate_stock_level("min_stock", product.min_stock)?;
    if let Some(closed) = &product.closed {
        validate_units_per_box(closed.units_per_box)?;
        validate_price_cents(closed.unit_price_cents)?;
    }
    if !product.stock_is_consistent() {
        return Err(ValidationError::InvalidFormat {
            field: "stock".to_string(),
            reason: format!(
                "{} units do not match the box and loose counts",
                product.stock
            ),
        }
        .into());
    }
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = ProductRepository::new(pool);
///
/// let scanned = repo.get_by_barcode("7751271001234").await?;
/// let results = repo.search("hamilton", 20).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by ID, including soft-deleted ones.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, id).await
    }

    /// Gets an active product by barcode (scanner input).
    pub async fn get_by_barcode(&self, barcode: &str) -> DbResult<Option<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE barcode = ?1 AND is_active = 1",
            PRODUCT_COLUMNS
        );
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(barcode.trim())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Product::try_from).transpose()
    }

    /// Searches active products by name fragment or exact barcode.
    ///
    /// An empty query lists active products alphabetically.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        let query = validate_search_query(query)?;

        debug!(query = %query, limit = %limit, "Searching products");

        let sql = format!(
            r#"
            SELECT {}
            FROM products
            WHERE is_active = 1
              AND (?1 = '' OR name LIKE '%' || ?1 || '%' OR barcode = ?1)
            ORDER BY
                CASE WHEN barcode = ?1 THEN 0 ELSE 1 END,
                name COLLATE NOCASE
            LIMIT ?2
            "#,
            PRODUCT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        into_products(rows)
    }

    /// Lists products, alphabetically.
    pub async fn list(&self, include_inactive: bool) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE is_active = 1 OR ?1 ORDER BY name COLLATE NOCASE",
            PRODUCT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(include_inactive)
            .fetch_all(&self.pool)
            .await?;

        into_products(rows)
    }

    /// Lists active products of one category.
    pub async fn list_by_category(&self, category: &str) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE is_active = 1 AND category = ?1 COLLATE NOCASE ORDER BY name COLLATE NOCASE",
            PRODUCT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(category)
            .fetch_all(&self.pool)
            .await?;

        into_products(rows)
    }

    /// Inserts a new product.
    ///
    /// Initial stock is recorded as an `import` movement in the same
    /// transaction. Returns the product as stored.
    pub async fn insert(&self, product: &Product, actor: &str) -> DbResult<Product> {
        validate_product(product)?;

        debug!(id = %product.id, name = %product.name, "Inserting product");

        let mut tx = self.pool.begin().await?;
        insert_row(&mut tx, product).await?;

        if product.stock > 0 {
            let change = StockChange {
                before: stock::StockSnapshot {
                    stock: 0,
                    boxes: product.closed.map(|_| 0),
                    loose_units: product.closed.map(|_| 0),
                },
                after: stock::StockSnapshot::of(product),
                units_requested: product.stock,
                units_deducted: product.stock,
                boxes_opened: 0,
            };
            let movement = movement_for(
                product,
                MovementKind::Import,
                &change,
                "initial stock",
                None,
                actor,
            );
            insert_movement(&mut tx, &movement).await?;
            queue_entity_in(&mut tx, entity::MOVEMENT, &movement.id, &movement).await?;
        }

        queue_entity_in(&mut tx, entity::PRODUCT, &product.id, product).await?;
        tx.commit().await?;

        info!(id = %product.id, name = %product.name, stock = product.stock, "Product created");
        Ok(product.clone())
    }

    /// Updates catalog fields of a product.
    ///
    /// Stock, box and loose counts keep their stored values; switching closed
    /// mode on, off or to another box size re-splits the stored stock. A
    /// re-split is recorded as a zero-delta adjustment movement.
    pub async fn update(&self, product: &Product, actor: &str) -> DbResult<Product> {
        let mut tx = self.pool.begin().await?;

        let mut stored = fetch(&mut tx, &product.id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", &product.id))?;

        let old_mode = stored.closed.map(|c| (c.units_per_box, c.unit_price_cents));
        let new_mode = product.closed.map(|c| (c.units_per_box, c.unit_price_cents));
        let resplit = old_mode.map(|m| m.0) != new_mode.map(|m| m.0);
        let before = stock::StockSnapshot::of(&stored);

        stored.name = product.name.trim().to_string();
        stored.barcode = product.barcode.clone();
        stored.category = product.category.clone();
        stored.subcategory = product.subcategory.clone();
        stored.price_cents = product.price_cents;
        stored.subcategory_prices = product.subcategory_prices.clone();
        stored.cost_cents = product.cost_cents;
        stored.min_stock = product.min_stock;
        stored.expiration_date = product.expiration_date;
        stored.is_active = product.is_active;
        stock::set_closed_mode(&mut stored, new_mode)?;
        if !resplit {
            // same box size: keep the stored split, only the unit price may change
            if let (Some(closed), Some(old)) = (stored.closed.as_mut(), before.boxes) {
                closed.boxes = old;
                closed.loose_units = before.loose_units.unwrap_or(0);
            }
        }
        stored.updated_at = Utc::now();
        stored.sync_version += 1;

        validate_product(&stored)?;

        let closed = stored.closed;
        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?2,
                barcode = ?3,
                category = ?4,
                subcategory = ?5,
                price_cents = ?6,
                subcategory_prices = ?7,
                cost_cents = ?8,
                min_stock = ?9,
                units_per_box = ?10,
                boxes = ?11,
                loose_units = ?12,
                unit_price_cents = ?13,
                expiration_date = ?14,
                is_active = ?15,
                updated_at = ?16,
                sync_version = ?17
            WHERE id = ?1
            "#,
        )
        .bind(&stored.id)
        .bind(&stored.name)
        .bind(&stored.barcode)
        .bind(&stored.category)
        .bind(&stored.subcategory)
        .bind(stored.price_cents)
        .bind(to_json("products.subcategory_prices", &stored.subcategory_prices)?)
        .bind(stored.cost_cents)
        .bind(stored.min_stock)
        .bind(closed.map(|c| c.units_per_box))
        .bind(closed.map(|c| c.boxes))
        .bind(closed.map(|c| c.loose_units))
        .bind(closed.map(|c| c.unit_price_cents))
        .bind(stored.expiration_date)
        .bind(stored.is_active)
        .bind(stored.updated_at)
        .bind(stored.sync_version)
        .execute(&mut *tx)
        .await;

        if let Err(sqlx::Error::Database(e)) = &result {
            if e.message().contains("products.barcode") {
                return Err(DbError::duplicate(
                    "barcode",
                    stored.barcode.clone().unwrap_or_default(),
                ));
            }
        }
        result?;

        if resplit {
            let change = StockChange {
                before,
                after: stock::StockSnapshot::of(&stored),
                units_requested: 0,
                units_deducted: 0,
                boxes_opened: 0,
            };
            let movement = movement_for(
                &stored,
                MovementKind::Adjustment,
                &change,
                "box size changed",
                None,
                actor,
            );
            insert_movement(&mut tx, &movement).await?;
            queue_entity_in(&mut tx, entity::MOVEMENT, &movement.id, &movement).await?;
        }

        queue_entity_in(&mut tx, entity::PRODUCT, &stored.id, &stored).await?;
        tx.commit().await?;

        debug!(id = %stored.id, resplit, "Product updated");
        Ok(stored)
    }

    /// Sets category and subcategory (categorizer `--apply`).
    pub async fn assign_category(
        &self,
        id: &str,
        category: &str,
        subcategory: Option<&str>,
    ) -> DbResult<Product> {
        validate_category_name(category)?;

        let mut tx = self.pool.begin().await?;
        let mut product = fetch(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))?;

        product.category = category.to_string();
        product.subcategory = subcategory.map(str::to_string);
        product.updated_at = Utc::now();
        product.sync_version += 1;

        sqlx::query(
            "UPDATE products SET category = ?2, subcategory = ?3, updated_at = ?4, sync_version = ?5 WHERE id = ?1",
        )
        .bind(&product.id)
        .bind(&product.category)
        .bind(&product.subcategory)
        .bind(product.updated_at)
        .bind(product.sync_version)
        .execute(&mut *tx)
        .await?;

        queue_entity_in(&mut tx, entity::PRODUCT, &product.id, &product).await?;
        tx.commit().await?;
        Ok(product)
    }

    /// Soft-deletes a product by setting is_active = false.
    ///
    /// Sales keep their line snapshots; the product just stops showing up
    /// in search and scanner lookups.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Soft-deleting product");

        let mut tx = self.pool.begin().await?;
        let mut product = fetch(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))?;

        product.is_active = false;
        product.updated_at = Utc::now();
        product.sync_version += 1;

        sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2, sync_version = ?3 WHERE id = ?1")
            .bind(&product.id)
            .bind(product.updated_at)
            .bind(product.sync_version)
            .execute(&mut *tx)
            .await?;

        queue_entity_in(&mut tx, entity::PRODUCT, &product.id, &product).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    pub(crate) fn product(name: &str, barcode: &str, stock: i64) -> Product {
        let now = Utc::now();
        Product {
            id: generate_product_id(),
            name: name.to_string(),
            barcode: Some(barcode.to_string()),
            category: "Bebidas".to_string(),
            subcategory: None,
            price_cents: 350,
            subcategory_prices: BTreeMap::new(),
            cost_cents: Some(250),
            stock,
            min_stock: 5,
            closed: None,
            expiration_date: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            sync_version: 0,
        }
    }

    /// 2 boxes of 20 plus 6 loose: 46 units.
    pub(crate) fn cigarettes(barcode: &str) -> Product {
        let mut p = product("Hamilton Azul x20", barcode, 46);
        p.category = "Cigarrillos".to_string();
        p.price_cents = 1400;
        p.closed = Some(ClosedStock {
            units_per_box: 20,
            boxes: 2,
            loose_units: 6,
            unit_price_cents: 80,
        });
        p
    }

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let db = db().await;
        let repo = db.products();
        let inca = repo.insert(&product("Inca Kola 500ml", "775100", 24), "admin").await.unwrap();
        repo.insert(&cigarettes("775200"), "admin").await.unwrap();

        let found = repo.get_by_barcode("775100").await.unwrap().unwrap();
        assert_eq!(found.id, inca.id);

        let hits = repo.search("hamil", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        let closed = hits[0].closed.unwrap();
        assert_eq!((closed.boxes, closed.loose_units), (2, 6));
        assert_eq!(hits[0].stock, 46);

        assert_eq!(repo.search("", 10).await.unwrap().len(), 2);
        assert_eq!(repo.count().await.unwrap(), 2);

        // initial stock is audited and queued for sync
        let movements = db.inventory().movements_for_product(&inca.id, 10).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].kind, MovementKind::Import);
        assert_eq!(movements[0].delta, 24);
        assert!(db.sync_outbox().count_pending().await.unwrap() >= 4);
    }

    #[tokio::test]
    async fn test_duplicate_barcode_rejected() {
        let db = db().await;
        let repo = db.products();
        repo.insert(&product("A", "111", 0), "admin").await.unwrap();
        let err = repo.insert(&product("B", "111", 0), "admin").await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_update_keeps_stock_and_resplits_boxes() {
        let db = db().await;
        let repo = db.products();
        let mut p = repo.insert(&cigarettes("222"), "admin").await.unwrap();

        // stock edits through update are ignored
        p.stock = 999;
        p.price_cents = 1500;
        let updated = repo.update(&p, "admin").await.unwrap();
        assert_eq!(updated.stock, 46);
        assert_eq!(updated.price_cents, 1500);
        assert_eq!(updated.closed.unwrap().boxes, 2);

        // new box size re-splits 46 units as 4 x 10 + 6
        let mut p = updated;
        if let Some(closed) = p.closed.as_mut() {
            closed.units_per_box = 10;
        }
        let resplit = repo.update(&p, "admin").await.unwrap();
        let closed = resplit.closed.unwrap();
        assert_eq!((closed.boxes, closed.loose_units, resplit.stock), (4, 6, 46));

        let movements = db.inventory().movements_for_product(&p.id, 10).await.unwrap();
        assert!(movements.iter().any(|m| m.kind == MovementKind::Adjustment && m.delta == 0));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_from_search() {
        let db = db().await;
        let repo = db.products();
        let p = repo.insert(&product("Galleta Soda", "333", 3), "admin").await.unwrap();
        repo.soft_delete(&p.id).await.unwrap();

        assert!(repo.get_by_barcode("333").await.unwrap().is_none());
        assert!(repo.search("soda", 10).await.unwrap().is_empty());
        assert!(!repo.get_by_id(&p.id).await.unwrap().unwrap().is_active);
        assert_eq!(repo.list(true).await.unwrap().len(), 1);
        assert!(repo.list(false).await.unwrap().is_empty());
    }
}
