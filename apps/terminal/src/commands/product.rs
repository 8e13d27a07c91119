//! # Product Commands
//!
//! ## Search Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Cashier types or scans "7750182000123"                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌───────────────────────────────────────────┐                          │
//! │  │  Looks like a barcode? (digits only)      │                          │
//! │  │  YES: exact barcode lookup first          │──► Found? Return [1]     │
//! │  │  NO:  name LIKE '%query%'                 │                          │
//! │  └───────────────────────────────────────────┘                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Vec<Product>, barcode match first, then by name                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::{DbState, SessionState};
use minimarket_core::users::Permission;
use minimarket_core::{ClosedStock, Product};
use minimarket_db::repository::product::generate_product_id;

/// A new catalog entry.
///
/// Also the row format of the bulk importer (CSV columns / JSON fields).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub barcode: Option<String>,
    /// Empty: left for the categorizer.
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    pub price_cents: i64,
    #[serde(default)]
    pub subcategory_prices: BTreeMap<String, i64>,
    #[serde(default)]
    pub cost_cents: Option<i64>,
    /// Initial stock in units.
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub min_stock: i64,
    /// Set for closed products: units in one sealed box.
    #[serde(default)]
    pub units_per_box: Option<i64>,
    /// Loose-unit price of a closed product.
    #[serde(default)]
    pub unit_price_cents: Option<i64>,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
}

impl CreateProductRequest {
    /// Builds the product; closed stock is split into full boxes plus loose.
    pub fn into_product(self) -> Result<Product, ApiError> {
        let closed = match self.units_per_box {
            Some(units_per_box) => Some(ClosedStock::from_units(
                self.stock,
                units_per_box,
                self.unit_price_cents.unwrap_or(self.price_cents),
            )?),
            None => None,
        };

        let now = Utc::now();
        Ok(Product {
            id: generate_product_id(),
            name: self.name.trim().to_string(),
            barcode: self
                .barcode
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty()),
            category: self.category.trim().to_string(),
            subcategory: self.subcategory.filter(|s| !s.trim().is_empty()),
            price_cents: self.price_cents,
            subcategory_prices: self.subcategory_prices,
            cost_cents: self.cost_cents,
            stock: self.stock,
            min_stock: self.min_stock,
            closed,
            expiration_date: self.expiration_date,
            is_active: true,
            created_at: now,
            updated_at: now,
            sync_version: 0,
        })
    }
}

/// Catalog edit. Absent fields keep their value; stock is never edited
/// here (restock and counts do that with a movement).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// `Some("")` clears the barcode.
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub price_cents: Option<i64>,
    #[serde(default)]
    pub subcategory_prices: Option<BTreeMap<String, i64>>,
    #[serde(default)]
    pub cost_cents: Option<i64>,
    #[serde(default)]
    pub min_stock: Option<i64>,
    /// `Some(0)` turns a closed product back into a plain one.
    #[serde(default)]
    pub units_per_box: Option<i64>,
    #[serde(default)]
    pub unit_price_cents: Option<i64>,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
}

/// Scanner input is all digits, at least 6 of them.
fn is_barcode_query(query: &str) -> bool {
    query.len() >= 6 && query.chars().all(|c| c.is_ascii_digit())
}

pub async fn search_products(
    db: &DbState,
    query: String,
    limit: Option<u32>,
) -> Result<Vec<Product>, ApiError> {
    let start = Instant::now();
    let query = query.trim();
    let limit = limit.unwrap_or(20).min(100);

    debug!(query = %query, limit, "search_products command");

    if is_barcode_query(query) {
        if let Some(product) = db.inner().products().get_by_barcode(query).await? {
            if product.is_active {
                debug!(barcode = %query, "Exact barcode hit");
                return Ok(vec![product]);
            }
        }
    }

    let products = db.inner().products().search(query, limit).await?;
    debug!(
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        count = products.len(),
        "search_products complete"
    );
    Ok(products)
}

pub async fn get_product(db: &DbState, id: String) -> Result<Product, ApiError> {
    debug!(id = %id, "get_product command");
    db.inner()
        .products()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product", &id))
}

pub async fn list_products(
    db: &DbState,
    category: Option<String>,
    include_inactive: bool,
) -> Result<Vec<Product>, ApiError> {
    let products = db.inner().products();
    match category {
        Some(category) => Ok(products.list_by_category(&category).await?),
        None => Ok(products.list(include_inactive).await?),
    }
}

pub async fn create_product(
    db: &DbState,
    session: &SessionState,
    request: CreateProductRequest,
) -> Result<Product, ApiError> {
    let user = session.require(Permission::ManageProducts)?;
    debug!(name = %request.name, "create_product command");

    let product = request.into_product()?;
    let created = db.inner().products().insert(&product, &user.id).await?;
    info!(id = %created.id, name = %created.name, by = %user.username, "Product created");
    Ok(created)
}

pub async fn update_product(
    db: &DbState,
    session: &SessionState,
    request: UpdateProductRequest,
) -> Result<Product, ApiError> {
    let user = session.require(Permission::ManageProducts)?;
    debug!(id = %request.id, "update_product command");

    let mut product = get_product(db, request.id.clone()).await?;

    if let Some(name) = request.name {
        product.name = name;
    }
    if let Some(barcode) = request.barcode {
        let barcode = barcode.trim().to_string();
        product.barcode = (!barcode.is_empty()).then_some(barcode);
    }
    if let Some(category) = request.category {
        product.category = category;
    }
    if let Some(subcategory) = request.subcategory {
        product.subcategory = (!subcategory.trim().is_empty()).then_some(subcategory);
    }
    if let Some(price) = request.price_cents {
        product.price_cents = price;
    }
    if let Some(prices) = request.subcategory_prices {
        product.subcategory_prices = prices;
    }
    if request.cost_cents.is_some() {
        product.cost_cents = request.cost_cents;
    }
    if let Some(min_stock) = request.min_stock {
        product.min_stock = min_stock;
    }
    if request.expiration_date.is_some() {
        product.expiration_date = request.expiration_date;
    }

    // Only the box size and unit price matter here; the repository re-splits
    // the stored stock.
    match request.units_per_box {
        Some(0) => product.closed = None,
        Some(units_per_box) => {
            let unit_price_cents = request
                .unit_price_cents
                .or(product.closed.map(|c| c.unit_price_cents))
                .unwrap_or(product.price_cents);
            product.closed = Some(ClosedStock {
                units_per_box,
                boxes: 0,
                loose_units: 0,
                unit_price_cents,
            });
        }
        None => {
            if let (Some(price), Some(closed)) = (request.unit_price_cents, product.closed.as_mut()) {
                closed.unit_price_cents = price;
            }
        }
    }

    Ok(db.inner().products().update(&product, &user.id).await?)
}

/// Hides a product from sale. Past sales keep their snapshots.
pub async fn delete_product(
    db: &DbState,
    session: &SessionState,
    id: String,
) -> Result<(), ApiError> {
    let user = session.require(Permission::ManageProducts)?;
    db.inner().products().soft_delete(&id).await?;
    info!(id = %id, by = %user.username, "Product deactivated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::testing::terminal;
    use minimarket_core::users::Role;

    fn cigarettes() -> CreateProductRequest {
        CreateProductRequest {
            name: "Hamilton Azul x20".into(),
            barcode: Some("7751234000017".into()),
            category: "Cigarrillos".into(),
            price_cents: 1400,
            stock: 46,
            units_per_box: Some(20),
            unit_price_cents: Some(80),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_closed_product_splits_stock() {
        let t = terminal(Role::Manager).await;
        let product = create_product(&t.db, &t.session, cigarettes()).await.unwrap();

        let closed = product.closed.unwrap();
        assert_eq!((closed.boxes, closed.loose_units), (2, 6));
        assert_eq!(product.stock, 46);
    }

    #[tokio::test]
    async fn test_barcode_search_is_exact() {
        let t = terminal(Role::Manager).await;
        create_product(&t.db, &t.session, cigarettes()).await.unwrap();

        let hits = search_products(&t.db, "7751234000017".into(), None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Hamilton Azul x20");

        let hits = search_products(&t.db, "hamilton".into(), None).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_stock() {
        let t = terminal(Role::Manager).await;
        let product = create_product(&t.db, &t.session, cigarettes()).await.unwrap();

        let updated = update_product(
            &t.db,
            &t.session,
            UpdateProductRequest {
                id: product.id,
                price_cents: Some(1500),
                units_per_box: Some(10),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.price_cents, 1500);
        assert_eq!(updated.stock, 46);
        let closed = updated.closed.unwrap();
        assert_eq!((closed.boxes, closed.loose_units), (4, 6));
    }

    #[tokio::test]
    async fn test_cashier_cannot_create() {
        let t = terminal(Role::Cashier).await;
        let err = create_product(&t.db, &t.session, cigarettes()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PermissionDenied);
    }

    #[tokio::test]
    async fn test_deleted_product_not_found_by_search() {
        let t = terminal(Role::Manager).await;
        let product = create_product(&t.db, &t.session, cigarettes()).await.unwrap();
        delete_product(&t.db, &t.session, product.id).await.unwrap();

        let hits = search_products(&t.db, "7751234000017".into(), None).await.unwrap();
        assert!(hits.is_empty());
    }
}
