//! # Cart Commands
//!
//! ## Cart Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ┌──────────┐     ┌──────────┐     ┌──────────┐     ┌──────────┐       │
//! │  │  Empty   │────►│ In Cart  │────►│ Payment  │────►│ Receipt  │       │
//! │  │  Cart    │     │          │     │  split   │     │ printed  │       │
//! │  └──────────┘     └──────────┘     └──────────┘     └──────────┘       │
//! │                        │                 │                              │
//! │                   add_to_cart        checkout                           │
//! │                   update_cart_item   (sale.rs)                          │
//! │                   remove_from_cart                                      │
//! │                        │                                                │
//! │                        ▼                                                │
//! │                   clear_cart ──────────────────────►                    │
//! │                                                      (back to empty)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every mutation writes the cart to the settings store, so an
//! interrupted sale survives a restart.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::{CartState, DbState, SessionState};
use minimarket_core::cart::{Cart, CartItem, CartLineKey, CartTotals};
use minimarket_core::users::Permission;
use minimarket_core::Product;

/// Cart response including items and totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub items: Vec<CartItem>,
    pub totals: CartTotals,
}

impl From<&Cart> for CartResponse {
    fn from(cart: &Cart) -> Self {
        CartResponse {
            items: cart.items.clone(),
            totals: CartTotals::from(cart),
        }
    }
}

/// What the cashier scanned or picked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    /// Product UUID. Either this or `barcode` is required.
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    /// Defaults to 1.
    #[serde(default)]
    pub quantity: Option<i64>,
    /// Variant chosen at the counter (prices from `subcategory_prices`).
    #[serde(default)]
    pub subcategory: Option<String>,
    /// Loose unit of a closed product instead of a sealed box.
    #[serde(default)]
    pub sold_by_unit: bool,
}

async fn find_sellable(db: &DbState, product_id: &str) -> Result<Product, ApiError> {
    db.inner()
        .products()
        .get_by_id(product_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| ApiError::not_found("Product", product_id))
}

async fn persist(db: &DbState, cart: &Cart) {
    // The cart in memory stays authoritative if the write fails.
    if let Err(e) = db.inner().settings().save_cart(cart).await {
        warn!(error = %e, "Could not persist cart");
    }
}

pub fn get_cart(cart: &CartState) -> CartResponse {
    debug!("get_cart command");
    cart.with_cart(|c| CartResponse::from(c))
}

/// Adds a product or increases the matching line.
///
/// ## Behavior
/// - Same product, variant and box/unit mode: quantity increases
/// - Otherwise: a new line with the price frozen now
/// - All lines of one product together must fit the current stock
pub async fn add_to_cart(
    db: &DbState,
    cart: &CartState,
    session: &SessionState,
    request: AddToCartRequest,
) -> Result<CartResponse, ApiError> {
    session.require(Permission::Sell)?;
    let quantity = request.quantity.unwrap_or(1);
    debug!(
        product_id = ?request.product_id,
        barcode = ?request.barcode,
        quantity,
        sold_by_unit = request.sold_by_unit,
        "add_to_cart command"
    );

    let product = match (&request.product_id, &request.barcode) {
        (Some(id), _) => find_sellable(db, id).await?,
        (None, Some(code)) => db
            .inner()
            .products()
            .get_by_barcode(code)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ApiError::not_found("Barcode", code))?,
        (None, None) => return Err(ApiError::validation("productId or barcode is required")),
    };

    let updated = cart.with_cart_mut(|c| {
        c.add_item(
            &product,
            quantity,
            request.subcategory.as_deref(),
            request.sold_by_unit,
        )?;
        Ok::<Cart, ApiError>(c.clone())
    })?;

    persist(db, &updated).await;
    Ok(CartResponse::from(&updated))
}

/// Sets the quantity of a line. Zero removes it.
pub async fn update_cart_item(
    db: &DbState,
    cart: &CartState,
    session: &SessionState,
    key: CartLineKey,
    quantity: i64,
) -> Result<CartResponse, ApiError> {
    session.require(Permission::Sell)?;
    debug!(product_id = %key.product_id, quantity, "update_cart_item command");

    // Re-read so the stock check sees sales made since the line was added.
    let product = if quantity > 0 {
        Some(find_sellable(db, &key.product_id).await?)
    } else {
        None
    };

    let updated = cart.with_cart_mut(|c| {
        c.update_quantity(&key, quantity, product.as_ref())?;
        Ok::<Cart, ApiError>(c.clone())
    })?;

    persist(db, &updated).await;
    Ok(CartResponse::from(&updated))
}

pub async fn remove_from_cart(
    db: &DbState,
    cart: &CartState,
    session: &SessionState,
    key: CartLineKey,
) -> Result<CartResponse, ApiError> {
    session.require(Permission::Sell)?;
    debug!(product_id = %key.product_id, "remove_from_cart command");

    let updated = cart.with_cart_mut(|c| {
        c.remove_item(&key)?;
        Ok::<Cart, ApiError>(c.clone())
    })?;

    persist(db, &updated).await;
    Ok(CartResponse::from(&updated))
}

/// Empties the cart (sale cancelled).
pub async fn clear_cart(db: &DbState, cart: &CartState) -> CartResponse {
    debug!("clear_cart command");

    let updated = cart.with_cart_mut(|c| {
        c.clear();
        c.clone()
    });

    persist(db, &updated).await;
    CartResponse::from(&updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::testing::{seed_product, terminal};
    use minimarket_core::users::Role;

    #[tokio::test]
    async fn test_add_by_barcode_and_persist() {
        let t = terminal(Role::Cashier).await;
        seed_product(&t, "Inca Kola 500ml", "7750182000123", 10).await;

        let response = add_to_cart(
            &t.db,
            &t.cart,
            &t.session,
            AddToCartRequest {
                barcode: Some("7750182000123".into()),
                quantity: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(response.totals.total_cents, 1050);
        let saved = t.db.inner().settings().saved_cart().await.unwrap().unwrap();
        assert_eq!(saved.total_quantity(), 3);
    }

    #[tokio::test]
    async fn test_add_beyond_stock_rejected() {
        let t = terminal(Role::Cashier).await;
        let id = seed_product(&t, "Agua San Luis", "7750001", 2).await.id;

        let err = add_to_cart(
            &t.db,
            &t.cart,
            &t.session,
            AddToCartRequest {
                product_id: Some(id),
                quantity: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.code, ErrorCode::InsufficientStock);
        assert!(get_cart(&t.cart).items.is_empty());
    }

    #[tokio::test]
    async fn test_update_to_zero_removes_line() {
        let t = terminal(Role::Cashier).await;
        let id = seed_product(&t, "Galleta Soda", "7750002", 10).await.id;
        add_to_cart(
            &t.db,
            &t.cart,
            &t.session,
            AddToCartRequest {
                product_id: Some(id.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let key = CartLineKey {
            product_id: id,
            subcategory: None,
            sold_by_unit: false,
        };
        let response = update_cart_item(&t.db, &t.cart, &t.session, key, 0)
            .await
            .unwrap();
        assert!(response.items.is_empty());
        assert!(t.db.inner().settings().saved_cart().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_logged_out_cannot_sell() {
        let t = terminal(Role::Cashier).await;
        t.session.logout();

        let err = add_to_cart(
            &t.db,
            &t.cart,
            &t.session,
            AddToCartRequest {
                barcode: Some("123".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthenticated);
    }
}
