//! # Cart Module
//!
//! The cashier's working cart: line items, variant pricing and the
//! insufficient-stock check.
//!
//! ## Line Identity
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  A cart line is unique by (product_id, subcategory, sold_by_unit)       │
//! │                                                                         │
//! │  Hamilton Azul   box           ──► line 1  qty 1   × 18.00              │
//! │  Hamilton Azul   unit          ──► line 2  qty 3   ×  1.00              │
//! │  Inca Kola       "Helada"      ──► line 3  qty 2   ×  4.00 (override)   │
//! │  Inca Kola       (none)        ──► line 4  qty 1   ×  3.50 (base)       │
//! │                                                                         │
//! │  Stock check for Hamilton Azul: 1 × 20 + 3 × 1 = 23 units required      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Prices are frozen when the line is created; a later product price
//! change does not alter lines already in the cart.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Product, SaleItem};
use crate::validation::{validate_cart_size, validate_quantity};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

// =============================================================================
// Pricing
// =============================================================================

/// Resolves the unit price of a cart line.
///
/// ## Resolution Order
/// 1. Sold by unit (closed products) → the loose-unit price
/// 2. Subcategory present in the product's price map → that price
/// 3. Otherwise → the base price
///
/// An unknown subcategory is not an error; it falls back to the base price.
///
/// ## Example
/// ```rust
/// # use minimarket_core::cart::resolve_unit_price;
/// # use minimarket_core::Product;
/// # fn demo(product: &Product) {
/// let price = resolve_unit_price(product, Some("Helada"), false).unwrap();
/// # }
/// ```
pub fn resolve_unit_price(
    product: &Product,
    subcategory: Option<&str>,
    sold_by_unit: bool,
) -> CoreResult<i64> {
    if sold_by_unit {
        return product
            .closed
            .map(|c| c.unit_price_cents)
            .ok_or_else(|| CoreError::NotClosedProduct(product.name.clone()));
    }

    if let Some(sub) = subcategory {
        if let Some(price) = product.subcategory_prices.get(sub) {
            return Ok(*price);
        }
        if let Some((_, price)) = product
            .subcategory_prices
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(sub))
        {
            return Ok(*price);
        }
    }

    Ok(product.price_cents)
}

fn normalize_subcategory(subcategory: Option<&str>) -> Option<String> {
    subcategory
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Cart Item
// =============================================================================

/// Identifies a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CartLineKey {
    pub product_id: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub sold_by_unit: bool,
}

/// An item in the cart.
///
/// ## Design Notes
/// - `product_id`: Reference to the product (for database lookup)
/// - name, category and price are frozen at the time of adding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub sold_by_unit: bool,
    /// Units per quantity: `units_per_box` for box lines, 1 otherwise.
    pub units_per_quantity: i64,
    pub unit_price_cents: i64,
    pub quantity: i64,
}

impl CartItem {
    /// Creates a cart line for `product`.
    ///
    /// ## Errors
    /// - `NotClosedProduct` when selling a plain product by unit
    /// - `Validation` for an out-of-range quantity
    pub fn from_product(
        product: &Product,
        quantity: i64,
        subcategory: Option<&str>,
        sold_by_unit: bool,
    ) -> CoreResult<Self> {
        validate_quantity(quantity)?;
        let subcategory = normalize_subcategory(subcategory);
        let unit_price_cents = resolve_unit_price(product, subcategory.as_deref(), sold_by_unit)?;

        Ok(CartItem {
            product_id: product.id.clone(),
            name: product.name.clone(),
            category: product.category.clone(),
            subcategory,
            sold_by_unit,
            units_per_quantity: product.units_per_quantity(sold_by_unit),
            unit_price_cents,
            quantity,
        })
    }

    pub fn key(&self) -> CartLineKey {
        CartLineKey {
            product_id: self.product_id.clone(),
            subcategory: self.subcategory.clone(),
            sold_by_unit: self.sold_by_unit,
        }
    }

    fn matches(&self, key: &CartLineKey) -> bool {
        self.product_id == key.product_id
            && self.subcategory == key.subcategory
            && self.sold_by_unit == key.sold_by_unit
    }

    /// Units this line takes from stock.
    #[inline]
    pub fn units_required(&self) -> i64 {
        self.quantity * self.units_per_quantity
    }

    #[inline]
    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents * self.quantity
    }

    /// Snapshot for the persisted sale.
    pub fn to_sale_item(&self) -> SaleItem {
        SaleItem {
            product_id: self.product_id.clone(),
            name: self.name.clone(),
            category: self.category.clone(),
            subcategory: self.subcategory.clone(),
            quantity: self.quantity,
            sold_by_unit: self.sold_by_unit,
            units: self.units_required(),
            unit_price_cents: self.unit_price_cents,
            line_total_cents: self.line_total_cents(),
        }
    }
}

// =============================================================================
// Cart
// =============================================================================

/// The cart.
///
/// ## Invariants
/// - Lines are unique by [`CartLineKey`]
/// - Quantity is always 1..=999 (setting 0 removes the line)
/// - At most 100 lines
/// - Units required per product never exceed the stock seen when adding
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<CartItem>,
}

impl Cart {
    pub fn new() -> Self {
        Cart { items: Vec::new() }
    }

    /// Adds a product or increases the quantity of the matching line.
    ///
    /// ## Errors
    /// - `QuantityTooLarge` / `CartTooLarge` for the cart limits
    /// - `InsufficientStock` when all lines of the product together would
    ///   need more units than `product.stock`
    pub fn add_item(
        &mut self,
        product: &Product,
        quantity: i64,
        subcategory: Option<&str>,
        sold_by_unit: bool,
    ) -> CoreResult<()> {
        let candidate = CartItem::from_product(product, quantity, subcategory, sold_by_unit)?;
        let key = candidate.key();

        let existing_qty = self.line(&key).map(|i| i.quantity).unwrap_or(0);
        let new_qty = existing_qty + quantity;
        if new_qty > MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: new_qty,
                max: MAX_ITEM_QUANTITY,
            });
        }
        if existing_qty == 0 && validate_cart_size(self.items.len()).is_err() {
            return Err(CoreError::CartTooLarge {
                max: MAX_CART_ITEMS,
            });
        }

        let requested = self.units_for(&product.id) + candidate.units_required();
        ensure_stock(product, requested)?;

        match self.items.iter_mut().find(|i| i.matches(&key)) {
            Some(item) => item.quantity = new_qty,
            None => self.items.push(candidate),
        }
        Ok(())
    }

    /// Sets the quantity of a line. Zero removes it.
    ///
    /// When `product` is given the stock check is repeated with the new
    /// quantity.
    pub fn update_quantity(
        &mut self,
        key: &CartLineKey,
        quantity: i64,
        product: Option<&Product>,
    ) -> CoreResult<()> {
        if quantity == 0 {
            return self.remove_item(key);
        }
        validate_quantity(quantity)?;

        let line = self
            .line(key)
            .ok_or_else(|| CoreError::ProductNotFound(key.product_id.clone()))?;

        if let Some(product) = product {
            let others = self.units_for(&key.product_id) - line.units_required();
            ensure_stock(product, others + quantity * line.units_per_quantity)?;
        }

        if let Some(item) = self.items.iter_mut().find(|i| i.matches(key)) {
            item.quantity = quantity;
        }
        Ok(())
    }

    /// Removes a line.
    pub fn remove_item(&mut self, key: &CartLineKey) -> CoreResult<()> {
        let initial_len = self.items.len();
        self.items.retain(|i| !i.matches(key));

        if self.items.len() == initial_len {
            Err(CoreError::ProductNotFound(key.product_id.clone()))
        } else {
            Ok(())
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn line(&self, key: &CartLineKey) -> Option<&CartItem> {
        self.items.iter().find(|i| i.matches(key))
    }

    /// Units required by all lines of one product.
    pub fn units_for(&self, product_id: &str) -> i64 {
        self.items
            .iter()
            .filter(|i| i.product_id == product_id)
            .map(CartItem::units_required)
            .sum()
    }

    /// Re-checks every product in the cart against fresh stock levels.
    ///
    /// `lookup` returns the current product, or `None` when it no longer
    /// exists (or was deactivated).
    ///
    /// ## Errors
    /// - `StaleCartLine` when a line's units per quantity no longer match
    ///   the product (box size changed, closed mode switched)
    /// - `InsufficientStock` as in [`Cart::add_item`]
    pub fn validate_stock<F>(&self, mut lookup: F) -> CoreResult<()>
    where
        F: FnMut(&str) -> Option<Product>,
    {
        let mut seen: Vec<&str> = Vec::new();
        for item in &self.items {
            let product = lookup(&item.product_id)
                .filter(|p| p.is_active)
                .ok_or_else(|| CoreError::ProductNotFound(item.name.clone()))?;
            if (item.sold_by_unit && !product.is_closed())
                || product.units_per_quantity(item.sold_by_unit) != item.units_per_quantity
            {
                return Err(CoreError::StaleCartLine(item.name.clone()));
            }

            if seen.contains(&item.product_id.as_str()) {
                continue;
            }
            seen.push(&item.product_id);
            ensure_stock(&product, self.units_for(&item.product_id))?;
        }
        Ok(())
    }

    pub fn to_sale_items(&self) -> Vec<SaleItem> {
        self.items.iter().map(CartItem::to_sale_item).collect()
    }

    /// Number of lines.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    pub fn total_cents(&self) -> i64 {
        self.items.iter().map(CartItem::line_total_cents).sum()
    }

    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents())
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn ensure_stock(product: &Product, requested: i64) -> CoreResult<()> {
    if !product.can_sell(requested) {
        return Err(CoreError::InsufficientStock {
            product: product.name.clone(),
            available: product.stock,
            requested,
        });
    }
    Ok(())
}

/// Cart totals summary for command responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub item_count: usize,
    pub total_quantity: i64,
    pub total_cents: i64,
}

impl From<&Cart> for CartTotals {
    fn from(cart: &Cart) -> Self {
        CartTotals {
            item_count: cart.item_count(),
            total_quantity: cart.total_quantity(),
            total_cents: cart.total_cents(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClosedStock;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn soda(stock: i64) -> Product {
        let mut prices = BTreeMap::new();
        prices.insert("Helada".to_string(), 400);
        Product {
            id: "soda".to_string(),
            name: "Inca Kola 500ml".to_string(),
            barcode: None,
            category: "Bebidas".to_string(),
            subcategory: Some("Gaseosas".to_string()),
            price_cents: 350,
            subcategory_prices: prices,
            cost_cents: None,
            stock,
            min_stock: 0,
            closed: None,
            expiration_date: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            sync_version: 0,
        }
    }

    fn cigarettes(boxes: i64, loose: i64) -> Product {
        let mut product = soda(0);
        product.id = "cig".to_string();
        product.name = "Hamilton Azul".to_string();
        product.category = "Cigarrillos".to_string();
        product.subcategory_prices.clear();
        product.price_cents = 1800;
        let closed = ClosedStock {
            units_per_box: 20,
            boxes,
            loose_units: loose,
            unit_price_cents: 100,
        };
        product.stock = closed.total_units();
        product.closed = Some(closed);
        product
    }

    #[test]
    fn test_price_resolution() {
        let product = soda(10);
        assert_eq!(resolve_unit_price(&product, None, false).unwrap(), 350);
        assert_eq!(resolve_unit_price(&product, Some("Helada"), false).unwrap(), 400);
        assert_eq!(resolve_unit_price(&product, Some("helada"), false).unwrap(), 400);
        assert_eq!(resolve_unit_price(&product, Some("Tibia"), false).unwrap(), 350);
        assert!(resolve_unit_price(&product, None, true).is_err());

        let product = cigarettes(1, 0);
        assert_eq!(resolve_unit_price(&product, None, false).unwrap(), 1800);
        assert_eq!(resolve_unit_price(&product, None, true).unwrap(), 100);
    }

    #[test]
    fn test_lines_unique_by_subcategory_and_unit_flag() {
        let mut cart = Cart::new();
        let product = soda(20);

        cart.add_item(&product, 2, Some("Helada"), false).unwrap();
        cart.add_item(&product, 1, None, false).unwrap();
        cart.add_item(&product, 1, Some("Helada"), false).unwrap();

        assert_eq!(cart.item_count(), 2);
        assert_eq!(cart.total_quantity(), 4);
        assert_eq!(cart.total_cents(), 3 * 400 + 350);
    }

    #[test]
    fn test_box_and_unit_lines_share_stock() {
        let mut cart = Cart::new();
        let product = cigarettes(1, 4);

        cart.add_item(&product, 1, None, false).unwrap();
        cart.add_item(&product, 4, None, true).unwrap();
        assert_eq!(cart.units_for("cig"), 24);

        let err = cart.add_item(&product, 1, None, true).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock {
                available: 24,
                requested: 25,
                ..
            }
        ));
        assert_eq!(cart.item_count(), 2);
    }

    #[test]
    fn test_unit_line_on_plain_product_rejected() {
        let mut cart = Cart::new();
        let err = cart.add_item(&soda(5), 1, None, true).unwrap_err();
        assert!(matches!(err, CoreError::NotClosedProduct(_)));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_quantity_limit() {
        let mut cart = Cart::new();
        let product = soda(5000);
        cart.add_item(&product, 990, None, false).unwrap();
        let err = cart.add_item(&product, 10, None, false).unwrap_err();
        assert!(matches!(err, CoreError::QuantityTooLarge { requested: 1000, .. }));
    }

    #[test]
    fn test_cart_line_limit() {
        let mut cart = Cart::new();
        for i in 0..MAX_CART_ITEMS {
            let mut product = soda(10);
            product.id = format!("p-{}", i);
            cart.add_item(&product, 1, None, false).unwrap();
        }
        let mut extra = soda(10);
        extra.id = "extra".to_string();
        let err = cart.add_item(&extra, 1, None, false).unwrap_err();
        assert!(matches!(err, CoreError::CartTooLarge { .. }));
    }

    #[test]
    fn test_update_and_remove() {
        let mut cart = Cart::new();
        let product = soda(10);
        cart.add_item(&product, 2, None, false).unwrap();
        let key = cart.items[0].key();

        cart.update_quantity(&key, 5, Some(&product)).unwrap();
        assert_eq!(cart.total_quantity(), 5);

        assert!(cart.update_quantity(&key, 11, Some(&product)).is_err());
        assert_eq!(cart.total_quantity(), 5);

        cart.update_quantity(&key, 0, None).unwrap();
        assert!(cart.is_empty());
        assert!(cart.remove_item(&key).is_err());
    }

    #[test]
    fn test_validate_stock_with_fresh_levels() {
        let mut cart = Cart::new();
        cart.add_item(&cigarettes(2, 0), 2, None, false).unwrap();

        assert!(cart.validate_stock(|_| Some(cigarettes(2, 0))).is_ok());

        let err = cart.validate_stock(|_| Some(cigarettes(1, 19))).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientStock { .. }));

        let err = cart.validate_stock(|_| None).unwrap_err();
        assert!(matches!(err, CoreError::ProductNotFound(_)));
    }

    #[test]
    fn test_validate_stock_rejects_changed_packaging() {
        let mut cart = Cart::new();
        cart.add_item(&cigarettes(2, 0), 1, None, false).unwrap();

        // Box size went from 20 to 10.
        let mut repacked = cigarettes(4, 0);
        if let Some(closed) = repacked.closed.as_mut() {
            closed.units_per_box = 10;
        }
        let err = cart.validate_stock(|_| Some(repacked.clone())).unwrap_err();
        assert!(matches!(err, CoreError::StaleCartLine(_)));

        // Plain product later turned into a closed one.
        let mut cart = Cart::new();
        cart.add_item(&soda(30), 1, None, false).unwrap();
        let mut boxed = cigarettes(1, 10);
        boxed.id = "soda".to_string();
        let err = cart.validate_stock(|_| Some(boxed.clone())).unwrap_err();
        assert!(matches!(err, CoreError::StaleCartLine(_)));
    }

    #[test]
    fn test_sale_item_snapshot() {
        let mut cart = Cart::new();
        cart.add_item(&cigarettes(2, 0), 3, None, true).unwrap();
        let items = cart.to_sale_items();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].units, 3);
        assert_eq!(items[0].line_total_cents, 300);
        assert!(items[0].sold_by_unit);
        assert_eq!(items[0].category, "Cigarrillos");
    }
}
