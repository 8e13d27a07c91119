//! # Domain Types
//!
//! Core domain types used throughout Minimarket POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │ PaymentEntry    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  method         │       │
//! │  │  barcode        │   │  receipt_number │   │  amount_cents   │       │
//! │  │  price_cents    │   │  items (snap)   │   └─────────────────┘       │
//! │  │  stock          │   │  payments       │                             │
//! │  │  closed? ───────┼─┐ │  change_cents   │   ┌─────────────────┐       │
//! │  └─────────────────┘ │ │  voided         │   │InventoryMovement│       │
//! │                      │ └─────────────────┘   │  ─────────────  │       │
//! │  ┌─────────────────┐ │                       │  kind, delta    │       │
//! │  │  ClosedStock    │◄┘ ┌─────────────────┐   │  before / after │       │
//! │  │  units_per_box  │   │    Category     │   │  reason, actor  │       │
//! │  │  boxes, loose   │   │  subcategories  │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Closed (box/unit) Stock
// =============================================================================

/// Box/unit split for products sold both by sealed box and by loose unit
/// (cigarettes, candy displays, egg trays).
///
/// ## Invariant
/// The owning product's `stock` is always
/// `boxes * units_per_box + loose_units`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedStock {
    /// Units contained in one sealed box (≥ 1).
    pub units_per_box: i64,

    /// Sealed boxes on hand.
    pub boxes: i64,

    /// Loose units from opened boxes.
    pub loose_units: i64,

    /// Price of one loose unit, in cents. The box price is the product's
    /// `price_cents`.
    pub unit_price_cents: i64,
}

impl ClosedStock {
    /// Total units represented by boxes and loose units.
    #[inline]
    pub fn total_units(&self) -> i64 {
        self.boxes * self.units_per_box + self.loose_units
    }

    /// Returns the loose-unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product available for sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name shown to cashier and on receipt.
    pub name: String,

    /// Barcode (EAN-13, UPC-A, internal code).
    #[serde(default)]
    pub barcode: Option<String>,

    /// Category name.
    #[serde(default)]
    pub category: String,

    /// Default subcategory, if the product belongs to one.
    #[serde(default)]
    pub subcategory: Option<String>,

    /// Base price in cents (box price for closed products).
    pub price_cents: i64,

    /// Per-subcategory price overrides (variant pricing).
    #[serde(default)]
    pub subcategory_prices: BTreeMap<String, i64>,

    /// Cost in cents (for stock valuation).
    #[serde(default)]
    pub cost_cents: Option<i64>,

    /// Current stock in units.
    pub stock: i64,

    /// Low-stock alert threshold in units.
    #[serde(default)]
    pub min_stock: i64,

    /// Box/unit split when the product is sold "closed".
    #[serde(default)]
    pub closed: Option<ClosedStock>,

    /// Expiration date of the current lot.
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,

    /// Whether product is active (soft delete).
    #[serde(default = "default_true")]
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Incremented on every local change, sent with cloud sync.
    #[serde(default)]
    pub sync_version: i64,
}

fn default_true() -> bool {
    true
}

impl Product {
    /// Returns the base price as Money.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Whether the product is sold both by box and by unit.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    /// Units contained in one sale quantity: `units_per_box` for a box of a
    /// closed product, 1 otherwise.
    pub fn units_per_quantity(&self, sold_by_unit: bool) -> i64 {
        match self.closed {
            Some(closed) if !sold_by_unit => closed.units_per_box,
            _ => 1,
        }
    }

    /// Price of one loose unit: the closed unit price, or the base price.
    pub fn unit_value_cents(&self) -> i64 {
        self.closed
            .map(|c| c.unit_price_cents)
            .unwrap_or(self.price_cents)
    }

    /// Checks whether `units` can be taken from stock.
    #[inline]
    pub fn can_sell(&self, units: i64) -> bool {
        self.stock >= units
    }

    /// Whether the stock is at or below the alert threshold.
    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.min_stock
    }

    /// Days until the product expires (negative once expired).
    pub fn days_until_expiry(&self, today: NaiveDate) -> Option<i64> {
        self.expiration_date
            .map(|date| date.signed_duration_since(today).num_days())
    }

    /// Checks the closed-stock invariant (always true for plain products).
    pub fn stock_is_consistent(&self) -> bool {
        match self.closed {
            Some(closed) => {
                closed.units_per_box >= 1
                    && closed.boxes >= 0
                    && closed.loose_units >= 0
                    && self.stock == closed.total_units()
            }
            None => self.stock >= 0,
        }
    }
}

// =============================================================================
// Category
// =============================================================================

/// A product category with its ordered subcategory names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub subcategories: Vec<String>,
}

impl Category {
    /// Whether `name` is one of this category's subcategories
    /// (case-insensitive).
    pub fn has_subcategory(&self, name: &str) -> bool {
        self.subcategories
            .iter()
            .any(|s| s.eq_ignore_ascii_case(name.trim()))
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How a portion of a sale was paid.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash. The only method change can be given from.
    Cash,
    /// Mobile wallet transfer (QR / phone number).
    Wallet,
    /// Card on an external terminal.
    Card,
}

impl PaymentMethod {
    /// All methods, in the order reports list them.
    pub const ALL: [PaymentMethod; 3] =
        [PaymentMethod::Cash, PaymentMethod::Wallet, PaymentMethod::Card];

    /// Stable lowercase name (database and report keys).
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::Card => "card",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" | "efectivo" => Ok(PaymentMethod::Cash),
            "wallet" | "yape" | "plin" | "transfer" => Ok(PaymentMethod::Wallet),
            "card" | "credit" | "debit" | "tarjeta" => Ok(PaymentMethod::Card),
            _ => Err(crate::error::ValidationError::NotAllowed {
                field: "payment method".to_string(),
                allowed: PaymentMethod::ALL
                    .iter()
                    .map(|m| m.as_str().to_string())
                    .collect(),
            }),
        }
    }
}

/// One payment method entry of a (possibly split) payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEntry {
    pub method: PaymentMethod,
    pub amount_cents: i64,
}

impl PaymentEntry {
    pub fn new(method: PaymentMethod, amount_cents: i64) -> Self {
        PaymentEntry {
            method,
            amount_cents,
        }
    }

    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A line item in a sale.
/// Uses snapshot pattern to freeze product data at time of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleItem {
    pub product_id: String,
    /// Product name at time of sale (frozen).
    pub name: String,
    /// Category at time of sale (frozen, used by reports).
    #[serde(default)]
    pub category: String,
    /// Selected subcategory (variant), if any.
    #[serde(default)]
    pub subcategory: Option<String>,
    /// Quantity sold, in boxes or units.
    pub quantity: i64,
    /// Whether a closed product was sold by loose unit.
    #[serde(default)]
    pub sold_by_unit: bool,
    /// Units taken from stock for this line.
    pub units: i64,
    /// Unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,
    /// unit_price × quantity.
    pub line_total_cents: i64,
}

impl SaleItem {
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

/// A completed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: String,
    /// Formatted receipt number, e.g. `B001-00000042`.
    pub receipt_number: String,
    pub created_at: DateTime<Utc>,
    pub items: Vec<SaleItem>,
    pub total_cents: i64,
    pub payments: Vec<PaymentEntry>,
    pub change_cents: i64,
    pub cashier_id: String,
    #[serde(default)]
    pub voided: bool,
    #[serde(default)]
    pub voided_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub void_reason: Option<String>,
    #[serde(default)]
    pub reprint_count: i64,
    #[serde(default)]
    pub sync_version: i64,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Sum of all payment entries.
    pub fn tendered(&self) -> Money {
        self.payments.iter().map(|p| p.amount()).sum()
    }

    /// Payment-balance rule: `tendered - change == total`.
    pub fn is_balanced(&self) -> bool {
        self.tendered() - Money::from_cents(self.change_cents) == self.total()
    }

    /// Total units sold across all lines.
    pub fn total_units(&self) -> i64 {
        self.items.iter().map(|i| i.units).sum()
    }
}

// =============================================================================
// Inventory Movement
// =============================================================================

/// Why stock changed.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Units sold at checkout.
    Sale,
    /// Goods received.
    Restock,
    /// Physical count correction or manual adjustment.
    Adjustment,
    /// Units returned to stock when a sale is voided.
    VoidReturn,
    /// Initial stock from the bulk importer.
    Import,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Sale => "sale",
            MovementKind::Restock => "restock",
            MovementKind::Adjustment => "adjustment",
            MovementKind::VoidReturn => "void_return",
            MovementKind::Import => "import",
        }
    }
}

/// Audit record of one stock change.
///
/// ## Invariant
/// `delta == quantity_after - quantity_before`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub id: String,
    pub product_id: String,
    pub kind: MovementKind,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub delta: i64,
    /// Box count after the change (closed products).
    #[serde(default)]
    pub boxes_after: Option<i64>,
    /// Loose units after the change (closed products).
    #[serde(default)]
    pub loose_units_after: Option<i64>,
    pub reason: String,
    /// Sale id or count session id that caused the movement.
    #[serde(default)]
    pub reference: Option<String>,
    /// User who performed the change.
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Sync Outbox
// =============================================================================

/// An entry in the sync outbox queue.
/// Uses outbox pattern for reliable sync with the cloud document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutboxEntry {
    pub id: String,
    /// Type of entity being synced: "SALE", "PRODUCT", "MOVEMENT", etc.
    pub entity_type: String,
    /// ID of the entity being synced.
    pub entity_id: String,
    /// The full entity data as JSON.
    pub payload: String,
    /// Number of sync attempts.
    pub attempts: i64,
    /// Last error message if sync failed.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub synced_at: Option<DateTime<Utc>>,
}

/// Entity type tags used in the outbox and as cloud collection names.
pub mod entity {
    pub const PRODUCT: &str = "PRODUCT";
    pub const CATEGORY: &str = "CATEGORY";
    pub const SALE: &str = "SALE";
    pub const MOVEMENT: &str = "MOVEMENT";
    pub const USER: &str = "USER";
    pub const SETTINGS: &str = "SETTINGS";
}

// =============================================================================
// Company Configuration
// =============================================================================

/// Store identity printed on receipts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyConfig {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub receipt_footer: Option<String>,
    /// Receipt series, e.g. `B001`.
    #[serde(default = "default_series")]
    pub receipt_series: String,
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
    /// Offset applied to UTC timestamps on receipts and daily reports.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

fn default_series() -> String {
    crate::DEFAULT_RECEIPT_SERIES.to_string()
}

fn default_currency_symbol() -> String {
    "S/".to_string()
}

impl Default for CompanyConfig {
    fn default() -> Self {
        CompanyConfig {
            name: "Minimarket".to_string(),
            address: None,
            tax_id: None,
            phone: None,
            receipt_footer: Some("Gracias por su compra".to_string()),
            receipt_series: default_series(),
            currency_symbol: default_currency_symbol(),
            utc_offset_minutes: 0,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_product(boxes: i64, loose: i64) -> Product {
        let closed = ClosedStock {
            units_per_box: 20,
            boxes,
            loose_units: loose,
            unit_price_cents: 100,
        };
        Product {
            id: "p-1".to_string(),
            name: "Hamilton Azul".to_string(),
            barcode: None,
            category: "Cigarrillos".to_string(),
            subcategory: None,
            price_cents: 1800,
            subcategory_prices: BTreeMap::new(),
            cost_cents: None,
            stock: closed.total_units(),
            min_stock: 20,
            closed: Some(closed),
            expiration_date: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            sync_version: 0,
        }
    }

    #[test]
    fn test_closed_stock_total() {
        let product = closed_product(3, 7);
        assert_eq!(product.stock, 67);
        assert!(product.stock_is_consistent());
        assert_eq!(product.units_per_quantity(false), 20);
        assert_eq!(product.units_per_quantity(true), 1);
        assert_eq!(product.unit_value_cents(), 100);
    }

    #[test]
    fn test_inconsistent_stock_detected() {
        let mut product = closed_product(3, 7);
        product.stock = 60;
        assert!(!product.stock_is_consistent());
    }

    #[test]
    fn test_days_until_expiry() {
        let mut product = closed_product(1, 0);
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert_eq!(product.days_until_expiry(today), None);

        product.expiration_date = NaiveDate::from_ymd_opt(2026, 3, 11);
        assert_eq!(product.days_until_expiry(today), Some(10));

        product.expiration_date = NaiveDate::from_ymd_opt(2026, 2, 27);
        assert_eq!(product.days_until_expiry(today), Some(-2));
    }

    #[test]
    fn test_payment_method_parsing() {
        assert_eq!("cash".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cash);
        assert_eq!("Yape".parse::<PaymentMethod>().unwrap(), PaymentMethod::Wallet);
        assert_eq!("debit".parse::<PaymentMethod>().unwrap(), PaymentMethod::Card);
        assert!("cheque".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_sale_balance() {
        let sale = Sale {
            id: "s-1".to_string(),
            receipt_number: "B001-00000001".to_string(),
            created_at: Utc::now(),
            items: vec![],
            total_cents: 1750,
            payments: vec![
                PaymentEntry::new(PaymentMethod::Wallet, 1000),
                PaymentEntry::new(PaymentMethod::Cash, 1000),
            ],
            change_cents: 250,
            cashier_id: "u-1".to_string(),
            voided: false,
            voided_at: None,
            void_reason: None,
            reprint_count: 0,
            sync_version: 0,
        };
        assert_eq!(sale.tendered().cents(), 2000);
        assert!(sale.is_balanced());
    }

    #[test]
    fn test_category_has_subcategory() {
        let category = Category {
            id: "c-1".to_string(),
            name: "Bebidas".to_string(),
            subcategories: vec!["Gaseosas".to_string(), "Agua".to_string()],
        };
        assert!(category.has_subcategory("gaseosas"));
        assert!(!category.has_subcategory("Cervezas"));
    }
}
