//! # minimarket-core: Pure Business Logic for Minimarket POS
//!
//! This crate holds every business rule of the terminal as pure functions
//! with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Minimarket POS Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              apps/terminal (state + commands + CLI)             │   │
//! │  │    scan ──► add_to_cart ──► checkout ──► receipt ──► sync      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            ★ minimarket-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │  stock  │ │  cart   │ │ payment │ │ reconc. │ │ report  │  │   │
//! │  │   │ box/unit│ │ pricing │ │  split  │ │  count  │ │ totals  │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │ receipt │ │  users  │ │categori.│ │ backup  │ │  money  │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 minimarket-db (Database Layer)                  │   │
//! │  │        SQLite queries, migrations, atomic transactions          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Sale, InventoryMovement, etc.)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`stock`] - Box/unit stock decrement, restock and counted levels
//! - [`cart`] - Cart lines, variant pricing, stock checks
//! - [`payment`] - Split payments and change
//! - [`reconciliation`] - Physical count vs. system stock
//! - [`report`] - Sales and inventory reports
//! - [`receipt`] - Receipt numbering and thermal text layout
//! - [`users`] - Roles and permissions
//! - [`categorize`] - Keyword categorizer for imports
//! - [`backup`] - Versioned backup snapshot
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Example Usage
//!
//! ```rust
//! use minimarket_core::stock::take_units;
//! use minimarket_core::ClosedStock;
//!
//! // 2 sealed boxes of 20 plus 3 loose cigarettes
//! let mut closed = ClosedStock { units_per_box: 20, boxes: 2, loose_units: 3, unit_price_cents: 100 };
//!
//! // Selling 5 loose units opens one box
//! let change = take_units(&mut closed, 5);
//! assert_eq!(change.boxes_opened, 1);
//! assert_eq!((closed.boxes, closed.loose_units), (1, 18));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backup;
pub mod cart;
pub mod categorize;
pub mod error;
pub mod money;
pub mod payment;
pub mod receipt;
pub mod reconciliation;
pub mod report;
pub mod stock;
pub mod types;
pub mod users;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use minimarket_core::Money` instead of
// `use minimarket_core::money::Money`

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single cart.
///
/// ## Business Reason
/// Prevents runaway carts and keeps receipts printable.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single cart line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10)
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Receipt series used until the store configures its own.
pub const DEFAULT_RECEIPT_SERIES: &str = "B001";

/// Maximum units a sealed box may contain.
pub const MAX_UNITS_PER_BOX: i64 = 1000;
