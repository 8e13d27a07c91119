//! # Terminal Commands
//!
//! Everything a UI shell or the CLI can ask the terminal to do.
//!
//! ## Command Organization
//! ```text
//! commands/
//! ├── mod.rs        ◄─── You are here (exports)
//! ├── cart.rs       ◄─── Cart manipulation (persisted between runs)
//! ├── sale.rs       ◄─── Checkout, void, reprint, quick cash
//! ├── product.rs    ◄─── Product search and CRUD
//! ├── category.rs   ◄─── Categories and subcategories
//! ├── inventory.rs  ◄─── Restock, physical counts, movement history
//! ├── report.rs     ◄─── Sales, low stock, expiry, valuation
//! ├── backup.rs     ◄─── JSON export / restore
//! ├── user.rs       ◄─── Login and user administration
//! ├── import.rs     ◄─── Bulk import and keyword categorizer
//! ├── config.rs     ◄─── Company config
//! └── sync.rs       ◄─── Sync status and control
//! ```
//!
//! ## How Commands Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  async fn add_to_cart(                                                  │
//! │      db: &DbState,             ◄── only the state it needs              │
//! │      cart: &CartState,                                                  │
//! │      session: &SessionState,   ◄── permission check first               │
//! │      request: AddToCartRequest,                                         │
//! │  ) -> Result<CartResponse, ApiError>                                    │
//! │         │                                                               │
//! │         ▼  (serde, camelCase)                                           │
//! │  UI / CLI receives CartResponse or { code, message }                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod backup;
pub mod cart;
pub mod category;
pub mod config;
pub mod import;
pub mod inventory;
pub mod product;
pub mod report;
pub mod sale;
pub mod sync;
pub mod user;
