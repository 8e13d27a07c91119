//! # Repository Module
//!
//! Database repository implementations for the minimarket terminal.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories over one SqlitePool                     │
//! │                                                                         │
//! │  Terminal command                                                      │
//! │       │  db.sales().record_checkout(request)                           │
//! │       ▼                                                                 │
//! │  SaleRepository ──┐                                                    │
//! │                   │ one transaction                                     │
//! │                   ├── product::fetch / write_stock                      │
//! │                   ├── inventory::insert_movement                        │
//! │                   ├── settings::get_in / set_in (receipt counters)      │
//! │                   └── sync::queue_in (outbox)                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Every repository is a cheap Clone over the pool. The connection-level │
//! │  helpers (`*_in`, `fetch`, `insert_row`) let one repository compose    │
//! │  another's SQL inside its own transaction.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Catalog CRUD and search
//! - [`category::CategoryRepository`] - Categories and subcategories
//! - [`sale::SaleRepository`] - Checkout, void, reprint, history
//! - [`inventory::InventoryRepository`] - Restock, physical counts, audit trail
//! - [`user::UserRepository`] - Users, roles, argon2 login
//! - [`settings::SettingsRepository`] - Key-value JSON settings
//! - [`sync::SyncOutboxRepository`] - Sync queue management

pub mod category;
pub mod inventory;
pub mod product;
pub mod sale;
pub mod settings;
pub mod sync;
pub mod user;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{DbError, DbResult};

/// Serializes a value for a JSON TEXT column.
pub(crate) fn to_json<T: Serialize + ?Sized>(what: &str, value: &T) -> DbResult<String> {
    serde_json::to_string(value).map_err(|e| DbError::corrupt(what, e))
}

/// Decodes a JSON TEXT column.
pub(crate) fn from_json<T: DeserializeOwned>(what: &str, text: &str) -> DbResult<T> {
    serde_json::from_str(text).map_err(|e| DbError::corrupt(what, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_columns_accept_unsized_values() {
        let names: &[&str] = &["Gaseosas", "Aguas"];
        let text = to_json("categories.subcategories", names).unwrap();
        assert_eq!(text, r#"["Gaseosas","Aguas"]"#);

        let back: Vec<String> = from_json("categories.subcategories", &text).unwrap();
        assert_eq!(back, vec!["Gaseosas", "Aguas"]);
        assert!(from_json::<Vec<String>>("categories.subcategories", "{").is_err());
    }
}
