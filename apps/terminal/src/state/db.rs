//! # Database State
//!
//! Wraps the `Database` handle for commands.
//!
//! ## Thread Safety
//! `Database` holds a `SqlitePool`, so commands can run queries
//! concurrently without extra locking.

use minimarket_db::Database;

#[derive(Debug, Clone)]
pub struct DbState {
    db: Database,
}

impl DbState {
    pub fn new(db: Database) -> Self {
        DbState { db }
    }

    /// Returns a reference to the inner Database.
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let products = db_state.inner().products().search("inca", 20).await?;
    /// ```
    pub fn inner(&self) -> &Database {
        &self.db
    }
}
