//! # Database Errors
//!
//! ```text
//!  sqlx::Error ───────────┐
//!  MigrateError ──────────┼──► DbError ──► ApiError (terminal)
//!  CoreError (rule hit    │
//!   inside a transaction)─┘
//! ```
//!
//! SQLite reports constraint failures only as text, so the mapping below
//! reads the message to tell a duplicate barcode from a category still in
//! use.

use minimarket_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Barcode, username or receipt number already taken.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Deleting something other rows still point at (a category with
    /// products, a product with sales).
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Insufficient stock, last admin, bad count reason and friends,
    /// detected while a transaction was open.
    #[error(transparent)]
    Rule(#[from] CoreError),

    #[error("Invalid username or password")]
    InvalidCredentials,

    /// A JSON column or settings value that no longer decodes.
    #[error("Corrupt {what}: {reason}")]
    Corrupt { what: String, reason: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    pub(crate) fn corrupt(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        DbError::Corrupt {
            what: what.into(),
            reason: err.to_string(),
        }
    }
}

/// Maps a SQLite error message onto the constraint variants.
fn from_sqlite_message(msg: &str) -> DbError {
    if let Some(columns) = msg.strip_prefix("UNIQUE constraint failed: ") {
        // "products.barcode" -> "barcode"
        let field = columns
            .split(", ")
            .map(|c| c.rsplit('.').next().unwrap_or(c))
            .collect::<Vec<_>>()
            .join(", ");
        return DbError::UniqueViolation {
            field,
            value: String::new(),
        };
    }
    if msg.contains("FOREIGN KEY constraint failed") {
        return DbError::ForeignKeyViolation {
            message: msg.to_string(),
        };
    }
    DbError::QueryFailed(msg.to_string())
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),
            sqlx::Error::Database(db_err) => from_sqlite_message(db_err.message()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<minimarket_core::ValidationError> for DbError {
    fn from(err: minimarket_core::ValidationError) -> Self {
        DbError::Rule(CoreError::Validation(err))
    }
}

pub type DbResult<T> = Result<T, DbError>;
