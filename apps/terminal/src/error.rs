//! # API Error Type
//!
//! Unified error type for terminal commands.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Minimarket POS                         │
//! │                                                                         │
//! │  Command Function: Result<T, ApiError>                                  │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  Database Error? ── DbError::QueryFailed("...") ────────┐               │
//! │         │                                               │               │
//! │         ▼                                               ▼               │
//! │  Business Rule? ── CoreError::InsufficientStock ──► ApiError { code,    │
//! │         │                                               message }       │
//! │         ▼                                               │               │
//! │  Sync Error? ──── SyncError::StoreUnavailable ──────────┘               │
//! │                                                                         │
//! │  UI: switch (e.code) { case "INSUFFICIENT_STOCK": alert(e.message) }    │
//! │  CLI: anyhow::Error with the message as context                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use minimarket_core::{CoreError, ValidationError};
use minimarket_db::DbError;
use minimarket_sync::SyncError;
use serde::Serialize;

/// API error returned from terminal commands.
///
/// ## Serialization
/// ```json
/// {
///   "code": "INSUFFICIENT_STOCK",
///   "message": "Insufficient stock for Hamilton Azul: available 14, requested 20"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Resource not found
    NotFound,

    /// Input validation failed
    ValidationError,

    /// Database operation failed
    DatabaseError,

    /// Business rule rejected the operation
    BusinessLogic,

    /// Internal error
    Internal,

    /// Cart limits
    CartError,

    /// Not enough stock for the cart or checkout
    InsufficientStock,

    /// Payment split rejected
    PaymentError,

    /// No user logged in, or bad credentials
    Unauthenticated,

    /// Logged-in user lacks the permission
    PermissionDenied,

    /// Cloud sync failed
    SyncError,

    /// Backup file rejected
    BackupError,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(
            ErrorCode::NotFound,
            format!("{} not found: {}", resource, id),
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Unauthenticated, message)
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } if value.is_empty() => {
                ApiError::validation(format!("{} already exists", field))
            }
            DbError::UniqueViolation { field, value } => {
                ApiError::validation(format!("{} '{}' already exists", field, value))
            }
            DbError::Rule(e) => ApiError::from(e),
            DbError::InvalidCredentials => {
                ApiError::unauthenticated("Invalid username or password")
            }
            DbError::ForeignKeyViolation { message } => {
                tracing::warn!("Reference still in use: {}", message);
                ApiError::new(ErrorCode::BusinessLogic, format!("Still in use: {}", message))
            }
            DbError::Corrupt { what, reason } => {
                tracing::error!(what = %what, reason = %reason, "Corrupt stored data");
                ApiError::new(ErrorCode::DatabaseError, format!("Stored {} is unreadable", what))
            }
            DbError::ConnectionFailed(_) => {
                ApiError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            DbError::MigrationFailed(_) => {
                ApiError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            DbError::QueryFailed(e) => {
                // Log the actual error but return a generic message
                tracing::error!("Database query failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            DbError::PoolExhausted => {
                ApiError::new(ErrorCode::DatabaseError, "Database pool exhausted")
            }
            DbError::Internal(e) => {
                tracing::error!("Internal database error: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        let code = match err {
            CoreError::ProductNotFound(id) => return ApiError::not_found("Product", &id),
            CoreError::SaleNotFound(id) => return ApiError::not_found("Sale", &id),
            CoreError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            CoreError::CartTooLarge { .. }
            | CoreError::EmptyCart
            | CoreError::StaleCartLine(_) => ErrorCode::CartError,
            CoreError::QuantityTooLarge { .. }
            | CoreError::NotClosedProduct(_)
            | CoreError::InvalidDiscrepancyReason { .. }
            | CoreError::Validation(_) => ErrorCode::ValidationError,
            CoreError::InvalidPaymentAmount { .. }
            | CoreError::InsufficientPayment { .. }
            | CoreError::NonCashOverpayment { .. } => ErrorCode::PaymentError,
            CoreError::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            CoreError::SaleAlreadyVoided(_) | CoreError::LastAdmin => ErrorCode::BusinessLogic,
            CoreError::UnsupportedBackupVersion { .. } | CoreError::InvalidBackup(_) => {
                ErrorCode::BackupError
            }
        };
        ApiError::new(code, message)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        if err.is_config_error() {
            return ApiError::validation(err.to_string());
        }
        ApiError::new(ErrorCode::SyncError, err.to_string())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_error_code() {
        let err: ApiError = CoreError::InsufficientStock {
            product: "Hamilton Azul".into(),
            available: 14,
            requested: 20,
        }
        .into();
        assert_eq!(err.code, ErrorCode::InsufficientStock);
        assert!(err.message.contains("Hamilton Azul"));
    }

    #[test]
    fn test_rule_inside_db_error_keeps_code() {
        let err: ApiError = DbError::Rule(CoreError::NonCashOverpayment {
            excess_cents: 500,
            cash_cents: 0,
        })
        .into();
        assert_eq!(err.code, ErrorCode::PaymentError);

        let err: ApiError = DbError::InvalidCredentials.into();
        assert_eq!(err.code, ErrorCode::Unauthenticated);
    }

    #[test]
    fn test_serializes_screaming_code() {
        let json = serde_json::to_value(ApiError::not_found("Sale", "s1")).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");
        assert_eq!(json["message"], "Sale not found: s1");
    }
}
