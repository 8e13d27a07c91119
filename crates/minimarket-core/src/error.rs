//! # Error Types
//!
//! ```text
//!  ValidationError ──► CoreError ──► DbError::Rule ──► ApiError
//!  (one bad field)     (a business      (raised inside    (code +
//!                       rule said no)    a transaction)    message)
//! ```

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Unknown id or barcode, or a soft-deleted product.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Requested units exceed stock. For a closed product `requested` is in
    /// units, so one box of 20 against 14 loose reads "requested 20".
    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// `sold_by_unit` on a product without box packaging.
    #[error("Product {0} is not sold by box/unit")]
    NotClosedProduct(String),

    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    #[error("Sale {0} is already voided")]
    SaleAlreadyVoided(String),

    #[error("Cart is empty")]
    EmptyCart,

    /// The product's packaging changed after the line was added, so the
    /// units the line would take no longer match.
    #[error("Product {0} changed since it was added to the cart; add it again")]
    StaleCartLine(String),

    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    #[error("Invalid payment amount: {reason}")]
    InvalidPaymentAmount { reason: String },

    #[error("Insufficient payment: total {total_cents}, tendered {tendered_cents}")]
    InsufficientPayment {
        total_cents: i64,
        tendered_cents: i64,
    },

    /// Change only comes out of the cash drawer.
    #[error("Overpayment of {excess_cents} exceeds the cash tendered ({cash_cents})")]
    NonCashOverpayment { excess_cents: i64, cash_cents: i64 },

    /// E.g. `surplus` on a count that came up short.
    #[error("Reason {reason} does not apply to a difference of {difference}")]
    InvalidDiscrepancyReason { reason: String, difference: i64 },

    #[error("User {user} lacks permission: {permission}")]
    PermissionDenied { user: String, permission: String },

    #[error("Cannot remove or demote the last active administrator")]
    LastAdmin,

    #[error("Unsupported backup format version {found} (supported up to {supported})")]
    UnsupportedBackupVersion { found: u32, supported: u32 },

    #[error("Invalid backup: {0}")]
    InvalidBackup(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_message_names_product() {
        let err = CoreError::InsufficientStock {
            product: "Hamilton Azul".to_string(),
            available: 14,
            requested: 20,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Hamilton Azul: available 14, requested 20"
        );
    }

    #[test]
    fn test_validation_wraps_into_core() {
        let err: CoreError = ValidationError::TooShort {
            field: "password".to_string(),
            min: 6,
        }
        .into();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "Validation error: password must be at least 6 characters"
        );
    }
}
