//! # Input Validation
//!
//! Field checks shared by the cart, the catalog repositories and the bulk
//! importer. They run before anything touches stock; SQLite constraints
//! (UNIQUE barcode, CHECK stock >= 0) are the last line behind them.
//!
//! ```rust
//! use minimarket_core::validation::{validate_barcode, validate_quantity};
//!
//! validate_barcode("7751271001234").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use crate::error::ValidationError;
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY, MAX_UNITS_PER_BOX};

pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_BARCODE_LEN: usize = 50;
const MAX_QUERY_LEN: usize = 100;

/// EAN/UPC codes plus the store's own `INT-0042` style labels.
///
/// ```rust
/// use minimarket_core::validation::validate_barcode;
///
/// assert!(validate_barcode("INT-0042").is_ok());
/// assert!(validate_barcode("has space").is_err());
/// ```
pub fn validate_barcode(barcode: &str) -> ValidationResult<()> {
    let barcode = barcode.trim();
    if barcode.is_empty() {
        return Err(required("barcode"));
    }
    if barcode.len() > MAX_BARCODE_LEN {
        return Err(ValidationError::TooLong {
            field: "barcode".to_string(),
            max: MAX_BARCODE_LEN,
        });
    }
    if !barcode.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must contain only letters, numbers and hyphens".to_string(),
        });
    }
    Ok(())
}

pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    non_empty_text("name", name, 200)
}

/// Also used for subcategory names.
pub fn validate_category_name(name: &str) -> ValidationResult<()> {
    non_empty_text("category", name, 80)
}

/// Returns the trimmed query; empty is allowed and lists everything.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();
    if query.chars().count() > MAX_QUERY_LEN {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: MAX_QUERY_LEN,
        });
    }
    Ok(query.to_string())
}

/// A cart line: 1..=999 boxes or units.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(())
}

/// Counted, imported or stored units. Zero is fine, negative never is.
pub fn validate_stock_level(field: &str, units: i64) -> ValidationResult<()> {
    non_negative(field, units)
}

/// Zero is allowed for giveaways.
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    non_negative("price", cents)
}

pub fn validate_units_per_box(units: i64) -> ValidationResult<()> {
    if !(1..=MAX_UNITS_PER_BOX).contains(&units) {
        return Err(ValidationError::OutOfRange {
            field: "units per box".to_string(),
            min: 1,
            max: MAX_UNITS_PER_BOX,
        });
    }
    Ok(())
}

/// Checked before a new line is added, so `current_lines` excludes it.
pub fn validate_cart_size(current_lines: usize) -> ValidationResult<()> {
    if current_lines >= MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart items".to_string(),
            min: 0,
            max: MAX_CART_ITEMS as i64,
        });
    }
    Ok(())
}

fn required(field: &str) -> ValidationError {
    ValidationError::Required {
        field: field.to_string(),
    }
}

fn non_empty_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(required(field));
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

fn non_negative(field: &str, value: i64) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barcodes() {
        assert!(validate_barcode("7751271001234").is_ok());
        assert!(validate_barcode(" 7750182000123 ").is_ok());
        assert!(validate_barcode("   ").is_err());
        assert!(validate_barcode(&"7".repeat(51)).is_err());
        assert!(validate_barcode("775/001").is_err());
    }

    #[test]
    fn test_names_count_characters_not_bytes() {
        // 80 two-byte characters still fit a category name.
        assert!(validate_category_name(&"ñ".repeat(80)).is_ok());
        assert!(validate_category_name(&"ñ".repeat(81)).is_err());
        assert!(validate_product_name("Leche Gloria Azúcar 400g").is_ok());
        assert!(validate_product_name("").is_err());
    }

    #[test]
    fn test_quantity_bounds() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_non_negative_amounts() {
        assert!(validate_price_cents(0).is_ok());
        assert!(validate_price_cents(-1).is_err());
        assert!(validate_stock_level("stock", 0).is_ok());
        assert!(validate_stock_level("stock", -3).is_err());
    }

    #[test]
    fn test_box_size_and_cart_size() {
        assert!(validate_units_per_box(20).is_ok());
        assert!(validate_units_per_box(0).is_err());
        assert!(validate_units_per_box(MAX_UNITS_PER_BOX + 1).is_err());
        assert!(validate_cart_size(MAX_CART_ITEMS - 1).is_ok());
        assert!(validate_cart_size(MAX_CART_ITEMS).is_err());
    }

    #[test]
    fn test_search_query_trimmed() {
        assert_eq!(validate_search_query("  inca ").unwrap(), "inca");
        assert!(validate_search_query(&"x".repeat(101)).is_err());
    }
}
