//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Split payment in floating point:                                       │
//! │    cash 10.10 + wallet 20.20 = 30.299999999999997  ❌                   │
//! │    "paid - change == total" needs a tolerance to hold                   │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    1010 + 2020 = 3030 cents, always                                     │
//! │    The payment-balance rule holds exactly, no tolerance                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use minimarket_core::money::Money;
//!
//! let price = Money::from_cents(1099); // 10.99
//! let doubled = price * 2;             // 21.98
//! assert_eq!(doubled.cents(), 2198);
//!
//! // Parsing user/importer input
//! assert_eq!(Money::parse_decimal("12,50"), Some(Money::from_cents(1250)));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for shortages and voids
/// - **Single field tuple struct**: Zero-cost abstraction over i64
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Product.price_cents ──┬──► CartItem.unit_price ──► CartItem.line_total │
/// │  subcategory_prices ───┤                                                │
/// │  ClosedStock.unit_price┘                                                │
/// │                                                                         │
/// │  Cart.total ──► Settlement (cash / wallet / card) ──► change           │
/// │                                                                         │
/// │  Reconciliation shortage/surplus value, report revenue                  │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use minimarket_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// For negative amounts only the major unit should be negative:
    /// `from_major_minor(-5, 50)` is -5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Parses a decimal amount as typed by a cashier or found in an import
    /// file: `"12"`, `"12.5"`, `"12.50"`, `"12,50"`, `"-3.10"`.
    ///
    /// Returns `None` for anything with more than two decimals or
    /// non-numeric characters.
    ///
    /// ## Example
    /// ```rust
    /// use minimarket_core::money::Money;
    ///
    /// assert_eq!(Money::parse_decimal("3.5"), Some(Money::from_cents(350)));
    /// assert_eq!(Money::parse_decimal("3.555"), None);
    /// assert_eq!(Money::parse_decimal("abc"), None);
    /// ```
    pub fn parse_decimal(input: &str) -> Option<Money> {
        let s = input.trim().replace(',', ".");
        if s.is_empty() {
            return None;
        }

        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.as_str()),
        };

        let (major_str, minor_str) = match digits.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (digits, ""),
        };

        if major_str.is_empty() && minor_str.is_empty() {
            return None;
        }
        if minor_str.len() > 2 {
            return None;
        }
        if !major_str.chars().all(|c| c.is_ascii_digit())
            || !minor_str.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }

        let major: i64 = if major_str.is_empty() {
            0
        } else {
            major_str.parse().ok()?
        };
        let minor: i64 = match minor_str.len() {
            0 => 0,
            1 => minor_str.parse::<i64>().ok()? * 10,
            _ => minor_str.parse().ok()?,
        };

        let cents = major.checked_mul(100)?.checked_add(minor)?;
        Some(Money(if negative { -cents } else { cents }))
    }

    /// Returns the value in cents (smallest currency unit).
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use minimarket_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299);
    /// assert_eq!(unit_price.multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Rounds up to the next multiple of `step` (used for quick-cash
    /// suggestions: 17.30 → 20.00 with a 10.00 step).
    ///
    /// A non-positive step returns the value unchanged.
    pub fn round_up_to(&self, step: Money) -> Money {
        if step.0 <= 0 {
            return *self;
        }
        let rem = self.0.rem_euclid(step.0);
        if rem == 0 {
            *self
        } else {
            Money(self.0 + step.0 - rem)
        }
    }

    /// Formats the amount with a currency symbol, e.g. `S/ 12.50`.
    pub fn with_symbol(&self, symbol: &str) -> String {
        if symbol.is_empty() {
            return self.to_string();
        }
        if self.0 < 0 {
            format!("-{} {}", symbol, self.abs())
        } else {
            format!("{} {}", symbol, self)
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain decimal rendering (`12.50`, `-5.50`); the currency symbol is a
/// store setting and added by [`Money::with_symbol`].
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor(), 99);
    }

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
        assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::from_cents(-5).to_string(), "-0.05");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_with_symbol() {
        assert_eq!(Money::from_cents(1250).with_symbol("S/"), "S/ 12.50");
        assert_eq!(Money::from_cents(-1250).with_symbol("S/"), "-S/ 12.50");
        assert_eq!(Money::from_cents(1250).with_symbol(""), "12.50");
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(Money::parse_decimal("12"), Some(Money::from_cents(1200)));
        assert_eq!(Money::parse_decimal("12.5"), Some(Money::from_cents(1250)));
        assert_eq!(Money::parse_decimal("12,50"), Some(Money::from_cents(1250)));
        assert_eq!(Money::parse_decimal(" .75 "), Some(Money::from_cents(75)));
        assert_eq!(Money::parse_decimal("-3.10"), Some(Money::from_cents(-310)));

        assert_eq!(Money::parse_decimal(""), None);
        assert_eq!(Money::parse_decimal("."), None);
        assert_eq!(Money::parse_decimal("1.234"), None);
        assert_eq!(Money::parse_decimal("1.2.3"), None);
        assert_eq!(Money::parse_decimal("S/ 4"), None);
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);

        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    #[test]
    fn test_round_up_to() {
        let step = Money::from_cents(1000);
        assert_eq!(Money::from_cents(1730).round_up_to(step).cents(), 2000);
        assert_eq!(Money::from_cents(2000).round_up_to(step).cents(), 2000);
        assert_eq!(Money::from_cents(1).round_up_to(step).cents(), 1000);
        assert_eq!(Money::from_cents(1730).round_up_to(Money::zero()).cents(), 1730);
    }

    #[test]
    fn test_split_payment_is_exact() {
        // 10.10 + 20.20 must be exactly 30.30, unlike f64
        let cash = Money::from_cents(1010);
        let wallet = Money::from_cents(2020);
        assert_eq!((cash + wallet).cents(), 3030);
    }
}
