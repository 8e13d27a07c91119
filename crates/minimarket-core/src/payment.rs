//! # Payment Module
//!
//! Split payments across cash, wallet and card, and the change owed.
//!
//! ## Settlement Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  total 17.50                                                            │
//! │                                                                         │
//! │  wallet 10.00 ─┐                                                        │
//! │  cash   10.00 ─┼──► tendered 20.00 ──► change 2.50 (≤ cash 10.00 ✓)     │
//! │                │                                                        │
//! │  wallet 20.00 ─┴──► tendered 20.00 ──► change 2.50 (> cash 0.00  ✗)     │
//! │                                                                         │
//! │  Invariant: tendered - change == total, in exact cents                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{PaymentEntry, PaymentMethod};

/// An accepted payment for a sale total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// One entry per method, in `PaymentMethod::ALL` order.
    pub payments: Vec<PaymentEntry>,
    pub total_cents: i64,
    pub change_cents: i64,
}

impl Settlement {
    pub fn tendered_cents(&self) -> i64 {
        self.payments.iter().map(|p| p.amount_cents).sum()
    }

    /// Amount tendered with `method`.
    pub fn amount_for(&self, method: PaymentMethod) -> i64 {
        self.payments
            .iter()
            .filter(|p| p.method == method)
            .map(|p| p.amount_cents)
            .sum()
    }
}

/// Validates a (possibly split) payment against a sale total.
///
/// ## Errors
/// - `InvalidPaymentAmount` for an empty list or a non-positive entry
/// - `InsufficientPayment` when the entries do not cover the total
/// - `NonCashOverpayment` when the change would exceed the cash tendered
///
/// ## Example
/// ```rust
/// use minimarket_core::payment::settle;
/// use minimarket_core::{PaymentEntry, PaymentMethod};
///
/// let settlement = settle(1750, &[
///     PaymentEntry::new(PaymentMethod::Wallet, 1000),
///     PaymentEntry::new(PaymentMethod::Cash, 1000),
/// ]).unwrap();
///
/// assert_eq!(settlement.change_cents, 250);
/// ```
pub fn settle(total_cents: i64, entries: &[PaymentEntry]) -> CoreResult<Settlement> {
    if total_cents < 0 {
        return Err(CoreError::InvalidPaymentAmount {
            reason: "sale total cannot be negative".to_string(),
        });
    }
    if entries.is_empty() {
        return Err(CoreError::InvalidPaymentAmount {
            reason: "at least one payment is required".to_string(),
        });
    }
    if let Some(bad) = entries.iter().find(|e| e.amount_cents <= 0) {
        return Err(CoreError::InvalidPaymentAmount {
            reason: format!("{} amount must be positive", bad.method),
        });
    }

    let payments: Vec<PaymentEntry> = PaymentMethod::ALL
        .iter()
        .filter_map(|method| {
            let amount: i64 = entries
                .iter()
                .filter(|e| e.method == *method)
                .map(|e| e.amount_cents)
                .sum();
            (amount > 0).then(|| PaymentEntry::new(*method, amount))
        })
        .collect();

    let tendered: i64 = payments.iter().map(|p| p.amount_cents).sum();
    if tendered < total_cents {
        return Err(CoreError::InsufficientPayment {
            total_cents,
            tendered_cents: tendered,
        });
    }

    let change_cents = tendered - total_cents;
    let cash: i64 = payments
        .iter()
        .filter(|p| p.method == PaymentMethod::Cash)
        .map(|p| p.amount_cents)
        .sum();
    if change_cents > cash {
        return Err(CoreError::NonCashOverpayment {
            excess_cents: change_cents,
            cash_cents: cash,
        });
    }

    Ok(Settlement {
        payments,
        total_cents,
        change_cents,
    })
}

/// Common bill denominations, in cents, for quick-cash buttons.
const BILLS: [i64; 5] = [1000, 2000, 5000, 10000, 20000];

/// Quick-cash suggestions for the payment modal: the exact amount, then
/// the total rounded up to the next whole unit and to each common bill,
/// deduplicated and ascending.
///
/// ## Example
/// ```rust
/// use minimarket_core::payment::quick_cash_options;
/// use minimarket_core::Money;
///
/// let options = quick_cash_options(Money::from_cents(1730));
/// let cents: Vec<i64> = options.iter().map(|m| m.cents()).collect();
/// assert_eq!(cents, vec![1730, 1800, 2000, 5000, 10000, 20000]);
/// ```
pub fn quick_cash_options(total: Money) -> Vec<Money> {
    if !total.is_positive() {
        return vec![Money::zero()];
    }

    let mut options = vec![total, total.round_up_to(Money::from_cents(100))];
    options.extend(
        BILLS
            .iter()
            .map(|bill| total.round_up_to(Money::from_cents(*bill))),
    );

    options.sort();
    options.dedup();
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cash(c: i64) -> PaymentEntry {
        PaymentEntry::new(PaymentMethod::Cash, c)
    }
    fn wallet(c: i64) -> PaymentEntry {
        PaymentEntry::new(PaymentMethod::Wallet, c)
    }
    fn card(c: i64) -> PaymentEntry {
        PaymentEntry::new(PaymentMethod::Card, c)
    }

    #[test]
    fn test_exact_single_method() {
        let s = settle(1750, &[card(1750)]).unwrap();
        assert_eq!(s.change_cents, 0);
        assert_eq!(s.payments, vec![card(1750)]);
    }

    #[test]
    fn test_split_with_cash_change() {
        let s = settle(1750, &[wallet(1000), cash(1000)]).unwrap();
        assert_eq!(s.change_cents, 250);
        assert_eq!(s.tendered_cents() - s.change_cents, s.total_cents);
        assert_eq!(s.payments, vec![cash(1000), wallet(1000)]);
    }

    #[test]
    fn test_same_method_merged() {
        let s = settle(3000, &[cash(1000), cash(2000), card(500)]).unwrap();
        assert_eq!(s.amount_for(PaymentMethod::Cash), 3000);
        assert_eq!(s.payments.len(), 2);
        assert_eq!(s.change_cents, 500);
    }

    #[test]
    fn test_insufficient_payment() {
        let err = settle(1750, &[cash(1000), wallet(500)]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientPayment {
                total_cents: 1750,
                tendered_cents: 1500
            }
        ));
    }

    #[test]
    fn test_non_cash_overpayment_rejected() {
        let err = settle(1750, &[wallet(2000)]).unwrap_err();
        assert!(matches!(err, CoreError::NonCashOverpayment { .. }));

        let err = settle(1750, &[cash(100), card(2000)]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::NonCashOverpayment {
                excess_cents: 350,
                cash_cents: 100
            }
        ));
    }

    #[test]
    fn test_invalid_entries() {
        assert!(settle(100, &[]).is_err());
        assert!(settle(100, &[cash(0)]).is_err());
        assert!(settle(100, &[cash(200), card(-50)]).is_err());
    }

    #[test]
    fn test_quick_cash_options() {
        let cents: Vec<i64> = quick_cash_options(Money::from_cents(2000))
            .iter()
            .map(|m| m.cents())
            .collect();
        assert_eq!(cents, vec![2000, 5000, 10000, 20000]);
        assert_eq!(quick_cash_options(Money::zero()), vec![Money::zero()]);
    }
}
