//! # Reconciliation Module
//!
//! Physical stock counts compared against recorded stock.
//!
//! ## Count Session Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Clerk counts shelf        System stock         Line                    │
//! │  ────────────────          ────────────         ────                    │
//! │  Hamilton: 2 box + 11      60 units             51 - 60 = -9  theft     │
//! │  Inca Kola: 30 units       24 units             30 - 24 = +6  surplus   │
//! │  Galletas: 12 units        12 units              0            (none)    │
//! │                                                                         │
//! │  Each non-zero line becomes one adjustment movement with                │
//! │  delta == counted - system, written by minimarket-db.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reason Attribution
//! - positive difference: always `surplus`
//! - negative difference: the supplied reason, `miscount` if none;
//!   `surplus` cannot explain a shortage
//! - zero difference: no reason, no adjustment

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::Product;

pub use crate::stock::CountedQuantity;

// =============================================================================
// Discrepancy Reason
// =============================================================================

/// Why counted stock differs from recorded stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscrepancyReason {
    Theft,
    Spoilage,
    Miscount,
    Surplus,
}

impl DiscrepancyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscrepancyReason::Theft => "theft",
            DiscrepancyReason::Spoilage => "spoilage",
            DiscrepancyReason::Miscount => "miscount",
            DiscrepancyReason::Surplus => "surplus",
        }
    }
}

impl std::fmt::Display for DiscrepancyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DiscrepancyReason {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "theft" | "robo" | "hurto" => Ok(DiscrepancyReason::Theft),
            "spoilage" | "merma" | "vencido" | "damaged" => Ok(DiscrepancyReason::Spoilage),
            "miscount" | "error" | "conteo" => Ok(DiscrepancyReason::Miscount),
            "surplus" | "sobrante" => Ok(DiscrepancyReason::Surplus),
            _ => Err(crate::error::ValidationError::NotAllowed {
                field: "reason".to_string(),
                allowed: vec![
                    "theft".to_string(),
                    "spoilage".to_string(),
                    "miscount".to_string(),
                    "surplus".to_string(),
                ],
            }),
        }
    }
}

/// Attributes a reason to a signed difference.
///
/// ## Example
/// ```rust
/// use minimarket_core::reconciliation::{attribute_reason, DiscrepancyReason};
///
/// assert_eq!(attribute_reason(4, None).unwrap(), Some(DiscrepancyReason::Surplus));
/// assert_eq!(attribute_reason(-4, None).unwrap(), Some(DiscrepancyReason::Miscount));
/// assert_eq!(
///     attribute_reason(-4, Some(DiscrepancyReason::Theft)).unwrap(),
///     Some(DiscrepancyReason::Theft)
/// );
/// assert!(attribute_reason(-4, Some(DiscrepancyReason::Surplus)).is_err());
/// assert_eq!(attribute_reason(0, Some(DiscrepancyReason::Theft)).unwrap(), None);
/// ```
pub fn attribute_reason(
    difference: i64,
    supplied: Option<DiscrepancyReason>,
) -> CoreResult<Option<DiscrepancyReason>> {
    match difference.signum() {
        0 => Ok(None),
        1 => Ok(Some(DiscrepancyReason::Surplus)),
        _ => match supplied {
            Some(DiscrepancyReason::Surplus) => Err(CoreError::InvalidDiscrepancyReason {
                reason: DiscrepancyReason::Surplus.to_string(),
                difference,
            }),
            Some(reason) => Ok(Some(reason)),
            None => Ok(Some(DiscrepancyReason::Miscount)),
        },
    }
}

// =============================================================================
// Count Lines
// =============================================================================

/// One counted product as entered by the clerk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountEntry {
    pub product_id: String,
    pub counted: CountedQuantity,
    #[serde(default)]
    pub reason: Option<DiscrepancyReason>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Result of comparing one count against the system stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationLine {
    pub product_id: String,
    pub product_name: String,
    pub system_units: i64,
    pub counted_units: i64,
    /// `counted_units - system_units`.
    pub difference: i64,
    pub reason: Option<DiscrepancyReason>,
    /// Value of one unit (loose-unit price for closed products).
    pub unit_value_cents: i64,
    #[serde(default)]
    pub note: Option<String>,
}

impl ReconciliationLine {
    pub fn has_discrepancy(&self) -> bool {
        self.difference != 0
    }

    /// Signed value of the difference.
    pub fn value_cents(&self) -> i64 {
        self.difference * self.unit_value_cents
    }

    /// Text stored on the adjustment movement.
    pub fn movement_reason(&self) -> String {
        match (&self.reason, &self.note) {
            (Some(reason), Some(note)) => format!("count: {} ({})", reason, note),
            (Some(reason), None) => format!("count: {}", reason),
            (None, _) => "count: no difference".to_string(),
        }
    }
}

/// Compares a counted quantity with a product's recorded stock.
pub fn reconcile_line(product: &Product, entry: &CountEntry) -> CoreResult<ReconciliationLine> {
    let counted_units = entry.counted.total_units(product)?;
    let difference = counted_units - product.stock;
    let reason = attribute_reason(difference, entry.reason)?;

    Ok(ReconciliationLine {
        product_id: product.id.clone(),
        product_name: product.name.clone(),
        system_units: product.stock,
        counted_units,
        difference,
        reason,
        unit_value_cents: product.unit_value_cents(),
        note: entry
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string),
    })
}

// =============================================================================
// Session Summary
// =============================================================================

/// Totals for one reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonTotal {
    pub lines: usize,
    /// Absolute units attributed to the reason.
    pub units: i64,
    /// Absolute value attributed to the reason.
    pub value_cents: i64,
}

/// Summary of a count session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub lines_counted: usize,
    pub lines_with_discrepancy: usize,
    pub units_short: i64,
    pub units_over: i64,
    pub shortage_value_cents: i64,
    pub surplus_value_cents: i64,
    pub by_reason: BTreeMap<DiscrepancyReason, ReasonTotal>,
}

impl ReconciliationSummary {
    /// Surplus minus shortage value.
    pub fn net_value_cents(&self) -> i64 {
        self.surplus_value_cents - self.shortage_value_cents
    }
}

pub fn summarize(lines: &[ReconciliationLine]) -> ReconciliationSummary {
    let mut summary = ReconciliationSummary {
        lines_counted: lines.len(),
        ..Default::default()
    };

    for line in lines.iter().filter(|l| l.has_discrepancy()) {
        summary.lines_with_discrepancy += 1;

        let units = line.difference.abs();
        let value = line.value_cents().abs();
        if line.difference < 0 {
            summary.units_short += units;
            summary.shortage_value_cents += value;
        } else {
            summary.units_over += units;
            summary.surplus_value_cents += value;
        }

        if let Some(reason) = line.reason {
            let total = summary.by_reason.entry(reason).or_default();
            total.lines += 1;
            total.units += units;
            total.value_cents += value;
        }
    }

    summary
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClosedStock;
    use chrono::Utc;

    fn product(id: &str, stock: i64, price: i64) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {}", id),
            barcode: None,
            category: "Abarrotes".to_string(),
            subcategory: None,
            price_cents: price,
            subcategory_prices: Default::default(),
            cost_cents: None,
            stock,
            min_stock: 0,
            closed: None,
            expiration_date: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            sync_version: 0,
        }
    }

    fn entry(id: &str, units: i64, reason: Option<DiscrepancyReason>) -> CountEntry {
        CountEntry {
            product_id: id.to_string(),
            counted: CountedQuantity::Units { units },
            reason,
            note: None,
        }
    }

    #[test]
    fn test_reason_parsing() {
        assert_eq!("robo".parse::<DiscrepancyReason>().unwrap(), DiscrepancyReason::Theft);
        assert_eq!("Merma".parse::<DiscrepancyReason>().unwrap(), DiscrepancyReason::Spoilage);
        assert!("lost".parse::<DiscrepancyReason>().is_err());
    }

    #[test]
    fn test_shortage_line() {
        let p = product("a", 24, 350);
        let line = reconcile_line(&p, &entry("a", 20, Some(DiscrepancyReason::Spoilage))).unwrap();

        assert_eq!(line.difference, -4);
        assert_eq!(line.reason, Some(DiscrepancyReason::Spoilage));
        assert_eq!(line.value_cents(), -1400);
        assert_eq!(line.movement_reason(), "count: spoilage");
    }

    #[test]
    fn test_surplus_overrides_supplied_reason() {
        let p = product("a", 10, 100);
        let line = reconcile_line(&p, &entry("a", 13, Some(DiscrepancyReason::Theft))).unwrap();
        assert_eq!(line.reason, Some(DiscrepancyReason::Surplus));
    }

    #[test]
    fn test_surplus_reason_for_shortage_rejected() {
        let p = product("a", 10, 100);
        let err = reconcile_line(&p, &entry("a", 7, Some(DiscrepancyReason::Surplus))).unwrap_err();
        assert!(matches!(err, CoreError::InvalidDiscrepancyReason { difference: -3, .. }));
    }

    #[test]
    fn test_closed_product_counted_in_boxes() {
        let mut p = product("cig", 0, 1800);
        let closed = ClosedStock {
            units_per_box: 20,
            boxes: 3,
            loose_units: 0,
            unit_price_cents: 100,
        };
        p.stock = closed.total_units();
        p.closed = Some(closed);

        let count = CountEntry {
            product_id: "cig".to_string(),
            counted: CountedQuantity::Boxes {
                boxes: 2,
                loose_units: 11,
            },
            reason: Some(DiscrepancyReason::Theft),
            note: Some("  display case ".to_string()),
        };
        let line = reconcile_line(&p, &count).unwrap();

        assert_eq!(line.counted_units, 51);
        assert_eq!(line.difference, -9);
        assert_eq!(line.unit_value_cents, 100);
        assert_eq!(line.movement_reason(), "count: theft (display case)");
    }

    #[test]
    fn test_summary_totals() {
        let lines = vec![
            reconcile_line(&product("a", 24, 350), &entry("a", 20, Some(DiscrepancyReason::Theft))).unwrap(),
            reconcile_line(&product("b", 10, 200), &entry("b", 12, None)).unwrap(),
            reconcile_line(&product("c", 5, 500), &entry("c", 5, None)).unwrap(),
            reconcile_line(&product("d", 8, 100), &entry("d", 6, None)).unwrap(),
        ];
        let summary = summarize(&lines);

        assert_eq!(summary.lines_counted, 4);
        assert_eq!(summary.lines_with_discrepancy, 3);
        assert_eq!(summary.units_short, 6);
        assert_eq!(summary.units_over, 2);
        assert_eq!(summary.shortage_value_cents, 1400 + 200);
        assert_eq!(summary.surplus_value_cents, 400);
        assert_eq!(summary.net_value_cents(), -1200);

        assert_eq!(summary.by_reason[&DiscrepancyReason::Theft].units, 4);
        assert_eq!(summary.by_reason[&DiscrepancyReason::Miscount].value_cents, 200);
        assert_eq!(summary.by_reason[&DiscrepancyReason::Surplus].lines, 1);
        assert!(!summary.by_reason.contains_key(&DiscrepancyReason::Spoilage));
    }
}
