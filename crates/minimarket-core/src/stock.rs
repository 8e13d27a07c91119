//! # Stock Module
//!
//! Box/unit stock arithmetic for every product stock mutation.
//!
//! ## Closed Products
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  "Closed" product: sold by sealed box OR by loose unit                  │
//! │                                                                         │
//! │   ┌──────┐ ┌──────┐               loose: ▮▮▮                            │
//! │   │ 20u  │ │ 20u  │   + 3 loose    stock = 2 × 20 + 3 = 43              │
//! │   └──────┘ └──────┘                                                     │
//! │                                                                         │
//! │  Sell 5 units:                                                          │
//! │   1. take 3 from loose              loose 0, deficit 2                  │
//! │   2. open one box                   boxes 1, loose 20                   │
//! │   3. take 2 from loose              loose 18, deficit 0                 │
//! │                                                                         │
//! │   result: boxes 1, loose 18, stock 38 (43 - 5)                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The policy is greedy: boxes are opened one at a time only when loose
//! units run out. All quantities are floored at zero, so a sale that
//! exceeds stock empties the product instead of going negative. Checkout
//! validates stock first, so the floor only matters for stale carts.
//!
//! After every mutation a closed product's `stock` is recomputed from
//! `boxes * units_per_box + loose_units`.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{ClosedStock, Product};
use crate::validation::validate_units_per_box;

// =============================================================================
// Snapshots
// =============================================================================

/// Stock level of a product at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub stock: i64,
    pub boxes: Option<i64>,
    pub loose_units: Option<i64>,
}

impl StockSnapshot {
    pub fn of(product: &Product) -> Self {
        StockSnapshot {
            stock: product.stock,
            boxes: product.closed.map(|c| c.boxes),
            loose_units: product.closed.map(|c| c.loose_units),
        }
    }
}

/// Outcome of a stock mutation, used to write the paired movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub before: StockSnapshot,
    pub after: StockSnapshot,
    /// Units asked for (positive for removals and additions alike).
    pub units_requested: i64,
    /// Units actually removed or added.
    pub units_deducted: i64,
    /// Boxes opened to cover the request.
    pub boxes_opened: i64,
}

impl StockChange {
    /// Signed change in total units (`after - before`).
    #[inline]
    pub fn delta(&self) -> i64 {
        self.after.stock - self.before.stock
    }

    /// Whether the request could not be fully covered.
    #[inline]
    pub fn is_short(&self) -> bool {
        self.units_deducted < self.units_requested
    }
}

/// Result of taking units from a box/unit split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitTake {
    pub units_requested: i64,
    pub units_deducted: i64,
    pub boxes_opened: i64,
}

// =============================================================================
// Core Algorithm
// =============================================================================

/// Takes `units` from a box/unit split: loose units first, then opening
/// one box at a time until the deficit is covered or boxes run out.
///
/// ## Example
/// ```rust
/// use minimarket_core::stock::take_units;
/// use minimarket_core::ClosedStock;
///
/// let mut closed = ClosedStock { units_per_box: 10, boxes: 1, loose_units: 0, unit_price_cents: 50 };
/// let take = take_units(&mut closed, 25);
///
/// // Only 10 units existed: everything is floored at zero
/// assert_eq!(take.units_deducted, 10);
/// assert_eq!((closed.boxes, closed.loose_units), (0, 0));
/// ```
pub fn take_units(closed: &mut ClosedStock, units: i64) -> UnitTake {
    let requested = units.max(0);
    let mut deficit = requested;
    let mut boxes_opened = 0;

    let from_loose = closed.loose_units.max(0).min(deficit);
    closed.loose_units -= from_loose;
    deficit -= from_loose;

    while deficit > 0 && closed.boxes > 0 {
        closed.boxes -= 1;
        closed.loose_units += closed.units_per_box;
        boxes_opened += 1;

        let taken = closed.loose_units.min(deficit);
        closed.loose_units -= taken;
        deficit -= taken;
    }

    closed.boxes = closed.boxes.max(0);
    closed.loose_units = closed.loose_units.max(0);

    UnitTake {
        units_requested: requested,
        units_deducted: requested - deficit,
        boxes_opened,
    }
}

/// Removes `units` from a product's stock.
///
/// Closed products go through [`take_units`]; plain products decrement
/// `stock` directly. Both floor at zero.
pub fn remove_units(product: &mut Product, units: i64) -> CoreResult<StockChange> {
    if units < 0 {
        return Err(ValidationError::MustBePositive {
            field: "units".to_string(),
        }
        .into());
    }

    let before = StockSnapshot::of(product);

    let take = match product.closed.as_mut() {
        Some(closed) => {
            let take = take_units(closed, units);
            product.stock = closed.total_units();
            take
        }
        None => {
            let available = product.stock.max(0);
            let deducted = units.min(available);
            product.stock = available - deducted;
            UnitTake {
                units_requested: units,
                units_deducted: deducted,
                boxes_opened: 0,
            }
        }
    };

    Ok(StockChange {
        before,
        after: StockSnapshot::of(product),
        units_requested: take.units_requested,
        units_deducted: take.units_deducted,
        boxes_opened: take.boxes_opened,
    })
}

/// Decrements stock for a sale line of `quantity` boxes (or units when
/// `sold_by_unit` is set).
///
/// ## Errors
/// - `NotClosedProduct` when `sold_by_unit` is set on a plain product
/// - `Validation` when `quantity` is not positive, or so large the unit
///   count overflows
pub fn decrement(product: &mut Product, quantity: i64, sold_by_unit: bool) -> CoreResult<StockChange> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }
    if sold_by_unit && !product.is_closed() {
        return Err(CoreError::NotClosedProduct(product.name.clone()));
    }

    let units = quantity
        .checked_mul(product.units_per_quantity(sold_by_unit))
        .ok_or_else(|| ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: i64::MAX / product.units_per_quantity(sold_by_unit),
        })?;
    remove_units(product, units)
}

// =============================================================================
// Additions
// =============================================================================

/// Goods received: sealed boxes and/or loose units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restock {
    #[serde(default)]
    pub boxes: i64,
    #[serde(default)]
    pub units: i64,
}

/// Adds received goods to stock.
///
/// Plain products only accept `units`.
pub fn restock(product: &mut Product, restock: Restock) -> CoreResult<StockChange> {
    if restock.boxes < 0 || restock.units < 0 || (restock.boxes == 0 && restock.units == 0) {
        return Err(ValidationError::MustBePositive {
            field: "restock quantity".to_string(),
        }
        .into());
    }

    let before = StockSnapshot::of(product);

    let added = match product.closed.as_mut() {
        Some(closed) => {
            closed.boxes += restock.boxes;
            closed.loose_units += restock.units;
            product.stock = closed.total_units();
            restock.boxes * closed.units_per_box + restock.units
        }
        None => {
            if restock.boxes > 0 {
                return Err(CoreError::NotClosedProduct(product.name.clone()));
            }
            product.stock += restock.units;
            restock.units
        }
    };

    Ok(StockChange {
        before,
        after: StockSnapshot::of(product),
        units_requested: added,
        units_deducted: added,
        boxes_opened: 0,
    })
}

/// Returns units of a voided sale line to stock.
///
/// Box lines come back as sealed boxes (any remainder as loose units);
/// unit lines come back as loose units.
pub fn return_units(product: &mut Product, units: i64, as_boxes: bool) -> CoreResult<StockChange> {
    if units < 0 {
        return Err(ValidationError::MustBePositive {
            field: "units".to_string(),
        }
        .into());
    }

    let before = StockSnapshot::of(product);

    match product.closed.as_mut() {
        Some(closed) => {
            if as_boxes {
                closed.boxes += units / closed.units_per_box;
                closed.loose_units += units % closed.units_per_box;
            } else {
                closed.loose_units += units;
            }
            product.stock = closed.total_units();
        }
        None => product.stock += units,
    }

    Ok(StockChange {
        before,
        after: StockSnapshot::of(product),
        units_requested: units,
        units_deducted: units,
        boxes_opened: 0,
    })
}

// =============================================================================
// Counted Levels
// =============================================================================

/// A physically counted stock level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CountedQuantity {
    /// Total loose units. For closed products this is split into full
    /// boxes plus a remainder.
    Units { units: i64 },
    /// Sealed boxes plus loose units (closed products only).
    Boxes { boxes: i64, loose_units: i64 },
}

impl CountedQuantity {
    /// Total units this count represents for `product`.
    pub fn total_units(&self, product: &Product) -> CoreResult<i64> {
        match *self {
            CountedQuantity::Units { units } => {
                non_negative("counted units", units)?;
                Ok(units)
            }
            CountedQuantity::Boxes { boxes, loose_units } => {
                let closed = product
                    .closed
                    .ok_or_else(|| CoreError::NotClosedProduct(product.name.clone()))?;
                non_negative("counted boxes", boxes)?;
                non_negative("counted loose units", loose_units)?;
                Ok(boxes * closed.units_per_box + loose_units)
            }
        }
    }
}

fn non_negative(field: &str, value: i64) -> CoreResult<()> {
    crate::validation::validate_stock_level(field, value)?;
    Ok(())
}

/// Sets stock to a counted level.
///
/// `units_requested`/`units_deducted` carry the absolute size of the
/// adjustment; the sign is in [`StockChange::delta`].
pub fn set_counted(product: &mut Product, counted: CountedQuantity) -> CoreResult<StockChange> {
    let total = counted.total_units(product)?;
    let before = StockSnapshot::of(product);

    match (product.closed.as_mut(), counted) {
        (Some(closed), CountedQuantity::Boxes { boxes, loose_units }) => {
            closed.boxes = boxes;
            closed.loose_units = loose_units;
            product.stock = closed.total_units();
        }
        (Some(closed), CountedQuantity::Units { units }) => {
            closed.boxes = units / closed.units_per_box;
            closed.loose_units = units % closed.units_per_box;
            product.stock = closed.total_units();
        }
        (None, _) => product.stock = total,
    }

    let magnitude = (product.stock - before.stock).abs();
    Ok(StockChange {
        before,
        after: StockSnapshot::of(product),
        units_requested: magnitude,
        units_deducted: magnitude,
        boxes_opened: 0,
    })
}

// =============================================================================
// Closed Mode Conversion
// =============================================================================

impl ClosedStock {
    /// Splits a unit count into full boxes plus loose remainder.
    pub fn from_units(units: i64, units_per_box: i64, unit_price_cents: i64) -> CoreResult<Self> {
        validate_units_per_box(units_per_box)?;
        non_negative("stock", units)?;
        Ok(ClosedStock {
            units_per_box,
            boxes: units / units_per_box,
            loose_units: units % units_per_box,
            unit_price_cents,
        })
    }
}

/// Switches a product into or out of closed (box/unit) mode, keeping its
/// total units.
pub fn set_closed_mode(
    product: &mut Product,
    mode: Option<(i64, i64)>,
) -> CoreResult<()> {
    match mode {
        Some((units_per_box, unit_price_cents)) => {
            crate::validation::validate_price_cents(unit_price_cents)?;
            product.closed = Some(ClosedStock::from_units(
                product.stock.max(0),
                units_per_box,
                unit_price_cents,
            )?);
        }
        None => product.closed = None,
    }
    product.stock = product.stock.max(0);
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
