//! # Report Module
//!
//! Sales and inventory aggregation over plain slices. The terminal loads
//! sales for a period from the database and hands them here.
//!
//! ## Sales Report Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Period 2026-03-01 .. 2026-03-01                                        │
//! │                                                                         │
//! │  Sales 42   Gross 1,284.50   Voided 1 (12.00)   Change given 96.50      │
//! │                                                                         │
//! │  By payment method        By category            Top products           │
//! │  cash    (net) 702.00     Bebidas     410.00     Hamilton Azul 220.00   │
//! │  wallet        480.50     Cigarrillos 380.00     Inca Kola     140.00   │
//! │  card          102.00     ...                    ...                    │
//! │                                                                         │
//! │  cash + wallet + card == gross  (change is taken out of cash)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{PaymentMethod, Product, Sale};

/// Category label for sale lines without one.
pub const UNCATEGORIZED: &str = "Uncategorized";

// =============================================================================
// Period
// =============================================================================

/// An inclusive range of local calendar dates. Open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Store offset used to turn UTC timestamps into local dates.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl ReportPeriod {
    /// A single local day.
    pub fn day(date: NaiveDate, utc_offset_minutes: i32) -> Self {
        ReportPeriod {
            from: Some(date),
            to: Some(date),
            utc_offset_minutes,
        }
    }

    /// Local calendar date of a UTC timestamp.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        match FixedOffset::east_opt(self.utc_offset_minutes * 60) {
            Some(offset) => at.with_timezone(&offset).date_naive(),
            None => at.date_naive(),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let date = self.local_date(at);
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

// =============================================================================
// Sales Report
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentBreakdown {
    pub method: PaymentMethod,
    /// Amount kept by the store (cash is net of change).
    pub amount_cents: i64,
    /// Sales that used this method.
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub category: String,
    pub subcategory: Option<String>,
    /// Sale quantity (boxes or units as sold).
    pub quantity: i64,
    /// Units taken from stock.
    pub units: i64,
    pub revenue_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSales {
    pub product_id: String,
    pub name: String,
    pub units: i64,
    pub revenue_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesReport {
    pub period: ReportPeriod,
    pub sale_count: usize,
    pub gross_cents: i64,
    pub voided_count: usize,
    pub voided_cents: i64,
    pub change_cents: i64,
    pub units_sold: i64,
    pub payments: Vec<PaymentBreakdown>,
    pub by_category: Vec<CategoryBreakdown>,
    pub by_subcategory: Vec<CategoryBreakdown>,
    pub top_products: Vec<ProductSales>,
}

impl SalesReport {
    /// Average ticket in cents (0 without sales).
    pub fn average_ticket_cents(&self) -> i64 {
        if self.sale_count == 0 {
            0
        } else {
            self.gross_cents / self.sale_count as i64
        }
    }
}

/// Aggregates the sales inside `period`.
///
/// Voided sales only count towards `voided_count`/`voided_cents`.
pub fn sales_report(sales: &[Sale], period: ReportPeriod, top_n: usize) -> SalesReport {
    let mut report = SalesReport {
        period,
        sale_count: 0,
        gross_cents: 0,
        voided_count: 0,
        voided_cents: 0,
        change_cents: 0,
        units_sold: 0,
        payments: Vec::new(),
        by_category: Vec::new(),
        by_subcategory: Vec::new(),
        top_products: Vec::new(),
    };

    let mut payments: BTreeMap<PaymentMethod, (i64, usize)> = BTreeMap::new();
    let mut categories: BTreeMap<String, CategoryBreakdown> = BTreeMap::new();
    let mut subcategories: BTreeMap<(String, Option<String>), CategoryBreakdown> = BTreeMap::new();
    let mut products: BTreeMap<String, ProductSales> = BTreeMap::new();

    for sale in sales.iter().filter(|s| period.contains(s.created_at)) {
        if sale.voided {
            report.voided_count += 1;
            report.voided_cents += sale.total_cents;
            continue;
        }

        report.sale_count += 1;
        report.gross_cents += sale.total_cents;
        report.change_cents += sale.change_cents;

        for entry in &sale.payments {
            let amount = if entry.method == PaymentMethod::Cash {
                entry.amount_cents - sale.change_cents
            } else {
                entry.amount_cents
            };
            let slot = payments.entry(entry.method).or_insert((0, 0));
            slot.0 += amount;
            slot.1 += 1;
        }

        for item in &sale.items {
            report.units_sold += item.units;

            let category = if item.category.trim().is_empty() {
                UNCATEGORIZED.to_string()
            } else {
                item.category.clone()
            };

            let by_cat = categories
                .entry(category.clone())
                .or_insert_with(|| CategoryBreakdown {
                    category: category.clone(),
                    subcategory: None,
                    quantity: 0,
                    units: 0,
                    revenue_cents: 0,
                });
            by_cat.quantity += item.quantity;
            by_cat.units += item.units;
            by_cat.revenue_cents += item.line_total_cents;

            let key = (category.clone(), item.subcategory.clone());
            let by_sub = subcategories
                .entry(key)
                .or_insert_with(|| CategoryBreakdown {
                    category: category.clone(),
                    subcategory: item.subcategory.clone(),
                    quantity: 0,
                    units: 0,
                    revenue_cents: 0,
                });
            by_sub.quantity += item.quantity;
            by_sub.units += item.units;
            by_sub.revenue_cents += item.line_total_cents;

            let product = products
                .entry(item.product_id.clone())
                .or_insert_with(|| ProductSales {
                    product_id: item.product_id.clone(),
                    name: item.name.clone(),
                    units: 0,
                    revenue_cents: 0,
                });
            product.units += item.units;
            product.revenue_cents += item.line_total_cents;
        }
    }

    report.payments = PaymentMethod::ALL
        .iter()
        .map(|method| {
            let (amount_cents, count) = payments.get(method).copied().unwrap_or((0, 0));
            PaymentBreakdown {
                method: *method,
                amount_cents,
                count,
            }
        })
        .collect();

    report.by_category = sorted_by_revenue(categories.into_values().collect());
    report.by_subcategory = sorted_by_revenue(subcategories.into_values().collect());

    let mut top: Vec<ProductSales> = products.into_values().collect();
    top.sort_by(|a, b| {
        b.revenue_cents
            .cmp(&a.revenue_cents)
            .then_with(|| a.name.cmp(&b.name))
    });
    top.truncate(top_n);
    report.top_products = top;

    report
}

fn sorted_by_revenue(mut rows: Vec<CategoryBreakdown>) -> Vec<CategoryBreakdown> {
    rows.sort_by(|a, b| {
        b.revenue_cents
            .cmp(&a.revenue_cents)
            .then_with(|| a.category.cmp(&b.category))
            .then_with(|| a.subcategory.cmp(&b.subcategory))
    });
    rows
}

// =============================================================================
// Inventory Reports
// =============================================================================

/// Active products at or below their alert threshold, lowest stock first.
pub fn low_stock(products: &[Product]) -> Vec<&Product> {
    let mut low: Vec<&Product> = products
        .iter()
        .filter(|p| p.is_active && p.is_low_stock())
        .collect();
    low.sort_by(|a, b| a.stock.cmp(&b.stock).then_with(|| a.name.cmp(&b.name)));
    low
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiringProduct {
    pub product_id: String,
    pub name: String,
    pub expiration_date: NaiveDate,
    /// Negative once expired.
    pub days_left: i64,
    pub stock: i64,
}

impl ExpiringProduct {
    pub fn is_expired(&self) -> bool {
        self.days_left < 0
    }
}

/// Active products with stock that expire within `within_days` of
/// `today`, including those already expired. Soonest first.
pub fn expiring(products: &[Product], today: NaiveDate, within_days: i64) -> Vec<ExpiringProduct> {
    let mut rows: Vec<ExpiringProduct> = products
        .iter()
        .filter(|p| p.is_active && p.stock > 0)
        .filter_map(|p| {
            let days_left = p.days_until_expiry(today)?;
            let expiration_date = p.expiration_date?;
            (days_left <= within_days).then(|| ExpiringProduct {
                product_id: p.id.clone(),
                name: p.name.clone(),
                expiration_date,
                days_left,
                stock: p.stock,
            })
        })
        .collect();
    rows.sort_by(|a, b| a.days_left.cmp(&b.days_left).then_with(|| a.name.cmp(&b.name)));
    rows
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockValuation {
    pub products: usize,
    pub units: i64,
    /// Units × unit cost, for products with a known cost.
    pub cost_value_cents: i64,
    /// Boxes at box price plus loose units at unit price (closed), or
    /// units at base price.
    pub retail_value_cents: i64,
    pub products_without_cost: usize,
}

pub fn stock_valuation(products: &[Product]) -> StockValuation {
    let mut valuation = StockValuation::default();

    for product in products.iter().filter(|p| p.is_active) {
        let units = product.stock.max(0);
        valuation.products += 1;
        valuation.units += units;

        valuation.retail_value_cents += match product.closed {
            Some(closed) => {
                closed.boxes * product.price_cents + closed.loose_units * closed.unit_price_cents
            }
            None => units * product.price_cents,
        };

        match product.cost_cents {
            Some(cost) => valuation.cost_value_cents += units * cost,
            None => valuation.products_without_cost += 1,
        }
    }

    valuation
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClosedStock, PaymentEntry, SaleItem};
    use chrono::TimeZone;

    fn item(product: &str, category: &str, sub: Option<&str>, qty: i64, price: i64) -> SaleItem {
        SaleItem {
            product_id: product.to_string(),
            name: product.to_string(),
            category: category.to_string(),
            subcategory: sub.map(str::to_string),
            quantity: qty,
            sold_by_unit: false,
            units: qty,
            unit_price_cents: price,
            line_total_cents: qty * price,
        }
    }

    fn sale(at: DateTime<Utc>, items: Vec<SaleItem>, payments: Vec<PaymentEntry>, change: i64) -> Sale {
        let total = items.iter().map(|i| i.line_total_cents).sum();
        Sale {
            id: format!("s-{}", at.timestamp()),
            receipt_number: "B001-00000001".to_string(),
            created_at: at,
            items,
            total_cents: total,
            payments,
            change_cents: change,
            cashier_id: "u".to_string(),
            voided: false,
            voided_at: None,
            void_reason: None,
            reprint_count: 0,
            sync_version: 0,
        }
    }

    fn product(id: &str, stock: i64, min: i64) -> Product {
        Product {
            id: id.to_string(),
            name: id.to_string(),
            barcode: None,
            category: "Abarrotes".to_string(),
            subcategory: None,
            price_cents: 500,
            subcategory_prices: Default::default(),
            cost_cents: Some(300),
            stock,
            min_stock: min,
            closed: None,
            expiration_date: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            sync_version: 0,
        }
    }

    #[test]
    fn test_sales_report_totals_and_payments() {
        let day = Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap();
        let mut voided = sale(
            day,
            vec![item("gum", "Snacks", None, 1, 1200)],
            vec![PaymentEntry::new(PaymentMethod::Cash, 1200)],
            0,
        );
        voided.voided = true;

        let sales = vec![
            sale(
                day,
                vec![
                    item("cola", "Bebidas", Some("Gaseosas"), 2, 350),
                    item("water", "Bebidas", Some("Agua"), 1, 200),
                ],
                vec![
                    PaymentEntry::new(PaymentMethod::Wallet, 500),
                    PaymentEntry::new(PaymentMethod::Cash, 1000),
                ],
                600,
            ),
            sale(
                day,
                vec![item("cookies", "Snacks", None, 3, 150)],
                vec![PaymentEntry::new(PaymentMethod::Card, 450)],
                0,
            ),
            voided,
        ];

        let report = sales_report(&sales, ReportPeriod::default(), 2);

        assert_eq!(report.sale_count, 2);
        assert_eq!(report.gross_cents, 900 + 450);
        assert_eq!(report.voided_count, 1);
        assert_eq!(report.voided_cents, 1200);
        assert_eq!(report.change_cents, 600);
        assert_eq!(report.units_sold, 6);

        let cash = &report.payments[0];
        assert_eq!(cash.method, PaymentMethod::Cash);
        assert_eq!(cash.amount_cents, 400);
        let paid: i64 = report.payments.iter().map(|p| p.amount_cents).sum();
        assert_eq!(paid, report.gross_cents);

        assert_eq!(report.by_category[0].category, "Bebidas");
        assert_eq!(report.by_category[0].revenue_cents, 900);
        assert_eq!(report.by_subcategory.len(), 3);
        assert_eq!(report.top_products.len(), 2);
        assert_eq!(report.top_products[0].product_id, "cola");
    }

    #[test]
    fn test_period_uses_local_date() {
        // 02:00 UTC on March 2nd is still March 1st at UTC-5
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 2, 0, 0).unwrap();
        let march_1 = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();

        assert!(ReportPeriod::day(march_1, -300).contains(at));
        assert!(!ReportPeriod::day(march_1, 0).contains(at));
    }

    #[test]
    fn test_low_stock_and_expiring() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let mut milk = product("milk", 4, 6);
        milk.expiration_date = NaiveDate::from_ymd_opt(2026, 3, 4);
        let mut yogurt = product("yogurt", 10, 2);
        yogurt.expiration_date = NaiveDate::from_ymd_opt(2026, 2, 27);
        let mut rice = product("rice", 50, 10);
        rice.expiration_date = NaiveDate::from_ymd_opt(2026, 12, 1);
        let mut inactive = product("old", 0, 5);
        inactive.is_active = false;

        let products = vec![milk, yogurt, rice, inactive];

        let low = low_stock(&products);
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].id, "milk");

        let soon = expiring(&products, today, 7);
        assert_eq!(soon.len(), 2);
        assert_eq!(soon[0].product_id, "yogurt");
        assert!(soon[0].is_expired());
        assert_eq!(soon[1].days_left, 3);
    }

    #[test]
    fn test_stock_valuation() {
        let mut cigs = product("cigs", 0, 0);
        cigs.price_cents = 1800;
        cigs.cost_cents = None;
        let closed = ClosedStock {
            units_per_box: 20,
            boxes: 2,
            loose_units: 5,
            unit_price_cents: 100,
        };
        cigs.stock = closed.total_units();
        cigs.closed = Some(closed);

        let valuation = stock_valuation(&[product("rice", 10, 0), cigs]);
        assert_eq!(valuation.products, 2);
        assert_eq!(valuation.units, 55);
        assert_eq!(valuation.retail_value_cents, 5000 + 3600 + 500);
        assert_eq!(valuation.cost_value_cents, 3000);
        assert_eq!(valuation.products_without_cost, 1);
    }
}
