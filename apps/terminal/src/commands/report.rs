//! # Report Commands
//!
//! Reports are computed in `minimarket-core` from plain data; this module
//! loads the rows and picks the store's local day boundaries.

use std::fmt::Write as _;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiError;
use crate::state::{ConfigState, DbState, SessionState};
use minimarket_core::report::{
    expiring, low_stock, sales_report, stock_valuation, ExpiringProduct, ReportPeriod,
    SalesReport, StockValuation,
};
use minimarket_core::users::Permission;
use minimarket_core::{Money, Product};

/// Stock situation at a glance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReport {
    pub low_stock: Vec<Product>,
    pub expiring: Vec<ExpiringProduct>,
    pub valuation: StockValuation,
}

/// UTC instant of local midnight starting `date`.
fn local_midnight(date: NaiveDate, utc_offset_minutes: i32) -> DateTime<Utc> {
    (date.and_time(NaiveTime::MIN) - Duration::minutes(utc_offset_minutes as i64)).and_utc()
}

/// Sales report for an inclusive range of local dates; open ends are
/// unbounded.
pub async fn get_sales_report(
    db: &DbState,
    config: &ConfigState,
    session: &SessionState,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<SalesReport, ApiError> {
    session.require(Permission::ViewReports)?;
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(ApiError::validation("'from' must not be after 'to'"));
        }
    }

    let company = db.inner().settings().company_config().await?;
    let offset = company.utc_offset_minutes;
    let period = ReportPeriod {
        from,
        to,
        utc_offset_minutes: offset,
    };

    let sales = db
        .inner()
        .sales()
        .list_between(
            from.map(|d| local_midnight(d, offset)),
            to.map(|d| local_midnight(d + Duration::days(1), offset)),
        )
        .await?;
    debug!(sales = sales.len(), ?from, ?to, "get_sales_report command");

    Ok(sales_report(&sales, period, config.get().report_top_n))
}

/// Low stock, soon-to-expire and stock value.
pub async fn get_inventory_report(
    db: &DbState,
    config: &ConfigState,
    session: &SessionState,
) -> Result<InventoryReport, ApiError> {
    session.require(Permission::ViewReports)?;

    let products = db.inner().products().list(false).await?;
    let today = Local::now().date_naive();

    Ok(InventoryReport {
        low_stock: low_stock(&products).into_iter().cloned().collect(),
        expiring: expiring(&products, today, config.get().expiry_warning_days),
        valuation: stock_valuation(&products),
    })
}

/// Plain-text rendering for the CLI.
pub fn format_sales_report(report: &SalesReport, currency: &str) -> String {
    let money = |cents: i64| Money::from_cents(cents).with_symbol(currency);
    let mut out = String::new();

    let range = match (report.period.from, report.period.to) {
        (Some(from), Some(to)) if from == to => from.to_string(),
        (from, to) => format!(
            "{} .. {}",
            from.map(|d| d.to_string()).unwrap_or_else(|| "start".into()),
            to.map(|d| d.to_string()).unwrap_or_else(|| "today".into()),
        ),
    };
    let _ = writeln!(out, "SALES REPORT  {}", range);
    let _ = writeln!(out, "{}", "=".repeat(48));
    let _ = writeln!(out, "{:<28}{:>20}", "Sales", report.sale_count);
    let _ = writeln!(out, "{:<28}{:>20}", "Gross", money(report.gross_cents));
    let _ = writeln!(out, "{:<28}{:>20}", "Average ticket", money(report.average_ticket_cents()));
    let _ = writeln!(out, "{:<28}{:>20}", "Units sold", report.units_sold);
    let _ = writeln!(
        out,
        "{:<28}{:>20}",
        format!("Voided ({})", report.voided_count),
        money(report.voided_cents)
    );

    let _ = writeln!(out, "\nBy payment method");
    for p in &report.payments {
        let _ = writeln!(out, "  {:<14}{:>6}{:>26}", p.method.as_str(), p.count, money(p.amount_cents));
    }

    let _ = writeln!(out, "\nBy category");
    for c in &report.by_category {
        let _ = writeln!(out, "  {:<26}{:>6}{:>14}", c.category, c.units, money(c.revenue_cents));
    }

    if !report.by_subcategory.is_empty() {
        let _ = writeln!(out, "\nBy subcategory");
        for c in &report.by_subcategory {
            let name = format!(
                "{} / {}",
                c.category,
                c.subcategory.as_deref().unwrap_or("-")
            );
            let _ = writeln!(out, "  {:<26}{:>6}{:>14}", name, c.units, money(c.revenue_cents));
        }
    }

    if !report.top_products.is_empty() {
        let _ = writeln!(out, "\nTop products");
        for (rank, p) in report.top_products.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {:>2}. {:<22}{:>6}{:>14}",
                rank + 1,
                p.name,
                p.units,
                money(p.revenue_cents)
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cart::{add_to_cart, AddToCartRequest};
    use crate::commands::sale::checkout;
    use crate::testing::{seed_product, terminal};
    use minimarket_core::users::Role;
    use minimarket_core::{PaymentEntry, PaymentMethod};

    #[test]
    fn test_local_midnight_applies_offset() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        // Lima is UTC-5: local midnight is 05:00 UTC.
        let at = local_midnight(date, -300);
        assert_eq!(at.to_rfc3339(), "2024-03-10T05:00:00+00:00");
    }

    #[tokio::test]
    async fn test_sales_report_counts_todays_checkout() {
        let t = terminal(Role::Manager).await;
        let product = seed_product(&t, "Inca Kola 500ml", "7750182000123", 10).await;
        add_to_cart(
            &t.db,
            &t.cart,
            &t.session,
            AddToCartRequest {
                product_id: Some(product.id.clone()),
                quantity: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        checkout(
            &t.db,
            &t.cart,
            &t.config,
            &t.session,
            &t.sync,
            vec![PaymentEntry::new(PaymentMethod::Cash, 1000)],
        )
        .await
        .unwrap();

        let report = get_sales_report(&t.db, &t.config, &t.session, None, None)
            .await
            .unwrap();
        assert_eq!(report.sale_count, 1);
        assert_eq!(report.gross_cents, 700);

        let text = format_sales_report(&report, "S/");
        assert!(text.contains("SALES REPORT"));
        assert!(text.contains("Bebidas"));
    }

    #[tokio::test]
    async fn test_inventory_report_flags_low_stock() {
        let t = terminal(Role::Manager).await;
        seed_product(&t, "Agua San Luis", "7750001", 3).await;
        seed_product(&t, "Galleta Soda", "7750002", 40).await;

        let report = get_inventory_report(&t.db, &t.config, &t.session).await.unwrap();
        assert_eq!(report.low_stock.len(), 1);
        assert_eq!(report.low_stock[0].name, "Agua San Luis");
        assert_eq!(report.valuation.units, 43);
    }

    #[tokio::test]
    async fn test_inverted_range_rejected() {
        let t = terminal(Role::Manager).await;
        let from = NaiveDate::from_ymd_opt(2024, 3, 10);
        let to = NaiveDate::from_ymd_opt(2024, 3, 1);
        assert!(get_sales_report(&t.db, &t.config, &t.session, from, to).await.is_err());
    }
}
