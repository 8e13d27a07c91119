//! # Receipt Module
//!
//! Receipt numbering and plain-text layout for thermal printers.
//!
//! ## Numbering
//! ```text
//! series  counter            formatted
//! ──────  ───────            ─────────
//! B001    41 ──next()──► 42  B001-00000042
//! ```
//! Counters are per series. The db crate persists them and takes the next
//! number inside the checkout transaction, so two sales never share one.
//!
//! ## Layout (58 mm, 32 columns)
//! ```text
//!            MINIMARKET
//!        Av. Siempre Viva 742
//! ================================
//! Receipt            B001-00000042
//! Date            2026-03-01 15:04
//! Cashier                    maria
//! --------------------------------
//! Hamilton Azul [unit]
//!   3 x 1.00                  3.00
//! --------------------------------
//! TOTAL                    S/ 3.00
//! Cash                     S/ 5.00
//! Change                   S/ 2.00
//! ================================
//!      Gracias por su compra
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{CompanyConfig, PaymentMethod, Sale};

// =============================================================================
// Receipt Numbers
// =============================================================================

/// Digits of the zero-padded counter.
pub const RECEIPT_NUMBER_DIGITS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptNumber {
    pub series: String,
    pub number: u64,
}

impl fmt::Display for ReceiptNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:0width$}",
            self.series,
            self.number,
            width = RECEIPT_NUMBER_DIGITS
        )
    }
}

impl FromStr for ReceiptNumber {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidFormat {
            field: "receipt number".to_string(),
            reason: "expected SERIES-NUMBER, e.g. B001-00000042".to_string(),
        };

        let (series, number) = s.trim().rsplit_once('-').ok_or_else(invalid)?;
        validate_series(series)?;
        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let number = number.parse().map_err(|_| invalid())?;

        Ok(ReceiptNumber {
            series: series.to_string(),
            number,
        })
    }
}

/// Validates a receipt series: 1-8 uppercase letters or digits.
pub fn validate_series(series: &str) -> Result<(), ValidationError> {
    if series.is_empty() || series.len() > 8 {
        return Err(ValidationError::OutOfRange {
            field: "receipt series length".to_string(),
            min: 1,
            max: 8,
        });
    }
    if !series
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err(ValidationError::InvalidFormat {
            field: "receipt series".to_string(),
            reason: "must contain only uppercase letters and digits".to_string(),
        });
    }
    Ok(())
}

/// Last issued number per series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptCounters(pub BTreeMap<String, u64>);

impl ReceiptCounters {
    /// Issues the next number of `series`.
    pub fn next(&mut self, series: &str) -> ReceiptNumber {
        let counter = self.0.entry(series.to_string()).or_insert(0);
        *counter += 1;
        ReceiptNumber {
            series: series.to_string(),
            number: *counter,
        }
    }

    pub fn last(&self, series: &str) -> u64 {
        self.0.get(series).copied().unwrap_or(0)
    }

    /// Raises a counter so it never re-issues `number` (used after
    /// importing sales).
    pub fn observe(&mut self, receipt: &ReceiptNumber) {
        let counter = self.0.entry(receipt.series.clone()).or_insert(0);
        if *counter < receipt.number {
            *counter = receipt.number;
        }
    }
}

// =============================================================================
// Paper Width
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaperWidth {
    /// 58 mm roll, 32 columns.
    Mm58,
    /// 80 mm roll, 48 columns.
    #[default]
    Mm80,
}

impl PaperWidth {
    pub fn columns(&self) -> usize {
        match self {
            PaperWidth::Mm58 => 32,
            PaperWidth::Mm80 => 48,
        }
    }
}

impl FromStr for PaperWidth {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "58" | "58mm" | "mm58" => Ok(PaperWidth::Mm58),
            "80" | "80mm" | "mm80" => Ok(PaperWidth::Mm80),
            _ => Err(ValidationError::NotAllowed {
                field: "paper width".to_string(),
                allowed: vec!["58mm".to_string(), "80mm".to_string()],
            }),
        }
    }
}

// =============================================================================
// Rendering
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct ReceiptOptions {
    pub width: PaperWidth,
    /// Name printed on the "Cashier" line (falls back to the cashier id).
    pub cashier_name: Option<String>,
    /// Set when printing a copy: `REPRINT #n`.
    pub reprint_number: Option<i64>,
}

fn method_label(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Cash => "Cash",
        PaymentMethod::Wallet => "Wallet",
        PaymentMethod::Card => "Card",
    }
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(8);
    let mut out = Vec::new();
    let mut line = String::new();

    for token in text.split_whitespace() {
        let mut token = token.to_string();
        while token.chars().count() > width {
            if !line.is_empty() {
                out.push(std::mem::take(&mut line));
            }
            let head: String = token.chars().take(width).collect();
            token = token.chars().skip(width).collect();
            out.push(head);
        }
        if token.is_empty() {
            continue;
        }
        if line.is_empty() {
            line = token;
            continue;
        }
        if line.chars().count() + 1 + token.chars().count() > width {
            out.push(std::mem::replace(&mut line, token));
        } else {
            line.push(' ');
            line.push_str(&token);
        }
    }
    if !line.is_empty() {
        out.push(line);
    }
    out
}

fn center(out: &mut String, text: &str, width: usize) {
    for line in wrap(text, width) {
        let pad = width.saturating_sub(line.chars().count()) / 2;
        out.push_str(&" ".repeat(pad));
        out.push_str(&line);
        out.push('\n');
    }
}

fn pair(out: &mut String, label: &str, value: &str, width: usize) {
    let label_len = label.chars().count();
    let value_len = value.chars().count();
    if label_len + value_len < width {
        out.push_str(label);
        out.push_str(&" ".repeat(width - label_len - value_len));
        out.push_str(value);
        out.push('\n');
        return;
    }
    for line in wrap(label, width) {
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str(&" ".repeat(width.saturating_sub(value_len)));
    out.push_str(value);
    out.push('\n');
}

fn rule(out: &mut String, ch: char, width: usize) {
    out.extend(std::iter::repeat(ch).take(width));
    out.push('\n');
}

/// Renders a sale as plain text for a thermal printer.
pub fn render_receipt(sale: &Sale, company: &CompanyConfig, options: &ReceiptOptions) -> String {
    let width = options.width.columns();
    let symbol = company.currency_symbol.as_str();
    let mut out = String::new();

    center(&mut out, &company.name.to_uppercase(), width);
    for line in [&company.address, &company.phone].into_iter().flatten() {
        center(&mut out, line, width);
    }
    if let Some(tax_id) = &company.tax_id {
        center(&mut out, &format!("Tax ID {}", tax_id), width);
    }
    rule(&mut out, '=', width);

    let local = match FixedOffset::east_opt(company.utc_offset_minutes * 60) {
        Some(offset) => sale.created_at.with_timezone(&offset).naive_local(),
        None => sale.created_at.naive_utc(),
    };
    pair(&mut out, "Receipt", &sale.receipt_number, width);
    pair(&mut out, "Date", &local.format("%Y-%m-%d %H:%M").to_string(), width);
    pair(
        &mut out,
        "Cashier",
        options.cashier_name.as_deref().unwrap_or(&sale.cashier_id),
        width,
    );

    if let Some(n) = options.reprint_number {
        center(&mut out, &format!("*** REPRINT #{} ***", n), width);
    }
    if sale.voided {
        center(&mut out, "*** VOIDED ***", width);
        if let Some(reason) = &sale.void_reason {
            center(&mut out, reason, width);
        }
    }
    rule(&mut out, '-', width);

    for item in &sale.items {
        let mut label = item.name.clone();
        if let Some(sub) = &item.subcategory {
            label.push_str(&format!(" ({})", sub));
        }
        if item.sold_by_unit {
            label.push_str(" [unit]");
        }
        for line in wrap(&label, width) {
            out.push_str(&line);
            out.push('\n');
        }
        pair(
            &mut out,
            &format!(
                "  {} x {}",
                item.quantity,
                Money::from_cents(item.unit_price_cents)
            ),
            &item.line_total().to_string(),
            width,
        );
    }
    rule(&mut out, '-', width);

    pair(&mut out, "TOTAL", &sale.total().with_symbol(symbol), width);
    for payment in &sale.payments {
        pair(
            &mut out,
            method_label(payment.method),
            &payment.amount().with_symbol(symbol),
            width,
        );
    }
    if sale.change_cents > 0 {
        pair(
            &mut out,
            "Change",
            &Money::from_cents(sale.change_cents).with_symbol(symbol),
            width,
        );
    }
    rule(&mut out, '=', width);

    if let Some(footer) = &company.receipt_footer {
        center(&mut out, footer, width);
    }

    out
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PaymentEntry, SaleItem};
    use chrono::{TimeZone, Utc};

    fn sale() -> Sale {
        Sale {
            id: "s-1".to_string(),
            receipt_number: "B001-00000042".to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 20, 4, 0).unwrap(),
            items: vec![SaleItem {
                product_id: "cig".to_string(),
                name: "Hamilton Azul".to_string(),
                category: "Cigarrillos".to_string(),
                subcategory: None,
                quantity: 3,
                sold_by_unit: true,
                units: 3,
                unit_price_cents: 100,
                line_total_cents: 300,
            }],
            total_cents: 300,
            payments: vec![PaymentEntry::new(PaymentMethod::Cash, 500)],
            change_cents: 200,
            cashier_id: "u-1".to_string(),
            voided: false,
            voided_at: None,
            void_reason: None,
            reprint_count: 0,
            sync_version: 0,
        }
    }

    fn company() -> CompanyConfig {
        CompanyConfig {
            name: "Minimarket Rosita".to_string(),
            utc_offset_minutes: -300,
            ..Default::default()
        }
    }

    #[test]
    fn test_receipt_number_format_and_parse() {
        let n = ReceiptNumber {
            series: "B001".to_string(),
            number: 42,
        };
        assert_eq!(n.to_string(), "B001-00000042");
        assert_eq!("B001-00000042".parse::<ReceiptNumber>().unwrap(), n);

        assert!("B001".parse::<ReceiptNumber>().is_err());
        assert!("b001-1".parse::<ReceiptNumber>().is_err());
        assert!("B001-12a".parse::<ReceiptNumber>().is_err());
    }

    #[test]
    fn test_counters_per_series() {
        let mut counters = ReceiptCounters::default();
        assert_eq!(counters.next("B001").number, 1);
        assert_eq!(counters.next("B001").number, 2);
        assert_eq!(counters.next("F001").number, 1);

        counters.observe(&"B001-00000010".parse().unwrap());
        assert_eq!(counters.next("B001").to_string(), "B001-00000011");
        counters.observe(&"B001-00000003".parse().unwrap());
        assert_eq!(counters.last("B001"), 11);
    }

    #[test]
    fn test_render_58mm() {
        let options = ReceiptOptions {
            width: PaperWidth::Mm58,
            cashier_name: Some("maria".to_string()),
            reprint_number: None,
        };
        let text = render_receipt(&sale(), &company(), &options);

        assert!(text.lines().all(|l| l.chars().count() <= 32));
        assert!(text.contains("MINIMARKET ROSITA"));
        assert!(text.contains("B001-00000042"));
        assert!(text.contains("2026-03-01 15:04"));
        assert!(text.contains("Hamilton Azul [unit]"));
        assert!(text.contains("Change"));
        assert!(text.contains("S/ 2.00"));
        assert!(text.contains("Gracias por su compra"));
        assert!(!text.contains("REPRINT"));
    }

    #[test]
    fn test_render_reprint_and_void_banners() {
        let mut voided = sale();
        voided.voided = true;
        voided.void_reason = Some("wrong product".to_string());
        let options = ReceiptOptions {
            width: PaperWidth::Mm80,
            cashier_name: None,
            reprint_number: Some(2),
        };
        let text = render_receipt(&voided, &company(), &options);

        assert!(text.lines().all(|l| l.chars().count() <= 48));
        assert!(text.contains("*** REPRINT #2 ***"));
        assert!(text.contains("*** VOIDED ***"));
        assert!(text.contains("wrong product"));
        assert!(text.contains("u-1"));
    }

    #[test]
    fn test_long_names_wrap() {
        let lines = wrap("Galletas Soda Field Paquete Familiar x 6 unidades", 20);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.chars().count() <= 20));

        let lines = wrap("Supercalifragilisticoespialidoso", 10);
        assert!(lines.iter().all(|l| l.chars().count() <= 10));
    }

    #[test]
    fn test_paper_width_parse() {
        assert_eq!("58mm".parse::<PaperWidth>().unwrap().columns(), 32);
        assert_eq!("80".parse::<PaperWidth>().unwrap().columns(), 48);
        assert!("110".parse::<PaperWidth>().is_err());
    }
}
