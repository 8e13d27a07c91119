//! # Sale Commands
//!
//! Checkout turns the cart into a sale in one database transaction:
//! stock, movements, receipt number, payments and the sync outbox rows
//! either all commit or none do.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::{CartState, ConfigState, DbState, SessionState, SyncState};
use minimarket_core::cart::Cart;
use minimarket_core::payment::quick_cash_options;
use minimarket_core::receipt::{render_receipt, ReceiptOptions};
use minimarket_core::users::Permission;
use minimarket_core::{CoreError, Money, PaymentEntry, Sale};
use minimarket_db::CheckoutRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleResponse {
    pub sale: Sale,
    /// Plain-text receipt, ready for the thermal printer.
    pub receipt: String,
}

async fn cashier_name(db: &DbState, cashier_id: &str) -> Option<String> {
    let user = db.inner().users().get_by_id(cashier_id).await.ok()??;
    if user.display_name.trim().is_empty() {
        Some(user.username)
    } else {
        Some(user.display_name)
    }
}

async fn render(
    db: &DbState,
    config: &ConfigState,
    sale: &Sale,
    reprint_number: Option<i64>,
) -> Result<String, ApiError> {
    let company = db.inner().settings().company_config().await?;
    let options = ReceiptOptions {
        width: config.get().paper_width,
        cashier_name: cashier_name(db, &sale.cashier_id).await,
        reprint_number,
    };
    Ok(render_receipt(sale, &company, &options))
}

/// Charges the cart.
///
/// ## Flow
/// ```text
/// cart snapshot ──► record_checkout (tx) ──► clear cart ──► trigger sync
///                                                      └──► render receipt
/// ```
///
/// A rejected checkout (stale stock, short payment) leaves the cart as it
/// was so the cashier can fix it and retry.
pub async fn checkout(
    db: &DbState,
    cart: &CartState,
    config: &ConfigState,
    session: &SessionState,
    sync: &SyncState,
    payments: Vec<PaymentEntry>,
) -> Result<SaleResponse, ApiError> {
    let user = session.require(Permission::Sell)?;
    let snapshot = cart.snapshot();
    debug!(lines = snapshot.item_count(), payments = payments.len(), "checkout command");

    if snapshot.is_empty() {
        return Err(CoreError::EmptyCart.into());
    }

    let sale = db
        .inner()
        .sales()
        .record_checkout(&CheckoutRequest {
            cart: snapshot,
            payments,
            cashier_id: user.id.clone(),
            series: None,
        })
        .await?;

    cart.with_cart_mut(Cart::clear);
    if let Err(e) = db.inner().settings().save_cart(&Cart::new()).await {
        tracing::warn!(error = %e, "Could not clear persisted cart");
    }

    sync.after_checkout();

    info!(
        receipt = %sale.receipt_number,
        total = sale.total_cents,
        change = sale.change_cents,
        "Checkout complete"
    );

    let receipt = render(db, config, &sale, None).await?;
    Ok(SaleResponse { sale, receipt })
}

/// Voids a sale and puts its units back in stock.
pub async fn void_sale(
    db: &DbState,
    session: &SessionState,
    sale_id: String,
    reason: String,
) -> Result<Sale, ApiError> {
    let user = session.require(Permission::VoidSale)?;
    debug!(sale_id = %sale_id, "void_sale command");

    if reason.trim().is_empty() {
        return Err(ApiError::validation("A void reason is required"));
    }

    Ok(db.inner().sales().void_sale(&sale_id, reason.trim(), &user.id).await?)
}

/// Prints a copy of a receipt, by sale id or receipt number.
///
/// Every copy is counted; the banner shows `REPRINT #n`.
pub async fn reprint_receipt(
    db: &DbState,
    config: &ConfigState,
    session: &SessionState,
    sale_ref: String,
) -> Result<SaleResponse, ApiError> {
    session.require(Permission::ReprintReceipt)?;
    debug!(sale_ref = %sale_ref, "reprint_receipt command");

    let sales = db.inner().sales();
    let sale = match sales.get_by_id(&sale_ref).await? {
        Some(sale) => sale,
        None => sales
            .get_by_receipt_number(&sale_ref)
            .await?
            .ok_or_else(|| ApiError::not_found("Sale", &sale_ref))?,
    };

    let copy = sales.record_reprint(&sale.id).await?;
    let receipt = render(db, config, &sale, Some(copy)).await?;

    let mut sale = sale;
    sale.reprint_count = copy;
    Ok(SaleResponse { sale, receipt })
}

/// Suggested cash amounts for the current cart total.
pub fn quick_cash(cart: &CartState) -> Vec<i64> {
    let total = Money::from_cents(cart.with_cart(|c| c.total_cents()));
    quick_cash_options(total).iter().map(|m| m.cents()).collect()
}

pub async fn recent_sales(
    db: &DbState,
    session: &SessionState,
    limit: Option<u32>,
) -> Result<Vec<Sale>, ApiError> {
    session.require(Permission::ViewReports)?;
    Ok(db.inner().sales().list_recent(limit.unwrap_or(20).min(200)).await?)
}
