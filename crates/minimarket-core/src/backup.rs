//! # Backup Module
//!
//! The versioned JSON snapshot written by `backup export` and read by
//! `backup restore`.
//!
//! ## Format Versions
//! ```text
//! ┌─────────┬──────────────────────────────────────────────────────────────┐
//! │ version │ contents                                                     │
//! ├─────────┼──────────────────────────────────────────────────────────────┤
//! │    1    │ products, categories, sales, users, company                  │
//! │    2    │ + movements, receipt_counters                                │
//! └─────────┴──────────────────────────────────────────────────────────────┘
//! ```
//! Version 1 files are upgraded by defaulting the missing sections (and
//! deriving receipt counters from the sales). Anything newer than
//! [`BACKUP_FORMAT_VERSION`] is rejected.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::receipt::{ReceiptCounters, ReceiptNumber};
use crate::types::{Category, CompanyConfig, InventoryMovement, Product, Sale};
use crate::users::User;

pub const BACKUP_FORMAT_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub format_version: u32,
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub company: CompanyConfig,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub sales: Vec<Sale>,
    #[serde(default)]
    pub movements: Vec<InventoryMovement>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub receipt_counters: ReceiptCounters,
}

impl BackupSnapshot {
    pub fn to_json_pretty(&self) -> CoreResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| CoreError::InvalidBackup(e.to_string()))
    }

    /// Checks referential sanity before anything is written.
    pub fn validate(&self) -> CoreResult<()> {
        let mut ids = HashSet::new();
        for product in &self.products {
            if !ids.insert(product.id.as_str()) {
                return Err(CoreError::InvalidBackup(format!(
                    "duplicate product id {}",
                    product.id
                )));
            }
            if !product.stock_is_consistent() {
                return Err(CoreError::InvalidBackup(format!(
                    "stock of {} does not match its boxes and loose units",
                    product.name
                )));
            }
        }

        let mut barcodes = HashSet::new();
        for barcode in self.products.iter().filter_map(|p| p.barcode.as_deref()) {
            if !barcodes.insert(barcode) {
                return Err(CoreError::InvalidBackup(format!(
                    "duplicate barcode {}",
                    barcode
                )));
            }
        }

        let mut receipts = HashSet::new();
        for sale in &self.sales {
            if !receipts.insert(sale.receipt_number.as_str()) {
                return Err(CoreError::InvalidBackup(format!(
                    "duplicate receipt number {}",
                    sale.receipt_number
                )));
            }
            if !sale.is_balanced() {
                return Err(CoreError::InvalidBackup(format!(
                    "sale {} payments do not balance",
                    sale.receipt_number
                )));
            }
        }

        for movement in &self.movements {
            if movement.delta != movement.quantity_after - movement.quantity_before {
                return Err(CoreError::InvalidBackup(format!(
                    "movement {} delta does not match before/after",
                    movement.id
                )));
            }
        }

        let mut usernames = HashSet::new();
        for user in &self.users {
            if !usernames.insert(user.username.as_str()) {
                return Err(CoreError::InvalidBackup(format!(
                    "duplicate username {}",
                    user.username
                )));
            }
        }
        if !self.users.is_empty() && !self.users.iter().any(User::is_active_admin) {
            return Err(CoreError::InvalidBackup(
                "backup has users but no active admin".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Deserialize)]
struct VersionProbe {
    #[serde(default = "legacy_version")]
    format_version: u32,
}

fn legacy_version() -> u32 {
    1
}

/// Parses, upgrades and validates a backup file.
///
/// ## Errors
/// - `UnsupportedBackupVersion` for version 0 or anything newer than 2
/// - `InvalidBackup` for malformed JSON or broken invariants
pub fn parse_backup(json: &str) -> CoreResult<BackupSnapshot> {
    let probe: VersionProbe =
        serde_json::from_str(json).map_err(|e| CoreError::InvalidBackup(e.to_string()))?;

    if probe.format_version == 0 || probe.format_version > BACKUP_FORMAT_VERSION {
        return Err(CoreError::UnsupportedBackupVersion {
            found: probe.format_version,
            supported: BACKUP_FORMAT_VERSION,
        });
    }

    let mut snapshot: BackupSnapshot = if probe.format_version == 1 {
        let mut value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| CoreError::InvalidBackup(e.to_string()))?;
        if let Some(object) = value.as_object_mut() {
            object.insert("format_version".to_string(), serde_json::json!(1));
            object
                .entry("exported_at")
                .or_insert_with(|| serde_json::json!(Utc::now()));
        }
        serde_json::from_value(value).map_err(|e| CoreError::InvalidBackup(e.to_string()))?
    } else {
        serde_json::from_str(json).map_err(|e| CoreError::InvalidBackup(e.to_string()))?
    };

    if snapshot.format_version == 1 {
        upgrade_v1(&mut snapshot);
    }

    snapshot.validate()?;
    Ok(snapshot)
}

/// Fills in what version 1 did not carry.
fn upgrade_v1(snapshot: &mut BackupSnapshot) {
    snapshot.movements.clear();

    let mut counters = ReceiptCounters::default();
    for sale in &snapshot.sales {
        if let Ok(number) = sale.receipt_number.parse::<ReceiptNumber>() {
            counters.observe(&number);
        }
    }
    snapshot.receipt_counters = counters;
    snapshot.format_version = BACKUP_FORMAT_VERSION;
}
