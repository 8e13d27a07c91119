//! # Backup Commands
//!
//! ```text
//! export_backup ──► BackupSnapshot (format_version 2) ──► pretty JSON file
//! restore_backup ◄── parse_backup (v1 upgraded, newer rejected) ◄── file
//!                    └─► one transaction replaces all local data
//! ```
//!
//! The file is written next to its final name first and renamed, so an
//! interrupted export never leaves a truncated backup behind.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ErrorCode};
use crate::state::{CartState, DbState, SessionState};
use minimarket_core::backup::parse_backup;
use minimarket_core::cart::Cart;
use minimarket_core::users::Permission;
use minimarket_db::{export_snapshot, restore_snapshot, RestoreSummary};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub path: PathBuf,
    pub products: usize,
    pub sales: usize,
    pub movements: usize,
    pub bytes: usize,
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> ApiError {
    ApiError::new(
        ErrorCode::BackupError,
        format!("Cannot {} {}: {}", action, path.display(), e),
    )
}

pub async fn export_backup(
    db: &DbState,
    session: &SessionState,
    path: PathBuf,
) -> Result<ExportSummary, ApiError> {
    let user = session.require(Permission::BackupRestore)?;

    let snapshot = export_snapshot(db.inner()).await?;
    let json = snapshot.to_json_pretty()?;

    let partial = path.with_extension("json.partial");
    tokio::fs::write(&partial, json.as_bytes())
        .await
        .map_err(|e| io_error("write", &partial, e))?;
    tokio::fs::rename(&partial, &path)
        .await
        .map_err(|e| io_error("write", &path, e))?;

    info!(path = %path.display(), by = %user.username, "Backup written");
    Ok(ExportSummary {
        path,
        products: snapshot.products.len(),
        sales: snapshot.sales.len(),
        movements: snapshot.movements.len(),
        bytes: json.len(),
    })
}

/// Replaces all local data with the backup and empties the cart.
pub async fn restore_backup(
    db: &DbState,
    cart: &CartState,
    session: &SessionState,
    path: PathBuf,
) -> Result<RestoreSummary, ApiError> {
    let user = session.require(Permission::BackupRestore)?;

    let json = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| io_error("read", &path, e))?;
    let snapshot = parse_backup(&json)?;

    let summary = restore_snapshot(db.inner(), &snapshot).await?;
    cart.with_cart_mut(Cart::clear);

    // The logged-in account may not exist in the restored user table.
    if !summary.kept_existing_users && !snapshot.users.iter().any(|u| u.id == user.id) {
        session.logout();
    }

    info!(path = %path.display(), by = %user.username, "Backup restored");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{seed_product, terminal};
    use minimarket_core::users::Role;

    #[tokio::test]
    async fn test_export_then_restore_into_fresh_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json");

        let source = terminal(Role::Admin).await;
        seed_product(&source, "Inca Kola 500ml", "7750182000123", 10).await;
        let exported = export_backup(&source.db, &source.session, path.clone())
            .await
            .unwrap();
        assert_eq!(exported.products, 1);
        assert!(!dir.path().join("backup.json.partial").exists());

        let target = terminal(Role::Admin).await;
        let summary = restore_backup(&target.db, &target.cart, &target.session, path)
            .await
            .unwrap();

        assert_eq!(summary.products, 1);
        let products = target.db.inner().products().list(false).await.unwrap();
        assert_eq!(products[0].name, "Inca Kola 500ml");
        // The target's admin is not in the source's user table.
        assert!(target.session.current().is_none());
    }

    #[tokio::test]
    async fn test_garbage_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json");
        std::fs::write(&path, "{ not json").unwrap();

        let t = terminal(Role::Admin).await;
        let err = restore_backup(&t.db, &t.cart, &t.session, path)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::BackupError);
    }

    #[tokio::test]
    async fn test_cashier_cannot_export() {
        let dir = tempfile::tempdir().unwrap();
        let t = terminal(Role::Cashier).await;
        let err = export_backup(&t.db, &t.session, dir.path().join("b.json"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PermissionDenied);
    }
}
