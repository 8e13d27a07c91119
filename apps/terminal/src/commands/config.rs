//! # Config Commands
//!
//! The company config lives in the database (and syncs); the terminal
//! config is the local `terminal.toml` and is read-only here.

use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::{ConfigState, DbState, SessionState, TerminalConfig};
use minimarket_core::users::Permission;
use minimarket_core::CompanyConfig;

pub async fn get_company_config(db: &DbState) -> Result<CompanyConfig, ApiError> {
    debug!("get_company_config command");
    Ok(db.inner().settings().company_config().await?)
}

pub async fn set_company_config(
    db: &DbState,
    session: &SessionState,
    mut config: CompanyConfig,
) -> Result<CompanyConfig, ApiError> {
    let user = session.require(Permission::ManageSettings)?;

    config.name = config.name.trim().to_string();
    if config.name.is_empty() {
        return Err(ApiError::validation("Company name cannot be empty"));
    }
    config.receipt_series = config.receipt_series.trim().to_uppercase();
    if config.utc_offset_minutes.abs() > 14 * 60 {
        return Err(ApiError::validation("UTC offset out of range"));
    }

    db.inner().settings().set_company_config(&config).await?;
    info!(by = %user.username, series = %config.receipt_series, "Company config saved");
    Ok(config)
}

pub fn get_terminal_config(config: &ConfigState) -> TerminalConfig {
    config.get().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::testing::terminal;
    use minimarket_core::users::Role;

    #[tokio::test]
    async fn test_admin_updates_company_config() {
        let t = terminal(Role::Admin).await;
        let mut config = get_company_config(&t.db).await.unwrap();
        config.name = "  Bodega Rosita ".into();
        config.receipt_series = "f002".into();
        config.utc_offset_minutes = -300;

        let saved = set_company_config(&t.db, &t.session, config).await.unwrap();
        assert_eq!(saved.name, "Bodega Rosita");
        assert_eq!(saved.receipt_series, "F002");
        assert_eq!(get_company_config(&t.db).await.unwrap(), saved);
    }

    #[tokio::test]
    async fn test_bad_series_rejected() {
        let t = terminal(Role::Admin).await;
        let mut config = get_company_config(&t.db).await.unwrap();
        config.receipt_series = "B-1".into();

        let err = set_company_config(&t.db, &t.session, config).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_cashier_cannot_change_config() {
        let t = terminal(Role::Cashier).await;
        let config = get_company_config(&t.db).await.unwrap();
        let err = set_company_config(&t.db, &t.session, config).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PermissionDenied);
    }
}
