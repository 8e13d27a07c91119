//! # Category Commands

use tracing::debug;

use crate::error::ApiError;
use crate::state::{DbState, SessionState};
use minimarket_core::users::Permission;
use minimarket_core::Category;

pub async fn list_categories(db: &DbState) -> Result<Vec<Category>, ApiError> {
    Ok(db.inner().categories().list().await?)
}

/// Creates a category or replaces its subcategory list.
pub async fn save_category(
    db: &DbState,
    session: &SessionState,
    name: String,
    subcategories: Vec<String>,
) -> Result<Category, ApiError> {
    session.require(Permission::ManageProducts)?;
    debug!(name = %name, "save_category command");
    Ok(db.inner().categories().upsert(&name, &subcategories).await?)
}

pub async fn add_subcategory(
    db: &DbState,
    session: &SessionState,
    category: String,
    subcategory: String,
) -> Result<Category, ApiError> {
    session.require(Permission::ManageProducts)?;
    Ok(db
        .inner()
        .categories()
        .add_subcategory(&category, &subcategory)
        .await?)
}

/// Refused while an active product still uses the category.
pub async fn delete_category(
    db: &DbState,
    session: &SessionState,
    name: String,
) -> Result<(), ApiError> {
    session.require(Permission::ManageProducts)?;
    Ok(db.inner().categories().delete(&name).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::testing::{seed_product, terminal};
    use minimarket_core::users::Role;

    #[tokio::test]
    async fn test_delete_in_use_category_refused() {
        let t = terminal(Role::Manager).await;
        save_category(&t.db, &t.session, "Bebidas".into(), vec!["Gaseosas".into()])
            .await
            .unwrap();
        seed_product(&t, "Inca Kola 500ml", "7750182000123", 10).await;

        let err = delete_category(&t.db, &t.session, "bebidas".into())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::BusinessLogic);
    }

    #[tokio::test]
    async fn test_add_subcategory_is_idempotent() {
        let t = terminal(Role::Manager).await;
        save_category(&t.db, &t.session, "Snacks".into(), vec![])
            .await
            .unwrap();

        add_subcategory(&t.db, &t.session, "Snacks".into(), "Papas".into())
            .await
            .unwrap();
        let category = add_subcategory(&t.db, &t.session, "snacks".into(), "papas".into())
            .await
            .unwrap();

        assert_eq!(category.subcategories, vec!["Papas".to_string()]);
        assert_eq!(list_categories(&t.db).await.unwrap().len(), 1);
    }
}
