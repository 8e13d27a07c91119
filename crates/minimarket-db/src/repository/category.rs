//! # Category Repository
//!
//! Categories with their ordered subcategory lists.

use chrono::Utc;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use minimarket_core::validation::validate_category_name;
use minimarket_core::{entity, Category};

use super::sync::queue_entity_in;
use super::{from_json, to_json};
use crate::error::{DbError, DbResult};

#[derive(Debug, FromRow)]
struct CategoryRow {
    id: String,
    name: String,
    subcategories: String,
}

impl TryFrom<CategoryRow> for Category {
    type Error = DbError;

    fn try_from(row: CategoryRow) -> DbResult<Self> {
        Ok(Category {
            id: row.id,
            name: row.name,
            subcategories: from_json("categories.subcategories", &row.subcategories)?,
        })
    }
}

pub(crate) async fn insert_row(conn: &mut SqliteConnection, category: &Category) -> DbResult<()> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO categories (id, name, subcategories, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
    )
    .bind(&category.id)
    .bind(&category.name)
    .bind(to_json("categories.subcategories", &category.subcategories)?)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Trims names and drops empty or duplicate (case-insensitive) entries,
/// keeping the first spelling.
fn clean_subcategories(subcategories: &[String]) -> DbResult<Vec<String>> {
    let mut cleaned: Vec<String> = Vec::new();
    for name in subcategories {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        validate_category_name(name)?;
        if !cleaned.iter().any(|c| c.eq_ignore_ascii_case(name)) {
            cleaned.push(name.to_string());
        }
    }
    Ok(cleaned)
}

/// Repository for categories.
#[derive(Debug, Clone)]
pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CategoryRepository { pool }
    }

    pub async fn list(&self) -> DbResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, subcategories FROM categories ORDER BY name COLLATE NOCASE",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Category::try_from).collect()
    }

    /// Case-insensitive lookup.
    pub async fn get_by_name(&self, name: &str) -> DbResult<Option<Category>> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, subcategories FROM categories WHERE name = ?1 COLLATE NOCASE",
        )
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Category::try_from).transpose()
    }

    /// Creates the category, or replaces the subcategory list of an
    /// existing one with the same name.
    pub async fn upsert(&self, name: &str, subcategories: &[String]) -> DbResult<Category> {
        validate_category_name(name)?;
        let subcategories = clean_subcategories(subcategories)?;

        let category = match self.get_by_name(name).await? {
            Some(mut existing) => {
                existing.subcategories = subcategories;
                existing
            }
            None => Category {
                id: Uuid::new_v4().to_string(),
                name: name.trim().to_string(),
                subcategories,
            },
        };

        debug!(name = %category.name, subcategories = category.subcategories.len(), "Saving category");

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO categories (id, name, subcategories, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT (id) DO UPDATE SET
                subcategories = excluded.subcategories,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&category.id)
        .bind(&category.name)
        .bind(to_json("categories.subcategories", &category.subcategories)?)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        queue_entity_in(&mut tx, entity::CATEGORY, &category.id, &category).await?;
        tx.commit().await?;

        Ok(category)
    }

    /// Appends a subcategory; a no-op when it already exists.
    pub async fn add_subcategory(&self, category: &str, subcategory: &str) -> DbResult<Category> {
        let existing = self
            .get_by_name(category)
            .await?
            .ok_or_else(|| DbError::not_found("Category", category))?;

        if existing.has_subcategory(subcategory) {
            return Ok(existing);
        }
        let mut subcategories = existing.subcategories.clone();
        subcategories.push(subcategory.to_string());
        self.upsert(&existing.name, &subcategories).await
    }

    /// Deletes a category that no active product uses.
    pub async fn delete(&self, name: &str) -> DbResult<()> {
        let category = self
            .get_by_name(name)
            .await?
            .ok_or_else(|| DbError::not_found("Category", name))?;

        let in_use: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products WHERE is_active = 1 AND category = ?1 COLLATE NOCASE",
        )
        .bind(&category.name)
        .fetch_one(&self.pool)
        .await?;
        if in_use > 0 {
            return Err(DbError::ForeignKeyViolation {
                message: format!("category {} is used by {} products", category.name, in_use),
            });
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM categories WHERE id = ?1")
            .bind(&category.id)
            .execute(&mut *tx)
            .await?;
        queue_entity_in(
            &mut tx,
            entity::CATEGORY,
            &category.id,
            &serde_json::json!({ "id": category.id, "deleted": true }),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }
}
