//! # User Repository
//!
//! Terminal users, roles and login.
//!
//! Passwords are hashed with argon2 (PHC string format, random salt per
//! user). Every change that could remove the last active admin goes
//! through [`minimarket_core::users::ensure_not_last_admin`] inside the
//! same transaction as the write.

use std::collections::BTreeSet;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use minimarket_core::users::{
    ensure_not_last_admin, validate_password, validate_username, Permission, Role, User,
};
use minimarket_core::{entity, CoreError};

use super::sync::queue_entity_in;
use super::{from_json, to_json};
use crate::error::{DbError, DbResult};

// =============================================================================
// Password Hashing
// =============================================================================

/// Hashes a password into a PHC string.
pub fn hash_password(password: &str) -> DbResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| DbError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Verifies a password against a stored PHC string. Malformed hashes never
/// verify.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

// =============================================================================
// Rows
// =============================================================================

const USER_COLUMNS: &str =
    "id, username, display_name, password_hash, role, extra_permissions, is_active, created_at, updated_at";

#[derive(Debug, FromRow)]
struct UserRow {
    id: String,
    username: String,
    display_name: String,
    password_hash: String,
    role: Role,
    extra_permissions: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = DbError;

    fn try_from(row: UserRow) -> DbResult<Self> {
        Ok(User {
            id: row.id,
            username: row.username,
            display_name: row.display_name,
            password_hash: row.password_hash,
            role: row.role,
            extra_permissions: from_json("users.extra_permissions", &row.extra_permissions)?,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// What gets synced for a user: everything except the password hash.
#[derive(Debug, Serialize)]
struct UserSyncPayload<'a> {
    id: &'a str,
    username: &'a str,
    display_name: &'a str,
    role: Role,
    extra_permissions: &'a BTreeSet<Permission>,
    is_active: bool,
    updated_at: DateTime<Utc>,
}

impl<'a> From<&'a User> for UserSyncPayload<'a> {
    fn from(user: &'a User) -> Self {
        UserSyncPayload {
            id: &user.id,
            username: &user.username,
            display_name: &user.display_name,
            role: user.role,
            extra_permissions: &user.extra_permissions,
            is_active: user.is_active,
            updated_at: user.updated_at,
        }
    }
}

pub(crate) async fn insert_row(conn: &mut SqliteConnection, user: &User) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (
            id, username, display_name, password_hash, role,
            extra_permissions, is_active, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.display_name)
    .bind(&user.password_hash)
    .bind(user.role)
    .bind(to_json("users.extra_permissions", &user.extra_permissions)?)
    .bind(user.is_active)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(&mut *conn)
    .await;

    match result {
        Err(sqlx::Error::Database(e)) if e.message().contains("users.username") => {
            Err(DbError::duplicate("username", &user.username))
        }
        other => {
            other?;
            Ok(())
        }
    }
}

async fn fetch_all(conn: &mut SqliteConnection) -> DbResult<Vec<User>> {
    let sql = format!("SELECT {} FROM users ORDER BY username", USER_COLUMNS);
    let rows = sqlx::query_as::<_, UserRow>(&sql)
        .fetch_all(&mut *conn)
        .await?;
    rows.into_iter().map(User::try_from).collect()
}

async fn write_user(conn: &mut SqliteConnection, user: &User) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE users SET
            display_name = ?2,
            password_hash = ?3,
            role = ?4,
            extra_permissions = ?5,
            is_active = ?6,
            updated_at = ?7
        WHERE id = ?1
        "#,
    )
    .bind(&user.id)
    .bind(&user.display_name)
    .bind(&user.password_hash)
    .bind(user.role)
    .bind(to_json("users.extra_permissions", &user.extra_permissions)?)
    .bind(user.is_active)
    .bind(user.updated_at)
    .execute(&mut *conn)
    .await?;

    queue_entity_in(conn, entity::USER, &user.id, &UserSyncPayload::from(user)).await
}

// =============================================================================
// Repository
// =============================================================================

/// Input for [`UserRepository::create`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub display_name: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub extra_permissions: BTreeSet<Permission>,
}

/// Repository for users.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Creates a user with a freshly hashed password.
    pub async fn create(&self, new: NewUser) -> DbResult<User> {
        let username = new.username.trim().to_string();
        validate_username(&username)?;
        validate_password(&new.password)?;

        let now = Utc::now();
        let display_name = match new.display_name.trim() {
            "" => username.clone(),
            name => name.to_string(),
        };
        let user = User {
            id: Uuid::new_v4().to_string(),
            username,
            display_name,
            password_hash: hash_password(&new.password)?,
            role: new.role,
            extra_permissions: new.extra_permissions,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool.begin().await?;
        insert_row(&mut tx, &user).await?;
        queue_entity_in(&mut tx, entity::USER, &user.id, &UserSyncPayload::from(&user)).await?;
        tx.commit().await?;

        info!(username = %user.username, role = %user.role, "User created");
        Ok(user)
    }

    /// Verifies credentials. Unknown users, wrong passwords and inactive
    /// users all fail the same way.
    pub async fn authenticate(&self, username: &str, password: &str) -> DbResult<User> {
        let user = match self.get_by_username(username).await? {
            Some(user) => user,
            None => {
                warn!(username = %username, "Login for unknown user");
                return Err(DbError::InvalidCredentials);
            }
        };

        if !user.is_active || !verify_password(password, &user.password_hash) {
            warn!(username = %username, "Login rejected");
            return Err(DbError::InvalidCredentials);
        }

        info!(username = %user.username, "User logged in");
        Ok(user)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    pub async fn get_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(username.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    pub async fn list(&self) -> DbResult<Vec<User>> {
        let mut conn = self.pool.acquire().await?;
        fetch_all(&mut conn).await
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Loads all users and the target inside a transaction, applies
    /// `change`, re-checks the admin rule and writes the result.
    async fn modify<F>(&self, id: &str, change: F) -> DbResult<User>
    where
        F: FnOnce(&mut User) -> Result<(), CoreError>,
    {
        let mut tx = self.pool.begin().await?;
        let users = fetch_all(&mut tx).await?;
        let current = users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or_else(|| DbError::not_found("User", id))?;

        let mut updated = current.clone();
        change(&mut updated)?;
        if current.is_active_admin() && !updated.is_active_admin() {
            ensure_not_last_admin(&users, &current)?;
        }
        updated.updated_at = Utc::now();

        write_user(&mut tx, &updated).await?;
        tx.commit().await?;
        Ok(updated)
    }

    pub async fn set_role(&self, id: &str, role: Role) -> DbResult<User> {
        let user = self
            .modify(id, |u| {
                u.role = role;
                Ok(())
            })
            .await?;
        info!(username = %user.username, role = %role, "Role changed");
        Ok(user)
    }

    /// Activates or deactivates a user.
    pub async fn set_active(&self, id: &str, active: bool) -> DbResult<User> {
        self.modify(id, |u| {
            u.is_active = active;
            Ok(())
        })
        .await
    }

    pub async fn grant(&self, id: &str, permission: Permission) -> DbResult<User> {
        self.modify(id, |u| {
            u.extra_permissions.insert(permission);
            Ok(())
        })
        .await
    }

    pub async fn revoke(&self, id: &str, permission: Permission) -> DbResult<User> {
        self.modify(id, |u| {
            u.extra_permissions.remove(&permission);
            Ok(())
        })
        .await
    }

    pub async fn change_password(&self, id: &str, new_password: &str) -> DbResult<User> {
        validate_password(new_password)?;
        let hash = hash_password(new_password)?;
        self.modify(id, move |u| {
            u.password_hash = hash;
            Ok(())
        })
        .await
    }

    /// Deletes a user; the last active admin cannot be deleted.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let users = fetch_all(&mut tx).await?;
        let target = users
            .iter()
            .find(|u| u.id == id)
            .ok_or_else(|| DbError::not_found("User", id))?;
        ensure_not_last_admin(&users, target)?;

        sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        queue_entity_in(
            &mut tx,
            entity::USER,
            id,
            &serde_json::json!({ "id": id, "deleted": true }),
        )
        .await?;
        tx.commit().await?;

        info!(username = %target.username, "User deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn new_user(username: &str, role: Role) -> NewUser {
        NewUser {
            username: username.to_string(),
            display_name: String::new(),
            password: "123456".to_string(),
            role,
            extra_permissions: BTreeSet::new(),
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("s3cret").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cret", "not-a-hash"));
    }

    #[tokio::test]
    async fn test_create_and_authenticate() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let users = db.users();

        let ana = users.create(new_user("ana", Role::Cashier)).await.unwrap();
        assert_eq!(ana.display_name, "ana");

        assert_eq!(users.authenticate("ana", "123456").await.unwrap().id, ana.id);
        assert!(matches!(
            users.authenticate("ana", "654321").await,
            Err(DbError::InvalidCredentials)
        ));
        assert!(matches!(
            users.authenticate("nobody", "123456").await,
            Err(DbError::InvalidCredentials)
        ));

        users.set_active(&ana.id, false).await.unwrap();
        assert!(matches!(
            users.authenticate("ana", "123456").await,
            Err(DbError::InvalidCredentials)
        ));

        let dup = users.create(new_user("ana", Role::Cashier)).await.unwrap_err();
        assert!(matches!(dup, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_sync_payload_has_no_hash() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.users().create(new_user("rosa", Role::Manager)).await.unwrap();

        let pending = db.sync_outbox().get_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(!pending[0].payload.contains("argon2"));
        assert!(!pending[0].payload.contains("password"));
    }

    #[tokio::test]
    async fn test_last_admin_guarded() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let users = db.users();
        let root = users.create(new_user("root", Role::Admin)).await.unwrap();

        assert!(matches!(
            users.set_role(&root.id, Role::Manager).await,
            Err(DbError::Rule(CoreError::LastAdmin))
        ));
        assert!(matches!(
            users.set_active(&root.id, false).await,
            Err(DbError::Rule(CoreError::LastAdmin))
        ));
        assert!(users.delete(&root.id).await.is_err());

        let second = users.create(new_user("root2", Role::Admin)).await.unwrap();
        users.set_role(&root.id, Role::Manager).await.unwrap();
        assert!(users.delete(&second.id).await.is_err());
    }

    #[tokio::test]
    async fn test_grants_and_password_change() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let users = db.users();
        let ana = users.create(new_user("ana", Role::Cashier)).await.unwrap();

        let ana = users.grant(&ana.id, Permission::ViewReports).await.unwrap();
        assert!(ana.has_permission(Permission::ViewReports));
        let stored = users.get_by_id(&ana.id).await.unwrap().unwrap();
        assert!(stored.extra_permissions.contains(&Permission::ViewReports));

        let ana = users.revoke(&ana.id, Permission::ViewReports).await.unwrap();
        assert!(!ana.has_permission(Permission::ViewReports));

        users.change_password(&ana.id, "nueva123").await.unwrap();
        assert!(users.authenticate("ana", "nueva123").await.is_ok());
        assert!(users.change_password(&ana.id, "123").await.is_err());
    }
}
