//! # User Commands
//!
//! Login for the terminal session plus user administration. Admin commands
//! address users by username.
//!
//! ## First Run
//! A database without users accepts one `add_user` without a session; that
//! account is always created as admin.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::{DbState, SessionState};
use minimarket_core::users::{Permission, Role, User};
use minimarket_db::NewUser;

/// A user without the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    /// Role permissions plus explicit grants.
    pub permissions: BTreeSet<Permission>,
    pub is_active: bool,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        UserDto {
            permissions: user.permissions(),
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            role: user.role,
            is_active: user.is_active,
        }
    }
}

async fn find(db: &DbState, username: &str) -> Result<User, ApiError> {
    db.inner()
        .users()
        .get_by_username(username)
        .await?
        .ok_or_else(|| ApiError::not_found("User", username))
}

pub async fn login(
    db: &DbState,
    session: &SessionState,
    username: String,
    password: String,
) -> Result<UserDto, ApiError> {
    debug!(username = %username, "login command");
    let user = db.inner().users().authenticate(&username, &password).await?;
    session.login(user.clone());
    Ok(UserDto::from(user))
}

pub fn logout(session: &SessionState) -> Option<UserDto> {
    let user = session.logout()?;
    info!(username = %user.username, "Logged out");
    Some(UserDto::from(user))
}

pub fn current_user(session: &SessionState) -> Option<UserDto> {
    session.current().map(UserDto::from)
}

/// Creates a user. The very first user needs no session and becomes admin.
pub async fn add_user(
    db: &DbState,
    session: &SessionState,
    mut request: NewUser,
) -> Result<UserDto, ApiError> {
    let bootstrap = db.inner().users().count().await? == 0;
    if bootstrap {
        info!(username = %request.username, "Creating the first (admin) user");
        request.role = Role::Admin;
    } else {
        session.require(Permission::ManageUsers)?;
    }

    let user = db.inner().users().create(request).await?;
    Ok(UserDto::from(user))
}

pub async fn list_users(db: &DbState, session: &SessionState) -> Result<Vec<UserDto>, ApiError> {
    session.require(Permission::ManageUsers)?;
    let users = db.inner().users().list().await?;
    Ok(users.into_iter().map(UserDto::from).collect())
}

pub async fn set_role(
    db: &DbState,
    session: &SessionState,
    username: String,
    role: Role,
) -> Result<UserDto, ApiError> {
    session.require(Permission::ManageUsers)?;
    let user = find(db, &username).await?;
    Ok(db.inner().users().set_role(&user.id, role).await?.into())
}

pub async fn set_active(
    db: &DbState,
    session: &SessionState,
    username: String,
    active: bool,
) -> Result<UserDto, ApiError> {
    session.require(Permission::ManageUsers)?;
    let user = find(db, &username).await?;
    Ok(db.inner().users().set_active(&user.id, active).await?.into())
}

/// Grants (`granted = true`) or revokes an extra permission.
pub async fn set_permission(
    db: &DbState,
    session: &SessionState,
    username: String,
    permission: Permission,
    granted: bool,
) -> Result<UserDto, ApiError> {
    session.require(Permission::ManageUsers)?;
    let user = find(db, &username).await?;
    let users = db.inner().users();
    let updated = if granted {
        users.grant(&user.id, permission).await?
    } else {
        users.revoke(&user.id, permission).await?
    };
    Ok(updated.into())
}

/// Anyone may change their own password; other accounts need
/// `manage_users`.
pub async fn change_password(
    db: &DbState,
    session: &SessionState,
    username: String,
    new_password: String,
) -> Result<(), ApiError> {
    let me = session.user()?;
    let target = find(db, &username).await?;
    if target.id != me.id {
        session.require(Permission::ManageUsers)?;
    }
    db.inner()
        .users()
        .change_password(&target.id, &new_password)
        .await?;
    info!(username = %target.username, by = %me.username, "Password changed");
    Ok(())
}

pub async fn delete_user(
    db: &DbState,
    session: &SessionState,
    username: String,
) -> Result<(), ApiError> {
    let me = session.require(Permission::ManageUsers)?;
    let target = find(db, &username).await?;
    if target.id == me.id {
        return Err(ApiError::validation("You cannot delete your own account"));
    }
    db.inner().users().delete(&target.id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::state::TerminalConfig;
    use crate::testing::terminal;
    use crate::Terminal;
    use minimarket_db::{Database, DbConfig};

    fn new_user(username: &str, role: Role) -> NewUser {
        NewUser {
            username: username.into(),
            display_name: String::new(),
            password: "secret123".into(),
            role,
            extra_permissions: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn test_first_user_becomes_admin_without_session() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let t = Terminal::with_database(db, TerminalConfig::default()).await.unwrap();

        let first = add_user(&t.db, &t.session, new_user("rosa", Role::Cashier))
            .await
            .unwrap();
        assert_eq!(first.role, Role::Admin);

        let err = add_user(&t.db, &t.session, new_user("luis", Role::Cashier))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthenticated);
    }

    #[tokio::test]
    async fn test_login_and_wrong_password() {
        let t = terminal(Role::Admin).await;
        add_user(&t.db, &t.session, new_user("luis", Role::Cashier))
            .await
            .unwrap();

        let err = login(&t.db, &t.session, "luis".into(), "nope-nope".into())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthenticated);

        let user = login(&t.db, &t.session, "luis".into(), "secret123".into())
            .await
            .unwrap();
        assert_eq!(current_user(&t.session).unwrap().id, user.id);
        assert!(!user.permissions.contains(&Permission::VoidSale));
    }

    #[tokio::test]
    async fn test_grant_extends_cashier() {
        let t = terminal(Role::Admin).await;
        add_user(&t.db, &t.session, new_user("luis", Role::Cashier))
            .await
            .unwrap();

        let user = set_permission(&t.db, &t.session, "luis".into(), Permission::VoidSale, true)
            .await
            .unwrap();
        assert!(user.permissions.contains(&Permission::VoidSale));
    }

    #[tokio::test]
    async fn test_last_admin_cannot_be_demoted() {
        let t = terminal(Role::Admin).await;
        let err = set_role(&t.db, &t.session, "admin1".into(), Role::Cashier)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::BusinessLogic);
    }

    #[tokio::test]
    async fn test_cashier_changes_only_own_password() {
        let t = terminal(Role::Cashier).await;
        change_password(&t.db, &t.session, "cashier1".into(), "newsecret1".into())
            .await
            .unwrap();

        t.db.inner()
            .users()
            .create(new_user("other", Role::Cashier))
            .await
            .unwrap();
        let err = change_password(&t.db, &t.session, "other".into(), "hijacked1".into())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PermissionDenied);
    }
}
