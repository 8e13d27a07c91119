//! # Users Module
//!
//! Roles, permissions and the rules around terminal users. Password
//! hashing lives in minimarket-db; this module never sees a password
//! except to validate its shape.
//!
//! ## Role Defaults
//! ```text
//! ┌───────────────────┬────────┬─────────┬─────────┐
//! │ permission        │ admin  │ manager │ cashier │
//! ├───────────────────┼────────┼─────────┼─────────┤
//! │ sell              │   ✓    │    ✓    │    ✓    │
//! │ reprint_receipt   │   ✓    │    ✓    │    ✓    │
//! │ void_sale         │   ✓    │    ✓    │         │
//! │ manage_products   │   ✓    │    ✓    │         │
//! │ adjust_inventory  │   ✓    │    ✓    │         │
//! │ view_reports      │   ✓    │    ✓    │         │
//! │ manage_settings   │   ✓    │    ✓    │         │
//! │ backup_restore    │   ✓    │    ✓    │         │
//! │ force_sync        │   ✓    │    ✓    │         │
//! │ manage_users      │   ✓    │         │         │
//! └───────────────────┴────────┴─────────┴─────────┘
//! ```
//! Extra permissions can be granted to a single user on top of the role.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};

// =============================================================================
// Roles & Permissions
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Cashier,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Cashier => "cashier",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "cashier" => Ok(Role::Cashier),
            _ => Err(ValidationError::NotAllowed {
                field: "role".to_string(),
                allowed: vec![
                    "admin".to_string(),
                    "manager".to_string(),
                    "cashier".to_string(),
                ],
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Sell,
    VoidSale,
    ReprintReceipt,
    ManageProducts,
    AdjustInventory,
    ViewReports,
    ManageUsers,
    ManageSettings,
    BackupRestore,
    ForceSync,
}

impl Permission {
    pub const ALL: [Permission; 10] = [
        Permission::Sell,
        Permission::VoidSale,
        Permission::ReprintReceipt,
        Permission::ManageProducts,
        Permission::AdjustInventory,
        Permission::ViewReports,
        Permission::ManageUsers,
        Permission::ManageSettings,
        Permission::BackupRestore,
        Permission::ForceSync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Sell => "sell",
            Permission::VoidSale => "void_sale",
            Permission::ReprintReceipt => "reprint_receipt",
            Permission::ManageProducts => "manage_products",
            Permission::AdjustInventory => "adjust_inventory",
            Permission::ViewReports => "view_reports",
            Permission::ManageUsers => "manage_users",
            Permission::ManageSettings => "manage_settings",
            Permission::BackupRestore => "backup_restore",
            Permission::ForceSync => "force_sync",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Permission {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "permission".to_string(),
                allowed: Permission::ALL.iter().map(|p| p.as_str().to_string()).collect(),
            })
    }
}

/// Default permissions of a role.
pub fn permissions_for(role: Role) -> BTreeSet<Permission> {
    match role {
        Role::Admin => Permission::ALL.into_iter().collect(),
        Role::Manager => Permission::ALL
            .into_iter()
            .filter(|p| *p != Permission::ManageUsers)
            .collect(),
        Role::Cashier => [Permission::Sell, Permission::ReprintReceipt]
            .into_iter()
            .collect(),
    }
}

// =============================================================================
// User
// =============================================================================

/// A terminal user. `password_hash` is a PHC string produced by argon2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
    pub role: Role,
    /// Granted on top of the role defaults.
    #[serde(default)]
    pub extra_permissions: BTreeSet<Permission>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl User {
    /// Role defaults plus extra grants.
    pub fn permissions(&self) -> BTreeSet<Permission> {
        let mut all = permissions_for(self.role);
        all.extend(self.extra_permissions.iter().copied());
        all
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.is_active
            && (permissions_for(self.role).contains(&permission)
                || self.extra_permissions.contains(&permission))
    }

    pub fn is_active_admin(&self) -> bool {
        self.is_active && self.role == Role::Admin
    }
}

/// Errors unless `user` holds `permission`.
pub fn ensure_permission(user: &User, permission: Permission) -> CoreResult<()> {
    if user.has_permission(permission) {
        Ok(())
    } else {
        Err(CoreError::PermissionDenied {
            user: user.username.clone(),
            permission: permission.to_string(),
        })
    }
}

/// Errors when removing, deactivating or demoting `target` would leave no
/// active admin among `users`.
pub fn ensure_not_last_admin(users: &[User], target: &User) -> CoreResult<()> {
    if !target.is_active_admin() {
        return Ok(());
    }
    let other_admins = users
        .iter()
        .filter(|u| u.id != target.id && u.is_active_admin())
        .count();
    if other_admins == 0 {
        return Err(CoreError::LastAdmin);
    }
    Ok(())
}

// =============================================================================
// Validators
// =============================================================================

/// Usernames: 3-32 chars, lowercase letters, digits, `.`, `_`, `-`.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let username = username.trim();
    if username.len() < 3 {
        return Err(ValidationError::TooShort {
            field: "username".to_string(),
            min: 3,
        });
    }
    if username.len() > 32 {
        return Err(ValidationError::TooLong {
            field: "username".to_string(),
            max: 32,
        });
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
    {
        return Err(ValidationError::InvalidFormat {
            field: "username".to_string(),
            reason: "use lowercase letters, digits, '.', '_' or '-'".to_string(),
        });
    }
    Ok(())
}

/// Passwords: 6-128 characters, any class (numeric PINs allowed).
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if len < 6 {
        return Err(ValidationError::TooShort {
            field: "password".to_string(),
            min: 6,
        });
    }
    if len > 128 {
        return Err(ValidationError::TooLong {
            field: "password".to_string(),
            max: 128,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, role: Role, active: bool) -> User {
        User {
            id: id.to_string(),
            username: id.to_string(),
            display_name: id.to_string(),
            password_hash: String::new(),
            role,
            extra_permissions: BTreeSet::new(),
            is_active: active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_role_defaults() {
        assert_eq!(permissions_for(Role::Admin).len(), Permission::ALL.len());
        assert!(!permissions_for(Role::Manager).contains(&Permission::ManageUsers));
        assert_eq!(permissions_for(Role::Manager).len(), Permission::ALL.len() - 1);

        let cashier = permissions_for(Role::Cashier);
        assert!(cashier.contains(&Permission::Sell));
        assert!(cashier.contains(&Permission::ReprintReceipt));
        assert!(!cashier.contains(&Permission::VoidSale));
    }

    #[test]
    fn test_extra_grants_and_inactive_users() {
        let mut cashier = user("ana", Role::Cashier, true);
        assert!(ensure_permission(&cashier, Permission::ViewReports).is_err());

        cashier.extra_permissions.insert(Permission::ViewReports);
        assert!(ensure_permission(&cashier, Permission::ViewReports).is_ok());
        assert!(cashier.permissions().contains(&Permission::ViewReports));

        cashier.is_active = false;
        assert!(!cashier.has_permission(Permission::Sell));
    }

    #[test]
    fn test_last_admin_protected() {
        let admin = user("root", Role::Admin, true);
        let manager = user("boss", Role::Manager, true);
        let users = vec![admin.clone(), manager.clone()];

        assert!(matches!(
            ensure_not_last_admin(&users, &admin),
            Err(CoreError::LastAdmin)
        ));
        assert!(ensure_not_last_admin(&users, &manager).is_ok());

        let second = user("root2", Role::Admin, true);
        let users = vec![admin.clone(), second];
        assert!(ensure_not_last_admin(&users, &admin).is_ok());
    }

    #[test]
    fn test_parsing() {
        assert_eq!("Manager".parse::<Role>().unwrap(), Role::Manager);
        assert!("owner".parse::<Role>().is_err());
        assert_eq!("void_sale".parse::<Permission>().unwrap(), Permission::VoidSale);
        assert!("fly".parse::<Permission>().is_err());
    }

    #[test]
    fn test_validators() {
        assert!(validate_username("maria.q").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("Maria").is_err());
        assert!(validate_password("123456").is_ok());
        assert!(validate_password("12345").is_err());
    }
}
