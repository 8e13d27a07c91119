//! # Session State
//!
//! The user logged in at this terminal. Commands ask the session for a
//! permission before touching anything.

use std::sync::{Arc, RwLock};

use minimarket_core::users::{ensure_permission, Permission, User};

use crate::error::ApiError;

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    user: Arc<RwLock<Option<User>>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(&self, user: User) {
        let mut slot = self.user.write().unwrap_or_else(|p| p.into_inner());
        *slot = Some(user);
    }

    pub fn logout(&self) -> Option<User> {
        let mut slot = self.user.write().unwrap_or_else(|p| p.into_inner());
        slot.take()
    }

    pub fn current(&self) -> Option<User> {
        self.user.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// The logged-in user, or `UNAUTHENTICATED`.
    pub fn user(&self) -> Result<User, ApiError> {
        self.current()
            .ok_or_else(|| ApiError::unauthenticated("No user is logged in"))
    }

    /// The logged-in user if they hold `permission`.
    pub fn require(&self, permission: Permission) -> Result<User, ApiError> {
        let user = self.user()?;
        ensure_permission(&user, permission)?;
        Ok(user)
    }
}
