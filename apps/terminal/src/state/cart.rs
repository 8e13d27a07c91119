//! # Cart State
//!
//! The cart being rung up, shared between commands.
//!
//! ## Thread Safety
//! The cart is wrapped in `Arc<Mutex<T>>`: several commands may touch it
//! and only one may modify it at a time. The lock is never held across an
//! `.await`; commands copy the cart out, persist it, and move on.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Action              Command               Cart State Change            │
//! │  ──────              ───────               ─────────────────            │
//! │  Scan / pick ──────► add_to_cart() ──────► line added or qty += n      │
//! │  Change quantity ──► update_cart_item() ─► qty = n (0 removes)         │
//! │  Remove ───────────► remove_from_cart() ─► line removed                │
//! │  Checkout ─────────► checkout() ─────────► cleared after commit        │
//! │                                                                         │
//! │  Every change is also saved to the settings table, so a restart        │
//! │  restores the cart.                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use minimarket_core::cart::Cart;

#[derive(Debug, Clone, Default)]
pub struct CartState {
    cart: Arc<Mutex<Cart>>,
}

impl CartState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a cart restored from the database.
    pub fn with(cart: Cart) -> Self {
        CartState {
            cart: Arc::new(Mutex::new(cart)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cart> {
        // A panic while holding the lock leaves a valid Cart behind.
        self.cart.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Executes a function with read access to the cart.
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let totals = cart_state.with_cart(CartTotals::from);
    /// ```
    pub fn with_cart<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Cart) -> R,
    {
        f(&self.lock())
    }

    /// Executes a function with write access to the cart.
    pub fn with_cart_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Cart) -> R,
    {
        f(&mut self.lock())
    }

    pub fn snapshot(&self) -> Cart {
        self.lock().clone()
    }
}
