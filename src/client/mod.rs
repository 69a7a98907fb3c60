//! Shopper-side state: identity, optimistic cart, favorites and the login
//! merge. Everything talks to persistence through [`crate::backend`].

pub mod commands;
pub mod favorites;
pub mod identity;
pub mod reconcile;
pub mod session;
pub mod store;
