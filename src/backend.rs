//! Persistence ports used by the client-side cart and favorites layer.
//!
//! `AppState` implements both traits on top of PostgreSQL; [`crate::memory`]
//! provides an in-process implementation with the same constraints.

use std::collections::HashSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Cart, CartLine, CartLineView, LineKey, Owner},
    services::{cart_service, favorite_service},
    state::AppState,
};

#[async_trait]
pub trait CartBackend: Send + Sync {
    async fn find_cart(&self, owner: &Owner) -> AppResult<Option<Cart>>;

    /// Returns the owner's cart, creating it when missing. Implementations
    /// must never create a second cart for the same owner.
    async fn get_or_create_cart(&self, owner: &Owner) -> AppResult<Cart>;

    async fn list_lines(&self, cart_id: Uuid) -> AppResult<Vec<CartLineView>>;

    /// Increments the line with the same key, or inserts a new one.
    async fn add_line(&self, cart_id: Uuid, key: LineKey, quantity: i32) -> AppResult<CartLine>;

    /// `None` when the quantity removed the line.
    async fn set_line_quantity(&self, line_id: Uuid, quantity: i32)
    -> AppResult<Option<CartLine>>;

    async fn remove_line(&self, line_id: Uuid) -> AppResult<()>;

    /// Re-parents a line. Fails with `Conflict` if the target cart already
    /// holds a line with the same key.
    async fn move_line(&self, line_id: Uuid, cart_id: Uuid) -> AppResult<CartLine>;

    async fn clear_cart(&self, cart_id: Uuid) -> AppResult<()>;

    async fn delete_cart(&self, cart_id: Uuid) -> AppResult<()>;
}

#[async_trait]
pub trait FavoriteBackend: Send + Sync {
    async fn load_favorites(&self, user_id: Uuid) -> AppResult<HashSet<Uuid>>;

    /// Atomically inserts or deletes the favorite and returns the resulting
    /// membership.
    async fn toggle_favorite(&self, user_id: Uuid, product_id: Uuid) -> AppResult<bool>;
}

#[async_trait]
impl CartBackend for AppState {
    async fn find_cart(&self, owner: &Owner) -> AppResult<Option<Cart>> {
        cart_service::find_cart(self, owner).await
    }

    async fn get_or_create_cart(&self, owner: &Owner) -> AppResult<Cart> {
        cart_service::get_or_create_cart(self, owner).await
    }

    async fn list_lines(&self, cart_id: Uuid) -> AppResult<Vec<CartLineView>> {
        cart_service::list_lines(self, cart_id).await
    }

    async fn add_line(&self, cart_id: Uuid, key: LineKey, quantity: i32) -> AppResult<CartLine> {
        cart_service::add_line(self, cart_id, key, quantity).await
    }

    async fn set_line_quantity(
        &self,
        line_id: Uuid,
        quantity: i32,
    ) -> AppResult<Option<CartLine>> {
        cart_service::set_line_quantity(self, line_id, quantity).await
    }

    async fn remove_line(&self, line_id: Uuid) -> AppResult<()> {
        cart_service::remove_line(self, line_id).await
    }

    async fn move_line(&self, line_id: Uuid, cart_id: Uuid) -> AppResult<CartLine> {
        cart_service::move_line(self, line_id, cart_id).await
    }

    async fn clear_cart(&self, cart_id: Uuid) -> AppResult<()> {
        cart_service::clear_cart(self, cart_id).await
    }

    async fn delete_cart(&self, cart_id: Uuid) -> AppResult<()> {
        cart_service::delete_cart(self, cart_id).await
    }
}

#[async_trait]
impl FavoriteBackend for AppState {
    async fn load_favorites(&self, user_id: Uuid) -> AppResult<HashSet<Uuid>> {
        favorite_service::load(self, user_id).await
    }

    async fn toggle_favorite(&self, user_id: Uuid, product_id: Uuid) -> AppResult<bool> {
        favorite_service::toggle(self, user_id, product_id).await
    }
}
