//! In-process backend with the same uniqueness rules as the PostgreSQL schema.
//!
//! Used to drive the client-side layer without a database, and to inject
//! remote failures in tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    backend::{CartBackend, FavoriteBackend},
    error::{AppError, AppResult},
    models::{Cart, CartLine, CartLineView, LineKey, LineProduct, Owner, combined_quantity},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    FindCart,
    CreateCart,
    ListLines,
    AddLine,
    SetQuantity,
    RemoveLine,
    MoveLine,
    ClearCart,
    DeleteCart,
    LoadFavorites,
    ToggleFavorite,
}

#[derive(Debug, Clone)]
struct ProductEntry {
    name: String,
    price: i64,
    image_url: Option<String>,
}

#[derive(Debug, Clone)]
struct VariantEntry {
    product_id: Uuid,
    name: String,
    price: Option<i64>,
}

#[derive(Debug, Clone)]
struct StoredLine {
    line: CartLine,
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    carts: HashMap<Uuid, Cart>,
    lines: HashMap<Uuid, StoredLine>,
    products: HashMap<Uuid, ProductEntry>,
    variants: HashMap<Uuid, VariantEntry>,
    favorites: HashSet<(Uuid, Uuid)>,
    failing: HashSet<Op>,
    failing_lines: HashSet<Uuid>,
    offline: bool,
    create_race: bool,
    move_race: Option<i32>,
    slow: HashMap<Op, usize>,
    seq: u64,
}

impl Inner {
    fn check(&self, op: Op) -> AppResult<()> {
        if self.offline || self.failing.contains(&op) {
            return Err(AppError::RemoteUnavailable(format!("{op:?} failed")));
        }
        Ok(())
    }

    fn check_line(&self, op: Op, line_id: Uuid) -> AppResult<()> {
        self.check(op)?;
        if self.failing_lines.contains(&line_id) {
            return Err(AppError::RemoteUnavailable(format!(
                "{op:?} failed for line {line_id}"
            )));
        }
        Ok(())
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn find_cart(&self, owner: &Owner) -> Option<Cart> {
        self.carts
            .values()
            .find(|cart| cart.owner().as_ref() == Some(owner))
            .cloned()
    }

    fn insert_cart(&mut self, owner: &Owner) -> Cart {
        let cart = Cart {
            id: Uuid::new_v4(),
            user_id: owner.user_id(),
            session_id: owner.session_id(),
            created_at: Utc::now(),
        };
        self.carts.insert(cart.id, cart.clone());
        cart
    }

    fn line_with_key(&self, cart_id: Uuid, key: LineKey) -> Option<Uuid> {
        self.lines
            .values()
            .find(|stored| stored.line.cart_id == cart_id && stored.line.key() == key)
            .map(|stored| stored.line.id)
    }

    fn display(&self, key: LineKey) -> LineProduct {
        let Some(product) = self.products.get(&key.product_id) else {
            return LineProduct::default();
        };
        let variant = key.variant_id.and_then(|id| self.variants.get(&id));
        LineProduct {
            name: match variant {
                Some(v) => format!("{} - {}", product.name, v.name),
                None => product.name.clone(),
            },
            unit_price: variant.and_then(|v| v.price).unwrap_or(product.price),
            image_url: product.image_url.clone(),
        }
    }

    fn validate_key(&self, key: LineKey) -> AppResult<()> {
        if !self.products.contains_key(&key.product_id) {
            return Err(AppError::validation("product not found"));
        }
        if let Some(variant_id) = key.variant_id {
            match self.variants.get(&variant_id) {
                Some(v) if v.product_id == key.product_id => {}
                _ => return Err(AppError::validation("variant does not belong to product")),
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means a test panicked mid-operation.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_product(&self, name: &str, price: i64) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().products.insert(
            id,
            ProductEntry {
                name: name.to_string(),
                price,
                image_url: Some(format!("https://cdn.example.com/products/{id}.jpg")),
            },
        );
        id
    }

    pub fn add_variant(&self, product_id: Uuid, name: &str, price: Option<i64>) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().variants.insert(
            id,
            VariantEntry {
                product_id,
                name: name.to_string(),
                price,
            },
        );
        id
    }

    /// Makes every subsequent call of `op` fail with `RemoteUnavailable`.
    pub fn fail(&self, op: Op) {
        self.lock().failing.insert(op);
    }

    /// Makes line-addressed calls touching `line_id` fail.
    pub fn fail_line(&self, line_id: Uuid) {
        self.lock().failing_lines.insert(line_id);
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn heal(&self) {
        let mut inner = self.lock();
        inner.failing.clear();
        inner.failing_lines.clear();
        inner.offline = false;
    }

    /// The next cart creation loses a race: another writer's cart for the same
    /// owner appears first and the insert reports a conflict.
    pub fn race_next_create(&self) {
        self.lock().create_race = true;
    }

    /// The next `move_line` finds that a line with the same key, holding
    /// `quantity`, was just added to the target cart by another writer.
    pub fn race_next_move(&self, quantity: i32) {
        self.lock().move_race = Some(quantity);
    }

    /// Makes calls of `op` yield to the scheduler `yields` times before they
    /// touch any state, so concurrent callers can interleave with them.
    pub fn slow(&self, op: Op, yields: usize) {
        self.lock().slow.insert(op, yields);
    }

    async fn pause(&self, op: Op) {
        let yields = self.lock().slow.get(&op).copied().unwrap_or(0);
        for _ in 0..yields {
            tokio::task::yield_now().await;
        }
    }

    pub fn cart_count(&self) -> usize {
        self.lock().carts.len()
    }

    pub fn line_count(&self) -> usize {
        self.lock().lines.len()
    }
}

#[async_trait]
impl CartBackend for MemoryBackend {
    async fn find_cart(&self, owner: &Owner) -> AppResult<Option<Cart>> {
        let inner = self.lock();
        inner.check(Op::FindCart)?;
        Ok(inner.find_cart(owner))
    }

    async fn get_or_create_cart(&self, owner: &Owner) -> AppResult<Cart> {
        for _ in 0..2 {
            let mut inner = self.lock();
            inner.check(Op::FindCart)?;
            if let Some(cart) = inner.find_cart(owner) {
                return Ok(cart);
            }
            inner.check(Op::CreateCart)?;
            if inner.create_race {
                inner.create_race = false;
                inner.insert_cart(owner);
                tracing::debug!(owner = %owner, "cart creation raced, re-fetching");
                continue;
            }
            return Ok(inner.insert_cart(owner));
        }
        Err(AppError::Conflict(format!("cart for {owner}")))
    }

    async fn list_lines(&self, cart_id: Uuid) -> AppResult<Vec<CartLineView>> {
        let inner = self.lock();
        inner.check(Op::ListLines)?;
        let mut lines: Vec<&StoredLine> = inner
            .lines
            .values()
            .filter(|stored| stored.line.cart_id == cart_id)
            .collect();
        lines.sort_by_key(|stored| stored.seq);
        Ok(lines
            .into_iter()
            .map(|stored| CartLineView {
                id: stored.line.id,
                product_id: stored.line.product_id,
                variant_id: stored.line.variant_id,
                quantity: stored.line.quantity,
                product: inner.display(stored.line.key()),
            })
            .collect())
    }

    async fn add_line(&self, cart_id: Uuid, key: LineKey, quantity: i32) -> AppResult<CartLine> {
        self.pause(Op::AddLine).await;
        if quantity <= 0 {
            return Err(AppError::validation("quantity must be greater than 0"));
        }
        let mut inner = self.lock();
        inner.check(Op::AddLine)?;
        inner.validate_key(key)?;
        if !inner.carts.contains_key(&cart_id) {
            return Err(AppError::validation("referenced record does not exist: cart"));
        }

        if let Some(line_id) = inner.line_with_key(cart_id, key) {
            inner.check_line(Op::AddLine, line_id)?;
            let stored = inner.lines.get_mut(&line_id).ok_or(AppError::NotFound)?;
            stored.line.quantity = combined_quantity(stored.line.quantity, quantity)?;
            return Ok(stored.line.clone());
        }

        let line = CartLine {
            id: Uuid::new_v4(),
            cart_id,
            product_id: key.product_id,
            variant_id: key.variant_id,
            quantity,
            created_at: Utc::now(),
        };
        let seq = inner.next_seq();
        inner.lines.insert(
            line.id,
            StoredLine {
                line: line.clone(),
                seq,
            },
        );
        Ok(line)
    }

    async fn set_line_quantity(
        &self,
        line_id: Uuid,
        quantity: i32,
    ) -> AppResult<Option<CartLine>> {
        if quantity <= 0 {
            self.remove_line(line_id).await?;
            return Ok(None);
        }
        let mut inner = self.lock();
        inner.check_line(Op::SetQuantity, line_id)?;
        let stored = inner.lines.get_mut(&line_id).ok_or(AppError::NotFound)?;
        stored.line.quantity = quantity;
        Ok(Some(stored.line.clone()))
    }

    async fn remove_line(&self, line_id: Uuid) -> AppResult<()> {
        self.pause(Op::RemoveLine).await;
        let mut inner = self.lock();
        inner.check_line(Op::RemoveLine, line_id)?;
        inner
            .lines
            .remove(&line_id)
            .map(|_| ())
            .ok_or(AppError::NotFound)
    }

    async fn move_line(&self, line_id: Uuid, cart_id: Uuid) -> AppResult<CartLine> {
        let mut inner = self.lock();
        inner.check_line(Op::MoveLine, line_id)?;
        let key = inner
            .lines
            .get(&line_id)
            .map(|stored| stored.line.key())
            .ok_or(AppError::NotFound)?;
        if !inner.carts.contains_key(&cart_id) {
            return Err(AppError::validation("referenced record does not exist: cart"));
        }
        if let Some(quantity) = inner.move_race.take() {
            let line = CartLine {
                id: Uuid::new_v4(),
                cart_id,
                product_id: key.product_id,
                variant_id: key.variant_id,
                quantity,
                created_at: Utc::now(),
            };
            let seq = inner.next_seq();
            inner.lines.insert(line.id, StoredLine { line, seq });
        }
        if inner.line_with_key(cart_id, key).is_some() {
            return Err(AppError::Conflict(
                "cart_lines_cart_product_variant_key".into(),
            ));
        }
        let stored = inner.lines.get_mut(&line_id).ok_or(AppError::NotFound)?;
        stored.line.cart_id = cart_id;
        Ok(stored.line.clone())
    }

    async fn clear_cart(&self, cart_id: Uuid) -> AppResult<()> {
        self.pause(Op::ClearCart).await;
        let mut inner = self.lock();
        inner.check(Op::ClearCart)?;
        inner.lines.retain(|_, stored| stored.line.cart_id != cart_id);
        Ok(())
    }

    async fn delete_cart(&self, cart_id: Uuid) -> AppResult<()> {
        let mut inner = self.lock();
        inner.check(Op::DeleteCart)?;
        if inner.carts.remove(&cart_id).is_none() {
            return Err(AppError::NotFound);
        }
        inner.lines.retain(|_, stored| stored.line.cart_id != cart_id);
        Ok(())
    }
}

#[async_trait]
impl FavoriteBackend for MemoryBackend {
    async fn load_favorites(&self, user_id: Uuid) -> AppResult<HashSet<Uuid>> {
        let inner = self.lock();
        inner.check(Op::LoadFavorites)?;
        Ok(inner
            .favorites
            .iter()
            .filter(|(user, _)| *user == user_id)
            .map(|(_, product)| *product)
            .collect())
    }

    async fn toggle_favorite(&self, user_id: Uuid, product_id: Uuid) -> AppResult<bool> {
        let mut inner = self.lock();
        inner.check(Op::ToggleFavorite)?;
        if !inner.products.contains_key(&product_id) {
            return Err(AppError::validation("product not found"));
        }
        let key = (user_id, product_id);
        if inner.favorites.remove(&key) {
            Ok(false)
        } else {
            inner.favorites.insert(key);
            Ok(true)
        }
    }
}
