//! Client-side favorites for the signed-in shopper.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

use uuid::Uuid;

use crate::{backend::FavoriteBackend, error::AppResult, models::Owner};

#[derive(Default)]
struct Inner {
    ids: HashSet<Uuid>,
    last_error: Option<String>,
}

pub struct FavoritesSet<B: FavoriteBackend + ?Sized> {
    backend: Arc<B>,
    inner: Mutex<Inner>,
}

impl<B: FavoriteBackend + ?Sized> FavoritesSet<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replaces the local set with the owner's favorites. Anonymous shoppers
    /// have none and nothing is fetched. A failed load empties the set and
    /// is kept in [`FavoritesSet::last_error`].
    pub async fn load(&self, owner: &Owner) -> AppResult<()> {
        let result = match owner {
            Owner::User(user_id) => self.backend.load_favorites(*user_id).await.inspect_err(|err| {
                tracing::warn!(user_id = %user_id, operation = "load_favorites", error = %err, "favorites load failed");
            }),
            Owner::Anonymous(_) => Ok(HashSet::new()),
        };

        let mut inner = self.lock();
        match result {
            Ok(ids) => {
                inner.ids = ids;
                inner.last_error = None;
                Ok(())
            }
            Err(err) => {
                inner.ids.clear();
                inner.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Flips membership remotely and adopts the server's answer.
    pub async fn toggle(&self, user_id: Uuid, product_id: Uuid) -> AppResult<bool> {
        let favorited = match self.backend.toggle_favorite(user_id, product_id).await {
            Ok(favorited) => favorited,
            Err(err) => {
                tracing::warn!(
                    user_id = %user_id,
                    product_id = %product_id,
                    operation = "toggle_favorite",
                    error = %err,
                    "favorite toggle failed"
                );
                self.lock().last_error = Some(err.to_string());
                return Err(err);
            }
        };

        let mut inner = self.lock();
        if favorited {
            inner.ids.insert(product_id);
        } else {
            inner.ids.remove(&product_id);
        }
        inner.last_error = None;
        Ok(favorited)
    }

    pub fn contains(&self, product_id: Uuid) -> bool {
        self.lock().ids.contains(&product_id)
    }

    pub fn ids(&self) -> HashSet<Uuid> {
        self.lock().ids.clone()
    }

    /// The most recent load or toggle failure, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn clear(&self) {
        *self.lock() = Inner::default();
    }
}
