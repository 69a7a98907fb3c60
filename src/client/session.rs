//! Wires identity, cart and favorites together for one shopper.

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    backend::{CartBackend, FavoriteBackend},
    client::{
        favorites::FavoritesSet,
        identity::{IdentityStorage, SessionIdentityResolver},
        reconcile::{AuthState, CartReconciler, MergeReport},
        store::CartStore,
    },
    error::AppResult,
    models::Owner,
};

pub struct ShopperSession<B: CartBackend + FavoriteBackend + ?Sized> {
    reconciler: CartReconciler<B>,
    cart: CartStore<B>,
    favorites: FavoritesSet<B>,
}

impl<B: CartBackend + FavoriteBackend + ?Sized> ShopperSession<B> {
    /// Resolves the stored identity and loads its cart and favorites. Load
    /// failures are recorded in the cart snapshot and
    /// [`FavoritesSet::last_error`], not returned.
    pub async fn start(backend: Arc<B>, storage: impl IdentityStorage + 'static) -> Self {
        let identity = SessionIdentityResolver::init(storage).await;
        let owner = identity.current_owner();
        let session = Self {
            cart: CartStore::new(backend.clone(), owner),
            favorites: FavoritesSet::new(backend.clone()),
            reconciler: CartReconciler::new(backend, identity),
        };
        let _ = session.cart.load().await;
        let _ = session.favorites.load(&owner).await;
        session
    }

    pub fn cart(&self) -> &CartStore<B> {
        &self.cart
    }

    pub fn favorites(&self) -> &FavoritesSet<B> {
        &self.favorites
    }

    pub fn auth_state(&self) -> AuthState {
        self.reconciler.state()
    }

    pub fn owner(&self) -> Owner {
        self.reconciler.owner()
    }

    pub fn begin_sign_in(&mut self) -> AppResult<()> {
        self.reconciler.begin_sign_in()
    }

    pub fn abort_sign_in(&mut self) -> AppResult<()> {
        self.reconciler.abort_sign_in()
    }

    /// Merges the anonymous cart, then points the cart and favorites at the
    /// user. The sign-in stands even if those loads fail; the failures show
    /// up in the cart snapshot and [`FavoritesSet::last_error`].
    pub async fn complete_sign_in(&mut self, user_id: Uuid) -> AppResult<MergeReport> {
        let report = self.reconciler.complete_sign_in(user_id).await?;
        let owner = self.reconciler.owner();
        let _ = self.cart.switch_owner(owner).await;
        let _ = self.favorites.load(&owner).await;
        Ok(report)
    }

    pub async fn sign_out(&mut self) -> AppResult<Owner> {
        let owner = self.reconciler.sign_out().await?;
        self.favorites.clear();
        let _ = self.cart.switch_owner(owner).await;
        Ok(owner)
    }
}
