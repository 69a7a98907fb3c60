//! Client-side cart state container.
//!
//! Mutations update local state first, then make a single remote call. On
//! success the line adopts the server's values; on failure the command is
//! rolled back and the error is returned for the shopper to retry. Calls on
//! the same line key are serialized; different lines run independently. A
//! clear waits for every in-flight line call and holds new ones back until it
//! settles.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock, watch};
use uuid::Uuid;

use crate::{
    backend::CartBackend,
    client::commands::{CartCommand, CartState, LocalLine, Undo},
    error::{AppError, AppResult},
    models::{CartLineView, LineKey, LineProduct, Owner},
};

/// What subscribers see after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartSnapshot {
    pub owner: Owner,
    pub cart_id: Option<Uuid>,
    pub lines: Vec<LocalLine>,
    /// At least one remote call is outstanding.
    pub loading: bool,
    pub last_error: Option<String>,
}

impl CartSnapshot {
    pub fn item_count(&self) -> i64 {
        self.lines.iter().map(|l| i64::from(l.view.quantity)).sum()
    }

    pub fn subtotal(&self) -> i64 {
        self.lines.iter().map(|l| l.view.line_total()).sum()
    }
}

struct Inner {
    owner: Owner,
    cart: CartState,
    in_flight: usize,
    last_error: Option<String>,
}

pub struct CartStore<B: CartBackend + ?Sized> {
    backend: Arc<B>,
    inner: Mutex<Inner>,
    line_locks: Mutex<HashMap<LineKey, Arc<AsyncMutex<()>>>>,
    cart_lock: AsyncMutex<()>,
    /// Line mutations hold this for read, `clear` for write.
    mutation_gate: RwLock<()>,
    tx: watch::Sender<CartSnapshot>,
}

impl<B: CartBackend + ?Sized> CartStore<B> {
    pub fn new(backend: Arc<B>, owner: Owner) -> Self {
        let inner = Inner {
            owner,
            cart: CartState::default(),
            in_flight: 0,
            last_error: None,
        };
        let (tx, _rx) = watch::channel(snapshot_of(&inner));
        Self {
            backend,
            inner: Mutex::new(inner),
            line_locks: Mutex::new(HashMap::new()),
            cart_lock: AsyncMutex::new(()),
            mutation_gate: RwLock::new(()),
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> CartSnapshot {
        snapshot_of(&self.lock())
    }

    pub fn owner(&self) -> Owner {
        self.lock().owner
    }

    pub fn lines(&self) -> Vec<CartLineView> {
        self.lock().cart.views()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs `f` against the state and notifies subscribers.
    fn update<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.lock();
        let out = f(&mut inner);
        self.tx.send_replace(snapshot_of(&inner));
        out
    }

    async fn lock_line(&self, key: LineKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.line_locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(key).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Fetches the owner's existing cart. Never creates one.
    pub async fn load(&self) -> AppResult<()> {
        let (owner, generation) = {
            let inner = self.lock();
            (inner.owner, inner.cart.generation)
        };
        self.update(|inner| inner.in_flight += 1);

        let result: AppResult<(Option<Uuid>, Vec<CartLineView>)> = async {
            let Some(cart) = self.backend.find_cart(&owner).await? else {
                return Ok((None, Vec::new()));
            };
            let lines = self.backend.list_lines(cart.id).await?;
            Ok((Some(cart.id), lines))
        }
        .await;

        self.update(|inner| {
            inner.in_flight -= 1;
            if inner.cart.generation != generation {
                return;
            }
            match &result {
                Ok((cart_id, lines)) => {
                    inner.cart.cart_id = *cart_id;
                    inner.cart.replace_lines(lines.clone());
                    inner.last_error = None;
                }
                Err(err) => inner.last_error = Some(err.to_string()),
            }
        });

        result.map(|_| ()).inspect_err(|err| {
            tracing::warn!(owner = %owner, operation = "load", error = %err, "cart load failed");
        })
    }

    /// Points the store at a different owner and loads that owner's cart.
    pub async fn switch_owner(&self, owner: Owner) -> AppResult<()> {
        self.line_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.update(|inner| {
            let generation = inner.cart.generation + 1;
            inner.owner = owner;
            inner.cart = CartState {
                generation,
                ..CartState::default()
            };
            inner.last_error = None;
        });
        self.load().await
    }

    async fn ensure_cart(&self) -> AppResult<Uuid> {
        if let Some(id) = self.lock().cart.cart_id {
            return Ok(id);
        }
        let _guard = self.cart_lock.lock().await;
        let (owner, generation) = {
            let inner = self.lock();
            if let Some(id) = inner.cart.cart_id {
                return Ok(id);
            }
            (inner.owner, inner.cart.generation)
        };

        let cart = self
            .backend
            .get_or_create_cart(&owner)
            .await
            .inspect_err(|err| {
                tracing::warn!(owner = %owner, operation = "get_or_create_cart", error = %err, "cart unavailable");
            })?;
        self.update(|inner| {
            if inner.cart.generation == generation {
                inner.cart.cart_id = Some(cart.id);
            }
        });
        Ok(cart.id)
    }

    pub async fn add_line(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
        product: LineProduct,
    ) -> AppResult<()> {
        let key = LineKey::new(product_id, variant_id);
        let command = CartCommand::AddLine {
            key,
            quantity,
            product,
        };
        command.validate()?;

        let _gate = self.mutation_gate.read().await;
        let cart_id = self.ensure_cart().await?;
        let _line = self.lock_line(key).await;

        let (undo, generation) = self.begin(&command)?;

        let result = self.backend.add_line(cart_id, key, quantity).await;
        self.update(|inner| {
            inner.in_flight -= 1;
            if inner.cart.generation != generation {
                return;
            }
            match &result {
                Ok(line) => {
                    inner.cart.confirm(line);
                    inner.last_error = None;
                }
                Err(err) => {
                    undo.rollback(&mut inner.cart);
                    inner.last_error = Some(err.to_string());
                }
            }
        });

        result.map(|_| ()).inspect_err(|err| {
            tracing::warn!(
                cart_id = %cart_id,
                product_id = %product_id,
                operation = "add_line",
                error = %err,
                "cart mutation rolled back"
            );
        })
    }

    /// A quantity of zero or less removes the line.
    pub async fn set_line_quantity(&self, line_id: Uuid, quantity: i32) -> AppResult<()> {
        if quantity <= 0 {
            return self.remove_line(line_id).await;
        }
        let key = self.key_of(line_id)?;
        let _gate = self.mutation_gate.read().await;
        let _line = self.lock_line(key).await;
        // An add may have confirmed the line under a new id meanwhile.
        let current_id = self.current_id(key)?;

        let command = CartCommand::SetQuantity { key, quantity };
        let (undo, generation) = self.begin(&command)?;

        let result = self.backend.set_line_quantity(current_id, quantity).await;
        self.update(|inner| {
            inner.in_flight -= 1;
            if inner.cart.generation != generation {
                return;
            }
            match &result {
                Ok(Some(line)) => {
                    inner.cart.confirm(line);
                    inner.last_error = None;
                }
                Ok(None) => {
                    inner.cart.confirm_removed(key);
                    inner.last_error = None;
                }
                Err(err) => {
                    undo.rollback(&mut inner.cart);
                    inner.last_error = Some(err.to_string());
                }
            }
        });

        result.map(|_| ()).inspect_err(|err| {
            tracing::warn!(
                line_id = %current_id,
                operation = "set_line_quantity",
                error = %err,
                "cart mutation rolled back"
            );
        })
    }

    pub async fn remove_line(&self, line_id: Uuid) -> AppResult<()> {
        let key = self.key_of(line_id)?;
        let _gate = self.mutation_gate.read().await;
        let _line = self.lock_line(key).await;
        let current_id = self.current_id(key)?;

        let (undo, generation) = self.begin(&CartCommand::RemoveLine { key })?;

        let result = self.backend.remove_line(current_id).await;
        self.update(|inner| {
            inner.in_flight -= 1;
            if inner.cart.generation != generation {
                return;
            }
            match &result {
                Ok(()) => inner.last_error = None,
                Err(err) => {
                    undo.rollback(&mut inner.cart);
                    inner.last_error = Some(err.to_string());
                }
            }
        });

        result.inspect_err(|err| {
            tracing::warn!(
                line_id = %current_id,
                operation = "remove_line",
                error = %err,
                "cart mutation rolled back"
            );
        })
    }

    pub async fn clear(&self) -> AppResult<()> {
        let _gate = self.mutation_gate.write().await;
        let Some(cart_id) = self.lock().cart.cart_id else {
            return Ok(());
        };

        let (undo, generation) = self.begin(&CartCommand::Clear)?;

        let result = self.backend.clear_cart(cart_id).await;
        self.update(|inner| {
            inner.in_flight -= 1;
            if inner.cart.generation != generation {
                return;
            }
            match &result {
                Ok(()) => inner.last_error = None,
                Err(err) => {
                    undo.rollback(&mut inner.cart);
                    inner.last_error = Some(err.to_string());
                }
            }
        });

        result.inspect_err(|err| {
            tracing::warn!(cart_id = %cart_id, operation = "clear_cart", error = %err, "cart mutation rolled back");
        })
    }

    /// Applies `command` locally and counts the remote call that follows.
    fn begin(&self, command: &CartCommand) -> AppResult<(Undo, u64)> {
        self.update(|inner| {
            let undo = command.apply(&mut inner.cart)?;
            inner.in_flight += 1;
            Ok((undo, inner.cart.generation))
        })
    }

    fn key_of(&self, line_id: Uuid) -> AppResult<LineKey> {
        self.lock()
            .cart
            .line_by_id(line_id)
            .map(LocalLine::key)
            .ok_or(AppError::NotFound)
    }

    fn current_id(&self, key: LineKey) -> AppResult<Uuid> {
        self.lock()
            .cart
            .line(key)
            .map(|l| l.view.id)
            .ok_or(AppError::NotFound)
    }
}

fn snapshot_of(inner: &Inner) -> CartSnapshot {
    CartSnapshot {
        owner: inner.owner,
        cart_id: inner.cart.cart_id,
        lines: inner.cart.lines.clone(),
        loading: inner.in_flight > 0,
        last_error: inner.last_error.clone(),
    }
}
