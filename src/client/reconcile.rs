//! Login-time cart reconciliation.
//!
//! ```text
//! Anonymous --begin_sign_in--> Authenticating --complete_sign_in--> Merging --> Authenticated
//!     ^            abort_sign_in |                                                   |
//!     +--------------------------+---------------------- sign_out ------------------+
//! ```

use std::{collections::HashMap, sync::Arc};

use serde::Serialize;
use uuid::Uuid;

use crate::{
    backend::CartBackend,
    client::identity::SessionIdentityResolver,
    error::{AppError, AppResult},
    models::{CartLineView, LineKey, Owner, combined_quantity},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthState {
    Anonymous,
    Authenticating,
    Merging,
    Authenticated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Anonymous lines re-parented onto the user cart.
    pub moved: usize,
    /// Anonymous lines summed into an existing user line.
    pub combined: usize,
    pub failed: usize,
    pub anonymous_cart_deleted: bool,
}

impl MergeReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Folds the anonymous owner's cart into the user's cart.
///
/// Best effort: a failing line is logged and skipped, the rest still merge.
/// Running it again after a full merge is a no-op because the anonymous cart
/// no longer exists.
pub async fn merge_carts<B: CartBackend + ?Sized>(
    backend: &B,
    anonymous: &Owner,
    user: &Owner,
) -> AppResult<MergeReport> {
    let mut report = MergeReport::default();

    let Some(anon_cart) = backend.find_cart(anonymous).await? else {
        tracing::debug!(anonymous = %anonymous, "no anonymous cart to merge");
        return Ok(report);
    };
    let user_cart = backend.get_or_create_cart(user).await?;
    if anon_cart.id == user_cart.id {
        return Ok(report);
    }

    let anon_lines = backend.list_lines(anon_cart.id).await?;
    let mut user_lines: HashMap<LineKey, CartLineView> = backend
        .list_lines(user_cart.id)
        .await?
        .into_iter()
        .map(|line| (line.key(), line))
        .collect();

    for line in anon_lines {
        let key = line.key();
        let outcome = match user_lines.get(&key) {
            Some(existing) => {
                combine(backend, existing, &line).await.map(|quantity| {
                    report.combined += 1;
                    quantity
                })
            }
            None => move_or_add(backend, &line, user_cart.id).await.map(|quantity| {
                report.moved += 1;
                quantity
            }),
        };

        match outcome {
            Ok(quantity) => {
                if let Some(existing) = user_lines.get_mut(&key) {
                    existing.quantity = quantity;
                } else {
                    user_lines.insert(key, CartLineView { quantity, ..line });
                }
            }
            Err(err) => {
                report.failed += 1;
                tracing::warn!(
                    anonymous = %anonymous,
                    user = %user,
                    line_id = %line.id,
                    product_id = %line.product_id,
                    operation = "merge_line",
                    error = %err,
                    "skipping line during cart merge"
                );
            }
        }
    }

    match backend.delete_cart(anon_cart.id).await {
        Ok(()) => report.anonymous_cart_deleted = true,
        Err(err) => tracing::warn!(
            cart_id = %anon_cart.id,
            operation = "delete_cart",
            error = %err,
            "anonymous cart left behind after merge"
        ),
    }

    tracing::info!(
        user = %user,
        moved = report.moved,
        combined = report.combined,
        failed = report.failed,
        "cart merged"
    );
    Ok(report)
}

async fn combine<B: CartBackend + ?Sized>(
    backend: &B,
    existing: &CartLineView,
    anon: &CartLineView,
) -> AppResult<i32> {
    let quantity = combined_quantity(existing.quantity, anon.quantity)?;
    let updated = backend
        .set_line_quantity(existing.id, quantity)
        .await?
        .ok_or(AppError::NotFound)?;
    backend.remove_line(anon.id).await?;
    Ok(updated.quantity)
}

async fn move_or_add<B: CartBackend + ?Sized>(
    backend: &B,
    anon: &CartLineView,
    user_cart_id: Uuid,
) -> AppResult<i32> {
    match backend.move_line(anon.id, user_cart_id).await {
        Ok(line) => Ok(line.quantity),
        // A line with the same key landed in the user cart since we listed
        // it; fold the quantity in instead of creating a duplicate.
        Err(err) if err.is_conflict() => {
            let line = backend
                .add_line(user_cart_id, anon.key(), anon.quantity)
                .await?;
            backend.remove_line(anon.id).await?;
            Ok(line.quantity)
        }
        Err(err) => Err(err),
    }
}

pub struct CartReconciler<B: CartBackend + ?Sized> {
    backend: Arc<B>,
    identity: SessionIdentityResolver,
    state: AuthState,
}

impl<B: CartBackend + ?Sized> CartReconciler<B> {
    pub fn new(backend: Arc<B>, identity: SessionIdentityResolver) -> Self {
        let state = match identity.current_owner() {
            Owner::User(_) => AuthState::Authenticated,
            Owner::Anonymous(_) => AuthState::Anonymous,
        };
        Self {
            backend,
            identity,
            state,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn owner(&self) -> Owner {
        self.identity.current_owner()
    }

    pub fn identity(&self) -> &SessionIdentityResolver {
        &self.identity
    }

    /// Credentials were submitted or an OAuth callback arrived.
    pub fn begin_sign_in(&mut self) -> AppResult<()> {
        self.transition(AuthState::Anonymous, AuthState::Authenticating)
    }

    /// The sign-in attempt failed before a user identity was confirmed.
    pub fn abort_sign_in(&mut self) -> AppResult<()> {
        self.transition(AuthState::Authenticating, AuthState::Anonymous)
    }

    /// Runs the merge for a confirmed user and always ends `Authenticated`,
    /// even when the merge was partial or could not start.
    pub async fn complete_sign_in(&mut self, user_id: Uuid) -> AppResult<MergeReport> {
        self.transition(AuthState::Authenticating, AuthState::Merging)?;

        let report = match self.identity.begin_sign_in(user_id) {
            Some(transition) => {
                let result = merge_carts(
                    self.backend.as_ref(),
                    &transition.anonymous_owner(),
                    &transition.user_owner(),
                )
                .await;
                match result {
                    Ok(report) => report,
                    Err(err) => {
                        tracing::warn!(
                            anonymous = %transition.anonymous,
                            user_id = %user_id,
                            operation = "merge_carts",
                            error = %err,
                            "cart merge could not start"
                        );
                        MergeReport {
                            failed: 1,
                            ..MergeReport::default()
                        }
                    }
                }
            }
            None => MergeReport::default(),
        };

        self.identity.discard_anonymous().await;
        self.state = AuthState::Authenticated;
        Ok(report)
    }

    /// The user cart stays with the user record; the shopper continues with a
    /// fresh anonymous identity.
    pub async fn sign_out(&mut self) -> AppResult<Owner> {
        self.transition(AuthState::Authenticated, AuthState::Anonymous)?;
        Ok(self.identity.sign_out().await)
    }

    fn transition(&mut self, from: AuthState, to: AuthState) -> AppResult<()> {
        if self.state != from {
            return Err(AppError::validation(format!(
                "cannot move from {:?} to {:?}",
                self.state, to
            )));
        }
        self.state = to;
        Ok(())
    }
}
