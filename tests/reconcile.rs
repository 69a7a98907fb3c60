use std::sync::Arc;

use storefront_cart::{
    backend::CartBackend,
    client::{
        identity::{MemoryIdentityStorage, SessionIdentityResolver},
        reconcile::{AuthState, CartReconciler, merge_carts},
    },
    error::AppError,
    memory::{MemoryBackend, Op},
    models::{LineKey, Owner},
};
use uuid::Uuid;

async fn cart_with(
    backend: &MemoryBackend,
    owner: &Owner,
    lines: &[(Uuid, Option<Uuid>, i32)],
) -> anyhow::Result<Uuid> {
    let cart = backend.get_or_create_cart(owner).await?;
    for (product_id, variant_id, quantity) in lines {
        backend
            .add_line(cart.id, LineKey::new(*product_id, *variant_id), *quantity)
            .await?;
    }
    Ok(cart.id)
}

async fn contents(backend: &MemoryBackend, owner: &Owner) -> anyhow::Result<Vec<(LineKey, i32)>> {
    let Some(cart) = backend.find_cart(owner).await? else {
        return Ok(Vec::new());
    };
    let mut lines: Vec<_> = backend
        .list_lines(cart.id)
        .await?
        .into_iter()
        .map(|l| (l.key(), l.quantity))
        .collect();
    lines.sort();
    Ok(lines)
}

#[tokio::test]
async fn merge_sums_matching_lines_and_moves_the_rest() -> anyhow::Result<()> {
    let backend = MemoryBackend::new();
    let p1 = backend.add_product("Ferris Mug", 120_000);
    let p2 = backend.add_product("Rust Sticker Pack", 50_000);
    let anon = Owner::Anonymous(Uuid::new_v4());
    let user = Owner::User(Uuid::new_v4());
    cart_with(&backend, &anon, &[(p1, None, 2)]).await?;
    cart_with(&backend, &user, &[(p1, None, 1), (p2, None, 1)]).await?;

    let report = merge_carts(&backend, &anon, &user).await?;
    assert_eq!(report.combined, 1);
    assert_eq!(report.moved, 0);
    assert!(report.is_complete());
    assert!(report.anonymous_cart_deleted);

    let mut expected = vec![(LineKey::new(p1, None), 3), (LineKey::new(p2, None), 1)];
    expected.sort();
    assert_eq!(contents(&backend, &user).await?, expected);
    assert!(backend.find_cart(&anon).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn merge_moves_lines_and_creates_user_cart() -> anyhow::Result<()> {
    let backend = MemoryBackend::new();
    let hoodie = backend.add_product("Axum Hoodie", 550_000);
    let xl = backend.add_variant(hoodie, "XL", Some(600_000));
    let anon = Owner::Anonymous(Uuid::new_v4());
    let user = Owner::User(Uuid::new_v4());
    cart_with(&backend, &anon, &[(hoodie, Some(xl), 1), (hoodie, None, 2)]).await?;

    let report = merge_carts(&backend, &anon, &user).await?;
    assert_eq!(report.moved, 2);
    assert_eq!(backend.cart_count(), 1);
    assert_eq!(contents(&backend, &user).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn merging_twice_changes_nothing() -> anyhow::Result<()> {
    let backend = MemoryBackend::new();
    let p1 = backend.add_product("Ferris Mug", 120_000);
    let p2 = backend.add_product("Rust Sticker Pack", 50_000);
    let anon = Owner::Anonymous(Uuid::new_v4());
    let user = Owner::User(Uuid::new_v4());
    cart_with(&backend, &anon, &[(p1, None, 2), (p2, None, 5)]).await?;
    cart_with(&backend, &user, &[(p1, None, 1)]).await?;

    merge_carts(&backend, &anon, &user).await?;
    let after_first = contents(&backend, &user).await?;

    let second = merge_carts(&backend, &anon, &user).await?;
    assert_eq!(second.moved + second.combined + second.failed, 0);
    assert_eq!(contents(&backend, &user).await?, after_first);
    Ok(())
}

#[tokio::test]
async fn merge_without_anonymous_cart_creates_nothing() -> anyhow::Result<()> {
    let backend = MemoryBackend::new();
    let anon = Owner::Anonymous(Uuid::new_v4());
    let user = Owner::User(Uuid::new_v4());

    let report = merge_carts(&backend, &anon, &user).await?;
    assert!(!report.anonymous_cart_deleted);
    assert_eq!(backend.cart_count(), 0);
    Ok(())
}

#[tokio::test]
async fn failing_line_is_skipped_and_others_merge() -> anyhow::Result<()> {
    let backend = MemoryBackend::new();
    let p1 = backend.add_product("Ferris Mug", 120_000);
    let p2 = backend.add_product("Rust Sticker Pack", 50_000);
    let p3 = backend.add_product("E-book: Async Rust", 250_000);
    let anon = Owner::Anonymous(Uuid::new_v4());
    let user = Owner::User(Uuid::new_v4());
    let anon_cart = cart_with(&backend, &anon, &[(p1, None, 1), (p2, None, 1), (p3, None, 1)]).await?;

    let broken = backend
        .list_lines(anon_cart)
        .await?
        .into_iter()
        .find(|l| l.product_id == p2)
        .map(|l| l.id)
        .expect("p2 line");
    backend.fail_line(broken);

    let report = merge_carts(&backend, &anon, &user).await?;
    assert_eq!(report.moved, 2);
    assert_eq!(report.failed, 1);
    assert!(!report.is_complete());

    let keys: Vec<_> = contents(&backend, &user).await?.into_iter().map(|(k, _)| k).collect();
    assert!(keys.contains(&LineKey::new(p1, None)));
    assert!(keys.contains(&LineKey::new(p3, None)));
    assert!(!keys.contains(&LineKey::new(p2, None)));
    Ok(())
}

#[tokio::test]
async fn combined_quantity_past_range_counts_as_failure() -> anyhow::Result<()> {
    let backend = MemoryBackend::new();
    let mug = backend.add_product("Ferris Mug", 120_000);
    let sticker = backend.add_product("Rust Sticker Pack", 50_000);
    let anon = Owner::Anonymous(Uuid::new_v4());
    let user = Owner::User(Uuid::new_v4());
    cart_with(&backend, &anon, &[(mug, None, 1), (sticker, None, 2)]).await?;
    cart_with(&backend, &user, &[(mug, None, i32::MAX)]).await?;

    let report = merge_carts(&backend, &anon, &user).await?;
    assert_eq!(report.failed, 1);
    assert_eq!(report.moved, 1);

    let mut expected = vec![
        (LineKey::new(mug, None), i32::MAX),
        (LineKey::new(sticker, None), 2),
    ];
    expected.sort();
    assert_eq!(contents(&backend, &user).await?, expected);
    Ok(())
}

#[tokio::test]
async fn move_conflict_folds_into_the_new_line() -> anyhow::Result<()> {
    let backend = MemoryBackend::new();
    let p1 = backend.add_product("Ferris Mug", 120_000);
    let anon = Owner::Anonymous(Uuid::new_v4());
    let user = Owner::User(Uuid::new_v4());
    cart_with(&backend, &anon, &[(p1, None, 2)]).await?;
    cart_with(&backend, &user, &[]).await?;

    // Another tab adds the same product between listing and re-parenting.
    backend.race_next_move(1);
    let report = merge_carts(&backend, &anon, &user).await?;
    assert_eq!(report.moved, 1);
    assert!(report.is_complete());
    assert_eq!(contents(&backend, &user).await?, vec![(LineKey::new(p1, None), 3)]);
    assert!(backend.find_cart(&anon).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn unavailable_move_counts_as_failure() -> anyhow::Result<()> {
    let backend = MemoryBackend::new();
    let p1 = backend.add_product("Ferris Mug", 120_000);
    let anon = Owner::Anonymous(Uuid::new_v4());
    let user = Owner::User(Uuid::new_v4());
    cart_with(&backend, &anon, &[(p1, None, 2)]).await?;

    backend.fail(Op::MoveLine);
    let report = merge_carts(&backend, &anon, &user).await?;
    assert_eq!(report.failed, 1);
    assert!(contents(&backend, &user).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn reconciler_walks_the_sign_in_states() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let p1 = backend.add_product("Ferris Mug", 120_000);
    let identity = SessionIdentityResolver::init(MemoryIdentityStorage::default()).await;
    let anon = identity.current_owner();
    cart_with(&backend, &anon, &[(p1, None, 2)]).await?;

    let mut reconciler = CartReconciler::new(backend.clone(), identity);
    assert_eq!(reconciler.state(), AuthState::Anonymous);

    let user_id = Uuid::new_v4();
    assert!(matches!(
        reconciler.complete_sign_in(user_id).await,
        Err(AppError::Validation(_))
    ));

    reconciler.begin_sign_in()?;
    assert_eq!(reconciler.state(), AuthState::Authenticating);
    let report = reconciler.complete_sign_in(user_id).await?;
    assert_eq!(report.moved, 1);
    assert_eq!(reconciler.state(), AuthState::Authenticated);
    assert_eq!(reconciler.owner(), Owner::User(user_id));
    assert!(reconciler.identity().anonymous_id().is_none());

    let next = reconciler.sign_out().await?;
    assert!(next.is_anonymous());
    assert_ne!(next, anon);
    assert_eq!(reconciler.state(), AuthState::Anonymous);
    // The user's cart stays with the user.
    assert_eq!(contents(&backend, &Owner::User(user_id)).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn unreachable_backend_still_authenticates() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let identity = SessionIdentityResolver::init(MemoryIdentityStorage::default()).await;
    let mut reconciler = CartReconciler::new(backend.clone(), identity);

    backend.set_offline(true);
    reconciler.begin_sign_in()?;
    let report = reconciler.complete_sign_in(Uuid::new_v4()).await?;
    assert!(!report.is_complete());
    assert_eq!(reconciler.state(), AuthState::Authenticated);
    Ok(())
}

#[tokio::test]
async fn aborted_sign_in_returns_to_anonymous() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let identity = SessionIdentityResolver::init(MemoryIdentityStorage::default()).await;
    let anon = identity.current_owner();
    let mut reconciler = CartReconciler::new(backend, identity);

    reconciler.begin_sign_in()?;
    reconciler.abort_sign_in()?;
    assert_eq!(reconciler.state(), AuthState::Anonymous);
    assert_eq!(reconciler.owner(), anon);
    assert!(reconciler.sign_out().await.is_err());
    Ok(())
}
