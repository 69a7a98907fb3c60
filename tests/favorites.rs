use std::sync::Arc;

use storefront_cart::{
    backend::FavoriteBackend,
    client::favorites::FavoritesSet,
    error::AppError,
    memory::{MemoryBackend, Op},
    models::Owner,
};
use uuid::Uuid;

#[tokio::test]
async fn toggle_flips_membership() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let mug = backend.add_product("Ferris Mug", 120_000);
    let user_id = Uuid::new_v4();
    let favorites = FavoritesSet::new(backend.clone());

    assert!(favorites.toggle(user_id, mug).await?);
    assert!(favorites.contains(mug));
    assert!(!favorites.toggle(user_id, mug).await?);
    assert!(!favorites.contains(mug));

    assert!(!backend.load_favorites(user_id).await?.contains(&mug));
    favorites.load(&Owner::User(user_id)).await?;
    assert!(favorites.ids().is_empty());
    Ok(())
}

#[tokio::test]
async fn local_state_follows_the_server_answer() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let mug = backend.add_product("Ferris Mug", 120_000);
    let user_id = Uuid::new_v4();
    // Favorited from another device; this set has not loaded yet.
    backend.toggle_favorite(user_id, mug).await?;

    let favorites = FavoritesSet::new(backend.clone());
    assert!(!favorites.contains(mug));
    let favorited = favorites.toggle(user_id, mug).await?;
    assert!(!favorited);
    assert!(!favorites.contains(mug));
    Ok(())
}

#[tokio::test]
async fn anonymous_shoppers_have_no_favorites() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    backend.set_offline(true);
    let favorites = FavoritesSet::new(backend);

    favorites.load(&Owner::Anonymous(Uuid::new_v4())).await?;
    assert!(favorites.ids().is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_toggle_leaves_local_state_alone() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let mug = backend.add_product("Ferris Mug", 120_000);
    let user_id = Uuid::new_v4();
    let favorites = FavoritesSet::new(backend.clone());
    favorites.toggle(user_id, mug).await?;

    backend.fail(Op::ToggleFavorite);
    let err = favorites.toggle(user_id, mug).await.unwrap_err();
    assert!(matches!(err, AppError::RemoteUnavailable(_)));
    assert!(favorites.contains(mug));
    Ok(())
}

#[tokio::test]
async fn failed_load_is_reported_until_the_next_success() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let mug = backend.add_product("Ferris Mug", 120_000);
    let user = Owner::User(Uuid::new_v4());
    let favorites = FavoritesSet::new(backend.clone());
    favorites.toggle(user.user_id().expect("user"), mug).await?;

    backend.fail(Op::LoadFavorites);
    let err = favorites.load(&user).await.unwrap_err();
    assert!(matches!(err, AppError::RemoteUnavailable(_)));
    assert!(favorites.last_error().is_some());
    assert!(favorites.ids().is_empty());

    backend.heal();
    favorites.load(&user).await?;
    assert!(favorites.last_error().is_none());
    assert!(favorites.contains(mug));
    Ok(())
}

#[tokio::test]
async fn unknown_product_is_rejected() {
    let backend = Arc::new(MemoryBackend::new());
    let favorites = FavoritesSet::new(backend);
    let err = favorites
        .toggle(Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}
