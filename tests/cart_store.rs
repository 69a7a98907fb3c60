use std::sync::Arc;

use storefront_cart::{
    backend::CartBackend,
    client::store::CartStore,
    error::AppError,
    memory::{MemoryBackend, Op},
    models::{LineProduct, Owner},
};
use uuid::Uuid;

fn display(name: &str, unit_price: i64) -> LineProduct {
    LineProduct {
        name: name.into(),
        unit_price,
        image_url: None,
    }
}

fn anonymous() -> Owner {
    Owner::Anonymous(Uuid::new_v4())
}

#[tokio::test]
async fn repeated_adds_sum_into_one_line() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let mug = backend.add_product("Ferris Mug", 120_000);
    let store = CartStore::new(backend.clone(), anonymous());

    for quantity in [1, 2, 4] {
        store.add_line(mug, None, quantity, display("Ferris Mug", 120_000)).await?;
    }

    let lines = store.lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 7);

    let cart_id = store.snapshot().cart_id.expect("cart created on first add");
    let remote = backend.list_lines(cart_id).await?;
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].quantity, 7);
    assert_eq!(remote[0].id, lines[0].id);
    Ok(())
}

#[tokio::test]
async fn concurrent_adds_on_one_line_are_not_lost() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let hoodie = backend.add_product("Axum Hoodie", 550_000);
    let xl = backend.add_variant(hoodie, "XL", Some(600_000));
    let store = CartStore::new(backend.clone(), anonymous());

    let (a, b, c) = tokio::join!(
        store.add_line(hoodie, Some(xl), 1, LineProduct::default()),
        store.add_line(hoodie, Some(xl), 2, LineProduct::default()),
        store.add_line(hoodie, Some(xl), 3, LineProduct::default()),
    );
    a?;
    b?;
    c?;

    assert_eq!(backend.cart_count(), 1);
    assert_eq!(backend.line_count(), 1);
    let lines = store.lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 6);
    Ok(())
}

#[tokio::test]
async fn variants_are_separate_lines() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let hoodie = backend.add_product("Axum Hoodie", 550_000);
    let s = backend.add_variant(hoodie, "S", None);
    let xl = backend.add_variant(hoodie, "XL", Some(600_000));
    let store = CartStore::new(backend.clone(), anonymous());

    store.add_line(hoodie, Some(s), 1, LineProduct::default()).await?;
    store.add_line(hoodie, Some(xl), 1, LineProduct::default()).await?;
    store.add_line(hoodie, None, 1, LineProduct::default()).await?;
    assert_eq!(store.lines().len(), 3);

    store.load().await?;
    let snapshot = store.snapshot();
    assert_eq!(snapshot.lines[0].view.product.name, "Axum Hoodie - S");
    assert_eq!(snapshot.lines[1].view.product.unit_price, 600_000);
    assert_eq!(snapshot.subtotal(), 550_000 + 600_000 + 550_000);
    assert_eq!(snapshot.item_count(), 3);
    Ok(())
}

#[tokio::test]
async fn zero_quantity_add_is_rejected_before_any_call() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let mug = backend.add_product("Ferris Mug", 120_000);
    let store = CartStore::new(backend.clone(), anonymous());
    // Any remote call would fail, so a validation error proves none was made.
    backend.set_offline(true);

    let err = store
        .add_line(mug, None, 0, LineProduct::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(store.lines().is_empty());
    assert_eq!(backend.cart_count(), 0);
    Ok(())
}

#[tokio::test]
async fn setting_quantity_to_zero_removes_the_line() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let mug = backend.add_product("Ferris Mug", 120_000);
    let stickers = backend.add_product("Rust Sticker Pack", 50_000);
    let store = CartStore::new(backend.clone(), anonymous());
    store.add_line(mug, None, 2, LineProduct::default()).await?;
    store.add_line(stickers, None, 1, LineProduct::default()).await?;

    let mug_line = store.lines()[0].id;
    store.set_line_quantity(mug_line, 0).await?;

    let cart_id = store.snapshot().cart_id.expect("cart exists");
    let remote = backend.list_lines(cart_id).await?;
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].product_id, stickers);
    assert!(store.lines().iter().all(|l| l.id != mug_line));
    Ok(())
}

#[tokio::test]
async fn set_quantity_replaces_rather_than_adds() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let mug = backend.add_product("Ferris Mug", 120_000);
    let store = CartStore::new(backend.clone(), anonymous());
    store.add_line(mug, None, 2, LineProduct::default()).await?;

    let line_id = store.lines()[0].id;
    store.set_line_quantity(line_id, 5).await?;
    assert_eq!(store.lines()[0].quantity, 5);
    Ok(())
}

#[tokio::test]
async fn failed_add_rolls_back_and_reports() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let mug = backend.add_product("Ferris Mug", 120_000);
    let store = CartStore::new(backend.clone(), anonymous());
    store.add_line(mug, None, 1, LineProduct::default()).await?;
    let before = store.lines();

    backend.fail(Op::AddLine);
    let err = store
        .add_line(mug, None, 3, LineProduct::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RemoteUnavailable(_)));

    let snapshot = store.snapshot();
    assert_eq!(store.lines(), before);
    assert!(!snapshot.loading);
    assert!(snapshot.last_error.is_some());
    assert!(snapshot.lines.iter().all(|l| !l.pending));

    backend.heal();
    store.add_line(mug, None, 3, LineProduct::default()).await?;
    assert_eq!(store.lines()[0].quantity, 4);
    assert!(store.snapshot().last_error.is_none());
    Ok(())
}

#[tokio::test]
async fn failed_remove_and_clear_restore_lines() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let mug = backend.add_product("Ferris Mug", 120_000);
    let ebook = backend.add_product("E-book: Async Rust", 250_000);
    let store = CartStore::new(backend.clone(), anonymous());
    store.add_line(mug, None, 1, LineProduct::default()).await?;
    store.add_line(ebook, None, 1, LineProduct::default()).await?;
    let before = store.lines();

    backend.fail_line(before[0].id);
    assert!(store.remove_line(before[0].id).await.is_err());
    assert_eq!(store.lines(), before);

    backend.fail(Op::ClearCart);
    assert!(store.clear().await.is_err());
    assert_eq!(store.lines(), before);

    backend.heal();
    store.clear().await?;
    assert!(store.lines().is_empty());
    assert_eq!(backend.line_count(), 0);
    Ok(())
}

#[tokio::test]
async fn add_past_quantity_range_is_rejected_and_settles() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let mug = backend.add_product("Ferris Mug", 120_000);
    let store = CartStore::new(backend.clone(), anonymous());

    store.add_line(mug, None, i32::MAX, LineProduct::default()).await?;
    let err = store
        .add_line(mug, None, 1, LineProduct::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let snapshot = store.snapshot();
    assert!(!snapshot.loading);
    assert_eq!(snapshot.lines[0].view.quantity, i32::MAX);
    assert!(!snapshot.lines[0].pending);

    let cart_id = snapshot.cart_id.expect("cart created on first add");
    let line_id = snapshot.lines[0].view.id;
    let key = snapshot.lines[0].key();
    // The backend rejects the same sum on its own.
    let err = backend.add_line(cart_id, key, 1).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(backend.list_lines(cart_id).await?[0].quantity, i32::MAX);

    // The store still accepts further calls on that line.
    store.set_line_quantity(line_id, 3).await?;
    assert_eq!(store.lines()[0].quantity, 3);
    Ok(())
}

#[tokio::test]
async fn clear_waits_for_an_add_in_flight() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let mug = backend.add_product("Ferris Mug", 120_000);
    let hoodie = backend.add_product("Axum Hoodie", 550_000);
    let store = CartStore::new(backend.clone(), anonymous());
    store.add_line(mug, None, 1, LineProduct::default()).await?;

    backend.slow(Op::AddLine, 8);
    let (added, cleared) = tokio::join!(
        store.add_line(hoodie, None, 1, LineProduct::default()),
        store.clear(),
    );
    added?;
    cleared?;

    let cart_id = store.snapshot().cart_id.expect("cart exists");
    let remote = backend.list_lines(cart_id).await?;
    assert_eq!(store.lines(), remote);
    assert!(remote.is_empty());
    assert!(!store.snapshot().loading);
    Ok(())
}

#[tokio::test]
async fn load_never_creates_a_cart() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let store = CartStore::new(backend.clone(), anonymous());

    store.load().await?;
    assert_eq!(backend.cart_count(), 0);
    assert!(store.snapshot().cart_id.is_none());
    Ok(())
}

#[tokio::test]
async fn subscribers_see_changes_and_loading_settles() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let mug = backend.add_product("Ferris Mug", 120_000);
    let store = CartStore::new(backend.clone(), anonymous());
    let mut rx = store.subscribe();

    store.add_line(mug, None, 2, LineProduct::default()).await?;
    assert!(rx.has_changed()?);
    let snapshot = rx.borrow_and_update().clone();
    assert_eq!(snapshot.item_count(), 2);
    assert!(!snapshot.loading);
    Ok(())
}

#[tokio::test]
async fn cart_creation_race_resolves_to_single_cart() -> anyhow::Result<()> {
    let backend = Arc::new(MemoryBackend::new());
    let mug = backend.add_product("Ferris Mug", 120_000);
    let owner = anonymous();
    backend.race_next_create();

    let store = CartStore::new(backend.clone(), owner);
    store.add_line(mug, None, 1, LineProduct::default()).await?;

    assert_eq!(backend.cart_count(), 1);
    let cart = backend.find_cart(&owner).await?.expect("cart exists");
    assert_eq!(store.snapshot().cart_id, Some(cart.id));
    Ok(())
}

#[tokio::test]
async fn unknown_line_is_not_found() {
    let backend = Arc::new(MemoryBackend::new());
    let store = CartStore::new(backend, anonymous());
    let err = store.set_line_quantity(Uuid::new_v4(), 3).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound));
}
