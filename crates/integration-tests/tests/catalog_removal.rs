//! Removing a product from the catalog, its carts and its image.

#![allow(clippy::unwrap_used)]

use std::path::PathBuf;

use rust_decimal::Decimal;

use emporium_core::Product;
use emporium_integration_tests::MemoryStore;
use emporium_storefront::db::CatalogStore;
use emporium_storefront::routes::admin::remove_from_catalog;
use emporium_storefront::services::CartService;

async fn image_dir(product: &Product) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "emporium-catalog-{}-{}",
        std::process::id(),
        product.image_path
    ));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    tokio::fs::write(dir.join(&product.image_path), b"\x89PNG")
        .await
        .unwrap();
    dir
}

#[tokio::test]
async fn test_removal_deletes_row_then_carts_then_image() {
    let store = MemoryStore::new();
    let mut alice = store.seed_user("Alice", "alice@example.com");
    let carol = store.seed_user("Carol", "carol@example.com");
    let mug = store.seed_product("Mug", "4", carol.id);
    let pen = store.seed_product("Pen", "1", carol.id);
    let carts = CartService::new(&store);
    carts.add_to_cart(&mut alice, &mug).await.unwrap();
    carts.add_to_cart(&mut alice, &pen).await.unwrap();
    let dir = image_dir(&mug).await;

    let purged = remove_from_catalog(&store, &store, &dir, &mug).await.unwrap();

    assert_eq!(purged, 1);
    assert!(store.get_product(mug.id).await.unwrap().is_none());
    let alice = store.stored_user(alice.id).unwrap();
    assert!(alice.cart.line(mug.id).is_none());
    assert_eq!(alice.cart.total_price(), Decimal::from(1));
    assert!(!dir.join(&mug.image_path).exists());

    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

#[tokio::test]
async fn test_failed_row_delete_keeps_image_and_carts() {
    let store = MemoryStore::new();
    let mut alice = store.seed_user("Alice", "alice@example.com");
    let mug = store.seed_product("Mug", "4", alice.id);
    CartService::new(&store)
        .add_to_cart(&mut alice, &mug)
        .await
        .unwrap();
    let dir = image_dir(&mug).await;

    store.fail_writes(true);
    assert!(remove_from_catalog(&store, &store, &dir, &mug).await.is_err());
    store.fail_writes(false);

    assert!(store.get_product(mug.id).await.unwrap().is_some());
    assert!(dir.join(&mug.image_path).exists());
    let stored = store.stored_user(alice.id).unwrap();
    assert_eq!(stored.cart.line(mug.id).unwrap().quantity(), 1);

    tokio::fs::remove_dir_all(&dir).await.unwrap();
}
