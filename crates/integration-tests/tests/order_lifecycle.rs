//! Order placement, history and access control.

#![allow(clippy::unwrap_used)]

use rust_decimal::Decimal;

use emporium_core::OrderId;
use emporium_integration_tests::MemoryStore;
use emporium_storefront::db::{CatalogStore, UserStore};
use emporium_storefront::services::payments::CheckoutSessionStatus;
use emporium_storefront::services::{CartService, OrderError, OrderService};

fn paid_session(id: &str, user: emporium_core::UserId, amount_total: i64) -> CheckoutSessionStatus {
    CheckoutSessionStatus {
        id: id.to_string(),
        payment_status: "paid".to_string(),
        client_reference_id: Some(user.to_string()),
        amount_total: Some(amount_total),
    }
}

#[tokio::test]
async fn test_place_order_snapshots_cart_and_empties_it() {
    let store = MemoryStore::new();
    let mut alice = store.seed_user("Alice", "alice@example.com");
    let mug = store.seed_product("Mug", "12.50", alice.id);
    let pen = store.seed_product("Pen", "1.25", alice.id);
    let carts = CartService::new(&store);
    carts.add_to_cart(&mut alice, &mug).await.unwrap();
    carts.add_to_cart(&mut alice, &mug).await.unwrap();
    carts.add_to_cart(&mut alice, &pen).await.unwrap();

    let orders = OrderService::new(&store, &store);
    let order_id = orders.place_order(&mut alice).await.unwrap();

    assert!(alice.cart.is_empty());
    let stored = store.stored_user(alice.id).unwrap();
    assert!(stored.cart.is_empty());
    assert_eq!(stored.cart_version, alice.cart_version);

    let order = orders.invoice_order(order_id, alice.id).await.unwrap();
    assert_eq!(order.user_name, "Alice");
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.total_price, Decimal::new(2625, 2));
    let first = order.items.first().unwrap();
    assert_eq!(first.product.title, "Mug");
    assert_eq!(first.quantity.get(), 2);
}

#[tokio::test]
async fn test_order_is_unaffected_by_later_product_edits() {
    let store = MemoryStore::new();
    let mut alice = store.seed_user("Alice", "alice@example.com");
    let mut mug = store.seed_product("Mug", "10", alice.id);
    CartService::new(&store)
        .add_to_cart(&mut alice, &mug)
        .await
        .unwrap();
    let orders = OrderService::new(&store, &store);
    let order_id = orders.place_order(&mut alice).await.unwrap();

    mug.title = "Giant Mug".to_string();
    mug.price = emporium_core::Price::parse("99").unwrap();
    store.update_product(&mug).await.unwrap();
    assert!(store.delete_product(mug.id, alice.id).await.unwrap());

    let order = orders.invoice_order(order_id, alice.id).await.unwrap();
    let item = order.items.first().unwrap();
    assert_eq!(item.product.title, "Mug");
    assert_eq!(item.product.price.amount(), Decimal::from(10));
    assert_eq!(order.total_price, Decimal::from(10));
}

#[tokio::test]
async fn test_empty_cart_is_rejected() {
    let store = MemoryStore::new();
    let mut alice = store.seed_user("Alice", "alice@example.com");

    let err = OrderService::new(&store, &store)
        .place_order(&mut alice)
        .await
        .unwrap_err();

    assert!(matches!(err, OrderError::EmptyCart));
    assert!(store.all_orders().is_empty());
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_deleted_product_blocks_order_until_removed() {
    let store = MemoryStore::new();
    let mut alice = store.seed_user("Alice", "alice@example.com");
    let mug = store.seed_product("Mug", "10", alice.id);
    let pen = store.seed_product("Pen", "2", alice.id);
    let carts = CartService::new(&store);
    carts.add_to_cart(&mut alice, &mug).await.unwrap();
    carts.add_to_cart(&mut alice, &pen).await.unwrap();
    assert!(store.delete_product(mug.id, alice.id).await.unwrap());

    let orders = OrderService::new(&store, &store);
    let err = orders.place_order(&mut alice).await.unwrap_err();

    assert!(matches!(err, OrderError::ProductNotFound(id) if id == mug.id));
    assert!(store.all_orders().is_empty());
    assert!(!store.stored_user(alice.id).unwrap().cart.is_empty());

    // Clearing the dangling line unblocks checkout
    assert!(carts.remove_from_cart(&mut alice, mug.id).await.unwrap());
    let order_id = orders.place_order(&mut alice).await.unwrap();
    let order = orders.invoice_order(order_id, alice.id).await.unwrap();
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.total_price, Decimal::from(2));
}

#[tokio::test]
async fn test_stale_cart_creates_no_order() {
    let store = MemoryStore::new();
    let alice = store.seed_user("Alice", "alice@example.com");
    let mug = store.seed_product("Mug", "10", alice.id);
    let carts = CartService::new(&store);

    let mut checkout = store.get_user(alice.id).await.unwrap().unwrap();
    carts.add_to_cart(&mut checkout, &mug).await.unwrap();
    let mut other_tab = checkout.clone();
    carts.add_to_cart(&mut other_tab, &mug).await.unwrap();

    let err = OrderService::new(&store, &store)
        .place_order(&mut checkout)
        .await
        .unwrap_err();

    assert!(matches!(err, OrderError::Conflict));
    assert!(store.all_orders().is_empty());
    let stored = store.stored_user(alice.id).unwrap();
    assert_eq!(stored.cart.line(mug.id).unwrap().quantity(), 2);
}

#[tokio::test]
async fn test_orders_listed_newest_first() {
    let store = MemoryStore::new();
    let mut alice = store.seed_user("Alice", "alice@example.com");
    let mut bob = store.seed_user("Bob", "bob@example.com");
    let mug = store.seed_product("Mug", "10", bob.id);
    let carts = CartService::new(&store);
    let orders = OrderService::new(&store, &store);

    let mut placed: Vec<OrderId> = Vec::new();
    for _ in 0..3 {
        carts.add_to_cart(&mut alice, &mug).await.unwrap();
        placed.push(orders.place_order(&mut alice).await.unwrap());
    }
    carts.add_to_cart(&mut bob, &mug).await.unwrap();
    orders.place_order(&mut bob).await.unwrap();

    let listed: Vec<OrderId> = orders
        .list_orders(alice.id)
        .await
        .unwrap()
        .iter()
        .map(|o| o.id)
        .collect();
    placed.reverse();
    assert_eq!(listed, placed);
}

#[tokio::test]
async fn test_invoice_denied_to_other_users() {
    let store = MemoryStore::new();
    let mut alice = store.seed_user("Alice", "alice@example.com");
    let mallory = store.seed_user("Mallory", "mallory@example.com");
    let mug = store.seed_product("Mug", "10", alice.id);
    CartService::new(&store)
        .add_to_cart(&mut alice, &mug)
        .await
        .unwrap();
    let orders = OrderService::new(&store, &store);
    let order_id = orders.place_order(&mut alice).await.unwrap();

    let err = orders.invoice_order(order_id, mallory.id).await.unwrap_err();
    assert!(matches!(err, OrderError::Unauthorized(id) if id == order_id));

    let err = orders
        .invoice_order(OrderId::new(9999), alice.id)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::OrderNotFound(_)));
}

#[tokio::test]
async fn test_paid_session_places_one_order_only() {
    let store = MemoryStore::new();
    let mut alice = store.seed_user("Alice", "alice@example.com");
    let pen = store.seed_product("Pen", "1.25", alice.id);
    let lamp = store.seed_product("Lamp", "80", alice.id);
    let carts = CartService::new(&store);
    let orders = OrderService::new(&store, &store);

    carts.add_to_cart(&mut alice, &pen).await.unwrap();
    let session = paid_session("cs_test_pen", alice.id, 125);
    let order_id = orders.place_paid_order(&mut alice, &session).await.unwrap();
    let order = orders.invoice_order(order_id, alice.id).await.unwrap();
    assert_eq!(order.checkout_session_id.as_deref(), Some("cs_test_pen"));

    // Refill and replay the same success URL
    carts.add_to_cart(&mut alice, &lamp).await.unwrap();
    let err = orders
        .place_paid_order(&mut alice, &session)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::SessionUsed(ref id) if id == "cs_test_pen"));
    assert_eq!(store.all_orders().len(), 1);
    assert_eq!(alice.cart.line(lamp.id).unwrap().quantity(), 1);
}

#[tokio::test]
async fn test_paid_session_must_cover_current_cart() {
    let store = MemoryStore::new();
    let mut alice = store.seed_user("Alice", "alice@example.com");
    let pen = store.seed_product("Pen", "1.25", alice.id);
    let lamp = store.seed_product("Lamp", "80", alice.id);
    let carts = CartService::new(&store);
    let orders = OrderService::new(&store, &store);

    carts.add_to_cart(&mut alice, &pen).await.unwrap();
    let session = paid_session("cs_test_cheap", alice.id, 125);
    // Cart grew while the customer was on the payment page
    carts.add_to_cart(&mut alice, &lamp).await.unwrap();

    let err = orders
        .place_paid_order(&mut alice, &session)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::PaymentMismatch(_)));
    assert!(store.all_orders().is_empty());

    let unpaid = CheckoutSessionStatus {
        payment_status: "unpaid".to_string(),
        ..paid_session("cs_test_open", alice.id, 8125)
    };
    let err = orders.place_paid_order(&mut alice, &unpaid).await.unwrap_err();
    assert!(matches!(err, OrderError::PaymentMismatch(_)));

    let exact = paid_session("cs_test_exact", alice.id, 8125);
    orders.place_paid_order(&mut alice, &exact).await.unwrap();
    assert_eq!(store.all_orders().len(), 1);
}
