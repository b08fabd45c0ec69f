mod helpers;

use checkout_backend::error::CheckoutError;
use checkout_backend::repositories::*;
use checkout_backend::services::CheckoutService;
use helpers::*;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

/// Scenario A: two buyers race for 3 units each with only 5 in stock
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_never_oversell() {
    let shop = TestShop::new();
    let sku = shop.sku(dec!(1000), 5).await;
    shop.cart(1, &[(sku, 3)]).await;
    shop.cart(2, &[(sku, 3)]).await;

    let first = {
        let checkout = shop.checkout.clone();
        tokio::spawn(async move { checkout.place_order(1, &shipping()).await })
    };
    let second = {
        let checkout = shop.checkout.clone();
        tokio::spawn(async move { checkout.place_order(2, &shipping()).await })
    };
    let results = vec![first.await.unwrap(), second.await.unwrap()];

    let placed: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    let rejected: Vec<_> = results
        .iter()
        .filter(|r| matches!(r, Err(CheckoutError::InsufficientStock { sku_id }) if *sku_id == sku))
        .collect();

    assert_eq!(placed.len(), 1);
    assert_eq!(rejected.len(), 1);
    assert_eq!(shop.stock_of(sku).await, 2);
    assert_eq!(shop.store.order_count().await, 1);
}

/// Many buyers, one unit each: exactly the stock is sold
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sold_units_equal_initial_stock() {
    let shop = TestShop::new();
    let sku = shop.sku(dec!(300), 7).await;
    for user in 1..=20 {
        shop.cart(user, &[(sku, 1)]).await;
    }

    let handles: Vec<_> = (1..=20)
        .map(|user| {
            let checkout = shop.checkout.clone();
            tokio::spawn(async move { checkout.place_order(user, &shipping()).await })
        })
        .collect();

    let mut successes = 0;
    for result in futures::future::join_all(handles).await {
        match result.unwrap() {
            Ok(_) => successes += 1,
            Err(CheckoutError::InsufficientStock { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(successes, 7);
    assert_eq!(shop.stock_of(sku).await, 0);
}

/// Scenario B
#[tokio::test]
async fn test_empty_cart_is_rejected() {
    let shop = TestShop::new();
    shop.cart(1, &[]).await;

    let err = assert_err!(shop.checkout.place_order(1, &shipping()).await);

    assert!(matches!(err, CheckoutError::EmptyCart));
    assert_eq!(shop.store.order_count().await, 0);
}

/// Scenario C: totals, frozen prices and decrements across two SKUs
#[tokio::test]
async fn test_order_total_and_stock_decrements() {
    let shop = TestShop::new();
    let shirt = shop.sku(dec!(2500), 10).await;
    let socks = shop.sku(dec!(480), 3).await;
    let cart = shop.cart(1, &[(shirt, 2), (socks, 3)]).await;

    let placed = assert_ok!(shop.checkout.place_order(1, &shipping()).await);

    assert_eq!(placed.order.total_price, dec!(6440));
    assert_eq!(placed.order.status, "PENDING");
    assert_eq!(placed.order.shipping_name, "Haruto Kobayashi");
    assert_eq!(placed.lines.len(), 2);
    assert_eq!(placed.lines[0].sku_id, shirt);
    assert_eq!(placed.lines[0].price_at_order, dec!(2500));
    assert_eq!(placed.lines[1].sku_id, socks);
    assert_eq!(placed.lines[1].quantity, 3);

    assert_eq!(shop.stock_of(shirt).await, 8);
    assert_eq!(shop.stock_of(socks).await, 0);
    assert!(shop.store.cart_lines(cart).await.is_empty());
}

#[tokio::test]
async fn test_shortfall_on_one_sku_leaves_everything_untouched() {
    let shop = TestShop::new();
    let plenty = shop.sku(dec!(100), 10).await;
    let scarce = shop.sku(dec!(100), 1).await;
    let cart = shop.cart(1, &[(plenty, 2), (scarce, 2)]).await;

    let err = assert_err!(shop.checkout.place_order(1, &shipping()).await);

    assert!(matches!(err, CheckoutError::InsufficientStock { sku_id } if sku_id == scarce));
    assert_eq!(shop.stock_of(plenty).await, 10);
    assert_eq!(shop.stock_of(scarce).await, 1);
    assert_eq!(shop.store.order_count().await, 0);
    assert_eq!(shop.store.order_line_count().await, 0);
    assert_eq!(shop.store.cart_lines(cart).await.len(), 2);
}

#[tokio::test]
async fn test_vanished_stock_row_is_insufficient_stock() {
    let shop = TestShop::new();
    let sku = shop.sku(dec!(100), 10).await;
    shop.cart(1, &[(sku, 1)]).await;
    shop.store.remove_stock(sku).await;

    let err = assert_err!(shop.checkout.place_order(1, &shipping()).await);

    assert!(matches!(err, CheckoutError::InsufficientStock { sku_id } if sku_id == sku));
}

#[tokio::test]
async fn test_missing_cart_is_not_found() {
    let shop = TestShop::new();

    let err = assert_err!(shop.checkout.place_order(404, &shipping()).await);

    assert!(matches!(err, CheckoutError::NotFound(_)));
}

/// Carts list the same SKUs in opposite orders; every attempt must finish
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reversed_sku_order_does_not_deadlock() {
    let shop = TestShop::new();
    let a = shop.sku(dec!(100), 1_000).await;
    let b = shop.sku(dec!(200), 1_000).await;

    for round in 0..25 {
        let forward = 1_000 + round * 2;
        let backward = forward + 1;
        shop.cart(forward, &[(a, 1), (b, 1)]).await;
        shop.cart(backward, &[(b, 1), (a, 1)]).await;

        let handles: Vec<_> = [forward, backward]
            .into_iter()
            .map(|user| {
                let checkout = shop.checkout.clone();
                tokio::spawn(async move { checkout.place_order(user, &shipping()).await })
            })
            .collect();

        let results = tokio::time::timeout(
            Duration::from_secs(10),
            futures::future::join_all(handles),
        )
        .await
        .expect("checkouts should not deadlock");

        for result in results {
            assert_ok!(result.unwrap());
        }
    }

    assert_eq!(shop.stock_of(a).await, 950);
    assert_eq!(shop.stock_of(b).await, 950);
}

#[tokio::test]
async fn test_duplicate_sku_lines_are_summed() {
    let shop = TestShop::new();
    let sku = shop.sku(dec!(100), 4).await;
    let cart = shop.store.create_cart(1).await;
    shop.store.add_cart_line(cart, sku, 3).await;
    shop.store.add_cart_line(cart, sku, 2).await;

    let err = assert_err!(shop.checkout.place_order(1, &shipping()).await);

    assert!(matches!(err, CheckoutError::InsufficientStock { .. }));
    assert_eq!(shop.stock_of(sku).await, 4);
}

#[tokio::test]
async fn test_read_detailed_is_repeatable() {
    let shop = TestShop::new();
    let first = shop.sku(dec!(100), 4).await;
    let second = shop.sku(dec!(250), 9).await;
    let cart = shop.cart(1, &[(second, 2), (first, 1)]).await;

    let store = &shop.store;
    let mut tx = store.begin().await.unwrap();
    let once = store.read_detailed(&mut tx, cart).await.unwrap();
    let twice = store.read_detailed(&mut tx, cart).await.unwrap();
    store.rollback(tx).await.unwrap();

    assert_eq!(once, twice);
    assert_eq!(once.len(), 2);
    assert_eq!(once[0].sku_id, second);
    assert_eq!(once[0].unit_price, dec!(250));
    assert_eq!(once[0].available_stock, 9);
}

#[tokio::test]
async fn test_later_price_change_does_not_touch_placed_order() {
    let shop = TestShop::new();
    let product = shop.store.add_product(dec!(1500)).await;
    let sku = shop.store.add_sku(product, dec!(100)).await;
    shop.store.set_stock(sku, 5).await;
    shop.cart(1, &[(sku, 2)]).await;

    let placed = assert_ok!(shop.checkout.place_order(1, &shipping()).await);
    shop.store.set_product_price(product, dec!(9999)).await;

    let lines = shop.store.find_lines(placed.order.id).await.unwrap();
    assert_eq!(lines[0].price_at_order, dec!(1600));
    let order = shop.store.find_order(placed.order.id).await.unwrap().unwrap();
    assert_eq!(order.total_price, dec!(3200));
}

#[tokio::test]
async fn test_lock_wait_is_bounded() {
    let shop = TestShop::with_lock_timeout(Duration::from_millis(50));
    let sku = shop.sku(dec!(100), 5).await;
    let cart = shop.cart(1, &[(sku, 1)]).await;

    // Another transaction sits on the stock row
    let store = &shop.store;
    let mut holder = store.begin().await.unwrap();
    store
        .lock_for_update(&mut holder, &BTreeSet::from([sku]))
        .await
        .unwrap();

    let err = assert_err!(shop.checkout.place_order(1, &shipping()).await);
    assert!(matches!(err, CheckoutError::LockTimeout));
    assert!(err.is_retryable());
    assert_eq!(shop.store.cart_lines(cart).await.len(), 1);

    store.rollback(holder).await.unwrap();

    // Retrying from scratch succeeds once the row is free
    assert_ok!(shop.checkout.place_order(1, &shipping()).await);
    assert_eq!(shop.stock_of(sku).await, 4);
}

/// Failures after stock and the order header are staged must leave no trace
#[tokio::test]
async fn test_late_storage_failure_rolls_back_staged_writes() {
    for fail_at in [FailAt::InsertLines, FailAt::ClearCart] {
        let shop = TestShop::new();
        let shirt = shop.sku(dec!(2500), 10).await;
        let socks = shop.sku(dec!(480), 3).await;
        let cart = shop.cart(1, &[(shirt, 2), (socks, 3)]).await;

        let failing = Arc::new(FailingStore::new(shop.store.clone(), fail_at));
        let checkout = CheckoutService::new(failing);

        let err = assert_err!(checkout.place_order(1, &shipping()).await);

        assert!(
            matches!(err, CheckoutError::Storage(_)),
            "{fail_at:?}: unexpected {err:?}"
        );
        assert_eq!(err.status_code(), 500);
        assert_eq!(shop.stock_of(shirt).await, 10, "{fail_at:?}");
        assert_eq!(shop.stock_of(socks).await, 3, "{fail_at:?}");
        assert_eq!(shop.store.order_count().await, 0, "{fail_at:?}");
        assert_eq!(shop.store.order_line_count().await, 0, "{fail_at:?}");
        assert_eq!(shop.store.cart_lines(cart).await.len(), 2, "{fail_at:?}");

        // Locks were released by the rollback
        assert_ok!(shop.checkout.place_order(1, &shipping()).await);
        assert_eq!(shop.stock_of(shirt).await, 8);
    }
}

/// A line added while the checkout waits on stock locks is not ordered, so it stays
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_line_added_after_snapshot_stays_in_cart() {
    let shop = TestShop::new();
    let shirt = shop.sku(dec!(2500), 10).await;
    let hat = shop.sku(dec!(1200), 10).await;
    let cart = shop.cart(1, &[(shirt, 1)]).await;

    let store = &shop.store;
    let mut holder = store.begin().await.unwrap();
    store
        .lock_for_update(&mut holder, &BTreeSet::from([shirt]))
        .await
        .unwrap();

    let pending = {
        let checkout = shop.checkout.clone();
        tokio::spawn(async move { checkout.place_order(1, &shipping()).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    let late_line = store.add_cart_line(cart, hat, 1).await;
    store.rollback(holder).await.unwrap();

    let placed = assert_ok!(pending.await.unwrap());

    assert_eq!(placed.lines.len(), 1);
    assert_eq!(placed.lines[0].sku_id, shirt);
    let remaining = store.cart_lines(cart).await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, late_line);
    assert_eq!(shop.stock_of(hat).await, 10);
}
