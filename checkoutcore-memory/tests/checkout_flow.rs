//! End-to-end checkout and order lifecycle tests against the in-memory
//! store.
//!
//! These tests drive the full engine pipeline: promo validation, stock
//! guarding, pricing, atomic commit, events, and the cancellation
//! workflow, including races between concurrent checkouts.

use std::sync::Arc;

use checkoutcore::engine::{CheckoutEngine, CheckoutRequest};
use checkoutcore::errors::CheckoutError;
use checkoutcore::events::StorefrontEvent;
use checkoutcore::order::{CancellationReason, CartLine, OrderStatus};
use checkoutcore::promo::{PromoBenefit, PromoCode, PromoRejection};
use checkoutcore::shipping::{ShippingMethod, ShippingRate, ShippingZone};
use checkoutcore::stock::ProductRecord;
use checkoutcore::store::CommerceStore;
use checkoutcore::types::{
    Amount, PaymentMethod, Percent, ProductId, PromoCodeId, PromoCodeKey, Quantity,
    ShippingMethodId, ShippingZoneId, Timestamp, UserId,
};
use checkoutcore_memory::InMemoryCommerceStore;
use chrono::{Duration, Utc};

fn product(id: &str, price: u64, stock: Option<u32>) -> ProductRecord {
    ProductRecord {
        id: ProductId::try_new(id).unwrap(),
        price: Amount::new(price),
        stock,
    }
}

fn zone(id: &str, active: bool) -> ShippingZone {
    ShippingZone {
        id: ShippingZoneId::try_new(id).unwrap(),
        name: "Nationwide".to_owned(),
        is_active: active,
    }
}

fn method(id: &str, zone_id: &str, rate: ShippingRate, threshold: Option<u64>) -> ShippingMethod {
    ShippingMethod {
        id: ShippingMethodId::try_new(id).unwrap(),
        zone_id: ShippingZoneId::try_new(zone_id).unwrap(),
        rate,
        free_shipping_threshold: threshold.map(Amount::new),
        is_active: true,
    }
}

fn percentage_promo(
    id: &str,
    code: &str,
    value: u8,
    max_discount: Option<u64>,
    usage_limit: u32,
    user_limit: u32,
) -> PromoCode {
    let now = Utc::now();
    PromoCode::new(
        PromoCodeId::try_new(id).unwrap(),
        PromoCodeKey::try_new(code).unwrap(),
        PromoBenefit::Percentage {
            value: Percent::try_new(value).unwrap(),
            max_discount: max_discount.map(Amount::new),
        },
        Amount::ZERO,
        usage_limit,
        0,
        user_limit,
        Timestamp::new(now - Duration::days(1)),
        Timestamp::new(now + Duration::days(1)),
        true,
    )
    .unwrap()
}

fn line(product_id: &str, quantity: u32) -> CartLine {
    CartLine {
        product_id: ProductId::try_new(product_id).unwrap(),
        quantity: Quantity::try_new(quantity).unwrap(),
    }
}

fn request(user: &str, lines: Vec<CartLine>, promo: Option<&str>) -> CheckoutRequest {
    CheckoutRequest {
        user_id: UserId::try_new(user).unwrap(),
        lines,
        shipping_method_id: ShippingMethodId::try_new("standard").unwrap(),
        promo_code: promo.map(str::to_owned),
        payment_method: PaymentMethod::try_new("card").unwrap(),
    }
}

/// A store with one product, one active zone, and a fixed-fee method with
/// a free-shipping threshold at 500,000.
fn seeded_store() -> InMemoryCommerceStore {
    let store = InMemoryCommerceStore::new();
    store.put_product(product("p-1", 200_000, Some(10)));
    store.put_shipping_zone(zone("zone-1", true));
    store.put_shipping_method(method(
        "standard",
        "zone-1",
        ShippingRate::Fixed {
            base_cost: Amount::new(30_000),
        },
        Some(500_000),
    ));
    store
}

#[tokio::test]
async fn checkout_prices_discount_and_free_shipping() {
    let store = seeded_store();
    store.put_promo_code(percentage_promo("promo-1", "SAVE10", 10, None, 100, 5));
    let engine = CheckoutEngine::new(store);

    // 3 x 200,000 = 600,000; 10% off = 60,000; over the 500,000
    // threshold, so shipping is free.
    let order = engine
        .checkout(request("user-1", vec![line("p-1", 3)], Some("SAVE10")))
        .await
        .unwrap();

    assert_eq!(order.subtotal, Amount::new(600_000));
    assert_eq!(order.discount, Amount::new(60_000));
    assert_eq!(order.shipping_cost, Amount::ZERO);
    assert_eq!(order.total, Amount::new(540_000));
    assert_eq!(order.status, OrderStatus::Pending);

    // Stock decremented and redemption counted exactly once.
    let product_id = ProductId::try_new("p-1").unwrap();
    assert_eq!(engine.store().product_stock(&product_id), Some(Some(7)));
    let promo_id = PromoCodeId::try_new("promo-1").unwrap();
    assert_eq!(engine.store().promo_used_count(&promo_id), Some(1));
}

#[tokio::test]
async fn promo_entry_is_case_insensitive() {
    let store = seeded_store();
    store.put_promo_code(percentage_promo("promo-1", "SAVE10", 10, None, 100, 5));
    let engine = CheckoutEngine::new(store);

    let order = engine
        .checkout(request("user-1", vec![line("p-1", 1)], Some("  save10 ")))
        .await
        .unwrap();
    assert_eq!(order.discount, Amount::new(20_000));
}

#[tokio::test]
async fn unknown_promo_code_is_rejected() {
    let engine = CheckoutEngine::new(seeded_store());

    let err = engine
        .checkout(request("user-1", vec![line("p-1", 1)], Some("NOPE")))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::PromoRejected(PromoRejection::UnknownCode)
    ));
    assert_eq!(engine.store().order_count(), 0);
}

#[tokio::test]
async fn percentage_discount_is_clamped_to_max_discount() {
    let store = seeded_store();
    store.put_promo_code(percentage_promo("promo-1", "BIG20", 20, Some(50_000), 100, 5));
    let engine = CheckoutEngine::new(store);

    // 20% of 1,000,000 = 200,000, clamped to 50,000.
    let order = engine
        .checkout(request("user-1", vec![line("p-1", 5)], Some("BIG20")))
        .await
        .unwrap();
    assert_eq!(order.subtotal, Amount::new(1_000_000));
    assert_eq!(order.discount, Amount::new(50_000));
}

#[tokio::test]
async fn insufficient_stock_blocks_checkout_and_commits_nothing() {
    let engine = CheckoutEngine::new(seeded_store());

    let err = engine
        .checkout(request("user-1", vec![line("p-1", 11)], None))
        .await
        .unwrap_err();
    match err {
        CheckoutError::InsufficientStock(report) => {
            assert_eq!(report.violations.len(), 1);
            assert_eq!(report.violations[0].requested, 11);
            assert_eq!(report.violations[0].available, 10);
        }
        other => panic!("expected InsufficientStock, got {other}"),
    }
    assert_eq!(engine.store().order_count(), 0);
    let product_id = ProductId::try_new("p-1").unwrap();
    assert_eq!(engine.store().product_stock(&product_id), Some(Some(10)));
}

#[tokio::test]
async fn duplicate_cart_lines_are_checked_against_their_combined_quantity() {
    let store = seeded_store();
    store.put_product(product("p-2", 100_000, Some(5)));
    let engine = CheckoutEngine::new(store);

    // Each line fits on its own; together they ask for 6 of 5.
    let err = engine
        .checkout(request(
            "user-1",
            vec![line("p-2", 3), line("p-2", 3)],
            None,
        ))
        .await
        .unwrap_err();
    match err {
        CheckoutError::InsufficientStock(report) => {
            assert_eq!(report.violations.len(), 1);
            assert_eq!(report.violations[0].requested, 6);
            assert_eq!(report.violations[0].available, 5);
        }
        other => panic!("expected InsufficientStock, got {other}"),
    }
    assert_eq!(engine.store().order_count(), 0);
    let product_id = ProductId::try_new("p-2").unwrap();
    assert_eq!(engine.store().product_stock(&product_id), Some(Some(5)));
}

#[tokio::test]
async fn unknown_product_fails_the_lookup_not_the_stock_check() {
    let engine = CheckoutEngine::new(seeded_store());

    let err = engine
        .checkout(request("user-1", vec![line("ghost", 1)], None))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::UnknownProduct(_)));
}

#[tokio::test]
async fn empty_cart_is_refused() {
    let engine = CheckoutEngine::new(seeded_store());
    let err = engine
        .checkout(request("user-1", vec![], None))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::EmptyCart));
}

#[tokio::test]
async fn inactive_zone_makes_the_method_unavailable() {
    let store = InMemoryCommerceStore::new();
    store.put_product(product("p-1", 200_000, Some(10)));
    store.put_shipping_zone(zone("zone-1", false));
    store.put_shipping_method(method(
        "standard",
        "zone-1",
        ShippingRate::Fixed {
            base_cost: Amount::new(30_000),
        },
        None,
    ));
    let engine = CheckoutEngine::new(store);

    let err = engine
        .checkout(request("user-1", vec![line("p-1", 1)], None))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::ShippingUnavailable(_)));
}

#[tokio::test]
async fn weight_rate_charges_base_plus_per_unit() {
    let store = InMemoryCommerceStore::new();
    store.put_product(product("p-1", 10_000, None));
    store.put_shipping_zone(zone("zone-1", true));
    store.put_shipping_method(method(
        "standard",
        "zone-1",
        ShippingRate::Weight {
            base_cost: Amount::new(10_000),
            cost_per_kg: Amount::new(2_000),
        },
        None,
    ));
    let engine = CheckoutEngine::new(store);

    let order = engine
        .checkout(request("user-1", vec![line("p-1", 3)], None))
        .await
        .unwrap();
    assert_eq!(order.shipping_cost, Amount::new(16_000));
}

#[tokio::test]
async fn total_floors_at_zero_before_adding_shipping() {
    let store = InMemoryCommerceStore::new();
    store.put_product(product("p-1", 10_000, None));
    store.put_shipping_zone(zone("zone-1", true));
    store.put_shipping_method(method(
        "standard",
        "zone-1",
        ShippingRate::Fixed {
            base_cost: Amount::new(5_000),
        },
        None,
    ));
    let now = Utc::now();
    store.put_promo_code(
        PromoCode::new(
            PromoCodeId::try_new("promo-1").unwrap(),
            PromoCodeKey::try_new("HUGE").unwrap(),
            PromoBenefit::Fixed {
                value: Amount::new(50_000),
            },
            Amount::ZERO,
            100,
            0,
            5,
            Timestamp::new(now - Duration::days(1)),
            Timestamp::new(now + Duration::days(1)),
            true,
        )
        .unwrap(),
    );
    let engine = CheckoutEngine::new(store);

    // Fixed 50,000 off a 10,000 order: discounted subtotal floors at
    // zero, shipping is still charged.
    let order = engine
        .checkout(request("user-1", vec![line("p-1", 1)], Some("HUGE")))
        .await
        .unwrap();
    assert_eq!(order.discount, Amount::new(50_000));
    assert_eq!(order.total, Amount::new(5_000));
}

#[tokio::test]
async fn checkout_publishes_order_created_and_usage_changed() {
    let store = seeded_store();
    store.put_promo_code(percentage_promo("promo-1", "SAVE10", 10, None, 100, 5));
    let engine = CheckoutEngine::new(store);
    let mut events = engine.events().subscribe();

    let order = engine
        .checkout(request("user-1", vec![line("p-1", 1)], Some("SAVE10")))
        .await
        .unwrap();

    match events.recv().await.unwrap() {
        StorefrontEvent::OrderCreated {
            order_id, total, ..
        } => {
            assert_eq!(order_id, order.id);
            assert_eq!(total, order.total);
        }
        other => panic!("expected OrderCreated, got {other:?}"),
    }
    assert!(matches!(
        events.recv().await.unwrap(),
        StorefrontEvent::PromoCodeUsageChanged { .. }
    ));
}

#[tokio::test]
async fn orders_advance_through_the_lifecycle_and_stop_at_terminal() {
    let engine = CheckoutEngine::new(seeded_store());
    let order = engine
        .checkout(request("user-1", vec![line("p-1", 1)], None))
        .await
        .unwrap();

    for next in [
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
    ] {
        let advanced = engine.advance_order(order.id, next).await.unwrap();
        assert_eq!(advanced.status, next);
    }

    let err = engine
        .advance_order(order.id, OrderStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Transition(_)));
}

#[tokio::test]
async fn skipping_a_lifecycle_step_is_refused() {
    let engine = CheckoutEngine::new(seeded_store());
    let order = engine
        .checkout(request("user-1", vec![line("p-1", 1)], None))
        .await
        .unwrap();

    let err = engine
        .advance_order(order.id, OrderStatus::Shipped)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Transition(_)));
}

#[tokio::test]
async fn approved_cancellation_cancels_the_order() {
    let engine = CheckoutEngine::new(seeded_store());
    let order = engine
        .checkout(request("user-1", vec![line("p-1", 1)], None))
        .await
        .unwrap();
    let mut events = engine.events().subscribe();

    let req = engine
        .request_cancellation(order.id, order.user_id.clone(), CancellationReason::ChangedMind)
        .await
        .unwrap();

    // Requesting alone must not move the order.
    let pending = engine.store().find_order(&order.id).await.unwrap().unwrap();
    assert_eq!(pending.record.status, OrderStatus::Pending);

    engine.resolve_cancellation(req.id, true).await.unwrap();
    let cancelled = engine.store().find_order(&order.id).await.unwrap().unwrap();
    assert_eq!(cancelled.record.status, OrderStatus::Cancelled);

    assert!(matches!(
        events.recv().await.unwrap(),
        StorefrontEvent::OrderStatusChanged {
            to: OrderStatus::Cancelled,
            ..
        }
    ));
}

#[tokio::test]
async fn rejected_cancellation_leaves_the_order_untouched() {
    let engine = CheckoutEngine::new(seeded_store());
    let order = engine
        .checkout(request("user-1", vec![line("p-1", 1)], None))
        .await
        .unwrap();

    let req = engine
        .request_cancellation(order.id, order.user_id.clone(), CancellationReason::OrderedByMistake)
        .await
        .unwrap();
    engine.resolve_cancellation(req.id, false).await.unwrap();

    let stored = engine.store().find_order(&order.id).await.unwrap().unwrap();
    assert_eq!(stored.record.status, OrderStatus::Pending);

    // A resolved request cannot be resolved again.
    let err = engine.resolve_cancellation(req.id, true).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Transition(_)));
}

#[tokio::test]
async fn second_cancellation_request_is_refused() {
    let engine = CheckoutEngine::new(seeded_store());
    let order = engine
        .checkout(request("user-1", vec![line("p-1", 1)], None))
        .await
        .unwrap();

    engine
        .request_cancellation(order.id, order.user_id.clone(), CancellationReason::ChangedMind)
        .await
        .unwrap();
    let err = engine
        .request_cancellation(order.id, order.user_id.clone(), CancellationReason::ChangedMind)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::CancellationAlreadyRequested(_)));
}

#[tokio::test]
async fn shipped_orders_cannot_request_cancellation() {
    let engine = CheckoutEngine::new(seeded_store());
    let order = engine
        .checkout(request("user-1", vec![line("p-1", 1)], None))
        .await
        .unwrap();
    engine
        .advance_order(order.id, OrderStatus::Processing)
        .await
        .unwrap();
    engine
        .advance_order(order.id, OrderStatus::Shipped)
        .await
        .unwrap();

    let err = engine
        .request_cancellation(order.id, order.user_id.clone(), CancellationReason::ShippingTooSlow)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Transition(_)));
}

#[tokio::test]
async fn concurrent_checkouts_redeem_a_single_use_promo_exactly_once() {
    let store = seeded_store();
    store.put_promo_code(percentage_promo("promo-1", "ONCE", 10, None, 1, 1));
    let engine = Arc::new(CheckoutEngine::new(store));

    let mut handles = Vec::new();
    for i in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .checkout(request(
                    &format!("user-{i}"),
                    vec![line("p-1", 1)],
                    Some("ONCE"),
                ))
                .await
        }));
    }

    let mut successes = 0;
    let mut limit_rejections = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(CheckoutError::PromoRejected(PromoRejection::UsageLimitReached)) => {
                limit_rejections += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(limit_rejections, 3);

    let promo_id = PromoCodeId::try_new("promo-1").unwrap();
    assert_eq!(engine.store().promo_used_count(&promo_id), Some(1));
}

#[tokio::test]
async fn concurrent_checkouts_never_oversell_tracked_stock() {
    let store = InMemoryCommerceStore::new();
    store.put_product(product("p-1", 10_000, Some(1)));
    store.put_shipping_zone(zone("zone-1", true));
    store.put_shipping_method(method(
        "standard",
        "zone-1",
        ShippingRate::Fixed {
            base_cost: Amount::new(1_000),
        },
        None,
    ));
    let engine = Arc::new(CheckoutEngine::new(store));

    let mut handles = Vec::new();
    for i in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .checkout(request(&format!("user-{i}"), vec![line("p-1", 1)], None))
                .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(CheckoutError::InsufficientStock(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(successes, 1);

    let product_id = ProductId::try_new("p-1").unwrap();
    assert_eq!(engine.store().product_stock(&product_id), Some(Some(0)));
}

#[tokio::test]
async fn promo_preview_reports_the_discount_without_committing() {
    let store = seeded_store();
    store.put_promo_code(percentage_promo("promo-1", "SAVE10", 10, None, 100, 5));
    let engine = CheckoutEngine::new(store);

    let grant = engine
        .preview_promo_code("save10", &UserId::try_new("user-1").unwrap(), Amount::new(200_000))
        .await
        .unwrap();
    assert_eq!(grant.discount, Amount::new(20_000));

    let promo_id = PromoCodeId::try_new("promo-1").unwrap();
    assert_eq!(engine.store().promo_used_count(&promo_id), Some(0));
    assert_eq!(engine.store().order_count(), 0);
}

#[tokio::test]
async fn usage_limit_three_accepts_three_redemptions_then_rejects() {
    let store = seeded_store();
    store.put_promo_code(percentage_promo("promo-1", "TRIPLE", 10, None, 3, 1));
    let engine = CheckoutEngine::new(store);

    for user in ["user-1", "user-2", "user-3"] {
        engine
            .checkout(request(user, vec![line("p-1", 1)], Some("TRIPLE")))
            .await
            .unwrap();
    }

    let err = engine
        .checkout(request("user-4", vec![line("p-1", 1)], Some("TRIPLE")))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::PromoRejected(PromoRejection::UsageLimitReached)
    ));
}

#[tokio::test]
async fn per_user_limit_rejects_a_repeat_redeemer() {
    let store = seeded_store();
    store.put_promo_code(percentage_promo("promo-1", "ONEUSE", 10, None, 100, 1));
    let engine = CheckoutEngine::new(store);

    engine
        .checkout(request("user-1", vec![line("p-1", 1)], Some("ONEUSE")))
        .await
        .unwrap();
    let err = engine
        .checkout(request("user-1", vec![line("p-1", 1)], Some("ONEUSE")))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::PromoRejected(PromoRejection::UserLimitReached)
    ));

    // A different user is still fine.
    engine
        .checkout(request("user-2", vec![line("p-1", 1)], Some("ONEUSE")))
        .await
        .unwrap();
}
