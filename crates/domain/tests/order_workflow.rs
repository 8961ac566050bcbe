//! End-to-end order workflow tests over the in-memory store.

use std::time::Duration;

use chrono::Utc;
use common::{Money, Page, ProductId, UserId};
use domain::{CatalogService, DomainError, DraftItem, InMemoryNotifier, OrderDraft, OrderService};
use model::{Actor, OrderError, PaymentResult, Product, ShippingAddress, TimelineSource, User};
use store::{InMemoryStore, OrderFilter, Store};

struct World {
    store: InMemoryStore,
    notifier: InMemoryNotifier,
    orders: OrderService<InMemoryStore, InMemoryNotifier>,
    catalog: CatalogService<InMemoryStore>,
}

async fn world() -> World {
    let store = InMemoryStore::new();
    let notifier = InMemoryNotifier::new();
    World {
        orders: OrderService::new(store.clone(), notifier.clone()),
        catalog: CatalogService::new(store.clone()),
        store,
        notifier,
    }
}

async fn seed_user(store: &InMemoryStore, name: &str, email: &str) -> Actor {
    let user = User::new(name, email, Utc::now());
    let actor = user.actor();
    store.insert_user(&user).await.unwrap();
    actor
}

async fn seed_product(store: &InMemoryStore, price_cents: i64, stock: u32) -> Product {
    let product = Product::new(
        "Widget",
        "Gadgets",
        "Acme",
        Money::from_cents(price_cents),
        stock,
        Utc::now(),
    )
    .unwrap();
    store.insert_product(&product).await.unwrap();
    product
}

fn address() -> ShippingAddress {
    ShippingAddress {
        address: "1 Main St".to_string(),
        city: "Springfield".to_string(),
        postal_code: Some("12345".to_string()),
        country: Some("US".to_string()),
    }
}

fn draft_for(product_id: ProductId, quantity: u32, claimed_cents: i64) -> OrderDraft {
    OrderDraft {
        items: vec![DraftItem {
            product_id,
            quantity,
        }],
        shipping_address: address(),
        payment_method: "PayPal".to_string(),
        claimed_items_price: Money::from_cents(claimed_cents),
        shipping_price: Money::zero(),
        tax_price: Money::zero(),
    }
}

fn payment() -> PaymentResult {
    PaymentResult {
        provider_id: "PAY-42".to_string(),
        status: "COMPLETED".to_string(),
        update_time: "2026-01-01T00:00:00Z".to_string(),
        payer_email: "buyer@example.com".to_string(),
    }
}

/// Polls until at least `n` notifications were delivered. Dispatch is
/// fire-and-forget on a spawned task, so delivery lags the operation.
async fn await_notifications(notifier: &InMemoryNotifier, n: usize) {
    for _ in 0..100 {
        if notifier.sent_count() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "expected at least {n} notifications, saw {}",
        notifier.sent_count()
    );
}

#[tokio::test]
async fn place_then_cancel_restores_stock() {
    let w = world().await;
    let buyer = seed_user(&w.store, "Ada", "ada@example.com").await;
    let product = seed_product(&w.store, 1000, 5).await;

    let order = w
        .orders
        .create_order(buyer, draft_for(product.id, 2, 2000))
        .await
        .unwrap();
    assert_eq!(w.store.stock_of(product.id).await, Some(3));

    let canceled = w.orders.cancel_order(buyer, order.id).await.unwrap();
    assert!(canceled.is_canceled);
    assert_eq!(canceled.custom_status, "Canceled");
    assert_eq!(w.store.stock_of(product.id).await, Some(5));

    // Exactly one Canceled entry in the history.
    let canceled_entries = canceled
        .status_history
        .iter()
        .filter(|e| e.status == "Canceled")
        .count();
    assert_eq!(canceled_entries, 1);
}

#[tokio::test]
async fn negative_shipping_and_tax_are_rejected() {
    let w = world().await;
    let buyer = seed_user(&w.store, "Ada", "ada@example.com").await;
    let product = seed_product(&w.store, 1000, 5).await;

    let mut draft = draft_for(product.id, 2, 2000);
    draft.shipping_price = Money::from_cents(-1500);
    let err = w.orders.create_order(buyer, draft).await.unwrap_err();
    assert!(matches!(
        err,
        DomainError::Order(OrderError::NegativeCharge {
            kind: "shipping",
            ..
        })
    ));

    let mut draft = draft_for(product.id, 2, 2000);
    draft.tax_price = Money::from_cents(-500);
    let err = w.orders.create_order(buyer, draft).await.unwrap_err();
    assert!(matches!(
        err,
        DomainError::Order(OrderError::NegativeCharge { kind: "tax", .. })
    ));

    // Nothing was reserved or persisted.
    assert_eq!(w.store.stock_of(product.id).await, Some(5));
    assert_eq!(w.store.order_count().await, 0);
}

#[tokio::test]
async fn two_buyers_race_for_the_last_unit() {
    let w = world().await;
    let ada = seed_user(&w.store, "Ada", "ada@example.com").await;
    let bob = seed_user(&w.store, "Bob", "bob@example.com").await;
    let product = seed_product(&w.store, 1000, 1).await;

    let (a, b) = tokio::join!(
        w.orders.create_order(ada, draft_for(product.id, 1, 1000)),
        w.orders.create_order(bob, draft_for(product.id, 1, 1000)),
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1, "exactly one buyer gets the last unit");

    let loser = if a.is_err() { a } else { b };
    assert!(matches!(
        loser,
        Err(DomainError::Order(OrderError::OutOfStock { .. }))
    ));

    assert_eq!(w.store.stock_of(product.id).await, Some(0));
    assert_eq!(w.store.order_count().await, 1);
}

#[tokio::test]
async fn item_cancel_restores_only_that_line() {
    let w = world().await;
    let buyer = seed_user(&w.store, "Ada", "ada@example.com").await;
    let widget = seed_product(&w.store, 1000, 5).await;

    let sprocket = Product::new(
        "Sprocket",
        "Hardware",
        "Globex",
        Money::from_cents(500),
        4,
        Utc::now(),
    )
    .unwrap();
    w.store.insert_product(&sprocket).await.unwrap();

    let draft = OrderDraft {
        items: vec![
            DraftItem {
                product_id: widget.id,
                quantity: 2,
            },
            DraftItem {
                product_id: sprocket.id,
                quantity: 3,
            },
        ],
        shipping_address: address(),
        payment_method: "Stripe".to_string(),
        claimed_items_price: Money::from_cents(3500),
        shipping_price: Money::from_cents(500),
        tax_price: Money::zero(),
    };
    let order = w.orders.create_order(buyer, draft).await.unwrap();
    assert_eq!(order.total_price.cents(), 4000);

    let updated = w
        .orders
        .cancel_order_item(buyer, order.id, sprocket.id)
        .await
        .unwrap();

    // Sprocket stock restored, widget's untouched.
    assert_eq!(w.store.stock_of(sprocket.id).await, Some(4));
    assert_eq!(w.store.stock_of(widget.id).await, Some(3));

    // Totals recomputed over the remaining line.
    assert_eq!(updated.items_price.cents(), 2000);
    assert_eq!(updated.total_price.cents(), 2500);
    assert!(!updated.is_canceled);

    // The same line cannot be canceled twice.
    let again = w
        .orders
        .cancel_order_item(buyer, order.id, sprocket.id)
        .await;
    assert!(matches!(
        again,
        Err(DomainError::Order(OrderError::ItemNotFound { .. }))
    ));
    assert_eq!(w.store.stock_of(sprocket.id).await, Some(4));
}

#[tokio::test]
async fn payment_and_delivery_guards() {
    let w = world().await;
    let buyer = seed_user(&w.store, "Ada", "ada@example.com").await;
    let admin = Actor {
        id: UserId::new(),
        is_admin: true,
    };
    let product = seed_product(&w.store, 1000, 5).await;
    let order = w
        .orders
        .create_order(buyer, draft_for(product.id, 1, 1000))
        .await
        .unwrap();

    // Cannot deliver before payment.
    let result = w.orders.mark_delivered(admin, order.id).await;
    assert!(matches!(
        result,
        Err(DomainError::Order(OrderError::CannotDeliverUnpaid))
    ));

    // Only admins deliver.
    w.orders.mark_paid(buyer, order.id, payment()).await.unwrap();
    let result = w.orders.mark_delivered(buyer, order.id).await;
    assert!(matches!(result, Err(DomainError::Forbidden(_))));

    let delivered = w.orders.mark_delivered(admin, order.id).await.unwrap();
    assert!(delivered.is_delivered);

    // Delivered orders cannot be canceled.
    let result = w.orders.cancel_order(buyer, order.id).await;
    assert!(matches!(
        result,
        Err(DomainError::Order(OrderError::CannotCancelDelivered))
    ));
    assert_eq!(w.store.stock_of(product.id).await, Some(4));
}

#[tokio::test]
async fn timeline_merges_milestones_and_history() {
    let w = world().await;
    let buyer = seed_user(&w.store, "Ada", "ada@example.com").await;
    let admin = Actor {
        id: UserId::new(),
        is_admin: true,
    };
    let product = seed_product(&w.store, 1000, 5).await;
    let order = w
        .orders
        .create_order(buyer, draft_for(product.id, 1, 1000))
        .await
        .unwrap();

    w.orders.mark_paid(buyer, order.id, payment()).await.unwrap();
    w.orders
        .set_status(admin, order.id, "Shipped".to_string())
        .await
        .unwrap();

    let timeline = w.orders.timeline(buyer, order.id).await.unwrap();
    let statuses: Vec<&str> = timeline.iter().map(|e| e.status.as_str()).collect();
    assert_eq!(statuses, vec!["Placed", "Paid", "Paid", "Shipped"]);

    // "Placed" is synthesized, the duplicate "Paid" comes from history.
    assert_eq!(timeline[0].source, TimelineSource::Milestone);
    assert_eq!(timeline[2].source, TimelineSource::History);
    assert!(timeline.windows(2).all(|w| w[0].at <= w[1].at));
}

#[tokio::test]
async fn reorder_skips_unavailable_items() {
    let w = world().await;
    let buyer = seed_user(&w.store, "Ada", "ada@example.com").await;
    let widget = seed_product(&w.store, 1000, 5).await;

    let scarce = Product::new(
        "Sprocket",
        "Hardware",
        "Globex",
        Money::from_cents(500),
        2,
        Utc::now(),
    )
    .unwrap();
    w.store.insert_product(&scarce).await.unwrap();

    let draft = OrderDraft {
        items: vec![
            DraftItem {
                product_id: widget.id,
                quantity: 1,
            },
            DraftItem {
                product_id: scarce.id,
                quantity: 2,
            },
        ],
        shipping_address: address(),
        payment_method: "PayPal".to_string(),
        claimed_items_price: Money::from_cents(2000),
        shipping_price: Money::zero(),
        tax_price: Money::zero(),
    };
    let original = w.orders.create_order(buyer, draft).await.unwrap();

    // The scarce product's remaining stock is gone.
    assert_eq!(w.store.stock_of(scarce.id).await, Some(0));

    let outcome = w.orders.reorder(buyer, original.id).await.unwrap();
    assert_eq!(outcome.unavailable, vec![scarce.id]);
    assert_eq!(outcome.order.items.len(), 1);
    assert_eq!(outcome.order.items[0].product_id, widget.id);
    assert_eq!(w.store.stock_of(widget.id).await, Some(3));
}

#[tokio::test]
async fn reorder_with_nothing_available_fails() {
    let w = world().await;
    let buyer = seed_user(&w.store, "Ada", "ada@example.com").await;
    let product = seed_product(&w.store, 1000, 1).await;

    let original = w
        .orders
        .create_order(buyer, draft_for(product.id, 1, 1000))
        .await
        .unwrap();

    let result = w.orders.reorder(buyer, original.id).await;
    match result {
        Err(DomainError::Order(OrderError::NothingToReorder { unavailable })) => {
            assert_eq!(unavailable, vec![product.id]);
        }
        other => panic!("expected NothingToReorder, got {other:?}"),
    }
}

#[tokio::test]
async fn reorder_uses_current_prices() {
    let w = world().await;
    let buyer = seed_user(&w.store, "Ada", "ada@example.com").await;
    let admin = Actor {
        id: UserId::new(),
        is_admin: true,
    };
    let product = seed_product(&w.store, 1000, 10).await;

    let original = w
        .orders
        .create_order(buyer, draft_for(product.id, 1, 1000))
        .await
        .unwrap();

    // Price goes up between the two orders.
    let update = domain::ProductUpdate {
        price: Some(Money::from_cents(1500)),
        ..Default::default()
    };
    w.catalog
        .update_product(admin, product.id, update)
        .await
        .unwrap();

    let outcome = w.orders.reorder(buyer, original.id).await.unwrap();
    assert_eq!(outcome.order.items[0].unit_price.cents(), 1500);
    assert_eq!(original.items[0].unit_price.cents(), 1000);
}

#[tokio::test]
async fn order_listings_are_scoped() {
    let w = world().await;
    let ada = seed_user(&w.store, "Ada", "ada@example.com").await;
    let bob = seed_user(&w.store, "Bob", "bob@example.com").await;
    let admin = Actor {
        id: UserId::new(),
        is_admin: true,
    };
    let product = seed_product(&w.store, 1000, 10).await;

    w.orders
        .create_order(ada, draft_for(product.id, 1, 1000))
        .await
        .unwrap();
    w.orders
        .create_order(bob, draft_for(product.id, 2, 2000))
        .await
        .unwrap();

    let mine = w.orders.my_orders(ada, Page::default()).await.unwrap();
    assert_eq!(mine.total, 1);
    assert!(mine.items.iter().all(|o| o.user == ada.id));

    let all = w
        .orders
        .list_orders(admin, &OrderFilter::default(), Page::default())
        .await
        .unwrap();
    assert_eq!(all.total, 2);

    let denied = w
        .orders
        .list_orders(ada, &OrderFilter::default(), Page::default())
        .await;
    assert!(matches!(denied, Err(DomainError::Forbidden(_))));
}

#[tokio::test]
async fn notifications_are_fire_and_forget() {
    let w = world().await;
    let buyer = seed_user(&w.store, "Ada", "ada@example.com").await;
    let product = seed_product(&w.store, 1000, 5).await;

    let order = w
        .orders
        .create_order(buyer, draft_for(product.id, 1, 1000))
        .await
        .unwrap();

    await_notifications(&w.notifier, 1).await;
    let sent = w.notifier.sent();
    assert_eq!(sent[0].to, "ada@example.com");
    assert_eq!(sent[0].subject, "Order confirmation");

    // Delivery failure never reaches the caller.
    w.notifier.set_fail_on_send(true);
    let canceled = w.orders.cancel_order(buyer, order.id).await.unwrap();
    assert!(canceled.is_canceled);
}
