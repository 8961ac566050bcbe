//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container for efficiency. Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{Money, Page, ProductId};
use model::{LineItem, Order, PaymentMethod, Product, ShippingAddress, User};
use serial_test::serial;
use sqlx::PgPool;
use store::{OrderFilter, PostgresStore, ProductFilter, Store, StoreError};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Fresh store with its own pool and cleared tables.
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    let store = PostgresStore::new(pool.clone());
    store.ensure_schema().await.unwrap();
    clear_tables(&pool).await;
    store
}

async fn clear_tables(pool: &PgPool) {
    sqlx::query("TRUNCATE TABLE products, orders, users")
        .execute(pool)
        .await
        .unwrap();
}

fn test_product(stock: u32) -> Product {
    Product::new(
        "Widget",
        "Gadgets",
        "Acme",
        Money::from_cents(1000),
        stock,
        Utc::now(),
    )
    .unwrap()
}

fn test_order(user: common::UserId, product_id: ProductId) -> Order {
    Order::new(
        user,
        vec![LineItem::new(
            product_id,
            "Widget",
            "",
            Money::from_cents(1000),
            2,
        )],
        ShippingAddress {
            address: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            postal_code: None,
            country: None,
        },
        PaymentMethod::PayPal,
        Money::from_cents(500),
        Money::from_cents(200),
        Utc::now(),
    )
    .unwrap()
}

#[tokio::test]
#[serial]
async fn product_roundtrip() {
    let store = get_test_store().await;
    let product = test_product(5);

    store.insert_product(&product).await.unwrap();
    let loaded = store.get_product(product.id).await.unwrap().unwrap();

    assert_eq!(loaded.id, product.id);
    assert_eq!(loaded.count_in_stock, 5);
    assert_eq!(loaded.price.cents(), 1000);
}

#[tokio::test]
#[serial]
async fn adjust_stock_is_conditional() {
    let store = get_test_store().await;
    let product = test_product(3);
    store.insert_product(&product).await.unwrap();

    assert_eq!(store.adjust_stock(product.id, -2).await.unwrap(), 1);

    let err = store.adjust_stock(product.id, -2).await.unwrap_err();
    match err {
        StoreError::StockConflict {
            available,
            requested,
            ..
        } => {
            assert_eq!(available, 1);
            assert_eq!(requested, 2);
        }
        other => panic!("expected StockConflict, got {other:?}"),
    }

    // The JSONB mirror tracks the counter.
    let loaded = store.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(loaded.count_in_stock, 1);
    assert_eq!(loaded.version, 1);
}

#[tokio::test]
#[serial]
async fn adjust_stock_missing_product() {
    let store = get_test_store().await;
    let err = store.adjust_stock(ProductId::new(), -1).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
#[serial]
async fn put_product_version_conflict() {
    let store = get_test_store().await;
    let product = test_product(5);
    store.insert_product(&product).await.unwrap();

    let mut first = product.clone();
    first.name = "Widget v2".to_string();
    let stored = store.put_product(&first).await.unwrap();
    assert_eq!(stored.version, 1);

    let mut stale = product.clone();
    stale.name = "Widget v3".to_string();
    let err = store.put_product(&stale).await.unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict { .. }));
}

#[tokio::test]
#[serial]
async fn list_products_filters() {
    let store = get_test_store().await;
    for (name, brand) in [("Widget A", "Acme"), ("Widget B", "Acme"), ("Gizmo", "Zeta")] {
        let mut p = test_product(1);
        p.name = name.to_string();
        p.brand = brand.to_string();
        store.insert_product(&p).await.unwrap();
    }

    let acme = store
        .list_products(
            &ProductFilter {
                brand: Some("Acme".to_string()),
                ..Default::default()
            },
            Page::first(),
        )
        .await
        .unwrap();
    assert_eq!(acme.total, 2);

    let keyword = store
        .list_products(
            &ProductFilter {
                keyword: Some("gizmo".to_string()),
                ..Default::default()
            },
            Page::first(),
        )
        .await
        .unwrap();
    assert_eq!(keyword.total, 1);
    assert_eq!(keyword.items[0].name, "Gizmo");

    assert_eq!(
        store.product_categories().await.unwrap(),
        vec!["Gadgets".to_string()]
    );
    assert_eq!(
        store.product_brands().await.unwrap(),
        vec!["Acme".to_string(), "Zeta".to_string()]
    );
}

#[tokio::test]
#[serial]
async fn order_roundtrip_and_filters() {
    let store = get_test_store().await;
    let user = common::UserId::new();
    let order = test_order(user, ProductId::new());
    store.insert_order(&order).await.unwrap();

    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.total_price.cents(), 2700);

    let mine = store
        .list_orders(&OrderFilter::for_user(user), Page::first())
        .await
        .unwrap();
    assert_eq!(mine.total, 1);

    let paid = store
        .list_orders(
            &OrderFilter {
                is_paid: Some(true),
                ..Default::default()
            },
            Page::first(),
        )
        .await
        .unwrap();
    assert_eq!(paid.total, 0);
}

#[tokio::test]
#[serial]
async fn put_order_persists_flags() {
    let store = get_test_store().await;
    let user = common::UserId::new();
    let mut order = test_order(user, ProductId::new());
    store.insert_order(&order).await.unwrap();

    order.cancel(user, Utc::now()).unwrap();
    let stored = store.put_order(&order).await.unwrap();
    assert_eq!(stored.version, 1);

    let canceled = store
        .list_orders(
            &OrderFilter {
                is_canceled: Some(true),
                ..Default::default()
            },
            Page::first(),
        )
        .await
        .unwrap();
    assert_eq!(canceled.total, 1);
}

#[tokio::test]
#[serial]
async fn unique_email_enforced() {
    let store = get_test_store().await;
    let user = User::new("Ada", "ada@example.com", Utc::now());
    store.insert_user(&user).await.unwrap();

    let dup = User::new("Imposter", "ada@example.com", Utc::now());
    let err = store.insert_user(&dup).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateEmail { .. }));

    let found = store
        .find_user_by_email("ada@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, user.id);
}
