//! In-memory store for tests and local runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, Page, Paginated, ProductId, UserId};
use model::{Order, Product, User};
use tokio::sync::RwLock;

use crate::{OrderFilter, ProductFilter, Result, Store, StoreError};

/// In-memory document store.
///
/// Provides the same contract as the PostgreSQL adapter: writes under the
/// collection's write lock give the version checks and the conditional
/// stock adjustment the same atomicity the database enforces there.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    users: Arc<RwLock<HashMap<UserId, User>>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Current stock level, bypassing the trait for test assertions.
    pub async fn stock_of(&self, id: ProductId) -> Option<u32> {
        self.products.read().await.get(&id).map(|p| p.count_in_stock)
    }
}

fn paginate<T: Clone>(mut matches: Vec<&T>, page: Page, key: impl Fn(&T) -> chrono::DateTime<chrono::Utc>) -> Paginated<T> {
    matches.sort_by_key(|item| std::cmp::Reverse(key(item)));
    let total = matches.len() as u64;
    let items = matches
        .into_iter()
        .skip(page.offset())
        .take(page.limit())
        .cloned()
        .collect();
    Paginated::new(items, page, total)
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut products = self.products.write().await;
        if products.contains_key(&product.id) {
            return Err(StoreError::Duplicate {
                collection: "products",
                id: product.id.to_string(),
            });
        }
        products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        page: Page,
    ) -> Result<Paginated<Product>> {
        let products = self.products.read().await;
        let keyword = filter.keyword.as_deref().map(str::to_lowercase);
        let matches: Vec<&Product> = products
            .values()
            .filter(|p| filter.category.as_deref().is_none_or(|c| p.category == c))
            .filter(|p| filter.brand.as_deref().is_none_or(|b| p.brand == b))
            .filter(|p| {
                keyword
                    .as_deref()
                    .is_none_or(|k| p.name.to_lowercase().contains(k))
            })
            .collect();
        Ok(paginate(matches, page, |p| p.created_at))
    }

    async fn put_product(&self, product: &Product) -> Result<Product> {
        let mut products = self.products.write().await;
        let stored = products
            .get_mut(&product.id)
            .ok_or_else(|| StoreError::NotFound {
                collection: "products",
                id: product.id.to_string(),
            })?;

        if stored.version != product.version {
            return Err(StoreError::VersionConflict {
                collection: "products",
                id: product.id.to_string(),
            });
        }

        let mut updated = product.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool> {
        Ok(self.products.write().await.remove(&id).is_some())
    }

    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<u32> {
        let mut products = self.products.write().await;
        let product = products.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            collection: "products",
            id: id.to_string(),
        })?;

        let next = product.count_in_stock as i64 + delta;
        if next < 0 {
            return Err(StoreError::StockConflict {
                product_id: id,
                requested: (-delta) as u32,
                available: product.count_in_stock,
            });
        }

        product.count_in_stock = next as u32;
        product.version += 1;
        Ok(product.count_in_stock)
    }

    async fn product_categories(&self) -> Result<Vec<String>> {
        let products = self.products.read().await;
        let mut categories: Vec<String> = products.values().map(|p| p.category.clone()).collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn product_brands(&self) -> Result<Vec<String>> {
        let products = self.products.read().await;
        let mut brands: Vec<String> = products.values().map(|p| p.brand.clone()).collect();
        brands.sort();
        brands.dedup();
        Ok(brands)
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate {
                collection: "orders",
                id: order.id.to_string(),
            });
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter, page: Page) -> Result<Paginated<Order>> {
        let orders = self.orders.read().await;
        let matches: Vec<&Order> = orders
            .values()
            .filter(|o| filter.user.is_none_or(|u| o.user == u))
            .filter(|o| filter.is_paid.is_none_or(|v| o.is_paid == v))
            .filter(|o| filter.is_delivered.is_none_or(|v| o.is_delivered == v))
            .filter(|o| filter.is_canceled.is_none_or(|v| o.is_canceled == v))
            .collect();
        Ok(paginate(matches, page, |o| o.created_at))
    }

    async fn put_order(&self, order: &Order) -> Result<Order> {
        let mut orders = self.orders.write().await;
        let stored = orders.get_mut(&order.id).ok_or_else(|| StoreError::NotFound {
            collection: "orders",
            id: order.id.to_string(),
        })?;

        if stored.version != order.version {
            return Err(StoreError::VersionConflict {
                collection: "orders",
                id: order.id.to_string(),
            });
        }

        let mut updated = order.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(StoreError::Duplicate {
                collection: "users",
                id: user.id.to_string(),
            });
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail {
                email: user.email.clone(),
            });
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::Money;

    fn product(stock: u32) -> Product {
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

    #[tokio::test]
    async fn insert_and_get_product() {
        let store = InMemoryStore::new();
        let p = product(5);
        store.insert_product(&p).await.unwrap();

        let loaded = store.get_product(p.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Widget");
        assert!(store.get_product(ProductId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_rejected() {
        let store = InMemoryStore::new();
        let p = product(5);
        store.insert_product(&p).await.unwrap();
        let result = store.insert_product(&p).await;
        assert!(matches!(result, Err(StoreError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn adjust_stock_decrement_and_restore() {
        let store = InMemoryStore::new();
        let p = product(5);
        store.insert_product(&p).await.unwrap();

        assert_eq!(store.adjust_stock(p.id, -2).await.unwrap(), 3);
        assert_eq!(store.adjust_stock(p.id, 2).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn adjust_stock_never_goes_negative() {
        let store = InMemoryStore::new();
        let p = product(1);
        store.insert_product(&p).await.unwrap();

        let result = store.adjust_stock(p.id, -2).await;
        match result {
            Err(StoreError::StockConflict {
                requested,
                available,
                ..
            }) => {
                assert_eq!(requested, 2);
                assert_eq!(available, 1);
            }
            other => panic!("expected StockConflict, got {other:?}"),
        }
        assert_eq!(store.stock_of(p.id).await, Some(1));
    }

    #[tokio::test]
    async fn put_product_enforces_version() {
        let store = InMemoryStore::new();
        let p = product(5);
        store.insert_product(&p).await.unwrap();

        let mut first = p.clone();
        first.name = "Widget v2".to_string();
        let stored = store.put_product(&first).await.unwrap();
        assert_eq!(stored.version, 1);

        // Second write from the stale version loses.
        let mut stale = p.clone();
        stale.name = "Widget v3".to_string();
        let result = store.put_product(&stale).await;
        assert!(matches!(result, Err(StoreError::VersionConflict { .. })));
    }

    #[tokio::test]
    async fn stock_adjustment_bumps_version() {
        let store = InMemoryStore::new();
        let p = product(5);
        store.insert_product(&p).await.unwrap();
        store.adjust_stock(p.id, -1).await.unwrap();

        // A put from the pre-adjustment read must now conflict.
        let result = store.put_product(&p).await;
        assert!(matches!(result, Err(StoreError::VersionConflict { .. })));
    }

    #[tokio::test]
    async fn list_products_filters_and_paginates() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            let mut p = product(1);
            p.name = format!("Widget {i}");
            if i % 2 == 0 {
                p.brand = "Other".to_string();
            }
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
                    keyword: Some("widget 3".to_string()),
                    ..Default::default()
                },
                Page::first(),
            )
            .await
            .unwrap();
        assert_eq!(keyword.total, 1);

        let paged = store
            .list_products(&ProductFilter::default(), Page::new(2, 2))
            .await
            .unwrap();
        assert_eq!(paged.items.len(), 2);
        assert_eq!(paged.total, 5);
    }

    #[tokio::test]
    async fn categories_and_brands_are_distinct_sorted() {
        let store = InMemoryStore::new();
        for (category, brand) in [("B", "Acme"), ("A", "Zeta"), ("B", "Acme")] {
            let mut p = product(1);
            p.category = category.to_string();
            p.brand = brand.to_string();
            store.insert_product(&p).await.unwrap();
        }

        assert_eq!(store.product_categories().await.unwrap(), vec!["A", "B"]);
        assert_eq!(
            store.product_brands().await.unwrap(),
            vec!["Acme", "Zeta"]
        );
    }

    #[tokio::test]
    async fn unique_email_enforced() {
        let store = InMemoryStore::new();
        let user = User::new("Ada", "ada@example.com", Utc::now());
        store.insert_user(&user).await.unwrap();

        let dup = User::new("Imposter", "ada@example.com", Utc::now());
        let result = store.insert_user(&dup).await;
        assert!(matches!(result, Err(StoreError::DuplicateEmail { .. })));

        let found = store.find_user_by_email("ada@example.com").await.unwrap();
        assert_eq!(found.unwrap().id, user.id);
    }
}
