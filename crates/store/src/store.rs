//! The storage contract.

use async_trait::async_trait;
use common::{OrderId, Page, Paginated, ProductId, UserId};
use model::{Order, Product, User};

use crate::Result;

/// Product listing filter. All fields are conjunctive; `None` matches all.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub brand: Option<String>,
    /// Case-insensitive substring match on the product name.
    pub keyword: Option<String>,
}

/// Order listing filter.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub user: Option<UserId>,
    pub is_paid: Option<bool>,
    pub is_delivered: Option<bool>,
    pub is_canceled: Option<bool>,
}

impl OrderFilter {
    /// Filter for one user's orders.
    pub fn for_user(user: UserId) -> Self {
        Self {
            user: Some(user),
            ..Self::default()
        }
    }
}

/// Document collections for products, orders, and users.
///
/// Writes follow optimistic concurrency: `put_*` succeeds only when the
/// document's `version` matches the stored one, and bumps it by one. The
/// stock counter additionally has its own atomic conditional adjustment so
/// two buyers racing for the last unit are serialized by the store, not by
/// application locks. Every stock or document write bumps the version.
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    // -- products --

    async fn insert_product(&self, product: &Product) -> Result<()>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Newest first.
    async fn list_products(
        &self,
        filter: &ProductFilter,
        page: Page,
    ) -> Result<Paginated<Product>>;

    /// Version-conditioned full-document write. Returns the stored document
    /// with the bumped version.
    async fn put_product(&self, product: &Product) -> Result<Product>;

    /// Returns true if a document was deleted.
    async fn delete_product(&self, id: ProductId) -> Result<bool>;

    /// Atomically adds `delta` to the stock counter, failing with
    /// [`StockConflict`](crate::StoreError::StockConflict) if the result
    /// would go negative. Returns the new stock level.
    async fn adjust_stock(&self, id: ProductId, delta: i64) -> Result<u32>;

    /// Distinct product categories.
    async fn product_categories(&self) -> Result<Vec<String>>;

    /// Distinct product brands.
    async fn product_brands(&self) -> Result<Vec<String>>;

    // -- orders --

    async fn insert_order(&self, order: &Order) -> Result<()>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Newest first.
    async fn list_orders(&self, filter: &OrderFilter, page: Page) -> Result<Paginated<Order>>;

    /// Version-conditioned full-document write. Returns the stored document
    /// with the bumped version.
    async fn put_order(&self, order: &Order) -> Result<Order>;

    // -- users --

    async fn insert_user(&self, user: &User) -> Result<()>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
}
