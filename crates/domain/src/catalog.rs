//! Product catalog service.
//!
//! Product CRUD, embedded reviews, and the cached category/brand listings.
//! Mutations go through version-guarded writes like the order side; the
//! listing cache is dropped eagerly on every catalog mutation rather than
//! waiting for the TTL.

use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{Money, Page, Paginated, ProductId, UserId};
use model::{Actor, Product, ProductError, Review};
use store::{ProductFilter, Store, StoreError};

use crate::cache::TtlCache;
use crate::error::DomainError;

/// Lifetime of a cached category/brand listing. Invalidation on mutation
/// is the primary freshness mechanism; the TTL only bounds staleness when
/// another writer bypasses this service.
const LISTING_TTL: Duration = Duration::from_secs(300);

/// Attempts for a version-guarded product write before giving up.
const MAX_WRITE_RETRIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ListingKey {
    Categories,
    Brands,
}

/// Input for product creation.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub image: String,
    pub category: String,
    pub brand: String,
    pub price: Money,
    pub sale_price: Option<Money>,
    pub sale_end_date: Option<DateTime<Utc>>,
    pub count_in_stock: u32,
}

/// Partial product update; `None` leaves the field untouched. The sale
/// fields are doubly optional so a sale can be cleared explicitly.
#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub price: Option<Money>,
    pub sale_price: Option<Option<Money>>,
    pub sale_end_date: Option<Option<DateTime<Utc>>>,
    pub count_in_stock: Option<u32>,
}

impl ProductUpdate {
    fn apply(&self, product: &mut Product) -> Result<(), ProductError> {
        if let Some(price) = self.price {
            if !price.is_positive() {
                return Err(ProductError::InvalidPrice {
                    cents: price.cents(),
                });
            }
            product.price = price;
        }
        if let Some(name) = &self.name {
            product.name = name.clone();
        }
        if let Some(description) = &self.description {
            product.description = description.clone();
        }
        if let Some(image) = &self.image {
            product.image = image.clone();
        }
        if let Some(category) = &self.category {
            product.category = category.clone();
        }
        if let Some(brand) = &self.brand {
            product.brand = brand.clone();
        }
        if let Some(sale_price) = self.sale_price {
            product.sale_price = sale_price;
        }
        if let Some(sale_end_date) = self.sale_end_date {
            product.sale_end_date = sale_end_date;
        }
        if let Some(count_in_stock) = self.count_in_stock {
            product.count_in_stock = count_in_stock;
        }
        Ok(())
    }
}

/// Service for the product catalog.
pub struct CatalogService<S> {
    store: S,
    listings: TtlCache<ListingKey, Vec<String>>,
}

impl<S> Clone for CatalogService<S>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            listings: self.listings.clone(),
        }
    }
}

impl<S> CatalogService<S>
where
    S: Store,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            listings: TtlCache::new(LISTING_TTL),
        }
    }

    /// Creates a product. Admin only.
    #[tracing::instrument(skip(self, input), fields(actor = %actor.id))]
    pub async fn create_product(
        &self,
        actor: Actor,
        input: NewProduct,
    ) -> Result<Product, DomainError> {
        if !actor.is_admin {
            return Err(DomainError::Forbidden("admin only"));
        }

        let mut product = Product::new(
            input.name,
            input.category,
            input.brand,
            input.price,
            input.count_in_stock,
            Utc::now(),
        )?;
        product.description = input.description;
        product.image = input.image;
        product.sale_price = input.sale_price;
        product.sale_end_date = input.sale_end_date;

        self.store.insert_product(&product).await?;
        self.listings.clear().await;

        metrics::counter!("products_created_total").increment(1);
        Ok(product)
    }

    /// Applies a partial update. Admin only.
    #[tracing::instrument(skip(self, update), fields(actor = %actor.id))]
    pub async fn update_product(
        &self,
        actor: Actor,
        product_id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, DomainError> {
        if !actor.is_admin {
            return Err(DomainError::Forbidden("admin only"));
        }

        let stored = self
            .commit_product(product_id, |p| update.apply(p))
            .await?;
        self.listings.clear().await;
        Ok(stored)
    }

    /// Removes a product. Admin only. Existing orders keep their snapshots.
    #[tracing::instrument(skip(self), fields(actor = %actor.id))]
    pub async fn delete_product(&self, actor: Actor, product_id: ProductId) -> Result<(), DomainError> {
        if !actor.is_admin {
            return Err(DomainError::Forbidden("admin only"));
        }

        self.store.delete_product(product_id).await?;
        self.listings.clear().await;
        Ok(())
    }

    /// Loads one product.
    pub async fn get_product(&self, product_id: ProductId) -> Result<Product, DomainError> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or_else(|| DomainError::not_found("product", product_id))
    }

    /// Filtered, paginated catalog listing.
    pub async fn list_products(
        &self,
        filter: &ProductFilter,
        page: Page,
    ) -> Result<Paginated<Product>, DomainError> {
        Ok(self.store.list_products(filter, page).await?)
    }

    /// Adds the actor's review, one per product. The display name is
    /// snapshotted from the user document at review time.
    #[tracing::instrument(skip(self, comment), fields(actor = %actor.id))]
    pub async fn add_review(
        &self,
        actor: Actor,
        product_id: ProductId,
        rating: u8,
        comment: String,
    ) -> Result<Product, DomainError> {
        let user = self
            .store
            .get_user(actor.id)
            .await?
            .ok_or_else(|| DomainError::not_found("user", actor.id))?;

        self.commit_product(product_id, |p| {
            p.add_review(Review::new(
                actor.id,
                user.name.clone(),
                rating,
                comment.clone(),
                Utc::now(),
            ))
        })
        .await
    }

    /// Hides a review from the rating and public listing. Admin only.
    #[tracing::instrument(skip(self), fields(actor = %actor.id))]
    pub async fn hide_review(
        &self,
        actor: Actor,
        product_id: ProductId,
        reviewer: UserId,
    ) -> Result<Product, DomainError> {
        if !actor.is_admin {
            return Err(DomainError::Forbidden("admin only"));
        }

        self.commit_product(product_id, |p| p.hide_review(reviewer))
            .await
    }

    /// Distinct categories, served from the listing cache.
    pub async fn categories(&self) -> Result<Vec<String>, DomainError> {
        self.listing(ListingKey::Categories).await
    }

    /// Distinct brands, served from the listing cache.
    pub async fn brands(&self) -> Result<Vec<String>, DomainError> {
        self.listing(ListingKey::Brands).await
    }

    async fn listing(&self, key: ListingKey) -> Result<Vec<String>, DomainError> {
        if let Some(values) = self.listings.get(&key).await {
            metrics::counter!("listing_cache_hits_total").increment(1);
            return Ok(values);
        }
        metrics::counter!("listing_cache_misses_total").increment(1);

        let values = match key {
            ListingKey::Categories => self.store.product_categories().await?,
            ListingKey::Brands => self.store.product_brands().await?,
        };
        self.listings.insert(key, values.clone()).await;
        Ok(values)
    }

    /// Version-guarded read-check-write with bounded retry.
    async fn commit_product<F>(&self, product_id: ProductId, mutate: F) -> Result<Product, DomainError>
    where
        F: Fn(&mut Product) -> Result<(), ProductError>,
    {
        let mut product = self.get_product(product_id).await?;

        for _ in 0..MAX_WRITE_RETRIES {
            let mut candidate = product.clone();
            mutate(&mut candidate)?;

            match self.store.put_product(&candidate).await {
                Ok(stored) => return Ok(stored),
                Err(StoreError::VersionConflict { .. }) => {
                    product = self.get_product(product_id).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::VersionConflict {
            collection: "products",
            id: product_id.to_string(),
        }
        .into())
    }
}
