//! Product document with embedded reviews and sale pricing.

use chrono::{DateTime, Utc};
use common::{Money, ProductId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from product business rules.
#[derive(Debug, Error)]
pub enum ProductError {
    /// Review rating outside the 1..=5 range.
    #[error("Invalid rating: {rating} (must be between 1 and 5)")]
    InvalidRating { rating: u8 },

    /// The user already reviewed this product.
    #[error("User {user_id} already reviewed this product")]
    AlreadyReviewed { user_id: UserId },

    /// No review by that user exists.
    #[error("No review by user {user_id}")]
    ReviewNotFound { user_id: UserId },

    /// Price must be positive.
    #[error("Invalid price: {cents} cents (must be greater than 0)")]
    InvalidPrice { cents: i64 },
}

/// A customer review embedded in the product document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub user: UserId,
    /// Display name snapshot taken when the review was written.
    pub user_name: String,
    pub rating: u8,
    pub comment: String,
    /// Hidden reviews stay in the document but do not count toward the rating.
    pub is_visible: bool,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn new(
        user: UserId,
        user_name: impl Into<String>,
        rating: u8,
        comment: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user,
            user_name: user_name.into(),
            rating,
            comment: comment.into(),
            is_visible: true,
            created_at: now,
        }
    }
}

/// Product document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    pub category: String,
    pub brand: String,
    pub price: Money,
    /// Promotional price, effective while `sale_end_date` is in the future.
    pub sale_price: Option<Money>,
    pub sale_end_date: Option<DateTime<Utc>>,
    pub count_in_stock: u32,
    /// Mean rating over visible reviews.
    pub rating: f64,
    pub num_reviews: u32,
    #[serde(default)]
    pub reviews: Vec<Review>,
    pub created_at: DateTime<Utc>,
    /// Document version for optimistic concurrency.
    #[serde(default)]
    pub version: u64,
}

impl Product {
    /// Creates a product with no reviews and the given starting stock.
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        brand: impl Into<String>,
        price: Money,
        count_in_stock: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, ProductError> {
        if !price.is_positive() {
            return Err(ProductError::InvalidPrice {
                cents: price.cents(),
            });
        }

        Ok(Self {
            id: ProductId::new(),
            name: name.into(),
            description: String::new(),
            image: String::new(),
            category: category.into(),
            brand: brand.into(),
            price,
            sale_price: None,
            sale_end_date: None,
            count_in_stock,
            rating: 0.0,
            num_reviews: 0,
            reviews: Vec::new(),
            created_at: now,
            version: 0,
        })
    }

    /// The price a buyer pays right now: the sale price while the sale
    /// window is open, the base price otherwise.
    pub fn effective_price(&self, now: DateTime<Utc>) -> Money {
        match (self.sale_price, self.sale_end_date) {
            (Some(sale), Some(end)) if now < end => sale,
            _ => self.price,
        }
    }

    /// Returns true if a sale price currently applies.
    pub fn on_sale(&self, now: DateTime<Utc>) -> bool {
        self.effective_price(now) != self.price
    }

    /// Adds a review, one per user, and recomputes the derived rating.
    pub fn add_review(&mut self, review: Review) -> Result<(), ProductError> {
        if !(1..=5).contains(&review.rating) {
            return Err(ProductError::InvalidRating {
                rating: review.rating,
            });
        }

        if self.reviews.iter().any(|r| r.user == review.user) {
            return Err(ProductError::AlreadyReviewed {
                user_id: review.user,
            });
        }

        self.reviews.push(review);
        self.recompute_rating();
        Ok(())
    }

    /// Hides a user's review from the public listing and the rating.
    pub fn hide_review(&mut self, user: UserId) -> Result<(), ProductError> {
        let review = self
            .reviews
            .iter_mut()
            .find(|r| r.user == user)
            .ok_or(ProductError::ReviewNotFound { user_id: user })?;

        review.is_visible = false;
        self.recompute_rating();
        Ok(())
    }

    /// Visible reviews only.
    pub fn visible_reviews(&self) -> impl Iterator<Item = &Review> {
        self.reviews.iter().filter(|r| r.is_visible)
    }

    fn recompute_rating(&mut self) {
        let visible: Vec<_> = self.reviews.iter().filter(|r| r.is_visible).collect();
        self.num_reviews = visible.len() as u32;
        self.rating = if visible.is_empty() {
            0.0
        } else {
            visible.iter().map(|r| r.rating as f64).sum::<f64>() / visible.len() as f64
        };
    }
}
