//! Product catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{Money, Paginated};
use domain::{NewProduct, ProductUpdate};
use model::Product;
use serde::{Deserialize, Deserializer, Serialize};
use store::{ProductFilter, Store};

use crate::AppState;
use crate::auth::Identity;
use crate::error::ApiError;

use super::orders::{page_from, parse_product_id};

// -- Request types --

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    pub category: String,
    pub brand: String,
    pub price_cents: i64,
    #[serde(default)]
    pub sale_price_cents: Option<i64>,
    #[serde(default)]
    pub sale_end_date: Option<DateTime<Utc>>,
    pub count_in_stock: u32,
}

/// Partial update. Absent fields are left untouched; the sale fields accept
/// an explicit `null` to clear a running sale.
#[derive(Deserialize, Default)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub price_cents: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub sale_price_cents: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub sale_end_date: Option<Option<DateTime<Utc>>>,
    pub count_in_stock: Option<u32>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
pub struct StockRequest {
    pub count_in_stock: u32,
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub rating: u8,
    pub comment: String,
}

#[derive(Deserialize, Default)]
pub struct ProductListQuery {
    pub category: Option<String>,
    pub brand: Option<String>,
    pub keyword: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

// -- Response types --

#[derive(Serialize)]
pub struct ReviewResponse {
    pub user: String,
    pub user_name: String,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image: String,
    pub category: String,
    pub brand: String,
    pub price_cents: i64,
    pub sale_price_cents: Option<i64>,
    pub sale_end_date: Option<DateTime<Utc>>,
    pub effective_price_cents: i64,
    pub on_sale: bool,
    pub count_in_stock: u32,
    pub rating: f64,
    pub num_reviews: u32,
    pub reviews: Vec<ReviewResponse>,
    pub created_at: DateTime<Utc>,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        let now = Utc::now();
        Self {
            id: product.id.to_string(),
            effective_price_cents: product.effective_price(now).cents(),
            on_sale: product.on_sale(now),
            // Hidden reviews are omitted from the public shape.
            reviews: product
                .visible_reviews()
                .map(|review| ReviewResponse {
                    user: review.user.to_string(),
                    user_name: review.user_name.clone(),
                    rating: review.rating,
                    comment: review.comment.clone(),
                    created_at: review.created_at,
                })
                .collect(),
            name: product.name,
            description: product.description,
            image: product.image,
            category: product.category,
            brand: product.brand,
            price_cents: product.price.cents(),
            sale_price_cents: product.sale_price.map(|p| p.cents()),
            sale_end_date: product.sale_end_date,
            count_in_stock: product.count_in_stock,
            rating: product.rating,
            num_reviews: product.num_reviews,
            created_at: product.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct ProductListResponse {
    pub items: Vec<ProductResponse>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub pages: u64,
}

impl From<Paginated<Product>> for ProductListResponse {
    fn from(page: Paginated<Product>) -> Self {
        let pages = page.pages();
        Self {
            items: page.items.into_iter().map(ProductResponse::from).collect(),
            page: page.page,
            per_page: page.per_page,
            total: page.total,
            pages,
        }
    }
}

// -- Handlers --

/// GET /products — public catalog listing.
#[tracing::instrument(skip(state, query))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<ProductListResponse>, ApiError> {
    let filter = ProductFilter {
        category: query.category,
        brand: query.brand,
        keyword: query.keyword,
    };
    let page = page_from(query.page, query.per_page);
    let products = state.catalog.list_products(&filter, page).await?;
    Ok(Json(products.into()))
}

/// GET /products/:id — load one product.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id = parse_product_id(&id)?;
    let product = state.catalog.get_product(product_id).await?;
    Ok(Json(product.into()))
}

/// POST /products — create a product (admin).
#[tracing::instrument(skip(state, req), fields(user = %identity.0.id))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let input = NewProduct {
        name: req.name,
        description: req.description,
        image: req.image,
        category: req.category,
        brand: req.brand,
        price: Money::from_cents(req.price_cents),
        sale_price: req.sale_price_cents.map(Money::from_cents),
        sale_end_date: req.sale_end_date,
        count_in_stock: req.count_in_stock,
    };
    let product = state.catalog.create_product(identity.0, input).await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

/// PUT /products/:id — partial update (admin).
#[tracing::instrument(skip(state, req), fields(user = %identity.0.id))]
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id = parse_product_id(&id)?;
    let update = ProductUpdate {
        name: req.name,
        description: req.description,
        image: req.image,
        category: req.category,
        brand: req.brand,
        price: req.price_cents.map(Money::from_cents),
        sale_price: req
            .sale_price_cents
            .map(|inner| inner.map(Money::from_cents)),
        sale_end_date: req.sale_end_date,
        count_in_stock: req.count_in_stock,
    };
    let product = state
        .catalog
        .update_product(identity.0, product_id, update)
        .await?;
    Ok(Json(product.into()))
}

/// DELETE /products/:id — remove a product (admin).
#[tracing::instrument(skip(state), fields(user = %identity.0.id))]
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let product_id = parse_product_id(&id)?;
    state.catalog.delete_product(identity.0, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /products/:id/stock — explicit stock edit (admin).
#[tracing::instrument(skip(state, req), fields(user = %identity.0.id))]
pub async fn set_stock<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<StockRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id = parse_product_id(&id)?;
    let update = ProductUpdate {
        count_in_stock: Some(req.count_in_stock),
        ..ProductUpdate::default()
    };
    let product = state
        .catalog
        .update_product(identity.0, product_id, update)
        .await?;
    Ok(Json(product.into()))
}

/// POST /products/:id/reviews — add the caller's review.
#[tracing::instrument(skip(state, req), fields(user = %identity.0.id))]
pub async fn add_review<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<ReviewRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let product_id = parse_product_id(&id)?;
    let product = state
        .catalog
        .add_review(identity.0, product_id, req.rating, req.comment)
        .await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

/// DELETE /products/:id/reviews/:user_id — hide a review (admin).
#[tracing::instrument(skip(state), fields(user = %identity.0.id))]
pub async fn hide_review<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path((id, user_id)): Path<(String, String)>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id = parse_product_id(&id)?;
    let reviewer = common::UserId::parse(&user_id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid user id: {e}")))?;
    let product = state
        .catalog
        .hide_review(identity.0, product_id, reviewer)
        .await?;
    Ok(Json(product.into()))
}

/// GET /products/categories — distinct categories (cached).
#[tracing::instrument(skip(state))]
pub async fn categories<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.catalog.categories().await?))
}

/// GET /products/brands — distinct brands (cached).
#[tracing::instrument(skip(state))]
pub async fn brands<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.catalog.brands().await?))
}
