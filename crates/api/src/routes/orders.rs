//! Order lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, Page, Paginated, ProductId, UserId};
use domain::{DraftItem, OrderDraft, ReorderOutcome};
use model::{Order, PaymentResult, ShippingAddress, TimelineEvent, TimelineSource};
use serde::{Deserialize, Serialize};
use store::{OrderFilter, Store};

use crate::AppState;
use crate::auth::Identity;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct ShippingAddressRequest {
    pub address: String,
    pub city: String,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemRequest>,
    pub shipping_address: ShippingAddressRequest,
    pub payment_method: String,
    pub items_price_cents: i64,
    #[serde(default)]
    pub shipping_price_cents: i64,
    #[serde(default)]
    pub tax_price_cents: i64,
}

#[derive(Deserialize)]
pub struct PaymentRequest {
    pub id: String,
    pub status: String,
    pub update_time: String,
    pub payer_email: String,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Deserialize, Default)]
pub struct OrderListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub user: Option<String>,
    pub is_paid: Option<bool>,
    pub is_delivered: Option<bool>,
    pub is_canceled: Option<bool>,
}

#[derive(Deserialize, Default)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub name: String,
    pub image: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
    pub is_canceled: bool,
}

#[derive(Serialize)]
pub struct ShippingAddressResponse {
    pub address: String,
    pub city: String,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user: String,
    pub items: Vec<OrderItemResponse>,
    pub shipping_address: ShippingAddressResponse,
    pub payment_method: String,
    pub items_price_cents: i64,
    pub shipping_price_cents: i64,
    pub tax_price_cents: i64,
    pub total_price_cents: i64,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub is_canceled: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            user: order.user.to_string(),
            items: order
                .items
                .iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.to_string(),
                    name: item.name.clone(),
                    image: item.image.clone(),
                    unit_price_cents: item.unit_price.cents(),
                    quantity: item.quantity,
                    is_canceled: item.is_canceled,
                })
                .collect(),
            shipping_address: ShippingAddressResponse {
                address: order.shipping_address.address,
                city: order.shipping_address.city,
                postal_code: order.shipping_address.postal_code,
                country: order.shipping_address.country,
            },
            payment_method: order.payment_method.to_string(),
            items_price_cents: order.items_price.cents(),
            shipping_price_cents: order.shipping_price.cents(),
            tax_price_cents: order.tax_price.cents(),
            total_price_cents: order.total_price.cents(),
            is_paid: order.is_paid,
            paid_at: order.paid_at,
            is_delivered: order.is_delivered,
            delivered_at: order.delivered_at,
            is_canceled: order.is_canceled,
            canceled_at: order.canceled_at,
            status: order.custom_status,
            created_at: order.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct OrderListResponse {
    pub items: Vec<OrderResponse>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub pages: u64,
}

impl From<Paginated<Order>> for OrderListResponse {
    fn from(page: Paginated<Order>) -> Self {
        let pages = page.pages();
        Self {
            items: page.items.into_iter().map(OrderResponse::from).collect(),
            page: page.page,
            per_page: page.per_page,
            total: page.total,
            pages,
        }
    }
}

#[derive(Serialize)]
pub struct TimelineEventResponse {
    pub status: String,
    pub at: DateTime<Utc>,
    pub source: &'static str,
    pub actor: Option<String>,
}

impl From<TimelineEvent> for TimelineEventResponse {
    fn from(event: TimelineEvent) -> Self {
        Self {
            status: event.status,
            at: event.at,
            source: match event.source {
                TimelineSource::Milestone => "milestone",
                TimelineSource::History => "history",
            },
            actor: event.actor.map(|a| a.to_string()),
        }
    }
}

#[derive(Serialize)]
pub struct ReorderResponse {
    pub order: OrderResponse,
    pub unavailable_items: Vec<String>,
}

// -- Handlers --

/// POST /orders — place a new order.
#[tracing::instrument(skip(state, req), fields(user = %identity.0.id))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let draft = OrderDraft {
        items: req
            .items
            .iter()
            .map(|item| {
                Ok(DraftItem {
                    product_id: parse_product_id(&item.product_id)?,
                    quantity: item.quantity,
                })
            })
            .collect::<Result<Vec<_>, ApiError>>()?,
        shipping_address: ShippingAddress {
            address: req.shipping_address.address,
            city: req.shipping_address.city,
            postal_code: req.shipping_address.postal_code,
            country: req.shipping_address.country,
        },
        payment_method: req.payment_method,
        claimed_items_price: common::Money::from_cents(req.items_price_cents),
        shipping_price: common::Money::from_cents(req.shipping_price_cents),
        tax_price: common::Money::from_cents(req.tax_price_cents),
    };

    let order = state.orders.create_order(identity.0, draft).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders/mine — the caller's orders, newest first.
#[tracing::instrument(skip(state, query), fields(user = %identity.0.id))]
pub async fn mine<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Query(query): Query<PageQuery>,
) -> Result<Json<OrderListResponse>, ApiError> {
    let page = page_from(query.page, query.per_page);
    let orders = state.orders.my_orders(identity.0, page).await?;
    Ok(Json(orders.into()))
}

/// GET /orders — admin listing across users.
#[tracing::instrument(skip(state, query), fields(user = %identity.0.id))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<OrderListResponse>, ApiError> {
    let filter = OrderFilter {
        user: query
            .user
            .as_deref()
            .map(parse_user_id)
            .transpose()?,
        is_paid: query.is_paid,
        is_delivered: query.is_delivered,
        is_canceled: query.is_canceled,
    };
    let page = page_from(query.page, query.per_page);
    let orders = state.orders.list_orders(identity.0, &filter, page).await?;
    Ok(Json(orders.into()))
}

/// GET /orders/:id — load one order.
#[tracing::instrument(skip(state), fields(user = %identity.0.id))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.orders.get_order(identity.0, order_id).await?;
    Ok(Json(order.into()))
}

/// PUT /orders/:id/pay — record a provider payment.
#[tracing::instrument(skip(state, req), fields(user = %identity.0.id))]
pub async fn pay<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<PaymentRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let result = PaymentResult {
        provider_id: req.id,
        status: req.status,
        update_time: req.update_time,
        payer_email: req.payer_email,
    };
    let order = state.orders.mark_paid(identity.0, order_id, result).await?;
    Ok(Json(order.into()))
}

/// PUT /orders/:id/deliver — mark delivered (admin).
#[tracing::instrument(skip(state), fields(user = %identity.0.id))]
pub async fn deliver<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.orders.mark_delivered(identity.0, order_id).await?;
    Ok(Json(order.into()))
}

/// PUT /orders/:id/cancel — cancel the whole order.
#[tracing::instrument(skip(state), fields(user = %identity.0.id))]
pub async fn cancel<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.orders.cancel_order(identity.0, order_id).await?;
    Ok(Json(order.into()))
}

/// PUT /orders/:order_id/items/:product_id/cancel — cancel one line item.
#[tracing::instrument(skip(state), fields(user = %identity.0.id))]
pub async fn cancel_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path((order_id, product_id)): Path<(String, String)>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&order_id)?;
    let product_id = parse_product_id(&product_id)?;
    let order = state
        .orders
        .cancel_order_item(identity.0, order_id, product_id)
        .await?;
    Ok(Json(order.into()))
}

/// PUT /orders/:id/status — set the display status (admin).
#[tracing::instrument(skip(state, req), fields(user = %identity.0.id))]
pub async fn set_status<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .orders
        .set_status(identity.0, order_id, req.status)
        .await?;
    Ok(Json(order.into()))
}

/// POST /orders/:id/reorder — repeat an earlier order.
#[tracing::instrument(skip(state), fields(user = %identity.0.id))]
pub async fn reorder<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<ReorderResponse>), ApiError> {
    let order_id = parse_order_id(&id)?;
    let ReorderOutcome { order, unavailable } =
        state.orders.reorder(identity.0, order_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(ReorderResponse {
            order: order.into(),
            unavailable_items: unavailable.iter().map(ToString::to_string).collect(),
        }),
    ))
}

/// GET /orders/:id/timeline — the merged status timeline.
#[tracing::instrument(skip(state), fields(user = %identity.0.id))]
pub async fn timeline<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<Vec<TimelineEventResponse>>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let events = state.orders.timeline(identity.0, order_id).await?;
    Ok(Json(events.into_iter().map(Into::into).collect()))
}

// -- helpers --

pub(crate) fn page_from(number: Option<u32>, per_page: Option<u32>) -> Page {
    match (number, per_page) {
        (None, None) => Page::default(),
        (number, per_page) => Page::new(
            number.unwrap_or(1),
            per_page.unwrap_or_else(|| Page::default().per_page),
        ),
    }
}

pub(crate) fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    OrderId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))
}

pub(crate) fn parse_product_id(id: &str) -> Result<ProductId, ApiError> {
    ProductId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid product id: {e}")))
}

fn parse_user_id(id: &str) -> Result<UserId, ApiError> {
    UserId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid user id: {e}")))
}
