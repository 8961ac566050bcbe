//! Order document and lifecycle rules.
//!
//! An order is never deleted; it moves through boolean lifecycle flags
//! (paid, delivered, canceled) guarded by the methods here, and carries an
//! append-only status history alongside those flags.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Business-rule violations on orders.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order has no items.
    #[error("Order has no items")]
    EmptyOrder,

    /// Shipping address is missing required fields.
    #[error("Shipping address requires at least an address and a city")]
    InvalidShippingAddress,

    /// Unknown payment method.
    #[error("Invalid payment method: {method}")]
    InvalidPaymentMethod { method: String },

    /// Item quantity must be positive.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// A referenced product does not exist.
    #[error("Product not found: {product_id}")]
    ProductNotFound { product_id: ProductId },

    /// Not enough stock to satisfy a line item.
    #[error("Out of stock: product {product_id} has {available} units, {requested} requested")]
    OutOfStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Shipping and tax charges cannot be negative.
    #[error("Invalid {kind} amount: {amount} (must not be negative)")]
    NegativeCharge { kind: &'static str, amount: Money },

    /// Client-claimed items price disagrees with the server-side computation.
    #[error("Price mismatch: claimed {claimed}, computed {computed}")]
    PriceMismatch { claimed: Money, computed: Money },

    /// Payment was already recorded.
    #[error("Order is already paid")]
    AlreadyPaid,

    /// Delivery was already recorded.
    #[error("Order is already delivered")]
    AlreadyDelivered,

    /// Delivery requires payment first.
    #[error("Cannot deliver an unpaid order")]
    CannotDeliverUnpaid,

    /// The order was already canceled.
    #[error("Order is already canceled")]
    AlreadyCanceled,

    /// Delivered orders are terminal.
    #[error("Cannot cancel a delivered order")]
    CannotCancelDelivered,

    /// Delivered orders cannot have items canceled.
    #[error("Cannot modify a delivered order")]
    CannotModifyDeliveredOrder,

    /// No matching, still-active line item.
    #[error("Item not found in order: {product_id}")]
    ItemNotFound { product_id: ProductId },

    /// Every item of the original order is unavailable.
    #[error("Nothing to reorder: no item is currently in stock")]
    NothingToReorder { unavailable: Vec<ProductId> },
}

/// Accepted payment methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    PayPal,
    Stripe,
    CashOnDelivery,
}

impl PaymentMethod {
    /// Parses a payment method from its wire name.
    pub fn parse(s: &str) -> Result<Self, OrderError> {
        match s {
            "PayPal" => Ok(Self::PayPal),
            "Stripe" => Ok(Self::Stripe),
            "CashOnDelivery" => Ok(Self::CashOnDelivery),
            other => Err(OrderError::InvalidPaymentMethod {
                method: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PayPal => "PayPal",
            Self::Stripe => "Stripe",
            Self::CashOnDelivery => "CashOnDelivery",
        };
        write!(f, "{name}")
    }
}

/// Destination for the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub address: String,
    pub city: String,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl ShippingAddress {
    /// Address and city are the minimum required fields.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.address.trim().is_empty() || self.city.trim().is_empty() {
            return Err(OrderError::InvalidShippingAddress);
        }
        Ok(())
    }
}

/// One line of an order, with a product snapshot taken at order time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub name: String,
    #[serde(default)]
    pub image: String,
    /// Unit price at the time the order was placed.
    pub unit_price: Money,
    pub quantity: u32,
    pub is_canceled: bool,
}

impl LineItem {
    pub fn new(
        product_id: ProductId,
        name: impl Into<String>,
        image: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            product_id,
            name: name.into(),
            image: image.into(),
            unit_price,
            quantity,
            is_canceled: false,
        }
    }

    /// quantity * unit price.
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// Payment confirmation from the external provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub provider_id: String,
    pub status: String,
    pub update_time: String,
    pub payer_email: String,
}

/// One entry of the append-only status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: String,
    pub at: DateTime<Utc>,
    pub actor: UserId,
}

/// Where a timeline event comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineSource {
    /// Synthesized from a lifecycle timestamp.
    Milestone,
    /// Taken verbatim from the status history.
    History,
}

/// One event of the merged order timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub status: String,
    pub at: DateTime<Utc>,
    pub source: TimelineSource,
    pub actor: Option<UserId>,
}

/// Order document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user: UserId,
    pub items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub items_price: Money,
    pub shipping_price: Money,
    pub tax_price: Money,
    pub total_price: Money,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_result: Option<PaymentResult>,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub is_canceled: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    /// Free-text display label, independent of the lifecycle flags.
    pub custom_status: String,
    pub status_history: Vec<StatusEntry>,
    pub created_at: DateTime<Utc>,
    /// Document version for optimistic concurrency.
    #[serde(default)]
    pub version: u64,
}

impl Order {
    /// Assembles a new pending order. Items must already be priced; the
    /// caller is responsible for stock reservation.
    pub fn new(
        user: UserId,
        items: Vec<LineItem>,
        shipping_address: ShippingAddress,
        payment_method: PaymentMethod,
        shipping_price: Money,
        tax_price: Money,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::EmptyOrder);
        }
        if let Some(item) = items.iter().find(|i| i.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                quantity: item.quantity,
            });
        }
        shipping_address.validate()?;

        let items_price: Money = items.iter().map(LineItem::line_total).sum();

        Ok(Self {
            id: OrderId::new(),
            user,
            items,
            shipping_address,
            payment_method,
            items_price,
            shipping_price,
            tax_price,
            total_price: items_price + shipping_price + tax_price,
            is_paid: false,
            paid_at: None,
            payment_result: None,
            is_delivered: false,
            delivered_at: None,
            is_canceled: false,
            canceled_at: None,
            custom_status: "Pending".to_string(),
            status_history: Vec::new(),
            created_at: now,
            version: 0,
        })
    }

    /// Line items not individually canceled.
    pub fn active_items(&self) -> impl Iterator<Item = &LineItem> {
        self.items.iter().filter(|i| !i.is_canceled)
    }

    /// Records payment. Rejects a second payment so a retried provider
    /// webhook cannot be credited twice.
    pub fn mark_paid(
        &mut self,
        result: PaymentResult,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if self.is_paid {
            return Err(OrderError::AlreadyPaid);
        }

        self.is_paid = true;
        self.paid_at = Some(now);
        self.payment_result = Some(result);
        self.push_history("Paid", actor, now);
        Ok(())
    }

    /// Records delivery. Requires payment first.
    pub fn mark_delivered(&mut self, actor: UserId, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.is_paid {
            return Err(OrderError::CannotDeliverUnpaid);
        }
        if self.is_delivered {
            return Err(OrderError::AlreadyDelivered);
        }

        self.is_delivered = true;
        self.delivered_at = Some(now);
        self.push_history("Delivered", actor, now);
        Ok(())
    }

    /// Checks that a whole-order cancel is currently allowed.
    pub fn check_cancelable(&self) -> Result<(), OrderError> {
        if self.is_canceled {
            return Err(OrderError::AlreadyCanceled);
        }
        if self.is_delivered {
            return Err(OrderError::CannotCancelDelivered);
        }
        Ok(())
    }

    /// Marks the whole order canceled. Stock restoration is the caller's
    /// responsibility and must happen before this flag is committed.
    pub fn cancel(&mut self, actor: UserId, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.check_cancelable()?;

        self.is_canceled = true;
        self.canceled_at = Some(now);
        self.custom_status = "Canceled".to_string();
        self.push_history("Canceled", actor, now);
        Ok(())
    }

    /// Marks one line item canceled and recomputes the totals.
    pub fn cancel_item(
        &mut self,
        product_id: ProductId,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if self.is_delivered {
            return Err(OrderError::CannotModifyDeliveredOrder);
        }

        let item = self
            .items
            .iter_mut()
            .find(|i| i.product_id == product_id && !i.is_canceled)
            .ok_or(OrderError::ItemNotFound { product_id })?;

        item.is_canceled = true;
        let name = item.name.clone();
        self.recompute_totals();
        self.push_history(format!("Item canceled: {name}"), actor, now);
        Ok(())
    }

    /// Sets the free-text status label. Does not gate any flag transition.
    pub fn set_status(&mut self, status: impl Into<String>, actor: UserId, now: DateTime<Utc>) {
        let status = status.into();
        self.custom_status = status.clone();
        self.push_history(status, actor, now);
    }

    /// Recomputes items_price over active items and the derived total.
    pub fn recompute_totals(&mut self) {
        self.items_price = self.active_items().map(LineItem::line_total).sum();
        self.total_price = self.items_price + self.shipping_price + self.tax_price;
    }

    /// Merges the lifecycle milestones with the status history, ascending
    /// by timestamp.
    pub fn timeline(&self) -> Vec<TimelineEvent> {
        let mut events = vec![TimelineEvent {
            status: "Placed".to_string(),
            at: self.created_at,
            source: TimelineSource::Milestone,
            actor: Some(self.user),
        }];

        let milestones = [
            ("Paid", self.paid_at),
            ("Delivered", self.delivered_at),
            ("Canceled", self.canceled_at),
        ];
        for (status, at) in milestones {
            if let Some(at) = at {
                events.push(TimelineEvent {
                    status: status.to_string(),
                    at,
                    source: TimelineSource::Milestone,
                    actor: None,
                });
            }
        }

        events.extend(self.status_history.iter().map(|entry| TimelineEvent {
            status: entry.status.clone(),
            at: entry.at,
            source: TimelineSource::History,
            actor: Some(entry.actor),
        }));

        events.sort_by_key(|e| e.at);
        events
    }

    fn push_history(&mut self, status: impl Into<String>, actor: UserId, now: DateTime<Utc>) {
        self.status_history.push(StatusEntry {
            status: status.into(),
            at: now,
            actor,
        });
    }
}
