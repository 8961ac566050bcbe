//! Order lifecycle service.
//!
//! Orchestrates creation (validate, price, reserve stock, persist),
//! cancellation with stock restoration, item-level cancellation, payment
//! and delivery marking, reorder, and the status timeline. Stock
//! reservation leans on the store's conditional adjustment; order mutation
//! goes through version-guarded writes with bounded retry.

use std::sync::Arc;

use chrono::Utc;
use common::{Money, OrderId, Page, Paginated, ProductId, UserId};
use model::{Actor, LineItem, Order, OrderError, PaymentMethod, PaymentResult, ShippingAddress, TimelineEvent};
use store::{OrderFilter, Store, StoreError};

use crate::error::DomainError;
use crate::notify::Notifier;

/// Allowed disagreement between the client's claimed items price and the
/// server-side computation, in cents.
const PRICE_TOLERANCE_CENTS: i64 = 1;

/// Attempts for a version-guarded order write before giving up.
const MAX_WRITE_RETRIES: usize = 3;

/// One requested line of a new order. Prices are never taken from the
/// client; they come from the product documents.
#[derive(Debug, Clone)]
pub struct DraftItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Input for order creation.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub items: Vec<DraftItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    /// The items total the client computed, checked against the
    /// authoritative server-side pricing.
    pub claimed_items_price: Money,
    pub shipping_price: Money,
    pub tax_price: Money,
}

/// Result of a reorder: the new order plus the original items that had to
/// be left out for lack of stock.
#[derive(Debug, Clone)]
pub struct ReorderOutcome {
    pub order: Order,
    pub unavailable: Vec<ProductId>,
}

/// Service for the order lifecycle.
pub struct OrderService<S, N> {
    store: S,
    notifier: Arc<N>,
}

impl<S, N> Clone for OrderService<S, N>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<S, N> OrderService<S, N>
where
    S: Store,
    N: Notifier + 'static,
{
    /// Creates the service over a store and a notification collaborator.
    pub fn new(store: S, notifier: N) -> Self {
        Self {
            store,
            notifier: Arc::new(notifier),
        }
    }

    /// Creates an order for the actor: validates the draft, prices every
    /// line from the product's current effective price, verifies the
    /// claimed items total, reserves stock, and persists the order as
    /// "Pending".
    ///
    /// Stock reservation is all-or-nothing: the first conditional
    /// decrement that fails rolls back every decrement already applied.
    #[tracing::instrument(skip(self, draft), fields(user = %actor.id))]
    pub async fn create_order(
        &self,
        actor: Actor,
        draft: OrderDraft,
    ) -> Result<Order, DomainError> {
        if draft.items.is_empty() {
            return Err(OrderError::EmptyOrder.into());
        }
        if let Some(item) = draft.items.iter().find(|i| i.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                quantity: item.quantity,
            }
            .into());
        }
        if draft.shipping_price.cents() < 0 {
            return Err(OrderError::NegativeCharge {
                kind: "shipping",
                amount: draft.shipping_price,
            }
            .into());
        }
        if draft.tax_price.cents() < 0 {
            return Err(OrderError::NegativeCharge {
                kind: "tax",
                amount: draft.tax_price,
            }
            .into());
        }
        draft.shipping_address.validate()?;
        let payment_method = PaymentMethod::parse(&draft.payment_method)?;

        let now = Utc::now();

        // Authoritative pricing from the product documents.
        let mut lines = Vec::with_capacity(draft.items.len());
        for item in &draft.items {
            let product = self
                .store
                .get_product(item.product_id)
                .await?
                .ok_or(OrderError::ProductNotFound {
                    product_id: item.product_id,
                })?;
            let unit_price = product.effective_price(now);
            lines.push(LineItem::new(
                product.id,
                product.name,
                product.image,
                unit_price,
                item.quantity,
            ));
        }

        let computed: Money = lines.iter().map(LineItem::line_total).sum();
        if computed.abs_diff(draft.claimed_items_price) > PRICE_TOLERANCE_CENTS {
            return Err(OrderError::PriceMismatch {
                claimed: draft.claimed_items_price,
                computed,
            }
            .into());
        }

        self.reserve_stock(&lines).await?;

        let order = match Order::new(
            actor.id,
            lines.clone(),
            draft.shipping_address,
            payment_method,
            draft.shipping_price,
            draft.tax_price,
            now,
        ) {
            Ok(order) => order,
            Err(e) => {
                self.release_stock(&lines).await;
                return Err(e.into());
            }
        };

        if let Err(e) = self.store.insert_order(&order).await {
            self.release_stock(&lines).await;
            return Err(e.into());
        }

        metrics::counter!("orders_placed_total").increment(1);
        self.notify(
            order.user,
            "Order confirmation",
            format!("Your order {} was placed, total {}.", order.id, order.total_price),
        );

        Ok(order)
    }

    /// Cancels a whole order: restores stock for every still-active item,
    /// then commits the canceled flag. A lost race on the flag write is
    /// compensated so stock is never restored twice.
    #[tracing::instrument(skip(self), fields(actor = %actor.id))]
    pub async fn cancel_order(&self, actor: Actor, order_id: OrderId) -> Result<Order, DomainError> {
        let order = self.load_order(order_id).await?;
        if !actor.owns_or_admin(order.user) {
            return Err(DomainError::Forbidden("not the order owner"));
        }
        order.check_cancelable()?;

        let restored = self.restore_items(&order).await?;

        let result = self
            .commit_order(order, |o| o.cancel(actor.id, Utc::now()))
            .await;

        match result {
            Ok(stored) => {
                metrics::counter!("orders_canceled_total").increment(1);
                self.notify(
                    stored.user,
                    "Order canceled",
                    format!("Your order {} was canceled.", stored.id),
                );
                Ok(stored)
            }
            Err(e) => {
                // The flag never committed: take the restored stock back.
                self.reclaim_items(&restored).await;
                Err(e)
            }
        }
    }

    /// Cancels one line item: restores its stock, marks it canceled, and
    /// recomputes the order totals.
    #[tracing::instrument(skip(self), fields(actor = %actor.id))]
    pub async fn cancel_order_item(
        &self,
        actor: Actor,
        order_id: OrderId,
        product_id: ProductId,
    ) -> Result<Order, DomainError> {
        let order = self.load_order(order_id).await?;
        if !actor.owns_or_admin(order.user) {
            return Err(DomainError::Forbidden("not the order owner"));
        }
        if order.is_delivered {
            return Err(OrderError::CannotModifyDeliveredOrder.into());
        }
        let item = order
            .items
            .iter()
            .find(|i| i.product_id == product_id && !i.is_canceled)
            .ok_or(OrderError::ItemNotFound { product_id })?;
        let quantity = item.quantity;

        let restored = match self.store.adjust_stock(product_id, quantity as i64).await {
            Ok(_) => vec![(product_id, quantity)],
            Err(StoreError::NotFound { .. }) => {
                // Product deleted since the order was placed; there is no
                // counter left to restore.
                tracing::warn!(%product_id, "item cancel: product no longer exists");
                vec![]
            }
            Err(e) => return Err(e.into()),
        };

        let result = self
            .commit_order(order, |o| o.cancel_item(product_id, actor.id, Utc::now()))
            .await;

        match result {
            Ok(stored) => {
                metrics::counter!("order_items_canceled_total").increment(1);
                Ok(stored)
            }
            Err(e) => {
                self.reclaim_items(&restored).await;
                Err(e)
            }
        }
    }

    /// Records payment from the external provider. A second call fails
    /// with `AlreadyPaid` so retried webhooks are not credited twice.
    #[tracing::instrument(skip(self, result), fields(actor = %actor.id))]
    pub async fn mark_paid(
        &self,
        actor: Actor,
        order_id: OrderId,
        result: PaymentResult,
    ) -> Result<Order, DomainError> {
        let order = self.load_order(order_id).await?;
        if !actor.owns_or_admin(order.user) {
            return Err(DomainError::Forbidden("not the order owner"));
        }

        let stored = self
            .commit_order(order, |o| {
                o.mark_paid(result.clone(), actor.id, Utc::now())
            })
            .await?;

        self.notify(
            stored.user,
            "Payment received",
            format!("Payment for order {} was received.", stored.id),
        );
        Ok(stored)
    }

    /// Marks the order delivered. Admin only; requires payment first.
    #[tracing::instrument(skip(self), fields(actor = %actor.id))]
    pub async fn mark_delivered(
        &self,
        actor: Actor,
        order_id: OrderId,
    ) -> Result<Order, DomainError> {
        if !actor.is_admin {
            return Err(DomainError::Forbidden("admin only"));
        }
        let order = self.load_order(order_id).await?;

        let stored = self
            .commit_order(order, |o| o.mark_delivered(actor.id, Utc::now()))
            .await?;

        self.notify(
            stored.user,
            "Order delivered",
            format!("Your order {} was delivered.", stored.id),
        );
        Ok(stored)
    }

    /// Sets the free-text display status. Admin only; never gates the flag
    /// transitions.
    #[tracing::instrument(skip(self), fields(actor = %actor.id))]
    pub async fn set_status(
        &self,
        actor: Actor,
        order_id: OrderId,
        status: String,
    ) -> Result<Order, DomainError> {
        if !actor.is_admin {
            return Err(DomainError::Forbidden("admin only"));
        }
        let order = self.load_order(order_id).await?;

        self.commit_order(order, |o| {
            o.set_status(status.clone(), actor.id, Utc::now());
            Ok(())
        })
        .await
    }

    /// Places a new order repeating an earlier one. Items without
    /// sufficient stock are left out and reported back; prices are the
    /// products' current effective prices, not the historical snapshots.
    #[tracing::instrument(skip(self), fields(actor = %actor.id))]
    pub async fn reorder(
        &self,
        actor: Actor,
        order_id: OrderId,
    ) -> Result<ReorderOutcome, DomainError> {
        let original = self.load_order(order_id).await?;
        if actor.id != original.user {
            return Err(DomainError::Forbidden("not the order owner"));
        }

        let now = Utc::now();
        let mut items = Vec::new();
        let mut unavailable = Vec::new();
        let mut claimed = Money::zero();

        for item in original.active_items() {
            match self.store.get_product(item.product_id).await? {
                Some(product) if product.count_in_stock >= item.quantity => {
                    claimed += product.effective_price(now).times(item.quantity);
                    items.push(DraftItem {
                        product_id: item.product_id,
                        quantity: item.quantity,
                    });
                }
                _ => unavailable.push(item.product_id),
            }
        }

        if items.is_empty() {
            return Err(OrderError::NothingToReorder { unavailable }.into());
        }

        let draft = OrderDraft {
            items,
            shipping_address: original.shipping_address.clone(),
            payment_method: original.payment_method.to_string(),
            claimed_items_price: claimed,
            shipping_price: original.shipping_price,
            tax_price: original.tax_price,
        };

        let order = self.create_order(actor, draft).await?;
        Ok(ReorderOutcome { order, unavailable })
    }

    /// The merged status timeline. Read-only.
    #[tracing::instrument(skip(self), fields(actor = %actor.id))]
    pub async fn timeline(
        &self,
        actor: Actor,
        order_id: OrderId,
    ) -> Result<Vec<TimelineEvent>, DomainError> {
        let order = self.get_order(actor, order_id).await?;
        Ok(order.timeline())
    }

    /// Loads one order, owner or admin only.
    #[tracing::instrument(skip(self), fields(actor = %actor.id))]
    pub async fn get_order(&self, actor: Actor, order_id: OrderId) -> Result<Order, DomainError> {
        let order = self.load_order(order_id).await?;
        if !actor.owns_or_admin(order.user) {
            return Err(DomainError::Forbidden("not the order owner"));
        }
        Ok(order)
    }

    /// The actor's own orders, newest first.
    pub async fn my_orders(&self, actor: Actor, page: Page) -> Result<Paginated<Order>, DomainError> {
        Ok(self
            .store
            .list_orders(&OrderFilter::for_user(actor.id), page)
            .await?)
    }

    /// Admin listing across all users.
    pub async fn list_orders(
        &self,
        actor: Actor,
        filter: &OrderFilter,
        page: Page,
    ) -> Result<Paginated<Order>, DomainError> {
        if !actor.is_admin {
            return Err(DomainError::Forbidden("admin only"));
        }
        Ok(self.store.list_orders(filter, page).await?)
    }

    // -- internals --

    async fn load_order(&self, order_id: OrderId) -> Result<Order, DomainError> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))
    }

    /// Version-guarded read-check-write with bounded retry. The mutation
    /// closure re-runs against a fresh document after every lost race, so
    /// its guards decide again each time.
    async fn commit_order<F>(&self, mut order: Order, mutate: F) -> Result<Order, DomainError>
    where
        F: Fn(&mut Order) -> Result<(), OrderError>,
    {
        for _ in 0..MAX_WRITE_RETRIES {
            let mut candidate = order.clone();
            mutate(&mut candidate)?;

            match self.store.put_order(&candidate).await {
                Ok(stored) => return Ok(stored),
                Err(StoreError::VersionConflict { .. }) => {
                    order = self.load_order(order.id).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::VersionConflict {
            collection: "orders",
            id: order.id.to_string(),
        }
        .into())
    }

    /// Conditionally decrements stock for every line, rolling back all
    /// applied decrements when one fails.
    async fn reserve_stock(&self, lines: &[LineItem]) -> Result<(), DomainError> {
        let mut reserved: Vec<(ProductId, u32)> = Vec::with_capacity(lines.len());

        for line in lines {
            let result = self
                .store
                .adjust_stock(line.product_id, -(line.quantity as i64))
                .await;

            match result {
                Ok(_) => reserved.push((line.product_id, line.quantity)),
                Err(StoreError::StockConflict {
                    product_id,
                    requested,
                    available,
                }) => {
                    self.reclaim_rollback(&reserved).await;
                    return Err(OrderError::OutOfStock {
                        product_id,
                        requested,
                        available,
                    }
                    .into());
                }
                Err(StoreError::NotFound { .. }) => {
                    self.reclaim_rollback(&reserved).await;
                    return Err(OrderError::ProductNotFound {
                        product_id: line.product_id,
                    }
                    .into());
                }
                Err(e) => {
                    self.reclaim_rollback(&reserved).await;
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }

    /// Gives reserved stock back after a failure later in order creation.
    async fn release_stock(&self, lines: &[LineItem]) {
        let reserved: Vec<(ProductId, u32)> =
            lines.iter().map(|l| (l.product_id, l.quantity)).collect();
        self.reclaim_rollback(&reserved).await;
    }

    /// Increments stock for every active item of the order. Returns what
    /// was restored so a failed flag write can be compensated.
    async fn restore_items(&self, order: &Order) -> Result<Vec<(ProductId, u32)>, DomainError> {
        let mut restored: Vec<(ProductId, u32)> = Vec::new();

        for item in order.active_items() {
            match self
                .store
                .adjust_stock(item.product_id, item.quantity as i64)
                .await
            {
                Ok(_) => restored.push((item.product_id, item.quantity)),
                Err(StoreError::NotFound { .. }) => {
                    tracing::warn!(product_id = %item.product_id, "cancel: product no longer exists");
                }
                Err(e) => {
                    self.reclaim_items(&restored).await;
                    return Err(e.into());
                }
            }
        }

        Ok(restored)
    }

    /// Re-applies decrements after a cancel failed to commit.
    async fn reclaim_items(&self, restored: &[(ProductId, u32)]) {
        for (product_id, quantity) in restored {
            if let Err(e) = self.store.adjust_stock(*product_id, -(*quantity as i64)).await {
                tracing::error!(
                    %product_id,
                    quantity,
                    error = %e,
                    "stock compensation failed; counter needs reconciliation"
                );
            }
        }
    }

    /// Re-increments stock after a reservation aborted part-way.
    async fn reclaim_rollback(&self, reserved: &[(ProductId, u32)]) {
        for (product_id, quantity) in reserved {
            if let Err(e) = self.store.adjust_stock(*product_id, *quantity as i64).await {
                tracing::error!(
                    %product_id,
                    quantity,
                    error = %e,
                    "stock rollback failed; counter needs reconciliation"
                );
            }
        }
    }

    /// Fire-and-forget notification. Never blocks or fails the caller.
    fn notify(&self, user: UserId, subject: &'static str, body: String) {
        let store = self.store.clone();
        let notifier = self.notifier.clone();

        tokio::spawn(async move {
            let recipient = match store.get_user(user).await {
                Ok(Some(u)) => u.email,
                Ok(None) => {
                    tracing::warn!(%user, "notification skipped: unknown user");
                    return;
                }
                Err(e) => {
                    tracing::warn!(%user, error = %e, "notification skipped: user lookup failed");
                    return;
                }
            };

            if let Err(e) = notifier.send(&recipient, subject, &body).await {
                tracing::warn!(%recipient, error = %e, "notification delivery failed");
            }
        });
    }
}
