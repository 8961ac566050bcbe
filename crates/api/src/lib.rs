//! HTTP API server for the storefront.
//!
//! Exposes the order lifecycle and product catalog over REST, with
//! structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use domain::{CatalogService, LogNotifier, OrderService};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub orders: OrderService<S, LogNotifier>,
    pub catalog: CatalogService<S>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/mine", get(routes::orders::mine::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/pay", put(routes::orders::pay::<S>))
        .route("/orders/{id}/deliver", put(routes::orders::deliver::<S>))
        .route("/orders/{id}/cancel", put(routes::orders::cancel::<S>))
        .route(
            "/orders/{order_id}/items/{product_id}/cancel",
            put(routes::orders::cancel_item::<S>),
        )
        .route("/orders/{id}/status", put(routes::orders::set_status::<S>))
        .route("/orders/{id}/reorder", post(routes::orders::reorder::<S>))
        .route("/orders/{id}/timeline", get(routes::orders::timeline::<S>))
        .route("/products", get(routes::products::list::<S>))
        .route("/products", post(routes::products::create::<S>))
        .route("/products/categories", get(routes::products::categories::<S>))
        .route("/products/brands", get(routes::products::brands::<S>))
        .route("/products/{id}", get(routes::products::get::<S>))
        .route("/products/{id}", put(routes::products::update::<S>))
        .route("/products/{id}", delete(routes::products::delete::<S>))
        .route("/products/{id}/stock", put(routes::products::set_stock::<S>))
        .route(
            "/products/{id}/reviews",
            post(routes::products::add_review::<S>),
        )
        .route(
            "/products/{id}/reviews/{user_id}",
            delete(routes::products::hide_review::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over a store, with the logging notifier.
pub fn create_default_state<S: Store>(store: S) -> Arc<AppState<S>> {
    Arc::new(AppState {
        orders: OrderService::new(store.clone(), LogNotifier::new()),
        catalog: CatalogService::new(store),
    })
}
