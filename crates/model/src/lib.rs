//! Document model for the storefront: products, orders, and users.
//!
//! Types here carry the business rules that do not require storage access:
//! effective pricing, totals recomputation, and the order lifecycle guards.
//! Orchestration that touches the store lives in the `domain` crate.

mod order;
mod product;
mod user;

pub use order::{
    LineItem, Order, OrderError, PaymentMethod, PaymentResult, ShippingAddress, StatusEntry,
    TimelineEvent, TimelineSource,
};
pub use product::{Product, ProductError, Review};
pub use user::{Actor, User};
