//! Shared types used across the storefront crates.

mod ids;
mod money;
mod page;

pub use ids::{OrderId, ProductId, UserId};
pub use money::Money;
pub use page::{Page, Paginated};
