//! Services for the storefront: the order lifecycle workflow and the
//! product catalog, written against the [`store::Store`] port.

mod cache;
mod catalog;
mod error;
mod notify;
mod orders;

pub use cache::TtlCache;
pub use catalog::{CatalogService, NewProduct, ProductUpdate};
pub use error::DomainError;
pub use notify::{InMemoryNotifier, LogNotifier, Notifier, NotifyError, SentMail};
pub use orders::{DraftItem, OrderDraft, OrderService, ReorderOutcome};
