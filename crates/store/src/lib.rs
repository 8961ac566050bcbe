//! Document store port and adapters.
//!
//! The [`Store`] trait is the storage contract the services are written
//! against: three document collections (products, orders, users) with
//! version-conditioned writes for read-check-write sequences and one atomic
//! conditional primitive, [`Store::adjust_stock`], which is what serializes
//! concurrent stock movements and prevents overselling.

mod error;
mod memory;
mod postgres;
mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{OrderFilter, ProductFilter, Store};
