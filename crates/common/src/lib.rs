//! Shared types for the query-side read model.

pub mod ids;

pub use ids::{CategoryId, CustomerId, OrderId, ProductId};
