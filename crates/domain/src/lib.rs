//! Domain layer for the query service.
//!
//! This crate provides the vocabulary shared by the consumer and the read API:
//! - Entity models (products, orders, customers) as stored in the read model
//! - The closed set of [`EventKind`]s and their typed payloads
//! - Collection, index and cache key naming in [`keys`]

pub mod events;
pub mod keys;
pub mod models;

pub use common::{CategoryId, CustomerId, OrderId, ProductId};
pub use events::{
    DomainEvent, EventEnvelope, EventKind, InventoryChanged, OrderStatusChanged, UnknownEventKind,
};
pub use models::{
    Attribute, Category, Customer, CustomerAddress, Order, OrderHistoryEntry, OrderItem,
    ParentCategory, Product, ShippingAddress,
};
