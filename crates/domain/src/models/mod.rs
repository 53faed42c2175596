//! Read-model entities.
//!
//! Every entity carries a stable external identifier assigned by the
//! producing system. JSON field names are camelCase on the wire and in the
//! stores.

mod customer;
mod order;
mod product;

pub use customer::{Customer, CustomerAddress, OrderHistoryEntry};
pub use order::{Order, OrderItem, ShippingAddress};
pub use product::{Attribute, Category, ParentCategory, Product};
