//! One synchronization handler per event kind.

use std::sync::Arc;

use crate::Stores;
use crate::handler::EventHandler;

mod inventory;
mod order;
mod product;

pub use inventory::InventoryChangedHandler;
pub use order::{OrderCreatedHandler, OrderStatusChangedHandler};
pub use product::{ProductCreatedHandler, ProductUpdatedHandler};

/// Builds a handler for every known event kind, sharing `stores`.
pub fn all(stores: &Stores) -> Vec<Arc<dyn EventHandler>> {
    vec![
        Arc::new(ProductCreatedHandler::new(stores.clone())),
        Arc::new(ProductUpdatedHandler::new(stores.clone())),
        Arc::new(InventoryChangedHandler::new(stores.clone())),
        Arc::new(OrderCreatedHandler::new(stores.clone())),
        Arc::new(OrderStatusChangedHandler::new(stores.clone())),
    ]
}
