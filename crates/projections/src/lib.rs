//! Synchronization handlers for the query-side read model.
//!
//! Each event kind has one handler that runs an ordered write protocol
//! across the collaborators in [`Stores`]:
//! 1. primary document store (hard step)
//! 2. search index (hard step)
//! 3. cache invalidation or write-through (soft step)
//!
//! Hard-step failures are returned as [`HandlerError`]s for the consumer to
//! retry. Soft-step failures never fail the event; they are reported in a
//! [`HandlerOutcome::Degraded`].

pub mod error;
pub mod handler;
pub mod handlers;
pub mod outcome;
pub mod stores;

pub use error::{HandlerError, Result};
pub use handler::{EventHandler, SyncHandler};
pub use handlers::{
    InventoryChangedHandler, OrderCreatedHandler, OrderStatusChangedHandler,
    ProductCreatedHandler, ProductUpdatedHandler,
};
pub use outcome::{HandlerOutcome, SoftFailure, SoftStep};
pub use stores::Stores;
