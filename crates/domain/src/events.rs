//! Events the read model is kept in sync with.

use std::fmt;
use std::str::FromStr;

use common::{OrderId, ProductId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{Order, Product};

/// The closed set of event types the query service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    ProductCreated,
    ProductUpdated,
    InventoryChanged,
    OrderCreated,
    OrderStatusChanged,
}

impl EventKind {
    /// Every known event kind.
    pub const ALL: [EventKind; 5] = [
        EventKind::ProductCreated,
        EventKind::ProductUpdated,
        EventKind::InventoryChanged,
        EventKind::OrderCreated,
        EventKind::OrderStatusChanged,
    ];

    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ProductCreated => "ProductCreated",
            EventKind::ProductUpdated => "ProductUpdated",
            EventKind::InventoryChanged => "InventoryChanged",
            EventKind::OrderCreated => "OrderCreated",
            EventKind::OrderStatusChanged => "OrderStatusChanged",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event type name outside the known set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

/// The wire envelope every message body carries.
///
/// The payload stays untyped here; it is decoded by the handler registered
/// for the event's kind. `payload` is accepted as an alias for `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, alias = "payload")]
    pub data: Value,
}

impl EventEnvelope {
    /// Decodes a message body.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Resolves the event type against the known kinds.
    pub fn kind(&self) -> Result<EventKind, UnknownEventKind> {
        self.event_type.parse()
    }
}

/// Payload of an `InventoryChanged` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryChanged {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Payload of an `OrderStatusChanged` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub status: String,
}

/// A typed event, serialized in the wire envelope format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DomainEvent {
    ProductCreated(Product),
    ProductUpdated(Product),
    InventoryChanged(InventoryChanged),
    OrderCreated(Order),
    OrderStatusChanged(OrderStatusChanged),
}

impl DomainEvent {
    /// Returns the kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::ProductCreated(_) => EventKind::ProductCreated,
            DomainEvent::ProductUpdated(_) => EventKind::ProductUpdated,
            DomainEvent::InventoryChanged(_) => EventKind::InventoryChanged,
            DomainEvent::OrderCreated(_) => EventKind::OrderCreated,
            DomainEvent::OrderStatusChanged(_) => EventKind::OrderStatusChanged,
        }
    }

    /// Returns the identifier of the entity the event is about, used as the
    /// message key so one entity's events share a partition.
    pub fn entity_id(&self) -> &str {
        match self {
            DomainEvent::ProductCreated(product) | DomainEvent::ProductUpdated(product) => {
                product.product_id.as_str()
            }
            DomainEvent::InventoryChanged(change) => change.product_id.as_str(),
            DomainEvent::OrderCreated(order) => order.order_id.as_str(),
            DomainEvent::OrderStatusChanged(change) => change.order_id.as_str(),
        }
    }

    /// Serializes the event as a message body.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
