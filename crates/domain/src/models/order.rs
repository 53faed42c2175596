//! Order entities.

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, ProductId};
use serde::{Deserialize, Serialize};

use super::customer::OrderHistoryEntry;

/// A single order line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub sku: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub total_price: f64,
}

/// Where an order ships to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShippingAddress {
    pub address_line1: String,
    pub address_line2: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

/// An order as stored in the read model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Order {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub customer_email: String,
    pub customer_name: String,
    pub status: String,
    pub total_amount: f64,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

impl Order {
    /// Builds the summary embedded in the owning customer's order history.
    pub fn history_entry(&self) -> OrderHistoryEntry {
        OrderHistoryEntry {
            order_id: self.order_id.clone(),
            order_number: self.order_number.clone(),
            date: self.created,
            total_amount: self.total_amount,
            status: self.status.clone(),
        }
    }
}
