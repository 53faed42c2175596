//! Store names and deterministic cache keys.

use common::{CategoryId, CustomerId, OrderId, ProductId};

/// Primary-store collection holding products.
pub const PRODUCTS: &str = "products";
/// Primary-store collection holding orders.
pub const ORDERS: &str = "orders";
/// Primary-store collection holding customers.
pub const CUSTOMERS: &str = "customers";

/// Search index holding product documents.
pub const PRODUCT_INDEX: &str = "products";
/// Fields of a product document analyzed as free text.
pub const PRODUCT_TEXT_FIELDS: [&str; 3] = ["name", "description", "category.name"];

/// Secondary unique keys per collection, beyond the external id.
pub const UNIQUE_FIELDS: [(&str, &str); 3] = [
    (PRODUCTS, "sku"),
    (ORDERS, "orderNumber"),
    (CUSTOMERS, "email"),
];

/// Field names the handlers and read service address documents by.
pub mod fields {
    pub const PRODUCT_ID: &str = "productId";
    pub const CATEGORY_ID: &str = "category.id";
    pub const CURRENT_INVENTORY: &str = "currentInventory";
    pub const ORDER_ID: &str = "orderId";
    pub const CUSTOMER_ID: &str = "customerId";
    pub const STATUS: &str = "status";
    pub const UPDATED: &str = "updated";
    pub const ORDER_HISTORY: &str = "orderHistory";
}

pub fn product(id: &ProductId) -> String {
    format!("product:{id}")
}

pub fn category_products(id: &CategoryId) -> String {
    format!("products:category:{id}")
}

pub fn inventory(id: &ProductId) -> String {
    format!("inventory:{id}")
}

pub fn order(id: &OrderId) -> String {
    format!("order:{id}")
}

pub fn customer(id: &CustomerId) -> String {
    format!("customer:{id}")
}

pub fn customer_orders(id: &CustomerId) -> String {
    format!("customer:{id}:orders")
}
