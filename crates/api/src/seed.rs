//! Sample catalog loaded at startup when `SEED_DATA` is set.

use chrono::{DateTime, Utc};
use domain::keys;
use domain::{
    Attribute, Category, CategoryId, Customer, CustomerAddress, CustomerId, Order, OrderId,
    OrderItem, ParentCategory, Product, ProductId, ShippingAddress,
};
use projections::Stores;
use read_store::DocumentStoreExt;

/// One product, one shipped order for it, and the customer who placed it.
pub struct SampleData {
    pub product: Product,
    pub order: Order,
    pub customer: Customer,
}

impl SampleData {
    pub fn new(now: DateTime<Utc>) -> Self {
        let product = Product {
            product_id: ProductId::new("p1001"),
            sku: "SKU-1001".to_string(),
            name: "Gin T-Shirt".to_string(),
            description: "High quality developer tee".to_string(),
            price: 29.99,
            category: Category {
                id: CategoryId::new("c100"),
                name: "Apparel".to_string(),
                parent_category: ParentCategory {
                    id: CategoryId::new("c000"),
                    name: "Root".to_string(),
                },
            },
            current_inventory: 100,
            images: vec!["https://example.com/image1.png".to_string()],
            attributes: vec![Attribute::new("color", "black"), Attribute::new("size", "L")],
            created: Some(now),
            updated: Some(now),
        };

        let order = Order {
            order_id: OrderId::new("o2001"),
            order_number: "ORD-20240401-001".to_string(),
            customer_id: CustomerId::new("c3001"),
            customer_email: "alice@example.com".to_string(),
            customer_name: "Alice Zhang".to_string(),
            status: "Shipped".to_string(),
            total_amount: 59.98,
            items: vec![OrderItem {
                product_id: product.product_id.clone(),
                product_name: product.name.clone(),
                sku: product.sku.clone(),
                quantity: 2,
                unit_price: 29.99,
                total_price: 59.98,
            }],
            shipping_address: ShippingAddress {
                address_line1: "123 Developer St.".to_string(),
                address_line2: "Unit 100".to_string(),
                city: "Vancouver".to_string(),
                state: "BC".to_string(),
                postal_code: "V6B 1A1".to_string(),
                country: "Canada".to_string(),
            },
            created: Some(now),
            updated: Some(now),
        };

        let customer = Customer {
            customer_id: order.customer_id.clone(),
            email: order.customer_email.clone(),
            first_name: "Alice".to_string(),
            last_name: "Zhang".to_string(),
            phone: "+1-604-555-1234".to_string(),
            addresses: vec![CustomerAddress {
                address_type: "home".to_string(),
                is_default: true,
                address_line1: order.shipping_address.address_line1.clone(),
                address_line2: order.shipping_address.address_line2.clone(),
                city: order.shipping_address.city.clone(),
                state: order.shipping_address.state.clone(),
                postal_code: order.shipping_address.postal_code.clone(),
                country: order.shipping_address.country.clone(),
            }],
            order_history: vec![order.history_entry()],
            created: Some(now),
            updated: Some(now),
        };

        Self {
            product,
            order,
            customer,
        }
    }

    /// Writes the sample entities to the primary store and indexes the
    /// product. Safe to run on every start.
    #[tracing::instrument(skip_all)]
    pub async fn load(&self, stores: &Stores) -> read_store::Result<()> {
        let product_id = self.product.product_id.as_str();
        stores
            .documents
            .upsert_entity(keys::PRODUCTS, product_id, &self.product)
            .await?;
        stores
            .search
            .index_document(keys::PRODUCT_INDEX, product_id, serde_json::to_value(&self.product)?)
            .await?;
        stores
            .documents
            .upsert_entity(keys::ORDERS, self.order.order_id.as_str(), &self.order)
            .await?;
        stores
            .documents
            .upsert_entity(keys::CUSTOMERS, self.customer.customer_id.as_str(), &self.customer)
            .await?;

        tracing::info!(
            product_id,
            order_id = %self.order.order_id,
            customer_id = %self.customer.customer_id,
            "sample data loaded"
        );
        Ok(())
    }
}
