//! Product catalog entities.

use chrono::{DateTime, Utc};
use common::{CategoryId, ProductId};
use serde::{Deserialize, Serialize};

/// The parent of a product category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParentCategory {
    pub id: CategoryId,
    pub name: String,
}

/// The category a product belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub parent_category: ParentCategory,
}

/// A free-form product attribute such as color or size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A catalog product as stored in the read model.
///
/// Missing fields decode to their defaults so partially populated producer
/// payloads are still accepted; only the product id is required to be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Product {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: Category,
    pub current_inventory: i64,
    pub images: Vec<String>,
    pub attributes: Vec<Attribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_camel_case_payload() {
        let product: Product = serde_json::from_value(json!({
            "productId": "p1001",
            "sku": "SKU-1001",
            "name": "Gin T-Shirt",
            "price": 29.99,
            "category": {
                "id": "c100",
                "name": "Apparel",
                "parentCategory": { "id": "c000", "name": "Root" }
            },
            "currentInventory": 100,
            "attributes": [{ "name": "color", "value": "black" }]
        }))
        .unwrap();

        assert_eq!(product.product_id.as_str(), "p1001");
        assert_eq!(product.category.parent_category.name, "Root");
        assert_eq!(product.current_inventory, 100);
        assert_eq!(product.attributes, vec![Attribute::new("color", "black")]);
        assert!(product.images.is_empty());
        assert!(product.created.is_none());
    }

    #[test]
    fn serializes_with_external_field_names() {
        let product = Product {
            product_id: ProductId::new("p1"),
            current_inventory: 3,
            ..Default::default()
        };
        let value = serde_json::to_value(&product).unwrap();
        assert_eq!(value["productId"], "p1");
        assert_eq!(value["currentInventory"], 3);
        assert!(value.get("created").is_none());
    }
}
