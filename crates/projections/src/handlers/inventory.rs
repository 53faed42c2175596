//! Inventory handler.

use async_trait::async_trait;
use domain::keys::{self, fields};
use domain::{CategoryId, EventKind, InventoryChanged};
use read_store::document::get_path;
use read_store::{FieldSet, Filter};

use crate::handler::SyncHandler;
use crate::{HandlerError, HandlerOutcome, Result, SoftStep, Stores};

/// Handles `InventoryChanged`.
///
/// Only the inventory field of an existing product is touched. The new
/// quantity is written through to the inventory cache entry. The cached
/// product and its category listing both embed the quantity, so both are
/// dropped.
#[derive(Clone)]
pub struct InventoryChangedHandler {
    stores: Stores,
}

impl InventoryChangedHandler {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }
}

#[async_trait]
impl SyncHandler for InventoryChangedHandler {
    const KIND: EventKind = EventKind::InventoryChanged;
    type Payload = InventoryChanged;

    #[tracing::instrument(
        skip(self, change),
        fields(product_id = %change.product_id, quantity = change.quantity)
    )]
    async fn apply(&self, change: InventoryChanged) -> Result<HandlerOutcome> {
        if change.product_id.is_blank() {
            return Err(HandlerError::MissingId {
                kind: Self::KIND,
                field: fields::PRODUCT_ID,
            });
        }

        let not_found = || HandlerError::NotFound {
            entity: "product",
            id: change.product_id.to_string(),
        };
        let filter = Filter::eq(fields::PRODUCT_ID, change.product_id.as_str());

        let current = self
            .stores
            .documents
            .find_one(keys::PRODUCTS, &filter)
            .await?
            .ok_or_else(not_found)?;
        let category = get_path(&current, fields::CATEGORY_ID)
            .and_then(|id| id.as_str())
            .filter(|id| !id.trim().is_empty())
            .map(CategoryId::new);

        let matched = self
            .stores
            .documents
            .update_fields(
                keys::PRODUCTS,
                &filter,
                &FieldSet::new().set(fields::CURRENT_INVENTORY, change.quantity),
            )
            .await?;
        if matched == 0 {
            return Err(not_found());
        }

        let inventory_key = [keys::inventory(&change.product_id)];
        let written = self
            .stores
            .cache
            .set(
                &inventory_key[0],
                change.quantity.to_string(),
                self.stores.cache_ttl,
            )
            .await;

        let mut stale = vec![keys::product(&change.product_id)];
        if let Some(category) = &category {
            stale.push(keys::category_products(category));
        }
        let invalidated = self.stores.cache.delete_many(&stale).await;

        tracing::info!("inventory updated");
        Ok(HandlerOutcome::Completed
            .soft(SoftStep::WriteThrough, &inventory_key, written)
            .soft(SoftStep::Invalidate, &stale, invalidated))
    }
}
