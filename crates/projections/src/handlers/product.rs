//! Product catalog handlers.

use async_trait::async_trait;
use domain::keys::{self, fields};
use domain::{EventKind, Product};
use read_store::{DocumentStoreExt, Filter, StoreError};

use crate::handler::SyncHandler;
use crate::{HandlerError, HandlerOutcome, Result, SoftStep, Stores};

/// Writes the product to the primary store and the search index.
///
/// Both writes replace the whole document keyed by the product id.
async fn write_product(stores: &Stores, product: &Product) -> Result<()> {
    let id = product.product_id.as_str();
    let document = serde_json::to_value(product).map_err(StoreError::from)?;
    stores
        .documents
        .upsert(keys::PRODUCTS, id, document.clone())
        .await?;
    stores
        .search
        .index_document(keys::PRODUCT_INDEX, id, document)
        .await?;
    Ok(())
}

fn require_product_id(kind: EventKind, product: &Product) -> Result<()> {
    if product.product_id.is_blank() {
        return Err(HandlerError::MissingId {
            kind,
            field: fields::PRODUCT_ID,
        });
    }
    Ok(())
}

/// Handles `ProductCreated`.
#[derive(Clone)]
pub struct ProductCreatedHandler {
    stores: Stores,
}

impl ProductCreatedHandler {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }
}

#[async_trait]
impl SyncHandler for ProductCreatedHandler {
    const KIND: EventKind = EventKind::ProductCreated;
    type Payload = Product;

    #[tracing::instrument(skip(self, product), fields(product_id = %product.product_id))]
    async fn apply(&self, product: Product) -> Result<HandlerOutcome> {
        require_product_id(Self::KIND, &product)?;
        write_product(&self.stores, &product).await?;

        let stale = [keys::category_products(&product.category.id)];
        let result = self.stores.cache.delete(&stale[0]).await;

        tracing::info!(name = %product.name, "product created");
        Ok(HandlerOutcome::Completed.soft(SoftStep::Invalidate, &stale, result))
    }
}

/// Handles `ProductUpdated`.
///
/// The stored product is read first so that moving a product between
/// categories invalidates the listing it left as well as the one it joined.
#[derive(Clone)]
pub struct ProductUpdatedHandler {
    stores: Stores,
}

impl ProductUpdatedHandler {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }
}

#[async_trait]
impl SyncHandler for ProductUpdatedHandler {
    const KIND: EventKind = EventKind::ProductUpdated;
    type Payload = Product;

    #[tracing::instrument(skip(self, product), fields(product_id = %product.product_id))]
    async fn apply(&self, product: Product) -> Result<HandlerOutcome> {
        require_product_id(Self::KIND, &product)?;

        let previous: Option<Product> = self
            .stores
            .documents
            .find_entity(
                keys::PRODUCTS,
                &Filter::eq(fields::PRODUCT_ID, product.product_id.as_str()),
            )
            .await?;

        write_product(&self.stores, &product).await?;

        let mut stale = vec![
            keys::product(&product.product_id),
            keys::inventory(&product.product_id),
            keys::category_products(&product.category.id),
        ];
        if let Some(previous) = previous
            && previous.category.id != product.category.id
        {
            stale.push(keys::category_products(&previous.category.id));
        }
        let result = self.stores.cache.delete_many(&stale).await;

        tracing::info!(name = %product.name, "product updated");
        Ok(HandlerOutcome::Completed.soft(SoftStep::Invalidate, &stale, result))
    }
}
