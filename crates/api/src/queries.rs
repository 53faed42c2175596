//! Cache-aside read service.
//!
//! Entity and collection reads check the cache first, fall back to the
//! primary store and write what they found back to the cache. Search always
//! goes to the search index. Cache failures are treated as misses.

use std::future::Future;
use std::time::Duration;

use domain::keys::{self, fields};
use domain::{CategoryId, Customer, CustomerId, Order, OrderId, Product, ProductId};
use projections::Stores;
use read_store::{DocumentStoreExt, Filter, SearchQuery, SearchResults, StoreError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Errors surfaced by the read path. Cache problems never appear here.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The requested entity does not exist in the primary store.
    #[error("{entity} not found")]
    NotFound { entity: &'static str, id: String },

    /// Pagination parameters out of range.
    #[error("Invalid pagination: {0}")]
    InvalidPage(String),

    /// The primary store or search index failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A value could not be serialized for the cache.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The read did not finish within its time budget.
    #[error("Read timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, ReadError>;

/// Where a response was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Cache,
    Database,
    SearchIndex,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Cache => "cache",
            Source::Database => "database",
            Source::SearchIndex => "search_index",
        }
    }
}

/// A value tagged with the store that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sourced<T> {
    pub source: Source,
    pub data: T,
}

impl<T> Sourced<T> {
    fn served(source: Source, data: T) -> Self {
        metrics::counter!("read_requests_total", "source" => source.as_str()).increment(1);
        Self { source, data }
    }
}

/// A 1-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    page: u32,
    size: u32,
}

impl Page {
    pub const DEFAULT_SIZE: u32 = 10;

    /// Creates a page window. `page` starts at 1; `size` is at most
    /// [`MAX_PAGE_SIZE`].
    pub fn new(page: u32, size: u32) -> Result<Self> {
        if page == 0 {
            return Err(ReadError::InvalidPage("page must be at least 1".to_string()));
        }
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(ReadError::InvalidPage(format!(
                "size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(Self { page, size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Number of items before this page.
    pub fn offset(&self) -> usize {
        (self.page as usize - 1).saturating_mul(self.size as usize)
    }

    fn limit(&self) -> usize {
        self.size as usize
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            size: Self::DEFAULT_SIZE,
        }
    }
}

/// Serves queries over the read model.
#[derive(Clone, Debug)]
pub struct ReadService {
    stores: Stores,
    read_timeout: Duration,
    collection_cache_limit: usize,
}

impl ReadService {
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_COLLECTION_CACHE_LIMIT: usize = 500;

    pub fn new(stores: Stores) -> Self {
        Self {
            stores,
            read_timeout: Self::DEFAULT_READ_TIMEOUT,
            collection_cache_limit: Self::DEFAULT_COLLECTION_CACHE_LIMIT,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Collections larger than `limit` are read page by page and never cached.
    pub fn with_collection_cache_limit(mut self, limit: usize) -> Self {
        self.collection_cache_limit = limit;
        self
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    #[tracing::instrument(skip(self), fields(product_id = %id))]
    pub async fn product(&self, id: &ProductId) -> Result<Sourced<Product>> {
        self.bounded(self.entity(
            keys::product(id),
            keys::PRODUCTS,
            fields::PRODUCT_ID,
            id.as_str(),
            "Product",
        ))
        .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %id))]
    pub async fn order(&self, id: &OrderId) -> Result<Sourced<Order>> {
        self.bounded(self.entity(
            keys::order(id),
            keys::ORDERS,
            fields::ORDER_ID,
            id.as_str(),
            "Order",
        ))
        .await
    }

    #[tracing::instrument(skip(self), fields(customer_id = %id))]
    pub async fn customer(&self, id: &CustomerId) -> Result<Sourced<Customer>> {
        self.bounded(self.entity(
            keys::customer(id),
            keys::CUSTOMERS,
            fields::CUSTOMER_ID,
            id.as_str(),
            "Customer",
        ))
        .await
    }

    /// Reads a product's stock level, cached as a bare integer.
    #[tracing::instrument(skip(self), fields(product_id = %id))]
    pub async fn inventory(&self, id: &ProductId) -> Result<Sourced<i64>> {
        self.bounded(async {
            let key = keys::inventory(id);
            if let Some(cached) = self.cache_get(&key).await {
                match cached.trim().parse::<i64>() {
                    Ok(quantity) => return Ok(Sourced::served(Source::Cache, quantity)),
                    Err(_) => tracing::warn!(key = %key, "ignoring malformed cached inventory"),
                }
            }

            let product: Product = self
                .stores
                .documents
                .find_entity(keys::PRODUCTS, &Filter::eq(fields::PRODUCT_ID, id.as_str()))
                .await?
                .ok_or_else(|| ReadError::NotFound {
                    entity: "Product",
                    id: id.to_string(),
                })?;

            self.cache_set(&key, product.current_inventory.to_string())
                .await;
            Ok(Sourced::served(Source::Database, product.current_inventory))
        })
        .await
    }

    /// Lists the products in a category, ordered by product id.
    #[tracing::instrument(skip(self), fields(category_id = %id))]
    pub async fn products_by_category(
        &self,
        id: &CategoryId,
        page: Page,
    ) -> Result<Sourced<Vec<Product>>> {
        self.bounded(self.collection(
            keys::category_products(id),
            keys::PRODUCTS,
            Filter::eq(fields::CATEGORY_ID, id.as_str()),
            page,
        ))
        .await
    }

    /// Lists a customer's orders, ordered by order id.
    #[tracing::instrument(skip(self), fields(customer_id = %id))]
    pub async fn customer_orders(
        &self,
        id: &CustomerId,
        page: Page,
    ) -> Result<Sourced<Vec<Order>>> {
        self.bounded(self.collection(
            keys::customer_orders(id),
            keys::ORDERS,
            Filter::eq(fields::CUSTOMER_ID, id.as_str()),
            page,
        ))
        .await
    }

    /// Free-text product search, optionally restricted to one category.
    #[tracing::instrument(skip(self))]
    pub async fn search_products(
        &self,
        text: &str,
        category: Option<&CategoryId>,
        page: Page,
    ) -> Result<Sourced<SearchResults>> {
        let mut query = SearchQuery::new(text).window(page.offset(), page.limit());
        if let Some(category) = category {
            query = query.filter(fields::CATEGORY_ID, category.as_str());
        }

        self.bounded(async {
            let results = self.stores.search.search(keys::PRODUCT_INDEX, &query).await?;
            Ok(Sourced::served(Source::SearchIndex, results))
        })
        .await
    }

    async fn entity<T>(
        &self,
        key: String,
        collection: &str,
        id_field: &str,
        id: &str,
        entity: &'static str,
    ) -> Result<Sourced<T>>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        if let Some(cached) = self.cached::<T>(&key).await {
            return Ok(Sourced::served(Source::Cache, cached));
        }

        let found: T = self
            .stores
            .documents
            .find_entity(collection, &Filter::eq(id_field, id))
            .await?
            .ok_or_else(|| ReadError::NotFound {
                entity,
                id: id.to_string(),
            })?;

        self.cache_set(&key, serde_json::to_string(&found)?).await;
        Ok(Sourced::served(Source::Database, found))
    }

    /// Serves one page of a relationship collection.
    ///
    /// The whole collection is cached under the relationship key and paged
    /// in memory, so every page reads the same snapshot. Collections over the
    /// cache limit are paged in the store and not cached.
    async fn collection<T>(
        &self,
        key: String,
        collection: &str,
        filter: Filter,
        page: Page,
    ) -> Result<Sourced<Vec<T>>>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        if let Some(all) = self.cached::<Vec<T>>(&key).await {
            return Ok(Sourced::served(Source::Cache, window(all, page)));
        }

        let limit = self.collection_cache_limit;
        let all: Vec<T> = self
            .stores
            .documents
            .find_entities(collection, &filter, 0, limit.saturating_add(1))
            .await?;

        if all.len() > limit {
            tracing::debug!(key = %key, limit, "collection too large to cache");
            let items = self
                .stores
                .documents
                .find_entities(collection, &filter, page.offset(), page.limit())
                .await?;
            return Ok(Sourced::served(Source::Database, items));
        }

        self.cache_set(&key, serde_json::to_string(&all)?).await;
        Ok(Sourced::served(Source::Database, window(all, page)))
    }

    async fn bounded<T>(&self, read: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.read_timeout, read)
            .await
            .map_err(|_| ReadError::Timeout(self.read_timeout))?
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.cache_get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(key, error = %err, "ignoring undecodable cache entry");
                None
            }
        }
    }

    async fn cache_get(&self, key: &str) -> Option<String> {
        match self.stores.cache.get(key).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(key, error = %err, "cache read failed; treating as miss");
                None
            }
        }
    }

    async fn cache_set(&self, key: &str, value: String) {
        if let Err(err) = self.stores.cache.set(key, value, self.stores.cache_ttl).await {
            tracing::warn!(key, error = %err, "cache write failed");
        }
    }
}

fn window<T>(items: Vec<T>, page: Page) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset())
        .take(page.limit())
        .collect()
}
