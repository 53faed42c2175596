//! The collaborators a handler writes to.

use std::sync::Arc;
use std::time::Duration;

use domain::keys::{self, fields};
use read_store::document::get_path;
use read_store::{Cache, DocumentStore, Filter, IndexSettings, SearchIndex};

/// Handles to the primary store, search index and cache.
///
/// Built once at startup and shared by the consumer and the read API.
#[derive(Clone)]
pub struct Stores {
    pub documents: Arc<dyn DocumentStore>,
    pub search: Arc<dyn SearchIndex>,
    pub cache: Arc<dyn Cache>,
    /// Lifetime of cache entries written by handlers and reads.
    pub cache_ttl: Duration,
}

impl Stores {
    /// Default lifetime of cache entries.
    pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

    /// Number of products read per page while rebuilding the search index.
    pub const REINDEX_BATCH: usize = 200;

    pub fn new(
        documents: Arc<dyn DocumentStore>,
        search: Arc<dyn SearchIndex>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        Self {
            documents,
            search,
            cache,
            cache_ttl: Self::DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Creates the product search index with its free-text fields.
    pub async fn prepare(&self) -> read_store::Result<()> {
        self.search
            .create_index(
                keys::PRODUCT_INDEX,
                IndexSettings::with_text_fields(keys::PRODUCT_TEXT_FIELDS),
            )
            .await
    }

    /// Indexes every product in the primary store, replacing what the index
    /// holds for them. Returns the number of products indexed.
    ///
    /// The primary store is authoritative, so a fresh index is rebuilt from
    /// it at startup instead of waiting for each product's next event.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_search_index(&self) -> read_store::Result<usize> {
        let mut indexed = 0;
        let mut skip = 0;
        loop {
            let page = self
                .documents
                .find_many(keys::PRODUCTS, &Filter::all(), skip, Self::REINDEX_BATCH)
                .await?;
            let fetched = page.len();

            for document in page {
                let Some(id) = get_path(&document, fields::PRODUCT_ID)
                    .and_then(|id| id.as_str())
                    .map(str::to_owned)
                else {
                    tracing::warn!("skipping stored product without an id");
                    continue;
                };
                self.search
                    .index_document(keys::PRODUCT_INDEX, &id, document)
                    .await?;
                indexed += 1;
            }

            if fetched < Self::REINDEX_BATCH {
                break;
            }
            skip += fetched;
        }

        tracing::info!(indexed, "search index rebuilt from primary store");
        Ok(indexed)
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores")
            .field("cache_ttl", &self.cache_ttl)
            .finish_non_exhaustive()
    }
}
