//! Query service: cache-aside read API plus the event consumer that keeps
//! the read model in sync.
//!
//! Provides read endpoints under `/api/queries`, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod queries;
pub mod routes;
pub mod seed;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use consumer::{Consumer, ConsumerHandle, HandlerRegistry};
use domain::keys;
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{Stores, handlers};
use read_store::{
    Cache, DocumentStore, InMemoryCache, InMemoryDocumentStore, InMemoryLog, InMemorySearchIndex,
    LogReader, LogWriter, PostgresDocumentStore,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use error::BootstrapError;
use queries::ReadService;
use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let queries = Router::new()
        .route("/products/search", get(routes::products::search))
        .route("/products/category/{id}", get(routes::products::by_category))
        .route("/products/{id}", get(routes::products::get))
        .route("/inventory/{id}", get(routes::inventory::get))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/customers/{id}", get(routes::customers::get))
        .route("/customers/{id}/orders", get(routes::customers::orders));

    Router::new()
        .route("/health", get(routes::health::check))
        .nest("/api/queries", queries)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over `stores`.
pub fn create_state(stores: Stores, config: &Config) -> Arc<AppState> {
    let reads = ReadService::new(stores)
        .with_read_timeout(config.read_timeout)
        .with_collection_cache_limit(config.collection_cache_limit);
    Arc::new(AppState { reads })
}

/// Creates an in-memory primary store with the read model's unique keys.
pub fn in_memory_documents() -> InMemoryDocumentStore {
    keys::UNIQUE_FIELDS
        .into_iter()
        .fold(InMemoryDocumentStore::new(), |store, (collection, field)| {
            store.with_unique_field(collection, field)
        })
}

/// Connects the primary store and cache named by `config`, falling back to
/// in-memory implementations, then opens [`Stores`] over them.
pub async fn connect_stores(config: &Config) -> Result<Stores, BootstrapError> {
    let documents: Arc<dyn DocumentStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            let store = PostgresDocumentStore::new(pool);
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL document store");
            Arc::new(store)
        }
        None => {
            tracing::info!("DATABASE_URL not set; using in-memory document store");
            Arc::new(in_memory_documents())
        }
    };

    let cache: Arc<dyn Cache> = match &config.redis_url {
        #[cfg(feature = "redis")]
        Some(url) => {
            tracing::info!("using Redis cache");
            Arc::new(read_store::RedisCache::connect(url).await?)
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            tracing::warn!(
                "REDIS_URL is set but the redis feature is disabled; using in-memory cache"
            );
            Arc::new(InMemoryCache::new())
        }
        None => Arc::new(InMemoryCache::new()),
    };

    open_stores(documents, cache, config).await
}

/// Opens [`Stores`] over an existing primary store and cache.
///
/// The search index lives in memory, so it is created empty and rebuilt
/// from the products already in the primary store.
pub async fn open_stores(
    documents: Arc<dyn DocumentStore>,
    cache: Arc<dyn Cache>,
    config: &Config,
) -> Result<Stores, BootstrapError> {
    let stores = Stores::new(documents, Arc::new(InMemorySearchIndex::new()), cache)
        .with_cache_ttl(config.cache_ttl);
    stores.prepare().await?;
    stores.rebuild_search_index().await?;
    Ok(stores)
}

/// The reader the consumer pulls from and the writer its dead letters go to.
pub struct EventLog {
    pub reader: Arc<dyn LogReader>,
    pub writer: Arc<dyn LogWriter>,
}

impl EventLog {
    /// Opens a reader on `log` for the configured topic and group.
    pub async fn in_memory(log: &InMemoryLog, config: &Config) -> Self {
        let reader = log.reader(&config.events_topic, &config.consumer_group).await;
        Self {
            reader: Arc::new(reader),
            writer: Arc::new(log.clone()),
        }
    }
}

/// How long an all-replica dead-letter publish waits for replicas.
#[cfg(feature = "redis")]
const REPLICA_ACK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Connects the event log named by `config`.
///
/// Without `EVENT_LOG_URL` the consumer reads an in-process log that only
/// this process can publish to.
pub async fn connect_log(config: &Config) -> Result<EventLog, BootstrapError> {
    match &config.event_log_url {
        #[cfg(feature = "redis")]
        Some(url) => {
            let log = read_store::RedisStreamLog::connect(url)
                .await?
                .with_min_replicas(config.event_log_min_replicas, REPLICA_ACK_TIMEOUT);
            let reader = log
                .reader(
                    &config.events_topic,
                    &config.consumer_group,
                    &config.consumer_name,
                )
                .await?;
            tracing::info!(
                topic = %config.events_topic,
                group = %config.consumer_group,
                consumer = %config.consumer_name,
                "using Redis Streams event log"
            );
            Ok(EventLog {
                reader: Arc::new(reader),
                writer: Arc::new(log),
            })
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            tracing::warn!(
                "EVENT_LOG_URL is set but the redis feature is disabled; using in-process log"
            );
            Ok(EventLog::in_memory(&InMemoryLog::new(), config).await)
        }
        None => {
            tracing::warn!("EVENT_LOG_URL not set; using in-process log");
            Ok(EventLog::in_memory(&InMemoryLog::new(), config).await)
        }
    }
}

/// Starts a consumer on `log` with a handler for every event kind.
pub fn start_consumer(
    config: &Config,
    stores: &Stores,
    log: EventLog,
) -> Result<ConsumerHandle, BootstrapError> {
    let consumer_config = config.consumer_config()?;
    let registry = HandlerRegistry::with_handlers(handlers::all(stores));

    let consumer = Consumer::new(log.reader, log.writer, registry, consumer_config);
    Ok(consumer.start())
}
