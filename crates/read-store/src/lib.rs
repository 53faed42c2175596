//! Collaborator contracts for the query-side read model.
//!
//! The read model is kept in three independent stores plus a durable log:
//! - [`DocumentStore`]: the authoritative primary store, keyed by external id
//! - [`SearchIndex`]: a denormalized free-text index
//! - [`Cache`]: a best-effort key-value cache with TTLs
//! - [`LogReader`] / [`LogWriter`]: the partitioned log events arrive on
//!
//! In-memory implementations of every contract live in [`memory`] and a
//! PostgreSQL document store in [`postgres`]. Behind the `redis` feature,
//! `redis_cache` holds a Redis cache and `redis_log` a Redis Streams log.

pub mod cache;
pub mod document;
pub mod error;
pub mod log;
pub mod memory;
pub mod postgres;
#[cfg(feature = "redis")]
pub mod redis_cache;
#[cfg(feature = "redis")]
pub mod redis_log;
pub mod search;

pub use cache::Cache;
pub use document::{DocumentStore, DocumentStoreExt, FieldSet, Filter};
pub use error::{CacheError, LogError, Result, StoreError};
pub use log::{Acks, Header, LogReader, LogWriter, Message};
pub use memory::{
    InMemoryCache, InMemoryDocumentStore, InMemoryLog, InMemoryLogReader, InMemorySearchIndex,
};
pub use postgres::PostgresDocumentStore;
#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;
#[cfg(feature = "redis")]
pub use redis_log::{RedisStreamLog, RedisStreamReader};
pub use search::{IndexSettings, SearchHit, SearchIndex, SearchQuery, SearchResults};
