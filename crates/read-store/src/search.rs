//! Search index contract.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::{Filter, Result};

/// Per-index settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSettings {
    /// Dotted paths analyzed as free text. Empty means every string field.
    pub text_fields: Vec<String>,
}

impl IndexSettings {
    /// Creates settings with the given free-text fields.
    pub fn with_text_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            text_fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// A free-text query with exact-match filters and an offset window.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Free text; blank text matches every document.
    pub text: String,
    /// Exact-match conditions every hit must satisfy.
    pub filters: Filter,
    /// Number of ranked hits to skip.
    pub from: usize,
    /// Maximum number of hits to return.
    pub size: usize,
}

impl SearchQuery {
    /// Creates a query returning the first ten hits.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            filters: Filter::all(),
            from: 0,
            size: 10,
        }
    }

    /// Adds an exact-match filter.
    pub fn filter(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters = self.filters.and(path, value);
        self
    }

    /// Sets the offset window.
    pub fn window(mut self, from: usize, size: usize) -> Self {
        self.from = from;
        self.size = size;
        self
    }
}

/// A single ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    pub document: Value,
}

/// A window of ranked hits plus the total number of matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    pub total: usize,
    pub hits: Vec<SearchHit>,
}

/// A secondary, eventually-consistent full-text index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Creates `index` if it does not exist. Existing indexes are left as is.
    async fn create_index(&self, index: &str, settings: IndexSettings) -> Result<()>;

    /// Stores `document` under `id`, replacing any previous version.
    async fn index_document(&self, index: &str, id: &str, document: Value) -> Result<()>;

    /// Runs a ranked query.
    async fn search(&self, index: &str, query: &SearchQuery) -> Result<SearchResults>;
}
