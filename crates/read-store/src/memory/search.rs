use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::search::{IndexSettings, SearchHit, SearchIndex, SearchQuery, SearchResults};
use crate::{Result, StoreError};

struct IndexState {
    settings: IndexSettings,
    documents: BTreeMap<String, Value>,
}

impl IndexState {
    fn new(settings: IndexSettings) -> Self {
        Self {
            settings,
            documents: BTreeMap::new(),
        }
    }
}

/// In-memory full-text index.
///
/// Text is lowercased and split on non-alphanumeric characters. A document's
/// score is the number of query-term occurrences across its text fields.
/// Indexing into an unknown index creates it with default settings.
#[derive(Clone, Default)]
pub struct InMemorySearchIndex {
    indexes: Arc<RwLock<HashMap<String, IndexState>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemorySearchIndex {
    /// Creates an index service with no indexes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the stored document, bypassing ranking.
    pub async fn get(&self, index: &str, id: &str) -> Option<Value> {
        self.indexes
            .read()
            .await
            .get(index)
            .and_then(|state| state.documents.get(id))
            .cloned()
    }

    /// Returns the number of documents in `index`.
    pub async fn count(&self, index: &str) -> usize {
        self.indexes
            .read()
            .await
            .get(index)
            .map_or(0, |state| state.documents.len())
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory search index is offline".to_string(),
            ));
        }
        Ok(())
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

fn collect_strings<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a str>) {
    match (value, segments.split_first()) {
        (Value::Array(items), _) => {
            for item in items {
                collect_strings(item, segments, out);
            }
        }
        (_, Some((head, rest))) => {
            if let Some(child) = value.get(*head) {
                collect_strings(child, rest, out);
            }
        }
        (Value::String(s), None) => out.push(s),
        (Value::Object(map), None) => {
            for child in map.values() {
                collect_strings(child, &[], out);
            }
        }
        _ => {}
    }
}

fn text_of<'a>(settings: &IndexSettings, document: &'a Value) -> Vec<&'a str> {
    let mut out = Vec::new();
    if settings.text_fields.is_empty() {
        collect_strings(document, &[], &mut out);
    } else {
        for field in &settings.text_fields {
            let segments: Vec<&str> = field.split('.').collect();
            collect_strings(document, &segments, &mut out);
        }
    }
    out
}

fn score(settings: &IndexSettings, document: &Value, terms: &[String]) -> f64 {
    if terms.is_empty() {
        return 1.0;
    }
    let occurrences = text_of(settings, document)
        .into_iter()
        .flat_map(tokenize)
        .filter(|token| terms.contains(token))
        .count();
    occurrences as f64
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn create_index(&self, index: &str, settings: IndexSettings) -> Result<()> {
        self.check_available()?;
        self.indexes
            .write()
            .await
            .entry(index.to_string())
            .or_insert_with(|| IndexState::new(settings));
        Ok(())
    }

    async fn index_document(&self, index: &str, id: &str, document: Value) -> Result<()> {
        self.check_available()?;
        self.indexes
            .write()
            .await
            .entry(index.to_string())
            .or_insert_with(|| IndexState::new(IndexSettings::default()))
            .documents
            .insert(id.to_string(), document);
        Ok(())
    }

    async fn search(&self, index: &str, query: &SearchQuery) -> Result<SearchResults> {
        self.check_available()?;
        let indexes = self.indexes.read().await;
        let Some(state) = indexes.get(index) else {
            return Ok(SearchResults::default());
        };

        let terms: Vec<String> = tokenize(&query.text).collect();
        let mut hits: Vec<SearchHit> = state
            .documents
            .iter()
            .filter(|(_, doc)| query.filters.matches(doc))
            .map(|(id, doc)| SearchHit {
                id: id.clone(),
                score: score(&state.settings, doc, &terms),
                document: doc.clone(),
            })
            .filter(|hit| hit.score > 0.0)
            .collect();

        // Highest score first; ties in id order so windows are stable.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));

        let total = hits.len();
        let hits = hits.into_iter().skip(query.from).take(query.size).collect();
        Ok(SearchResults { total, hits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn catalog() -> InMemorySearchIndex {
        let index = InMemorySearchIndex::new();
        index
            .create_index(
                "products",
                IndexSettings::with_text_fields(["name", "description", "category.name"]),
            )
            .await
            .unwrap();
        for (id, name, description, category) in [
            ("p1", "Gin T-Shirt", "High quality developer tee", ("c100", "Apparel")),
            ("p2", "Rust Hoodie", "Warm hoodie for developers", ("c100", "Apparel")),
            ("p3", "Developer Mug", "Mug for coffee, tea or developer tears", ("c200", "Kitchen")),
        ] {
            index
                .index_document(
                    "products",
                    id,
                    json!({
                        "productId": id,
                        "name": name,
                        "description": description,
                        "sku": format!("SKU-{id}"),
                        "category": { "id": category.0, "name": category.1 }
                    }),
                )
                .await
                .unwrap();
        }
        index
    }

    #[tokio::test]
    async fn ranks_by_term_occurrences() {
        let index = catalog().await;
        let results = index
            .search("products", &SearchQuery::new("developer mug"))
            .await
            .unwrap();

        assert_eq!(results.total, 2);
        assert_eq!(results.hits[0].id, "p3");
        assert_eq!(results.hits[1].id, "p1");
    }

    #[tokio::test]
    async fn matching_is_case_insensitive_and_ignores_unindexed_fields() {
        let index = catalog().await;
        let results = index.search("products", &SearchQuery::new("APPAREL")).await.unwrap();
        assert_eq!(results.total, 2);

        // sku is not a text field
        let results = index.search("products", &SearchQuery::new("SKU")).await.unwrap();
        assert_eq!(results.total, 0);
    }

    #[tokio::test]
    async fn filters_are_exact_matches() {
        let index = catalog().await;
        let query = SearchQuery::new("developer").filter("category.id", "c200");
        let results = index.search("products", &query).await.unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(results.hits[0].id, "p3");
    }

    #[tokio::test]
    async fn blank_query_matches_everything_within_window() {
        let index = catalog().await;
        let results = index
            .search("products", &SearchQuery::new("  ").window(1, 1))
            .await
            .unwrap();
        assert_eq!(results.total, 3);
        assert_eq!(results.hits.len(), 1);
        assert_eq!(results.hits[0].id, "p2");
    }

    #[tokio::test]
    async fn reindexing_replaces_document() {
        let index = catalog().await;
        index
            .index_document("products", "p1", json!({ "productId": "p1", "name": "Renamed" }))
            .await
            .unwrap();
        assert_eq!(index.count("products").await, 3);
        assert_eq!(index.get("products", "p1").await.unwrap()["name"], "Renamed");
    }

    #[tokio::test]
    async fn unknown_index_yields_no_hits() {
        let index = InMemorySearchIndex::new();
        let results = index.search("nope", &SearchQuery::new("x")).await.unwrap();
        assert_eq!(results, SearchResults::default());
    }
}
