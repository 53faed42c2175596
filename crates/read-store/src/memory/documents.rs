use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::document::{self, DocumentStore, FieldSet, Filter};
use crate::{Result, StoreError};

/// In-memory document store for tests and single-process deployments.
///
/// Collections are ordered by key, so paginated reads are stable. Unique
/// secondary keys are enforced on upsert.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, BTreeMap<String, Value>>>>,
    unique_fields: Arc<HashMap<String, Vec<String>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryDocumentStore {
    /// Creates an empty store without secondary unique keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `field` unique within `collection`.
    pub fn with_unique_field(mut self, collection: &str, field: &str) -> Self {
        Arc::make_mut(&mut self.unique_fields)
            .entry(collection.to_string())
            .or_default()
            .push(field.to_string());
        self
    }

    /// Makes every subsequent operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the document stored under `key`, bypassing filters.
    pub async fn get(&self, collection: &str, key: &str) -> Option<Value> {
        self.collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned()
    }

    /// Returns the number of documents in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory document store is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn check_unique(
        &self,
        collection: &str,
        key: &str,
        document: &Value,
        existing: Option<&BTreeMap<String, Value>>,
    ) -> Result<()> {
        let (Some(fields), Some(existing)) = (self.unique_fields.get(collection), existing) else {
            return Ok(());
        };

        for field in fields {
            let Some(value) = document::get_path(document, field).filter(|v| !v.is_null()) else {
                continue;
            };
            let clash = existing.iter().any(|(other_key, other)| {
                other_key != key && document::get_path(other, field) == Some(value)
            });
            if clash {
                return Err(StoreError::DuplicateKey {
                    collection: collection.to_string(),
                    field: field.clone(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Runs `mutate` on every document matching `filter` and returns how many
    /// documents it reported as matched.
    async fn mutate_matching<F>(
        &self,
        collection: &str,
        filter: &Filter,
        mut mutate: F,
    ) -> Result<u64>
    where
        F: FnMut(&mut Value) -> Result<bool>,
    {
        self.check_available()?;
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut matched = 0;
        for doc in docs.values_mut().filter(|doc| filter.matches(doc)) {
            if mutate(doc)? {
                matched += 1;
            }
        }
        Ok(matched)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn upsert(&self, collection: &str, key: &str, document: Value) -> Result<()> {
        self.check_available()?;
        document::require_object(collection, key, &document)?;

        let mut collections = self.collections.write().await;
        self.check_unique(collection, key, &document, collections.get(collection))?;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), document);
        Ok(())
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        self.check_available()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.values().find(|doc| filter.matches(doc)))
            .cloned())
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Value>> {
        self.check_available()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| filter.matches(doc))
                    .skip(skip)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update_fields(
        &self,
        collection: &str,
        filter: &Filter,
        fields: &FieldSet,
    ) -> Result<u64> {
        self.mutate_matching(collection, filter, |doc| {
            fields.apply(doc);
            Ok(true)
        })
        .await
    }

    async fn append_to_list(
        &self,
        collection: &str,
        filter: &Filter,
        list_field: &str,
        element: Value,
    ) -> Result<u64> {
        self.mutate_matching(collection, filter, |doc| {
            document::append_to_list(doc, list_field, element.clone())?;
            Ok(true)
        })
        .await
    }

    async fn update_list_elements(
        &self,
        collection: &str,
        filter: &Filter,
        list_field: &str,
        element_filter: &Filter,
        fields: &FieldSet,
    ) -> Result<u64> {
        self.mutate_matching(collection, filter, |doc| {
            document::update_list_elements(doc, list_field, element_filter, fields)
        })
        .await
    }
}
