//! Primary document store contract and the document semantics it relies on.
//!
//! Documents are JSON objects. Field paths use dotted notation
//! (`category.id`, `orderHistory.orderId`); when a path crosses a list, a
//! condition matches if any element of the list matches.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::{Result, StoreError};

/// Equality conditions on document field paths, all of which must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// Creates a filter that matches every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Creates a filter with a single equality condition.
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(path, value)
    }

    /// Adds an equality condition.
    pub fn and(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((path.into(), value.into()));
        self
    }

    /// Returns the conditions in insertion order.
    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    /// Returns true if the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Returns true if every condition holds for `document`.
    pub fn matches(&self, document: &Value) -> bool {
        self.conditions.iter().all(|(path, expected)| {
            let segments: Vec<&str> = path.split('.').collect();
            path_matches(document, &segments, expected)
        })
    }
}

fn path_matches(value: &Value, segments: &[&str], expected: &Value) -> bool {
    match (value, segments.split_first()) {
        (Value::Array(items), Some(_)) => items
            .iter()
            .any(|item| path_matches(item, segments, expected)),
        (_, Some((head, rest))) => value
            .get(*head)
            .is_some_and(|child| path_matches(child, rest, expected)),
        (Value::Array(items), None) => value == expected || items.contains(expected),
        (_, None) => value == expected,
    }
}

/// Field assignments applied by a partial update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSet {
    fields: Vec<(String, Value)>,
}

impl FieldSet {
    /// Creates an empty field set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an assignment of `value` to the field at `path`.
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((path.into(), value.into()));
        self
    }

    /// Returns the assignments in insertion order.
    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    /// Returns true if there is nothing to assign.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Applies every assignment to `target`, creating intermediate objects.
    pub fn apply(&self, target: &mut Value) {
        for (path, value) in &self.fields {
            set_path(target, path, value.clone());
        }
    }
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

fn set_path(target: &mut Value, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            ensure_object(target).insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = ensure_object(target)
                .entry(head.to_string())
                .or_insert(Value::Null);
            set_path(child, rest, value);
        }
    }
}

/// Reads the value at a dotted path without crossing lists.
pub fn get_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.get(segment))
}

fn list_at_mut<'a>(document: &'a mut Value, path: &str) -> Result<&'a mut Vec<Value>> {
    let (parents, leaf) = match path.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, path),
    };

    let mut current = document;
    if let Some(parents) = parents {
        for segment in parents.split('.') {
            current = ensure_object(current)
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
    }

    let slot = ensure_object(current)
        .entry(leaf.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if slot.is_null() {
        *slot = Value::Array(Vec::new());
    }

    match slot {
        Value::Array(items) => Ok(items),
        _ => Err(StoreError::InvalidDocument(format!(
            "field '{path}' is not a list"
        ))),
    }
}

/// Appends `element` to the list at `list_field`, creating it if absent.
pub fn append_to_list(document: &mut Value, list_field: &str, element: Value) -> Result<()> {
    list_at_mut(document, list_field)?.push(element);
    Ok(())
}

/// Applies `fields` to every element of the list at `list_field` matching
/// `element_filter`. Returns true if at least one element was updated.
pub fn update_list_elements(
    document: &mut Value,
    list_field: &str,
    element_filter: &Filter,
    fields: &FieldSet,
) -> Result<bool> {
    if get_path(document, list_field).is_none() {
        return Ok(false);
    }

    let mut updated = false;
    for element in list_at_mut(document, list_field)?.iter_mut() {
        if element_filter.matches(element) {
            fields.apply(element);
            updated = true;
        }
    }
    Ok(updated)
}

/// Ensures a document is a JSON object before it is stored.
pub fn require_object(collection: &str, key: &str, document: &Value) -> Result<()> {
    if document.is_object() {
        Ok(())
    } else {
        Err(StoreError::InvalidDocument(format!(
            "{collection}/{key} must be a JSON object"
        )))
    }
}

/// The authoritative primary store for read-model entities.
///
/// Every entity is stored under its stable external identifier. All writes
/// are safe to repeat: [`upsert`](DocumentStore::upsert) replaces the whole
/// document rather than failing on an existing key.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts or replaces the document stored under `key`.
    async fn upsert(&self, collection: &str, key: &str, document: Value) -> Result<()>;

    /// Returns the first document matching `filter`, ordered by key.
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>>;

    /// Returns up to `limit` documents matching `filter` after skipping
    /// `skip`, ordered by key.
    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Value>>;

    /// Assigns `fields` on every document matching `filter`.
    ///
    /// Returns the number of matched documents.
    async fn update_fields(&self, collection: &str, filter: &Filter, fields: &FieldSet)
    -> Result<u64>;

    /// Appends `element` to the list at `list_field` of every matching document.
    ///
    /// Returns the number of matched documents.
    async fn append_to_list(
        &self,
        collection: &str,
        filter: &Filter,
        list_field: &str,
        element: Value,
    ) -> Result<u64>;

    /// Assigns `fields` on the elements of the embedded list at `list_field`
    /// that match `element_filter`, inside every document matching `filter`.
    ///
    /// Returns the number of documents in which at least one element changed.
    async fn update_list_elements(
        &self,
        collection: &str,
        filter: &Filter,
        list_field: &str,
        element_filter: &Filter,
        fields: &FieldSet,
    ) -> Result<u64>;
}

/// Typed convenience methods over any [`DocumentStore`].
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    /// Serializes `entity` and upserts it under `key`.
    async fn upsert_entity<T: Serialize + Sync>(
        &self,
        collection: &str,
        key: &str,
        entity: &T,
    ) -> Result<()> {
        let document = serde_json::to_value(entity)?;
        self.upsert(collection, key, document).await
    }

    /// Finds and deserializes the first entity matching `filter`.
    async fn find_entity<T: DeserializeOwned + Send>(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<T>> {
        match self.find_one(collection, filter).await? {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }

    /// Finds and deserializes a page of entities matching `filter`.
    async fn find_entities<T: DeserializeOwned + Send>(
        &self,
        collection: &str,
        filter: &Filter,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<T>> {
        self.find_many(collection, filter, skip, limit)
            .await?
            .into_iter()
            .map(|document| serde_json::from_value(document).map_err(StoreError::from))
            .collect()
    }
}

impl<T: DocumentStore + ?Sized> DocumentStoreExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn customer() -> Value {
        json!({
            "customerId": "c1",
            "name": { "first": "Alice" },
            "tags": ["vip", "beta"],
            "orderHistory": [
                { "orderId": "o1", "status": "Pending" },
                { "orderId": "o2", "status": "Pending" }
            ]
        })
    }

    #[test]
    fn filter_matches_top_level_and_nested_fields() {
        let doc = customer();
        assert!(Filter::eq("customerId", "c1").matches(&doc));
        assert!(Filter::eq("name.first", "Alice").matches(&doc));
        assert!(!Filter::eq("name.first", "Bob").matches(&doc));
        assert!(!Filter::eq("missing.path", "x").matches(&doc));
    }

    #[test]
    fn filter_fans_out_across_lists() {
        let doc = customer();
        assert!(Filter::eq("orderHistory.orderId", "o2").matches(&doc));
        assert!(!Filter::eq("orderHistory.orderId", "o9").matches(&doc));
        assert!(Filter::eq("tags", "beta").matches(&doc));
    }

    #[test]
    fn all_conditions_must_hold() {
        let doc = customer();
        let filter = Filter::eq("customerId", "c1").and("orderHistory.orderId", "o1");
        assert!(filter.matches(&doc));
        let filter = Filter::eq("customerId", "c2").and("orderHistory.orderId", "o1");
        assert!(!filter.matches(&doc));
        assert!(Filter::all().matches(&doc));
    }

    #[test]
    fn field_set_creates_intermediate_objects() {
        let mut doc = json!({ "productId": "p1" });
        FieldSet::new()
            .set("currentInventory", 7)
            .set("category.id", "c100")
            .apply(&mut doc);
        assert_eq!(doc["currentInventory"], 7);
        assert_eq!(doc["category"]["id"], "c100");
    }

    #[test]
    fn append_creates_missing_list() {
        let mut doc = json!({ "customerId": "c1" });
        append_to_list(&mut doc, "orderHistory", json!({ "orderId": "o1" })).unwrap();
        append_to_list(&mut doc, "orderHistory", json!({ "orderId": "o2" })).unwrap();
        assert_eq!(doc["orderHistory"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn append_rejects_non_list_field() {
        let mut doc = json!({ "orderHistory": "oops" });
        let err = append_to_list(&mut doc, "orderHistory", json!({})).unwrap_err();
        assert!(matches!(err, StoreError::InvalidDocument(_)));
    }

    #[test]
    fn list_update_touches_only_matching_elements() {
        let mut doc = customer();
        let updated = update_list_elements(
            &mut doc,
            "orderHistory",
            &Filter::eq("orderId", "o2"),
            &FieldSet::new().set("status", "Shipped"),
        )
        .unwrap();
        assert!(updated);
        assert_eq!(doc["orderHistory"][0]["status"], "Pending");
        assert_eq!(doc["orderHistory"][1]["status"], "Shipped");
    }

    #[test]
    fn list_update_on_missing_list_is_a_no_op() {
        let mut doc = json!({ "customerId": "c1" });
        let updated = update_list_elements(
            &mut doc,
            "orderHistory",
            &Filter::eq("orderId", "o1"),
            &FieldSet::new().set("status", "Shipped"),
        )
        .unwrap();
        assert!(!updated);
        assert!(doc.get("orderHistory").is_none());
    }

    #[test]
    fn get_path_reads_nested_values() {
        let doc = customer();
        assert_eq!(get_path(&doc, "name.first"), Some(&json!("Alice")));
        assert_eq!(get_path(&doc, "name.last"), None);
    }
}
