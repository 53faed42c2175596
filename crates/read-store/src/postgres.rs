use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::document::{self, DocumentStore, FieldSet, Filter};
use crate::{Result, StoreError};

/// PostgreSQL-backed document store.
///
/// Every entity is one JSONB row keyed by `(collection, key)`. Filters are
/// compiled to SQL/JSON path predicates, whose lax mode gives the same
/// "any list element" semantics as [`Filter::matches`]. Partial updates run
/// as read-modify-write inside a row-locking transaction.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Creates a new PostgreSQL document store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn lock_matching(
        tx: &mut Transaction<'_, Postgres>,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<(String, Value)>> {
        let (path, vars) = json_path_predicate(filter);
        let rows = sqlx::query(
            r#"
            SELECT key, body
            FROM documents
            WHERE collection = $1 AND jsonb_path_match(body, $2::jsonpath, $3)
            ORDER BY key
            FOR UPDATE
            "#,
        )
        .bind(collection)
        .bind(path)
        .bind(vars)
        .fetch_all(&mut **tx)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<(String, Value)> {
                Ok((row.try_get("key")?, row.try_get("body")?))
            })
            .collect()
    }

    async fn write_back(
        tx: &mut Transaction<'_, Postgres>,
        collection: &str,
        key: &str,
        body: &Value,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE documents SET body = $3, updated_at = NOW() WHERE collection = $1 AND key = $2",
        )
        .bind(collection)
        .bind(key)
        .bind(body)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Applies `mutate` to every matching document in one transaction and
    /// returns how many documents it reported as changed.
    async fn mutate_matching<F>(
        &self,
        collection: &str,
        filter: &Filter,
        mut mutate: F,
    ) -> Result<u64>
    where
        F: FnMut(&mut Value) -> Result<bool> + Send,
    {
        let mut tx = self.pool.begin().await?;
        let mut matched = 0;
        for (key, mut body) in Self::lock_matching(&mut tx, collection, filter).await? {
            if mutate(&mut body)? {
                Self::write_back(&mut tx, collection, &key, &body).await?;
                matched += 1;
            }
        }
        tx.commit().await?;
        Ok(matched)
    }
}

/// Compiles a filter into a `jsonb_path_match` predicate and its variables.
fn json_path_predicate(filter: &Filter) -> (String, Value) {
    if filter.is_empty() {
        return ("true".to_string(), Value::Object(Map::new()));
    }

    let mut vars = Map::new();
    let clauses: Vec<String> = filter
        .conditions()
        .iter()
        .enumerate()
        .map(|(i, (path, value))| {
            let var = format!("v{i}");
            vars.insert(var.clone(), value.clone());
            let accessor: String = path
                .split('.')
                .map(|segment| {
                    let escaped = segment.replace('\\', "\\\\").replace('"', "\\\"");
                    format!(".\"{escaped}\"")
                })
                .collect();
            format!("${accessor} == ${var}")
        })
        .collect();

    (clauses.join(" && "), Value::Object(vars))
}

/// Secondary unique indexes created by the migrations, with the document
/// field each one covers.
const UNIQUE_INDEXES: [(&str, &str); 3] = [
    ("uq_products_sku", "sku"),
    ("uq_orders_order_number", "orderNumber"),
    ("uq_customers_email", "email"),
];

fn map_write_error(collection: &str, key: &str, document: &Value, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return duplicate_key(collection, key, document, db_err.constraint());
    }
    StoreError::Database(err)
}

/// Names the clashing field and value the way the in-memory store does.
fn duplicate_key(
    collection: &str,
    key: &str,
    document: &Value,
    constraint: Option<&str>,
) -> StoreError {
    let field = constraint.and_then(|name| {
        UNIQUE_INDEXES
            .iter()
            .find(|(index, _)| *index == name)
            .map(|(_, field)| *field)
    });
    let (field, value) = match field {
        Some(field) => {
            let value = document::get_path(document, field).unwrap_or(&Value::Null);
            (field.to_string(), value.to_string())
        }
        None => ("key".to_string(), key.to_string()),
    };
    StoreError::DuplicateKey {
        collection: collection.to_string(),
        field,
        value,
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    #[tracing::instrument(skip(self, document))]
    async fn upsert(&self, collection: &str, key: &str, document: Value) -> Result<()> {
        document::require_object(collection, key, &document)?;
        sqlx::query(
            r#"
            INSERT INTO documents (collection, key, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, key)
            DO UPDATE SET body = EXCLUDED.body, updated_at = NOW()
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(&document)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(collection, key, &document, e))?;
        Ok(())
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        let (path, vars) = json_path_predicate(filter);
        let body = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT body
            FROM documents
            WHERE collection = $1 AND jsonb_path_match(body, $2::jsonpath, $3)
            ORDER BY key
            LIMIT 1
            "#,
        )
        .bind(collection)
        .bind(path)
        .bind(vars)
        .fetch_optional(&self.pool)
        .await?;
        Ok(body)
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Value>> {
        let (path, vars) = json_path_predicate(filter);
        let bodies = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT body
            FROM documents
            WHERE collection = $1 AND jsonb_path_match(body, $2::jsonpath, $3)
            ORDER BY key
            OFFSET $4
            LIMIT $5
            "#,
        )
        .bind(collection)
        .bind(path)
        .bind(vars)
        .bind(i64::try_from(skip).unwrap_or(i64::MAX))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(bodies)
    }

    #[tracing::instrument(skip(self, fields))]
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

    #[tracing::instrument(skip(self, element))]
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

    #[tracing::instrument(skip(self, fields))]
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
