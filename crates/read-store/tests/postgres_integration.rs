//! PostgreSQL document store integration tests
//!
//! These tests share one PostgreSQL container and need a Docker daemon.
//! Run with:
//!
//! ```bash
//! cargo test -p read-store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use read_store::{DocumentStore, FieldSet, Filter, PostgresDocumentStore, StoreError};
use serde_json::json;
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresDocumentStore::new(pool.clone())
                .run_migrations()
                .await
                .unwrap();
            pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresDocumentStore {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE documents")
        .execute(&pool)
        .await
        .unwrap();

    PostgresDocumentStore::new(pool)
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn upsert_and_find_by_nested_field() {
    let store = get_test_store().await;
    store
        .upsert(
            "products",
            "p1001",
            json!({ "productId": "p1001", "sku": "SKU-1001", "category": { "id": "c100" } }),
        )
        .await
        .unwrap();

    let found = store
        .find_one("products", &Filter::eq("category.id", "c100"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found["sku"], "SKU-1001");

    let missing = store
        .find_one("products", &Filter::eq("category.id", "c999"))
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn secondary_unique_key_is_enforced() {
    let store = get_test_store().await;
    store
        .upsert("products", "p1", json!({ "productId": "p1", "sku": "S1" }))
        .await
        .unwrap();

    let err = store
        .upsert("products", "p2", json!({ "productId": "p2", "sku": "S1" }))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::DuplicateKey { ref field, ref value, .. } if field == "sku" && value == "\"S1\""
    ));

    // The same sku in another collection is not a clash.
    store
        .upsert("orders", "o1", json!({ "orderId": "o1", "sku": "S1" }))
        .await
        .unwrap();
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn find_many_pages_in_key_order() {
    let store = get_test_store().await;
    for id in ["o3", "o1", "o2"] {
        store
            .upsert("orders", id, json!({ "orderId": id, "customer": { "customerId": "c1" } }))
            .await
            .unwrap();
    }

    let filter = Filter::eq("customer.customerId", "c1");
    let page = store.find_many("orders", &filter, 1, 5).await.unwrap();
    let ids: Vec<_> = page.iter().map(|d| d["orderId"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["o2", "o3"]);
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn partial_updates_touch_only_named_fields() {
    let store = get_test_store().await;
    store
        .upsert(
            "customers",
            "c1",
            json!({
                "customerId": "c1",
                "email": "a@example.com",
                "orderHistory": [{ "orderId": "o1", "status": "Pending" }]
            }),
        )
        .await
        .unwrap();

    let by_customer = Filter::eq("customerId", "c1");
    store
        .append_to_list(
            "customers",
            &by_customer,
            "orderHistory",
            json!({ "orderId": "o2", "status": "Pending" }),
        )
        .await
        .unwrap();

    let changed = store
        .update_list_elements(
            "customers",
            &by_customer,
            "orderHistory",
            &Filter::eq("orderId", "o2"),
            &FieldSet::new().set("status", "Shipped"),
        )
        .await
        .unwrap();
    assert_eq!(changed, 1);

    let matched = store
        .update_fields("customers", &by_customer, &FieldSet::new().set("name", "Alice"))
        .await
        .unwrap();
    assert_eq!(matched, 1);

    let doc = store.find_one("customers", &by_customer).await.unwrap().unwrap();
    assert_eq!(doc["email"], "a@example.com");
    assert_eq!(doc["name"], "Alice");
    assert_eq!(doc["orderHistory"][0]["status"], "Pending");
    assert_eq!(doc["orderHistory"][1]["status"], "Shipped");

    // Any-element semantics across the embedded list.
    let by_history = Filter::eq("orderHistory.orderId", "o2");
    assert!(store.find_one("customers", &by_history).await.unwrap().is_some());
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn update_on_missing_document_matches_nothing() {
    let store = get_test_store().await;
    let matched = store
        .update_fields(
            "products",
            &Filter::eq("productId", "nope"),
            &FieldSet::new().set("currentInventory", 5),
        )
        .await
        .unwrap();
    assert_eq!(matched, 0);
}
