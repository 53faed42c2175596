//! Integration tests: log → consumer → projection handlers → in-memory stores.

use std::sync::Arc;
use std::time::Duration;

use consumer::{
    Consumer, ConsumerConfig, DeadLetterKind, HandlerRegistry, MessageOutcome,
};
use domain::{
    Category, CategoryId, DomainEvent, InventoryChanged, Product, ProductId, keys,
};
use projections::{HandlerOutcome, Stores, handlers};
use read_store::{
    Cache, InMemoryCache, InMemoryDocumentStore, InMemoryLog, InMemorySearchIndex, Message,
};

const TOPIC: &str = "query-service-events";
const GROUP: &str = "query-service-group";

struct Setup {
    log: InMemoryLog,
    documents: InMemoryDocumentStore,
    search: InMemorySearchIndex,
    cache: InMemoryCache,
    stores: Stores,
}

async fn setup() -> Setup {
    let documents = keys::UNIQUE_FIELDS
        .into_iter()
        .fold(InMemoryDocumentStore::new(), |store, (collection, field)| {
            store.with_unique_field(collection, field)
        });
    let search = InMemorySearchIndex::new();
    let cache = InMemoryCache::new();
    let stores = Stores::new(
        Arc::new(documents.clone()),
        Arc::new(search.clone()),
        Arc::new(cache.clone()),
    );
    stores.prepare().await.unwrap();

    Setup {
        log: InMemoryLog::new(),
        documents,
        search,
        cache,
        stores,
    }
}

impl Setup {
    async fn consumer(&self, config: ConsumerConfig) -> Consumer {
        let reader = Arc::new(self.log.reader(TOPIC, GROUP).await);
        Consumer::new(
            reader,
            Arc::new(self.log.clone()),
            HandlerRegistry::with_handlers(handlers::all(&self.stores)),
            config,
        )
    }

    async fn publish(&self, event: &DomainEvent) {
        self.log
            .produce(TOPIC, event.entity_id(), event.to_bytes().unwrap())
            .await;
    }

    async fn dead_letters(&self) -> Vec<Message> {
        self.log.messages(&format!("{TOPIC}-dlq")).await
    }
}

fn tee(price: f64) -> Product {
    Product {
        product_id: ProductId::new("p1001"),
        sku: "SKU-1001".to_string(),
        name: "Gin T-Shirt".to_string(),
        description: "High quality developer tee".to_string(),
        price,
        category: Category {
            id: CategoryId::new("c100"),
            name: "Apparel".to_string(),
            ..Default::default()
        },
        current_inventory: 100,
        ..Default::default()
    }
}

fn message(event: &DomainEvent) -> Message {
    Message::new(event.entity_id(), event.to_bytes().unwrap())
}

#[tokio::test(start_paused = true)]
async fn transient_store_outage_is_ridden_out_by_retries() {
    let s = setup().await;
    let consumer = s.consumer(ConsumerConfig::default()).await;

    s.documents.set_unavailable(true);
    let documents = s.documents.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(700)).await;
        documents.set_unavailable(false);
    });

    let outcome = consumer
        .process(&message(&DomainEvent::ProductCreated(tee(29.99))))
        .await;

    // Attempts at 0ms, 500ms and 1500ms.
    assert_eq!(
        outcome,
        MessageOutcome::Succeeded {
            attempts: 3,
            outcome: HandlerOutcome::Completed
        }
    );
    assert!(s.documents.get("products", "p1001").await.is_some());
    assert!(s.search.get("products", "p1001").await.is_some());
    assert!(s.dead_letters().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn inventory_change_for_missing_product_is_dead_lettered() {
    let s = setup().await;
    let consumer = s.consumer(ConsumerConfig::default()).await;
    let event = DomainEvent::InventoryChanged(InventoryChanged {
        product_id: ProductId::new("p404"),
        quantity: 5,
    });

    let started = tokio::time::Instant::now();
    let outcome = consumer.process(&message(&event)).await;

    assert_eq!(outcome, MessageOutcome::DeadLettered(DeadLetterKind::ProcessingError));
    assert_eq!(started.elapsed(), Duration::from_millis(3500));
    let dead = s.dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].header("error_detail"), Some(&b"product not found: p404"[..]));
    assert_eq!(dead[0].value, event.to_bytes().unwrap());
    assert!(!s.cache.contains("inventory:p404").await);
}

#[tokio::test(start_paused = true)]
async fn cache_outage_does_not_fail_the_event() {
    let s = setup().await;
    let consumer = s.consumer(ConsumerConfig::default()).await;
    s.cache.set_unavailable(true);

    let outcome = consumer
        .process(&message(&DomainEvent::ProductCreated(tee(29.99))))
        .await;

    let MessageOutcome::Succeeded { attempts, outcome } = outcome else {
        panic!("expected success, got {outcome:?}");
    };
    assert_eq!(attempts, 1);
    assert!(outcome.is_degraded());
    assert!(s.documents.get("products", "p1001").await.is_some());
    assert!(s.dead_letters().await.is_empty());
}

#[tokio::test]
async fn running_consumer_applies_events_in_log_order() {
    let s = setup().await;
    s.cache
        .set(&keys::product(&ProductId::new("p1001")), "stale".to_string(), Duration::from_secs(60))
        .await
        .unwrap();

    s.publish(&DomainEvent::ProductCreated(tee(29.99))).await;
    s.publish(&DomainEvent::ProductUpdated(tee(24.99))).await;
    s.publish(&DomainEvent::InventoryChanged(InventoryChanged {
        product_id: ProductId::new("p1001"),
        quantity: 42,
    }))
    .await;
    s.log.produce(TOPIC, "junk", "{").await;

    let config = ConsumerConfig {
        poll_timeout: Duration::from_millis(10),
        ..ConsumerConfig::default()
    };
    let handle = s.consumer(config).await.start();
    for _ in 0..400 {
        if s.log.committed_offset(TOPIC, GROUP).await == 4 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    handle.stop().await;

    assert_eq!(s.log.committed_offset(TOPIC, GROUP).await, 4);
    let stored = s.documents.get("products", "p1001").await.unwrap();
    assert_eq!(stored["price"], 24.99);
    assert_eq!(stored["currentInventory"], 42);
    assert_eq!(s.cache.peek("inventory:p1001").await.as_deref(), Some("42"));
    assert!(!s.cache.contains("product:p1001").await);

    let dead = s.dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].header("error_type"), Some(&b"parse_error"[..]));
    assert!(s.log.is_writer_closed());
}

#[tokio::test]
async fn restarted_consumer_resumes_after_committed_offset() {
    let s = setup().await;
    s.publish(&DomainEvent::ProductCreated(tee(29.99))).await;

    let config = ConsumerConfig {
        poll_timeout: Duration::from_millis(10),
        ..ConsumerConfig::default()
    };
    let first = s.consumer(config).await.start();
    for _ in 0..400 {
        if s.log.committed_offset(TOPIC, GROUP).await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    first.stop().await;

    s.publish(&DomainEvent::ProductUpdated(tee(19.99))).await;
    let reader = s.log.reader(TOPIC, GROUP).await;
    let consumer = Consumer::new(
        Arc::new(reader),
        Arc::new(InMemoryLog::new()),
        HandlerRegistry::with_handlers(handlers::all(&s.stores)),
        config,
    );
    let second = consumer.start();
    for _ in 0..400 {
        if s.log.committed_offset(TOPIC, GROUP).await == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    second.stop().await;

    let stored = s.documents.get("products", "p1001").await.unwrap();
    assert_eq!(stored["price"], 19.99);
}
