use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Category, CategoryId, InventoryChanged, Product, ProductId};
use projections::{InventoryChangedHandler, ProductCreatedHandler, Stores, SyncHandler};
use read_store::{InMemoryCache, InMemoryDocumentStore, InMemorySearchIndex};

fn in_memory_stores() -> Stores {
    Stores::new(
        Arc::new(InMemoryDocumentStore::new().with_unique_field("products", "sku")),
        Arc::new(InMemorySearchIndex::new()),
        Arc::new(InMemoryCache::new()),
    )
}

fn product(n: usize) -> Product {
    Product {
        product_id: ProductId::new(format!("p{n}")),
        sku: format!("SKU-{n}"),
        name: format!("Benchmark Widget {n}"),
        description: "A widget used to measure handler throughput".to_string(),
        price: 9.99,
        category: Category {
            id: CategoryId::new(format!("c{}", n % 10)),
            name: "Widgets".to_string(),
            ..Default::default()
        },
        current_inventory: 10,
        ..Default::default()
    }
}

fn bench_product_created_100(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("projections/product_created_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                let stores = in_memory_stores();
                stores.prepare().await.unwrap();
                let handler = ProductCreatedHandler::new(stores);
                for n in 0..100 {
                    handler.apply(product(n)).await.unwrap();
                }
            });
        });
    });
}

fn bench_inventory_changed(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let stores = in_memory_stores();
    rt.block_on(async {
        stores.prepare().await.unwrap();
        let created = ProductCreatedHandler::new(stores.clone());
        for n in 0..1000 {
            created.apply(product(n)).await.unwrap();
        }
    });
    let handler = InventoryChangedHandler::new(stores);

    c.bench_function("projections/inventory_changed_1000_products", |b| {
        b.iter(|| {
            rt.block_on(async {
                handler
                    .apply(InventoryChanged {
                        product_id: ProductId::new("p500"),
                        quantity: 7,
                    })
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_product_created_100, bench_inventory_changed);
criterion_main!(benches);
