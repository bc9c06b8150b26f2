use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use bookstore_core::{BookId, ShelfId};
use bookstore_events::{DomainEvent, InMemoryEventBus, StockUpdated};
use bookstore_infra::allocation::{AllocationEngine, StockAllocator};
use bookstore_infra::inventory_store::InMemoryInventoryStore;
use bookstore_infra::projections::{BookCacheProjection, CachedBookInfo};
use bookstore_infra::publisher::DomainEnvelope;
use bookstore_infra::read_model::InMemoryReadModelStore;
use bookstore_infra::warehouse::Warehouse;
use bookstore_orders::OrderItem;
use bookstore_warehouse::{plan_allocation, InventoryRecord, StockLocation};
use std::sync::Arc;

type Bus = Arc<InMemoryEventBus<DomainEnvelope>>;

fn record_with_shelves(shelves: usize, per_shelf: i64) -> InventoryRecord {
    InventoryRecord::from_locations(
        BookId::from("bench-book"),
        (0..shelves).map(|i| StockLocation {
            shelf_id: ShelfId::from(format!("shelf-{i:05}").as_str()),
            quantity: per_shelf,
        }),
    )
    .unwrap()
}

fn setup_ledger(books: usize, shelves: usize, per_shelf: i64) -> Arc<Warehouse<Arc<InMemoryInventoryStore>, Bus>> {
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let warehouse = Arc::new(Warehouse::new(Arc::new(InMemoryInventoryStore::new()), bus));
    for b in 0..books {
        let book = BookId::from(format!("book-{b}").as_str());
        for s in 0..shelves {
            warehouse
                .add_stock(&book, &ShelfId::from(format!("shelf-{s}").as_str()), per_shelf)
                .unwrap();
        }
    }
    warehouse
}

/// Pure planning cost as the number of shelves a book sits on grows.
fn bench_plan_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_allocation");

    for shelves in [1usize, 10, 100, 1000].iter() {
        let record = record_with_shelves(*shelves, 3);
        // Request enough to touch every shelf.
        let quantity = record.total();
        group.throughput(Throughput::Elements(*shelves as u64));
        group.bench_with_input(BenchmarkId::from_parameter(shelves), shelves, |b, _| {
            b.iter(|| plan_allocation(black_box(&record), black_box(quantity)).unwrap());
        });
    }

    group.finish();
}

/// Allocate then release through the locked ledger (load, plan, save, publish).
fn bench_order_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_allocation");

    for lines in [1usize, 5, 20].iter() {
        let engine = AllocationEngine::new(setup_ledger(*lines, 4, 1_000_000));
        let items: Vec<OrderItem> = (0..*lines)
            .map(|b| OrderItem {
                book_id: BookId::from(format!("book-{b}").as_str()),
                quantity: 5,
            })
            .collect();

        group.throughput(Throughput::Elements(*lines as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), lines, |b, _| {
            b.iter(|| {
                let plans = engine.allocate_order(black_box(&items)).unwrap();
                engine.release(&plans).unwrap();
            });
        });
    }

    group.finish();
}

/// Cost of folding stock deltas into the book cache.
fn bench_cache_deltas(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_deltas");
    group.sample_size(200);

    let store: Arc<InMemoryReadModelStore<BookId, CachedBookInfo>> =
        Arc::new(InMemoryReadModelStore::new());
    let cache = BookCacheProjection::new(store);
    let book = BookId::from("bench-book");
    cache.seed(CachedBookInfo {
        book_id: book.clone(),
        name: "Bench".to_string(),
        author: "Bench".to_string(),
        price: 100,
        total_stock: 0,
        last_updated: Utc::now(),
    });
    let event = DomainEvent::StockUpdated(StockUpdated {
        book_id: book,
        shelf_id: ShelfId::from("s1"),
        quantity: 1,
        timestamp: Utc::now(),
    });

    group.bench_function("apply_stock_updated", |b| {
        b.iter(|| cache.apply_event(black_box(&event)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_plan_allocation,
    bench_order_allocation,
    bench_cache_deltas
);
criterion_main!(benches);
