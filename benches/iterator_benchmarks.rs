use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use triplegate::model::{MemoryModel, Model, SqlModel};
use triplegate::rdf::{Node, Statement};
use triplegate::ReentrantReadExclusiveWriteLock;

fn fill(model: &dyn Model, size: usize) {
    let predicate = Node::resource("urn:p").unwrap();
    let statements: Vec<Statement> = (0..size)
        .map(|i| {
            Statement::new(
                Node::resource(&format!("urn:s{}", i % 100)).unwrap(),
                predicate.clone(),
                Node::literal(format!("value {}", i)),
            )
        })
        .collect();
    model.add_statements(&statements).unwrap();
}

/// Drain a full listing through the shared iterator handle
fn bench_memory_listing(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_listing");

    for size in [100, 1000, 10_000].iter() {
        let model = MemoryModel::new();
        fill(&model, *size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let it = model.list_statements(&Statement::any()).unwrap();
                criterion::black_box(it.all_statements().len());
            });
        });
    }
    group.finish();
}

/// Subject-bound listing hits the subject index
fn bench_memory_partial_listing(c: &mut Criterion) {
    let model = MemoryModel::new();
    fill(&model, 10_000);
    let pattern = Statement::new(Node::resource("urn:s7").unwrap(), Node::Empty, Node::Empty);

    c.bench_function("memory_partial_listing", |b| {
        b.iter(|| {
            let it = model.list_statements(&pattern).unwrap();
            criterion::black_box(it.all_statements().len());
        });
    });
}

/// Keyset-paged SQLite listing
fn bench_sql_listing(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql_listing");
    group.sample_size(20);

    for size in [100, 1000].iter() {
        let model = SqlModel::in_memory().unwrap();
        fill(&model, *size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let it = model.list_statements(&Statement::any()).unwrap();
                criterion::black_box(it.all_statements().len());
            });
        });
    }
    group.finish();
}

/// Uncontended reentrant read and write acquisition
fn bench_lock(c: &mut Criterion) {
    let lock = ReentrantReadExclusiveWriteLock::new();

    c.bench_function("lock_read_nested_4", |b| {
        b.iter(|| {
            for _ in 0..4 {
                lock.lock_for_read();
            }
            for _ in 0..4 {
                lock.unlock();
            }
        });
    });

    c.bench_function("lock_write", |b| {
        b.iter(|| {
            let _guard = lock.write();
            criterion::black_box(lock.is_write_locked());
        });
    });
}

criterion_group!(
    benches,
    bench_memory_listing,
    bench_memory_partial_listing,
    bench_sql_listing,
    bench_lock
);
criterion_main!(benches);
