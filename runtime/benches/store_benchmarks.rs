//! Store performance benchmarks.
//!
//! Measures serialized dispatch throughput in both dispatch modes and the
//! cost of a memoized selector evaluation.
//!
//! Run with: `cargo bench`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used, clippy::unwrap_used)] // Benchmarks can use expect for setup

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use uniflow_core::reducer::ReducerRegistry;
use uniflow_core::state::StateSnapshot;
use uniflow_runtime::{DispatchMode, Store, StoreConfig};
use uniflow_testing::fixtures::{self, Increment, selectors};

fn dispatch_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("benchmark runtime");

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(1));

    group.bench_function("increment_inline", |b| {
        let store =
            Store::with_config(StoreConfig::default().with_dispatch_mode(DispatchMode::Inline));
        store.register_reducers(fixtures::counter_reducers());
        b.to_async(&rt).iter(|| {
            let store = store.clone();
            async move {
                store.dispatch(Increment { amount: 1 }).await.unwrap();
            }
        });
    });

    group.bench_function("increment_queued", |b| {
        let store = rt.block_on(async {
            let store = Store::new();
            store.register_reducers(fixtures::counter_reducers());
            store
        });
        b.to_async(&rt).iter(|| {
            let store = store.clone();
            async move {
                store.dispatch(Increment { amount: 1 }).await.unwrap();
            }
        });
    });

    group.finish();
}

fn selector_evaluation(c: &mut Criterion) {
    let mut registry = ReducerRegistry::new();
    let snapshot = registry.register(fixtures::person_reducers(), &StateSnapshot::new());
    let first_name = selectors::first_name();

    c.bench_function("selector_eval_memoized", |b| {
        let mut instance = first_name.instantiate();
        instance.evaluate(&snapshot).unwrap();
        b.iter(|| {
            black_box(instance.evaluate(&snapshot).unwrap());
        });
    });
}

criterion_group!(benches, dispatch_throughput, selector_evaluation);
criterion_main!(benches);
