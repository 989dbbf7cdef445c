//! Store Benchmarks
//!
//! | Name | What It Measures |
//! |------|------------------|
//! | `store/nested_effect_loop` | An effect that reads two deep leaves and writes both back until a counter reaches a limit |
//! | `store/deep_set_untracked` | A six-level write with no subscribers |
//! | `store/deep_read` | Navigating and reading a six-level leaf |
//!
//! ## Running
//!
//! ```bash
//! cargo bench --bench store
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use canopy_core::reactive::Effect;
use canopy_core::store::{create_store, Path, Store, Value};
use serde_json::json;

const TOTAL_UPDATES: usize = 5_000;

fn text_path(field: &str) -> Path {
    Path::from(["data", "group", "channel", "message", "text", field])
}

fn nested() -> Value {
    Value::from(json!({
        "data": {
            "group": {
                "channel": {
                    "message": {
                        "text": { "value": "Hello [at: 0]", "counter": 0 }
                    }
                }
            }
        }
    }))
}

fn counter(store: &Store) -> usize {
    store
        .at(text_path("counter"))
        .get()
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0) as usize
}

fn bench_effect_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");
    group.throughput(Throughput::Elements(TOTAL_UPDATES as u64));
    group.sample_size(20);

    group.bench_with_input(
        BenchmarkId::new("nested_effect_loop", TOTAL_UPDATES),
        &TOTAL_UPDATES,
        |b, &limit| {
            b.iter(|| {
                let (store, set) = create_store(nested());
                let effect = Effect::new({
                    let store = store.clone();
                    move || {
                        store.at(text_path("value")).get();
                        let count = counter(&store);
                        if count < limit {
                            set.set(text_path("value"), format!("Hello [at: {count}]"))
                                .expect("bench write");
                            set.set(text_path("counter"), count + 1)
                                .expect("bench write");
                        }
                    }
                });
                black_box(effect.run_count())
            });
        },
    );

    group.finish();
}

fn bench_plain_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");

    group.bench_function("deep_set_untracked", |b| {
        let (_store, set) = create_store(nested());
        let mut i = 0usize;
        b.iter(|| {
            i += 1;
            set.set(text_path("counter"), black_box(i)).ok();
        });
    });

    group.bench_function("deep_read", |b| {
        let (store, _set) = create_store(nested());
        b.iter(|| black_box(store.at(text_path("value")).get()));
    });

    group.finish();
}

criterion_group!(benches, bench_effect_loop, bench_plain_access);
criterion_main!(benches);
