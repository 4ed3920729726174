//! # Flush Benchmark
//!
//! One simulation tick on the producer: encode every dirty object and
//! publish it to its triple buffer.
//!
//! Target: 1000 dirty scene nodes flush well inside a 60 Hz tick.

#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mirage::core::SchemaRegistry;
use mirage::shared::scene::SCENE_NODE;
use mirage::shared::{channel, register_scene_schemas, MirageConfig, Transform};
use mirage::sync::Synchronizer;

fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("synchronizer_flush");

    for objects in [10usize, 100, 1000] {
        let registry = SchemaRegistry::new();
        register_scene_schemas(&registry).unwrap();
        let (game, _render) = channel();
        let mut sync = Synchronizer::new(Arc::new(registry), game, &MirageConfig::default()).unwrap();
        let ids: Vec<_> = (0..objects)
            .map(|_| sync.register_proxy(SCENE_NODE).unwrap())
            .collect();
        sync.flush().unwrap();

        group.bench_with_input(BenchmarkId::new("dirty_scene_nodes", objects), &objects, |b, _| {
            let mut step = 0.0f32;
            b.iter(|| {
                step += 1.0;
                for &id in &ids {
                    sync.set_fields(id, Transform::from_position([step, 0.0, 0.0]).fields())
                        .unwrap();
                }
                black_box(sync.flush().unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_flush);
criterion_main!(benches);
