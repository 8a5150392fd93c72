//! Store Benchmarks
//!
//! Cell lookup in a populated store, segment identity derivation and
//! snapshot capture.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lattice_data::route::Params;
use lattice_data::{CellKey, RouteDataStore, SegmentId};

fn populated_store(segments: u64, cells_per_segment: usize) -> RouteDataStore {
    let store = RouteDataStore::new();
    for segment in 0..segments {
        for i in 0..cells_per_segment {
            let key = CellKey::new(SegmentId::from(segment), format!("cell-{i}"));
            store
                .get_or_create(key, move || async move { Ok(i as u64) })
                .expect("fresh key");
        }
    }
    store
}

fn bench_get_or_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_or_create");
    for segments in [8u64, 64, 512] {
        let store = populated_store(segments, 4);
        let key = CellKey::new(SegmentId::from(segments / 2), "cell-2");
        group.bench_with_input(BenchmarkId::new("hit", segments), &key, |b, key| {
            b.iter(|| {
                store
                    .get_or_create(black_box(key.clone()), || async { Ok(0u64) })
                    .expect("same type")
            })
        });
    }
    group.finish();
}

fn bench_segment_id(c: &mut Criterion) {
    let params = Params::new()
        .with("house", "gryffindor")
        .with("year", "1991")
        .with("student", "harry");
    c.bench_function("segment_id_derive", |b| {
        b.iter(|| {
            SegmentId::derive(black_box("[house]/[year]/students/[student]"), black_box(&params))
        })
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let store = populated_store(64, 4);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    runtime.block_on(async {
        for key in store.keys() {
            if let Some(handle) = store.handle(&key) {
                handle.settled().await;
            }
        }
    });
    c.bench_function("snapshot_256_cells", |b| {
        b.iter(|| store.snapshot().expect("serializable").to_json().expect("json"))
    });
}

criterion_group!(benches, bench_get_or_create, bench_segment_id, bench_snapshot);
criterion_main!(benches);
