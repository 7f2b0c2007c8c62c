use confmark::sync::plan_merge;
use confmark::{
    Collection, DirectExchange, IdentityBridge, LocalPreferenceStore, MemoryBackend,
    PreferenceRecord, PreferenceSync, PrimarySession, RemotePreferenceStore,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

fn records(prefix: &str, count: usize) -> Vec<PreferenceRecord> {
    (0..count)
        .map(|i| PreferenceRecord::new(format!("{}-{}", prefix, i)))
        .collect()
}

fn bench_plan_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_merge");

    for count in [10, 100, 500].iter() {
        // Half the local entries already exist remotely
        let mut local = records("local", *count / 2);
        local.extend(records("shared", *count / 2));
        let remote = records("shared", *count);

        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| plan_merge(black_box(&local), black_box(&remote)));
        });
    }

    group.finish();
}

fn bench_first_sync(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("first_sync");

    for count in [50, 300].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                runtime.block_on(async {
                    let bridge = IdentityBridge::new(Box::new(DirectExchange));
                    bridge
                        .set_primary_session(Some(PrimarySession::new("bench")))
                        .await;

                    let local = LocalPreferenceStore::in_memory();
                    for i in 0..count {
                        local.add_bookmark(&format!("s{}", i));
                    }

                    let backend = Arc::new(MemoryBackend::new());
                    let ids: Vec<String> = (0..count / 2).map(|i| format!("r{}", i)).collect();
                    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
                    backend.seed("bench", Collection::Bookmarks, &id_refs);

                    let sync = PreferenceSync::new(
                        local,
                        Some(RemotePreferenceStore::new(Box::new(backend))),
                        bridge.subscribe(),
                    );
                    black_box(sync.load_data().await)
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_plan_merge, bench_first_sync);
criterion_main!(benches);
