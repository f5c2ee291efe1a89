use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use screenvault::{
    compare_versions, AppId, MemoryBlobStore, MemoryMetadataStore, ScreenDetails, ScreenName,
    ScreenVersion, VersionManager,
};

fn versions(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("{}.{}.{}", i % 7, (i * 13) % 31, (i * 101) % 997))
        .collect()
}

/// Benchmark the string comparator (parse on every call)
fn bench_compare_strings(c: &mut Criterion) {
    let mut group = c.benchmark_group("compare_versions");

    for count in [100usize, 1_000, 10_000] {
        let input = versions(count);
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| {
                let mut sorted = input.clone();
                sorted.sort_by(|a, b| compare_versions(a, b).unwrap_or(std::cmp::Ordering::Equal));
                black_box(sorted);
            });
        });
    }

    group.finish();
}

/// Benchmark ordering of pre-parsed versions
fn bench_sort_parsed(c: &mut Criterion) {
    let mut group = c.benchmark_group("screen_version_sort");

    for count in [100usize, 1_000, 10_000] {
        let parsed: Vec<ScreenVersion> = versions(count)
            .iter()
            .filter_map(|raw| ScreenVersion::parse(raw).ok())
            .collect();
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::from_parameter(count), &parsed, |b, parsed| {
            b.iter(|| {
                let mut sorted = parsed.clone();
                sorted.sort();
                black_box(sorted);
            });
        });
    }

    group.finish();
}

/// Benchmark the upload path against the in-memory stores
fn bench_upload(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let app = AppId::new("bench", "com.example.bench").unwrap();
    let payload = Bytes::from(vec![b'x'; 4096]);

    c.bench_function("upload_4k", |b| {
        b.to_async(&runtime).iter_custom(|iters| {
            let app = app.clone();
            let payload = payload.clone();
            async move {
                let m = VersionManager::new(MemoryBlobStore::new(), MemoryMetadataStore::new());
                let name = ScreenName::new("home").unwrap();
                m.create(&app, &name, &ScreenVersion::new(0, 0, 0), payload.clone(), ScreenDetails::default())
                    .await
                    .unwrap();

                let start = std::time::Instant::now();
                for i in 0..iters {
                    m.upload(&app, &name, &ScreenVersion::new(0, 0, i + 1), payload.clone())
                        .await
                        .unwrap();
                }
                start.elapsed()
            }
        });
    });
}

criterion_group!(benches, bench_compare_strings, bench_sort_parsed, bench_upload);
criterion_main!(benches);
