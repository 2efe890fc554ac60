//! Search index benchmarks
//!
//! 1. Index build for a synthetic repository
//! 2. Query latency by corpus size
//! 3. Structure walk of a generated tree

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use repolens_mcp::repolens::RepositoryIdentifier;
use repolens_mcp::repolens::LocalRepository;
use repolens_mcp::repolens::search_index::{SearchIndex, SourceDocument, SourceKind};

const WORDS: [&str; 12] = [
    "runtime", "scheduler", "configuration", "widget", "parser", "cache", "network", "timeout",
    "install", "release", "panic", "thread",
];

fn synthetic_documents(count: usize) -> Vec<SourceDocument> {
    (0..count)
        .map(|i| {
            let body: Vec<&str> = (0..80).map(|j| WORDS[(i * 7 + j * 3) % WORDS.len()]).collect();
            SourceDocument {
                source_kind: if i % 3 == 0 {
                    SourceKind::Issue
                } else {
                    SourceKind::Doc
                },
                source_id: format!("doc-{}", i),
                title: format!("{} {}", WORDS[i % WORDS.len()], i),
                body: body.join(" "),
                url: format!("https://github.com/bench/repo/{}", i),
                updated_at: Some(Utc::now()),
            }
        })
        .collect()
}

fn bench_index_build(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let id = RepositoryIdentifier::parse("bench/repo").unwrap();
    let documents = synthetic_documents(500);

    c.bench_function("index_build_500", |b| {
        b.to_async(&rt).iter(|| async {
            let dir = tempfile::tempdir().unwrap();
            let index = SearchIndex::new(dir.path().to_path_buf());
            index.build(&id, "g1", documents.clone()).await.unwrap();
        });
    });
}

fn bench_query(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let id = RepositoryIdentifier::parse("bench/repo").unwrap();
    let mut group = c.benchmark_group("query");

    for size in [100, 1_000, 5_000] {
        let dir = tempfile::tempdir().unwrap();
        let index = SearchIndex::new(dir.path().to_path_buf());
        rt.block_on(index.build(&id, "g1", synthetic_documents(size)))
            .unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.to_async(&rt).iter(|| async {
                let hits = index
                    .query(&id, "g1", black_box("scheduler timeout"), 10)
                    .await
                    .unwrap();
                black_box(hits);
            });
        });
    }
    group.finish();
}

fn bench_walk(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    for d in 0..20 {
        let sub = dir.path().join(format!("module{}/nested", d));
        std::fs::create_dir_all(&sub).unwrap();
        for f in 0..25 {
            std::fs::write(sub.join(format!("file{}.rs", f)), "fn f() {}").unwrap();
        }
    }
    let repo = LocalRepository::new(dir.path().to_path_buf());

    c.bench_function("walk_500_files", |b| {
        b.iter(|| black_box(repo.walk("", 4).unwrap()));
    });
}

criterion_group!(benches, bench_index_build, bench_query, bench_walk);
criterion_main!(benches);
