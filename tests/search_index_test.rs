//! Search index build and query behaviour

mod common;

use chrono::{TimeZone, Utc};
use common::{demo_id, harness};
use repolens_mcp::repolens::errors::RepositoryError;
use repolens_mcp::repolens::search_index::{SearchIndex, SourceDocument, SourceKind};
use repolens_mcp::repolens::RepositoryIdentifier;

fn doc(kind: SourceKind, id: &str, title: &str, body: &str, day: Option<u32>) -> SourceDocument {
    SourceDocument {
        source_kind: kind,
        source_id: id.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        url: format!("https://github.com/octo/demo/{}", id),
        updated_at: day.map(|d| Utc.with_ymd_and_hms(2024, 3, d, 0, 0, 0).unwrap()),
    }
}

fn corpus() -> Vec<SourceDocument> {
    vec![
        doc(
            SourceKind::Readme,
            "README.md",
            "README.md",
            "Demo is a widget runtime. Configure the runtime with demo.toml.",
            Some(1),
        ),
        doc(
            SourceKind::Doc,
            "docs/install.md",
            "install.md",
            "Install with cargo install demo.",
            Some(1),
        ),
        doc(
            SourceKind::Issue,
            "7",
            "#7 Runtime panics on reload",
            "Reloading the runtime configuration panics.",
            Some(9),
        ),
        doc(
            SourceKind::PullRequest,
            "8",
            "#8 Fix reload panic",
            "Reload no longer panics.",
            Some(10),
        ),
    ]
}

fn index() -> (tempfile::TempDir, SearchIndex, RepositoryIdentifier) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let index = SearchIndex::new(dir.path().join("index"));
    let id = RepositoryIdentifier::parse("octo/demo").unwrap();
    (dir, index, id)
}

#[tokio::test]
async fn test_query_ranks_matching_documents() {
    let (_dir, index, id) = index();
    index.build(&id, "g1", corpus()).await.expect("build");
    assert!(index.is_built(&id, "g1"));

    let hits = index.query(&id, "g1", "runtime", 10).await.expect("query");
    let ids: Vec<&str> = hits.iter().map(|h| h.source_id.as_str()).collect();
    assert!(ids.contains(&"README.md"));
    assert!(ids.contains(&"7"));
    assert!(!ids.contains(&"docs/install.md"));
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(hits.iter().all(|h| h.repository == "octo/demo"));
}

#[tokio::test]
async fn test_stemming_matches_word_variants() {
    let (_dir, index, id) = index();
    index.build(&id, "g1", corpus()).await.expect("build");

    let hits = index.query(&id, "g1", "installing", 10).await.expect("query");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source_kind, SourceKind::Doc);
    assert_eq!(hits[0].url, "https://github.com/octo/demo/docs/install.md");
}

#[tokio::test]
async fn test_same_query_twice_gives_same_order() {
    let (_dir, index, id) = index();
    index.build(&id, "g1", corpus()).await.expect("build");

    let first = index.query(&id, "g1", "reload runtime panic", 10).await.unwrap();
    let second = index.query(&id, "g1", "reload runtime panic", 10).await.unwrap();
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[tokio::test]
async fn test_equal_scores_break_ties_by_recency_then_title() {
    let (_dir, index, id) = index();
    let body = "shared words about caching";
    let docs = vec![
        doc(SourceKind::Doc, "docs/a.md", "aaa", body, None),
        doc(SourceKind::Doc, "docs/b.md", "bbb", body, Some(2)),
        doc(SourceKind::Doc, "docs/c.md", "ccc", body, Some(5)),
        doc(SourceKind::Doc, "docs/d.md", "ddd", body, None),
    ];
    index.build(&id, "g1", docs).await.expect("build");

    let hits = index.query(&id, "g1", "caching", 10).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.source_id.as_str()).collect();
    assert_eq!(ids, vec!["docs/c.md", "docs/b.md", "docs/a.md", "docs/d.md"]);
}

#[tokio::test]
async fn test_limit_truncates_and_must_be_positive() {
    let (_dir, index, id) = index();
    index.build(&id, "g1", corpus()).await.expect("build");

    let hits = index.query(&id, "g1", "runtime reload", 1).await.unwrap();
    assert_eq!(hits.len(), 1);

    for limit in [0, -3] {
        let err = index.query(&id, "g1", "runtime", limit).await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidArgument(_)));
    }
    let err = index.query(&id, "g1", "   ", 5).await.unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_duplicate_sources_are_indexed_once() {
    let (_dir, index, id) = index();
    let mut docs = corpus();
    docs.push(doc(
        SourceKind::Issue,
        "7",
        "#7 Runtime panics on reload",
        "Reloading the runtime configuration panics.",
        Some(9),
    ));
    index.build(&id, "g1", docs).await.expect("build");

    let hits = index.query(&id, "g1", "reloading", 10).await.unwrap();
    let issues = hits.iter().filter(|h| h.source_kind == SourceKind::Issue).count();
    assert_eq!(issues, 1);
}

#[tokio::test]
async fn test_rebuild_replaces_previous_content() {
    let (_dir, index, id) = index();
    index.build(&id, "g1", corpus()).await.expect("build");
    index
        .build(
            &id,
            "g1",
            vec![doc(SourceKind::Readme, "README.md", "README.md", "Totally new text.", None)],
        )
        .await
        .expect("rebuild");

    assert!(index.query(&id, "g1", "runtime", 10).await.unwrap().is_empty());
    assert_eq!(index.query(&id, "g1", "totally", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_index_and_removal() {
    let (_dir, index, id) = index();
    let err = index.query(&id, "nope", "runtime", 10).await.unwrap_err();
    assert!(matches!(err, RepositoryError::CacheCorrupted(_)));

    index.build(&id, "g1", corpus()).await.expect("build");
    index.remove_generation(&id, "g1");
    assert!(!index.is_built(&id, "g1"));
}

#[tokio::test]
async fn test_body_excerpt_is_bounded() {
    let (_dir, index, id) = index();
    let long_body = format!("needle {}", "word ".repeat(400));
    index
        .build(&id, "g1", vec![doc(SourceKind::Doc, "docs/long.md", "long.md", &long_body, None)])
        .await
        .expect("build");

    let hits = index.query(&id, "g1", "needle", 10).await.unwrap();
    assert_eq!(hits[0].body_excerpt.chars().count(), 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_builds_of_one_generation_run_once() {
    let h = harness();
    let id = demo_id();
    let fresh = h.manager.ensure_fresh(&id).await.expect("fetch");
    let snapshot = h.manager.load_snapshot(&fresh.entry).expect("snapshot");

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..6 {
        let manager = h.manager.clone();
        let id = id.clone();
        let entry = fresh.entry.clone();
        let snapshot = snapshot.clone();
        tasks.spawn(async move {
            manager
                .search_index()
                .ensure_built(&id, &entry, &snapshot)
                .await
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.expect("task panicked").expect("build failed");
    }

    let index = h.manager.search_index();
    assert_eq!(index.builds_completed(), 1);
    assert!(index.is_built(&id, &fresh.entry.generation));
}

#[tokio::test]
async fn test_cleared_generation_is_not_indexed() {
    let h = harness();
    let id = demo_id();
    let fresh = h.manager.ensure_fresh(&id).await.expect("fetch");
    let snapshot = h.manager.load_snapshot(&fresh.entry).expect("snapshot");
    h.manager.clear(&id).await.expect("clear");

    let err = h
        .manager
        .search_index()
        .ensure_built(&id, &fresh.entry, &snapshot)
        .await
        .unwrap_err();

    assert!(matches!(err, RepositoryError::CacheCorrupted(_)));
    assert_eq!(h.manager.search_index().builds_completed(), 0);
    assert!(!h.dir.path().join("index").join("octo__demo").exists());
}

#[tokio::test]
async fn test_replaced_generation_is_not_indexed() {
    let h = harness();
    let id = demo_id();
    let old = h.manager.ensure_fresh(&id).await.expect("fetch");
    let snapshot = h.manager.load_snapshot(&old.entry).expect("snapshot");
    h.clock.advance_seconds(90_000);
    let new = h.manager.ensure_fresh(&id).await.expect("refresh");
    assert_ne!(old.entry.generation, new.entry.generation);

    let err = h
        .manager
        .search_index()
        .ensure_built(&id, &old.entry, &snapshot)
        .await
        .unwrap_err();

    assert!(matches!(err, RepositoryError::CacheCorrupted(_)));
    assert!(!h.manager.search_index().is_built(&id, &old.entry.generation));
}
