//! End-to-end crawl scenarios against local mock servers.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use linkmapper::config::CrawlConfig;
use linkmapper::engine::CrawlEngine;
use linkmapper::models::PageStatus;
use linkmapper::repository::CrawlStore;

fn crawl_config(db: &Path, seeds: Vec<String>) -> CrawlConfig {
    let mut config = CrawlConfig {
        seed_urls: seeds,
        concurrency: 1,
        request_delay: 0.1,
        request_timeout: 5,
        ignore_robots: true,
        database_path: db.to_path_buf(),
        ..Default::default()
    };
    config.validate().expect("valid test config");
    config
}

async fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_page_crawl_records_pages_and_filtered_links() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _root = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("Content-Type", "text/html")
        .with_body(
            r#"<html><body><a href="/a">A</a><a href="https://other.example/x">X</a></body></html>"#,
        )
        .create_async()
        .await;
    let _a = server
        .mock("GET", "/a")
        .with_status(200)
        .with_header("Content-Type", "text/html")
        .with_body("<html><body>leaf</body></html>")
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("crawl.db");
    let config = crawl_config(&db, vec![format!("{base}/")]);
    let store = Arc::new(CrawlStore::open(&db).expect("store"));
    let engine = CrawlEngine::new(config, store.clone()).expect("engine");

    engine.start(&[format!("{base}/")]).await.expect("crawl");

    let root = store
        .page_by_url(&format!("{base}/"))
        .expect("lookup")
        .expect("root row");
    assert_eq!(root.status, PageStatus::Completed);
    assert_eq!(root.status_code, Some(200));

    let leaf = store
        .page_by_url(&format!("{base}/a"))
        .expect("lookup")
        .expect("leaf row");
    assert_eq!(leaf.status, PageStatus::Completed);

    // The external link was host-filtered: no row, no edge.
    assert!(store
        .page_by_url("https://other.example/x")
        .expect("lookup")
        .is_none());
    let edges = store.links_by_source(&format!("{base}/")).expect("edges");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].target_url, format!("{base}/a"));

    assert!(engine.stats().await.pages_crawled >= 1);

    // After a natural completion nothing is left mid-claim.
    let counts = store.queue_counts().expect("counts");
    assert_eq!(counts.processing, 0);
    assert_eq!(counts.queued, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn seedless_run_resumes_a_prepopulated_queue() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let mut mocks = Vec::new();
    for path in ["/one", "/two"] {
        mocks.push(
            server
                .mock("GET", path)
                .with_status(200)
                .with_body("")
                .create_async()
                .await,
        );
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("crawl.db");
    let store = Arc::new(CrawlStore::open(&db).expect("store"));
    store
        .add_to_queue(&[format!("{base}/one"), format!("{base}/two")])
        .expect("preload");

    let mut config = crawl_config(&db, Vec::new());
    config.concurrency = 2;
    let engine = CrawlEngine::new(config, store.clone()).expect("engine");
    engine.start(&[]).await.expect("resume crawl");

    let counts = store.queue_counts().expect("counts");
    assert_eq!(counts.queued, 0);
    assert_eq!(counts.processing, 0);
    assert_eq!(counts.completed, 2);
    assert_eq!(counts.error, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn robots_denial_marks_the_page_without_an_error_log_row() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _robots = server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nDisallow: /private/\n")
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("crawl.db");
    let seed = format!("{base}/private/x");
    let mut config = crawl_config(&db, vec![seed.clone()]);
    config.ignore_robots = false;

    let store = Arc::new(CrawlStore::open(&db).expect("store"));
    let engine = Arc::new(CrawlEngine::new(config, store.clone()).expect("engine"));

    // A run whose only URL is robots-denied never crawls a page, so the
    // workers keep waiting for work; observe the row, then stop the run.
    let runner = {
        let engine = engine.clone();
        let seed = seed.clone();
        tokio::spawn(async move { engine.start(&[seed]).await })
    };

    let denied = {
        let store = store.clone();
        let seed = seed.clone();
        wait_until(Duration::from_secs(10), move || {
            store
                .page_by_url(&seed)
                .ok()
                .flatten()
                .map(|row| row.status == PageStatus::Error)
                .unwrap_or(false)
        })
        .await
    };
    assert!(denied, "page row should reach error state");

    engine.stop();
    let result = runner.await.expect("join");
    assert!(result.is_err(), "stopped runs report cancellation");

    let row = store
        .page_by_url(&seed)
        .expect("lookup")
        .expect("row exists");
    assert_eq!(row.last_error_type.as_deref(), Some("robots_disallowed"));
    // Robots denials do not append to the error log.
    assert_eq!(store.error_log_count().expect("log count"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_workers_complete_every_row_exactly_once() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _pages = server
        .mock("GET", mockito::Matcher::Regex(r"^/p\d+$".to_string()))
        .with_status(200)
        .with_body("")
        .expect_at_least(24)
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("crawl.db");
    let store = Arc::new(CrawlStore::open(&db).expect("store"));
    let urls: Vec<String> = (0..24).map(|i| format!("{base}/p{i}")).collect();
    store.add_to_queue(&urls).expect("preload");

    let mut config = crawl_config(&db, Vec::new());
    config.concurrency = 8;
    let engine = CrawlEngine::new(config, store.clone()).expect("engine");
    engine.start(&[]).await.expect("crawl");

    let counts = store.queue_counts().expect("counts");
    assert_eq!(counts.completed, 24, "every row completed");
    assert_eq!(counts.queued, 0);
    assert_eq!(counts.processing, 0, "no row lost mid-claim");
    assert_eq!(engine.stats().await.pages_crawled, 24);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn redirects_attribute_links_to_the_final_url() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _start = server
        .mock("GET", "/start")
        .with_status(302)
        .with_header("Location", "/landing")
        .create_async()
        .await;
    let _landing = server
        .mock("GET", "/landing")
        .with_status(200)
        .with_header("Content-Type", "text/html")
        .with_body(r#"<html><body><a href="/child">Child</a></body></html>"#)
        .create_async()
        .await;
    let _child = server
        .mock("GET", "/child")
        .with_status(200)
        .with_body("")
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("crawl.db");
    let config = crawl_config(&db, vec![format!("{base}/start")]);
    let store = Arc::new(CrawlStore::open(&db).expect("store"));
    let engine = CrawlEngine::new(config, store.clone()).expect("engine");
    engine.start(&[format!("{base}/start")]).await.expect("crawl");

    // Edges hang off the landing URL, not the redirect source.
    assert!(store
        .links_by_source(&format!("{base}/start"))
        .expect("edges")
        .is_empty());
    let edges = store
        .links_by_source(&format!("{base}/landing"))
        .expect("edges");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].target_url, format!("{base}/child"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn page_limit_stops_the_crawl_and_preserves_the_queue() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let links: String = (0..10)
        .map(|i| format!(r#"<a href="/child{i}">c{i}</a>"#))
        .collect();
    let _root = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("Content-Type", "text/html")
        .with_body(format!("<html><body>{links}</body></html>"))
        .create_async()
        .await;
    let _children = server
        .mock("GET", mockito::Matcher::Regex(r"^/child\d+$".to_string()))
        .with_status(200)
        .with_body("")
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("crawl.db");
    let mut config = crawl_config(&db, vec![format!("{base}/")]);
    config.limit = 3;

    let store = Arc::new(CrawlStore::open(&db).expect("store"));
    let engine = CrawlEngine::new(config, store.clone()).expect("engine");
    engine.start(&[format!("{base}/")]).await.expect("crawl");

    assert_eq!(engine.stats().await.pages_crawled, 3);

    // The remaining children stay queued for a future run.
    let counts = store.queue_counts().expect("counts");
    assert_eq!(counts.completed, 3);
    assert_eq!(counts.queued, 8);
    assert_eq!(counts.processing, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn excluded_urls_gain_neither_rows_nor_edges() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _root = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("Content-Type", "text/html")
        .with_body(
            r#"<html>
            <head>
                <title>Docs Index</title>
                <meta name="description" content="All the docs">
                <link rel="canonical" href="/index">
            </head>
            <body><a href="/keep">Keep</a><a href="/manual.pdf">Manual</a></body>
            </html>"#,
        )
        .create_async()
        .await;
    let _keep = server
        .mock("GET", "/keep")
        .with_status(200)
        .with_body("")
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("crawl.db");
    let mut config = crawl_config(&db, vec![format!("{base}/")]);
    config.exclude_patterns = vec![r"\.pdf$".to_string()];

    let store = Arc::new(CrawlStore::open(&db).expect("store"));
    let engine = CrawlEngine::new(config, store.clone()).expect("engine");
    engine.start(&[format!("{base}/")]).await.expect("crawl");

    // The excluded target was never admitted anywhere.
    assert!(store
        .page_by_url(&format!("{base}/manual.pdf"))
        .expect("lookup")
        .is_none());
    let edges = store.links_by_source(&format!("{base}/")).expect("edges");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].target_url, format!("{base}/keep"));
    assert_eq!(edges[0].anchor_text.as_deref(), Some("Keep"));

    // Parsed metadata lands on the completed row.
    let root = store
        .page_by_url(&format!("{base}/"))
        .expect("lookup")
        .expect("row");
    assert_eq!(root.title.as_deref(), Some("Docs Index"));
    assert_eq!(root.meta_desc.as_deref(), Some("All the docs"));
    assert_eq!(root.canonical_url.as_deref(), Some(format!("{base}/index").as_str()));
    assert!(root.content_hash.is_some());
    assert!(root.ttfb_ms.is_some());
    assert!(root.download_time_ms.is_some());
    assert_eq!(
        root.headers.get("content-type").map(String::as_str),
        Some("text/html")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn status_code_failures_are_pages_not_errors() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _missing = server
        .mock("GET", "/missing")
        .with_status(404)
        .with_header("Content-Type", "text/html")
        .with_body("<html><body>not here</body></html>")
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("crawl.db");
    let config = crawl_config(&db, vec![format!("{base}/missing")]);
    let store = Arc::new(CrawlStore::open(&db).expect("store"));
    let engine = CrawlEngine::new(config, store.clone()).expect("engine");
    engine
        .start(&[format!("{base}/missing")])
        .await
        .expect("crawl");

    let row = store
        .page_by_url(&format!("{base}/missing"))
        .expect("lookup")
        .expect("row");
    assert_eq!(row.status, PageStatus::Completed);
    assert_eq!(row.status_code, Some(404));
    assert_eq!(row.last_error_type, None);
    assert_eq!(store.error_log_count().expect("log"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_hosts_are_recorded_as_errors_and_logged() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("crawl.db");
    // Nothing listens on port 1.
    let seed = "http://127.0.0.1:1/gone".to_string();
    let config = crawl_config(&db, vec![seed.clone()]);
    let store = Arc::new(CrawlStore::open(&db).expect("store"));
    let engine = Arc::new(CrawlEngine::new(config, store.clone()).expect("engine"));

    // The failing URL never increments pages_crawled, so the worker keeps
    // waiting for more work; observe and stop, as an operator would.
    let runner = {
        let engine = engine.clone();
        let seed = seed.clone();
        tokio::spawn(async move { engine.start(&[seed]).await })
    };

    let failed = {
        let store = store.clone();
        let seed = seed.clone();
        wait_until(Duration::from_secs(10), move || {
            store
                .page_by_url(&seed)
                .ok()
                .flatten()
                .map(|row| row.status == PageStatus::Error)
                .unwrap_or(false)
        })
        .await
    };
    assert!(failed, "page row should reach error state");
    engine.stop();
    let _ = runner.await.expect("join");

    let row = store.page_by_url(&seed).expect("lookup").expect("row");
    assert_eq!(row.last_error_type.as_deref(), Some("network_error"));
    assert_eq!(row.retry_count, 1);

    // Network failures also append to the error log.
    assert_eq!(store.error_log_count().expect("log"), 1);
    let entries = store.recent_errors(5).expect("entries");
    assert_eq!(entries[0].error_type, "network_error");
    assert!(engine.stats().await.error_count >= 1);
}
