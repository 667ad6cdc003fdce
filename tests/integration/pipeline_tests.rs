//! Integration tests for the local orchestrator
//!
//! These tests use wiremock to serve fixed HTML per URL and run the full
//! Fetcher -> Extractor -> Store cycle under every strategy. The process-pool
//! strategy spawns the real `pagetide` binary.

use pagetide::config::FetcherConfig;
use pagetide::orchestrator::{Orchestrator, OrchestratorSettings, Strategy};
use pagetide::pipeline::{FetchError, UnitError};
use pagetide::storage::{PageStore, SqlitePageStore};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGES: usize = 8;

/// Mounts `/page/{i}` with a distinct title, plus `/broken` answering 500
async fn start_site() -> MockServer {
    let server = MockServer::start().await;

    for i in 0..PAGES {
        Mock::given(method("GET"))
            .and(path(format!("/page/{}", i)))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "<html><head><title>  Page {}  </title></head><body></body></html>",
                i
            )))
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/untitled"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body>no title here</body></html>"),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    server
}

fn page_urls(server: &MockServer) -> Vec<String> {
    let mut urls: Vec<String> = (0..PAGES)
        .map(|i| format!("{}/page/{}", server.uri(), i))
        .collect();
    urls.push(format!("{}/untitled", server.uri()));
    urls
}

fn orchestrator(db: &Path, timeout_ms: u64) -> (Orchestrator, Arc<SqlitePageStore>) {
    let store = Arc::new(SqlitePageStore::open(db, Duration::from_secs(5)).unwrap());
    let settings = OrchestratorSettings {
        fetcher: FetcherConfig {
            timeout_ms,
            connect_timeout_ms: 2_000,
            user_agent: "pagetide-test".to_string(),
        },
        database_path: db.to_path_buf(),
        busy_timeout: Duration::from_secs(5),
        worker_program: env!("CARGO_BIN_EXE_pagetide").into(),
    };

    (Orchestrator::new(settings, store.clone()).unwrap(), store)
}

fn contents(store: &SqlitePageStore) -> BTreeSet<(String, String)> {
    store
        .list()
        .unwrap()
        .into_iter()
        .map(|page| (page.url, page.title))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_strategies_converge_on_same_store_contents() {
    let server = start_site().await;
    let urls = page_urls(&server);

    let mut results = Vec::new();
    for strategy in Strategy::all() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, store) = orchestrator(&dir.path().join("pages.db"), 5_000);

        let report = orchestrator.run(&urls, strategy, 3).await;

        assert_eq!(report.succeeded.len(), urls.len(), "{}: {:?}", strategy, report.failed);
        assert!(report.failed.is_empty());
        results.push((strategy, contents(&store)));
    }

    let (_, expected) = &results[0];
    assert_eq!(expected.len(), urls.len());
    assert!(expected.contains(&(format!("{}/page/3", server.uri()), "Page 3".to_string())));
    assert!(expected.contains(&(format!("{}/untitled", server.uri()), "No title".to_string())));

    for (strategy, actual) in &results[1..] {
        assert_eq!(actual, expected, "{} diverged", strategy);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_partial_failure_is_isolated() {
    let server = start_site().await;
    let mut urls = page_urls(&server);
    let broken = format!("{}/broken", server.uri());
    let refused = "http://127.0.0.1:1/".to_string();
    urls.insert(2, broken.clone());
    urls.push(refused.clone());

    for strategy in Strategy::all() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, store) = orchestrator(&dir.path().join("pages.db"), 5_000);

        // A single unit, so the bad URLs sit between good ones
        let report = orchestrator.run(&urls, strategy, 1).await;

        assert_eq!(report.succeeded.len(), urls.len() - 2, "{}", strategy);
        assert_eq!(report.failed.len(), 2, "{}", strategy);

        let failed: Vec<&(String, UnitError)> = report.failed.iter().collect();
        assert!(failed.iter().any(|(url, err)| url == &broken
            && *err == UnitError::Fetch(FetchError::NonSuccessStatus(500))));
        assert!(failed.iter().any(|(url, err)| url == &refused
            && matches!(err, UnitError::Fetch(_))));

        assert_eq!(store.count().unwrap(), (urls.len() - 2) as u64);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rerun_keeps_one_record_per_url() {
    let server = start_site().await;
    let urls = page_urls(&server);

    let dir = TempDir::new().unwrap();
    let (orchestrator, store) = orchestrator(&dir.path().join("pages.db"), 5_000);

    // Every strategy writes to the same database
    for strategy in Strategy::all() {
        let report = orchestrator.run(&urls, strategy, 4).await;
        assert!(report.failed.is_empty(), "{}: {:?}", strategy, report.failed);
    }

    assert_eq!(store.count().unwrap(), urls.len() as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timeout_is_enforced_for_every_strategy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hang"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(60)))
        .mount(&server)
        .await;

    let urls = vec![format!("{}/hang", server.uri())];

    for strategy in Strategy::all() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, store) = orchestrator(&dir.path().join("pages.db"), 300);

        let started = Instant::now();
        let report = orchestrator.run(&urls, strategy, 1).await;

        assert!(started.elapsed() < Duration::from_secs(10), "{} overran", strategy);
        assert_eq!(
            report.failed,
            vec![(urls[0].clone(), UnitError::Fetch(FetchError::Timeout))],
            "{}",
            strategy
        );
        assert_eq!(store.count().unwrap(), 0);
    }
}

#[tokio::test]
async fn test_report_becomes_run_record() {
    let server = start_site().await;
    let urls = page_urls(&server);

    let dir = TempDir::new().unwrap();
    let (orchestrator, store) = orchestrator(&dir.path().join("pages.db"), 5_000);

    let report = orchestrator.run(&urls, Strategy::Cooperative, 2).await;
    store.record_run(&report.to_run_record("abc123")).unwrap();

    let runs = store.list_runs(5).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].strategy, "cooperative");
    assert_eq!(runs[0].width, 2);
    assert_eq!(runs[0].succeeded, urls.len());
    assert_eq!(runs[0].config_hash, "abc123");
}
