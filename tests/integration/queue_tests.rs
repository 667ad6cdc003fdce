//! Integration tests for the durable job queue and its workers

use pagetide::config::FetcherConfig;
use pagetide::pipeline::{process_url, Fetcher};
use pagetide::queue::{
    JobQueue, JobRequest, QueueOptions, SqliteJobQueue, Worker, WorkerOptions, WorkerPool,
};
use pagetide::state::JobStatus;
use pagetide::storage::{open_pool, PageStore, SqlitePageStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Setup {
    _dir: TempDir,
    queue: Arc<SqliteJobQueue>,
    store: Arc<SqlitePageStore>,
    fetcher: Fetcher,
}

fn setup(options: QueueOptions) -> Setup {
    let dir = TempDir::new().unwrap();
    let pool = open_pool(&dir.path().join("pagetide.db"), Duration::from_secs(5)).unwrap();

    Setup {
        queue: Arc::new(SqliteJobQueue::from_pool(pool.clone(), options)),
        store: Arc::new(SqlitePageStore::from_pool(pool)),
        fetcher: Fetcher::new(&FetcherConfig::default()).unwrap(),
        _dir: dir,
    }
}

fn worker_options() -> WorkerOptions {
    WorkerOptions {
        poll_interval: Duration::from_millis(20),
        job_timeout: Duration::from_secs(5),
        fetch_timeout: Duration::from_secs(2),
    }
}

#[tokio::test]
async fn test_crash_before_ack_is_redelivered_without_duplicates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<title>Redelivered</title>"),
        )
        .expect(2)
        .mount(&server)
        .await;

    let setup = setup(QueueOptions {
        max_attempts: 3,
        visibility_timeout: Duration::from_millis(100),
    });
    let url = format!("{}/article", server.uri());
    let job = setup.queue.enqueue(&JobRequest { url: url.clone() }).unwrap();

    // First delivery: the pipeline runs to completion but the worker dies before acking
    let leased = setup.queue.dequeue().unwrap().unwrap();
    process_url(
        &setup.fetcher,
        setup.store.as_ref(),
        &leased.url,
        Duration::from_secs(2),
    )
    .await
    .unwrap();

    // Still leased, so nobody else may take it yet
    assert_eq!(setup.queue.dequeue().unwrap(), None);

    tokio::time::sleep(Duration::from_millis(200)).await;

    let worker = Worker::new(
        1,
        setup.queue.clone(),
        setup.store.clone(),
        setup.fetcher.clone(),
        worker_options(),
    );
    let outcome = worker.run_once().await.unwrap().unwrap();
    assert_eq!(outcome.id, job.id);
    assert_eq!(outcome.status, JobStatus::Done);

    let pages = setup.store.list().unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].url, url);
    assert_eq!(pages[0].title, "Redelivered");

    let job = setup.queue.get(&job.id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.attempt_count, 1);

    server.verify().await;
}

#[tokio::test]
async fn test_retry_exhaustion_stops_redelivery() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let setup = setup(QueueOptions {
        max_attempts: 3,
        visibility_timeout: Duration::from_secs(60),
    });
    let job = setup
        .queue
        .enqueue(&JobRequest {
            url: format!("{}/down", server.uri()),
        })
        .unwrap();

    let worker = Worker::new(
        1,
        setup.queue.clone(),
        setup.store.clone(),
        setup.fetcher.clone(),
        worker_options(),
    );

    let mut statuses = Vec::new();
    while let Some(outcome) = worker.run_once().await.unwrap() {
        statuses.push(outcome.status);
    }

    assert_eq!(
        statuses,
        vec![JobStatus::Pending, JobStatus::Pending, JobStatus::Failed]
    );
    assert_eq!(worker.run_once().await.unwrap(), None);

    let job = setup.queue.get(&job.id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempt_count, 3);
    assert_eq!(setup.store.count().unwrap(), 0);

    server.verify().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_competing_workers_process_each_job_once() {
    let server = MockServer::start().await;
    for i in 0..20 {
        Mock::given(method("GET"))
            .and(path(format!("/item/{}", i)))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(format!("<title>Item {}</title>", i)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let setup = setup(QueueOptions {
        max_attempts: 3,
        visibility_timeout: Duration::from_secs(60),
    });
    for i in 0..20 {
        setup
            .queue
            .enqueue(&JobRequest {
                url: format!("{}/item/{}", server.uri(), i),
            })
            .unwrap();
    }

    let pool = WorkerPool::spawn(
        4,
        setup.queue.clone(),
        setup.store.clone(),
        setup.fetcher.clone(),
        worker_options(),
    );

    let deadline = Instant::now() + Duration::from_secs(20);
    while Instant::now() < deadline {
        let counts = setup.queue.counts().unwrap();
        if counts.get(&JobStatus::Done) == Some(&20) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    pool.shutdown().await;

    assert_eq!(setup.queue.counts().unwrap().get(&JobStatus::Done), Some(&20));
    assert_eq!(setup.store.count().unwrap(), 20);
    server.verify().await;
}
