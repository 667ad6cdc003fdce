//! Queue workers
//!
//! A worker loops: lease a job, run the pipeline under a per-job timeout, then
//! ack on success or record a failed attempt. Retries come from the queue
//! itself: a failed attempt below the limit puts the job back to pending.

use crate::config::Config;
use crate::pipeline::{process_url, Fetcher};
use crate::queue::{JobId, JobQueue, QueueError, QueueResult};
use crate::state::JobStatus;
use crate::storage::PageStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Sleep between polls of an empty queue
    pub poll_interval: Duration,
    /// Upper bound on one job, fetch and store included
    pub job_timeout: Duration,
    /// Per-request fetch timeout
    pub fetch_timeout: Duration,
}

impl WorkerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.queue.poll_interval_ms),
            job_timeout: Duration::from_millis(config.queue.job_timeout_ms),
            fetch_timeout: Duration::from_millis(config.fetcher.timeout_ms),
        }
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// What happened to one leased job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub id: JobId,
    pub url: String,
    /// Status after this attempt: done, pending (will retry) or failed.
    /// Running means the lease ran out first and another worker owns the job.
    pub status: JobStatus,
    pub title: Option<String>,
    pub error: Option<String>,
}

pub struct Worker {
    id: usize,
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn PageStore>,
    fetcher: Fetcher,
    options: WorkerOptions,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn PageStore>,
        fetcher: Fetcher,
        options: WorkerOptions,
    ) -> Self {
        Self {
            id,
            queue,
            store,
            fetcher,
            options,
        }
    }

    /// Processes at most one job
    ///
    /// Returns `Ok(None)` when the queue had nothing to hand out.
    pub async fn run_once(&self) -> QueueResult<Option<JobOutcome>> {
        let Some(job) = self.queue.dequeue()? else {
            return Ok(None);
        };
        let Some(lease) = job.lease else {
            return Err(QueueError::Corrupt(format!("job {} leased without a token", job.id)));
        };

        tracing::debug!(
            worker = self.id,
            job_id = %job.id,
            url = %job.url,
            attempt = job.attempt_count + 1,
            "job leased"
        );

        let result = tokio::time::timeout(
            self.options.job_timeout,
            process_url(
                &self.fetcher,
                self.store.as_ref(),
                &job.url,
                self.options.fetch_timeout,
            ),
        )
        .await;

        let error = match result {
            Ok(Ok(record)) => {
                let status = match self.queue.ack(&job.id, &lease) {
                    Ok(()) => {
                        info!(worker = self.id, job_id = %job.id, title = %record.title, "job done");
                        JobStatus::Done
                    }
                    Err(QueueError::LeaseLost(_)) => {
                        self.lease_lost(&job.id);
                        JobStatus::Running
                    }
                    Err(err) => return Err(err),
                };
                return Ok(Some(JobOutcome {
                    id: job.id,
                    url: job.url,
                    status,
                    title: Some(record.title),
                    error: None,
                }));
            }
            Ok(Err(err)) => err.to_string(),
            Err(_elapsed) => "job timed out".to_string(),
        };

        let status = match self.queue.fail(&job.id, &lease, &error) {
            Ok(status) => status,
            Err(QueueError::LeaseLost(_)) => {
                self.lease_lost(&job.id);
                JobStatus::Running
            }
            Err(err) => return Err(err),
        };
        if status.is_terminal() {
            error!(worker = self.id, job_id = %job.id, error = %error, "job failed, no attempts left");
        } else if status == JobStatus::Pending {
            warn!(worker = self.id, job_id = %job.id, error = %error, "job attempt failed, will retry");
        }

        Ok(Some(JobOutcome {
            id: job.id,
            url: job.url,
            status,
            title: None,
            error: Some(error),
        }))
    }

    fn lease_lost(&self, id: &JobId) {
        warn!(worker = self.id, job_id = %id, "lease expired before the job settled, leaving it to its new owner");
    }

    /// Drains the queue until `shutdown` flips to true
    ///
    /// A job already leased when shutdown is signalled runs to completion.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(worker = self.id, "worker started");

        while !*shutdown.borrow() {
            let idle = match self.run_once().await {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(err) => {
                    error!(worker = self.id, error = %err, "queue error");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.options.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!(worker = self.id, "worker stopped");
    }
}

/// A fixed set of workers sharing one queue and one store
pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `count` workers on the current runtime
    pub fn spawn(
        count: usize,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn PageStore>,
        fetcher: Fetcher,
        options: WorkerOptions,
    ) -> Self {
        let (shutdown, receiver) = watch::channel(false);

        let handles = (0..count)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    Arc::clone(&queue),
                    Arc::clone(&store),
                    fetcher.clone(),
                    options,
                );
                tokio::spawn(worker.run(receiver.clone()))
            })
            .collect();

        info!(count, "worker pool started");
        Self { shutdown, handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signals every worker and waits for in-flight jobs to finish
    pub async fn shutdown(self) {
        // Workers hold receivers, so send only fails if they are all gone already
        let _ = self.shutdown.send(true);

        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(error = %err, "worker task failed");
            }
        }
        info!("worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetcherConfig;
    use crate::queue::{JobRequest, QueueOptions, SqliteJobQueue};
    use crate::storage::{open_pool, SqlitePageStore};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        _dir: TempDir,
        queue: Arc<SqliteJobQueue>,
        store: Arc<SqlitePageStore>,
    }

    impl Harness {
        fn new(max_attempts: u32) -> Self {
            Self::with_options(QueueOptions {
                max_attempts,
                visibility_timeout: Duration::from_secs(60),
            })
        }

        fn with_options(options: QueueOptions) -> Self {
            let dir = TempDir::new().unwrap();
            let pool = open_pool(&dir.path().join("pagetide.db"), Duration::from_secs(5)).unwrap();
            Self {
                _dir: dir,
                queue: Arc::new(SqliteJobQueue::from_pool(pool.clone(), options)),
                store: Arc::new(SqlitePageStore::from_pool(pool)),
            }
        }

        fn worker(&self, options: WorkerOptions) -> Worker {
            Worker::new(
                0,
                self.queue.clone(),
                self.store.clone(),
                Fetcher::new(&FetcherConfig::default()).unwrap(),
                options,
            )
        }

        fn enqueue(&self, url: String) -> JobId {
            self.queue.enqueue(&JobRequest { url }).unwrap().id
        }
    }

    fn fast_options() -> WorkerOptions {
        WorkerOptions {
            poll_interval: Duration::from_millis(20),
            job_timeout: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_run_once_on_empty_queue() {
        let harness = Harness::new(3);
        let worker = harness.worker(fast_options());
        assert_eq!(worker.run_once().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_successful_job_is_stored_and_acked() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><head><title>Queued</title></head></html>"),
            )
            .mount(&server)
            .await;

        let harness = Harness::new(3);
        let url = format!("{}/page", server.uri());
        let id = harness.enqueue(url.clone());

        let outcome = harness
            .worker(fast_options())
            .run_once()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.id, id);
        assert_eq!(outcome.status, JobStatus::Done);
        assert_eq!(outcome.title.as_deref(), Some("Queued"));
        assert_eq!(harness.store.get(&url).unwrap().unwrap().title, "Queued");
        assert_eq!(
            harness.queue.get(&id).unwrap().unwrap().status,
            JobStatus::Done
        );
    }

    #[tokio::test]
    async fn test_failing_job_retries_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let harness = Harness::new(2);
        let id = harness.enqueue(format!("{}/broken", server.uri()));
        let worker = harness.worker(fast_options());

        let first = worker.run_once().await.unwrap().unwrap();
        assert_eq!(first.status, JobStatus::Pending);

        let second = worker.run_once().await.unwrap().unwrap();
        assert_eq!(second.status, JobStatus::Failed);

        assert_eq!(worker.run_once().await.unwrap(), None);

        let job = harness.queue.get(&id).unwrap().unwrap();
        assert_eq!(job.attempt_count, 2);
        assert!(job.last_error.unwrap().contains("500"));
        assert_eq!(harness.store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_job_timeout_counts_as_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let harness = Harness::new(3);
        harness.enqueue(format!("{}/slow", server.uri()));

        let worker = harness.worker(WorkerOptions {
            poll_interval: Duration::from_millis(20),
            job_timeout: Duration::from_millis(200),
            fetch_timeout: Duration::from_secs(10),
        });

        let started = std::time::Instant::now();
        let outcome = worker.run_once().await.unwrap().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(outcome.status, JobStatus::Pending);
        assert_eq!(outcome.error.as_deref(), Some("job timed out"));
    }

    #[tokio::test]
    async fn test_late_worker_leaves_reclaimed_job_to_new_owner() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<title>Slow</title>")
                    .set_delay(Duration::from_millis(400)),
            )
            .mount(&server)
            .await;

        let harness = Harness::with_options(QueueOptions {
            max_attempts: 3,
            visibility_timeout: Duration::from_millis(100),
        });
        let id = harness.enqueue(format!("{}/slow", server.uri()));
        let worker = harness.worker(fast_options());

        // A second consumer re-leases the job while the first is still fetching
        let (outcome, relet) = tokio::join!(worker.run_once(), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            harness.queue.dequeue().unwrap().unwrap()
        });

        let outcome = outcome.unwrap().unwrap();
        assert_eq!(outcome.id, id);
        assert_eq!(outcome.status, JobStatus::Running);
        assert_eq!(
            harness.queue.get(&id).unwrap().unwrap().status,
            JobStatus::Running
        );

        harness.queue.ack(&relet.id, &relet.lease.unwrap()).unwrap();
        assert_eq!(harness.queue.get(&id).unwrap().unwrap().status, JobStatus::Done);
    }

    #[tokio::test]
    async fn test_pool_drains_queue_and_shuts_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<title>Pooled</title>"),
            )
            .mount(&server)
            .await;

        let harness = Harness::new(3);
        for i in 0..6 {
            harness.enqueue(format!("{}/p{}", server.uri(), i));
        }

        let pool = WorkerPool::spawn(
            3,
            harness.queue.clone(),
            harness.store.clone(),
            Fetcher::new(&FetcherConfig::default()).unwrap(),
            fast_options(),
        );
        assert_eq!(pool.len(), 3);

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        loop {
            let done = harness
                .queue
                .counts()
                .unwrap()
                .get(&JobStatus::Done)
                .copied()
                .unwrap_or(0);
            if done == 6 || std::time::Instant::now() > deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        pool.shutdown().await;
        assert_eq!(harness.store.count().unwrap(), 6);
    }
}
