//! Thread-pool strategy: one OS thread per unit
//!
//! Each thread drives its unit on a private current-thread runtime with its own
//! HTTP client, and all threads write through the shared page store. The store
//! is the only synchronization point.

use crate::config::FetcherConfig;
use crate::orchestrator::fail_unit;
use crate::pipeline::{run_unit, Fetcher, UnitOutcome};
use crate::storage::PageStore;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub(crate) async fn run(
    fetcher: FetcherConfig,
    store: Arc<dyn PageStore>,
    units: Vec<Vec<String>>,
    timeout: Duration,
) -> Vec<UnitOutcome> {
    let all_urls: Vec<String> = units.concat();

    // The scoped threads block, so keep them off the async workers
    let task =
        tokio::task::spawn_blocking(move || run_threads(&fetcher, store.as_ref(), &units, timeout));

    match task.await {
        Ok(outcomes) => outcomes,
        Err(err) => {
            tracing::error!(error = %err, "thread pool supervisor failed");
            fail_unit(&all_urls, &format!("thread pool supervisor failed: {}", err))
        }
    }
}

fn run_threads(
    fetcher: &FetcherConfig,
    store: &dyn PageStore,
    units: &[Vec<String>],
    timeout: Duration,
) -> Vec<UnitOutcome> {
    thread::scope(|scope| {
        let handles: Vec<_> = units
            .iter()
            .enumerate()
            .map(|(i, unit)| {
                let handle = thread::Builder::new()
                    .name(format!("pagetide-unit-{}", i))
                    .spawn_scoped(scope, move || run_on_thread(fetcher, store, unit, timeout));
                (unit, handle)
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|(unit, handle)| match handle {
                Ok(handle) => handle
                    .join()
                    .unwrap_or_else(|_| fail_unit(unit, "unit thread panicked")),
                Err(err) => fail_unit(unit, &format!("failed to spawn unit thread: {}", err)),
            })
            .collect()
    })
}

fn run_on_thread(
    fetcher: &FetcherConfig,
    store: &dyn PageStore,
    unit: &[String],
    timeout: Duration,
) -> Vec<UnitOutcome> {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => return fail_unit(unit, &format!("failed to build runtime: {}", err)),
    };

    // A reqwest client is bound to the runtime that drives its connections
    let fetcher = match Fetcher::new(fetcher) {
        Ok(fetcher) => fetcher,
        Err(err) => return fail_unit(unit, &format!("failed to build fetcher: {}", err)),
    };

    runtime.block_on(run_unit(&fetcher, store, unit, timeout))
}
