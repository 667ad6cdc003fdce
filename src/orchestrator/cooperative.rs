//! Cooperative strategy: one task, many interleaved units
//!
//! `join_all` polls every unit future from the calling task, so units only
//! yield to each other at `.await` points inside the fetcher. Extraction and the
//! (synchronous) store write always run to completion without interleaving.

use crate::pipeline::{run_unit, Fetcher, UnitOutcome};
use crate::storage::PageStore;
use futures::future::join_all;
use std::time::Duration;

pub(crate) async fn run(
    fetcher: &Fetcher,
    store: &dyn PageStore,
    units: &[Vec<String>],
    timeout: Duration,
) -> Vec<UnitOutcome> {
    let tasks = units
        .iter()
        .map(|unit| run_unit(fetcher, store, unit, timeout));

    join_all(tasks).await.into_iter().flatten().collect()
}
