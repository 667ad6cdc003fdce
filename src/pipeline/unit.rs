//! One pass of Fetcher -> Extractor -> Store
//!
//! A *unit* is an ordered slice of URLs processed one after another. Every
//! concurrency strategy and every queue worker funnels through [`process_url`].

use crate::pipeline::{extract_title, FetchError, Fetcher};
use crate::storage::{PageRecord, PageStore, StoreError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Why a URL failed to make it into the page store
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum UnitError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("store failed: {0}")]
    Store(#[from] StoreError),

    /// The thread or process running the unit failed before reporting
    #[error("worker failed: {0}")]
    Worker(String),
}

/// Result of processing one URL, as reported by a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOutcome {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<UnitError>,
}

impl UnitOutcome {
    pub fn success(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: Some(title.into()),
            error: None,
        }
    }

    pub fn failure(url: impl Into<String>, error: UnitError) -> Self {
        Self {
            url: url.into(),
            title: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Fetches `url`, extracts its title and upserts the record
///
/// The store call happens only after the network work is finished, so no
/// store lock is ever held across a fetch.
pub async fn process_url(
    fetcher: &Fetcher,
    store: &dyn PageStore,
    url: &str,
    timeout: Duration,
) -> Result<PageRecord, UnitError> {
    let html = fetcher.fetch_result(url, timeout).await.into_html()?;
    let title = extract_title(&html);

    let record = PageRecord::new(url, title);
    store.upsert(&record)?;

    tracing::debug!(url, title = %record.title, "stored page");
    Ok(record)
}

/// Processes `urls` sequentially, recording every outcome
///
/// A failing URL never stops the rest of the unit.
pub async fn run_unit(
    fetcher: &Fetcher,
    store: &dyn PageStore,
    urls: &[String],
    timeout: Duration,
) -> Vec<UnitOutcome> {
    let mut outcomes = Vec::with_capacity(urls.len());

    for url in urls {
        match process_url(fetcher, store, url, timeout).await {
            Ok(record) => outcomes.push(UnitOutcome::success(url, record.title)),
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "unit item failed");
                outcomes.push(UnitOutcome::failure(url, err));
            }
        }
    }

    outcomes
}
