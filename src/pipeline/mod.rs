//! Fetch-parse-persist pipeline
//!
//! This module contains the per-URL work shared by every execution mode:
//! - HTTP fetching with an enforced timeout
//! - Title extraction from HTML
//! - Sequential processing of a unit of URLs into the page store

mod extractor;
mod fetcher;
mod unit;

pub use extractor::{extract_title, NO_TITLE};
pub use fetcher::{FetchError, FetchResult, Fetcher};
pub use unit::{process_url, run_unit, UnitError, UnitOutcome};
