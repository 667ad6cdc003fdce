//! Configuration module for Pagetide
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and applying the environment overrides (`PARSER_URL`, `URLS`,
//! `CONCURRENCY_WIDTH`, `DATABASE_PATH`) on top of them.
//!
//! # Example
//!
//! ```no_run
//! use pagetide::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Some(Path::new("pagetide.toml"))).unwrap();
//! println!("Concurrency width: {}", config.pipeline.concurrency_width);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, FetcherConfig, GatewayConfig, ParserConfig, PipelineConfig, QueueConfig,
    StorageConfig,
};

pub use parser::{
    apply_env_overrides, compute_config_hash, hash_url_list, load_config, load_config_with_hash,
};
pub use validation::validate;
pub(crate) use validation::validate_target_url;
