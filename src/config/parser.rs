use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads the configuration file (if any), applies environment overrides and validates
///
/// # Arguments
///
/// * `path` - Optional path to the TOML configuration file; defaults are used when `None`
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    validate(&config)?;

    Ok(config)
}

/// Applies environment overrides to a configuration
///
/// `lookup` resolves a variable name to its value, which keeps the process
/// environment out of the tests.
///
/// | Variable | Field |
/// |----------|-------|
/// | `PARSER_URL` | `gateway.parser_url` |
/// | `URLS` | `pipeline.urls` (comma or whitespace separated) |
/// | `CONCURRENCY_WIDTH` | `pipeline.concurrency_width` |
/// | `DATABASE_PATH` | `storage.database_path` |
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(parser_url) = lookup("PARSER_URL") {
        config.gateway.parser_url = parser_url.trim_end_matches('/').to_string();
    }

    if let Some(urls) = lookup("URLS") {
        config.pipeline.urls = urls
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    if let Some(width) = lookup("CONCURRENCY_WIDTH") {
        config.pipeline.concurrency_width =
            width.trim().parse().map_err(|e| ConfigError::Env {
                name: "CONCURRENCY_WIDTH".to_string(),
                message: format!("{}", e),
            })?;
    }

    if let Some(path) = lookup("DATABASE_PATH") {
        config.storage.database_path = path;
    }

    Ok(())
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Recorded with every benchmark run so runs with different inputs can be told apart.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Hashes an ordered URL list, used when no configuration file was given
pub fn hash_url_list(urls: &[String]) -> String {
    let mut hasher = Sha256::new();
    for url in urls {
        hasher.update(url.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: Option<&Path>) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = match path {
        Some(path) => compute_config_hash(path)?,
        None => hash_url_list(&config.pipeline.urls),
    };
    Ok((config, hash))
}
