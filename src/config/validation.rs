use crate::config::types::{
    Config, FetcherConfig, GatewayConfig, ParserConfig, PipelineConfig, QueueConfig,
    StorageConfig,
};
use crate::ConfigError;
use std::net::SocketAddr;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetcher_config(&config.fetcher)?;
    validate_pipeline_config(&config.pipeline)?;
    validate_storage_config(&config.storage)?;
    validate_queue_config(&config.queue)?;
    validate_gateway_config(&config.gateway)?;
    validate_parser_config(&config.parser)?;
    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "fetcher timeout-ms must be greater than 0".to_string(),
        ));
    }

    if config.connect_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "fetcher connect-timeout-ms must be greater than 0".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.concurrency_width < 1 {
        return Err(ConfigError::Validation(format!(
            "concurrency-width must be >= 1, got {}",
            config.concurrency_width
        )));
    }

    for url in &config.urls {
        validate_target_url(url)?;
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_queue_config(config: &QueueConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.worker_count < 1 {
        return Err(ConfigError::Validation(format!(
            "worker-count must be >= 1, got {}",
            config.worker_count
        )));
    }

    if config.visibility_timeout_ms == 0 || config.job_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "visibility-timeout-ms and job-timeout-ms must be greater than 0".to_string(),
        ));
    }

    // A lease shorter than the job timeout would hand a live job to a second worker
    if config.visibility_timeout_ms < config.job_timeout_ms {
        return Err(ConfigError::Validation(format!(
            "visibility-timeout-ms ({}) must be >= job-timeout-ms ({})",
            config.visibility_timeout_ms, config.job_timeout_ms
        )));
    }

    Ok(())
}

fn validate_gateway_config(config: &GatewayConfig) -> Result<(), ConfigError> {
    validate_listen_address(&config.listen)?;

    let parser_url = Url::parse(&config.parser_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid parser-url: {}", e)))?;
    if !matches!(parser_url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "parser-url '{}' must use http or https",
            config.parser_url
        )));
    }

    if config.request_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "gateway request-timeout-ms must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_parser_config(config: &ParserConfig) -> Result<(), ConfigError> {
    validate_listen_address(&config.listen)
}

fn validate_listen_address(listen: &str) -> Result<(), ConfigError> {
    listen.parse::<SocketAddr>().map(|_| ()).map_err(|e| {
        ConfigError::Validation(format!("Invalid listen address '{}': {}", listen, e))
    })
}

/// Validates a single target URL (must be absolute http or https)
pub(crate) fn validate_target_url(url: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid target URL '{}': {}", url, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "Target URL '{}' must use http or https",
            url
        )));
    }

    Ok(())
}
