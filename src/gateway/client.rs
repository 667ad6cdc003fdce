//! Forwarding client for the parser service

use crate::config::GatewayConfig;
use crate::gateway::{GatewayError, ParseResponse, TaskStarted};
use crate::queue::JobId;
use reqwest::{Client, Response};
use std::time::Duration;

/// Error prefixes for one forwarded operation
struct Labels {
    downstream: &'static str,
    transport: &'static str,
}

const PARSE: Labels = Labels {
    downstream: "Parser error",
    transport: "Parser request failed",
};

const TASK: Labels = Labels {
    downstream: "Task error",
    transport: "Task request failed",
};

const JOB: Labels = Labels {
    downstream: "Job lookup error",
    transport: "Job lookup request failed",
};

/// HTTP client for the downstream parser service
#[derive(Debug, Clone)]
pub struct DownstreamClient {
    client: Client,
    base_url: String,
}

impl DownstreamClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| GatewayError::TransportFailure(format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.parser_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Runs the pipeline for `url` on the parser service and waits for it
    pub async fn parse_sync(&self, url: &str) -> Result<ParseResponse, GatewayError> {
        self.post("parse", url, &PARSE).await?;

        Ok(ParseResponse {
            message: "Parser completed".to_string(),
            title: None,
        })
    }

    /// Enqueues a job for `url` on the parser service
    pub async fn parse_async(&self, url: &str) -> Result<TaskStarted, GatewayError> {
        let response = self.post("parse_celery", url, &TASK).await?;

        response.json::<TaskStarted>().await.map_err(|e| {
            GatewayError::TransportFailure(format!("{}: invalid response: {}", TASK.transport, e))
        })
    }

    /// Fetches a job's state from the parser service as raw JSON
    pub async fn job_status(&self, id: &JobId) -> Result<serde_json::Value, GatewayError> {
        let request = self
            .client
            .get(format!("{}/jobs/{}", self.base_url, id));
        let response = self.send(request, &JOB).await?;

        response.json().await.map_err(|e| {
            GatewayError::TransportFailure(format!("{}: invalid response: {}", JOB.transport, e))
        })
    }

    async fn post(&self, path: &str, url: &str, labels: &Labels) -> Result<Response, GatewayError> {
        let request = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .query(&[("url", url)]);

        self.send(request, labels).await
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        labels: &Labels,
    ) -> Result<Response, GatewayError> {
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::TransportFailure(format!("{}: {}", labels.transport, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // The body is part of the detail; an unreadable body leaves it empty
        let text = response.text().await.unwrap_or_default();
        Err(GatewayError::DownstreamFailure {
            status: status.as_u16(),
            detail: format!("{}: {}", labels.downstream, text),
        })
    }
}
