//! HTTP log-ingestion sink
//!
//! POSTs each batch as JSON (`{deviceId, logs}`) to the configured endpoint.
//! Network errors and non-2xx responses are uniform batch failures.

use super::LogSink;
use crate::config::SyncConfig;
use crate::error::{FirewallError, Result};
use crate::types::LogBatch;
use async_trait::async_trait;
use std::time::Duration;

pub struct HttpLogSink {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
}

impl HttpLogSink {
    pub fn new(
        endpoint: impl Into<String>,
        api_token: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| FirewallError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_token,
        })
    }

    /// Sink for the endpoint in `config`
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| FirewallError::Config("sync.endpoint is not set".to_string()))?;
        Self::new(endpoint, config.api_token.clone(), config.request_timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LogSink for HttpLogSink {
    async fn deliver(&self, batch: &LogBatch) -> Result<()> {
        let mut request = self.client.post(&self.endpoint).json(batch);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FirewallError::SyncFailure(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FirewallError::SyncFailure(format!(
                "endpoint returned HTTP {}",
                status
            )));
        }

        tracing::debug!(
            endpoint = %self.endpoint,
            logs = batch.logs.len(),
            status = status.as_u16(),
            "Batch delivered"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}
