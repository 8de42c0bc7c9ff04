//! HTTP client for the status-check API, reached through the proxy relay.
//!
//! Every call enforces a per-attempt timeout by aborting the in-flight
//! request, retries per the configured policy, and backs off between
//! attempts (exponentially for real calls, linearly for the warm-up probe).

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use super::{parse_batch_response, AccountChecker, ClientError};
use crate::pipeline::types::{CheckConfig, IdStatus, VerificationOutcome};

/// Reqwest-backed implementation of `AccountChecker`.
pub struct ProxyClient {
    base_url: String,
    client: reqwest::Client,
    config: CheckConfig,
}

impl ProxyClient {
    /// Create a client for a proxy base URL. Timeouts are applied per
    /// attempt, not on the client.
    pub fn new(base_url: &str, config: &CheckConfig) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            config: config.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request up to `attempts` times. Each attempt gets its own
    /// timeout; failed attempts wait `backoff_ms × 2^attempt` before the
    /// next one.
    async fn fetch_text(
        &self,
        request: reqwest::RequestBuilder,
        attempts: u32,
        timeout_ms: u64,
        backoff_ms: u64,
    ) -> Result<String, ClientError> {
        let mut last_err = ClientError::Transport("no attempts made".to_string());

        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(backoff_ms << (attempt - 1))).await;
            }

            let request = request
                .try_clone()
                .ok_or_else(|| ClientError::Transport("request not retryable".to_string()))?;

            match request
                .timeout(Duration::from_millis(timeout_ms))
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    match response.text().await {
                        Ok(text) => return Ok(text),
                        Err(e) => last_err = self.map_error(e, timeout_ms),
                    }
                }
                Ok(response) => last_err = ClientError::Status(response.status().as_u16()),
                Err(e) => last_err = self.map_error(e, timeout_ms),
            }
        }

        Err(last_err)
    }

    fn map_error(&self, e: reqwest::Error, timeout_ms: u64) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout(timeout_ms)
        } else if e.is_connect() {
            ClientError::Connect(self.base_url.clone())
        } else {
            ClientError::Transport(e.to_string())
        }
    }

    /// One per-id lookup. True iff the body is a JSON object whose `uid`
    /// key is non-null; an unparseable body counts as no resolution.
    async fn lookup_uid(&self, identifier: &str) -> Result<bool, ClientError> {
        // Identifiers are word characters only; no path escaping needed.
        let url = format!("{}/api/get_uid/{identifier}", self.base_url);
        let text = self
            .fetch_text(
                self.client
                    .get(&url)
                    .header(reqwest::header::ACCEPT, "application/json"),
                self.config.per_id_attempts,
                self.config.per_id_timeout_ms,
                self.config.per_id_backoff_ms,
            )
            .await?;

        Ok(serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|json| json.get("uid").map(|uid| !uid.is_null()))
            .unwrap_or(false))
    }
}

/// Body of the batch check request.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchCheckRequest<'a> {
    input_data: &'a [String],
    check_friends: bool,
    user_lang: &'a str,
}

impl AccountChecker for ProxyClient {
    async fn warm_up(&self) -> Result<(), ClientError> {
        let url = format!("{}/api/ping", self.base_url);
        let mut last_err = ClientError::Transport("no attempts made".to_string());

        for attempt in 0..self.config.warmup_attempts {
            if attempt > 0 {
                // Linear backoff: step × attempt number.
                tokio::time::sleep(Duration::from_millis(
                    self.config.warmup_backoff_ms * attempt as u64,
                ))
                .await;
            }

            match self
                .client
                .get(&url)
                .timeout(Duration::from_millis(self.config.warmup_timeout_ms))
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => last_err = ClientError::Status(response.status().as_u16()),
                Err(e) => last_err = self.map_error(e, self.config.warmup_timeout_ms),
            }
        }

        Err(last_err)
    }

    async fn check_account(&self, identifier: &str) -> VerificationOutcome {
        match self.lookup_uid(identifier).await {
            Ok(true) => VerificationOutcome::Valid,
            Ok(false) => VerificationOutcome::Invalid,
            Err(e) => {
                tracing::debug!(
                    identifier,
                    error = %e,
                    "Lookup failed after retries, classifying invalid"
                );
                VerificationOutcome::Invalid
            }
        }
    }

    async fn check_chunk(
        &self,
        identifiers: &[String],
        lang: &str,
    ) -> Result<Vec<IdStatus>, ClientError> {
        let url = format!("{}/api/check/account", self.base_url);
        let body = BatchCheckRequest {
            input_data: identifiers,
            check_friends: false,
            user_lang: lang,
        };

        let text = self
            .fetch_text(
                self.client.post(&url).json(&body),
                self.config.batch_attempts,
                self.config.batch_timeout_ms,
                self.config.batch_backoff_ms,
            )
            .await?;

        Ok(parse_batch_response(&text))
    }
}
