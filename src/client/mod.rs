//! Verification client — talks to the status-check API through the proxy.
//!
//! The `AccountChecker` trait is the seam between the pipeline and the
//! network: the scheduler only sees the trait, `ProxyClient` is the real
//! reqwest-backed implementation, and `MockChecker` drives the pipeline in
//! tests without a network.

mod http;
mod parse;

pub use http::ProxyClient;
pub use parse::parse_batch_response;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;

use crate::pipeline::types::{IdStatus, VerificationOutcome};

/// Per-attempt client failures. Retried by the calling method per its
/// policy; what leaks past retries depends on the protocol (see the trait
/// method docs).
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Cannot connect to {0}")]
    Connect(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("HTTP transport error: {0}")]
    Transport(String),
}

/// Client-side view of the status-check API.
///
/// Futures are polled on the calling task; no Send bound needed.
#[allow(async_fn_in_trait)]
pub trait AccountChecker {
    /// Liveness probe against the proxy, with its own short retry loop.
    /// Callers treat failure as non-fatal.
    async fn warm_up(&self) -> Result<(), ClientError>;

    /// Check one identifier. Fail-closed: any network failure, timeout,
    /// non-2xx or unparseable body after retries classifies the identifier
    /// invalid instead of surfacing an error.
    async fn check_account(&self, identifier: &str) -> VerificationOutcome;

    /// Check a chunk of identifiers in one call. Returns only the
    /// identifiers the response classified; the rest are dropped
    /// (fail-open). Errors mean the whole call failed after retries.
    async fn check_chunk(
        &self,
        identifiers: &[String],
        lang: &str,
    ) -> Result<Vec<IdStatus>, ClientError>;
}

/// Scripted checker for tests — returns configured outcomes, optionally
/// after a delay, and records call counts and peak concurrency.
pub struct MockChecker {
    outcomes: HashMap<String, VerificationOutcome>,
    delay: Option<Duration>,
    fail_warm_up: bool,
    fail_chunks: bool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockChecker {
    pub fn new(outcomes: &[(&str, VerificationOutcome)]) -> Self {
        Self {
            outcomes: outcomes
                .iter()
                .map(|(id, o)| (id.to_string(), *o))
                .collect(),
            delay: None,
            fail_warm_up: false,
            fail_chunks: false,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Mark every listed identifier valid.
    pub fn all_valid(identifiers: &[&str]) -> Self {
        Self::new(
            &identifiers
                .iter()
                .map(|id| (*id, VerificationOutcome::Valid))
                .collect::<Vec<_>>(),
        )
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_failing_warm_up(mut self) -> Self {
        self.fail_warm_up = true;
        self
    }

    pub fn with_failing_chunks(mut self) -> Self {
        self.fail_chunks = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of checks that were in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AccountChecker for MockChecker {
    async fn warm_up(&self) -> Result<(), ClientError> {
        if self.fail_warm_up {
            Err(ClientError::Connect("mock proxy down".to_string()))
        } else {
            Ok(())
        }
    }

    async fn check_account(&self, identifier: &str) -> VerificationOutcome {
        self.enter().await;
        self.leave();
        // Unknown identifiers mirror the fail-closed policy.
        self.outcomes
            .get(identifier)
            .copied()
            .unwrap_or(VerificationOutcome::Invalid)
    }

    async fn check_chunk(
        &self,
        identifiers: &[String],
        _lang: &str,
    ) -> Result<Vec<IdStatus>, ClientError> {
        self.enter().await;
        self.leave();
        if self.fail_chunks {
            return Err(ClientError::Status(502));
        }
        // Unknown identifiers are dropped, mirroring the fail-open policy.
        Ok(identifiers
            .iter()
            .filter_map(|id| {
                self.outcomes.get(id).map(|o| IdStatus {
                    identifier: id.clone(),
                    outcome: *o,
                })
            })
            .collect())
    }
}
