//! Core types for the account check pipeline.
//!
//! These types model the full lifecycle:
//! Input lines → Extraction → Dedup → Verification → Partition → Report.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

// ═══════════════════════════════════════════
// Verification protocol
// ═══════════════════════════════════════════

/// Which upstream protocol a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// One GET per identifier, bounded worker pool.
    PerId,
    /// Identifiers grouped into chunks, one POST per chunk, sequential.
    Batch,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerId => "per-id",
            Self::Batch => "batch",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "per-id" => Some(Self::PerId),
            "batch" => Some(Self::Batch),
            _ => None,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// Verification outcome
// ═══════════════════════════════════════════

/// Per-identifier classification. An identifier with no outcome at all
/// (batch response said nothing about it, or its check never started before
/// cancellation) appears in no bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    Valid,
    Invalid,
}

impl VerificationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
        }
    }
}

impl std::fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One identifier's status as reported by the batch endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdStatus {
    pub identifier: String,
    pub outcome: VerificationOutcome,
}

// ═══════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════

/// Configuration for a check run. All timing values are per attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Verification protocol to use.
    pub protocol: Protocol,
    /// Worker pool width for the per-id protocol.
    pub concurrency: usize,
    /// Attempts per per-id lookup call.
    pub per_id_attempts: u32,
    /// Per-attempt timeout for per-id lookups (ms).
    pub per_id_timeout_ms: u64,
    /// Exponential backoff base between per-id attempts (ms, doubles per attempt).
    pub per_id_backoff_ms: u64,
    /// Maximum identifiers per batch chunk.
    pub batch_chunk_size: usize,
    /// Attempts per batch chunk call.
    pub batch_attempts: u32,
    /// Per-attempt timeout for batch chunk calls (ms).
    pub batch_timeout_ms: u64,
    /// Exponential backoff base between batch attempts (ms).
    pub batch_backoff_ms: u64,
    /// Attempts for the warm-up liveness probe.
    pub warmup_attempts: u32,
    /// Per-attempt timeout for the warm-up probe (ms).
    pub warmup_timeout_ms: u64,
    /// Linear backoff step between warm-up attempts (ms, × attempt number).
    pub warmup_backoff_ms: u64,
    /// Language tag sent with batch requests.
    pub user_lang: String,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::PerId,
            concurrency: 25,
            per_id_attempts: 2,
            per_id_timeout_ms: 6_000,
            per_id_backoff_ms: 600,
            batch_chunk_size: 100,
            batch_attempts: 3,
            batch_timeout_ms: 10_000,
            batch_backoff_ms: 1_000,
            warmup_attempts: 5,
            warmup_timeout_ms: 5_000,
            warmup_backoff_ms: 1_000,
            user_lang: "en".to_string(),
        }
    }
}

// ═══════════════════════════════════════════
// Progress events
// ═══════════════════════════════════════════

/// Event emitted while a run progresses. Consumed by whatever frontend is
/// driving the run (the CLI prints them; tests collect them).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CheckEvent {
    Started {
        total_ids: u32,
    },
    /// After every completed per-id check, in completion order.
    Progress {
        completed: u32,
        total: u32,
        identifier: String,
        outcome: VerificationOutcome,
    },
    /// After every completed batch chunk, in chunk order.
    ChunkCompleted {
        chunk: u32,
        chunks: u32,
        completed: u32,
        total: u32,
    },
    Completed {
        summary: RunSummary,
    },
    Failed {
        error: String,
    },
}

// ═══════════════════════════════════════════
// Run context
// ═══════════════════════════════════════════

/// Per-run state shared between the scheduler, the partitioner and the
/// caller: run id, cancellation flag, progress event channel.
///
/// Created fresh per run and discarded after. Cancellation is cooperative:
/// setting the flag stops new work from being claimed, but never aborts
/// calls already in flight — their outcomes are still recorded.
pub struct RunContext {
    run_id: String,
    cancelled: AtomicBool,
    events: Option<UnboundedSender<CheckEvent>>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            cancelled: AtomicBool::new(false),
            events: None,
        }
    }

    /// Attach a progress event channel.
    pub fn with_events(events: UnboundedSender<CheckEvent>) -> Self {
        Self {
            events: Some(events),
            ..Self::new()
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Emit a progress event. Dropped receivers are ignored.
    pub fn emit(&self, event: CheckEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════
// Result buckets
// ═══════════════════════════════════════════

/// The three output line sets of a run. Built once per run by the
/// partitioner; line order within each bucket follows the identifiers'
/// first appearance in the input, never worker completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultBuckets {
    pub valid: Vec<String>,
    pub invalid: Vec<String>,
    pub duplicates: Vec<String>,
}

impl ResultBuckets {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.valid.clear();
        self.invalid.clear();
        self.duplicates.clear();
    }

    /// Compute the end-of-run summary.
    pub fn summary(&self, stopped: bool) -> RunSummary {
        let valid_count = self.valid.len() as u32;
        let invalid_count = self.invalid.len() as u32;
        let total = valid_count + invalid_count;

        let (valid_pct, invalid_pct) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                round_one_decimal(valid_count as f64 * 100.0 / total as f64),
                round_one_decimal(invalid_count as f64 * 100.0 / total as f64),
            )
        };

        RunSummary {
            valid_count,
            invalid_count,
            duplicate_count: self.duplicates.len() as u32,
            valid_pct,
            invalid_pct,
            stopped,
        }
    }
}

fn round_one_decimal(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// End-of-run counters. Percentages are relative to valid + invalid,
/// rounded to one decimal place; 0 when that sum is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub valid_count: u32,
    pub invalid_count: u32,
    pub duplicate_count: u32,
    pub valid_pct: f64,
    pub invalid_pct: f64,
    /// True when cancellation was requested before the run drained.
    pub stopped: bool,
}

// ═══════════════════════════════════════════
// Run report
// ═══════════════════════════════════════════

/// Result of a full check run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub run_id: String,
    pub buckets: ResultBuckets,
    pub summary: RunSummary,
    /// Non-fatal errors collected along the way (failed batch chunks).
    pub errors: Vec<String>,
    pub duration_ms: u64,
}
