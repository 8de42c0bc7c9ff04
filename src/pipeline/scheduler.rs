//! Concurrency scheduler — drives verification calls for a run.
//!
//! Two designs, one per protocol:
//! - per-id: a bounded pool of worker futures over a shared claim index;
//! - batch: chunks processed strictly in order, one call at a time.
//!
//! Worker futures are joined on the calling task, so logical execution stays
//! single-threaded while network calls overlap up to the pool width.
//! Outcomes are recorded keyed by identifier (one slot each, first write
//! wins); bucket ordering is the partitioner's job, never the scheduler's.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::future::join_all;
use tokio::sync::Mutex;

use super::types::{CheckConfig, CheckEvent, RunContext, VerificationOutcome};
use crate::client::AccountChecker;

/// Check identifiers with a bounded worker pool (per-id protocol).
///
/// Each worker claims the next unclaimed identifier until the queue drains
/// or cancellation is observed. The flag is checked before claiming, never
/// mid-call: in-flight calls always complete and their outcomes are kept.
/// A `Progress` event is emitted after every completion, in completion
/// order.
pub async fn check_with_pool<C: AccountChecker>(
    ids: &[String],
    checker: &C,
    config: &CheckConfig,
    ctx: &RunContext,
) -> HashMap<String, VerificationOutcome> {
    let total = ids.len();
    if total == 0 {
        return HashMap::new();
    }

    let next = AtomicUsize::new(0);
    let done = AtomicUsize::new(0);
    let outcomes = Mutex::new(HashMap::new());
    let width = config.concurrency.clamp(1, total);

    let workers = (0..width).map(|_| async {
        loop {
            if ctx.is_cancelled() {
                break;
            }
            let i = next.fetch_add(1, Ordering::SeqCst);
            if i >= total {
                break;
            }

            let id = &ids[i];
            let outcome = checker.check_account(id).await;
            outcomes.lock().await.entry(id.clone()).or_insert(outcome);

            let completed = (done.fetch_add(1, Ordering::SeqCst) + 1) as u32;
            ctx.emit(CheckEvent::Progress {
                completed,
                total: total as u32,
                identifier: id.clone(),
                outcome,
            });
        }
    });

    join_all(workers).await;
    outcomes.into_inner()
}

/// Check identifiers in sequential chunks (batch protocol).
///
/// Chunks run strictly in order; a `ChunkCompleted` event follows each.
/// Cancellation is observed before each chunk. A chunk whose call fails
/// after retries becomes a run error and its identifiers get no outcome;
/// the run continues with the next chunk.
pub async fn check_in_chunks<C: AccountChecker>(
    ids: &[String],
    checker: &C,
    config: &CheckConfig,
    ctx: &RunContext,
) -> (HashMap<String, VerificationOutcome>, Vec<String>) {
    let mut outcomes = HashMap::new();
    let mut errors = Vec::new();
    let total = ids.len();
    if total == 0 {
        return (outcomes, errors);
    }

    let requested: HashSet<&str> = ids.iter().map(String::as_str).collect();
    let chunk_size = config.batch_chunk_size.max(1);
    let chunks = ids.chunks(chunk_size).count();

    for (index, chunk) in ids.chunks(chunk_size).enumerate() {
        if ctx.is_cancelled() {
            break;
        }

        match checker.check_chunk(chunk, &config.user_lang).await {
            Ok(statuses) => {
                for status in statuses {
                    // Only identifiers belonging to this run, one slot each.
                    if requested.contains(status.identifier.as_str()) {
                        outcomes.entry(status.identifier).or_insert(status.outcome);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    chunk = index + 1,
                    chunks,
                    error = %e,
                    "Batch chunk failed after retries"
                );
                errors.push(format!("Chunk {}/{chunks}: {e}", index + 1));
            }
        }

        ctx.emit(CheckEvent::ChunkCompleted {
            chunk: (index + 1) as u32,
            chunks: chunks as u32,
            completed: ((index + 1) * chunk_size).min(total) as u32,
            total: total as u32,
        });
    }

    (outcomes, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::client::{ClientError, MockChecker};
    use crate::pipeline::types::IdStatus;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("10TESTID{i:06}")).collect()
    }

    fn pool_config(concurrency: usize) -> CheckConfig {
        CheckConfig {
            concurrency,
            ..CheckConfig::default()
        }
    }

    #[tokio::test]
    async fn pool_checks_every_identifier() {
        let ids = ids(5);
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mock = MockChecker::all_valid(&refs);
        let ctx = RunContext::new();

        let outcomes = check_with_pool(&ids, &mock, &pool_config(25), &ctx).await;

        assert_eq!(outcomes.len(), 5);
        assert_eq!(mock.call_count(), 5);
        assert!(outcomes.values().all(|o| o.is_valid()));
    }

    #[tokio::test]
    async fn pool_never_exceeds_configured_width() {
        let ids = ids(20);
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mock = MockChecker::all_valid(&refs).with_delay(Duration::from_millis(10));
        let ctx = RunContext::new();

        let outcomes = check_with_pool(&ids, &mock, &pool_config(3), &ctx).await;

        assert_eq!(outcomes.len(), 20);
        assert!(mock.peak_in_flight() <= 3, "peak {}", mock.peak_in_flight());
        assert!(mock.peak_in_flight() >= 2, "workers never overlapped");
    }

    #[tokio::test]
    async fn pool_emits_progress_in_completion_order() {
        let ids = ids(8);
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mock = MockChecker::all_valid(&refs);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let ctx = RunContext::with_events(tx);

        check_with_pool(&ids, &mock, &pool_config(4), &ctx).await;

        let mut counts = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let CheckEvent::Progress {
                completed, total, ..
            } = event
            {
                assert_eq!(total, 8);
                counts.push(completed);
            }
        }
        assert_eq!(counts, (1..=8).collect::<Vec<u32>>());
    }

    /// Checker that requests cancellation from inside its Nth call,
    /// emulating a user pressing stop mid-run.
    struct CancelAfter<'a> {
        ctx: &'a RunContext,
        after: usize,
        calls: AtomicUsize,
    }

    impl AccountChecker for CancelAfter<'_> {
        async fn warm_up(&self) -> Result<(), ClientError> {
            Ok(())
        }

        async fn check_account(&self, _identifier: &str) -> VerificationOutcome {
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
                self.ctx.cancel();
            }
            VerificationOutcome::Valid
        }

        async fn check_chunk(
            &self,
            _identifiers: &[String],
            _lang: &str,
        ) -> Result<Vec<IdStatus>, ClientError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn pool_cancellation_keeps_in_flight_results_and_stops_new_claims() {
        let ids = ids(50);
        let ctx = RunContext::new();
        let checker = CancelAfter {
            ctx: &ctx,
            after: 10,
            calls: AtomicUsize::new(0),
        };
        let config = pool_config(4);

        let outcomes = check_with_pool(&ids, &checker, &config, &ctx).await;

        // Everything claimed before the flag flipped still completed; at
        // most one extra claim per worker could slip in.
        assert!(outcomes.len() >= 10, "got {}", outcomes.len());
        assert!(outcomes.len() <= 10 + config.concurrency, "got {}", outcomes.len());
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn pool_with_preset_cancellation_does_nothing() {
        let ids = ids(5);
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mock = MockChecker::all_valid(&refs);
        let ctx = RunContext::new();
        ctx.cancel();

        let outcomes = check_with_pool(&ids, &mock, &pool_config(4), &ctx).await;

        assert!(outcomes.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn chunks_run_in_order_and_cover_the_tail() {
        let ids = ids(250);
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mock = MockChecker::all_valid(&refs);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let ctx = RunContext::with_events(tx);

        let (outcomes, errors) =
            check_in_chunks(&ids, &mock, &CheckConfig::default(), &ctx).await;

        assert_eq!(outcomes.len(), 250);
        assert!(errors.is_empty());
        assert_eq!(mock.call_count(), 3);

        let mut chunk_events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let CheckEvent::ChunkCompleted {
                chunk, completed, ..
            } = event
            {
                chunk_events.push((chunk, completed));
            }
        }
        assert_eq!(chunk_events, vec![(1, 100), (2, 200), (3, 250)]);
    }

    #[tokio::test]
    async fn failed_chunk_is_recorded_and_run_continues() {
        let ids = ids(150);
        let mock = MockChecker::new(&[]).with_failing_chunks();
        let ctx = RunContext::new();

        let (outcomes, errors) =
            check_in_chunks(&ids, &mock, &CheckConfig::default(), &ctx).await;

        assert!(outcomes.is_empty());
        assert_eq!(errors.len(), 2);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn chunk_response_for_foreign_identifier_is_ignored() {
        struct Chatty;
        impl AccountChecker for Chatty {
            async fn warm_up(&self) -> Result<(), ClientError> {
                Ok(())
            }
            async fn check_account(&self, _identifier: &str) -> VerificationOutcome {
                VerificationOutcome::Invalid
            }
            async fn check_chunk(
                &self,
                identifiers: &[String],
                _lang: &str,
            ) -> Result<Vec<IdStatus>, ClientError> {
                let mut statuses: Vec<IdStatus> = identifiers
                    .iter()
                    .map(|id| IdStatus {
                        identifier: id.clone(),
                        outcome: VerificationOutcome::Valid,
                    })
                    .collect();
                // An identifier nobody asked about.
                statuses.push(IdStatus {
                    identifier: "61INTRUDERID99".to_string(),
                    outcome: VerificationOutcome::Valid,
                });
                Ok(statuses)
            }
        }

        let ids = ids(3);
        let ctx = RunContext::new();
        let (outcomes, _) = check_in_chunks(&ids, &Chatty, &CheckConfig::default(), &ctx).await;

        assert_eq!(outcomes.len(), 3);
        assert!(!outcomes.contains_key("61INTRUDERID99"));
    }

    #[tokio::test]
    async fn chunking_with_preset_cancellation_does_nothing() {
        let ids = ids(10);
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mock = MockChecker::all_valid(&refs);
        let ctx = RunContext::new();
        ctx.cancel();

        let (outcomes, errors) =
            check_in_chunks(&ids, &mock, &CheckConfig::default(), &ctx).await;

        assert!(outcomes.is_empty());
        assert!(errors.is_empty());
        assert_eq!(mock.call_count(), 0);
    }
}
