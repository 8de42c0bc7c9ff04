//! Run orchestration — one user-triggered check from raw text to report.
//!
//! Tokenize → dedup → warm-up → schedule → partition → summary. All per-run
//! state lives in the `RunContext`; nothing survives the run except the
//! returned report.

use std::time::Instant;

use super::dedup::unique_preserve_order;
use super::partition::partition;
use super::scheduler::{check_in_chunks, check_with_pool};
use super::tokenizer::tokenize;
use super::types::{
    CheckConfig, CheckEvent, CheckReport, Protocol, ResultBuckets, RunContext,
};
use crate::client::AccountChecker;

/// Run a full check over raw input text.
///
/// Never fails as a whole: per-call failures are classified or collected
/// per protocol policy, and whatever outcomes were gathered are always
/// reflected in the returned buckets — including after cancellation, where
/// the summary carries the stopped flag.
pub async fn run_check<C: AccountChecker>(
    input: &str,
    checker: &C,
    config: &CheckConfig,
    ctx: &RunContext,
) -> CheckReport {
    let start = Instant::now();

    let extraction = tokenize(input);
    let unique_ids = unique_preserve_order(extraction.identifiers());

    if unique_ids.is_empty() {
        let buckets = ResultBuckets::empty();
        let summary = buckets.summary(ctx.is_cancelled());
        return CheckReport {
            run_id: ctx.run_id().to_string(),
            buckets,
            summary,
            errors: Vec::new(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
    }

    ctx.emit(CheckEvent::Started {
        total_ids: unique_ids.len() as u32,
    });

    // Cold upstreams answer the first real request slowly; the probe is
    // allowed to fail without consequence.
    if let Err(e) = checker.warm_up().await {
        tracing::debug!(error = %e, "Warm-up probe failed (non-fatal)");
    }

    let (outcomes, errors) = match config.protocol {
        Protocol::PerId => (
            check_with_pool(&unique_ids, checker, config, ctx).await,
            Vec::new(),
        ),
        Protocol::Batch => check_in_chunks(&unique_ids, checker, config, ctx).await,
    };

    let buckets = partition(&unique_ids, &extraction.index, &outcomes);
    let summary = buckets.summary(ctx.is_cancelled());

    if outcomes.is_empty() && !errors.is_empty() {
        ctx.emit(CheckEvent::Failed {
            error: errors.join("; "),
        });
    } else {
        ctx.emit(CheckEvent::Completed {
            summary: summary.clone(),
        });
    }

    tracing::info!(
        run_id = ctx.run_id(),
        valid = summary.valid_count,
        invalid = summary.invalid_count,
        duplicates = summary.duplicate_count,
        stopped = summary.stopped,
        "Check run finished"
    );

    CheckReport {
        run_id: ctx.run_id().to_string(),
        buckets,
        summary,
        errors,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockChecker;
    use crate::pipeline::types::VerificationOutcome::{Invalid, Valid};

    const INPUT: &str = "10ABCDEFGHIJKL\n61ZZZZZZZZZZZZ\n10ABCDEFGHIJKL\nnomatch";

    fn collect_events(
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<CheckEvent>,
    ) -> Vec<CheckEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn per_id_run_partitions_scenario_input() {
        let mock = MockChecker::new(&[("10ABCDEFGHIJKL", Valid), ("61ZZZZZZZZZZZZ", Invalid)]);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let ctx = RunContext::with_events(tx);

        let report = run_check(INPUT, &mock, &CheckConfig::default(), &ctx).await;

        assert_eq!(report.buckets.valid, vec!["10ABCDEFGHIJKL"]);
        assert_eq!(report.buckets.invalid, vec!["61ZZZZZZZZZZZZ"]);
        assert_eq!(report.buckets.duplicates, vec!["10ABCDEFGHIJKL"]);
        assert_eq!(report.summary.valid_count, 1);
        assert_eq!(report.summary.invalid_count, 1);
        assert_eq!(report.summary.duplicate_count, 1);
        assert_eq!(report.summary.valid_pct, 50.0);
        assert!(!report.summary.stopped);
        assert!(report.errors.is_empty());
        // Two unique identifiers — the repeated one is checked once.
        assert_eq!(mock.call_count(), 2);

        let events = collect_events(&mut rx);
        assert!(matches!(events.first(), Some(CheckEvent::Started { total_ids: 2 })));
        assert!(matches!(events.last(), Some(CheckEvent::Completed { .. })));
        let progress = events
            .iter()
            .filter(|e| matches!(e, CheckEvent::Progress { .. }))
            .count();
        assert_eq!(progress, 2);
    }

    #[tokio::test]
    async fn batch_run_produces_same_buckets() {
        let mock = MockChecker::new(&[("10ABCDEFGHIJKL", Valid), ("61ZZZZZZZZZZZZ", Invalid)]);
        let config = CheckConfig {
            protocol: Protocol::Batch,
            ..CheckConfig::default()
        };
        let ctx = RunContext::new();

        let report = run_check(INPUT, &mock, &config, &ctx).await;

        assert_eq!(report.buckets.valid, vec!["10ABCDEFGHIJKL"]);
        assert_eq!(report.buckets.invalid, vec!["61ZZZZZZZZZZZZ"]);
        assert_eq!(report.buckets.duplicates, vec!["10ABCDEFGHIJKL"]);
        // One chunk covers both identifiers.
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn empty_input_returns_empty_report_without_calls() {
        let mock = MockChecker::new(&[]);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let ctx = RunContext::with_events(tx);

        let report = run_check("no identifiers anywhere\n\n", &mock, &CheckConfig::default(), &ctx)
            .await;

        assert_eq!(report.buckets, ResultBuckets::empty());
        assert_eq!(report.summary.valid_pct, 0.0);
        assert_eq!(mock.call_count(), 0);
        assert!(collect_events(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn warm_up_failure_changes_nothing() {
        let mock = MockChecker::new(&[("10ABCDEFGHIJKL", Valid)]).with_failing_warm_up();
        let ctx = RunContext::new();

        let report = run_check("10ABCDEFGHIJKL", &mock, &CheckConfig::default(), &ctx).await;

        assert_eq!(report.buckets.valid, vec!["10ABCDEFGHIJKL"]);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn cancelled_run_reports_stopped_summary() {
        let mock = MockChecker::new(&[("10ABCDEFGHIJKL", Valid)]);
        let ctx = RunContext::new();
        ctx.cancel();

        let report = run_check("10ABCDEFGHIJKL", &mock, &CheckConfig::default(), &ctx).await;

        assert!(report.summary.stopped);
        assert!(report.buckets.valid.is_empty());
    }

    #[tokio::test]
    async fn all_chunks_failing_emits_failed_event() {
        let mock = MockChecker::new(&[]).with_failing_chunks();
        let config = CheckConfig {
            protocol: Protocol::Batch,
            ..CheckConfig::default()
        };
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let ctx = RunContext::with_events(tx);

        let report = run_check("10ABCDEFGHIJKL", &mock, &config, &ctx).await;

        assert_eq!(report.errors.len(), 1);
        assert!(report.buckets.valid.is_empty() && report.buckets.invalid.is_empty());
        let events = collect_events(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, CheckEvent::Failed { .. })));
    }

    #[tokio::test]
    async fn unclassified_identifier_is_in_no_bucket() {
        // The mock knows nothing about the second identifier; in batch mode
        // it is dropped rather than classified.
        let mock = MockChecker::new(&[("10ABCDEFGHIJKL", Valid)]);
        let config = CheckConfig {
            protocol: Protocol::Batch,
            ..CheckConfig::default()
        };
        let ctx = RunContext::new();

        let report = run_check(
            "10ABCDEFGHIJKL\n61ZZZZZZZZZZZZ",
            &mock,
            &config,
            &ctx,
        )
        .await;

        assert_eq!(report.buckets.valid, vec!["10ABCDEFGHIJKL"]);
        assert!(report.buckets.invalid.is_empty());
        assert!(report.buckets.duplicates.is_empty());
    }
}
