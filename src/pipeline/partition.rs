//! Result partitioner — maps verification outcomes back to input lines.
//!
//! Runs once, after all outcomes are known, iterating identifiers in
//! first-occurrence order. Worker completion order never reaches this pass,
//! so bucket ordering is deterministic for a given input.

use std::collections::{HashMap, HashSet};

use super::tokenizer::LineIndex;
use super::types::{ResultBuckets, VerificationOutcome};

/// Build the three output buckets.
///
/// For each identifier, exactly once (a seen-guard protects against a
/// repeated entry in `unique_ids`): the canonical line goes to valid or
/// invalid per its outcome, every remaining line for the identifier goes to
/// duplicates in original order. Identifiers absent from `outcomes` are
/// skipped entirely — they appear in no bucket.
pub fn partition(
    unique_ids: &[String],
    index: &LineIndex,
    outcomes: &HashMap<String, VerificationOutcome>,
) -> ResultBuckets {
    let mut buckets = ResultBuckets::empty();
    let mut assigned = HashSet::new();

    for id in unique_ids {
        if !assigned.insert(id.as_str()) {
            continue;
        }
        let Some(outcome) = outcomes.get(id) else {
            continue;
        };
        let Some(canonical) = index.canonical(id) else {
            continue;
        };

        if outcome.is_valid() {
            buckets.valid.push(canonical.to_string());
        } else {
            buckets.invalid.push(canonical.to_string());
        }
        buckets
            .duplicates
            .extend(index.duplicates(id).iter().cloned());
    }

    buckets
}
