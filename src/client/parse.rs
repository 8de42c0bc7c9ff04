//! Defensive parsing of batch check responses.
//!
//! The upstream batch endpoint's response shape is not under our control and
//! has been observed in several forms. Parsing is two-path: JSON first
//! (array, nested array, or id→status record, with field-name aliases), then
//! a free-text fallback that scans for identifiers and inspects the
//! surrounding text window for status keywords. Identifiers neither path can
//! classify are dropped silently.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::pipeline::tokenizer::{find_identifiers, is_identifier};
use crate::pipeline::types::{IdStatus, VerificationOutcome};

/// Characters of context inspected on each side of an identifier in the
/// free-text fallback.
const TEXT_WINDOW: usize = 80;

/// Field names that may carry the identifier in a response item.
const ID_FIELDS: &[&str] = &["id", "uid", "account", "account_id", "accountId", "input", "value"];

/// Field names that may carry the status in a response item.
const STATUS_FIELDS: &[&str] = &["status", "state", "result", "account_status", "accountStatus"];

/// Keys under which the item array may be nested.
const LIST_FIELDS: &[&str] = &["data", "result", "results", "items", "accounts", "list"];

static INVALID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(invalid|blocked?|заблокирован\w*|недействительн\w*)\b")
        .expect("valid regex")
});

static VALID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(valid|active|активн\w*|действующ\w*)\b").expect("valid regex")
});

/// Classify a status string by keyword. Blocked/invalid keywords win over
/// valid ones; a string matching neither yields no classification.
pub fn classify_status(status: &str) -> Option<VerificationOutcome> {
    if INVALID_RE.is_match(status) {
        Some(VerificationOutcome::Invalid)
    } else if VALID_RE.is_match(status) {
        Some(VerificationOutcome::Valid)
    } else {
        None
    }
}

/// Parse a raw batch response body into classified identifiers.
pub fn parse_batch_response(body: &str) -> Vec<IdStatus> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let items = parse_json(&value);
        if !items.is_empty() {
            return items;
        }
    }
    parse_text_fallback(body)
}

fn parse_json(value: &Value) -> Vec<IdStatus> {
    if let Some(items) = value.as_array() {
        return parse_item_array(items);
    }

    if let Some(obj) = value.as_object() {
        for key in LIST_FIELDS {
            if let Some(items) = obj.get(*key).and_then(Value::as_array) {
                let parsed = parse_item_array(items);
                if !parsed.is_empty() {
                    return parsed;
                }
            }
        }
        // Record form: the object itself maps identifier → status.
        return obj
            .iter()
            .filter(|(key, _)| is_identifier(key))
            .filter_map(|(key, status)| {
                let status = status_string(status)?;
                classify_status(&status).map(|outcome| IdStatus {
                    identifier: key.clone(),
                    outcome,
                })
            })
            .collect();
    }

    Vec::new()
}

fn parse_item_array(items: &[Value]) -> Vec<IdStatus> {
    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let identifier = ID_FIELDS
                .iter()
                .find_map(|f| obj.get(*f).and_then(Value::as_str))?;
            let status = STATUS_FIELDS
                .iter()
                .find_map(|f| obj.get(*f).and_then(status_string))?;
            classify_status(&status).map(|outcome| IdStatus {
                identifier: identifier.to_string(),
                outcome,
            })
        })
        .collect()
}

fn status_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "valid" } else { "invalid" }.to_string()),
        _ => None,
    }
}

/// Scan raw text for identifiers and classify each by the keywords found in
/// an 80-character window before and after its first occurrence.
fn parse_text_fallback(body: &str) -> Vec<IdStatus> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for (start, identifier) in find_identifiers(body) {
        if !seen.insert(identifier.clone()) {
            continue;
        }
        let end = start + identifier.len();
        let lo = floor_char_boundary(body, start.saturating_sub(TEXT_WINDOW));
        let hi = ceil_char_boundary(body, (end + TEXT_WINDOW).min(body.len()));
        if let Some(outcome) = classify_status(&body[lo..hi]) {
            out.push(IdStatus {
                identifier,
                outcome,
            });
        }
    }

    out
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}
