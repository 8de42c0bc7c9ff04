//! Order-preserving deduplication.

use std::collections::HashSet;

/// Reduce a sequence to first-occurrence order, unique values. Pure, O(n).
pub fn unique_preserve_order<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let item = item.as_ref();
        if seen.insert(item.to_string()) {
            out.push(item.to_string());
        }
    }
    out
}
