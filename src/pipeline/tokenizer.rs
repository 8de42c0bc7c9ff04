//! Line tokenizer — extracts account identifiers from raw multi-line input.
//!
//! One identifier per non-blank line, leftmost match only. Lines with no
//! match produce nothing and are excluded from every downstream structure.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Account identifiers start with the digit pair "10" or "61" followed by
/// 10 to 23 mixed-case alphanumerics, delimited by word boundaries.
static ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:10|61)[0-9A-Za-z]{10,23}\b").expect("valid regex"));

/// One extracted identifier together with the trimmed line that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEntry {
    pub identifier: String,
    pub line: String,
}

/// Map from identifier to every input line that produced it, in input order.
/// Every key holds at least one line; the first is the canonical line (the
/// one that receives the valid/invalid classification), the rest are
/// duplicate lines.
#[derive(Debug, Clone, Default)]
pub struct LineIndex {
    map: HashMap<String, Vec<String>>,
}

impl LineIndex {
    fn push(&mut self, identifier: &str, line: &str) {
        self.map
            .entry(identifier.to_string())
            .or_default()
            .push(line.to_string());
    }

    /// All lines for an identifier, in input order.
    pub fn lines_for(&self, identifier: &str) -> &[String] {
        self.map.get(identifier).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first input line observed for an identifier.
    pub fn canonical(&self, identifier: &str) -> Option<&str> {
        self.lines_for(identifier).first().map(String::as_str)
    }

    /// Every line beyond the canonical one.
    pub fn duplicates(&self, identifier: &str) -> &[String] {
        let lines = self.lines_for(identifier);
        if lines.len() > 1 {
            &lines[1..]
        } else {
            &[]
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Result of tokenizing one input text.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Ordered entries for lines that contained a match.
    pub entries: Vec<LineEntry>,
    /// Identifier → lines mapping.
    pub index: LineIndex,
}

impl Extraction {
    /// Identifiers in input order, repeats included.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.identifier.as_str())
    }
}

/// Tokenize raw input: split on any line ending, trim, drop blank lines,
/// take the leftmost identifier per line.
pub fn tokenize(text: &str) -> Extraction {
    let mut extraction = Extraction::default();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(m) = ID_REGEX.find(line) {
            extraction.index.push(m.as_str(), line);
            extraction.entries.push(LineEntry {
                identifier: m.as_str().to_string(),
                line: line.to_string(),
            });
        }
    }

    extraction
}

/// Every pattern match in a text, in order, repeats included. Used by the
/// batch response fallback parser to locate identifiers in free text.
pub fn find_identifiers(text: &str) -> Vec<(usize, String)> {
    ID_REGEX
        .find_iter(text)
        .map(|m| (m.start(), m.as_str().to_string()))
        .collect()
}

/// Whether a string is exactly one identifier, nothing more.
pub fn is_identifier(s: &str) -> bool {
    ID_REGEX
        .find(s)
        .is_some_and(|m| m.start() == 0 && m.end() == s.len())
}

/// Counters shown while the user is still editing input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputStats {
    pub non_blank_lines: usize,
    pub identifiers_found: usize,
}

/// Count non-blank lines and unique identifiers in a text.
pub fn input_stats(text: &str) -> InputStats {
    let non_blank_lines = text.lines().filter(|l| !l.trim().is_empty()).count();
    let extraction = tokenize(text);
    InputStats {
        non_blank_lines,
        identifiers_found: extraction.index.len(),
    }
}
