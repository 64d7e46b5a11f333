//! Case-insensitive full-text search with relevance scoring

use crate::core::entity::Entity;
use serde::{Deserialize, Serialize};

/// Score for a query matching a whole field
pub const EXACT_SCORE: f64 = 1.0;

/// Score for a match at the start of the field or of a word in it
pub const PREFIX_SCORE: f64 = 0.8;

/// Score for any other occurrence
pub const SUBSTRING_SCORE: f64 = 0.5;

/// A free-text query and the fields it applies to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSpec {
    pub query: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl SearchSpec {
    pub fn new(query: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            query: query.into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// A blank query disables search entirely
    pub fn is_active(&self) -> bool {
        !self.query.trim().is_empty()
    }
}

/// Relevance metadata for one matched record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub record_id: String,
    pub score: f64,
    /// Matched text as it appears in the record, one entry per matching field
    pub highlights: Vec<String>,
}

/// Search `records`, returning one result per matching record in input order.
///
/// Records without any matching field are left out; a zero score is never
/// returned.
pub fn search<E: Entity>(records: &[E], spec: &SearchSpec) -> Vec<SearchResult> {
    if !spec.is_active() {
        return Vec::new();
    }
    let query = spec.query.trim();

    records
        .iter()
        .filter_map(|record| score_record(record, query, &spec.fields))
        .collect()
}

fn score_record<E: Entity>(record: &E, query: &str, fields: &[String]) -> Option<SearchResult> {
    let mut best = 0.0_f64;
    let mut highlights = Vec::new();

    for field in fields {
        let Some(text) = record
            .field_value(field)
            .and_then(|value| value.searchable_text())
        else {
            continue;
        };
        if let Some((score, highlight)) = best_match(&text, query) {
            best = best.max(score);
            highlights.push(highlight);
        }
    }

    (best > 0.0).then(|| SearchResult {
        record_id: record.id().to_string(),
        score: best,
        highlights,
    })
}

/// Best-scoring case-insensitive occurrence of `needle` in `haystack`.
fn best_match(haystack: &str, needle: &str) -> Option<(f64, String)> {
    let mut best: Option<(f64, usize, usize)> = None;
    let mut previous: Option<char> = None;

    for (start, ch) in haystack.char_indices() {
        if let Some(end) = match_at(haystack, start, needle) {
            let score = if start == 0 && end == haystack.len() {
                EXACT_SCORE
            } else if previous.is_none_or(|p| !p.is_alphanumeric()) {
                PREFIX_SCORE
            } else {
                SUBSTRING_SCORE
            };
            if best.is_none_or(|(s, _, _)| score > s) {
                best = Some((score, start, end));
            }
            // Exact needs start == 0, so later occurrences can only tie.
            if score >= PREFIX_SCORE {
                break;
            }
        }
        previous = Some(ch);
    }

    best.map(|(score, start, end)| (score, haystack[start..end].to_string()))
}

/// End byte offset of a case-insensitive match of `needle` starting at `start`.
fn match_at(haystack: &str, start: usize, needle: &str) -> Option<usize> {
    let mut rest = haystack[start..].char_indices();
    for expected in needle.chars() {
        let (_, actual) = rest.next()?;
        if !chars_eq_ignore_case(actual, expected) {
            return None;
        }
    }
    Some(match rest.next() {
        Some((offset, _)) => start + offset,
        None => haystack.len(),
    })
}

fn chars_eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}
