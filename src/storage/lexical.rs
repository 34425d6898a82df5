//! Bag-of-words relevance scoring and passage chunking.

use std::collections::{BTreeSet, HashMap};

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is", "it", "its",
    "of", "on", "or", "that", "the", "their", "this", "to", "was", "were", "with",
];

/// Lowercased alphanumeric tokens, stop-words and single characters removed.
pub(crate) fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
}

/// Distinct query terms in first-seen order.
pub(crate) fn query_terms(query: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tokenize(query).filter(|t| seen.insert(t.clone())).collect()
}

fn term_counts(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

/// Score weighted text fields against query terms.
///
/// Each distinct term contributes `ln(1 + weighted term frequency)`, so a
/// document matching many query terms beats one repeating a single term.
pub(crate) fn score(terms: &[String], fields: &[(&str, f64)]) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let counted: Vec<(HashMap<String, usize>, f64)> = fields
        .iter()
        .map(|(text, weight)| (term_counts(text), *weight))
        .collect();

    terms
        .iter()
        .map(|term| {
            let tf: f64 = counted
                .iter()
                .map(|(counts, weight)| *counts.get(term).unwrap_or(&0) as f64 * weight)
                .sum();
            (1.0 + tf).ln()
        })
        .sum()
}

/// Split text into overlapping character windows.
///
/// Windows prefer to end on whitespace in their second half; each window
/// after the first starts `overlap` characters before the previous end.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let size = size.max(1);
    let overlap = overlap.min(size - 1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let mut end = (start + size).min(chars.len());
        if end < chars.len() {
            let floor = start + (size / 2).max(1);
            if let Some(ws) = (floor..end).rev().find(|&i| chars[i].is_whitespace()) {
                end = ws;
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= chars.len() {
            break;
        }
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }
    chunks
}
