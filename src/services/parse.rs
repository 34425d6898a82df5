//! Parsers for completion replies.

use serde::Deserialize;

use super::SectionDraft;
use crate::error::{LlmError, LlmResult};
use crate::model::Analysis;

/// Extract JSON from a completion string, handling markdown code blocks.
///
/// Attempts extraction in this order:
/// 1. Raw JSON up to its last closing bracket (fast path)
/// 2. Extract from ```json ... ``` code blocks
/// 3. Extract from ``` ... ``` code blocks
/// 4. Return error if none work
pub(crate) fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    // Fast path: raw JSON, possibly followed by prose
    let trimmed = completion.trim();
    let close = match trimmed.chars().next() {
        Some('{') => Some('}'),
        Some('[') => Some(']'),
        _ => None,
    };
    if let Some(end) = close.and_then(|c| trimmed.rfind(c)) {
        return Ok(&trimmed[..=end]);
    }

    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty or malformed".to_string());
    }

    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty or malformed".to_string());
    }

    // Prose around a bare object
    if let (Some(start), Some(end)) = (completion.find('{'), completion.rfind('}')) {
        if start < end {
            return Ok(&completion[start..=end]);
        }
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}

/// Strip list decoration (`1.`, `-`, `*`, `2)`) and surrounding quotes.
pub(crate) fn strip_list_marker(line: &str) -> &str {
    let line = line
        .trim()
        .trim_start_matches(['-', '*', '•'])
        .trim_start();
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    let line = match line[digits..].chars().next() {
        Some('.') | Some(')') if digits > 0 => line[digits + 1..].trim_start(),
        _ => line,
    };
    line.trim_matches(['"', '\'', '`']).trim()
}

/// Non-empty list items, one per line.
pub(crate) fn parse_list(text: &str) -> Vec<String> {
    text.lines()
        .map(strip_list_marker)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keywords from a comma or newline separated reply, deduplicated
/// case-insensitively in first-seen order.
pub fn parse_keywords(text: &str) -> LlmResult<Vec<String>> {
    let mut seen = std::collections::HashSet::new();
    let keywords: Vec<String> = text
        .split([',', '\n'])
        .map(strip_list_marker)
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.to_lowercase()))
        .map(str::to_string)
        .collect();

    if keywords.is_empty() {
        return Err(LlmError::InvalidResponse {
            message: "No keywords in completion".to_string(),
        });
    }
    Ok(keywords)
}

/// Content of the first `<tag>...</tag>` pair, trimmed.
pub(crate) fn extract_tag<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = text.find(&open)? + open.len();
    let len = text[start..].find(&close)?;
    Some(text[start..start + len].trim())
}

/// Analysis fields from a tagged reply.
///
/// Missing tags leave their field empty; a reply with none of the tags is
/// not an analysis at all.
pub fn parse_analysis(text: &str) -> LlmResult<Analysis> {
    let summary = extract_tag(text, "summary");
    let method_issues = extract_tag(text, "methodological_issues");
    let conflict_of_interest = extract_tag(text, "conflict_of_interest");
    let future_research = extract_tag(text, "future_research");

    if summary.is_none()
        && method_issues.is_none()
        && conflict_of_interest.is_none()
        && future_research.is_none()
    {
        return Err(LlmError::InvalidResponse {
            message: format!(
                "No analysis tags in completion. First 100 chars: '{}'",
                text.chars().take(100).collect::<String>()
            ),
        });
    }

    Ok(Analysis {
        summary: summary.unwrap_or_default().to_string(),
        method_issues: method_issues.unwrap_or_default().to_string(),
        conflict_of_interest: conflict_of_interest.unwrap_or_default().to_string(),
        future_research: future_research.map(parse_list).unwrap_or_default(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OutlineReply {
    Wrapped { sections: Vec<SectionDraft> },
    Bare(Vec<SectionDraft>),
}

/// Section drafts from an outline reply.
pub fn parse_outline(text: &str) -> LlmResult<Vec<SectionDraft>> {
    let json = extract_json_from_completion(text)
        .map_err(|message| LlmError::InvalidResponse { message })?;

    let reply: OutlineReply =
        serde_json::from_str(json).map_err(|e| LlmError::InvalidResponse {
            message: format!("Outline does not match the section schema: {}", e),
        })?;

    Ok(match reply {
        OutlineReply::Wrapped { sections } | OutlineReply::Bare(sections) => sections,
    })
}
