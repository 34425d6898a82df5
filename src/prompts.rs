//! Centralized prompt definitions for the completion-backed services.
//!
//! Templates use `{name}` placeholders filled by [`render`]. Each reply format
//! here is matched by a parser in `services::parse`.

/// Keyword extraction prompt. Placeholders: `{topic}`.
pub const KEYWORDS_PROMPT: &str = r#"You are given a research topic: {topic}.
Generate a list of the 5-10 most relevant keywords or short phrases
that a researcher would use to find scientific papers about this topic.
Return these keywords in a comma-separated list only."#;

/// Per-paper analysis prompt. The paper text is appended after it.
pub const ANALYSIS_PROMPT: &str = r#"Please do the following:
1. Write a quick and simple 2 sentence summary of the paper. (In <summary> tags.)
2. If the methods in the paper have any issues or assumptions write them in short bullet points. (In <methodological_issues> tags.)
3. If there is a section outlining conflicts of interest, summarise them. (In <conflict_of_interest> tags.)
4. If the paper poses any open question or states any areas of future research, give them in a list separated only by newlines. (In <future_research> tags.)

"#;

/// Theme aggregation prompt. Placeholders: `{themes}`.
pub const OUTLINE_PROMPT: &str = r#"You have been given the following themes extracted from various research papers:

{themes}

Identify and group similar themes into broader categories. These categories will serve as sections for a literature review that provides an overview of the current state of the field. Each section should have a title and a brief description summarizing the key trends and findings associated with that theme.

Your response MUST be valid JSON in this exact format:
{
  "sections": [
    {"title": "section title", "description": "brief description of the theme"}
  ]
}

Always respond with valid JSON only, no other text."#;

/// Section writing prompt. Placeholders: `{review_topic}`, `{section_title}`,
/// `{description}`, `{sources}`.
pub const SECTION_PROMPT: &str = r#"You are writing a section of a literature review on {review_topic}. Here is a list of sources relevant to the section titled "{section_title}".
{description}:

{sources}

For each source, do the following:
- Summarize and synthesize: Provide an overview of the main points and combine them into a coherent whole.
- Analyze and interpret: Add your interpretations where possible, discussing the significance of findings in relation to the literature as a whole.
- Critically evaluate: Mention the strengths and weaknesses of the sources.
- Write in well-structured paragraphs, using transition words and topic sentences to draw connections, comparisons, and contrasts.

Cite each source using the key given in parentheses after its title. Format citations as follows: [Authors, key].

Section: {section_title}"#;

/// Research gap evaluation prompt. Placeholders: `{question}`, `{title}`, `{summary}`.
pub const GAP_PROMPT: &str = r#"Question: {question}
Paper title: {title}
Paper summary: {summary}
Does this paper address the question? Provide reasoning."#;

/// Fill `{name}` placeholders in a template.
///
/// Values are substituted in one pass, so placeholder-like text inside a
/// value is left alone.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_known_placeholders() {
        let out = render("Topic: {topic}!", &[("topic", "graphs")]);
        assert_eq!(out, "Topic: graphs!");
    }

    #[test]
    fn test_render_keeps_unknown_braces() {
        let out = render(r#"{"sections": [{topic}]}"#, &[("topic", "x")]);
        assert_eq!(out, r#"{"sections": [x]}"#);
    }

    #[test]
    fn test_render_does_not_rescan_values() {
        let out = render("{a} {b}", &[("a", "{b}"), ("b", "B")]);
        assert_eq!(out, "{b} B");
    }

    #[test]
    fn test_outline_prompt_keeps_json_example() {
        let out = render(OUTLINE_PROMPT, &[("themes", "T1\nT2")]);
        assert!(out.contains("T1\nT2"));
        assert!(out.contains(r#""sections": ["#));
        assert!(!out.contains("{themes}"));
    }

    #[test]
    fn test_section_prompt_placeholders_filled() {
        let out = render(
            SECTION_PROMPT,
            &[
                ("review_topic", "RT"),
                ("section_title", "ST"),
                ("description", "D"),
                ("sources", "S"),
            ],
        );
        assert!(!out.contains("{section_title}"));
        assert!(out.contains("Section: ST"));
    }
}
