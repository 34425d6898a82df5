use async_trait::async_trait;
use tracing::debug;

use super::parse::{parse_analysis, parse_keywords, parse_outline};
use super::{GapEvaluator, KeywordService, OutlineService, PaperAnalyzer, SectionDraft, SectionWriter};
use crate::config::LlmConfig;
use crate::error::LlmResult;
use crate::llm::{CompletionClient, MessagesRequest};
use crate::model::Analysis;
use crate::prompts::{
    render, ANALYSIS_PROMPT, GAP_PROMPT, KEYWORDS_PROMPT, OUTLINE_PROMPT, SECTION_PROMPT,
};

const KEYWORD_MAX_TOKENS: u32 = 100;
const ANALYSIS_MAX_TOKENS: u32 = 500;
const OUTLINE_MAX_TOKENS: u32 = 2000;
const SECTION_MAX_TOKENS: u32 = 4096;
const GAP_MAX_TOKENS: u32 = 1024;

/// Completion-backed implementation of every pipeline collaborator.
#[derive(Clone)]
pub struct LlmServices {
    client: CompletionClient,
    model: String,
    keyword_model: String,
}

impl LlmServices {
    /// Create services using the models named in `config`
    pub fn new(client: CompletionClient, config: &LlmConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            keyword_model: config.keyword_model.clone(),
        }
    }

    /// Get a reference to the underlying client.
    #[inline]
    pub fn client(&self) -> &CompletionClient {
        &self.client
    }
}

#[async_trait]
impl KeywordService for LlmServices {
    async fn keywords(&self, topic: &str) -> LlmResult<Vec<String>> {
        let prompt = render(KEYWORDS_PROMPT, &[("topic", topic)]);
        let request =
            MessagesRequest::new(&self.keyword_model, prompt).with_max_tokens(KEYWORD_MAX_TOKENS);
        let reply = self.client.complete(request).await?;
        let keywords = parse_keywords(&reply)?;
        debug!(topic = %topic, count = keywords.len(), "Keywords extracted");
        Ok(keywords)
    }
}

#[async_trait]
impl PaperAnalyzer for LlmServices {
    async fn analyze(&self, content: &str) -> LlmResult<Analysis> {
        let prompt = format!("{}{}", ANALYSIS_PROMPT, content);
        let request = MessagesRequest::new(&self.model, prompt)
            .with_max_tokens(ANALYSIS_MAX_TOKENS)
            .with_temperature(0.0);
        let reply = self.client.complete(request).await?;
        parse_analysis(&reply)
    }
}

#[async_trait]
impl OutlineService for LlmServices {
    async fn outline(&self, themes: &str) -> LlmResult<Vec<SectionDraft>> {
        let prompt = render(OUTLINE_PROMPT, &[("themes", themes)]);
        let request = MessagesRequest::new(&self.model, prompt)
            .with_max_tokens(OUTLINE_MAX_TOKENS)
            .with_temperature(0.5);
        let reply = self.client.complete(request).await?;
        parse_outline(&reply)
    }
}

#[async_trait]
impl SectionWriter for LlmServices {
    async fn write(
        &self,
        topic: &str,
        title: &str,
        description: &str,
        sources: &str,
    ) -> LlmResult<String> {
        let prompt = render(
            SECTION_PROMPT,
            &[
                ("review_topic", topic),
                ("section_title", title),
                ("description", description),
                ("sources", sources),
            ],
        );
        let request = MessagesRequest::new(&self.model, prompt)
            .with_max_tokens(SECTION_MAX_TOKENS)
            .with_temperature(0.5);
        let body = self.client.complete(request).await?;
        Ok(body.trim().to_string())
    }
}

#[async_trait]
impl GapEvaluator for LlmServices {
    async fn evaluate(&self, question: &str, title: &str, summary: &str) -> LlmResult<String> {
        let summary = if summary.trim().is_empty() {
            "No summary available"
        } else {
            summary
        };
        let prompt = render(
            GAP_PROMPT,
            &[("question", question), ("title", title), ("summary", summary)],
        );
        let request = MessagesRequest::new(&self.model, prompt).with_max_tokens(GAP_MAX_TOKENS);
        let evaluation = self.client.complete(request).await?;
        Ok(evaluation.trim().to_string())
    }
}
