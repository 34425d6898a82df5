//! External text-completion collaborators of the review pipeline.
//!
//! Each collaborator is a trait so the pipeline can be driven by fakes in
//! tests. [`LlmServices`] implements all of them on top of one
//! [`CompletionClient`](crate::llm::CompletionClient).

mod completion;
pub mod parse;

pub use completion::LlmServices;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmResult;
use crate::model::Analysis;

/// An outline entry as proposed by the aggregation service, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl SectionDraft {
    /// Create a draft
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Turns a free-text topic into search keywords.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeywordService: Send + Sync {
    /// Ordered search keywords for a topic.
    async fn keywords(&self, topic: &str) -> LlmResult<Vec<String>>;
}

/// Extracts structured findings from one paper's text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaperAnalyzer: Send + Sync {
    /// Analyze one paper; an unparsable reply is an error.
    async fn analyze(&self, content: &str) -> LlmResult<Analysis>;
}

/// Proposes review sections from a combined theme corpus.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutlineService: Send + Sync {
    /// Section drafts in proposed order.
    async fn outline(&self, themes: &str) -> LlmResult<Vec<SectionDraft>>;
}

/// Writes one review section from formatted sources.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SectionWriter: Send + Sync {
    /// Section body text.
    async fn write(
        &self,
        topic: &str,
        title: &str,
        description: &str,
        sources: &str,
    ) -> LlmResult<String>;
}

/// Judges whether a stored paper addresses an open research question.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GapEvaluator: Send + Sync {
    /// Free-text evaluation with reasoning.
    async fn evaluate(&self, question: &str, title: &str, summary: &str) -> LlmResult<String>;
}
