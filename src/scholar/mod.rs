//! Paper discovery collaborators.

mod semantic;

pub use semantic::SemanticScholarClient;

use async_trait::async_trait;

use crate::error::ScholarResult;
use crate::model::PaperRecord;

/// Finds papers for a set of keywords.
///
/// Returned records carry descriptive fields, content and unresolved
/// outgoing reference keys; analysis fields are empty.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// At most `max_n` papers. Failures on individual papers shrink the
    /// result instead of failing the call.
    async fn fetch(&self, keywords: &[String], max_n: usize) -> ScholarResult<Vec<PaperRecord>>;
}
