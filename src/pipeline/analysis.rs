use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::{bounded_fan_out, ItemFailure, PipelineStage};
use crate::error::{LlmError, LlmResult};
use crate::model::{Analysis, PaperRecord};
use crate::services::PaperAnalyzer;

/// Runs the analyzer over a working set with bounded parallelism.
#[derive(Clone)]
pub struct AnalysisFanOut {
    analyzer: Arc<dyn PaperAnalyzer>,
    concurrency: usize,
}

impl AnalysisFanOut {
    /// Create a fan-out with at most `concurrency` analyses in flight
    pub fn new(analyzer: Arc<dyn PaperAnalyzer>, concurrency: usize) -> Self {
        Self {
            analyzer,
            concurrency: concurrency.max(1),
        }
    }

    /// Analyze one paper. Each worker owns its record.
    async fn analyze_one(&self, paper: PaperRecord) -> (PaperRecord, LlmResult<Analysis>) {
        if paper.content.trim().is_empty() {
            let err = LlmError::InvalidResponse {
                message: "paper has no content to analyze".to_string(),
            };
            return (paper, Err(err));
        }
        let start = Instant::now();
        let result = self.analyzer.analyze(&paper.content).await;
        debug!(
            url = %paper.url(),
            ok = result.is_ok(),
            latency_ms = start.elapsed().as_millis(),
            "Paper analysis finished"
        );
        (paper, result)
    }

    /// Analyze every paper.
    ///
    /// Returns one record per input, in input order. A paper whose analysis
    /// fails keeps empty analysis fields and contributes an [`ItemFailure`].
    pub async fn analyze_all(&self, papers: Vec<PaperRecord>) -> (Vec<PaperRecord>, Vec<ItemFailure>) {
        let total = papers.len();
        let outcomes = bounded_fan_out(papers, self.concurrency, |paper| self.analyze_one(paper)).await;

        let mut analyzed = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (paper, result) in outcomes {
            match result {
                Ok(analysis) => analyzed.push(paper.with_analysis(analysis)),
                Err(e) => {
                    warn!(url = %paper.url(), error = %e, "Paper analysis failed");
                    failures.push(ItemFailure::new(PipelineStage::Analyze, paper.url(), &e));
                    analyzed.push(paper.with_analysis(Analysis::default()));
                }
            }
        }

        info!(
            papers = total,
            failed = failures.len(),
            concurrency = self.concurrency,
            "Analysis stage complete"
        );
        (analyzed, failures)
    }
}
