use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{bounded_fan_out, ItemFailure, PipelineStage};
use crate::config::GapCheckConfig;
use crate::model::PaperRecord;
use crate::services::GapEvaluator;
use crate::storage::PaperStore;

/// One stored paper judged against an open question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapCandidate {
    pub url: String,
    pub title: String,
    pub evaluation: String,
}

/// An open research question and what the store already holds on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapReport {
    pub question: String,
    /// Url of the paper that raised the question.
    pub raised_by: String,
    pub candidates: Vec<GapCandidate>,
}

/// Checks future-research items of the working set against the store.
#[derive(Clone)]
pub struct GapChecker {
    store: Arc<dyn PaperStore>,
    evaluator: Arc<dyn GapEvaluator>,
    max_gaps: usize,
    top_k: usize,
    concurrency: usize,
}

impl GapChecker {
    /// Create a checker
    pub fn new(
        store: Arc<dyn PaperStore>,
        evaluator: Arc<dyn GapEvaluator>,
        config: &GapCheckConfig,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            evaluator,
            max_gaps: config.max_gaps,
            top_k: config.top_k,
            concurrency: concurrency.max(1),
        }
    }

    async fn check_one(&self, question: String, raised_by: String) -> (GapReport, Vec<ItemFailure>) {
        let mut failures = Vec::new();
        let mut candidates = Vec::new();

        // One extra slot since the raising paper usually matches its own question.
        match self.store.lookup(&question, self.top_k + 1).await {
            Ok(found) => {
                for paper in found
                    .into_iter()
                    .filter(|p| p.url() != raised_by)
                    .take(self.top_k)
                {
                    match self
                        .evaluator
                        .evaluate(&question, &paper.name, &paper.analysis.summary)
                        .await
                    {
                        Ok(evaluation) => candidates.push(GapCandidate {
                            url: paper.url().to_string(),
                            title: paper.name.clone(),
                            evaluation,
                        }),
                        Err(e) => {
                            warn!(question = %question, url = %paper.url(), error = %e, "Gap evaluation failed");
                            failures.push(ItemFailure::new(
                                PipelineStage::CheckGaps,
                                &question,
                                format!("{}: {}", paper.url(), e),
                            ));
                        }
                    }
                }
            }
            Err(e) => {
                warn!(question = %question, error = %e, "Gap lookup failed");
                failures.push(ItemFailure::new(PipelineStage::CheckGaps, &question, &e));
            }
        }

        let report = GapReport {
            question,
            raised_by,
            candidates,
        };
        (report, failures)
    }

    /// Check up to the configured number of distinct open questions.
    pub async fn check(&self, papers: &[PaperRecord]) -> (Vec<GapReport>, Vec<ItemFailure>) {
        let questions = open_questions(papers, self.max_gaps);
        if questions.is_empty() || self.top_k == 0 {
            return (Vec::new(), Vec::new());
        }

        let outcomes = bounded_fan_out(questions, self.concurrency, |(question, raised_by)| {
            self.check_one(question, raised_by)
        })
        .await;

        let mut reports = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (report, mut errs) in outcomes {
            reports.push(report);
            failures.append(&mut errs);
        }

        info!(
            questions = reports.len(),
            evaluated = reports.iter().map(|r| r.candidates.len()).sum::<usize>(),
            "Gap check complete"
        );
        (reports, failures)
    }
}

/// Distinct future-research items with the paper raising them, papers in
/// url order, at most `max`.
pub fn open_questions(papers: &[PaperRecord], max: usize) -> Vec<(String, String)> {
    let mut ordered: Vec<&PaperRecord> = papers.iter().collect();
    ordered.sort_by(|a, b| a.url().cmp(b.url()));

    let mut seen = HashSet::new();
    ordered
        .into_iter()
        .flat_map(|paper| {
            paper
                .analysis
                .future_research
                .iter()
                .map(move |q| (q.trim().to_string(), paper.url().to_string()))
        })
        .filter(|(q, _)| !q.is_empty())
        .filter(|(q, _)| seen.insert(q.to_lowercase()))
        .take(max)
        .collect()
}
