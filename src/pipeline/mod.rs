//! The review pipeline.
//!
//! A request moves through a fixed sequence of [`PipelineStage`]s:
//!
//! ```text
//! RECEIVED → CACHE_LOOKUP ─ hit ──────────────────────────────┐
//!                         └ miss → FETCH → ANALYZE → PERSIST ─┤
//!                                                             ↓
//!            ASSEMBLED ← [CHECK_GAPS] ← WRITE_SECTIONS ← AGGREGATE ← GRAPH_BUILD
//! ```
//!
//! Stage components are composed through [`PipelineCore`]. Per-item
//! failures (one paper, one section, one gap candidate) are collected as
//! [`ItemFailure`] values; only [`PipelineError`](crate::error::PipelineError)
//! aborts a request.

mod aggregate;
mod analysis;
mod cache;
mod core;
mod gaps;
mod orchestrator;
mod sections;

pub use aggregate::*;
pub use analysis::*;
pub use cache::*;
pub use self::core::*;
pub use gaps::*;
pub use orchestrator::*;
pub use sections::*;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{PaperRecord, WrittenSection};

/// States of one review request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    /// Topic accepted.
    Received,
    /// Querying the store for prior results.
    CacheLookup,
    /// Keyword extraction and paper discovery.
    Fetch,
    /// Per-paper analysis fan-out.
    Analyze,
    /// Writing newly analyzed papers to the store.
    Persist,
    /// Resolving references across the working set.
    GraphBuild,
    /// Reducing analyses to review sections.
    Aggregate,
    /// Per-section retrieval and writing fan-out.
    WriteSections,
    /// Optional research gap check.
    CheckGaps,
    /// Terminal success.
    Assembled,
    /// Terminal failure.
    Failed,
}

impl PipelineStage {
    /// Get the stage name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Received => "RECEIVED",
            PipelineStage::CacheLookup => "CACHE_LOOKUP",
            PipelineStage::Fetch => "FETCH",
            PipelineStage::Analyze => "ANALYZE",
            PipelineStage::Persist => "PERSIST",
            PipelineStage::GraphBuild => "GRAPH_BUILD",
            PipelineStage::Aggregate => "AGGREGATE",
            PipelineStage::WriteSections => "WRITE_SECTIONS",
            PipelineStage::CheckGaps => "CHECK_GAPS",
            PipelineStage::Assembled => "ASSEMBLED",
            PipelineStage::Failed => "FAILED",
        }
    }

    /// Whether the request ends in this stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Assembled | PipelineStage::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the working set came from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// A degraded item that did not abort its stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub stage: PipelineStage,
    /// Paper url, section title or gap question.
    pub key: String,
    pub message: String,
}

impl ItemFailure {
    /// Create a failure record
    pub fn new(stage: PipelineStage, key: impl Into<String>, message: impl ToString) -> Self {
        Self {
            stage,
            key: key.into(),
            message: message.to_string(),
        }
    }
}

/// Assembled result of one review request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutput {
    pub request_id: Uuid,
    pub query: String,
    pub cache: CacheStatus,
    /// Resolved working set in working-set order.
    pub graph: Vec<PaperRecord>,
    /// Dangling reference keys with the urls of the papers citing them.
    pub external_references: BTreeMap<String, BTreeSet<String>>,
    /// Written sections in outline order.
    pub sections: Vec<WrittenSection>,
    /// Research gap reports; empty unless the gap check ran.
    #[serde(default)]
    pub gaps: Vec<GapReport>,
    /// Stages visited, in order.
    pub stages: Vec<PipelineStage>,
    pub failures: Vec<ItemFailure>,
}

impl ReviewOutput {
    /// Look up a written section by title, ignoring case.
    pub fn section(&self, title: &str) -> Option<&WrittenSection> {
        let key = crate::model::section_key(title);
        self.sections
            .iter()
            .find(|s| crate::model::section_key(&s.title) == key)
    }

    /// Look up a paper in the resolved graph.
    pub fn paper(&self, url: &str) -> Option<&PaperRecord> {
        self.graph.iter().find(|p| p.url() == url)
    }

    /// Failures recorded during one stage.
    pub fn failures_in(&self, stage: PipelineStage) -> impl Iterator<Item = &ItemFailure> {
        self.failures.iter().filter(move |f| f.stage == stage)
    }
}

/// Run `work` over every item with at most `concurrency` in flight.
///
/// Returns exactly one output per input, in input order, whatever order the
/// work completes in.
pub(crate) async fn bounded_fan_out<T, R, F, Fut>(items: Vec<T>, concurrency: usize, work: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let mut results: Vec<(usize, R)> = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| {
            let fut = work(item);
            async move { (index, fut.await) }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_stage_names() {
        assert_eq!(PipelineStage::CacheLookup.to_string(), "CACHE_LOOKUP");
        assert_eq!(
            serde_json::to_value(PipelineStage::WriteSections).unwrap(),
            "WRITE_SECTIONS"
        );
        assert!(PipelineStage::Failed.is_terminal());
        assert!(!PipelineStage::Analyze.is_terminal());
    }

    #[tokio::test]
    async fn test_fan_out_preserves_input_order() {
        let items: Vec<u64> = vec![30, 5, 20, 1, 10];
        let out = bounded_fan_out(items.clone(), 5, |ms| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            ms * 2
        })
        .await;
        assert_eq!(out, vec![60, 10, 40, 2, 20]);
    }

    #[tokio::test]
    async fn test_fan_out_respects_bound() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let out = bounded_fan_out((0..12).collect::<Vec<_>>(), 3, |i| {
            let active = active.clone();
            let peak = peak.clone();
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                i
            }
        })
        .await;

        assert_eq!(out.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_fan_out_zero_concurrency_still_runs() {
        let out = bounded_fan_out(vec![1, 2], 0, |i| async move { i }).await;
        assert_eq!(out, vec![1, 2]);
    }
}
