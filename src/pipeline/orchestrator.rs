use std::collections::HashSet;
use std::time::Instant;

use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::{
    AnalysisFanOut, CacheGateway, CacheStatus, GapChecker, ItemFailure, PipelineCore,
    PipelineStage, ReviewOutput, SectionFanOut, ThemeAggregator,
};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::graph::{ReferenceGraph, ResolveOptions};
use crate::model::PaperRecord;

/// Stage bookkeeping for one request.
struct RunState {
    stages: Vec<PipelineStage>,
    failures: Vec<ItemFailure>,
}

impl RunState {
    fn new() -> Self {
        Self {
            stages: vec![PipelineStage::Received],
            failures: Vec::new(),
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        info!(stage = %stage, "Entering stage");
        self.stages.push(stage);
    }
}

/// End-to-end review pipeline.
///
/// Holds no per-request state; concurrent calls to [`Pipeline::run`] each
/// own their working set. Dropping a `run` future cancels the in-flight
/// external calls of its current stage.
#[derive(Clone)]
pub struct Pipeline {
    core: PipelineCore,
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline
    pub fn new(core: PipelineCore, config: PipelineConfig) -> Self {
        Self { core, config }
    }

    /// Get the shared collaborators.
    #[inline]
    pub fn core(&self) -> &PipelineCore {
        &self.core
    }

    /// Get the pipeline configuration.
    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Produce a literature review for `topic`.
    pub async fn run(&self, topic: &str) -> PipelineResult<ReviewOutput> {
        let request_id = Uuid::new_v4();
        let span = info_span!("review", request_id = %request_id, topic = %topic.trim());

        async move {
            let start = Instant::now();
            let mut state = RunState::new();
            let result = self.execute(request_id, topic, &mut state).await;
            match &result {
                Ok(output) => info!(
                    papers = output.graph.len(),
                    sections = output.sections.len(),
                    failures = output.failures.len(),
                    cache = ?output.cache,
                    latency_ms = start.elapsed().as_millis(),
                    "Review assembled"
                ),
                Err(e) => error!(
                    stage = %e.stage(),
                    stages = ?state.stages,
                    error = %e,
                    latency_ms = start.elapsed().as_millis(),
                    "Review failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Run the stages, ending in `FAILED` when one of them is fatal.
    async fn execute(
        &self,
        request_id: Uuid,
        topic: &str,
        state: &mut RunState,
    ) -> PipelineResult<ReviewOutput> {
        let result = self.run_stages(request_id, topic, state).await;
        if result.is_err() {
            state.enter(PipelineStage::Failed);
        }
        result
    }

    async fn run_stages(
        &self,
        request_id: Uuid,
        topic: &str,
        state: &mut RunState,
    ) -> PipelineResult<ReviewOutput> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(PipelineError::InvalidTopic {
                reason: "topic cannot be empty".to_string(),
            });
        }

        let cache = CacheGateway::new(self.core.store().clone(), self.config.cache_lookup_limit);

        state.enter(PipelineStage::CacheLookup);
        let cached = cache.lookup(topic).await;

        let (working_set, cache_status) = if cached.is_empty() {
            let papers = self.fetch_and_analyze(topic, &cache, state).await?;
            (papers, CacheStatus::Miss)
        } else {
            (cached, CacheStatus::Hit)
        };

        state.enter(PipelineStage::GraphBuild);
        let graph = ReferenceGraph::build(
            dedup_by_url(working_set),
            ResolveOptions {
                match_titles: self.config.match_reference_titles,
            },
        );

        state.enter(PipelineStage::Aggregate);
        let aggregator = ThemeAggregator::new(self.core.outline().clone());
        let sections = aggregator.aggregate(graph.papers()).await?;

        state.enter(PipelineStage::WriteSections);
        let writer = SectionFanOut::new(
            self.core.store().clone(),
            self.core.writer().clone(),
            self.config.section_concurrency,
            self.config.section_sources,
        );
        let (written, failures) = writer.write_sections(topic, sections).await;
        state.failures.extend(failures);

        let gaps = if self.config.gap_check.enabled {
            state.enter(PipelineStage::CheckGaps);
            let checker = GapChecker::new(
                self.core.store().clone(),
                self.core.gaps().clone(),
                &self.config.gap_check,
                self.config.section_concurrency,
            );
            let (reports, failures) = checker.check(graph.papers()).await;
            state.failures.extend(failures);
            reports
        } else {
            Vec::new()
        };

        state.enter(PipelineStage::Assembled);
        let external_references = graph.external_references().clone();
        Ok(ReviewOutput {
            request_id,
            query: topic.to_string(),
            cache: cache_status,
            graph: graph.into_papers(),
            external_references,
            sections: written,
            gaps,
            stages: std::mem::take(&mut state.stages),
            failures: std::mem::take(&mut state.failures),
        })
    }

    /// Cache-miss path: fetch, analyze and persist a fresh working set.
    async fn fetch_and_analyze(
        &self,
        topic: &str,
        cache: &CacheGateway,
        state: &mut RunState,
    ) -> PipelineResult<Vec<PaperRecord>> {
        state.enter(PipelineStage::Fetch);
        let keywords = self
            .core
            .keywords()
            .keywords(topic)
            .await
            .map_err(PipelineError::Keywords)?;
        info!(keywords = ?keywords, "Keywords extracted");

        let fetched = self
            .core
            .source()
            .fetch(&keywords, self.config.max_papers)
            .await
            .map_err(PipelineError::Fetch)?;
        let fetched = dedup_by_url(fetched);
        if fetched.is_empty() {
            return Err(PipelineError::NoPapers {
                topic: topic.to_string(),
            });
        }

        state.enter(PipelineStage::Analyze);
        let analysis = AnalysisFanOut::new(
            self.core.analyzer().clone(),
            self.config.analysis_concurrency,
        );
        let (analyzed, failures) = analysis.analyze_all(fetched).await;
        state.failures.extend(failures);

        state.enter(PipelineStage::Persist);
        let failures = cache
            .persist_all(&analyzed, self.config.analysis_concurrency)
            .await;
        if !failures.is_empty() {
            warn!(failed = failures.len(), "Some papers were not persisted");
        }
        state.failures.extend(failures);

        Ok(analyzed)
    }
}

/// Keep the first record for each url.
fn dedup_by_url(papers: Vec<PaperRecord>) -> Vec<PaperRecord> {
    let mut seen = HashSet::new();
    papers
        .into_iter()
        .filter(|p| seen.insert(p.url().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GapCheckConfig;
    use crate::error::{LlmError, ScholarError, StorageError};
    use crate::model::Analysis;
    use crate::scholar::MockPaperSource;
    use crate::services::{
        MockGapEvaluator, MockKeywordService, MockOutlineService, MockPaperAnalyzer,
        MockSectionWriter, SectionDraft,
    };
    use crate::storage::MockPaperStore;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    struct Mocks {
        store: MockPaperStore,
        source: MockPaperSource,
        keywords: MockKeywordService,
        analyzer: MockPaperAnalyzer,
        outline: MockOutlineService,
        writer: MockSectionWriter,
        gaps: MockGapEvaluator,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                store: MockPaperStore::new(),
                source: MockPaperSource::new(),
                keywords: MockKeywordService::new(),
                analyzer: MockPaperAnalyzer::new(),
                outline: MockOutlineService::new(),
                writer: MockSectionWriter::new(),
                gaps: MockGapEvaluator::new(),
            }
        }

        fn pipeline(self, config: PipelineConfig) -> Pipeline {
            let core = PipelineCore::new(
                Arc::new(self.store),
                Arc::new(self.source),
                Arc::new(self.keywords),
                Arc::new(self.analyzer),
                Arc::new(self.outline),
                Arc::new(self.writer),
                Arc::new(self.gaps),
            );
            Pipeline::new(core, config)
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            analysis_concurrency: 2,
            section_concurrency: 2,
            ..Default::default()
        }
    }

    fn raw(url: &str, refs: &[&str]) -> PaperRecord {
        PaperRecord::new(url, format!("Paper {}", url))
            .unwrap()
            .with_content(format!("content {}", url))
            .with_out_references(refs.iter().copied())
    }

    fn stored(url: &str, refs: &[&str]) -> PaperRecord {
        raw(url, refs).with_analysis(Analysis {
            summary: format!("summary {}", url),
            future_research: vec![format!("gap {}", url)],
            ..Default::default()
        })
    }

    fn expect_sections(mocks: &mut Mocks) {
        mocks
            .outline
            .expect_outline()
            .times(1)
            .returning(|_| Ok(vec![SectionDraft::new("Methods", "how")]));
        mocks.store.expect_passages().returning(|_, _| Ok(Vec::new()));
        mocks
            .writer
            .expect_write()
            .returning(|_, title, _, _| Ok(format!("{} body", title)));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_fetch_analyze_persist() {
        let mut mocks = Mocks::new();
        mocks
            .store
            .expect_lookup()
            .times(1)
            .returning(|_, _| Ok(vec![stored("A", &["B"]), stored("B", &[])]));
        mocks.store.expect_insert().times(0);
        mocks.keywords.expect_keywords().times(0);
        mocks.source.expect_fetch().times(0);
        mocks.analyzer.expect_analyze().times(0);
        expect_sections(&mut mocks);

        let output = mocks.pipeline(config()).run("graphs").await.unwrap();

        assert_eq!(output.cache, CacheStatus::Hit);
        assert_eq!(
            output.stages,
            vec![
                PipelineStage::Received,
                PipelineStage::CacheLookup,
                PipelineStage::GraphBuild,
                PipelineStage::Aggregate,
                PipelineStage::WriteSections,
                PipelineStage::Assembled,
            ]
        );
        assert_eq!(output.paper("B").unwrap().num_in(), 1);
        assert_eq!(output.section("methods").unwrap().body, "Methods body");
    }

    #[tokio::test]
    async fn test_cache_miss_runs_full_path() {
        let mut mocks = Mocks::new();
        mocks.store.expect_lookup().returning(|_, _| Ok(Vec::new()));
        mocks
            .keywords
            .expect_keywords()
            .times(1)
            .returning(|_| Ok(vec!["graphs".to_string()]));
        mocks
            .source
            .expect_fetch()
            .withf(|keywords, max_n| keywords == ["graphs".to_string()] && *max_n == 10)
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    raw("A", &["B", "C"]),
                    raw("B", &["C"]),
                    raw("C", &[]),
                    raw("A", &[]),
                ])
            });
        mocks.analyzer.expect_analyze().times(3).returning(|content| {
            if content == "content B" {
                Err(LlmError::InvalidResponse {
                    message: "garbage".to_string(),
                })
            } else {
                Ok(Analysis {
                    summary: format!("summary of {}", content),
                    ..Default::default()
                })
            }
        });
        mocks.store.expect_insert().times(3).returning(|_| Ok(()));
        expect_sections(&mut mocks);

        let output = mocks.pipeline(config()).run("  graphs ").await.unwrap();

        assert_eq!(output.query, "graphs");
        assert_eq!(output.cache, CacheStatus::Miss);
        assert_eq!(
            output.stages,
            vec![
                PipelineStage::Received,
                PipelineStage::CacheLookup,
                PipelineStage::Fetch,
                PipelineStage::Analyze,
                PipelineStage::Persist,
                PipelineStage::GraphBuild,
                PipelineStage::Aggregate,
                PipelineStage::WriteSections,
                PipelineStage::Assembled,
            ]
        );

        assert_eq!(output.graph.len(), 3);
        assert_eq!(output.paper("A").unwrap().num_in(), 0);
        assert_eq!(output.paper("B").unwrap().num_in(), 1);
        assert_eq!(output.paper("C").unwrap().num_in(), 2);
        assert!(output.paper("B").unwrap().analysis.is_empty());
        assert_eq!(output.paper("A").unwrap().analysis.summary, "summary of content A");

        let analyze_failures: Vec<_> = output.failures_in(PipelineStage::Analyze).collect();
        assert_eq!(analyze_failures.len(), 1);
        assert_eq!(analyze_failures[0].key, "B");
    }

    #[tokio::test]
    async fn test_persist_failure_is_not_fatal() {
        let mut mocks = Mocks::new();
        mocks.store.expect_lookup().returning(|_, _| Ok(Vec::new()));
        mocks
            .keywords
            .expect_keywords()
            .returning(|_| Ok(vec!["k".to_string()]));
        mocks
            .source
            .expect_fetch()
            .returning(|_, _| Ok(vec![raw("A", &[])]));
        mocks.analyzer.expect_analyze().returning(|_| {
            Ok(Analysis {
                summary: "s".to_string(),
                ..Default::default()
            })
        });
        mocks.store.expect_insert().returning(|_| {
            Err(StorageError::Connection {
                message: "store down".to_string(),
            })
        });
        expect_sections(&mut mocks);

        let output = mocks.pipeline(config()).run("topic").await.unwrap();
        assert_eq!(output.failures_in(PipelineStage::Persist).count(), 1);
        assert_eq!(output.sections.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_topic_rejected_before_lookup() {
        let mut mocks = Mocks::new();
        mocks.store.expect_lookup().times(0);

        let err = mocks.pipeline(config()).run("   ").await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTopic { .. }));
        assert_eq!(err.stage(), PipelineStage::Received);
    }

    #[tokio::test]
    async fn test_no_papers_is_fatal() {
        let mut mocks = Mocks::new();
        mocks.store.expect_lookup().returning(|_, _| Ok(Vec::new()));
        mocks
            .keywords
            .expect_keywords()
            .returning(|_| Ok(vec!["k".to_string()]));
        mocks.source.expect_fetch().returning(|_, _| Ok(Vec::new()));
        mocks.analyzer.expect_analyze().times(0);
        mocks.outline.expect_outline().times(0);

        let err = mocks.pipeline(config()).run("topic").await.unwrap_err();
        assert!(matches!(err, PipelineError::NoPapers { .. }));
        assert_eq!(err.stage(), PipelineStage::Fetch);
    }

    #[tokio::test]
    async fn test_fatal_error_ends_in_failed_stage() {
        let mut mocks = Mocks::new();
        mocks.store.expect_lookup().returning(|_, _| Ok(Vec::new()));
        mocks
            .keywords
            .expect_keywords()
            .returning(|_| Ok(vec!["k".to_string()]));
        mocks.source.expect_fetch().returning(|_, _| Ok(Vec::new()));
        let pipeline = mocks.pipeline(config());

        let mut state = RunState::new();
        let err = pipeline
            .execute(Uuid::new_v4(), "topic", &mut state)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NoPapers { .. }));
        assert_eq!(
            state.stages,
            vec![
                PipelineStage::Received,
                PipelineStage::CacheLookup,
                PipelineStage::Fetch,
                PipelineStage::Failed,
            ]
        );
        assert!(state.stages.last().is_some_and(|s| s.is_terminal()));
    }

    #[tokio::test]
    async fn test_blank_topic_goes_straight_to_failed() {
        let pipeline = Mocks::new().pipeline(config());
        let mut state = RunState::new();
        let err = pipeline
            .execute(Uuid::new_v4(), "   ", &mut state)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTopic { .. }));
        assert_eq!(
            state.stages,
            vec![PipelineStage::Received, PipelineStage::Failed]
        );
    }

    #[tokio::test]
    async fn test_fetch_and_keyword_errors_are_fatal() {
        let mut mocks = Mocks::new();
        mocks.store.expect_lookup().returning(|_, _| Ok(Vec::new()));
        mocks.keywords.expect_keywords().returning(|_| {
            Err(LlmError::MissingCredentials {
                message: "no key".to_string(),
            })
        });
        let err = mocks.pipeline(config()).run("topic").await.unwrap_err();
        assert!(matches!(err, PipelineError::Keywords(_)));

        let mut mocks = Mocks::new();
        mocks.store.expect_lookup().returning(|_, _| Ok(Vec::new()));
        mocks
            .keywords
            .expect_keywords()
            .returning(|_| Ok(vec!["k".to_string()]));
        mocks.source.expect_fetch().returning(|_, _| {
            Err(ScholarError::Unavailable {
                message: "down".to_string(),
                retries: 3,
            })
        });
        let err = mocks.pipeline(config()).run("topic").await.unwrap_err();
        assert!(matches!(err, PipelineError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_aggregation_failure_stops_before_writing() {
        let mut mocks = Mocks::new();
        mocks
            .store
            .expect_lookup()
            .returning(|_, _| Ok(vec![stored("A", &[])]));
        mocks.outline.expect_outline().returning(|_| {
            Err(LlmError::InvalidResponse {
                message: "not json".to_string(),
            })
        });
        mocks.writer.expect_write().times(0);

        let err = mocks.pipeline(config()).run("topic").await.unwrap_err();
        assert!(matches!(err, PipelineError::Aggregation { .. }));
        assert_eq!(err.stage(), PipelineStage::Aggregate);
    }

    #[tokio::test]
    async fn test_gap_check_runs_when_enabled() {
        let mut mocks = Mocks::new();
        mocks
            .store
            .expect_lookup()
            .returning(|query, _| {
                if query == "topic" {
                    Ok(vec![stored("A", &[])])
                } else {
                    Ok(vec![stored("A", &[]), stored("Z", &[])])
                }
            });
        mocks
            .gaps
            .expect_evaluate()
            .times(1)
            .returning(|_, _, _| Ok("Not addressed".to_string()));
        expect_sections(&mut mocks);

        let config = PipelineConfig {
            gap_check: GapCheckConfig {
                enabled: true,
                max_gaps: 5,
                top_k: 3,
            },
            ..config()
        };
        let output = mocks.pipeline(config).run("topic").await.unwrap();

        assert_eq!(
            output.stages[output.stages.len() - 2],
            PipelineStage::CheckGaps
        );
        assert_eq!(output.gaps.len(), 1);
        assert_eq!(output.gaps[0].question, "gap A");
        assert_eq!(output.gaps[0].candidates[0].url, "Z");
    }

    #[test]
    fn test_dedup_by_url_keeps_first() {
        let papers = dedup_by_url(vec![raw("A", &["X"]), raw("B", &[]), raw("A", &[])]);
        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0].num_out(), 1);
    }
}
