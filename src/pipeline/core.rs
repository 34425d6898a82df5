//! Collaborators shared by every pipeline stage.

use std::sync::Arc;

use crate::scholar::PaperSource;
use crate::services::{GapEvaluator, KeywordService, OutlineService, PaperAnalyzer, SectionWriter};
use crate::storage::PaperStore;

/// Core infrastructure shared by the pipeline stages.
///
/// Holds the store and every external service behind trait objects so a
/// request can be driven by real adapters or by test doubles alike. Cloning
/// is cheap.
#[derive(Clone)]
pub struct PipelineCore {
    store: Arc<dyn PaperStore>,
    source: Arc<dyn PaperSource>,
    keywords: Arc<dyn KeywordService>,
    analyzer: Arc<dyn PaperAnalyzer>,
    outline: Arc<dyn OutlineService>,
    writer: Arc<dyn SectionWriter>,
    gaps: Arc<dyn GapEvaluator>,
}

impl PipelineCore {
    /// Create a core from individual collaborators.
    pub fn new(
        store: Arc<dyn PaperStore>,
        source: Arc<dyn PaperSource>,
        keywords: Arc<dyn KeywordService>,
        analyzer: Arc<dyn PaperAnalyzer>,
        outline: Arc<dyn OutlineService>,
        writer: Arc<dyn SectionWriter>,
        gaps: Arc<dyn GapEvaluator>,
    ) -> Self {
        Self {
            store,
            source,
            keywords,
            analyzer,
            outline,
            writer,
            gaps,
        }
    }

    /// Create a core where one value provides every completion-backed service.
    pub fn with_services<S>(
        store: Arc<dyn PaperStore>,
        source: Arc<dyn PaperSource>,
        services: Arc<S>,
    ) -> Self
    where
        S: KeywordService
            + PaperAnalyzer
            + OutlineService
            + SectionWriter
            + GapEvaluator
            + 'static,
    {
        Self::new(
            store,
            source,
            services.clone(),
            services.clone(),
            services.clone(),
            services.clone(),
            services,
        )
    }

    /// Get the similarity store.
    #[inline]
    pub fn store(&self) -> &Arc<dyn PaperStore> {
        &self.store
    }

    /// Get the paper source.
    #[inline]
    pub fn source(&self) -> &Arc<dyn PaperSource> {
        &self.source
    }

    /// Get the keyword service.
    #[inline]
    pub fn keywords(&self) -> &Arc<dyn KeywordService> {
        &self.keywords
    }

    /// Get the paper analyzer.
    #[inline]
    pub fn analyzer(&self) -> &Arc<dyn PaperAnalyzer> {
        &self.analyzer
    }

    /// Get the outline service.
    #[inline]
    pub fn outline(&self) -> &Arc<dyn OutlineService> {
        &self.outline
    }

    /// Get the section writer.
    #[inline]
    pub fn writer(&self) -> &Arc<dyn SectionWriter> {
        &self.writer
    }

    /// Get the gap evaluator.
    #[inline]
    pub fn gaps(&self) -> &Arc<dyn GapEvaluator> {
        &self.gaps
    }
}
