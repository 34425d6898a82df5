use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::model::{PaperRecord, ReviewSection};
use crate::services::{OutlineService, SectionDraft};

/// Reduces per-paper analyses to an ordered, duplicate-free section list.
#[derive(Clone)]
pub struct ThemeAggregator {
    outline: Arc<dyn OutlineService>,
}

impl ThemeAggregator {
    /// Create an aggregator
    pub fn new(outline: Arc<dyn OutlineService>) -> Self {
        Self { outline }
    }

    /// Propose review sections for an analyzed working set.
    ///
    /// Fails when no paper carries any analysis, when the outline service
    /// fails or its reply does not parse, and when no usable section remains.
    pub async fn aggregate(&self, papers: &[PaperRecord]) -> PipelineResult<Vec<ReviewSection>> {
        let themes = theme_corpus(papers);
        if themes.is_empty() {
            return Err(PipelineError::Aggregation {
                message: "no analyzed papers to aggregate".to_string(),
            });
        }

        let drafts = self
            .outline
            .outline(&themes)
            .await
            .map_err(|e| PipelineError::Aggregation {
                message: e.to_string(),
            })?;
        let proposed = drafts.len();

        let sections = merge_drafts(drafts);
        if sections.is_empty() {
            return Err(PipelineError::Aggregation {
                message: "outline contained no usable sections".to_string(),
            });
        }

        info!(
            proposed = proposed,
            sections = sections.len(),
            "Themes aggregated"
        );
        Ok(sections)
    }
}

/// Combined theme text of every analyzed paper.
///
/// Papers are taken in url order so the corpus does not depend on the order
/// analyses completed in.
pub fn theme_corpus(papers: &[PaperRecord]) -> String {
    let mut analyzed: Vec<&PaperRecord> = papers
        .iter()
        .filter(|p| !p.analysis.is_empty())
        .collect();
    analyzed.sort_by(|a, b| a.url().cmp(b.url()));

    analyzed
        .into_iter()
        .map(|paper| {
            let mut block = paper.name.clone();
            if !paper.analysis.summary.is_empty() {
                block.push_str("\nSummary: ");
                block.push_str(&paper.analysis.summary);
            }
            if !paper.analysis.future_research.is_empty() {
                block.push_str("\nFuture research: ");
                block.push_str(&paper.analysis.future_research.join("; "));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Validate drafts and merge those whose titles differ only in case or spacing.
///
/// The first spelling of a title wins and keeps its position; distinct
/// descriptions of merged drafts are joined.
pub fn merge_drafts(drafts: Vec<SectionDraft>) -> Vec<ReviewSection> {
    let mut sections: Vec<ReviewSection> = Vec::with_capacity(drafts.len());
    let mut positions: HashMap<String, usize> = HashMap::new();
    // descriptions already joined into each section, compared whole
    let mut joined: Vec<HashSet<String>> = Vec::with_capacity(drafts.len());

    for draft in drafts {
        let section = match ReviewSection::new(draft.title, draft.description) {
            Ok(section) => section,
            Err(e) => {
                warn!(error = %e, "Dropping outline entry");
                continue;
            }
        };

        match positions.get(&section.key()) {
            Some(&i) => {
                let existing = &mut sections[i];
                debug!(title = %existing.title(), "Merging duplicate section");
                let extra = section.description;
                if !extra.is_empty() && joined[i].insert(extra.clone()) {
                    if existing.description.is_empty() {
                        existing.description = extra;
                    } else {
                        existing.description.push_str("\n\n");
                        existing.description.push_str(&extra);
                    }
                }
            }
            None => {
                positions.insert(section.key(), sections.len());
                joined.push(
                    Some(section.description.clone())
                        .filter(|d| !d.is_empty())
                        .into_iter()
                        .collect(),
                );
                sections.push(section);
            }
        }
    }
    sections
}
