use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{bounded_fan_out, ItemFailure, PipelineStage};
use crate::model::{Passage, ReviewSection, WrittenSection};
use crate::services::SectionWriter;
use crate::storage::PaperStore;

/// Retrieves sources for each section and writes the sections concurrently.
#[derive(Clone)]
pub struct SectionFanOut {
    store: Arc<dyn PaperStore>,
    writer: Arc<dyn SectionWriter>,
    concurrency: usize,
    sources_per_section: usize,
}

impl SectionFanOut {
    /// Create a fan-out retrieving `sources_per_section` passages per section
    pub fn new(
        store: Arc<dyn PaperStore>,
        writer: Arc<dyn SectionWriter>,
        concurrency: usize,
        sources_per_section: usize,
    ) -> Self {
        Self {
            store,
            writer,
            concurrency: concurrency.max(1),
            sources_per_section,
        }
    }

    async fn write_one(
        &self,
        topic: &str,
        section: ReviewSection,
    ) -> (WrittenSection, Vec<ItemFailure>) {
        let title = section.title().to_string();
        let mut failures = Vec::new();

        let passages = match self.store.passages(&title, self.sources_per_section).await {
            Ok(passages) => passages,
            Err(e) => {
                warn!(section = %title, error = %e, "Source retrieval failed, writing without sources");
                failures.push(ItemFailure::new(
                    PipelineStage::WriteSections,
                    &title,
                    format!("source retrieval failed: {}", e),
                ));
                Vec::new()
            }
        };
        let sources = citation_keys(&passages);
        let source_block = format_sources(&passages);

        let result = self
            .writer
            .write(topic, &title, &section.description, &source_block)
            .await;

        let (body, failed) = match result {
            Ok(body) => {
                debug!(section = %title, sources = sources.len(), "Section written");
                (body, false)
            }
            Err(e) => {
                warn!(section = %title, error = %e, "Section writer failed");
                failures.push(ItemFailure::new(PipelineStage::WriteSections, &title, &e));
                (String::new(), true)
            }
        };

        let written = WrittenSection {
            title,
            description: section.description,
            body,
            sources,
            failed,
        };
        (written, failures)
    }

    /// Write every section; output follows the input section order.
    pub async fn write_sections(
        &self,
        topic: &str,
        sections: Vec<ReviewSection>,
    ) -> (Vec<WrittenSection>, Vec<ItemFailure>) {
        let total = sections.len();
        let outcomes =
            bounded_fan_out(sections, self.concurrency, |section| self.write_one(topic, section))
                .await;

        let mut written = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (section, mut errs) in outcomes {
            written.push(section);
            failures.append(&mut errs);
        }

        info!(
            sections = total,
            failed = written.iter().filter(|s| s.failed).count(),
            "Section writing complete"
        );
        (written, failures)
    }
}

/// Distinct citation keys of the passages, in retrieval order.
fn citation_keys(passages: &[Passage]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for passage in passages {
        if !keys.contains(&passage.paper_url) {
            keys.push(passage.paper_url.clone());
        }
    }
    keys
}

/// Format passages into a numbered, citation-ready source block.
pub fn format_sources(passages: &[Passage]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, passage)| {
            let authors = if passage.authors.is_empty() {
                "Unknown Authors".to_string()
            } else {
                passage.authors.join(", ")
            };
            format!(
                "[{}] {} by {} ({}):\n{}",
                i + 1,
                passage.paper_name,
                authors,
                passage.paper_url,
                passage.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
