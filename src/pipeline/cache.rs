use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{bounded_fan_out, ItemFailure, PipelineStage};
use crate::model::PaperRecord;
use crate::storage::PaperStore;

/// Topic cache in front of the similarity store.
///
/// A lookup returning at least one record is a hit, however few records
/// it returns. Store failures never escape: a failed lookup is a miss and a
/// failed insert is reported as an [`ItemFailure`].
#[derive(Clone)]
pub struct CacheGateway {
    store: Arc<dyn PaperStore>,
    limit: usize,
}

impl CacheGateway {
    /// Create a gateway returning at most `limit` records per lookup
    pub fn new(store: Arc<dyn PaperStore>, limit: usize) -> Self {
        Self {
            store,
            limit: limit.max(1),
        }
    }

    /// Prior results for a topic; empty on a miss.
    pub async fn lookup(&self, topic: &str) -> Vec<PaperRecord> {
        match self.store.lookup(topic, self.limit).await {
            Ok(records) => {
                info!(
                    topic = %topic,
                    hits = records.len(),
                    hit = !records.is_empty(),
                    "Cache lookup complete"
                );
                records
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Cache lookup failed, treating as miss");
                Vec::new()
            }
        }
    }

    /// Persist one record.
    pub async fn persist(&self, record: &PaperRecord) -> Result<(), ItemFailure> {
        match self.store.insert(record).await {
            Ok(()) => {
                debug!(url = %record.url(), "Paper persisted");
                Ok(())
            }
            Err(e) => {
                warn!(url = %record.url(), error = %e, "Persist failed, skipping");
                Err(ItemFailure::new(PipelineStage::Persist, record.url(), e))
            }
        }
    }

    /// Persist records concurrently; distinct papers never share a key.
    pub async fn persist_all(&self, records: &[PaperRecord], concurrency: usize) -> Vec<ItemFailure> {
        bounded_fan_out(records.iter().collect(), concurrency, |record| self.persist(record))
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect()
    }
}
