//! Storage layer for analyzed papers.
//!
//! The store is both the topic cache (papers analyzed by earlier requests)
//! and the retrieval index used when writing review sections. Similarity is
//! lexical: no embeddings are computed here.

mod lexical;
mod sqlite;

pub use lexical::chunk_text;
pub use sqlite::SqliteStorage;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::model::{Passage, PaperRecord};

/// Passage chunking parameters, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: 1000,
            overlap: 100,
        }
    }
}

/// Similarity store holding previously analyzed papers.
///
/// Implementations must tolerate concurrent calls for distinct papers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaperStore: Send + Sync {
    /// Papers most similar to `query`, best first, at most `limit`.
    /// An empty result means nothing relevant is stored.
    async fn lookup(&self, query: &str, limit: usize) -> StorageResult<Vec<PaperRecord>>;

    /// Insert or replace a paper together with its references and passages.
    async fn insert(&self, record: &PaperRecord) -> StorageResult<()>;

    /// Passages most relevant to `query`, best first, at most `k`.
    async fn passages(&self, query: &str, k: usize) -> StorageResult<Vec<Passage>>;

    /// Fetch a single stored paper by url.
    async fn get_paper(&self, url: &str) -> StorageResult<Option<PaperRecord>>;
}
