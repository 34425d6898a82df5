//! # InCite Review
//!
//! Turns a free-text research topic into a literature review backed by a
//! citation graph of retrieved papers.
//!
//! ## Pipeline
//!
//! - **Cache lookup**: papers analyzed by earlier requests are reused when the
//!   store already holds anything relevant to the topic
//! - **Fetch and analyze**: otherwise keywords are extracted, papers are
//!   discovered and each paper is analyzed concurrently
//! - **Citation graph**: raw reference keys are resolved within the working set
//! - **Aggregation**: per-paper findings are reduced to review sections
//! - **Section writing**: each section is written concurrently from passages
//!   retrieved out of the store
//! - **Gap check** (optional): open questions are checked against stored papers
//!
//! ## Architecture
//!
//! ```text
//! CLI → Pipeline → Completion API / Semantic Scholar (HTTP)
//!           ↓
//!     SQLite (papers, references, passages)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use incite_review::{Config, Pipeline, PipelineCore};
//! use incite_review::llm::CompletionClient;
//! use incite_review::scholar::SemanticScholarClient;
//! use incite_review::services::LlmServices;
//! use incite_review::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = SqliteStorage::new(&config.database).await?;
//!     let client = CompletionClient::new(&config.llm, config.request.clone())?;
//!     let source = SemanticScholarClient::new(&config.scholar, config.request.clone())?;
//!     let services = Arc::new(LlmServices::new(client, &config.llm));
//!     let core = PipelineCore::with_services(Arc::new(store), Arc::new(source), services);
//!     let review = Pipeline::new(core, config.pipeline).run("graph neural networks").await?;
//!     println!("{} sections", review.sections.len());
//!     Ok(())
//! }
//! ```

/// Command-line parsing, execution and rendering.
pub mod cli;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Reference resolution and the per-request citation graph.
pub mod graph;
/// Text-completion API client.
pub mod llm;
/// Paper, analysis and section record types.
pub mod model;
/// The review pipeline and its stages.
pub mod pipeline;
/// Prompt templates for the completion-backed services.
pub mod prompts;
/// Paper discovery adapters.
pub mod scholar;
/// Completion-backed collaborator services.
pub mod services;
/// SQLite storage layer for papers and passages.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use pipeline::{Pipeline, PipelineCore, ReviewOutput};
