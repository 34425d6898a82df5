use thiserror::Error;

use crate::pipeline::PipelineStage;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Completion service error: {0}")]
    Llm(#[from] LlmError),

    #[error("Scholar error: {0}")]
    Scholar(#[from] ScholarError),

    #[error("Pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Paper not found: {url}")]
    PaperNotFound { url: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Text-completion service errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing credentials: {message}")]
    MissingCredentials { message: String },

    #[error("Completion service unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl LlmError {
    /// Whether a retry of the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmError::Timeout { .. } | LlmError::Http(_) => true,
            LlmError::MissingCredentials { .. }
            | LlmError::Unavailable { .. }
            | LlmError::InvalidResponse { .. } => false,
        }
    }
}

/// Bibliographic search service errors
#[derive(Debug, Error)]
pub enum ScholarError {
    #[error("Scholar unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ScholarError {
    /// Whether a retry of the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScholarError::Api { status, .. } => *status == 429 || *status >= 500,
            ScholarError::Http(_) => true,
            ScholarError::Unavailable { .. } | ScholarError::InvalidResponse { .. } => false,
        }
    }
}

/// Record validation failure raised at construction time
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Validation failed: {field} - {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    /// Create a validation error for a field
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Fatal per-request pipeline failures.
///
/// Each variant belongs to exactly one [`PipelineStage`]; per-item failures
/// (one paper, one section) never surface here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid topic: {reason}")]
    InvalidTopic { reason: String },

    #[error("Keyword extraction failed: {0}")]
    Keywords(#[source] LlmError),

    #[error("Paper fetch failed: {0}")]
    Fetch(#[source] ScholarError),

    #[error("No papers found for topic '{topic}'")]
    NoPapers { topic: String },

    #[error("Aggregation failed: {message}")]
    Aggregation { message: String },
}

impl PipelineError {
    /// The stage that was running when this error occurred.
    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::InvalidTopic { .. } => PipelineStage::Received,
            PipelineError::Keywords(_) | PipelineError::Fetch(_) | PipelineError::NoPapers { .. } => {
                PipelineStage::Fetch
            }
            PipelineError::Aggregation { .. } => PipelineStage::Aggregate,
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for completion service operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Result type alias for bibliographic search operations
pub type ScholarResult<T> = Result<T, ScholarError>;

/// Result type alias for pipeline runs
pub type PipelineResult<T> = Result<T, PipelineError>;
