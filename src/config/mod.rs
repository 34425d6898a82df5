use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub scholar: ScholarConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub pipeline: PipelineConfig,
}

/// Text-completion service configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    /// Model used for analysis, outlining, section writing and gap checks.
    pub model: String,
    /// Cheaper model used for keyword extraction.
    pub keyword_model: String,
}

/// Bibliographic search service configuration
#[derive(Debug, Clone)]
pub struct ScholarConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Drop papers whose title mentions "comment" or "review".
    pub skip_review_titles: bool,
    /// Drop papers for which no references could be retrieved.
    pub require_references: bool,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration shared by the external-call adapters
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Review pipeline tuning
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Result limit for the topic cache lookup.
    pub cache_lookup_limit: usize,
    /// Number of papers requested from the fetch service on a cache miss.
    pub max_papers: usize,
    pub analysis_concurrency: usize,
    pub section_concurrency: usize,
    /// Passages retrieved per review section.
    pub section_sources: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Resolve references by normalized title as well as by url.
    pub match_reference_titles: bool,
    pub gap_check: GapCheckConfig,
}

/// Research gap check configuration
#[derive(Debug, Clone)]
pub struct GapCheckConfig {
    pub enabled: bool,
    pub max_gaps: usize,
    pub top_k: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let parsed = |key: &str, default: usize| {
            lookup(key)
                .and_then(|s| s.trim().parse::<usize>().ok())
                .unwrap_or(default)
        };
        let flag = |key: &str, default: bool| {
            lookup(key)
                .map(|s| matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(default)
        };

        let api_key = lookup("ANTHROPIC_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AppError::Config {
                message: "ANTHROPIC_API_KEY is required".to_string(),
            })?;

        let llm = LlmConfig {
            api_key,
            base_url: var("ANTHROPIC_BASE_URL", "https://api.anthropic.com"),
            model: var("LLM_MODEL", "claude-3-5-sonnet-20241022"),
            keyword_model: var("KEYWORD_MODEL", "claude-3-5-haiku-20241022"),
        };

        let scholar = ScholarConfig {
            base_url: var(
                "SEMANTIC_SCHOLAR_BASE_URL",
                "https://api.semanticscholar.org/graph/v1",
            ),
            api_key: lookup("SEMANTIC_SCHOLAR_API_KEY").filter(|k| !k.trim().is_empty()),
            skip_review_titles: flag("SKIP_REVIEW_TITLES", true),
            require_references: flag("REQUIRE_REFERENCES", true),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(var("DATABASE_PATH", "./data/incite.db")),
            max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        };

        let logging = LoggingConfig {
            level: var("LOG_LEVEL", "info"),
            format: match var("LOG_FORMAT", "pretty").to_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: lookup("REQUEST_TIMEOUT_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(60000),
            max_retries: lookup("MAX_RETRIES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            retry_delay_ms: lookup("RETRY_DELAY_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
        };

        let workers = default_concurrency();
        let chunk_size = parsed("PASSAGE_CHUNK_SIZE", 1000).max(1);
        let pipeline = PipelineConfig {
            cache_lookup_limit: parsed("CACHE_LOOKUP_LIMIT", 100).max(1),
            max_papers: parsed("MAX_PAPERS", 10).max(1),
            analysis_concurrency: parsed("ANALYSIS_CONCURRENCY", workers).max(1),
            section_concurrency: parsed("SECTION_CONCURRENCY", workers).max(1),
            section_sources: parsed("SECTION_SOURCES", 5),
            chunk_size,
            // Overlap must leave the window room to advance.
            chunk_overlap: parsed("PASSAGE_CHUNK_OVERLAP", 100).min(chunk_size - 1),
            match_reference_titles: flag("MATCH_REFERENCE_TITLES", true),
            gap_check: GapCheckConfig {
                enabled: flag("GAP_CHECK_ENABLED", false),
                max_gaps: parsed("GAP_CHECK_MAX", 5),
                top_k: parsed("GAP_CHECK_TOP_K", 3),
            },
        };

        Ok(Config {
            llm,
            scholar,
            database,
            logging,
            request,
            pipeline,
        })
    }
}

/// Worker pool size when none is configured.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl RequestConfig {
    /// Backoff before retry number `retry` (1-based): `retry_delay_ms * 2^(retry-1)`,
    /// saturating instead of overflowing.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 2_u64
            .checked_pow(retry.saturating_sub(1))
            .unwrap_or(u64::MAX);
        Duration::from_millis(self.retry_delay_ms.saturating_mul(factor))
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for GapCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_gaps: 5,
            top_k: 3,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let workers = default_concurrency();
        Self {
            cache_lookup_limit: 100,
            max_papers: 10,
            analysis_concurrency: workers,
            section_concurrency: workers,
            section_sources: 5,
            chunk_size: 1000,
            chunk_overlap: 100,
            match_reference_titles: true,
            gap_check: GapCheckConfig::default(),
        }
    }
}
