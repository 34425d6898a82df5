use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use super::lexical::{query_terms, score};
use super::{chunk_text, ChunkConfig, PaperStore};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::model::{Analysis, Passage, PaperRecord};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const TITLE_WEIGHT: f64 = 3.0;
const SUMMARY_WEIGHT: f64 = 2.0;
const CONTENT_WEIGHT: f64 = 1.0;

/// SQLite-backed paper store
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
    chunking: ChunkConfig,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        Self::from_pool(pool).await
    }

    /// Create a store backed by a private in-memory database.
    ///
    /// The pool holds exactly one connection that never expires; an in-memory
    /// database lives only as long as its connection.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> StorageResult<Self> {
        let storage = Self {
            pool,
            chunking: ChunkConfig::default(),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Override passage chunking for subsequent inserts
    pub fn with_chunking(mut self, chunking: ChunkConfig) -> Self {
        self.chunking = chunking;
        self
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of stored papers
    pub async fn paper_count(&self) -> StorageResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM papers")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Number of stored passages for a paper
    pub async fn passage_count(&self, url: &str) -> StorageResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM paper_passages WHERE paper_url = ?")
                .bind(url)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn load_paper(&self, url: &str) -> StorageResult<Option<PaperRecord>> {
        let row: Option<PaperRow> = sqlx::query_as(
            r#"
            SELECT url, name, authors, publication_date, content,
                   summary, method_issues, conflict_of_interest, future_research
            FROM papers
            WHERE url = ?
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let references: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT reference_key
            FROM paper_references
            WHERE paper_url = ?
            ORDER BY reference_key ASC
            "#,
        )
        .bind(url)
        .fetch_all(&self.pool)
        .await?;

        let record = row
            .into_record()?
            .with_out_references(references.into_iter().map(|(key,)| key));
        Ok(Some(record))
    }
}

#[async_trait]
impl PaperStore for SqliteStorage {
    async fn lookup(&self, query: &str, limit: usize) -> StorageResult<Vec<PaperRecord>> {
        let terms = query_terms(query);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let candidates: Vec<(String, String, String, String)> =
            sqlx::query_as("SELECT url, name, summary, content FROM papers")
                .fetch_all(&self.pool)
                .await?;

        let mut ranked: Vec<(f64, String)> = candidates
            .into_iter()
            .filter_map(|(url, name, summary, content)| {
                let s = score(
                    &terms,
                    &[
                        (&name, TITLE_WEIGHT),
                        (&summary, SUMMARY_WEIGHT),
                        (&content, CONTENT_WEIGHT),
                    ],
                );
                (s > 0.0).then_some((s, url))
            })
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        ranked.truncate(limit);

        debug!(query = %query, hits = ranked.len(), "Paper lookup ranked");

        let mut papers = Vec::with_capacity(ranked.len());
        for (_, url) in ranked {
            if let Some(paper) = self.load_paper(&url).await? {
                papers.push(paper);
            }
        }
        Ok(papers)
    }

    async fn insert(&self, record: &PaperRecord) -> StorageResult<()> {
        let authors = serde_json::to_string(&record.authors).map_err(|e| StorageError::Query {
            message: format!("Failed to encode authors: {}", e),
        })?;
        let future_research = serde_json::to_string(&record.analysis.future_research).map_err(
            |e| StorageError::Query {
                message: format!("Failed to encode future research: {}", e),
            },
        )?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO papers (url, name, authors, publication_date, content, summary,
                                method_issues, conflict_of_interest, future_research,
                                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                name = excluded.name,
                authors = excluded.authors,
                publication_date = excluded.publication_date,
                content = excluded.content,
                summary = excluded.summary,
                method_issues = excluded.method_issues,
                conflict_of_interest = excluded.conflict_of_interest,
                future_research = excluded.future_research,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.url())
        .bind(&record.name)
        .bind(&authors)
        .bind(record.publication_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(&record.content)
        .bind(&record.analysis.summary)
        .bind(&record.analysis.method_issues)
        .bind(&record.analysis.conflict_of_interest)
        .bind(&future_research)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM paper_references WHERE paper_url = ?")
            .bind(record.url())
            .execute(&mut *tx)
            .await?;
        for key in record.out_references() {
            sqlx::query("INSERT INTO paper_references (paper_url, reference_key) VALUES (?, ?)")
                .bind(record.url())
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM paper_passages WHERE paper_url = ?")
            .bind(record.url())
            .execute(&mut *tx)
            .await?;
        let chunks = chunk_text(&record.content, self.chunking.size, self.chunking.overlap);
        for (ordinal, text) in chunks.iter().enumerate() {
            sqlx::query("INSERT INTO paper_passages (paper_url, ordinal, text) VALUES (?, ?, ?)")
                .bind(record.url())
                .bind(ordinal as i64)
                .bind(text)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        debug!(
            url = %record.url(),
            references = record.num_out(),
            passages = chunks.len(),
            "Paper stored"
        );
        Ok(())
    }

    async fn passages(&self, query: &str, k: usize) -> StorageResult<Vec<Passage>> {
        let terms = query_terms(query);
        if terms.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let rows: Vec<(String, i64, String, String, String)> = sqlx::query_as(
            r#"
            SELECT pp.paper_url, pp.ordinal, pp.text, p.name, p.authors
            FROM paper_passages pp
            JOIN papers p ON p.url = pp.paper_url
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut ranked: Vec<(f64, i64, Passage)> = rows
            .into_iter()
            .filter_map(|(paper_url, ordinal, text, name, authors)| {
                let s = score(&terms, &[(&text, CONTENT_WEIGHT), (&name, CONTENT_WEIGHT)]);
                (s > 0.0).then(|| {
                    (
                        s,
                        ordinal,
                        Passage {
                            paper_url,
                            paper_name: name,
                            authors: serde_json::from_str(&authors).unwrap_or_default(),
                            text,
                            score: s,
                        },
                    )
                })
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.2.paper_url.cmp(&b.2.paper_url))
                .then_with(|| a.1.cmp(&b.1))
        });

        Ok(ranked.into_iter().take(k).map(|(_, _, p)| p).collect())
    }

    async fn get_paper(&self, url: &str) -> StorageResult<Option<PaperRecord>> {
        self.load_paper(url.trim()).await
    }
}

// Internal row type for SQLx mapping
#[derive(sqlx::FromRow)]
struct PaperRow {
    url: String,
    name: String,
    authors: String,
    publication_date: Option<String>,
    content: String,
    summary: String,
    method_issues: String,
    conflict_of_interest: String,
    future_research: String,
}

impl PaperRow {
    fn into_record(self) -> StorageResult<PaperRecord> {
        let authors: Vec<String> = serde_json::from_str(&self.authors).unwrap_or_default();
        let future_research: Vec<String> =
            serde_json::from_str(&self.future_research).unwrap_or_default();

        let mut record = PaperRecord::new(self.url, self.name)
            .map_err(|e| StorageError::Query {
                message: format!("Stored paper is invalid: {}", e),
            })?
            .with_authors(authors)
            .with_content(self.content)
            .with_analysis(Analysis {
                summary: self.summary,
                method_issues: self.method_issues,
                conflict_of_interest: self.conflict_of_interest,
                future_research,
            });
        record.publication_date = self
            .publication_date
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok());
        Ok(record)
    }
}
