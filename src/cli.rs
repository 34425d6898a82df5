//! Command-line surface: argument parsing, command execution and rendering.

use clap::{Parser, Subcommand, ValueEnum};

use crate::pipeline::{CacheStatus, Pipeline, ReviewOutput};
use crate::storage::PaperStore;

/// Citation-graph-augmented literature reviews from a research topic.
#[derive(Parser, Debug)]
#[command(name = "incite-review", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Produce a literature review for a topic
    Review {
        /// Free-text research topic
        topic: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
    },

    /// Show one stored paper as JSON
    Paper {
        /// Paper url
        url: String,
    },
}

/// Review output format.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Markdown,
}

/// Result of CLI command execution.
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Execute a command against a ready pipeline.
pub async fn execute(command: Commands, pipeline: &Pipeline) -> CliResult {
    match command {
        Commands::Review { topic, format } => match pipeline.run(&topic).await {
            Ok(output) => match format {
                OutputFormat::Markdown => CliResult::success(render_markdown(&output)),
                OutputFormat::Json => match serde_json::to_string_pretty(&output) {
                    Ok(json) => CliResult::success(json),
                    Err(e) => CliResult::error(format!("Failed to encode review: {}", e)),
                },
            },
            Err(e) => CliResult::error(format!("Review failed at {}: {}", e.stage(), e)),
        },
        Commands::Paper { url } => show_paper(pipeline.core().store().as_ref(), &url).await,
    }
}

async fn show_paper(store: &dyn PaperStore, url: &str) -> CliResult {
    match store.get_paper(url).await {
        Ok(Some(paper)) => match serde_json::to_string_pretty(&paper) {
            Ok(json) => CliResult::success(json),
            Err(e) => CliResult::error(format!("Failed to encode paper: {}", e)),
        },
        Ok(None) => CliResult::error(format!("Paper not found: {}", url)),
        Err(e) => CliResult::error(format!("Storage error: {}", e)),
    }
}

/// Render a review as markdown.
pub fn render_markdown(output: &ReviewOutput) -> String {
    let mut out = format!("# Literature review: {}\n", output.query);
    if output.cache == CacheStatus::Hit {
        out.push_str("\n_Built from previously analyzed papers._\n");
    }

    for section in &output.sections {
        out.push('\n');
        let body = section.body.trim();
        if section.failed || body.is_empty() {
            out.push_str(&format!("### {}\n\n_This section could not be written._\n", section.title));
            continue;
        }
        if !body.starts_with('#') {
            out.push_str(&format!("### {}\n\n", section.title));
        }
        out.push_str(body);
        out.push('\n');
    }

    if !output.graph.is_empty() {
        out.push_str("\n## Papers\n\n");
        for paper in &output.graph {
            let authors = if paper.authors.is_empty() {
                "Unknown Authors".to_string()
            } else {
                paper.authors.join(", ")
            };
            out.push_str(&format!(
                "- [{}]({}) by {} (cites {}, cited by {})\n",
                paper.name,
                paper.url(),
                authors,
                paper.num_out(),
                paper.num_in()
            ));
        }
    }

    if !output.gaps.is_empty() {
        out.push_str("\n## Open questions\n");
        for gap in &output.gaps {
            out.push_str(&format!("\n- {}\n", gap.question));
            for candidate in &gap.candidates {
                out.push_str(&format!("  - {}: {}\n", candidate.title, candidate.evaluation));
            }
        }
    }
    out
}
