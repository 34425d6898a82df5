use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use incite_review::{
    cli::{self, Cli},
    config::Config,
    llm::CompletionClient,
    pipeline::{Pipeline, PipelineCore},
    scholar::SemanticScholarClient,
    services::LlmServices,
    storage::{ChunkConfig, SqliteStorage},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "InCite review starting..."
    );

    // Initialize storage
    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s.with_chunking(ChunkConfig {
                size: config.pipeline.chunk_size,
                overlap: config.pipeline.chunk_overlap,
            })
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    // Initialize completion client
    let client = match CompletionClient::new(&config.llm, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.llm.base_url, "Completion client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize completion client");
            return Err(e.into());
        }
    };

    let source = match SemanticScholarClient::new(&config.scholar, config.request.clone()) {
        Ok(s) => s.with_reference_concurrency(config.pipeline.analysis_concurrency),
        Err(e) => {
            error!(error = %e, "Failed to initialize Semantic Scholar client");
            return Err(e.into());
        }
    };

    let services = Arc::new(LlmServices::new(client, &config.llm));
    let core = PipelineCore::with_services(Arc::new(storage), Arc::new(source), services);
    let pipeline = Pipeline::new(core, config.pipeline.clone());

    let result = cli::execute(args.command, &pipeline).await;
    if result.exit_code == 0 {
        println!("{}", result.message);
        Ok(())
    } else {
        eprintln!("{}", result.message);
        std::process::exit(result.exit_code);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        incite_review::config::LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        incite_review::config::LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
