//! Ragline application binary - composition root.
//!
//! 1. Parse CLI arguments, load `.env` and configuration from TOML
//! 2. Apply environment and CLI overrides, then validate
//! 3. Build the embedder and vector store handles and the pipeline
//! 4. Ingest the directory, retrieve passages and generate an answer
//! 5. Print the combined result as JSON on stdout

mod cli;
mod logging;
mod runner;

use clap::Parser;
use ragline_core::config::RaglineConfig;
use ragline_core::DirectoryAllowList;
use ragline_generate::{AnswerComposer, OllamaClient};
use ragline_pdf::PdfDirectoryLoader;
use ragline_vector::RagPipeline;

use cli::{load_env_file, CliArgs};
use runner::{build_embedder, build_store, run_pipeline, RunRequest};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let env_file = load_env_file(args.env_file.as_deref())?;
    let config_file = args.resolve_config_path();
    let mut config = RaglineConfig::load_or_default(&config_file);
    config.apply_env()?;
    args.apply_to(&mut config)?;

    logging::init_tracing(&config.general.log_level, &config.retrieval.query_log)?;
    tracing::info!("Starting Ragline v{}", env!("CARGO_PKG_VERSION"));
    if let Some(ref path) = env_file {
        tracing::info!(path = %path.display(), "Environment file loaded");
    }
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }

    // Pipeline.
    let allow_list = DirectoryAllowList::new(&config.ingest.allowed_directories)?;
    let pipeline = RagPipeline::new(
        PdfDirectoryLoader::new(),
        build_embedder(&config.embedding, config.store.dimension),
        build_store(&config.store),
        allow_list,
    )
    .with_point_ids(config.store.point_ids);
    let composer = AnswerComposer::new(OllamaClient::from_config(&config.generation)?);

    let request = RunRequest {
        directory: args.directory.clone(),
        query: args.query.clone(),
        chunk_size: config.ingest.chunk_size,
        chunk_overlap: config.ingest.chunk_overlap,
        top_k: config.retrieval.top_k,
    };
    tracing::info!(
        directory = %request.directory.display(),
        query = %request.query,
        chunk_size = request.chunk_size,
        chunk_overlap = request.chunk_overlap,
        top_k = request.top_k,
        "Running pipeline"
    );

    match run_pipeline(&pipeline, &composer, &request).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, kind = ?e.kind(), "Pipeline run failed");
            Err(e.into())
        }
    }
}
