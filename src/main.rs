// src/main.rs
mod utils;
mod extractors;
mod pipeline;
mod sources;
mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use extractors::{MetricCatalog, MetricExtractor};
use storage::StorageManager;
use utils::AppError;

/// Environment variable consulted when `--catalog` is not given.
const CATALOG_ENV: &str = "FIN_METRICS_CATALOG";

/// Extracts financial metrics (in millions) and margins from financial documents
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Documents to analyze: PDF, plain text or HTML files, or http(s) URLs
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output directory for extracted metrics and metadata
    #[arg(short, long, default_value = "./output")]
    output_dir: String,

    /// Metric catalog JSON file overriding the built-in keywords
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Maximum number of documents processed concurrently
    #[arg(short, long, default_value_t = 4)]
    jobs: usize,

    /// Print results without writing them to the output directory
    #[arg(long)]
    no_save: bool,

    /// Log extraction details (debug level)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Parse CLI Arguments
    let args = Args::parse();

    // 2. Setup Logging (RUST_LOG overrides the verbosity flag)
    utils::logging::setup_logging(if args.verbose { "debug" } else { "info" });
    tracing::info!("Starting processing for args: {:?}", args);

    if args.jobs == 0 {
        return Err(AppError::Config("--jobs must be at least 1".to_string()));
    }

    // 3. Resolve the metric catalog
    let catalog_path = args
        .catalog
        .clone()
        .or_else(|| std::env::var_os(CATALOG_ENV).map(PathBuf::from));
    let extractor = match catalog_path {
        Some(path) => MetricExtractor::with_catalog(MetricCatalog::from_file(&path)?),
        None => {
            tracing::debug!("Using built-in metric catalog");
            MetricExtractor::new()
        }
    };
    tracing::info!("Metric catalog covers {} metrics", extractor.catalog().len());

    // 4. Initialize storage
    let storage = if args.no_save {
        None
    } else {
        Some(StorageManager::new(&args.output_dir)?)
    };

    // 5. Process every document
    let outcomes = pipeline::process_all(args.inputs.clone(), Arc::new(extractor), args.jobs).await;

    let mut success_count = 0;
    let mut failure_count = 0;

    for (input, outcome) in outcomes {
        match outcome {
            Ok(record) => {
                success_count += 1;
                let json = record.result.to_json()?;
                println!("{}: {}", input, json);

                if let Some(storage) = &storage {
                    if let Err(e) = storage.save_result(&record) {
                        tracing::error!("Failed to save metrics for {}: {}", input, e);
                    }
                    if let Err(e) = storage.save_metadata(&record) {
                        tracing::error!("Failed to save metadata for {}: {}", input, e);
                    }
                }
            }
            Err(e) => {
                tracing::error!("Failed to process {}: {}", input, e);
                failure_count += 1;
            }
        }
    }

    tracing::info!("Processing finished. Success: {}, Failures: {}", success_count, failure_count);

    if success_count == 0 && failure_count > 0 {
        return Err(AppError::Processing(format!("Failed to process any of {} documents", failure_count)));
    }

    Ok(())
}
