//! nerprep CLI - Command-line interface
//!
//! Usage:
//!   nerprep extract [--input DIR] [--output DIR] [--labels A,B] [--tagger KIND]
//!   nerprep import [--input DIR] [--dataset NAME] [--store KIND]
//!   nerprep bio [--input DIR] [--output DIR] [--include-empty]

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use nerprep_core::config::parse_labels;
use nerprep_core::{AppConfig, LoggingConfig, StoreBackend, TaggerBackend};
use nerprep_extractor::{build_tagger, BioExporter, Extractor, Importer, RuleSentenceSegmenter};
use nerprep_store::build_store;

#[derive(Parser)]
#[command(name = "nerprep")]
#[command(about = "Zero-shot NER data preparation")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "NERPREP_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment and tag raw text files into intermediate JSON
    Extract {
        /// Directory of raw text files
        #[arg(long)]
        input: Option<PathBuf>,
        /// Directory for the JSON output
        #[arg(long)]
        output: Option<PathBuf>,
        /// Comma-separated candidate labels
        #[arg(long)]
        labels: Option<String>,
        /// Tagger backend (gazetteer, http)
        #[arg(long)]
        tagger: Option<TaggerBackend>,
    },
    /// Submit records with predictions to an annotation store
    Import {
        /// Directory of intermediate JSON files
        #[arg(long)]
        input: Option<PathBuf>,
        /// Target dataset name
        #[arg(long)]
        dataset: Option<String>,
        /// Store backend (argilla, jsonl)
        #[arg(long)]
        store: Option<StoreBackend>,
    },
    /// Convert intermediate JSON into CoNLL-style BIO files
    Bio {
        /// Directory of intermediate JSON files
        #[arg(long)]
        input: Option<PathBuf>,
        /// Directory for the .bio output
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also export sentences without predictions
        #[arg(long)]
        include_empty: bool,
    },
}

impl Cli {
    /// Fold command-line flags into the loaded configuration
    fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }

        match &self.command {
            Commands::Extract {
                input,
                output,
                labels,
                tagger,
            } => {
                if let Some(dir) = input {
                    config.paths.input_dir = dir.clone();
                }
                if let Some(dir) = output {
                    config.paths.json_dir = dir.clone();
                }
                if let Some(labels) = labels {
                    config.extraction.labels = parse_labels(labels);
                }
                if let Some(backend) = tagger {
                    config.tagger.backend = *backend;
                }
            }
            Commands::Import {
                input,
                dataset,
                store,
            } => {
                if let Some(dir) = input {
                    config.paths.json_dir = dir.clone();
                }
                if let Some(dataset) = dataset {
                    config.store.dataset_name = dataset.clone();
                }
                if let Some(backend) = store {
                    config.store.backend = *backend;
                }
            }
            Commands::Bio { input, output, .. } => {
                if let Some(dir) = input {
                    config.paths.json_dir = dir.clone();
                }
                if let Some(dir) = output {
                    config.paths.bio_dir = dir.clone();
                }
            }
        }

        config
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &logging.level;
        format!("nerprep={level},nerprep_core={level},nerprep_extractor={level},nerprep_store={level}")
            .into()
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let config = cli.apply(config);
    config.validate().context("invalid configuration")?;

    init_tracing(&config.logging);
    let show_progress = std::io::stderr().is_terminal();

    match &cli.command {
        Commands::Extract { .. } => {
            let tagger = build_tagger(&config.tagger).context("failed to build tagger")?;
            let segmenter = Arc::new(RuleSentenceSegmenter::new());
            let extractor = Extractor::from_config(&config, segmenter, tagger).with_progress(show_progress);

            let summary = extractor
                .process_directory(&config.paths.input_dir)
                .await
                .with_context(|| format!("extraction failed under {}", config.paths.input_dir.display()))?;

            println!(
                "Extracted {} files ({} skipped, {} empty): {} records, {} predictions",
                summary.files_written,
                summary.files_skipped,
                summary.files_empty,
                summary.records_written,
                summary.predictions_written
            );
        }
        Commands::Import { .. } => {
            let store = build_store(&config.store).context("failed to build annotation store")?;
            info!(store = store.name(), dataset = %config.store.dataset_name, "store ready");
            let importer = Importer::from_config(&config.store, store).with_progress(show_progress);

            let summary = importer
                .import_directory(&config.paths.json_dir)
                .await
                .with_context(|| format!("import failed under {}", config.paths.json_dir.display()))?;

            println!(
                "Imported {} records from {} files into {} ({} without predictions dropped)",
                summary.records_submitted,
                summary.files_submitted,
                config.store.dataset_name,
                summary.records_dropped
            );
        }
        Commands::Bio { include_empty, .. } => {
            let exporter = BioExporter::new(&config.paths.bio_dir).with_include_empty(*include_empty);
            let summary = exporter
                .export_directory(&config.paths.json_dir)
                .await
                .with_context(|| format!("bio export failed under {}", config.paths.json_dir.display()))?;

            println!(
                "Wrote {} sentences to {} files ({} unaligned skipped)",
                summary.sentences_written, summary.files_written, summary.sentences_unaligned
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_extract_flags_override_config() {
        let cli = Cli::parse_from([
            "nerprep",
            "--log-level",
            "debug",
            "extract",
            "--input",
            "raw",
            "--output",
            "out",
            "--labels",
            "Ship, Submarine",
            "--tagger",
            "http",
        ]);
        let config = cli.apply(AppConfig::default());

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.paths.input_dir, PathBuf::from("raw"));
        assert_eq!(config.paths.json_dir, PathBuf::from("out"));
        assert_eq!(config.extraction.labels, vec!["Ship", "Submarine"]);
        assert_eq!(config.tagger.backend, TaggerBackend::Http);
    }

    #[test]
    fn test_import_flags_override_config() {
        let cli = Cli::parse_from([
            "nerprep", "import", "--input", "json", "--dataset", "navy", "--store", "jsonl",
        ]);
        let config = cli.apply(AppConfig::default());

        assert_eq!(config.paths.json_dir, PathBuf::from("json"));
        assert_eq!(config.store.dataset_name, "navy");
        assert_eq!(config.store.backend, StoreBackend::Jsonl);
    }

    #[test]
    fn test_unset_flags_keep_config() {
        let cli = Cli::parse_from(["nerprep", "bio"]);
        let config = cli.apply(AppConfig::default());
        let defaults = AppConfig::default();

        assert_eq!(config.paths.json_dir, defaults.paths.json_dir);
        assert_eq!(config.paths.bio_dir, defaults.paths.bio_dir);
        assert!(matches!(cli.command, Commands::Bio { include_empty: false, .. }));
    }

    #[test]
    fn test_invalid_backend_is_rejected() {
        assert!(Cli::try_parse_from(["nerprep", "extract", "--tagger", "bert"]).is_err());
    }
}
