mod core;
mod decoder;
mod error;
mod utils;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::core::extractor;
use crate::core::ExtractConfig;

#[derive(Parser)]
#[command(author, version, about = "Extracts images and annotations from the Caltech Pedestrian Dataset", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract every .seq/.vbb pair into images and per-frame JSON
    Extract {
        /// Dataset root containing setXX/*.seq and annotations/setXX/*.vbb
        data_path: PathBuf,
        /// Output root (mirrors the dataset's set/sequence layout)
        #[arg(short, long, default_value = ExtractConfig::DEFAULT_SAVE_DIR)]
        save_path: PathBuf,
        /// Only extract these sets (repeatable), e.g. -s set00 -s set01
        #[arg(short = 's', long = "set")]
        sets: Vec<String>,
        /// Pairs processed in parallel; 0 uses every logical CPU
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,
    },
    /// Decode a single .seq or .vbb file and print a JSON summary
    Inspect {
        path: PathBuf,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "caltech_extract=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Extract { data_path, save_path, sets, jobs } => {
            let config = ExtractConfig::new(data_path)
                .with_save_path(save_path)
                .with_sets(sets)
                .with_jobs(jobs);
            run_extract(&config)?;
        }
        Commands::Inspect { path } => {
            let info = crate::core::inspect::inspect(&path)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
    }

    Ok(())
}

fn run_extract(config: &ExtractConfig) -> Result<()> {
    let report = extractor::run(config).with_context(|| {
        format!("Cannot extract dataset at {}", config.data_path.display())
    })?;

    println!("\n==> Extraction complete.");
    println!("{}", report.summary());

    if report.is_total_failure() {
        anyhow::bail!(
            "None of the {} sequence pairs could be extracted",
            report.attempted()
        );
    }
    Ok(())
}
