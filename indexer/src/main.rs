use anyhow::Result;
use clap::{Parser, Subcommand};
use reviewrank_core::sorter::ExternalSorter;
use reviewrank_core::writer::{remove_index, IndexWriter};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and manage the on-disk review index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a review corpus file
    Build {
        /// Corpus file with line-oriented review records
        #[arg(long)]
        corpus: PathBuf,
        /// Output index directory (created or replaced)
        #[arg(long)]
        output: PathBuf,
        /// Reviews buffered per sorted spill
        #[arg(long, default_value_t = ExternalSorter::DEFAULT_BLOCK_SIZE)]
        block_size: usize,
        /// Maximum temp runs merged in one step
        #[arg(long, default_value_t = ExternalSorter::DEFAULT_FAN_IN)]
        fan_in: usize,
    },
    /// Delete an index directory and all its files
    Remove {
        /// Index directory
        #[arg(long)]
        index: PathBuf,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { corpus, output, block_size, fan_in } => {
            let writer = IndexWriter { block_size, fan_in };
            let start = Instant::now();
            writer.write(&corpus, &output)?;
            tracing::info!(took_s = start.elapsed().as_secs_f64(), "index build finished");
        }
        Commands::Remove { index } => {
            remove_index(&index)?;
            tracing::info!(index = %index.display(), "index removed");
        }
    }
    Ok(())
}
