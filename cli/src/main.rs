use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shardex_core::config::{DEFAULT_INDEX_PREFIX, DEFAULT_WORKERS};
use shardex_core::dispatch::{serve, StdoutSink};
use shardex_core::{ingest, IndexConfig, SearchConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "shardex")]
#[command(
    about = "Build sharded inverted indexes and run boolean queries against them",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index newline-delimited JSON documents into shards
    Index {
        /// Data source: a JSONL file or a directory of .json/.jsonl files
        #[arg(long)]
        path: PathBuf,
        /// Output prefix; shards are written to <index>_<n>.idx
        #[arg(long, default_value = DEFAULT_INDEX_PREFIX)]
        index: String,
        /// Number of indexing workers, one shard each
        #[arg(long, default_value_t = DEFAULT_WORKERS)]
        go: usize,
        /// Stop after this many documents over the whole stream
        #[arg(long)]
        max: Option<usize>,
    },
    /// Answer queries read from stdin, one per line
    Search {
        /// Shard prefix, or a glob pattern matching shard files
        #[arg(long, default_value = DEFAULT_INDEX_PREFIX)]
        index: String,
        /// Number of search workers
        #[arg(long, default_value_t = DEFAULT_WORKERS)]
        go: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Index { path, index, go, max } => {
            let config = IndexConfig::new(path)
                .with_prefix(index)
                .with_workers(go)
                .with_max_documents(max);
            build_shards(&config).await
        }
        Commands::Search { index, go } => {
            let config = SearchConfig { pattern: index, workers: go };
            search_shards(&config).await
        }
    }
}

async fn build_shards(config: &IndexConfig) -> Result<()> {
    let reports = ingest::run(config)
        .await
        .with_context(|| format!("indexing {} failed", config.data_path.display()))?;
    for report in &reports {
        eprintln!(
            "shard {} -> {} ({} documents, {} skipped)",
            report.shard,
            report.path.display(),
            report.documents,
            report.skipped
        );
    }
    Ok(())
}

async fn search_shards(config: &SearchConfig) -> Result<()> {
    eprintln!("Type one query per line, `exit` or end of input to quit");
    let stdin = BufReader::new(tokio::io::stdin());
    let stats = serve(config, stdin, Arc::new(StdoutSink))
        .await
        .with_context(|| format!("searching `{}` failed", config.pattern))?;
    tracing::info!(queries = stats.queries, rejected = stats.rejected, "session ended");
    Ok(())
}
