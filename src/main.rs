use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Instant;
use topn::{
    Compression, DataSize, RecordFormat, SpillCodec, TopN, TopNConfig, buffer_size_for_budget,
};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Text,
    Binary,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CompressionArg {
    None,
    Gzip,
    Zstd,
}

/// Report the N most frequent lines of a file too large for memory.
#[derive(Parser, Debug)]
#[command(name = "topn", version)]
struct Cli {
    /// Input file, one item per line
    input: PathBuf,
    /// Result file, `item: count` per line, most frequent first
    output: PathBuf,
    /// Scratch directory for partition files (wiped at start, removed at end)
    #[arg(long, default_value = "./tmp")]
    work_dir: PathBuf,
    /// How many items to report
    #[arg(short, long, default_value_t = 100)]
    n: usize,
    /// Number of hash partitions
    #[arg(long, default_value_t = 500)]
    partitions: usize,
    /// Reduce worker threads (defaults to the number of CPUs)
    #[arg(long)]
    workers: Option<usize>,
    /// Memory budget the per-partition spill threshold is derived from
    #[arg(long, default_value = "1GB")]
    memory_budget: DataSize,
    /// Explicit per-partition spill threshold, overriding --memory-budget
    #[arg(long)]
    buffer_size: Option<usize>,
    #[arg(long, value_enum, default_value_t = FormatArg::Text)]
    format: FormatArg,
    #[arg(long, value_enum, default_value_t = CompressionArg::None)]
    compression: CompressionArg,
    /// Spill on the reading thread instead of in the background
    #[arg(long)]
    sequential_spills: bool,
    /// Write run metrics as JSON to this path
    #[arg(long)]
    metrics_json: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let defaults = TopNConfig::default();
    let workers = cli.workers.unwrap_or(defaults.workers);
    let format = match cli.format {
        FormatArg::Text => RecordFormat::Text,
        FormatArg::Binary => RecordFormat::Binary,
    };
    let compression = match cli.compression {
        CompressionArg::None => Compression::None,
        CompressionArg::Gzip => Compression::Gzip,
        CompressionArg::Zstd => Compression::Zstd,
    };
    let config = TopNConfig {
        n: cli.n,
        n_reduce: cli.partitions,
        workers,
        buffer_size: cli
            .buffer_size
            .unwrap_or_else(|| buffer_size_for_budget(cli.memory_budget.0, workers, cli.partitions)),
        codec: SpillCodec::new(format, compression),
        concurrent_spills: !cli.sequential_spills,
        ..defaults
    };
    config.validate()?;

    let t = Instant::now();
    let report = TopN::new(config).run(&cli.input, &cli.output, &cli.work_dir)?;
    println!("Topn run elapsed: {:?}", t.elapsed());
    if let Some(path) = cli.metrics_json {
        report.metrics.save_to_file(path)?;
    }
    Ok(())
}
