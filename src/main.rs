use anyhow::Context;
use clap::Parser;
use field_data_processor::{FieldDataProcessor, ProcessorConfig, Verbosity};
use polars::prelude::*;
use std::env;
use std::fs::File;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Clean a farm survey dataset and map it onto weather stations.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a .json or .toml pipeline config.
    #[arg(short, long)]
    config: PathBuf,

    /// Write the result to this CSV file instead of printing it.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overrides `logging_verbosity` from the config (DEBUG, INFO or NONE).
    #[arg(short, long)]
    verbosity: Option<String>,
}

fn init_logging(verbosity: Verbosity) {
    let default_directive = match verbosity {
        Verbosity::Debug => "debug",
        Verbosity::Info => "info",
        Verbosity::None => "off",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ProcessorConfig::from_file(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    if let Some(verbosity) = args.verbosity.as_deref() {
        config.logging_verbosity = Verbosity::from(verbosity);
    }
    init_logging(config.logging_verbosity);

    let mut processor = FieldDataProcessor::new(config)?;
    let mut df = processor.process()?.clone();
    processor.shutdown()?;

    match args.output {
        Some(path) => {
            let mut file = File::create(&path)
                .with_context(|| format!("creating output file {}", path.display()))?;
            CsvWriter::new(&mut file)
                .include_header(true)
                .finish(&mut df)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote {} rows to {}", df.height(), path.display());
        }
        None => {
            // show every column
            env::set_var("POLARS_FMT_MAX_COLS", "-1");
            println!("{df}");
        }
    }

    Ok(())
}
