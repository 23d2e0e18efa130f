//! tablesink loader
//!
//! Loads newline-delimited JSON records into an in-memory table through the
//! write adapter and reports what was acked, failed and stored. Handy for
//! checking a mapper configuration against sample data before wiring it
//! into a pipeline.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log level (default: info)
//! - `TABLESINK_ROOT_LOCATION`: Pipeline-wide root location override
//!
//! # Example
//!
//! ```bash
//! tablesink-load --config sink.toml --input page_views.jsonl --dump
//! tablesink-load --table events --row-key id --family cf \
//!     --columns name,email --counters logins --input events.jsonl
//! ```

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tablesink::config::ROOT_LOCATION;
use tablesink::{
    load_lines, ChannelCollector, Durability, FieldMapper, LoadConfig, MemoryTableClient, Outcome,
    PipelineConfig, WriteAdapter,
};
use tokio::fs::File;
use tokio::io::BufReader;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "tablesink-load")]
#[command(about = "Load JSON lines into a table through the write sink", long_about = None)]
struct Cli {
    /// TOML load configuration (table, mapper, properties)
    #[arg(short, long, conflicts_with_all = ["table", "row_key", "family"])]
    config: Option<PathBuf>,

    /// Input file with one JSON object per line (stdin if omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Target table
    #[arg(short, long)]
    table: Option<String>,

    /// Field supplying the row key
    #[arg(long)]
    row_key: Option<String>,

    /// Column family for every cell and counter
    #[arg(long)]
    family: Option<String>,

    /// Comma-separated fields written as cells
    #[arg(long, value_delimiter = ',')]
    columns: Vec<String>,

    /// Comma-separated fields applied as counters
    #[arg(long, value_delimiter = ',')]
    counters: Vec<String>,

    /// Bypass the write-ahead log
    #[arg(long)]
    skip_wal: bool,

    /// Pipeline-wide root location override
    #[arg(long, env = "TABLESINK_ROOT_LOCATION")]
    root_location: Option<String>,

    /// Print every stored cell and counter after loading
    #[arg(long)]
    dump: bool,
}

impl Cli {
    fn load_config(&self) -> Result<LoadConfig> {
        if let Some(path) = &self.config {
            let mut config = LoadConfig::from_file(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            if self.skip_wal {
                config.durability = Durability::SkipWal;
            }
            return Ok(config);
        }

        let table = self
            .table
            .clone()
            .context("--table is required without --config")?;
        let row_key = self
            .row_key
            .clone()
            .context("--row-key is required without --config")?;
        let family = self
            .family
            .clone()
            .context("--family is required without --config")?;

        let mapper = FieldMapper::new(row_key, family)?
            .with_column_fields(self.columns.iter().cloned())
            .with_counter_fields(self.counters.iter().cloned());

        Ok(LoadConfig {
            table,
            mapper,
            durability: Durability::from_wal_flag(!self.skip_wal),
            properties: Default::default(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let load = cli.load_config()?;
    let table = load.table.clone();

    let mut pipeline = PipelineConfig::new();
    if let Some(root) = &cli.root_location {
        pipeline.insert(ROOT_LOCATION.to_string(), root.clone());
    }

    let client = MemoryTableClient::with_tables([table.as_str()]);
    let (collector, mut signals) = ChannelCollector::new();
    let adapter = WriteAdapter::prepare(load.into_options()?, &pipeline, &client, collector)
        .await
        .context("failed to prepare write adapter")?;
    let store_properties = adapter.store_config().to_config_map();

    // Ends once the adapter, and with it the collector, is shut down.
    let failures = tokio::spawn(async move {
        let mut failed_ids = Vec::new();
        while let Some((id, outcome)) = signals.recv().await {
            if outcome == Outcome::Failed {
                failed_ids.push(id.to_string());
            }
        }
        failed_ids
    });

    info!("Loading into table '{}'", table);
    let summary = match &cli.input {
        Some(path) => {
            let file = File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            load_lines(&adapter, BufReader::new(file)).await?
        }
        None => load_lines(&adapter, BufReader::new(tokio::io::stdin())).await?,
    };
    let stats = adapter.shutdown();
    let failed_ids = failures.await.context("failure collector task failed")?;

    println!("records:  {}", summary.records);
    println!("acked:    {}", summary.acked);
    println!("failed:   {}", summary.failed);
    println!("rejected: {}", summary.rejected);
    println!("rows:     {}", client.row_count(&table));
    println!("wal:      {}", client.wal_edits());
    if !failed_ids.is_empty() {
        println!("failed lines: {}", failed_ids.join(", "));
    }
    info!(
        mapping_failures = stats.mapping_failures,
        write_failures = stats.write_failures,
        increment_failures = stats.increment_failures,
        "load finished"
    );

    if cli.dump {
        let mut properties: Vec<_> = store_properties.into_iter().collect();
        properties.sort();
        for (key, value) in properties {
            println!("{} = {}", key, value);
        }
        for cell in client.cells(&table) {
            println!(
                "{} {}:{} @{} = {}",
                String::from_utf8_lossy(&cell.row),
                String::from_utf8_lossy(&cell.family),
                String::from_utf8_lossy(&cell.qualifier),
                cell.version,
                String::from_utf8_lossy(&cell.value),
            );
        }
        for counter in client.counters(&table) {
            println!(
                "{} {}:{} += {}",
                String::from_utf8_lossy(&counter.row),
                String::from_utf8_lossy(&counter.family),
                String::from_utf8_lossy(&counter.qualifier),
                counter.value,
            );
        }
    }

    Ok(())
}
