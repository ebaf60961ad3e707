// ABOUTME: CLI entry point for spanner-dump
// ABOUTME: Parses flags, validates settings, and runs the dump until done or interrupted

use clap::Parser;
use spanner_dump::commands;
use spanner_dump::config::{DumpArgs, DumpConfig, DEFAULT_BULK_SIZE};
use spanner_dump::DumpError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "spanner-dump", version)]
#[command(about = "Export Cloud Spanner schema and data as SQL statements or JSON lines", long_about = None)]
struct Cli {
    /// Cloud Spanner project ID
    #[arg(short = 'p', long, env = "SPANNER_PROJECT_ID")]
    project: Option<String>,
    /// Cloud Spanner instance ID
    #[arg(short = 'i', long, env = "SPANNER_INSTANCE_ID")]
    instance: Option<String>,
    /// Cloud Spanner database ID
    #[arg(short = 'd', long, env = "SPANNER_DATABASE_ID")]
    database: Option<String>,
    /// Dump only these tables (comma-separated)
    #[arg(long)]
    tables: Option<String>,
    /// Do not dump DDL
    #[arg(long)]
    no_ddl: bool,
    /// Do not dump table data
    #[arg(long)]
    no_data: bool,
    /// Read data at this commit timestamp (RFC 3339, e.g. 2024-01-02T03:04:05Z)
    #[arg(long)]
    timestamp: Option<String>,
    /// Rows per INSERT statement (0 uses the default)
    #[arg(long, default_value_t = DEFAULT_BULK_SIZE)]
    bulk_size: usize,
    /// Row filter appended after WHERE in every data query
    #[arg(long = "where")]
    where_clause: Option<String>,
    /// Output format: sql or json
    #[arg(long)]
    format: Option<String>,
    /// Order rows by primary key for reproducible output
    #[arg(long)]
    order_by_primary_key: bool,
    /// TOML file with per-table row filters
    #[arg(long = "config")]
    config_file: Option<PathBuf>,
    /// Write to this file instead of stdout
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
    /// Spanner API base URL
    #[arg(long)]
    endpoint: Option<String>,
    /// Emulator REST address, e.g. localhost:9020
    #[arg(long, env = "SPANNER_EMULATOR_HOST")]
    emulator_host: Option<String>,
    /// OAuth access token (e.g. from `gcloud auth print-access-token`)
    #[arg(long, env = "SPANNER_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
}

impl From<Cli> for DumpArgs {
    fn from(cli: Cli) -> Self {
        DumpArgs {
            project: cli.project.unwrap_or_default(),
            instance: cli.instance.unwrap_or_default(),
            database: cli.database.unwrap_or_default(),
            tables: cli.tables,
            no_ddl: cli.no_ddl,
            no_data: cli.no_data,
            timestamp: cli.timestamp,
            bulk_size: cli.bulk_size,
            where_clause: cli.where_clause,
            format: cli.format,
            order_by_primary_key: cli.order_by_primary_key,
            config_file: cli.config_file,
            output: cli.output,
            endpoint: cli.endpoint,
            emulator_host: cli.emulator_host,
            access_token: cli.access_token,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never mix with the dump on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = DumpConfig::from_args(cli.into())?;

    tokio::select! {
        result = commands::dump(config) => {
            let stats = result?;
            tracing::info!(
                "Dump complete: {} rows from {} tables",
                stats.rows,
                stats.tables
            );
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, stopping the dump");
            Err(DumpError::Cancelled.into())
        }
    }
}
