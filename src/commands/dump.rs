// ABOUTME: Dump command: DDL phase then data phase against one Spanner database
// ABOUTME: Owns the client, the read-only snapshot and the output sink

use crate::config::DumpConfig;
use crate::dump::{DumpStats, Dumper};
use crate::spanner::{SpannerClient, TimestampBound};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Open the output sink: the file at `path`, or stdout.
pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

/// Export the database described by `config` to its configured output.
///
/// The client is built before the output is opened, so invalid credentials
/// never leave an empty dump file behind.
///
/// # Errors
///
/// This function will return an error if:
/// - The Spanner client cannot be built (missing access token)
/// - The output file cannot be created
/// - Any error from [`dump_to`]
pub async fn dump(config: DumpConfig) -> Result<DumpStats> {
    let client =
        SpannerClient::new(&config.connection).context("Failed to create Spanner client")?;
    let out = open_output(config.output.as_deref())?;
    dump_to(&client, &config, out).await
}

/// Export the database to `out`.
///
/// DDL is written first unless `no_ddl` is set. Table data is then read
/// through a single read-only snapshot unless `no_data` is set.
///
/// # Errors
///
/// This function will return an error if:
/// - Listing DDL or table metadata fails
/// - A table's row stream fails or a value cannot be rendered
/// - Writing to `out` fails
pub async fn dump_to<W: Write>(
    client: &SpannerClient,
    config: &DumpConfig,
    out: W,
) -> Result<DumpStats> {
    tracing::info!("Dumping database {}", client.database_path());

    let mut dumper = Dumper::new(config.dump_options(), config.tables.clone(), out);

    if config.no_ddl {
        tracing::info!("Skipping DDL (--no-ddl)");
    } else {
        dumper
            .dump_ddl(client)
            .await
            .context("Failed to dump DDLs")?;
    }

    let mut stats = DumpStats::default();
    if config.no_data {
        tracing::info!("Skipping table data (--no-data)");
    } else {
        let snapshot = client
            .begin_snapshot(TimestampBound::from(config.timestamp))
            .await
            .context("Failed to begin read-only transaction")?;

        let read_timestamp = snapshot.read_timestamp().map(str::to_string);
        let result = dumper.dump_tables(&snapshot).await;
        snapshot.close().await;
        stats = result.context("Failed to dump tables")?;
        if let Some(ts) = read_timestamp {
            tracing::info!("Table data is consistent as of {}", ts);
        }
    }

    let mut out = dumper.into_inner();
    out.flush().context("Failed to flush output")?;
    Ok(stats)
}
