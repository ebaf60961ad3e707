// ABOUTME: Orchestrates a dump: filtered DDL first, then table data in dump order
// ABOUTME: Streams each table through the row decoder into a buffered writer

pub mod decoder;
pub mod writer;

pub use decoder::decode_row;
pub use writer::BufferedWriter;

use crate::config::{OutputFormat, DEFAULT_BULK_SIZE};
use crate::error::Result;
use crate::filters::TableFilter;
use crate::schema::{extract_table_name, fetch_ddl, fetch_tables, Table};
use crate::source::{DdlSource, RowStream, SnapshotSource};
use crate::table_rules::TableRules;
use futures::TryStreamExt;
use std::io::Write;

/// How table data is queried and rendered.
#[derive(Debug, Clone)]
pub struct DumpOptions {
    pub bulk_size: usize,
    pub format: OutputFormat,
    pub rules: TableRules,
    /// Append `ORDER BY <primary key>` to every data query.
    pub order_by_primary_key: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            bulk_size: DEFAULT_BULK_SIZE,
            format: OutputFormat::Sql,
            rules: TableRules::default(),
            order_by_primary_key: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpStats {
    pub tables: usize,
    pub rows: usize,
}

/// Dumper exports the schema and the data of one database to a sink.
pub struct Dumper<W: Write> {
    options: DumpOptions,
    filter: TableFilter,
    out: W,
}

impl<W: Write> Dumper<W> {
    pub fn new(options: DumpOptions, filter: TableFilter, out: W) -> Self {
        Self {
            options,
            filter,
            out,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Dumps the DDL statements of the database, one `<statement>;` per line.
    ///
    /// Statements attributed to a table outside the filter are skipped;
    /// statements with no table association are always written.
    pub async fn dump_ddl<D>(&mut self, source: &D) -> Result<usize>
    where
        D: DdlSource + ?Sized,
    {
        let statements = fetch_ddl(source).await?;

        let mut emitted = 0;
        for ddl in &statements {
            let table = extract_table_name(ddl);
            if !self.filter.includes_ddl(&table) {
                tracing::debug!("Skipping DDL statement for table '{}'", table);
                continue;
            }
            writeln!(self.out, "{};", ddl)?;
            emitted += 1;
        }
        self.out.flush()?;

        tracing::info!(
            "Dumped {} of {} DDL statements",
            emitted,
            statements.len()
        );
        Ok(emitted)
    }

    /// Dumps the records of every selected table, parents before children.
    ///
    /// Every table is read through `snapshot`, so all of them reflect the
    /// same point in time. The first failure aborts the dump; rows already
    /// flushed stay in the sink.
    pub async fn dump_tables<S>(&mut self, snapshot: &S) -> Result<DumpStats>
    where
        S: SnapshotSource + ?Sized,
    {
        let tables = fetch_tables(snapshot).await?;

        let names: Vec<&str> = tables.iter().map(|t| t.name()).collect();
        for missing in self.filter.unknown_tables(&names) {
            tracing::warn!("Table '{}' was requested but does not exist", missing);
        }

        let selected: Vec<&Table> = tables
            .iter()
            .filter(|t| self.filter.includes_table(t.name()))
            .collect();
        tracing::info!(
            "Dumping {} of {} tables as {}",
            selected.len(),
            tables.len(),
            self.options.format
        );

        let mut stats = DumpStats::default();
        for table in selected {
            let rows = self
                .dump_table(snapshot, table)
                .await
                .map_err(|e| e.in_table(table.name()))?;
            stats.tables += 1;
            stats.rows += rows;
        }
        self.out.flush()?;

        tracing::info!("Dumped {} rows from {} tables", stats.rows, stats.tables);
        Ok(stats)
    }

    async fn dump_table<S>(&mut self, snapshot: &S, table: &Table) -> Result<usize>
    where
        S: SnapshotSource + ?Sized,
    {
        let predicate = self.options.rules.predicate_for(table.name());
        let sql = table.select_statement(predicate.as_deref(), self.options.order_by_primary_key);
        tracing::debug!("Querying table '{}': {}", table.name(), sql);

        let mut rows = snapshot.stream_rows(sql);
        let mut writer = BufferedWriter::new(
            table,
            &mut self.out,
            self.options.bulk_size,
            self.options.format,
        );

        // The writer is finished even when draining fails, so rows decoded
        // before the failure still reach the sink.
        let drained = drain_rows(&mut rows, table, &mut writer).await;
        drop(rows);
        let finished = writer.finish();
        drained?;
        let written = finished?;

        tracing::info!("Dumped {} rows from table '{}'", written, table.name());
        Ok(written)
    }
}

async fn drain_rows<W: Write>(
    rows: &mut RowStream<'_>,
    table: &Table,
    writer: &mut BufferedWriter<'_, W>,
) -> Result<()> {
    while let Some(row) = rows.try_next().await? {
        let values = decode_row(&row, table)?;
        writer.write(values)?;
    }
    Ok(())
}
