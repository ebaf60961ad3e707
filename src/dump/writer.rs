// ABOUTME: Buffers decoded rows per table and flushes them in bulk
// ABOUTME: Emits batched INSERT statements or one JSON object per row

use crate::config::OutputFormat;
use crate::error::{DumpError, Result};
use crate::schema::Table;
use std::io::Write;

/// Writes one table's records in bulk.
///
/// Holds at most `bulk_size` rows. Call [`BufferedWriter::finish`] once the
/// table is drained; a writer dropped without it still flushes what it holds
/// on a best-effort basis.
///
/// NOTE: BufferedWriter is not thread-safe; it borrows the sink mutably for
/// the duration of one table.
pub struct BufferedWriter<'a, W: Write> {
    out: &'a mut W,
    table: &'a Table,
    buffer: Vec<Vec<String>>,
    bulk_size: usize,
    format: OutputFormat,
    rows_written: usize,
    finished: bool,
    failed: bool,
}

impl<'a, W: Write> BufferedWriter<'a, W> {
    /// Creates a writer for `table`. A `bulk_size` of 0 is treated as 1.
    pub fn new(table: &'a Table, out: &'a mut W, bulk_size: usize, format: OutputFormat) -> Self {
        let bulk_size = bulk_size.max(1);
        Self {
            out,
            table,
            buffer: Vec::with_capacity(bulk_size),
            bulk_size,
            format,
            rows_written: 0,
            finished: false,
            failed: false,
        }
    }

    /// Buffers one row of tokens. Flushes when the buffer becomes full.
    pub fn write(&mut self, values: Vec<String>) -> Result<()> {
        if self.failed {
            return Err(self.failed_error());
        }
        let columns = self.table.columns();
        if values.len() != columns.len() {
            let column = columns
                .get(values.len())
                .map_or("<extra value>", |c| c.name.as_str());
            return Err(DumpError::decode(
                column,
                format!(
                    "row has {} values but table '{}' has {} columns",
                    values.len(),
                    self.table.name(),
                    columns.len()
                ),
            ));
        }

        self.buffer.push(values);
        if self.buffer.len() >= self.bulk_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Rows handed to the sink so far.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Number of rows waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Flushes the remaining rows and returns the total written for the table.
    ///
    /// Fails without writing anything if an earlier flush failed.
    pub fn finish(mut self) -> Result<usize> {
        self.finished = true;
        if self.failed {
            return Err(self.failed_error());
        }
        self.flush()?;
        Ok(self.rows_written)
    }

    fn failed_error(&self) -> DumpError {
        DumpError::Io(std::io::Error::other(format!(
            "an earlier write of table '{}' failed",
            self.table.name()
        )))
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let result = match self.format {
            OutputFormat::Sql => self.flush_sql(),
            OutputFormat::Json => self.flush_json(),
        };
        // A failed batch may be partly in the sink and is never written again
        let flushed = self.buffer.len();
        self.buffer.clear();
        match result {
            Ok(()) => {
                self.rows_written += flushed;
                Ok(())
            }
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }

    fn flush_sql(&mut self) -> Result<()> {
        let quoted_columns = self.table.quoted_columns();

        // Size the statement up front so it is built without reallocating
        let mut n = quoted_columns.len() + self.table.name().len() + 32;
        for row in &self.buffer {
            n += 4 + row.iter().map(|v| v.len() + 2).sum::<usize>();
        }

        let mut sb = String::with_capacity(n);
        sb.push_str("INSERT INTO `");
        sb.push_str(self.table.name());
        sb.push_str("` (");
        sb.push_str(quoted_columns);
        sb.push_str(") VALUES ");
        for (i, row) in self.buffer.iter().enumerate() {
            if i > 0 {
                sb.push_str(", ");
            }
            sb.push('(');
            sb.push_str(&row.join(", "));
            sb.push(')');
        }
        sb.push_str(";\n");

        self.out.write_all(sb.as_bytes())?;
        Ok(())
    }

    fn flush_json(&mut self) -> Result<()> {
        let columns = self.table.columns();
        for row in &self.buffer {
            let record: serde_json::Map<String, serde_json::Value> = columns
                .iter()
                .zip(row)
                .map(|(column, value)| (column.name.clone(), serde_json::Value::String(value.clone())))
                .collect();

            let mut line = serde_json::to_string(&record)?;
            line.push('\n');
            self.out.write_all(line.as_bytes())?;
        }
        Ok(())
    }
}

impl<W: Write> Drop for BufferedWriter<'_, W> {
    fn drop(&mut self) {
        if self.finished || self.failed || self.buffer.is_empty() {
            return;
        }
        let pending = self.buffer.len();
        if let Err(e) = self.flush() {
            tracing::warn!(
                "Failed to flush {} buffered rows of table '{}': {}",
                pending,
                self.table.name(),
                e
            );
        }
    }
}
