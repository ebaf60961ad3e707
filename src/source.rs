// ABOUTME: Collaborator seams between the dump core and a database client
// ABOUTME: DDL listing from the admin API and snapshot-bound metadata and row reads

use crate::error::Result;
use crate::schema::TableDefinition;
use crate::value::Row;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Lazy, abortable stream of rows. Dropping it releases the underlying cursor.
pub type RowStream<'a> = BoxStream<'a, Result<Row>>;

/// Source of raw DDL statements for one database.
#[async_trait]
pub trait DdlSource: Send + Sync {
    /// Statements in the order the metadata service returns them, without
    /// trailing semicolons.
    async fn list_ddl_statements(&self) -> Result<Vec<String>>;
}

/// Reads bound to one fixed, repeatable snapshot of the database.
///
/// Every call observes the same point in time, so tables read one after the
/// other never see writes made in between.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Table definitions (columns in ordinal order, interleave parent, primary key).
    async fn list_table_definitions(&self) -> Result<Vec<TableDefinition>>;

    /// Run a query and stream its rows.
    fn stream_rows(&self, sql: String) -> RowStream<'_>;
}
