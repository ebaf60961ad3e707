// ABOUTME: INFORMATION_SCHEMA queries that describe the user tables of a database
// ABOUTME: Joins table, column and primary-key rows into TableDefinitions

use crate::error::{DumpError, Result};
use crate::schema::{Column, TableDefinition};
use crate::value::Row;
use std::collections::BTreeMap;

/// User tables with their interleave parent.
pub const TABLES_QUERY: &str = "SELECT TABLE_NAME, PARENT_TABLE_NAME \
     FROM INFORMATION_SCHEMA.TABLES \
     WHERE TABLE_CATALOG = '' AND TABLE_SCHEMA = '' AND TABLE_TYPE = 'BASE TABLE'";

/// Stored columns in ordinal order. Generated columns cannot be inserted.
pub const COLUMNS_QUERY: &str = "SELECT TABLE_NAME, COLUMN_NAME, SPANNER_TYPE \
     FROM INFORMATION_SCHEMA.COLUMNS \
     WHERE TABLE_CATALOG = '' AND TABLE_SCHEMA = '' AND IS_GENERATED = 'NEVER' \
     ORDER BY TABLE_NAME, ORDINAL_POSITION";

pub const PRIMARY_KEY_QUERY: &str = "SELECT TABLE_NAME, COLUMN_NAME \
     FROM INFORMATION_SCHEMA.INDEX_COLUMNS \
     WHERE TABLE_CATALOG = '' AND TABLE_SCHEMA = '' AND INDEX_TYPE = 'PRIMARY_KEY' \
     ORDER BY TABLE_NAME, ORDINAL_POSITION";

fn required<'a>(row: &'a Row, idx: usize, what: &str) -> Result<&'a str> {
    row.get_str(idx).ok_or_else(|| {
        DumpError::Protocol(format!(
            "INFORMATION_SCHEMA row is missing {}: {:?}",
            what,
            row.values()
        ))
    })
}

/// Combine the results of the three metadata queries.
///
/// Columns and key parts keep the order of their result rows. Rows that
/// reference a table absent from `tables` are ignored.
pub fn build_table_definitions(
    tables: Vec<Row>,
    columns: Vec<Row>,
    primary_keys: Vec<Row>,
) -> Result<Vec<TableDefinition>> {
    let mut definitions: BTreeMap<String, TableDefinition> = BTreeMap::new();

    for row in &tables {
        let name = required(row, 0, "TABLE_NAME")?;
        let mut definition = TableDefinition::new(name, Vec::new());
        if let Some(parent) = row.get_str(1).filter(|p| !p.is_empty()) {
            definition = definition.interleaved_in(parent);
        }
        definitions.insert(name.to_string(), definition);
    }

    for row in &columns {
        let table = required(row, 0, "TABLE_NAME")?;
        let column = required(row, 1, "COLUMN_NAME")?;
        let spanner_type = required(row, 2, "SPANNER_TYPE")?;
        if let Some(definition) = definitions.get_mut(table) {
            definition.columns.push(Column::new(column, spanner_type));
        }
    }

    for row in &primary_keys {
        let table = required(row, 0, "TABLE_NAME")?;
        let column = required(row, 1, "COLUMN_NAME")?;
        if let Some(definition) = definitions.get_mut(table) {
            definition.primary_key.push(column.to_string());
        }
    }

    for definition in definitions.values() {
        if definition.columns.is_empty() {
            return Err(DumpError::Schema(format!(
                "table '{}' has no columns",
                definition.name
            )));
        }
    }

    Ok(definitions.into_values().collect())
}
