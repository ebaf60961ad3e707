// ABOUTME: Table allow-list shared by the DDL and data phases of a dump
// ABOUTME: Built once from configuration and never mutated afterwards

use crate::utils::trim_identifier;
use std::collections::BTreeSet;

/// Represents the set of tables selected for a dump
///
/// An empty filter selects every table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableFilter {
    tables: BTreeSet<String>,
}

impl TableFilter {
    /// Creates a filter from table names. Backticks and surrounding
    /// whitespace are stripped; empty names are ignored.
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tables = tables
            .into_iter()
            .map(|t| trim_identifier(t.as_ref()).to_string())
            .filter(|t| !t.is_empty())
            .collect();
        Self { tables }
    }

    /// Creates an empty filter (dump everything)
    pub fn all() -> Self {
        Self::default()
    }

    /// Checks if the filter selects every table
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Determines if a table's data should be dumped. Names compare case-sensitively.
    pub fn includes_table(&self, table: &str) -> bool {
        self.tables.is_empty() || self.tables.contains(table)
    }

    /// Determines if a DDL statement attributed to `table` should be emitted.
    ///
    /// Statements with no table association (empty name) are always emitted.
    pub fn includes_ddl(&self, table: &str) -> bool {
        table.is_empty() || self.includes_table(table)
    }

    /// Allow-listed names that are not among `existing`.
    pub fn unknown_tables<'a>(&'a self, existing: &[&str]) -> Vec<&'a str> {
        self.tables
            .iter()
            .filter(|t| !existing.contains(&t.as_str()))
            .map(String::as_str)
            .collect()
    }
}
