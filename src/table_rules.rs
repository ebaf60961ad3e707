// ABOUTME: Per-table row predicates layered on top of the global --where clause
// ABOUTME: Loaded from the config file and resolved into one WHERE clause per table

use crate::error::{DumpError, Result};
use crate::utils::{sanitize_identifier, trim_identifier};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRules {
    global_predicate: Option<String>,
    table_filters: BTreeMap<String, String>,
}

impl TableRules {
    /// Predicate applied to every table. Blank text means no predicate.
    pub fn with_global_predicate(mut self, predicate: Option<String>) -> Self {
        self.global_predicate = predicate
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        self
    }

    pub fn add_table_filter(&mut self, table: String, predicate: String) -> Result<()> {
        let table = trim_identifier(&table).to_string();
        if table.is_empty() {
            return Err(DumpError::Configuration(
                "table filter is missing a table name".to_string(),
            ));
        }
        let predicate = predicate.trim().to_string();
        if predicate.is_empty() {
            return Err(DumpError::Configuration(format!(
                "table filter for '{}' has an empty predicate",
                sanitize_identifier(&table)
            )));
        }
        if self.table_filters.contains_key(&table) {
            return Err(DumpError::Configuration(format!(
                "duplicate table filter for '{}'",
                sanitize_identifier(&table)
            )));
        }
        self.table_filters.insert(table, predicate);
        Ok(())
    }

    pub fn table_filter(&self, table: &str) -> Option<&str> {
        self.table_filters.get(table).map(String::as_str)
    }

    /// The WHERE clause text for `table`, combining the global predicate and
    /// the table's own predicate with AND.
    pub fn predicate_for(&self, table: &str) -> Option<String> {
        match (self.global_predicate.as_deref(), self.table_filter(table)) {
            (Some(global), Some(local)) => Some(format!("({}) AND ({})", global, local)),
            (Some(global), None) => Some(global.to_string()),
            (None, Some(local)) => Some(local.to_string()),
            (None, None) => None,
        }
    }
}
