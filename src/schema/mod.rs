// ABOUTME: Table discovery and dump ordering for interleaved table hierarchies
// ABOUTME: Precomputes each table's quoted column projection once per dump

pub mod ddl;

pub use ddl::extract_table_name;

use crate::error::{DumpError, Result};
use crate::source::{DdlSource, SnapshotSource};
use crate::utils::quote_ident;
use std::collections::BTreeMap;

/// Storage type of a column, parsed from its `SPANNER_TYPE` text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Bool,
    Int64,
    Float32,
    Float64,
    Numeric,
    String,
    Json,
    Bytes,
    Date,
    Timestamp,
    Array(Box<ColumnType>),
    /// A type the dump cannot render (PROTO, ENUM, TOKENLIST, ...).
    Other(String),
}

impl ColumnType {
    /// Parse a Spanner type such as `STRING(MAX)`, `INT64` or `ARRAY<BYTES(16)>`.
    pub fn parse(spanner_type: &str) -> Self {
        let t = spanner_type.trim();
        if let Some(rest) = t.strip_prefix("ARRAY<") {
            if let Some(end) = rest.rfind('>') {
                return ColumnType::Array(Box::new(ColumnType::parse(&rest[..end])));
            }
        }

        // Length and option suffixes, e.g. STRING(1024)
        let base = t.split_once('(').map_or(t, |(base, _)| base).trim();
        match base.to_ascii_uppercase().as_str() {
            "BOOL" => ColumnType::Bool,
            "INT64" => ColumnType::Int64,
            "FLOAT32" => ColumnType::Float32,
            "FLOAT64" => ColumnType::Float64,
            "NUMERIC" => ColumnType::Numeric,
            "STRING" => ColumnType::String,
            "JSON" => ColumnType::Json,
            "BYTES" => ColumnType::Bytes,
            "DATE" => ColumnType::Date,
            "TIMESTAMP" => ColumnType::Timestamp,
            _ => ColumnType::Other(t.to_string()),
        }
    }

    pub fn name(&self) -> String {
        match self {
            ColumnType::Bool => "BOOL".to_string(),
            ColumnType::Int64 => "INT64".to_string(),
            ColumnType::Float32 => "FLOAT32".to_string(),
            ColumnType::Float64 => "FLOAT64".to_string(),
            ColumnType::Numeric => "NUMERIC".to_string(),
            ColumnType::String => "STRING".to_string(),
            ColumnType::Json => "JSON".to_string(),
            ColumnType::Bytes => "BYTES".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::Array(elem) => format!("ARRAY<{}>", elem.name()),
            ColumnType::Other(raw) => raw.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, spanner_type: &str) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::parse(spanner_type),
        }
    }
}

/// A table as listed by the database, before ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: String,
    /// Columns in ordinal order.
    pub columns: Vec<Column>,
    /// Interleave parent, if any.
    pub parent: Option<String>,
    /// Primary key columns in key order.
    pub primary_key: Vec<String>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            parent: None,
            primary_key: Vec::new(),
        }
    }

    pub fn interleaved_in(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }
}

/// A table ready to be dumped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    primary_key: Vec<String>,
    quoted_columns: String,
}

impl From<TableDefinition> for Table {
    fn from(def: TableDefinition) -> Self {
        let quoted_columns = def
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            name: def.name,
            columns: def.columns,
            primary_key: def.primary_key,
            quoted_columns,
        }
    }
}

impl Table {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Backtick-quoted, comma-joined column list, e.g. `` `id`, `name` ``.
    pub fn quoted_columns(&self) -> &str {
        &self.quoted_columns
    }

    pub fn quoted_name(&self) -> String {
        quote_ident(&self.name)
    }

    /// Build the data query for this table.
    ///
    /// `predicate` is appended verbatim after `WHERE`. The primary key ordering
    /// is skipped for tables without key columns.
    pub fn select_statement(&self, predicate: Option<&str>, order_by_primary_key: bool) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.quoted_columns, self.quoted_name());
        if let Some(predicate) = predicate {
            sql.push_str(" WHERE ");
            sql.push_str(predicate);
        }
        if order_by_primary_key && !self.primary_key.is_empty() {
            let keys = self
                .primary_key
                .iter()
                .map(|k| quote_ident(k))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys);
        }
        sql
    }
}

/// Order tables so every parent precedes its interleaved children.
///
/// Roots and siblings are visited in lexical order, so the result is the same
/// for the same schema. A parent that is not in `definitions` is ignored and
/// the table is treated as a root.
pub fn order_tables(definitions: Vec<TableDefinition>) -> Result<Vec<Table>> {
    let mut by_name: BTreeMap<String, TableDefinition> = BTreeMap::new();
    for def in definitions {
        if by_name.contains_key(&def.name) {
            return Err(DumpError::Schema(format!(
                "table '{}' is listed more than once",
                def.name
            )));
        }
        by_name.insert(def.name.clone(), def);
    }

    let mut roots = Vec::new();
    let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (name, def) in &by_name {
        match def.parent.as_deref() {
            Some(parent) if by_name.contains_key(parent) => {
                children.entry(parent).or_default().push(name);
            }
            Some(parent) => {
                tracing::warn!(
                    "Parent table '{}' of '{}' is not in the table list, dumping '{}' as a root table",
                    parent,
                    name,
                    name
                );
                roots.push(name.as_str());
            }
            None => roots.push(name.as_str()),
        }
    }

    // Pre-order walk; the stack holds names in reverse so the smallest pops first.
    let mut order: Vec<String> = Vec::with_capacity(by_name.len());
    let mut stack: Vec<&str> = roots.into_iter().rev().collect();
    while let Some(name) = stack.pop() {
        if let Some(kids) = children.get(name) {
            stack.extend(kids.iter().rev());
        }
        order.push(name.to_string());
    }

    if order.len() != by_name.len() {
        let unreachable: Vec<&str> = by_name
            .keys()
            .filter(|name| !order.contains(name))
            .map(String::as_str)
            .collect();
        return Err(DumpError::Schema(format!(
            "cyclic parent relationship among tables: {}",
            unreachable.join(", ")
        )));
    }

    Ok(order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .map(Table::from)
        .collect())
}

/// List the tables visible in `snapshot`, in dump order.
pub async fn fetch_tables<S>(snapshot: &S) -> Result<Vec<Table>>
where
    S: SnapshotSource + ?Sized,
{
    let definitions = snapshot.list_table_definitions().await?;
    tracing::debug!("Fetched {} table definitions", definitions.len());
    order_tables(definitions)
}

/// List the raw DDL statements of the database.
pub async fn fetch_ddl<D>(source: &D) -> Result<Vec<String>>
where
    D: DdlSource + ?Sized,
{
    let statements = source.list_ddl_statements().await?;
    tracing::debug!("Fetched {} DDL statements", statements.len());
    Ok(statements)
}
