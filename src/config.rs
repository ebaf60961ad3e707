// ABOUTME: Validates and normalizes dump settings before any connection is made
// ABOUTME: Parses the optional TOML config file with per-table row filters

use crate::dump::DumpOptions;
use crate::error::{DumpError, Result};
use crate::filters::TableFilter;
use crate::table_rules::TableRules;
use crate::utils::validate_resource_id;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Rows per INSERT statement when `--bulk-size` is 0 or absent.
///
/// Keeps a single statement well below the per-commit mutation limit for
/// typical row widths.
pub const DEFAULT_BULK_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Sql,
    Json,
}

impl FromStr for OutputFormat {
    type Err = DumpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sql" => Ok(OutputFormat::Sql),
            "json" => Ok(OutputFormat::Json),
            other => Err(DumpError::Configuration(format!(
                "unsupported format '{}': expected 'sql' or 'json'",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Sql => f.write_str("sql"),
            OutputFormat::Json => f.write_str("json"),
        }
    }
}

/// Raw settings as collected from flags and environment.
#[derive(Debug, Clone, Default)]
pub struct DumpArgs {
    pub project: String,
    pub instance: String,
    pub database: String,
    pub tables: Option<String>,
    pub no_ddl: bool,
    pub no_data: bool,
    pub timestamp: Option<String>,
    pub bulk_size: usize,
    pub where_clause: Option<String>,
    pub format: Option<String>,
    pub order_by_primary_key: bool,
    pub config_file: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub emulator_host: Option<String>,
    pub access_token: Option<String>,
}

/// Where and how to reach the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub project: String,
    pub instance: String,
    pub database: String,
    pub endpoint: Option<String>,
    pub emulator_host: Option<String>,
    pub access_token: Option<String>,
}

impl ConnectionSettings {
    /// `projects/<p>/instances/<i>/databases/<d>`
    pub fn database_path(&self) -> String {
        format!(
            "projects/{}/instances/{}/databases/{}",
            self.project, self.instance, self.database
        )
    }
}

/// Validated dump configuration.
#[derive(Debug, Clone)]
pub struct DumpConfig {
    pub connection: ConnectionSettings,
    pub tables: TableFilter,
    pub no_ddl: bool,
    pub no_data: bool,
    /// Read timestamp for the snapshot; `None` reads at "now".
    pub timestamp: Option<DateTime<Utc>>,
    pub bulk_size: usize,
    pub format: OutputFormat,
    pub rules: TableRules,
    pub order_by_primary_key: bool,
    pub output: Option<PathBuf>,
}

impl DumpConfig {
    /// Validate raw settings. Fails with a configuration error before
    /// anything is connected or written.
    pub fn from_args(args: DumpArgs) -> Result<Self> {
        validate_resource_id("project", &args.project)?;
        validate_resource_id("instance", &args.instance)?;
        validate_resource_id("database", &args.database)?;

        let format = match args.format.as_deref() {
            Some(f) => f.parse()?,
            None => OutputFormat::default(),
        };

        let timestamp = args
            .timestamp
            .as_deref()
            .map(parse_timestamp)
            .transpose()?;

        let bulk_size = if args.bulk_size == 0 {
            DEFAULT_BULK_SIZE
        } else {
            args.bulk_size
        };

        let tables = match args.tables.as_deref() {
            Some(list) => TableFilter::new(list.split(',')),
            None => TableFilter::all(),
        };

        let mut rules = TableRules::default().with_global_predicate(args.where_clause);
        if let Some(path) = args.config_file.as_deref() {
            load_table_rules_from_file(path, &mut rules)?;
        }

        Ok(Self {
            connection: ConnectionSettings {
                project: args.project.trim().to_string(),
                instance: args.instance.trim().to_string(),
                database: args.database.trim().to_string(),
                endpoint: non_blank(args.endpoint),
                emulator_host: non_blank(args.emulator_host),
                access_token: non_blank(args.access_token),
            },
            tables,
            no_ddl: args.no_ddl,
            no_data: args.no_data,
            timestamp,
            bulk_size,
            format,
            rules,
            order_by_primary_key: args.order_by_primary_key,
            output: args.output,
        })
    }

    pub fn dump_options(&self) -> DumpOptions {
        DumpOptions {
            bulk_size: self.bulk_size,
            format: self.format,
            rules: self.rules.clone(),
            order_by_primary_key: self.order_by_primary_key,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse an RFC 3339 timestamp with an explicit offset.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            DumpError::Configuration(format!(
                "failed to parse timestamp '{}' as RFC 3339: {}",
                text, e
            ))
        })
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    table_filters: Vec<TableFilterConfig>,
}

#[derive(Debug, Deserialize)]
struct TableFilterConfig {
    table: String,
    #[serde(rename = "where")]
    predicate: String,
}

/// Add the per-table filters declared in a TOML config file to `rules`.
pub fn load_table_rules_from_file(path: &Path, rules: &mut TableRules) -> Result<()> {
    let raw = fs::read_to_string(path).map_err(|e| {
        DumpError::Configuration(format!(
            "failed to read config file at {}: {}",
            path.display(),
            e
        ))
    })?;
    let parsed: ConfigFile = toml::from_str(&raw).map_err(|e| {
        DumpError::Configuration(format!(
            "failed to parse TOML config at {}: {}",
            path.display(),
            e
        ))
    })?;

    for filter in parsed.table_filters {
        rules.add_table_filter(filter.table, filter.predicate)?;
    }
    Ok(())
}
