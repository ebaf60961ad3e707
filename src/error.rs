// ABOUTME: Error taxonomy shared by the dump pipeline and the Spanner client
// ABOUTME: Every failure except "no table name in DDL" surfaces as a DumpError

use thiserror::Error;

/// Errors produced while exporting a database.
#[derive(Error, Debug)]
pub enum DumpError {
    /// Invalid or missing settings. Raised before any connection is attempted.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The database client could not be constructed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The Spanner API answered with a non-success status.
    #[error("Spanner API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A response did not have the expected shape.
    #[error("Malformed response: {0}")]
    Protocol(String),

    /// Table metadata is internally inconsistent.
    #[error("Invalid schema: {0}")]
    Schema(String),

    #[error("Failed to decode column '{column}': {message}")]
    Decode { column: String, message: String },

    #[error("Failed to serialize row as JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    /// A failure while dumping one table. The dump stops here.
    #[error("Failed to dump table '{table}': {source}")]
    Table {
        table: String,
        #[source]
        source: Box<DumpError>,
    },

    #[error("Dump cancelled")]
    Cancelled,
}

impl DumpError {
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        DumpError::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    pub fn in_table(self, table: &str) -> Self {
        DumpError::Table {
            table: table.to_string(),
            source: Box::new(self),
        }
    }

    /// Whether retrying the request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DumpError::Api { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            DumpError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DumpError>;
