// ABOUTME: Utility functions for identifier handling and validation
// ABOUTME: Provides quoting, resource-id validation and retry with backoff

use crate::error::{DumpError, Result};
use std::time::Duration;

/// Quote a GoogleSQL identifier with backticks.
///
/// # Examples
///
/// ```
/// # use spanner_dump::utils::quote_ident;
/// assert_eq!(quote_ident("Users"), "`Users`");
/// ```
pub fn quote_ident(identifier: &str) -> String {
    format!("`{}`", identifier)
}

/// Strip surrounding backticks and whitespace from a user-supplied table name.
///
/// # Examples
///
/// ```
/// # use spanner_dump::utils::trim_identifier;
/// assert_eq!(trim_identifier(" `Users` "), "Users");
/// ```
pub fn trim_identifier(identifier: &str) -> &str {
    identifier.trim().trim_matches('`')
}

/// Validate a project, instance or database ID before it is placed in a
/// resource path.
///
/// IDs must be non-empty and consist of letters, digits, `-`, `_`, `.` and `:`
/// (the last two appear in domain-scoped project IDs).
///
/// # Examples
///
/// ```
/// # use spanner_dump::utils::validate_resource_id;
/// assert!(validate_resource_id("project", "my-project").is_ok());
/// assert!(validate_resource_id("project", "").is_err());
/// assert!(validate_resource_id("database", "db/../other").is_err());
/// ```
pub fn validate_resource_id(kind: &str, id: &str) -> Result<()> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(DumpError::Configuration(format!(
            "{} ID cannot be empty",
            kind
        )));
    }

    if let Some(c) = trimmed
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '-' | '_' | '.' | ':'))
    {
        return Err(DumpError::Configuration(format!(
            "{} ID '{}' contains invalid character '{}'",
            kind,
            sanitize_identifier(trimmed),
            if c.is_control() {
                format!("\\x{:02x}", c as u32)
            } else {
                c.to_string()
            }
        )));
    }

    Ok(())
}

/// Sanitize an identifier for display
///
/// Removes control characters and limits length so error messages and logs
/// stay readable.
///
/// # Examples
///
/// ```
/// # use spanner_dump::utils::sanitize_identifier;
/// assert_eq!(sanitize_identifier("normal_table"), "normal_table");
/// assert_eq!(sanitize_identifier("table\nname"), "tablename");
/// ```
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

/// Retry an operation with exponential backoff
///
/// Only transient failures (see [`DumpError::is_transient`]) are retried; any
/// other error is returned immediately.
///
/// # Arguments
///
/// * `operation` - Async function to retry
/// * `max_retries` - Maximum number of retry attempts (0 = just the initial attempt)
/// * `initial_delay` - Delay before the first retry, doubled for each later one
/// * `what` - Label for log messages
pub async fn retry_with_backoff<F, Fut, T>(
    mut operation: F,
    max_retries: u32,
    initial_delay: Duration,
    what: &str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = initial_delay;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_retries && e.is_transient() => {
                attempt += 1;
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                    what,
                    attempt,
                    max_retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}
