// ABOUTME: Maps a DDL statement to the table it creates, indexes or alters
// ABOUTME: Ordered anchored matchers; statements without a table yield an empty name

use regex::Regex;
use std::sync::LazyLock;

/// Index statements come first: their `ON <table>` clause must not be read as
/// a table definition.
static MATCHERS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        matcher(
            r"(?i:CREATE\s+(?:UNIQUE\s+)?(?:NULL_FILTERED\s+)?INDEX\s+(?:IF\s+NOT\s+EXISTS\s+)?)[a-zA-Z0-9_`.]+\s+(?i:ON)\s+`?([a-zA-Z0-9_]+)`?",
        ),
        matcher(r"(?i:CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?)`?([a-zA-Z0-9_]+)`?"),
        matcher(r"(?i:ALTER\s+TABLE\s+)`?([a-zA-Z0-9_]+)`?"),
    ]
});

fn matcher(pattern: &str) -> Regex {
    Regex::new(&format!(r"^\s*{}", pattern)).expect("DDL patterns are valid regular expressions")
}

/// Return the table name a DDL statement defines or modifies.
///
/// An empty string means the statement has no table association (views,
/// change streams, ...) and so cannot be filtered by table.
///
/// # Examples
///
/// ```
/// # use spanner_dump::schema::extract_table_name;
/// assert_eq!(extract_table_name("CREATE TABLE Users (Id INT64) PRIMARY KEY (Id)"), "Users");
/// assert_eq!(extract_table_name("CREATE UNIQUE INDEX idx ON `Orders` (Id)"), "Orders");
/// assert_eq!(extract_table_name("CREATE VIEW v AS SELECT 1"), "");
/// ```
pub fn extract_table_name(ddl: &str) -> String {
    MATCHERS
        .iter()
        .find_map(|re| re.captures(ddl))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
