// ABOUTME: Converts typed row values into GoogleSQL literal tokens
// ABOUTME: Tokens are shared by the SQL and JSON writers; NULL stays a bare sentinel

use crate::error::{DumpError, Result};
use crate::schema::{ColumnType, Table};
use crate::value::{Row, Value};
use base64::Engine;
use chrono::SecondsFormat;

/// Token emitted for NULL cells. String values are always quoted, so a
/// string containing `NULL` never produces this token.
pub const NULL_TOKEN: &str = "NULL";

/// Decode one row into one token per column, in `table.columns()` order.
///
/// Each token is a GoogleSQL literal:
/// - NULL → `NULL`
/// - BOOL → `TRUE` / `FALSE`
/// - INT64 → decimal text
/// - FLOAT64 → shortest round-trip decimal; NaN and infinities as
///   `CAST("nan" AS FLOAT64)`, `CAST("inf" AS FLOAT64)`, `CAST("-inf" AS FLOAT64)`
/// - FLOAT32 → `CAST(<decimal> AS FLOAT32)`
/// - NUMERIC → `NUMERIC "<text>"`
/// - STRING → double-quoted with escapes
/// - JSON → `JSON "<text>"`
/// - BYTES → `FROM_BASE64("<base64>")`
/// - TIMESTAMP → `TIMESTAMP "<RFC 3339 UTC>"`
/// - DATE → `DATE "YYYY-MM-DD"`
/// - ARRAY → `[<elem>, ...]`
///
/// A value that does not fit its column type, a column of an unsupported
/// type, or an arity mismatch is a decode error naming the column.
pub fn decode_row(row: &Row, table: &Table) -> Result<Vec<String>> {
    let columns = table.columns();
    let values = row.values();
    if values.len() != columns.len() {
        let column = columns
            .get(values.len())
            .map_or("<extra value>", |c| c.name.as_str());
        return Err(DumpError::decode(
            column,
            format!(
                "row has {} values but table '{}' has {} columns",
                values.len(),
                table.name(),
                columns.len()
            ),
        ));
    }

    columns
        .iter()
        .zip(values)
        .map(|(column, value)| {
            encode_value(value, &column.column_type)
                .map_err(|message| DumpError::decode(&column.name, message))
        })
        .collect()
}

/// Render one value as a literal of the given column type.
pub fn encode_value(value: &Value, column_type: &ColumnType) -> std::result::Result<String, String> {
    match (value, column_type) {
        (_, ColumnType::Other(raw)) => Err(format!("unsupported column type {}", raw)),
        (Value::Null, _) => Ok(NULL_TOKEN.to_string()),
        (Value::Bool(b), ColumnType::Bool) => Ok(String::from(if *b { "TRUE" } else { "FALSE" })),
        (Value::Int64(i), ColumnType::Int64) => Ok(i.to_string()),
        (Value::Float64(f), ColumnType::Float64) => Ok(float64_literal(*f)),
        (Value::Float32(f), ColumnType::Float32) => Ok(float32_literal(*f)),
        (Value::Numeric(n), ColumnType::Numeric) => Ok(format!("NUMERIC {}", quote_string(n))),
        (Value::String(s), ColumnType::String) => Ok(quote_string(s)),
        (Value::Json(j), ColumnType::Json) => Ok(format!("JSON {}", quote_string(j))),
        (Value::Bytes(b), ColumnType::Bytes) => Ok(format!(
            "FROM_BASE64(\"{}\")",
            base64::engine::general_purpose::STANDARD.encode(b)
        )),
        (Value::Timestamp(t), ColumnType::Timestamp) => Ok(format!(
            "TIMESTAMP \"{}\"",
            t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        )),
        (Value::Date(d), ColumnType::Date) => Ok(format!("DATE \"{}\"", d.format("%Y-%m-%d"))),
        (Value::Array(items), ColumnType::Array(elem)) => {
            let tokens = items
                .iter()
                .map(|item| encode_value(item, elem))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(format!("[{}]", tokens.join(", ")))
        }
        (value, expected) => Err(format!(
            "expected {} value, got {}",
            expected.name(),
            value.kind()
        )),
    }
}

fn float64_literal(f: f64) -> String {
    if f.is_nan() {
        "CAST(\"nan\" AS FLOAT64)".to_string()
    } else if f.is_infinite() {
        let sign = if f > 0.0 { "" } else { "-" };
        format!("CAST(\"{}inf\" AS FLOAT64)", sign)
    } else {
        // Debug keeps the shortest round-trip digits and uses exponent
        // notation for very large or small magnitudes.
        format!("{:?}", f)
    }
}

fn float32_literal(f: f32) -> String {
    if f.is_nan() {
        "CAST(\"nan\" AS FLOAT32)".to_string()
    } else if f.is_infinite() {
        let sign = if f > 0.0 { "" } else { "-" };
        format!("CAST(\"{}inf\" AS FLOAT32)", sign)
    } else {
        format!("CAST({:?} AS FLOAT32)", f)
    }
}

/// Double-quoted GoogleSQL string literal.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_ascii_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, TableDefinition};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn encode(value: Value, spanner_type: &str) -> String {
        encode_value(&value, &ColumnType::parse(spanner_type)).unwrap()
    }

    #[test]
    fn test_scalars() {
        assert_eq!(encode(Value::Null, "STRING(MAX)"), "NULL");
        assert_eq!(encode(Value::Bool(true), "BOOL"), "TRUE");
        assert_eq!(encode(Value::Bool(false), "BOOL"), "FALSE");
        assert_eq!(encode(Value::Int64(-42), "INT64"), "-42");
        assert_eq!(encode(Value::Int64(i64::MAX), "INT64"), "9223372036854775807");
        assert_eq!(
            encode(Value::Numeric("123.450".to_string()), "NUMERIC"),
            "NUMERIC \"123.450\""
        );
    }

    #[test]
    fn test_null_sentinel_is_distinct_from_string_null() {
        assert_eq!(encode(Value::Null, "STRING(MAX)"), NULL_TOKEN);
        assert_eq!(encode(Value::from("NULL"), "STRING(MAX)"), "\"NULL\"");
    }

    #[test]
    fn test_floats() {
        assert_eq!(encode(Value::Float64(1.5), "FLOAT64"), "1.5");
        assert_eq!(encode(Value::Float64(1.0), "FLOAT64"), "1.0");
        assert_eq!(encode(Value::Float64(1e300), "FLOAT64"), "1e300");
        assert_eq!(
            encode(Value::Float64(f64::NAN), "FLOAT64"),
            "CAST(\"nan\" AS FLOAT64)"
        );
        assert_eq!(
            encode(Value::Float64(f64::INFINITY), "FLOAT64"),
            "CAST(\"inf\" AS FLOAT64)"
        );
        assert_eq!(
            encode(Value::Float64(f64::NEG_INFINITY), "FLOAT64"),
            "CAST(\"-inf\" AS FLOAT64)"
        );
        assert_eq!(
            encode(Value::Float32(0.25), "FLOAT32"),
            "CAST(0.25 AS FLOAT32)"
        );
        assert_eq!(
            encode(Value::Float32(f32::NAN), "FLOAT32"),
            "CAST(\"nan\" AS FLOAT32)"
        );
    }

    #[test]
    fn test_strings_are_escaped() {
        assert_eq!(encode(Value::from("plain"), "STRING(MAX)"), "\"plain\"");
        assert_eq!(
            encode(Value::from("say \"hi\"\n\\ok"), "STRING(MAX)"),
            r#""say \"hi\"\n\\ok""#
        );
        assert_eq!(encode(Value::from("a\u{1}b"), "STRING(MAX)"), r#""a\x01b""#);
        assert_eq!(encode(Value::from("日本語"), "STRING(MAX)"), "\"日本語\"");
        assert_eq!(
            encode(Value::Json(r#"{"a":1}"#.to_string()), "JSON"),
            r#"JSON "{\"a\":1}""#
        );
    }

    #[test]
    fn test_bytes_are_base64() {
        assert_eq!(
            encode(Value::Bytes(b"Hello".to_vec()), "BYTES(MAX)"),
            "FROM_BASE64(\"SGVsbG8=\")"
        );
        assert_eq!(encode(Value::Bytes(Vec::new()), "BYTES(16)"), "FROM_BASE64(\"\")");
    }

    #[test]
    fn test_timestamps_and_dates() {
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            encode(Value::Timestamp(t), "TIMESTAMP"),
            "TIMESTAMP \"2024-01-02T03:04:05Z\""
        );
        let t = t + chrono::Duration::microseconds(123_456);
        assert_eq!(
            encode(Value::Timestamp(t), "TIMESTAMP"),
            "TIMESTAMP \"2024-01-02T03:04:05.123456Z\""
        );
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(encode(Value::Date(d), "DATE"), "DATE \"2024-02-29\"");
    }

    #[test]
    fn test_arrays() {
        assert_eq!(
            encode(
                Value::Array(vec![Value::Int64(1), Value::Null, Value::Int64(3)]),
                "ARRAY<INT64>"
            ),
            "[1, NULL, 3]"
        );
        assert_eq!(encode(Value::Array(vec![]), "ARRAY<STRING(MAX)>"), "[]");
        assert_eq!(
            encode(
                Value::Array(vec![Value::from("a"), Value::from("b,c")]),
                "ARRAY<STRING(MAX)>"
            ),
            r#"["a", "b,c"]"#
        );
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let err = encode_value(&Value::from("x"), &ColumnType::Int64).unwrap_err();
        assert_eq!(err, "expected INT64 value, got STRING");

        let err = encode_value(
            &Value::Array(vec![Value::Int64(1), Value::from("x")]),
            &ColumnType::parse("ARRAY<INT64>"),
        )
        .unwrap_err();
        assert!(err.contains("got STRING"));
    }

    #[test]
    fn test_unsupported_column_type_is_an_error() {
        let err = encode_value(&Value::Null, &ColumnType::parse("PROTO<a.B>")).unwrap_err();
        assert!(err.contains("unsupported column type"));
    }

    fn users() -> Table {
        Table::from(TableDefinition::new(
            "Users",
            vec![
                Column::new("Id", "INT64"),
                Column::new("Name", "STRING(MAX)"),
                Column::new("Tags", "ARRAY<STRING(MAX)>"),
            ],
        ))
    }

    #[test]
    fn test_decode_row_follows_column_order() {
        let row = Row::new(vec![
            Value::Int64(1),
            Value::from("Alice"),
            Value::Array(vec![Value::from("admin")]),
        ]);
        assert_eq!(
            decode_row(&row, &users()).unwrap(),
            vec!["1", "\"Alice\"", "[\"admin\"]"]
        );
    }

    #[test]
    fn test_decode_row_names_failing_column() {
        let row = Row::new(vec![Value::Int64(1), Value::Int64(2), Value::Null]);
        let err = decode_row(&row, &users()).unwrap_err();
        match err {
            DumpError::Decode { column, .. } => assert_eq!(column, "Name"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_row_rejects_arity_mismatch() {
        let row = Row::new(vec![Value::Int64(1)]);
        let err = decode_row(&row, &users()).unwrap_err();
        assert!(err.to_string().contains("row has 1 values but table 'Users' has 3 columns"));
        assert!(matches!(err, DumpError::Decode { ref column, .. } if column == "Name"));
    }
}
