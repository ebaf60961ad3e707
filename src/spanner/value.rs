// ABOUTME: Spanner REST wire types and conversion of JSON-encoded cells to Values
// ABOUTME: INT64 arrives as text, BYTES as base64, non-finite floats as strings

use crate::error::{DumpError, Result};
use crate::value::Value;
use base64::Engine;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireType {
    pub code: String,
    #[serde(default)]
    pub array_element_type: Option<Box<WireType>>,
}

impl WireType {
    pub fn scalar(code: &str) -> Self {
        Self {
            code: code.to_string(),
            array_element_type: None,
        }
    }

    pub fn array_of(element: WireType) -> Self {
        Self {
            code: "ARRAY".to_string(),
            array_element_type: Some(Box::new(element)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Field {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: WireType,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StructType {
    #[serde(default)]
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSetMetadata {
    #[serde(default)]
    pub row_type: StructType,
}

/// One element of an `executeStreamingSql` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialResultSet {
    #[serde(default)]
    pub metadata: Option<ResultSetMetadata>,
    #[serde(default)]
    pub values: Vec<JsonValue>,
    #[serde(default)]
    pub chunked_value: bool,
    #[serde(default)]
    pub error: Option<ApiErrorDetail>,
}

/// Google API error payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl ApiErrorDetail {
    pub fn into_error(self, http_status: u16) -> DumpError {
        let message = match self.status {
            Some(status) => format!("{}: {}", status, self.message),
            None => self.message,
        };
        DumpError::Api {
            status: self.code.unwrap_or(http_status),
            message,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ApiErrorDetail,
}

/// Convert one JSON-encoded cell of the given type.
pub fn decode_wire_value(value: JsonValue, ty: &WireType, column: &str) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    let mismatch = |value: &JsonValue| {
        DumpError::decode(
            column,
            format!("malformed {} value: {}", ty.code, value),
        )
    };

    match ty.code.as_str() {
        "BOOL" => value.as_bool().map(Value::Bool).ok_or_else(|| mismatch(&value)),
        "INT64" => match &value {
            JsonValue::String(s) => s.parse().map(Value::Int64).map_err(|_| mismatch(&value)),
            JsonValue::Number(n) => n.as_i64().map(Value::Int64).ok_or_else(|| mismatch(&value)),
            _ => Err(mismatch(&value)),
        },
        "FLOAT64" => wire_float(&value)
            .map(Value::Float64)
            .ok_or_else(|| mismatch(&value)),
        "FLOAT32" => wire_float(&value)
            .map(|f| Value::Float32(f as f32))
            .ok_or_else(|| mismatch(&value)),
        "NUMERIC" => into_string(value, &mismatch).map(Value::Numeric),
        "STRING" => into_string(value, &mismatch).map(Value::String),
        "JSON" => into_string(value, &mismatch).map(Value::Json),
        "BYTES" => {
            let encoded = into_string(value, &mismatch)?;
            base64::engine::general_purpose::STANDARD
                .decode(encoded.as_bytes())
                .map(Value::Bytes)
                .map_err(|e| DumpError::decode(column, format!("invalid base64 in BYTES value: {}", e)))
        }
        "TIMESTAMP" => {
            let text = into_string(value, &mismatch)?;
            DateTime::parse_from_rfc3339(&text)
                .map(|t| Value::Timestamp(t.with_timezone(&Utc)))
                .map_err(|e| DumpError::decode(column, format!("invalid TIMESTAMP '{}': {}", text, e)))
        }
        "DATE" => {
            let text = into_string(value, &mismatch)?;
            NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|e| DumpError::decode(column, format!("invalid DATE '{}': {}", text, e)))
        }
        "ARRAY" => {
            let element = ty.array_element_type.as_deref().ok_or_else(|| {
                DumpError::decode(column, "ARRAY type without an element type")
            })?;
            match value {
                JsonValue::Array(items) => items
                    .into_iter()
                    .map(|item| decode_wire_value(item, element, column))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array),
                other => Err(mismatch(&other)),
            }
        }
        other => Err(DumpError::decode(
            column,
            format!("unsupported type {}", other),
        )),
    }
}

fn wire_float(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            other => other.parse().ok(),
        },
        _ => None,
    }
}

fn into_string(value: JsonValue, mismatch: &impl Fn(&JsonValue) -> DumpError) -> Result<String> {
    match value {
        JsonValue::String(s) => Ok(s),
        other => Err(mismatch(&other)),
    }
}
