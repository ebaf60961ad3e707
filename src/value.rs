// ABOUTME: Typed cell values and rows as delivered by a snapshot row stream
// ABOUTME: The format-neutral input of the row decoder

use chrono::{DateTime, NaiveDate, Utc};

/// One typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    /// Arbitrary-precision decimal, kept as its canonical text.
    Numeric(String),
    String(String),
    /// JSON document text.
    Json(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Array(Vec<Value>),
}

impl Value {
    /// Short type label used in decode error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOL",
            Value::Int64(_) => "INT64",
            Value::Float32(_) => "FLOAT32",
            Value::Float64(_) => "FLOAT64",
            Value::Numeric(_) => "NUMERIC",
            Value::String(_) => "STRING",
            Value::Json(_) => "JSON",
            Value::Bytes(_) => "BYTES",
            Value::Timestamp(_) => "TIMESTAMP",
            Value::Date(_) => "DATE",
            Value::Array(_) => "ARRAY",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// One row: values aligned positionally with the queried columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Text of a STRING cell, `None` for NULL or any other type.
    pub fn get_str(&self, idx: usize) -> Option<&str> {
        match self.values.get(idx) {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}
