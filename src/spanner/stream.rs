// ABOUTME: Incremental parsing of executeStreamingSql responses into rows
// ABOUTME: Splits the streamed JSON array, merges chunked values, assembles rows

use crate::error::{DumpError, Result};
use crate::source::RowStream;
use crate::spanner::value::{decode_wire_value, Field, PartialResultSet};
use crate::value::Row;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt, TryStreamExt};
use serde_json::Value as JsonValue;
use std::collections::VecDeque;

/// Splits a JSON array that arrives in arbitrary byte chunks into its
/// top-level object elements.
///
/// Only the bytes of the element currently being read are retained.
#[derive(Debug, Default)]
pub struct JsonArraySplitter {
    buf: Vec<u8>,
    scan: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    start: Option<usize>,
    opened: bool,
    closed: bool,
}

impl JsonArraySplitter {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete element, or `None` until more bytes arrive.
    pub fn next_element(&mut self) -> Result<Option<Vec<u8>>> {
        while self.scan < self.buf.len() {
            let pos = self.scan;
            let b = self.buf[pos];
            self.scan += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match (self.depth, b) {
                (_, b' ' | b'\n' | b'\r' | b'\t') => {}
                (0, b'[') if !self.opened => {
                    self.opened = true;
                    self.depth = 1;
                }
                (1, b',') => {}
                (1, b'{') => {
                    self.start = Some(pos);
                    self.depth = 2;
                }
                (1, b']') => {
                    self.depth = 0;
                    self.closed = true;
                }
                (d, b'{' | b'[') if d >= 2 => self.depth += 1,
                (d, b'}' | b']') if d >= 2 => {
                    self.depth -= 1;
                    if self.depth == 1 {
                        if let Some(start) = self.start.take() {
                            let element = self.buf[start..=pos].to_vec();
                            self.buf.drain(..=pos);
                            self.scan = 0;
                            return Ok(Some(element));
                        }
                    }
                }
                (d, b'"') if d >= 2 => self.in_string = true,
                (d, _) if d >= 2 => {}
                (_, other) => {
                    return Err(DumpError::Protocol(format!(
                        "unexpected byte '{}' in streaming response",
                        char::from(other).escape_default()
                    )));
                }
            }
        }

        // Keep only the unfinished element
        let keep_from = self.start.unwrap_or(self.scan);
        self.buf.drain(..keep_from);
        self.scan -= keep_from;
        if let Some(start) = self.start.as_mut() {
            *start = 0;
        }
        Ok(None)
    }

    /// Check that the array was complete when the body ended.
    pub fn finish(&self) -> Result<()> {
        if !self.opened {
            return Err(DumpError::Protocol(
                "streaming response was empty".to_string(),
            ));
        }
        if !self.closed {
            return Err(DumpError::Protocol(
                "streaming response ended before the result set was complete".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builds rows out of the flat, possibly chunked value lists of partial
/// result sets.
#[derive(Debug, Default)]
pub struct RowAssembler {
    fields: Vec<Field>,
    has_metadata: bool,
    pending: Vec<JsonValue>,
    chunked: bool,
}

impl RowAssembler {
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Add one partial result set and return the rows it completed.
    pub fn push(&mut self, set: PartialResultSet) -> Result<Vec<Row>> {
        if let Some(metadata) = set.metadata {
            self.fields = metadata.row_type.fields;
            self.has_metadata = true;
        }
        if !self.has_metadata && !set.values.is_empty() {
            return Err(DumpError::Protocol(
                "received values before result set metadata".to_string(),
            ));
        }

        let mut values = set.values.into_iter();
        if self.chunked {
            if let Some(first) = values.next() {
                let last = self.pending.pop().ok_or_else(|| {
                    DumpError::Protocol("chunked value without a preceding chunk".to_string())
                })?;
                self.pending.push(merge_chunks(last, first)?);
            }
        }
        self.pending.extend(values);
        self.chunked = set.chunked_value;

        let width = self.fields.len();
        if width == 0 {
            if self.pending.is_empty() {
                return Ok(Vec::new());
            }
            return Err(DumpError::Protocol(
                "received values for a result set without columns".to_string(),
            ));
        }

        // A chunked last value is incomplete and must wait for the next set
        let complete = self.pending.len().saturating_sub(usize::from(self.chunked));
        let take = complete - complete % width;
        let ready: Vec<JsonValue> = self.pending.drain(..take).collect();

        let mut rows = Vec::with_capacity(take / width);
        let mut ready = ready.into_iter();
        for _ in 0..take / width {
            let values = self
                .fields
                .iter()
                .zip(ready.by_ref())
                .map(|(field, value)| decode_wire_value(value, &field.field_type, &field.name))
                .collect::<Result<Vec<_>>>()?;
            rows.push(Row::new(values));
        }
        Ok(rows)
    }

    /// Check that no partial row is left once the stream ended.
    pub fn finish(&self) -> Result<()> {
        if self.chunked || !self.pending.is_empty() {
            return Err(DumpError::Protocol(format!(
                "result stream ended with {} values of an incomplete row",
                self.pending.len()
            )));
        }
        Ok(())
    }
}

/// Merge the tail of one chunked value with the head of the next.
///
/// Strings are concatenated. Lists are concatenated, merging the boundary
/// elements when both are strings or both are lists.
pub fn merge_chunks(head: JsonValue, tail: JsonValue) -> Result<JsonValue> {
    match (head, tail) {
        (JsonValue::String(mut a), JsonValue::String(b)) => {
            a.push_str(&b);
            Ok(JsonValue::String(a))
        }
        (JsonValue::Array(mut a), JsonValue::Array(b)) => {
            let mut rest = b.into_iter();
            if let Some(first) = rest.next() {
                match a.pop() {
                    Some(last) if mergeable(&last, &first) => a.push(merge_chunks(last, first)?),
                    Some(last) => {
                        a.push(last);
                        a.push(first);
                    }
                    None => a.push(first),
                }
            }
            a.extend(rest);
            Ok(JsonValue::Array(a))
        }
        (head, tail) => Err(DumpError::Protocol(format!(
            "cannot merge chunked values {} and {}",
            head, tail
        ))),
    }
}

fn mergeable(a: &JsonValue, b: &JsonValue) -> bool {
    matches!(
        (a, b),
        (JsonValue::String(_), JsonValue::String(_)) | (JsonValue::Array(_), JsonValue::Array(_))
    )
}

struct StreamState<B> {
    body: BoxStream<'static, Result<B>>,
    splitter: JsonArraySplitter,
    assembler: RowAssembler,
    ready: VecDeque<Row>,
    done: bool,
}

/// Turn the body of an `executeStreamingSql` response into a row stream.
///
/// Rows are yielded as soon as their values are complete, so memory stays
/// bounded by one response chunk plus one partial row.
pub fn rows_from_partial_result_sets<S, B, E>(body: S) -> RowStream<'static>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<DumpError> + Send + 'static,
{
    let state = StreamState {
        body: body.map_err(Into::into).boxed(),
        splitter: JsonArraySplitter::default(),
        assembler: RowAssembler::default(),
        ready: VecDeque::new(),
        done: false,
    };

    stream::try_unfold(state, next_row).boxed()
}

async fn next_row<B>(mut state: StreamState<B>) -> Result<Option<(Row, StreamState<B>)>>
where
    B: AsRef<[u8]> + Send + 'static,
{
    loop {
        if let Some(row) = state.ready.pop_front() {
            return Ok(Some((row, state)));
        }
        if state.done {
            return Ok(None);
        }

        if let Some(element) = state.splitter.next_element()? {
            let set: PartialResultSet = serde_json::from_slice(&element)
                .map_err(|e| DumpError::Protocol(format!("invalid partial result set: {}", e)))?;
            if let Some(error) = set.error {
                return Err(error.into_error(500));
            }
            let rows = state.assembler.push(set)?;
            state.ready.extend(rows);
            continue;
        }

        match state.body.next().await {
            Some(chunk) => state.splitter.push(chunk?.as_ref()),
            None => {
                state.splitter.finish()?;
                state.assembler.finish()?;
                state.done = true;
            }
        }
    }
}
