//! Newline-delimited JSON sources and sinks

use super::{RowSink, RowSource};
use crate::error::{Error, Result};
use crate::output::infer_row_schema;
use crate::types::{JsonValue, Row};
use arrow::datatypes::SchemaRef;
use std::io::{BufRead, Write};
use std::sync::Arc;

/// Source reading one JSON object per line.
///
/// The schema is inferred from the first object. Later objects are aligned
/// to it by field name; missing keys become null and extra keys are ignored.
pub struct JsonLinesSource<R> {
    reader: R,
    schema: Option<SchemaRef>,
    line: String,
    line_number: usize,
}

impl<R: BufRead> JsonLinesSource<R> {
    /// Create a source over a buffered reader
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            schema: None,
            line: String::new(),
            line_number: 0,
        }
    }

    /// Use a fixed schema instead of inferring one
    #[must_use]
    pub fn with_schema(mut self, schema: SchemaRef) -> Self {
        self.schema = Some(schema);
        self
    }
}

impl<R: BufRead> RowSource for JsonLinesSource<R> {
    fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let value: JsonValue = serde_json::from_str(trimmed)?;
            let JsonValue::Object(obj) = value else {
                return Err(Error::schema_mismatch(format!(
                    "line {} is not a JSON object",
                    self.line_number
                )));
            };

            let schema = match &self.schema {
                Some(schema) => Arc::clone(schema),
                None => {
                    let schema = Arc::new(infer_row_schema(&obj));
                    tracing::debug!(
                        "Inferred input schema with {} fields",
                        schema.fields().len()
                    );
                    self.schema = Some(Arc::clone(&schema));
                    schema
                }
            };

            let values = schema
                .fields()
                .iter()
                .map(|f| obj.get(f.name()).cloned().unwrap_or(JsonValue::Null))
                .collect();
            return Row::try_new(schema, values).map(Some);
        }
    }

    fn input_schema(&self) -> Option<SchemaRef> {
        self.schema.clone()
    }
}

/// Sink writing each row as one JSON object per line
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    /// Create a sink over a writer
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Consume the sink, returning the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RowSink for JsonLinesSink<W> {
    fn emit(&mut self, row: Row) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &row.to_json())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
