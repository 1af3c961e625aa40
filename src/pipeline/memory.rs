//! In-memory sources and sinks

use super::{RowSink, RowSource};
use crate::error::Result;
use crate::types::Row;
use arrow::datatypes::SchemaRef;
use std::collections::VecDeque;
use std::sync::Arc;

/// Source that yields a fixed list of rows
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    rows: VecDeque<Row>,
    current: Option<SchemaRef>,
}

impl MemorySource {
    /// Create a source from rows
    pub fn new(rows: impl IntoIterator<Item = Row>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
            current: None,
        }
    }

    /// Report `schema` as the input schema until a row says otherwise
    #[must_use]
    pub fn with_schema(mut self, schema: SchemaRef) -> Self {
        self.current = Some(schema);
        self
    }

    /// Rows not yet pulled
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl RowSource for MemorySource {
    fn next_row(&mut self) -> Result<Option<Row>> {
        let row = self.rows.pop_front();
        if let Some(row) = &row {
            self.current = Some(Arc::clone(row.schema()));
        }
        Ok(row)
    }

    fn input_schema(&self) -> Option<SchemaRef> {
        self.current
            .clone()
            .or_else(|| self.rows.front().map(|r| Arc::clone(r.schema())))
    }
}

/// Sink that keeps every emitted row
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    rows: Vec<Row>,
    finished: bool,
}

impl CollectingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows received so far
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Whether `finish` was called
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Consume the sink, returning its rows
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl RowSink for CollectingSink {
    fn emit(&mut self, row: Row) -> Result<()> {
        self.rows.push(row);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

/// Sink that discards rows
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl RowSink for NullSink {
    fn emit(&mut self, _row: Row) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
