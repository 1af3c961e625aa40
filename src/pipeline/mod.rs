//! Pipeline module
//!
//! Row sources feed the output step; row sinks receive what it emits.
//!
//! # Implementations
//!
//! - [`MemorySource`] / [`CollectingSink`] - in-memory rows
//! - [`JsonLinesSource`] / [`JsonLinesSink`] - newline-delimited JSON
//! - [`NullSink`] - discards rows

mod json_lines;
mod memory;

pub use json_lines::{JsonLinesSink, JsonLinesSource};
pub use memory::{CollectingSink, MemorySource, NullSink};

use crate::error::Result;
use crate::types::Row;
use arrow::datatypes::SchemaRef;

/// Upstream row source, pulled one row at a time
pub trait RowSource {
    /// The next row, or `None` once the source is exhausted
    fn next_row(&mut self) -> Result<Option<Row>>;

    /// Schema of the rows currently being produced, if known
    fn input_schema(&self) -> Option<SchemaRef>;
}

/// Downstream row sink
pub trait RowSink {
    /// Receive one row
    fn emit(&mut self, row: Row) -> Result<()>;

    /// No more rows will be emitted
    fn finish(&mut self) -> Result<()>;
}
