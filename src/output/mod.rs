//! Output module
//!
//! Handles Arrow RecordBatch creation and Parquet file writing.
//!
//! # Overview
//!
//! This module provides:
//! - The record writer traits the output step writes through
//! - A Parquet implementation of those traits
//! - Row to Arrow conversion and schema inference for JSON rows
//! - Rendering Arrow batches back to JSON

mod schema;
mod writer;

pub use schema::{arrow_to_json, check_value, infer_row_schema, infer_type, rows_to_batch};
pub use writer::{
    read_parquet, read_parquet_bytes, ParquetRecordWriter, ParquetWriterFactory, RecordWriter,
    RecordWriterFactory, WriterOptions,
};
