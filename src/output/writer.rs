//! Record writers
//!
//! [`RecordWriterFactory`] and [`RecordWriter`] are the seam between the
//! output step and the columnar encoder. [`ParquetWriterFactory`] is the
//! Parquet implementation.

use super::schema::{check_value, rows_to_batch};
use crate::error::{Error, Result};
use crate::storage::Location;
use crate::types::{CompressionKind, JsonValue, Row};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

/// Everything needed to create a record writer
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Target location (staged or final)
    pub location: Location,
    /// Replace an existing file at the target
    pub overwrite: bool,
    /// Schema of every row written
    pub schema: SchemaRef,
    /// Compression kind
    pub compression: CompressionKind,
    /// Compression block size in bytes, only present when compressed
    pub compression_block_size: Option<usize>,
    /// Rows between index entries
    pub row_index_stride: usize,
    /// Maximum rows per stripe
    pub stripe_size: usize,
}

impl WriterOptions {
    /// Build Parquet writer properties
    pub fn writer_properties(&self) -> WriterProperties {
        let mut builder = WriterProperties::builder()
            .set_compression(self.compression.into())
            .set_max_row_group_size(self.stripe_size)
            .set_data_page_row_count_limit(self.row_index_stride);

        if let Some(size) = self.compression_block_size {
            builder = builder.set_data_page_size_limit(size);
        }

        builder.build()
    }
}

/// A writer that serializes rows into a columnar file
pub trait RecordWriter {
    /// Write one row
    fn write(&mut self, row: &Row) -> Result<()>;

    /// Number of rows accepted so far
    fn rows_written(&self) -> u64;

    /// Flush and finalize the file, returning the number of rows written
    fn close(self: Box<Self>) -> Result<u64>;
}

/// Creates record writers
pub trait RecordWriterFactory: Send + Sync {
    /// Create a writer for the given options
    fn create(&self, options: &WriterOptions) -> Result<Box<dyn RecordWriter>>;
}

/// Factory for [`ParquetRecordWriter`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetWriterFactory;

impl RecordWriterFactory for ParquetWriterFactory {
    fn create(&self, options: &WriterOptions) -> Result<Box<dyn RecordWriter>> {
        let path = options.location.as_local().ok_or_else(|| {
            Error::writer(format!(
                "Parquet writer cannot write {} directly; stage it locally",
                options.location
            ))
        })?;

        let writer = ParquetRecordWriter::new(
            path,
            Arc::clone(&options.schema),
            options.writer_properties(),
            options.overwrite,
            options.row_index_stride,
        )?;
        Ok(Box::new(writer))
    }
}

/// Parquet file writer that buffers rows into RecordBatches
pub struct ParquetRecordWriter {
    /// Arrow writer
    writer: ArrowWriter<File>,
    /// Output schema
    schema: SchemaRef,
    /// Rows not yet encoded
    buffer: Vec<Vec<JsonValue>>,
    /// Rows per RecordBatch
    batch_size: usize,
    /// Number of rows written
    rows_written: u64,
}

impl ParquetRecordWriter {
    /// Create a new Parquet writer at `path`
    pub fn new(
        path: &Path,
        schema: SchemaRef,
        props: WriterProperties,
        overwrite: bool,
        batch_size: usize,
    ) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                Error::writer(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(overwrite)
            .create_new(!overwrite)
            .truncate(overwrite)
            .open(path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    Error::destination_exists(path.display().to_string())
                } else {
                    Error::writer(format!("Failed to create file {}: {e}", path.display()))
                }
            })?;

        let writer = match ArrowWriter::try_new(file, Arc::clone(&schema), Some(props)) {
            Ok(writer) => writer,
            Err(e) => {
                if let Err(rm) = fs::remove_file(path) {
                    tracing::warn!("Failed to remove {}: {rm}", path.display());
                }
                return Err(Error::writer(format!(
                    "Failed to create Parquet writer: {e}"
                )));
            }
        };

        tracing::debug!("Opened Parquet writer at {}", path.display());

        Ok(Self {
            writer,
            schema,
            buffer: Vec::new(),
            batch_size: batch_size.max(1),
            rows_written: 0,
        })
    }

    /// Encode buffered rows
    fn flush_buffer(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = rows_to_batch(&self.schema, &self.buffer)?;
        self.writer.write(&batch)?;
        self.buffer.clear();
        Ok(())
    }
}

impl RecordWriter for ParquetRecordWriter {
    fn write(&mut self, row: &Row) -> Result<()> {
        if !Arc::ptr_eq(row.schema(), &self.schema)
            && row.schema().fields() != self.schema.fields()
        {
            return Err(Error::schema_mismatch(
                "row schema differs from the writer schema",
            ));
        }

        for (field, value) in self.schema.fields().iter().zip(row.values()) {
            check_value(field.name(), value, field.data_type())?;
        }

        self.buffer.push(row.values().to_vec());
        self.rows_written += 1;

        if self.buffer.len() >= self.batch_size {
            self.flush_buffer()?;
        }
        Ok(())
    }

    fn rows_written(&self) -> u64 {
        self.rows_written
    }

    fn close(mut self: Box<Self>) -> Result<u64> {
        self.flush_buffer()?;
        let Self {
            writer,
            rows_written,
            ..
        } = *self;
        writer.close()?;
        Ok(rows_written)
    }
}

/// Read every RecordBatch from a local Parquet file
pub fn read_parquet(path: impl AsRef<Path>) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let file = File::open(path.as_ref())?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = Arc::clone(builder.schema());
    let batches = builder.build()?.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((schema, batches))
}

/// Read every RecordBatch from Parquet bytes held in memory
pub fn read_parquet_bytes(data: Bytes) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(data)?;
    let schema = Arc::clone(builder.schema());
    let batches = builder.build()?.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((schema, batches))
}
