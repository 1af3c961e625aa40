//! Common types used throughout the output step
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use crate::error::{Error, Result};
use arrow::datatypes::SchemaRef;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use serde::{Deserialize, Serialize};

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

// ============================================================================
// Row
// ============================================================================

/// A single row: a schema plus one value per schema field, positionally aligned
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    schema: SchemaRef,
    values: Vec<JsonValue>,
}

impl Row {
    /// Create a row, checking that there is exactly one value per field
    pub fn try_new(schema: SchemaRef, values: Vec<JsonValue>) -> Result<Self> {
        let expected = schema.fields().len();
        if values.len() != expected {
            return Err(Error::schema_mismatch(format!(
                "row has {} values but schema has {expected} fields",
                values.len()
            )));
        }
        Ok(Self { schema, values })
    }

    /// The row's schema
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// The row's values, in schema order
    pub fn values(&self) -> &[JsonValue] {
        &self.values
    }

    /// Number of fields in the row
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no fields
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Look up a value by field name
    pub fn value(&self, name: &str) -> Option<&JsonValue> {
        let idx = self.schema.index_of(name).ok()?;
        self.values.get(idx)
    }

    /// Render the row as a JSON object keyed by field name
    pub fn to_json(&self) -> JsonValue {
        let mut obj = JsonObject::new();
        for (field, value) in self.schema.fields().iter().zip(&self.values) {
            obj.insert(field.name().clone(), value.clone());
        }
        JsonValue::Object(obj)
    }
}

// ============================================================================
// Compression
// ============================================================================

/// Compression applied to the output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    #[default]
    None,
    Zlib,
    Snappy,
    Lz4,
    Zstd,
}

impl CompressionKind {
    /// Map a configured compression name onto a variant.
    ///
    /// Total: unrecognized names map to [`CompressionKind::None`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "zlib" | "gzip" => Self::Zlib,
            "snappy" => Self::Snappy,
            "lz4" | "lz4_raw" => Self::Lz4,
            "zstd" | "zstandard" => Self::Zstd,
            "none" | "uncompressed" | "" => Self::None,
            other => {
                tracing::warn!("Unknown compression '{}', writing uncompressed", other);
                Self::None
            }
        }
    }

    /// Canonical lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Zlib => "zlib",
            Self::Snappy => "snappy",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }

    /// Whether any compression is applied
    pub fn is_compressed(self) -> bool {
        self != Self::None
    }
}

impl std::fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<CompressionKind> for Compression {
    fn from(kind: CompressionKind) -> Self {
        match kind {
            CompressionKind::None => Compression::UNCOMPRESSED,
            CompressionKind::Zlib => Compression::GZIP(GzipLevel::default()),
            CompressionKind::Snappy => Compression::SNAPPY,
            CompressionKind::Lz4 => Compression::LZ4_RAW,
            CompressionKind::Zstd => Compression::ZSTD(ZstdLevel::default()),
        }
    }
}
