//! Configuration for the output step
//!
//! [`OutputStepConfig`] is what users write (YAML or JSON). It is validated
//! on load and then resolved against a [`Variables`] space into the
//! [`StepSettings`] the output step consumes.

use crate::error::{Error, Result};
use crate::template::{self, Variables};
use crate::types::CompressionKind;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Default compression block size in bytes
pub const DEFAULT_COMPRESSION_BLOCK_SIZE: usize = 256 * 1024;

/// Default number of rows between index entries
pub const DEFAULT_ROW_INDEX_STRIDE: usize = 10_000;

/// Default stripe (row group) size in rows
pub const DEFAULT_STRIPE_SIZE: usize = 1024 * 1024;

// ============================================================================
// User-facing config
// ============================================================================

/// Output step configuration loaded from YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputStepConfig {
    /// Destination path or URL, may contain `${VAR}` placeholders
    #[serde(default)]
    pub destination: String,

    /// Replace an existing destination file
    #[serde(default)]
    pub overwrite: bool,

    /// Ordered list of field names written to the file
    #[serde(default)]
    pub fields: Vec<String>,

    /// Compression name; unknown names fall back to none
    #[serde(default = "default_compression")]
    pub compression: String,

    /// Compression block size in bytes (only used when compressed)
    #[serde(default = "default_compression_block_size")]
    pub compression_block_size: usize,

    /// Rows between index entries
    #[serde(default = "default_row_index_stride")]
    pub row_index_stride: usize,

    /// Maximum rows per stripe
    #[serde(default = "default_stripe_size")]
    pub stripe_size: usize,

    /// Directory for staged files (defaults to the system temp dir)
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,

    /// Optional `chrono` format inserted before the file extension
    #[serde(default)]
    pub filename_timestamp: Option<String>,
}

fn default_compression() -> String {
    "none".to_string()
}

fn default_compression_block_size() -> usize {
    DEFAULT_COMPRESSION_BLOCK_SIZE
}

fn default_row_index_stride() -> usize {
    DEFAULT_ROW_INDEX_STRIDE
}

fn default_stripe_size() -> usize {
    DEFAULT_STRIPE_SIZE
}

impl OutputStepConfig {
    /// Create a config with defaults for everything but destination and fields
    pub fn new(destination: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            destination: destination.into(),
            overwrite: false,
            fields,
            compression: default_compression(),
            compression_block_size: DEFAULT_COMPRESSION_BLOCK_SIZE,
            row_index_stride: DEFAULT_ROW_INDEX_STRIDE,
            stripe_size: DEFAULT_STRIPE_SIZE,
            staging_dir: None,
            filename_timestamp: None,
        }
    }

    /// Validate the config
    pub fn validate(&self) -> Result<()> {
        if self.destination.trim().is_empty() {
            return Err(Error::config("No output files defined"));
        }

        if self.fields.is_empty() {
            return Err(Error::invalid_value(
                "fields",
                "at least one output field is required",
            ));
        }

        let mut seen = HashSet::new();
        for name in &self.fields {
            if name.is_empty() {
                return Err(Error::invalid_value("fields", "field names cannot be empty"));
            }
            if !seen.insert(name.as_str()) {
                return Err(Error::invalid_value(
                    "fields",
                    format!("duplicate field name '{name}'"),
                ));
            }
        }

        for (field, value) in [
            ("compression_block_size", self.compression_block_size),
            ("row_index_stride", self.row_index_stride),
            ("stripe_size", self.stripe_size),
        ] {
            if value == 0 {
                return Err(Error::invalid_value(field, "must be greater than zero"));
            }
        }

        Ok(())
    }

    /// Resolve variables and enum-like values into step settings
    pub fn resolve(&self, vars: &Variables) -> Result<StepSettings> {
        self.resolve_at(vars, Local::now())
    }

    /// Resolve using a fixed clock (filename timestamps)
    pub fn resolve_at(&self, vars: &Variables, now: DateTime<Local>) -> Result<StepSettings> {
        self.validate()?;

        let mut destination = template::substitute(&self.destination, vars)?;
        if template::has_variables(&self.destination) {
            tracing::debug!("Resolved destination '{}' -> '{}'", self.destination, destination);
        }
        if let Some(format) = &self.filename_timestamp {
            destination = insert_timestamp(&destination, &now.format(format).to_string());
        }

        let staging_dir = match &self.staging_dir {
            Some(dir) => PathBuf::from(template::substitute(&dir.to_string_lossy(), vars)?),
            None => std::env::temp_dir(),
        };

        Ok(StepSettings {
            destination,
            overwrite: self.overwrite,
            fields: self.fields.clone(),
            compression: CompressionKind::from_name(&self.compression),
            compression_block_size: self.compression_block_size,
            row_index_stride: self.row_index_stride,
            stripe_size: self.stripe_size,
            staging_dir,
        })
    }
}

/// Insert a timestamp before the extension of the last path segment
fn insert_timestamp(destination: &str, stamp: &str) -> String {
    let name_start = destination.rfind('/').map_or(0, |idx| idx + 1);
    match destination[name_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let split = name_start + dot;
            format!("{}_{stamp}{}", &destination[..split], &destination[split..])
        }
        _ => format!("{destination}_{stamp}"),
    }
}

// ============================================================================
// Resolved settings
// ============================================================================

/// Fully resolved settings for one run of the output step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSettings {
    /// Resolved destination path or URL
    pub destination: String,
    /// Replace an existing destination file
    pub overwrite: bool,
    /// Ordered output field names
    pub fields: Vec<String>,
    /// Compression kind
    pub compression: CompressionKind,
    /// Compression block size in bytes
    pub compression_block_size: usize,
    /// Rows between index entries
    pub row_index_stride: usize,
    /// Maximum rows per stripe
    pub stripe_size: usize,
    /// Root directory for staged files
    pub staging_dir: PathBuf,
}

// ============================================================================
// Loading
// ============================================================================

/// Load and validate a config from a YAML (or JSON) file
pub fn load_config(path: impl AsRef<Path>) -> Result<OutputStepConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        Error::config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;
    load_config_from_str(&content)
}

/// Load and validate a config from a YAML string
///
/// JSON is valid YAML, so JSON configs load through the same path.
pub fn load_config_from_str(yaml: &str) -> Result<OutputStepConfig> {
    let config: OutputStepConfig = serde_yaml::from_str(yaml)
        .map_err(|e| Error::config(format!("Failed to parse config YAML: {e}")))?;

    config.validate()?;
    Ok(config)
}
