//! Staging paths and cleanup of orphaned staging directories
//!
//! Publishing a staged file is a copy followed by a delete, not a rename.
//! A crash between the two leaves a `columnar-stage-*` directory behind;
//! [`sweep_staging`] removes those.

use crate::error::{Error, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

/// Name prefix of every staging directory
pub const STAGING_PREFIX: &str = "columnar-stage-";

/// Build a unique staging file path under `root`.
///
/// Layout: `{root}/columnar-stage-{timestamp}-{pid}-{seq}/{file_name}`.
/// Nothing is created on disk.
pub fn staged_path(root: &Path, file_name: &str, seq: u64) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6f");
    let dir = format!("{STAGING_PREFIX}{stamp}-{}-{seq}", std::process::id());
    root.join(dir).join(file_name)
}

/// Remove every staging directory directly under `root`.
///
/// Returns the removed directories. A missing root is not an error.
pub fn sweep_staging(root: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(Error::storage(format!(
                "Failed to list staging root {}: {e}",
                root.display()
            )))
        }
    };

    let mut removed = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::storage(format!("Failed to read entry: {e}")))?;
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(STAGING_PREFIX) {
            continue;
        }
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        fs::remove_dir_all(&path).map_err(|e| {
            Error::storage(format!("Failed to remove {}: {e}", path.display()))
        })?;
        tracing::info!("Removed orphaned staging directory {}", path.display());
        removed.push(path);
    }

    removed.sort();
    Ok(removed)
}
