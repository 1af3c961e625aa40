//! Storage module
//!
//! Byte-level access to output locations. Local paths are written directly;
//! object store URLs (S3, R2, GCS, Azure, and a process-local `memory://`
//! store) cannot be written by the record writer and are staged locally
//! first.
//!
//! # Supported locations
//!
//! - `/local/path`, `./path`, `file:///path` - local filesystem
//! - `s3://bucket/key`, `r2://bucket/key` - AWS S3 / Cloudflare R2
//! - `gs://bucket/key` - Google Cloud Storage
//! - `az://container/key` - Azure Blob Storage
//! - `memory://bucket/key` - in-memory store owned by the [`Storage`] value

mod adapter;
mod location;
mod object;
mod staging;

pub use adapter::StorageAdapter;
pub use location::{Location, RemoteLocation, Scheme};
pub use object::Storage;
pub use staging::{staged_path, sweep_staging, STAGING_PREFIX};
