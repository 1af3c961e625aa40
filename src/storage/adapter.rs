//! Storage adapter trait

use super::location::Location;
use crate::error::Result;
use std::io::{Read, Write};

/// Stateless byte-stream access to named locations.
///
/// Writers returned by [`StorageAdapter::open_write`] must be flushed to
/// make their content durable; remote writers upload on flush.
pub trait StorageAdapter: Send + Sync {
    /// Resolve a logical path or URL to a physical location
    fn resolve(&self, logical: &str) -> Result<Location>;

    /// Whether something exists at the location
    fn exists(&self, location: &Location) -> Result<bool>;

    /// Delete a single file
    fn delete(&self, location: &Location) -> Result<()>;

    /// Delete a location and everything beneath it
    fn delete_recursive(&self, location: &Location) -> Result<()>;

    /// The location containing `location`, if any
    fn parent(&self, location: &Location) -> Option<Location>;

    /// Open a location for reading
    fn open_read(&self, location: &Location) -> Result<Box<dyn Read>>;

    /// Open a location for writing, truncating or appending to existing content
    fn open_write(&self, location: &Location, truncate: bool) -> Result<Box<dyn Write>>;

    /// A staging location to write instead of `location`, when the record
    /// writer cannot write `location` directly
    fn maybe_stage(&self, location: &Location) -> Result<Option<Location>>;
}
