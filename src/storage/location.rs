//! Physical storage locations

use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Object store flavour of a remote location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    S3,
    R2,
    Gcs,
    Azure,
    Memory,
}

impl Scheme {
    /// Parse a URL scheme
    pub fn from_url_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "s3" => Some(Self::S3),
            "r2" => Some(Self::R2),
            "gs" => Some(Self::Gcs),
            "az" => Some(Self::Azure),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }

    /// URL scheme string
    pub fn as_str(self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::R2 => "r2",
            Self::Gcs => "gs",
            Self::Azure => "az",
            Self::Memory => "memory",
        }
    }
}

/// A file inside an object store bucket
#[derive(Debug, Clone)]
pub struct RemoteLocation {
    pub(crate) scheme: Scheme,
    pub(crate) bucket: String,
    pub(crate) path: ObjectPath,
    pub(crate) store: Arc<dyn ObjectStore>,
}

impl RemoteLocation {
    /// Object store scheme
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Bucket or container name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Path of the object within its store
    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// Full URL of the object
    pub fn url(&self) -> String {
        format!("{}://{}/{}", self.scheme.as_str(), self.bucket, self.path)
    }

    /// Same bucket and store, different object path
    pub(crate) fn with_path(&self, path: ObjectPath) -> Self {
        Self {
            scheme: self.scheme,
            bucket: self.bucket.clone(),
            path,
            store: Arc::clone(&self.store),
        }
    }
}

impl PartialEq for RemoteLocation {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme && self.bucket == other.bucket && self.path == other.path
    }
}

/// A resolved physical location
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    /// Local filesystem path
    Local(PathBuf),
    /// Object in an object store
    Remote(RemoteLocation),
}

impl Location {
    /// The local path, if this is a local location
    pub fn as_local(&self) -> Option<&Path> {
        match self {
            Self::Local(path) => Some(path),
            Self::Remote(_) => None,
        }
    }

    /// Final path segment
    pub fn file_name(&self) -> Option<String> {
        match self {
            Self::Local(path) => path.file_name().map(|n| n.to_string_lossy().into_owned()),
            Self::Remote(remote) => remote.path.filename().map(ToString::to_string),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(remote) => f.write_str(&remote.url()),
        }
    }
}
