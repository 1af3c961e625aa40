//! `object_store`-backed storage adapter

use super::adapter::StorageAdapter;
use super::location::{Location, RemoteLocation, Scheme};
use super::staging::staged_path;
use crate::error::{Error, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;
use url::Url;

/// Storage adapter for local paths and object store URLs.
///
/// Remote calls run to completion on an owned single-threaded runtime, so
/// every operation blocks the caller. Do not call from inside another tokio
/// runtime.
#[derive(Debug)]
pub struct Storage {
    runtime: Arc<Runtime>,
    staging_root: PathBuf,
    stores: Mutex<HashMap<(Scheme, String), Arc<dyn ObjectStore>>>,
    sequence: AtomicU64,
}

impl Storage {
    /// Create a storage adapter staging files under `staging_root`
    pub fn new(staging_root: impl Into<PathBuf>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::storage(format!("Failed to start storage runtime: {e}")))?;

        Ok(Self {
            runtime: Arc::new(runtime),
            staging_root: staging_root.into(),
            stores: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        })
    }

    /// Root directory for staged files
    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    /// The in-memory store behind `memory://{bucket}/` locations
    pub fn memory_store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        self.store_for(Scheme::Memory, bucket)
    }

    /// Get or build the object store for a bucket
    fn store_for(&self, scheme: Scheme, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let key = (scheme, bucket.to_string());
        let mut stores = self
            .stores
            .lock()
            .map_err(|_| Error::storage("Object store cache poisoned"))?;
        if let Some(store) = stores.get(&key) {
            return Ok(Arc::clone(store));
        }

        let store: Arc<dyn ObjectStore> = match scheme {
            Scheme::S3 | Scheme::R2 => {
                let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
                // R2 endpoint: https://<account_id>.r2.cloudflarestorage.com
                if scheme == Scheme::R2 {
                    if let Ok(endpoint) = std::env::var("R2_ENDPOINT_URL") {
                        builder = builder.with_endpoint(endpoint);
                    }
                }
                Arc::new(builder.build().map_err(|e| {
                    Error::storage(format!("Failed to create {} client: {e}", scheme.as_str()))
                })?)
            }
            Scheme::Gcs => Arc::new(
                GoogleCloudStorageBuilder::from_env()
                    .with_bucket_name(bucket)
                    .build()
                    .map_err(|e| Error::storage(format!("Failed to create GCS client: {e}")))?,
            ),
            Scheme::Azure => Arc::new(
                MicrosoftAzureBuilder::from_env()
                    .with_container_name(bucket)
                    .build()
                    .map_err(|e| Error::storage(format!("Failed to create Azure client: {e}")))?,
            ),
            Scheme::Memory => Arc::new(InMemory::new()),
        };

        stores.insert(key, Arc::clone(&store));
        Ok(store)
    }

    fn resolve_remote(&self, url: &Url, scheme: Scheme) -> Result<Location> {
        let bucket = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::storage(format!("Missing bucket in {url}")))?;
        let path = ObjectPath::from_url_path(url.path())
            .map_err(|e| Error::storage(format!("Invalid object path in {url}: {e}")))?;

        Ok(Location::Remote(RemoteLocation {
            scheme,
            bucket: bucket.to_string(),
            path,
            store: self.store_for(scheme, bucket)?,
        }))
    }

    fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn remote_list(&self, remote: &RemoteLocation) -> Result<Vec<ObjectMeta>> {
        self.block_on(remote.store.list(Some(&remote.path)).try_collect::<Vec<_>>())
            .map_err(|e| Error::storage(format!("Failed to list {}: {e}", remote.url())))
    }
}

impl StorageAdapter for Storage {
    fn resolve(&self, logical: &str) -> Result<Location> {
        match Url::parse(logical) {
            // Single-letter schemes are Windows drive letters
            Ok(url) if url.scheme().len() > 1 => {
                if url.scheme() == "file" {
                    let path = url
                        .to_file_path()
                        .map_err(|()| Error::storage(format!("Invalid file URL: {logical}")))?;
                    return Ok(Location::Local(path));
                }
                let scheme = Scheme::from_url_scheme(url.scheme()).ok_or_else(|| {
                    Error::storage(format!("Unsupported storage scheme '{}'", url.scheme()))
                })?;
                self.resolve_remote(&url, scheme)
            }
            _ => Ok(Location::Local(PathBuf::from(logical))),
        }
    }

    fn exists(&self, location: &Location) -> Result<bool> {
        match location {
            Location::Local(path) => path
                .try_exists()
                .map_err(|e| Error::storage(format!("Failed to stat {}: {e}", path.display()))),
            Location::Remote(remote) => match self.block_on(remote.store.head(&remote.path)) {
                Ok(_) => Ok(true),
                Err(object_store::Error::NotFound { .. }) => Ok(false),
                Err(e) => Err(Error::storage(format!(
                    "Failed to stat {}: {e}",
                    remote.url()
                ))),
            },
        }
    }

    fn delete(&self, location: &Location) -> Result<()> {
        match location {
            Location::Local(path) => fs::remove_file(path)
                .map_err(|e| Error::storage(format!("Failed to delete {}: {e}", path.display()))),
            Location::Remote(remote) => self
                .block_on(remote.store.delete(&remote.path))
                .map_err(|e| Error::storage(format!("Failed to delete {}: {e}", remote.url()))),
        }
    }

    fn delete_recursive(&self, location: &Location) -> Result<()> {
        match location {
            Location::Local(path) => {
                let result = if path.is_dir() {
                    fs::remove_dir_all(path)
                } else {
                    fs::remove_file(path)
                };
                result.map_err(|e| {
                    Error::storage(format!("Failed to delete {}: {e}", path.display()))
                })
            }
            Location::Remote(remote) => {
                for meta in self.remote_list(remote)? {
                    self.block_on(remote.store.delete(&meta.location))
                        .map_err(|e| {
                            Error::storage(format!("Failed to delete {}: {e}", meta.location))
                        })?;
                }
                Ok(())
            }
        }
    }

    fn parent(&self, location: &Location) -> Option<Location> {
        match location {
            Location::Local(path) => path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| Location::Local(p.to_path_buf())),
            Location::Remote(remote) => {
                let parts: Vec<_> = remote.path.parts().collect();
                if parts.len() < 2 {
                    return None;
                }
                let parent: ObjectPath = parts[..parts.len() - 1].iter().cloned().collect();
                Some(Location::Remote(remote.with_path(parent)))
            }
        }
    }

    fn open_read(&self, location: &Location) -> Result<Box<dyn Read>> {
        match location {
            Location::Local(path) => {
                let file = File::open(path).map_err(|e| {
                    Error::storage(format!("Failed to open {}: {e}", path.display()))
                })?;
                Ok(Box::new(BufReader::new(file)))
            }
            Location::Remote(remote) => {
                let bytes = self
                    .block_on(async {
                        remote.store.get(&remote.path).await?.bytes().await
                    })
                    .map_err(|e| Error::storage(format!("Failed to read {}: {e}", remote.url())))?;
                Ok(Box::new(Cursor::new(bytes)))
            }
        }
    }

    fn open_write(&self, location: &Location, truncate: bool) -> Result<Box<dyn Write>> {
        match location {
            Location::Local(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent).map_err(|e| {
                        Error::storage(format!("Failed to create {}: {e}", parent.display()))
                    })?;
                }
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(truncate)
                    .append(!truncate)
                    .open(path)
                    .map_err(|e| {
                        Error::storage(format!("Failed to open {}: {e}", path.display()))
                    })?;
                Ok(Box::new(BufWriter::new(file)))
            }
            Location::Remote(remote) => {
                if !truncate {
                    return Err(Error::storage(format!(
                        "Appending is not supported for {}",
                        remote.url()
                    )));
                }
                Ok(Box::new(RemoteWriter {
                    runtime: Arc::clone(&self.runtime),
                    remote: remote.clone(),
                    buffer: Vec::new(),
                    dirty: true,
                }))
            }
        }
    }

    fn maybe_stage(&self, location: &Location) -> Result<Option<Location>> {
        match location {
            Location::Local(_) => Ok(None),
            Location::Remote(remote) => {
                let file_name = remote.path.filename().unwrap_or("output");
                let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
                Ok(Some(Location::Local(staged_path(
                    &self.staging_root,
                    file_name,
                    seq,
                ))))
            }
        }
    }
}

/// Buffers written bytes and uploads them as one object on flush
struct RemoteWriter {
    runtime: Arc<Runtime>,
    remote: RemoteLocation,
    buffer: Vec<u8>,
    dirty: bool,
}

impl Write for RemoteWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.dirty = true;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let payload = PutPayload::from(Bytes::from(self.buffer.clone()));
        self.runtime
            .block_on(self.remote.store.put(&self.remote.path, payload))
            .map_err(|e| io::Error::other(format!("Failed to upload {}: {e}", self.remote.url())))?;
        self.dirty = false;
        Ok(())
    }
}
