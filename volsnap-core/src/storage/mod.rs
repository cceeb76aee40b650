/*!
Storage backends for snapshot archives.

A backend moves whole archive files between the local temp directory and a
destination: `put` uploads a local file under a key, `list` returns the keys
starting with a prefix in ascending order, and `get` downloads one key into a
local file. Keys are interpreted relative to the backend's location (bucket
or base directory).

Exactly two backends exist and the set is closed: [`LocalFileStorage`] for
`file://` destinations and `S3StorageAdapter` for `s3://` destinations
(behind the `s3` feature). [`DefaultResolver`] picks one per target.
*/

pub mod local;
#[cfg(feature = "s3")]
pub mod s3;

use std::collections::BTreeMap;
use std::path::Path;

use crate::destination::Destination;
use crate::Result;

#[cfg(feature = "async-rt")]
use once_cell::sync::Lazy;
#[cfg(feature = "async-rt")]
use tokio::runtime::Runtime;

#[cfg(feature = "async-rt")]
static GLOBAL_RT: Lazy<Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get().clamp(2, 4))
        .thread_name("volsnap-storage")
        .enable_all()
        .build()
        .expect("Failed to create global async runtime")
});

/// Runtime that drives async storage clients from the synchronous engines
///
/// Must not be entered from an async task; callers inside tokio run the
/// engines through `spawn_blocking`.
#[cfg(feature = "async-rt")]
pub(crate) fn runtime() -> &'static Runtime {
    &GLOBAL_RT
}

/// Backend-specific options of a target, e.g. `StorageClass`
pub type DestinationOptions = BTreeMap<String, String>;

/// Put/list/get access to one destination
#[cfg_attr(test, mockall::automock)]
pub trait StorageBackend {
    /// Store the local file `local` under `key`
    fn put(&self, local: &Path, key: &str) -> Result<()>;

    /// Keys starting with `prefix`, sorted ascending
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Copy the object stored under `key` into the local file `local`
    fn get(&self, key: &str, local: &Path) -> Result<()>;
}

/// Chooses the backend for a target's destination
pub trait BackendResolver {
    fn resolve(
        &self,
        destination: &Destination,
        options: &DestinationOptions,
    ) -> Result<Box<dyn StorageBackend>>;
}

impl<F> BackendResolver for F
where
    F: Fn(&Destination, &DestinationOptions) -> Result<Box<dyn StorageBackend>>,
{
    fn resolve(
        &self,
        destination: &Destination,
        options: &DestinationOptions,
    ) -> Result<Box<dyn StorageBackend>> {
        self(destination, options)
    }
}

/// Resolver used in production: local files or the S3 API
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResolver;

impl BackendResolver for DefaultResolver {
    fn resolve(
        &self,
        destination: &Destination,
        options: &DestinationOptions,
    ) -> Result<Box<dyn StorageBackend>> {
        match destination {
            Destination::LocalFilesystem {
                base_dir: Some(base),
                ..
            } => Ok(Box::new(LocalFileStorage::with_base_dir(base))),
            Destination::LocalFilesystem { base_dir: None, .. } => {
                Ok(Box::new(LocalFileStorage::new()))
            }
            Destination::ObjectStore { bucket, .. } => object_store(bucket, options),
        }
    }
}

#[cfg(feature = "s3")]
fn object_store(bucket: &str, options: &DestinationOptions) -> Result<Box<dyn StorageBackend>> {
    Ok(Box::new(S3StorageAdapter::new(
        bucket.to_string(),
        options.clone(),
    )?))
}

#[cfg(not(feature = "s3"))]
fn object_store(bucket: &str, _options: &DestinationOptions) -> Result<Box<dyn StorageBackend>> {
    Err(crate::VolsnapError::configuration(format!(
        "Destination bucket {bucket} needs the object store backend; build with the `s3` feature"
    )))
}

pub use local::LocalFileStorage;
#[cfg(feature = "s3")]
pub use s3::S3StorageAdapter;

/// Memory-based backend standing in for the object store in tests
///
/// Clones share the same contents, so a test can hand one clone to a
/// resolver and inspect the other.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: std::sync::Arc<std::sync::Mutex<BTreeMap<String, Vec<u8>>>>,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, data: Vec<u8>) {
        self.data.lock().unwrap().insert(key.to_string(), data);
    }

    pub fn keys(&self) -> Vec<String> {
        self.data.lock().unwrap().keys().cloned().collect()
    }

    pub fn read(&self, key: &str) -> Option<Vec<u8>> {
        self.data.lock().unwrap().get(key).cloned()
    }
}

#[cfg(test)]
impl StorageBackend for MemoryStorage {
    fn put(&self, local: &Path, key: &str) -> Result<()> {
        let bytes = std::fs::read(local)?;
        self.insert(key, bytes);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }

    fn get(&self, key: &str, local: &Path) -> Result<()> {
        let bytes = self
            .read(key)
            .ok_or_else(|| crate::VolsnapError::storage(format!("Object '{key}' not found")))?;
        std::fs::write(local, bytes)?;
        Ok(())
    }
}
