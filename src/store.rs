//! Read-only chunk stores over a dataset root (local directory, HTTP, S3, GCS).
//!
//! A store maps flat string keys (`obs/.zattrs`, `X/data/3`, ...) to byte
//! payloads. Absence is a normal answer, not an error: loaders probe keys to
//! discover dataset structure, so `get` returns `Ok(None)` for a missing key
//! and reserves `Err` for transport and configuration failures.

use std::path::{Path, PathBuf};

use crate::config::ViewerConfig;
use crate::error::{DataError, Result};
use crate::source::{self, DatasetLocation};

pub trait ChunkStore: Send {
    /// Fetches the raw bytes stored at `key`, or `None` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Display form of the store root for messages and logs.
    fn location(&self) -> String;
}

/// Builds the store matching the dataset root's scheme. Scheme detection is
/// string parsing only; no request is made until the first `get`.
pub fn open_store(root: &Path, config: &ViewerConfig) -> Result<Box<dyn ChunkStore>> {
    match source::dataset_location(root) {
        DatasetLocation::Local(path) => Ok(Box::new(DirectoryStore::new(path))),
        DatasetLocation::Http(url) => {
            #[cfg(feature = "http")]
            {
                return Ok(Box::new(HttpStore::new(url, config.http.timeout_seconds)));
            }
            #[cfg(not(feature = "http"))]
            {
                let _ = url;
                return Err(DataError::Store(
                    "HTTP/HTTPS datasets are not supported in this build. Rebuild with default features.".into(),
                ));
            }
        }
        DatasetLocation::S3 { bucket, prefix } => {
            #[cfg(feature = "cloud")]
            {
                return Ok(Box::new(ObjectChunkStore::s3(&bucket, &prefix, config)?));
            }
            #[cfg(not(feature = "cloud"))]
            {
                let _ = (bucket, prefix);
                return Err(DataError::Store(
                    "S3 datasets are not supported in this build. Rebuild with default features and set AWS credentials (e.g. AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_REGION).".into(),
                ));
            }
        }
        DatasetLocation::Gcs { bucket, prefix } => {
            #[cfg(feature = "cloud")]
            {
                return Ok(Box::new(ObjectChunkStore::gcs(&bucket, &prefix)?));
            }
            #[cfg(not(feature = "cloud"))]
            {
                let _ = (bucket, prefix);
                return Err(DataError::Store(
                    "GCS (gs://) datasets are not supported in this build. Rebuild with default features.".into(),
                ));
            }
        }
    }
}

/// Store over a plain directory tree; keys are relative file paths.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ChunkStore for DirectoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.root.join(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DataError::Io(e)),
        }
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }
}

/// Store over an HTTP(S) base URL; keys become path segments under it.
/// A 404 is key absence; every other failed status is a transport error.
#[cfg(feature = "http")]
pub struct HttpStore {
    base_url: String,
    timeout: std::time::Duration,
}

#[cfg(feature = "http")]
impl HttpStore {
    pub fn new(base_url: String, timeout_seconds: u64) -> Self {
        Self {
            base_url,
            timeout: std::time::Duration::from_secs(timeout_seconds),
        }
    }
}

#[cfg(feature = "http")]
impl ChunkStore for HttpStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        use std::io::Read;

        let url = source::join_key(&self.base_url, key);
        match ureq::get(&url).timeout(self.timeout).call() {
            Ok(response) => {
                let mut bytes = Vec::new();
                response
                    .into_reader()
                    .read_to_end(&mut bytes)
                    .map_err(|e| DataError::Http(format!("reading body of {url}: {e}")))?;
                Ok(Some(bytes))
            }
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(e) => Err(DataError::Http(format!(
                "GET {url} failed. Check the URL and your connection: {e}"
            ))),
        }
    }

    fn location(&self) -> String {
        self.base_url.clone()
    }
}

/// Store over an `object_store` backend (S3 or GCS). Credentials come from
/// the environment, optionally overridden by the `[cloud]` config section.
#[cfg(feature = "cloud")]
pub struct ObjectChunkStore {
    store: std::sync::Arc<dyn object_store::ObjectStore>,
    runtime: tokio::runtime::Runtime,
    prefix: String,
    display: String,
}

#[cfg(feature = "cloud")]
impl ObjectChunkStore {
    pub fn s3(bucket: &str, prefix: &str, config: &ViewerConfig) -> Result<Self> {
        let cloud = &config.cloud;
        let mut builder = object_store::aws::AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(e) = cloud.s3_endpoint_url.as_ref() {
            builder = builder.with_endpoint(e);
        }
        if let Some(k) = cloud.s3_access_key_id.as_ref() {
            builder = builder.with_access_key_id(k);
        }
        if let Some(s) = cloud.s3_secret_access_key.as_ref() {
            builder = builder.with_secret_access_key(s);
        }
        if let Some(r) = cloud.s3_region.as_ref() {
            builder = builder.with_region(r);
        }
        let store = builder
            .build()
            .map_err(|e| DataError::Store(format!("S3 config failed: {e}")))?;
        Self::wrap(std::sync::Arc::new(store), prefix, format!("s3://{bucket}/{prefix}"))
    }

    pub fn gcs(bucket: &str, prefix: &str) -> Result<Self> {
        let store = object_store::gcp::GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| DataError::Store(format!("GCS config failed: {e}")))?;
        Self::wrap(std::sync::Arc::new(store), prefix, format!("gs://{bucket}/{prefix}"))
    }

    fn wrap(
        store: std::sync::Arc<dyn object_store::ObjectStore>,
        prefix: &str,
        display: String,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| DataError::Store(format!("could not start runtime: {e}")))?;
        Ok(Self {
            store,
            runtime,
            prefix: prefix.to_string(),
            display,
        })
    }
}

#[cfg(feature = "cloud")]
impl ChunkStore for ObjectChunkStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        use object_store::path::Path as OsPath;
        use object_store::ObjectStore;

        let full = source::join_key(&self.prefix, key);
        let path = OsPath::from(full.as_str());
        let get_result = match self.runtime.block_on(self.store.get(&path)) {
            Ok(r) => r,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => {
                return Err(DataError::Store(format!(
                    "could not read {full}. Check credentials and URL: {e}"
                )))
            }
        };
        let bytes = self
            .runtime
            .block_on(get_result.bytes())
            .map_err(|e| DataError::Store(format!("could not read body of {full}: {e}")))?;
        Ok(Some(bytes.to_vec()))
    }

    fn location(&self) -> String {
        self.display.clone()
    }
}
