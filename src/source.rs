//! Dataset root detection for local paths vs remote URLs (S3, GCS, HTTP/HTTPS).

use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DatasetLocation {
    Local(PathBuf),
    S3 { bucket: String, prefix: String },
    Gcs { bucket: String, prefix: String },
    Http(String),
}

/// Classifies the dataset root as local, S3, GCS, or HTTP/HTTPS using string
/// parsing only (no filesystem or network calls).
pub fn dataset_location(root: &Path) -> DatasetLocation {
    let s = root.as_os_str().to_string_lossy();
    if let Some(after_scheme) = s.find("://") {
        let scheme = s[..after_scheme].to_lowercase();
        let rest = &s[after_scheme + 3..];
        if scheme == "s3" || scheme == "s3a" {
            let (bucket, prefix) = split_bucket(rest);
            return DatasetLocation::S3 { bucket, prefix };
        }
        if scheme == "gs" || scheme == "gcs" {
            let (bucket, prefix) = split_bucket(rest);
            return DatasetLocation::Gcs { bucket, prefix };
        }
        if scheme == "http" || scheme == "https" {
            return DatasetLocation::Http(trim_trailing_slash(&s).to_string());
        }
    }
    DatasetLocation::Local(root.to_path_buf())
}

/// Splits `bucket/some/prefix` into bucket and key prefix. The prefix may be
/// empty when the dataset sits at the bucket root.
fn split_bucket(rest: &str) -> (String, String) {
    let rest = trim_trailing_slash(rest);
    match rest.find('/') {
        Some(i) => (rest[..i].to_string(), rest[i + 1..].to_string()),
        None => (rest.to_string(), String::new()),
    }
}

fn trim_trailing_slash(s: &str) -> &str {
    s.trim_end_matches('/')
}

/// Joins a store-relative key onto a base URL or prefix without doubling
/// separators. An empty base yields the key unchanged.
pub fn join_key(base: &str, key: &str) -> String {
    let key = key.trim_start_matches('/');
    if base.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", trim_trailing_slash(base), key)
    }
}
