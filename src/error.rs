//! Typed errors for the data-access core.
//!
//! Callers (the render layer, bindings) branch on variants rather than
//! parsing message strings: a missing store key is not the same failure as a
//! corrupt categorical encoding or an unknown gene.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DataError>;

#[derive(Error, Debug)]
pub enum DataError {
    /// A store key (array, attribute document, chunk) that must exist is absent.
    #[error("not found in store: {0}")]
    NotFound(String),

    /// Payload bytes or metadata could not be decoded (bad dtype, code out of
    /// range, truncated chunk, unknown compressor).
    #[error("decode failed: {0}")]
    Decode(String),

    /// Requested gene name is not present in the expression matrix.
    #[error("gene not found: {0}")]
    GeneNotFound(String),

    /// Fewer than two coordinate sources exist; nothing can be plotted.
    #[error("no usable coordinate sources in this dataset")]
    NoCoordinateSource,

    /// Backend-specific store failure (S3/GCS config, object read).
    #[error("store error: {0}")]
    Store(String),

    /// HTTP transport failure other than a plain 404.
    #[error("http error: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("dataframe error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

impl DataError {
    /// True when the failure means "the thing does not exist" rather than
    /// "the thing exists but could not be read". Loaders use this to decide
    /// between degrading to defaults and reporting corruption.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DataError::NotFound(_))
    }
}
