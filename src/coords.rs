//! Embedding discovery and per-cell coordinate loading.
//!
//! A fixed candidate list of embedding names (configurable) is probed under
//! `obsm/`. Dataframe embeddings contribute one source per named column;
//! plain arrays contribute one source per dimension, up to the configured
//! cap. Axis loads never fail the session: a source that cannot be read
//! zero-fills and records an event.

use serde_json::Value;

use crate::array;
use crate::config::DataConfig;
use crate::error::{DataError, Result};
use crate::events::{EventQueue, SessionEvent};
use crate::store::ChunkStore;

/// Chunk keys `0.0, 0.1, ...` probed when no metadata declares the
/// dimension count. Past this many, the count is treated as unknown.
const DIM_PROBE_CAP: usize = 100;

/// One selectable plot axis: a named column of a dataframe embedding, or a
/// single dimension of a 2D embedding array.
#[derive(Clone, Debug, PartialEq)]
pub struct CoordinateSource {
    /// Display name, `<embedding>/<column>` or `<embedding>[<dim>]`.
    pub name: String,
    pub embedding: String,
    pub dim_index: usize,
    pub column_name: Option<String>,
}

impl CoordinateSource {
    /// Per-cell values for this source, exactly `n_cells` long. Reads by
    /// column name when the source has one, otherwise by dimension index.
    /// Length mismatches pad with zeros or truncate; read failures
    /// zero-fill the whole axis. Both record an event.
    pub fn load_values(
        &self,
        store: &dyn ChunkStore,
        axis: &str,
        n_cells: usize,
        events: &mut EventQueue,
    ) -> Vec<f64> {
        match self.read(store, n_cells) {
            Ok(mut values) => {
                if values.len() != n_cells {
                    events.push(SessionEvent::LengthAdjusted {
                        name: self.name.clone(),
                        expected: n_cells,
                        actual: values.len(),
                    });
                    values.resize(n_cells, 0.0);
                }
                values
            }
            Err(err) => {
                events.push(SessionEvent::AxisDegraded {
                    axis: axis.to_string(),
                    source: self.name.clone(),
                    reason: err.to_string(),
                });
                vec![0.0; n_cells]
            }
        }
    }

    fn read(&self, store: &dyn ChunkStore, n_cells: usize) -> Result<Vec<f64>> {
        if let Some(column) = &self.column_name {
            let path = format!("obsm/{}/{}", self.embedding, column);
            let handle = array::open_array(store, &path)?;
            return array::read_f64(store, &handle);
        }
        let base = format!("obsm/{}", self.embedding);
        match array::open_array(store, &base) {
            Ok(handle) if handle.meta.shape.len() >= 2 => {
                array::read_column_f64(store, &handle, self.dim_index)
            }
            Ok(handle) if self.dim_index == 0 => array::read_f64(store, &handle),
            Ok(_) => Err(DataError::Decode(format!(
                "{base}: 1D array has no dimension {}",
                self.dim_index
            ))),
            // Discovered without array metadata: assemble the column from
            // raw chunk files, assuming uncompressed little-endian f64.
            Err(err) if err.is_not_found() => {
                read_raw_column(store, &base, self.dim_index, n_cells)
            }
            Err(err) => Err(err),
        }
    }
}

/// Flat ordered list of coordinate sources, built once at open.
#[derive(Debug, Default)]
pub struct CoordinateCatalog {
    sources: Vec<CoordinateSource>,
}

impl CoordinateCatalog {
    /// Probes each candidate embedding name under `obsm/`. Probe and
    /// metadata errors skip the embedding rather than failing discovery;
    /// an embedding whose dimension count cannot be established records
    /// an event and contributes no sources.
    pub fn discover(store: &dyn ChunkStore, config: &DataConfig, events: &mut EventQueue) -> Self {
        let mut sources = Vec::new();
        for embedding in &config.embeddings {
            let base = format!("obsm/{embedding}");
            let attrs = array::read_attrs(store, &base).ok().flatten();

            if let Some(columns) = dataframe_columns(attrs.as_ref()) {
                for (dim_index, column) in columns.into_iter().enumerate() {
                    sources.push(CoordinateSource {
                        name: format!("{embedding}/{column}"),
                        embedding: embedding.clone(),
                        dim_index,
                        column_name: Some(column),
                    });
                }
                continue;
            }

            let dims = match embedding_dims(store, &base, attrs.as_ref()) {
                DimCount::Known(dims) => dims.min(config.max_embedding_dims),
                DimCount::Unknown => {
                    events.push(SessionEvent::EmbeddingDimsUnknown {
                        embedding: embedding.clone(),
                    });
                    continue;
                }
                DimCount::Absent => continue,
            };
            for dim_index in 0..dims {
                sources.push(CoordinateSource {
                    name: format!("{embedding}[{dim_index}]"),
                    embedding: embedding.clone(),
                    dim_index,
                    column_name: None,
                });
            }
        }
        Self { sources }
    }

    pub fn sources(&self) -> &[CoordinateSource] {
        &self.sources
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&CoordinateSource> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Startup x/y pair: a `global_x`/`global_y` column pair from one
    /// embedding, else an `x`/`y` pair, else the first two sources.
    pub fn default_axes(&self) -> Result<(&CoordinateSource, &CoordinateSource)> {
        if let Some(pair) = self.named_pair("global_x", "global_y") {
            return Ok(pair);
        }
        if let Some(pair) = self.named_pair("x", "y") {
            return Ok(pair);
        }
        if let [first, second, ..] = self.sources.as_slice() {
            return Ok((first, second));
        }
        Err(DataError::NoCoordinateSource)
    }

    /// First embedding (in discovery order) carrying both named columns.
    fn named_pair(&self, x: &str, y: &str) -> Option<(&CoordinateSource, &CoordinateSource)> {
        for source in &self.sources {
            if source.column_name.as_deref() != Some(x) {
                continue;
            }
            let matching_y = self
                .sources
                .iter()
                .find(|s| s.embedding == source.embedding && s.column_name.as_deref() == Some(y));
            if let Some(y_source) = matching_y {
                return Some((source, y_source));
            }
        }
        None
    }
}

enum DimCount {
    Known(usize),
    Unknown,
    Absent,
}

fn dataframe_columns(attrs: Option<&Value>) -> Option<Vec<String>> {
    let attrs = attrs?;
    if attrs.get("encoding-type").and_then(Value::as_str) != Some("dataframe") {
        return None;
    }
    let columns = attrs
        .get("column-order")
        .and_then(Value::as_array)
        .map(|cols| {
            cols.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some(columns)
}

/// Dimension count resolution order: array metadata shape, attribute shape,
/// then probing chunk keys until one is missing.
fn embedding_dims(store: &dyn ChunkStore, base: &str, attrs: Option<&Value>) -> DimCount {
    if let Ok(handle) = array::open_array(store, base) {
        return match handle.meta.shape.as_slice() {
            [_, dims, ..] => DimCount::Known(*dims),
            _ => DimCount::Known(1),
        };
    }
    if let Some(shape) = attrs
        .and_then(|a| a.get("shape"))
        .and_then(Value::as_array)
    {
        if let Some(dims) = shape.get(1).and_then(Value::as_u64) {
            return DimCount::Known(dims as usize);
        }
    }
    if attrs.is_none() {
        return DimCount::Absent;
    }
    let mut dims = 0;
    while dims < DIM_PROBE_CAP {
        let key = format!("{base}/0.{dims}");
        match store.get(&key).ok().flatten() {
            Some(_) => dims += 1,
            None => return DimCount::Known(dims),
        }
    }
    DimCount::Unknown
}

/// Column `dim` assembled from raw `<row>.<dim>` chunk files in chunk order.
/// Used when the embedding was discovered without array metadata.
fn read_raw_column(
    store: &dyn ChunkStore,
    base: &str,
    dim: usize,
    n_cells: usize,
) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    let mut row_chunk = 0;
    while out.len() < n_cells && row_chunk <= n_cells {
        let key = format!("{base}/{row_chunk}.{dim}");
        let Some(bytes) = store.get(&key)? else {
            break;
        };
        if bytes.len() % 8 != 0 {
            return Err(DataError::Decode(format!(
                "{key}: {} bytes is not a whole number of f64 values",
                bytes.len()
            )));
        }
        for chunk in bytes.chunks_exact(8) {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            out.push(f64::from_le_bytes(buf));
        }
        row_chunk += 1;
    }
    if out.is_empty() {
        return Err(DataError::NotFound(format!("{base}/0.{dim}")));
    }
    Ok(out)
}
