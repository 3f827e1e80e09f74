//! Chunked-array accessor: metadata documents, chunk assembly, dtype decoding.
//!
//! Arrays live under a node path in the store: `<path>/.zarray` describes
//! shape, chunk shape, dtype, and compressor; chunk payloads sit at
//! `<path>/<i>` (1D) or `<path>/<i>.<j>` (2D, row-major grid). Edge chunks
//! may be padded to the full chunk shape or stored short; both decode to the
//! array's logical extent. A chunk key that is absent from the store reads as
//! the array's fill value.
//!
//! All reads take `&dyn ChunkStore` and share no mutable state, so callers
//! may issue them in any order.

use std::io::Read;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{DataError, Result};
use crate::store::ChunkStore;

/// Parsed `.zarray` document.
#[derive(Debug, Clone, Deserialize)]
pub struct ArrayMeta {
    pub shape: Vec<usize>,
    pub chunks: Vec<usize>,
    pub dtype: String,
    #[serde(default)]
    pub compressor: Option<Compressor>,
    #[serde(default)]
    pub fill_value: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Compressor {
    pub id: String,
}

/// An opened array: node path plus parsed metadata. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ArrayHandle {
    pub path: String,
    pub meta: ArrayMeta,
}

impl ArrayHandle {
    /// Logical element count along the first axis.
    pub fn len(&self) -> usize {
        self.meta.shape.first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn chunk_len(&self) -> usize {
        self.meta.chunks.first().copied().unwrap_or(1).max(1)
    }

    /// Numeric fill for absent chunks. String arrays fill with `""` instead.
    fn fill_f64(&self) -> f64 {
        match self.meta.fill_value.as_ref() {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) if s == "NaN" => f64::NAN,
            _ => 0.0,
        }
    }
}

/// Reads and parses `<path>/.zarray`. A missing document is `NotFound`: the
/// caller asked for an array that does not exist at this node.
pub fn open_array(store: &dyn ChunkStore, path: &str) -> Result<ArrayHandle> {
    let key = format!("{path}/.zarray");
    let bytes = store
        .get(&key)?
        .ok_or_else(|| DataError::NotFound(key.clone()))?;
    let meta: ArrayMeta = serde_json::from_slice(&bytes)?;
    if meta.shape.is_empty() || meta.chunks.is_empty() {
        return Err(DataError::Decode(format!("{key}: empty shape or chunks")));
    }
    Ok(ArrayHandle {
        path: path.to_string(),
        meta,
    })
}

/// Reads `<node>/.zattrs` as a JSON document, `None` when absent.
pub fn read_attrs(store: &dyn ChunkStore, node: &str) -> Result<Option<Value>> {
    let key = format!("{node}/.zattrs");
    match store.get(&key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Reads a full 1D numeric array as `f64`.
pub fn read_f64(store: &dyn ChunkStore, handle: &ArrayHandle) -> Result<Vec<f64>> {
    read_range_f64(store, handle, 0, handle.len())
}

/// Reads elements `[start, end)` of a 1D numeric array, fetching only the
/// chunks that overlap the range. `end` is clamped to the array length.
pub fn read_range_f64(
    store: &dyn ChunkStore,
    handle: &ArrayHandle,
    start: usize,
    end: usize,
) -> Result<Vec<f64>> {
    let end = end.min(handle.len());
    if start >= end {
        return Ok(Vec::new());
    }
    let chunk_len = handle.chunk_len();
    let fill = handle.fill_f64();
    let mut out = Vec::with_capacity(end - start);
    for ci in start / chunk_len..=(end - 1) / chunk_len {
        let chunk_start = ci * chunk_len;
        let lo = start.max(chunk_start) - chunk_start;
        let hi = end.min(chunk_start + chunk_len) - chunk_start;
        match fetch_chunk(store, handle, &format!("{ci}"))? {
            Some(bytes) => {
                let values = decode_f64(&handle.meta.dtype, &bytes, &handle.path)?;
                for i in lo..hi {
                    out.push(values.get(i).copied().unwrap_or(fill));
                }
            }
            None => out.extend(std::iter::repeat(fill).take(hi - lo)),
        }
    }
    Ok(out)
}

/// Reads a full 1D integer array (chunk index arrays, categorical codes).
pub fn read_integers(store: &dyn ChunkStore, handle: &ArrayHandle) -> Result<Vec<i64>> {
    read_range_integers(store, handle, 0, handle.len())
}

/// Integer counterpart of [`read_range_f64`]. Fails `Decode` on float dtypes
/// so index arrays cannot silently round.
pub fn read_range_integers(
    store: &dyn ChunkStore,
    handle: &ArrayHandle,
    start: usize,
    end: usize,
) -> Result<Vec<i64>> {
    let end = end.min(handle.len());
    if start >= end {
        return Ok(Vec::new());
    }
    let chunk_len = handle.chunk_len();
    let fill = handle.fill_f64() as i64;
    let mut out = Vec::with_capacity(end - start);
    for ci in start / chunk_len..=(end - 1) / chunk_len {
        let chunk_start = ci * chunk_len;
        let lo = start.max(chunk_start) - chunk_start;
        let hi = end.min(chunk_start + chunk_len) - chunk_start;
        match fetch_chunk(store, handle, &format!("{ci}"))? {
            Some(bytes) => {
                let values = decode_integers(&handle.meta.dtype, &bytes, &handle.path)?;
                for i in lo..hi {
                    out.push(values.get(i).copied().unwrap_or(fill));
                }
            }
            None => out.extend(std::iter::repeat(fill).take(hi - lo)),
        }
    }
    Ok(out)
}

/// Reads a full 1D string array (`|O` dtype, JSON-encoded chunks).
pub fn read_strings(store: &dyn ChunkStore, handle: &ArrayHandle) -> Result<Vec<String>> {
    if handle.meta.dtype != "|O" {
        return Err(DataError::Decode(format!(
            "{}: expected string dtype |O, found {}",
            handle.path, handle.meta.dtype
        )));
    }
    let n = handle.len();
    let chunk_len = handle.chunk_len();
    let mut out = Vec::with_capacity(n);
    let mut ci = 0;
    while out.len() < n {
        let logical = chunk_len.min(n - out.len());
        match fetch_chunk(store, handle, &format!("{ci}"))? {
            Some(bytes) => {
                let values: Vec<String> = serde_json::from_slice(&bytes).map_err(|e| {
                    DataError::Decode(format!("{}/{ci}: bad string chunk: {e}", handle.path))
                })?;
                for i in 0..logical {
                    out.push(values.get(i).cloned().unwrap_or_default());
                }
            }
            None => out.extend(std::iter::repeat(String::new()).take(logical)),
        }
        ci += 1;
    }
    Ok(out)
}

/// Extracts column `col` of a 2D numeric array without reading the full
/// matrix: only the chunk column containing `col` is fetched, row chunk by
/// row chunk.
pub fn read_column_f64(
    store: &dyn ChunkStore,
    handle: &ArrayHandle,
    col: usize,
) -> Result<Vec<f64>> {
    if handle.meta.shape.len() != 2 || handle.meta.chunks.len() != 2 {
        return Err(DataError::Decode(format!(
            "{}: expected a 2D array, shape {:?}",
            handle.path, handle.meta.shape
        )));
    }
    let (rows, cols) = (handle.meta.shape[0], handle.meta.shape[1]);
    let (chunk_rows, chunk_cols) = (handle.meta.chunks[0].max(1), handle.meta.chunks[1].max(1));
    if col >= cols {
        return Err(DataError::Decode(format!(
            "{}: column {col} out of range (width {cols})",
            handle.path
        )));
    }
    let cj = col / chunk_cols;
    let local_col = col % chunk_cols;
    let fill = handle.fill_f64();
    let mut out = Vec::with_capacity(rows);
    let row_chunks = rows.div_ceil(chunk_rows);
    for ci in 0..row_chunks {
        let logical_rows = chunk_rows.min(rows - ci * chunk_rows);
        match fetch_chunk(store, handle, &format!("{ci}.{cj}"))? {
            Some(bytes) => {
                let values = decode_f64(&handle.meta.dtype, &bytes, &handle.path)?;
                // Within a chunk the layout is row-major over the full
                // (padded) chunk width, so the column stride is chunk_cols.
                for r in 0..logical_rows {
                    out.push(values.get(r * chunk_cols + local_col).copied().unwrap_or(fill));
                }
            }
            None => out.extend(std::iter::repeat(fill).take(logical_rows)),
        }
    }
    Ok(out)
}

/// Decodes a categorical node: `<base>/codes` (integers, −1 = missing) mapped
/// through `<base>/categories` (strings). Missing codes become empty strings;
/// a code at or past the category count is corruption and fails `Decode`.
pub fn read_categorical(store: &dyn ChunkStore, base: &str) -> Result<Vec<String>> {
    let codes_handle = open_array(store, &format!("{base}/codes"))?;
    let cats_handle = open_array(store, &format!("{base}/categories"))?;
    let codes = read_integers(store, &codes_handle)?;
    let categories = read_strings(store, &cats_handle)?;
    let mut out = Vec::with_capacity(codes.len());
    for code in codes {
        if code < 0 {
            out.push(String::new());
        } else if let Some(cat) = categories.get(code as usize) {
            out.push(cat.clone());
        } else {
            return Err(DataError::Decode(format!(
                "{base}: code {code} out of range ({} categories)",
                categories.len()
            )));
        }
    }
    Ok(out)
}

fn fetch_chunk(
    store: &dyn ChunkStore,
    handle: &ArrayHandle,
    chunk_key: &str,
) -> Result<Option<Vec<u8>>> {
    let key = format!("{}/{chunk_key}", handle.path);
    match store.get(&key)? {
        Some(bytes) => Ok(Some(decompress(
            bytes,
            handle.meta.compressor.as_ref(),
            &key,
        )?)),
        None => Ok(None),
    }
}

fn decompress(bytes: Vec<u8>, compressor: Option<&Compressor>, key: &str) -> Result<Vec<u8>> {
    let Some(compressor) = compressor else {
        return Ok(bytes);
    };
    match compressor.id.as_str() {
        "zlib" => {
            let mut out = Vec::new();
            flate2::read::ZlibDecoder::new(&bytes[..])
                .read_to_end(&mut out)
                .map_err(|e| DataError::Decode(format!("{key}: zlib inflate failed: {e}")))?;
            Ok(out)
        }
        "gzip" => {
            let mut out = Vec::new();
            flate2::read::GzDecoder::new(&bytes[..])
                .read_to_end(&mut out)
                .map_err(|e| DataError::Decode(format!("{key}: gzip inflate failed: {e}")))?;
            Ok(out)
        }
        "zstd" => zstd::decode_all(&bytes[..])
            .map_err(|e| DataError::Decode(format!("{key}: zstd decode failed: {e}"))),
        other => Err(DataError::Decode(format!(
            "{key}: unsupported compressor {other:?}"
        ))),
    }
}

fn decode_f64(dtype: &str, bytes: &[u8], path: &str) -> Result<Vec<f64>> {
    let values = match dtype {
        "<f8" => le_chunks(bytes, 8, path)?
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect(),
        "<f4" => le_chunks(bytes, 4, path)?
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect(),
        _ => decode_integers(dtype, bytes, path)?
            .into_iter()
            .map(|v| v as f64)
            .collect(),
    };
    Ok(values)
}

fn decode_integers(dtype: &str, bytes: &[u8], path: &str) -> Result<Vec<i64>> {
    let values: Vec<i64> = match dtype {
        "<i8" => le_chunks(bytes, 8, path)?
            .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect(),
        "<i4" => le_chunks(bytes, 4, path)?
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64)
            .collect(),
        "<i2" => le_chunks(bytes, 2, path)?
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as i64)
            .collect(),
        "<i1" | "|i1" => bytes.iter().map(|&b| b as i8 as i64).collect(),
        "<u4" => le_chunks(bytes, 4, path)?
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64)
            .collect(),
        "|u1" => bytes.iter().map(|&b| b as i64).collect(),
        "<u8" => {
            let mut out = Vec::with_capacity(bytes.len() / 8);
            for b in le_chunks(bytes, 8, path)? {
                let v = u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
                out.push(i64::try_from(v).map_err(|_| {
                    DataError::Decode(format!("{path}: u64 value {v} exceeds supported range"))
                })?);
            }
            out
        }
        other => {
            return Err(DataError::Decode(format!(
                "{path}: unsupported dtype {other:?}"
            )))
        }
    };
    Ok(values)
}

fn le_chunks<'a>(
    bytes: &'a [u8],
    item: usize,
    path: &str,
) -> Result<std::slice::ChunksExact<'a, u8>> {
    if bytes.len() % item != 0 {
        return Err(DataError::Decode(format!(
            "{path}: chunk of {} bytes is not a multiple of item size {item}",
            bytes.len()
        )));
    }
    Ok(bytes.chunks_exact(item))
}
