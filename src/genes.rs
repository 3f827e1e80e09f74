//! Per-gene expression slicing over the CSC matrix.
//!
//! The matrix at `X` stores `indptr`, `indices`, and `data` column-wise, one
//! column per gene. A gene query reads `indptr[g]..indptr[g+1]`, then fetches
//! only the chunks of `indices`/`data` covering that range and scatters the
//! non-zeros into a dense per-cell vector. Cost scales with the gene's
//! non-zero count, never with the matrix.

use std::collections::HashMap;

use serde_json::Value;

use crate::array::{self, ArrayHandle};
use crate::error::{DataError, Result};
use crate::store::ChunkStore;

/// Opened expression matrix: gene names eager, index structures lazy.
#[derive(Debug)]
pub struct GeneMatrix {
    rows: usize,
    cols: usize,
    gene_names: Vec<String>,
    name_index: HashMap<String, usize>,
    /// Loaded on the first expression query, then reused for every gene.
    csc: Option<CscIndex>,
}

#[derive(Debug)]
struct CscIndex {
    indptr: Vec<i64>,
    indices: ArrayHandle,
    data: ArrayHandle,
}

impl GeneMatrix {
    /// Reads `X/.zattrs` and the gene-name index under `var`. Fails
    /// `NotFound` when the dataset has no matrix; callers treat that as
    /// "expression unavailable", not as a broken dataset.
    pub fn open(store: &dyn ChunkStore) -> Result<Self> {
        let attrs = array::read_attrs(store, "X")?
            .ok_or_else(|| DataError::NotFound("X/.zattrs".into()))?;
        let encoding = attrs
            .get("encoding-type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if encoding != "csc_matrix" {
            return Err(DataError::Decode(format!(
                "X: unsupported matrix encoding {encoding:?}, expected csc_matrix"
            )));
        }
        let shape: Vec<usize> = attrs
            .get("shape")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_u64).map(|v| v as usize).collect())
            .unwrap_or_default();
        let [rows, cols] = shape.as_slice() else {
            return Err(DataError::Decode("X: missing or malformed shape".into()));
        };

        let index_column = array::read_attrs(store, "var")?
            .as_ref()
            .and_then(|a| a.get("_index").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| "_index".to_string());
        let names_handle = array::open_array(store, &format!("var/{index_column}"))?;
        let gene_names = array::read_strings(store, &names_handle)?;
        let name_index = gene_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        Ok(Self {
            rows: *rows,
            cols: *cols,
            gene_names,
            name_index,
            csc: None,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn gene_names(&self) -> &[String] {
        &self.gene_names
    }

    pub fn contains(&self, gene: &str) -> bool {
        self.name_index.contains_key(gene)
    }

    /// Case-insensitive substring search over gene names, in matrix order.
    pub fn search(&self, query: &str, limit: usize) -> Vec<&str> {
        let needle = query.to_lowercase();
        self.gene_names
            .iter()
            .filter(|name| name.to_lowercase().contains(&needle))
            .take(limit)
            .map(String::as_str)
            .collect()
    }

    /// Dense expression vector for one gene, `rows` long. Exact-name lookup;
    /// an unknown gene is `GeneNotFound`.
    pub fn expression(&mut self, store: &dyn ChunkStore, gene: &str) -> Result<Vec<f64>> {
        let g = *self
            .name_index
            .get(gene)
            .ok_or_else(|| DataError::GeneNotFound(gene.to_string()))?;
        let rows = self.rows;
        let csc = self.ensure_csc(store)?;

        let (Some(&start), Some(&end)) = (csc.indptr.get(g), csc.indptr.get(g + 1)) else {
            return Err(DataError::Decode(format!(
                "X/indptr: {} entries cannot index column {g}",
                csc.indptr.len()
            )));
        };
        if start < 0 || end < start {
            return Err(DataError::Decode(format!(
                "X/indptr: bad column range [{start}, {end}) for column {g}"
            )));
        }
        let (start, end) = (start as usize, end as usize);

        let mut out = vec![0.0; rows];
        if start == end {
            return Ok(out);
        }
        let row_indices = array::read_range_integers(store, &csc.indices, start, end)?;
        let values = array::read_range_f64(store, &csc.data, start, end)?;
        if row_indices.len() != values.len() {
            return Err(DataError::Decode(format!(
                "X: indices/data ranges disagree ({} vs {}) for column {g}",
                row_indices.len(),
                values.len()
            )));
        }
        for (row, value) in row_indices.into_iter().zip(values) {
            let row = usize::try_from(row).map_err(|_| {
                DataError::Decode(format!("X/indices: negative row index {row}"))
            })?;
            if row >= rows {
                return Err(DataError::Decode(format!(
                    "X/indices: row {row} out of range ({rows} rows)"
                )));
            }
            out[row] = value;
        }
        Ok(out)
    }

    fn ensure_csc(&mut self, store: &dyn ChunkStore) -> Result<&CscIndex> {
        if self.csc.is_none() {
            let indptr_handle = array::open_array(store, "X/indptr")?;
            let indptr = array::read_integers(store, &indptr_handle)?;
            let indices = array::open_array(store, "X/indices")?;
            let data = array::open_array(store, "X/data")?;
            self.csc = Some(CscIndex {
                indptr,
                indices,
                data,
            });
        }
        // Guarded by the fill above.
        Ok(self.csc.as_ref().unwrap())
    }
}

/// The currently selected gene's dense vector plus its color-scale bounds.
/// Clip bounds start at the actual value range and move under user control
/// (winsorized color scaling); replaced wholesale when the gene changes.
#[derive(Clone, Debug)]
pub struct GeneExpression {
    pub gene: String,
    pub values: Vec<f64>,
    pub actual_min: f64,
    pub actual_max: f64,
    pub clip_min: f64,
    pub clip_max: f64,
}

impl GeneExpression {
    pub fn new(gene: String, values: Vec<f64>) -> Self {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in &values {
            if !v.is_nan() {
                min = min.min(v);
                max = max.max(v);
            }
        }
        if min > max {
            min = 0.0;
            max = 0.0;
        }
        Self {
            gene,
            values,
            actual_min: min,
            actual_max: max,
            clip_min: min,
            clip_max: max,
        }
    }

    pub fn set_clip(&mut self, min: f64, max: f64) {
        self.clip_min = min.min(max);
        self.clip_max = min.max(max);
    }

    pub fn reset_clip(&mut self) {
        self.clip_min = self.actual_min;
        self.clip_max = self.actual_max;
    }
}
