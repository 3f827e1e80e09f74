//! In-memory store fixtures shared by the unit tests.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::Result;
use crate::store::ChunkStore;

pub(crate) struct MemStore {
    entries: HashMap<String, Vec<u8>>,
    hits: RefCell<Vec<String>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            hits: RefCell::new(Vec::new()),
        }
    }

    pub fn put(&mut self, key: &str, bytes: Vec<u8>) {
        self.entries.insert(key.to_string(), bytes);
    }

    pub fn put_json(&mut self, key: &str, json: &str) {
        self.put(key, json.as_bytes().to_vec());
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Number of `get` calls whose key starts with `prefix`.
    pub fn fetch_count(&self, prefix: &str) -> usize {
        self.hits
            .borrow()
            .iter()
            .filter(|k| k.starts_with(prefix))
            .count()
    }

    /// Uncompressed `<f8` 1D array with the given chunk length; edge chunk
    /// padded with zeros the way writers pad.
    pub fn put_f64_array(&mut self, path: &str, values: &[f64], chunk: usize) {
        self.put_json(
            &format!("{path}/.zarray"),
            &format!(
                r#"{{"shape":[{}],"chunks":[{}],"dtype":"<f8","compressor":null,"fill_value":0}}"#,
                values.len(),
                chunk
            ),
        );
        for (ci, vals) in values.chunks(chunk).enumerate() {
            let mut padded = vals.to_vec();
            padded.resize(chunk, 0.0);
            let bytes: Vec<u8> = padded.iter().flat_map(|v| v.to_le_bytes()).collect();
            self.put(&format!("{path}/{ci}"), bytes);
        }
    }

    /// Uncompressed `<i4` 1D array.
    pub fn put_i32_array(&mut self, path: &str, values: &[i32], chunk: usize) {
        self.put_json(
            &format!("{path}/.zarray"),
            &format!(
                r#"{{"shape":[{}],"chunks":[{}],"dtype":"<i4","compressor":null,"fill_value":0}}"#,
                values.len(),
                chunk
            ),
        );
        for (ci, vals) in values.chunks(chunk).enumerate() {
            let mut padded = vals.to_vec();
            padded.resize(chunk, 0);
            let bytes: Vec<u8> = padded.iter().flat_map(|v| v.to_le_bytes()).collect();
            self.put(&format!("{path}/{ci}"), bytes);
        }
    }

    /// `|O` string array stored as JSON chunks.
    pub fn put_string_array(&mut self, path: &str, values: &[&str], chunk: usize) {
        self.put_json(
            &format!("{path}/.zarray"),
            &format!(
                r#"{{"shape":[{}],"chunks":[{}],"dtype":"|O","compressor":null,"fill_value":""}}"#,
                values.len(),
                chunk
            ),
        );
        for (ci, vals) in values.chunks(chunk).enumerate() {
            let json = serde_json::to_vec(vals).unwrap();
            self.put(&format!("{path}/{ci}"), json);
        }
    }

    /// Categorical node: `|i1` codes in one chunk plus string categories.
    pub fn put_categorical(&mut self, base: &str, codes: &[i8], categories: &[&str]) {
        self.put_json(
            &format!("{base}/.zattrs"),
            r#"{"encoding-type":"categorical"}"#,
        );
        self.put_json(
            &format!("{base}/codes/.zarray"),
            &format!(
                r#"{{"shape":[{}],"chunks":[{}],"dtype":"|i1","compressor":null,"fill_value":-1}}"#,
                codes.len(),
                codes.len().max(1)
            ),
        );
        self.put(
            &format!("{base}/codes/0"),
            codes.iter().map(|&c| c as u8).collect(),
        );
        self.put_string_array(&format!("{base}/categories"), categories, categories.len().max(1));
    }

    /// `obs` manifest plus an `_index` string array of `cell<i>` labels,
    /// which is what row-count resolution reads.
    pub fn put_obs(&mut self, n_cells: usize, column_order: &[&str]) {
        let cols = serde_json::to_string(column_order).unwrap();
        self.put_json(
            "obs/.zattrs",
            &format!(
                r#"{{"encoding-type":"dataframe","column-order":{cols},"_index":"_index"}}"#
            ),
        );
        let labels: Vec<String> = (0..n_cells).map(|i| format!("cell{i}")).collect();
        let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        self.put_string_array("obs/_index", &refs, n_cells.max(1));
    }

    /// CSC expression matrix under `X` plus gene names under `var/_index`.
    /// `genes` maps each name to its (row, value) non-zeros. Index arrays are
    /// chunked small so ranged reads cross chunk boundaries in tests.
    pub fn put_csc(&mut self, n_cells: usize, genes: &[(&str, Vec<(i32, f64)>)]) {
        let names: Vec<&str> = genes.iter().map(|(name, _)| *name).collect();
        self.put_json(
            "var/.zattrs",
            r#"{"encoding-type":"dataframe","column-order":[],"_index":"_index"}"#,
        );
        self.put_string_array("var/_index", &names, names.len().max(1));

        let mut indptr: Vec<i32> = vec![0];
        let mut indices: Vec<i32> = Vec::new();
        let mut data: Vec<f64> = Vec::new();
        for (_, nz) in genes {
            for (row, value) in nz {
                indices.push(*row);
                data.push(*value);
            }
            indptr.push(indices.len() as i32);
        }
        self.put_json(
            "X/.zattrs",
            &format!(
                r#"{{"encoding-type":"csc_matrix","shape":[{n_cells},{}]}}"#,
                genes.len()
            ),
        );
        self.put_i32_array("X/indptr", &indptr, indptr.len().max(1));
        self.put_i32_array("X/indices", &indices, 4);
        self.put_f64_array("X/data", &data, 4);
    }

    /// Dataframe-style embedding: named 1D columns under `obsm/<base>`.
    pub fn put_obsm_dataframe(&mut self, base: &str, columns: &[(&str, &[f64])]) {
        let order: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
        let cols = serde_json::to_string(&order).unwrap();
        self.put_json(
            &format!("obsm/{base}/.zattrs"),
            &format!(r#"{{"encoding-type":"dataframe","column-order":{cols}}}"#),
        );
        for (name, values) in columns {
            self.put_f64_array(&format!("obsm/{base}/{name}"), values, values.len().max(1));
        }
    }

    /// Plain 2D `[rows, dims]` embedding array, row-major values.
    pub fn put_obsm_2d(&mut self, base: &str, rows: usize, dims: usize, values: &[f64]) {
        assert_eq!(values.len(), rows * dims);
        self.put_json(
            &format!("obsm/{base}/.zarray"),
            &format!(
                r#"{{"shape":[{rows},{dims}],"chunks":[{rows},{dims}],"dtype":"<f8","compressor":null,"fill_value":0}}"#
            ),
        );
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.put(&format!("obsm/{base}/0.0"), bytes);
    }
}

impl ChunkStore for MemStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.hits.borrow_mut().push(key.to_string());
        Ok(self.entries.get(key).cloned())
    }

    fn location(&self) -> String {
        "mem://".into()
    }
}
