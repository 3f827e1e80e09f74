use std::fs;
use std::io::Write;
use std::path::Path;

use flate2::write::ZlibEncoder;
use flate2::Compression;

pub fn put(root: &Path, key: &str, bytes: &[u8]) {
    let path = root.join(key);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
}

pub fn put_json(root: &Path, key: &str, json: &str) {
    put(root, key, json.as_bytes());
}

fn zlib(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// `<f8` array, zero-padded edge chunk, optionally zlib-compressed.
pub fn f64_array(root: &Path, path: &str, values: &[f64], chunk: usize, compressed: bool) {
    let compressor = if compressed {
        r#"{"id":"zlib"}"#
    } else {
        "null"
    };
    put_json(
        root,
        &format!("{path}/.zarray"),
        &format!(
            r#"{{"shape":[{}],"chunks":[{}],"dtype":"<f8","compressor":{compressor},"fill_value":0}}"#,
            values.len(),
            chunk
        ),
    );
    for (ci, vals) in values.chunks(chunk).enumerate() {
        let mut padded = vals.to_vec();
        padded.resize(chunk, 0.0);
        let bytes: Vec<u8> = padded.iter().flat_map(|v| v.to_le_bytes()).collect();
        let bytes = if compressed { zlib(&bytes) } else { bytes };
        put(root, &format!("{path}/{ci}"), &bytes);
    }
}

/// `<i4` array in one chunk.
pub fn i32_array(root: &Path, path: &str, values: &[i32]) {
    put_json(
        root,
        &format!("{path}/.zarray"),
        &format!(
            r#"{{"shape":[{}],"chunks":[{}],"dtype":"<i4","compressor":null,"fill_value":0}}"#,
            values.len(),
            values.len().max(1)
        ),
    );
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    put(root, &format!("{path}/0"), &bytes);
}

/// `|O` string array stored as JSON chunks.
pub fn string_array(root: &Path, path: &str, values: &[&str], chunk: usize) {
    put_json(
        root,
        &format!("{path}/.zarray"),
        &format!(
            r#"{{"shape":[{}],"chunks":[{}],"dtype":"|O","compressor":null,"fill_value":""}}"#,
            values.len(),
            chunk
        ),
    );
    for (ci, vals) in values.chunks(chunk).enumerate() {
        put(root, &format!("{path}/{ci}"), &serde_json::to_vec(vals).unwrap());
    }
}

pub fn categorical(root: &Path, base: &str, codes: &[i8], categories: &[&str]) {
    put_json(
        root,
        &format!("{base}/.zattrs"),
        r#"{"encoding-type":"categorical"}"#,
    );
    put_json(
        root,
        &format!("{base}/codes/.zarray"),
        &format!(
            r#"{{"shape":[{}],"chunks":[{}],"dtype":"|i1","compressor":null,"fill_value":-1}}"#,
            codes.len(),
            codes.len().max(1)
        ),
    );
    let bytes: Vec<u8> = codes.iter().map(|&c| c as u8).collect();
    put(root, &format!("{base}/codes/0"), &bytes);
    string_array(
        root,
        &format!("{base}/categories"),
        categories,
        categories.len().max(1),
    );
}

/// Row-major 2D `[rows, dims]` embedding in a single chunk.
pub fn obsm_2d(root: &Path, base: &str, rows: usize, dims: usize, values: &[f64]) {
    assert_eq!(values.len(), rows * dims);
    put_json(
        root,
        &format!("obsm/{base}/.zarray"),
        &format!(
            r#"{{"shape":[{rows},{dims}],"chunks":[{rows},{dims}],"dtype":"<f8","compressor":null,"fill_value":0}}"#
        ),
    );
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    put(root, &format!("obsm/{base}/0.0"), &bytes);
}

/// Complete 8-cell dataset: two obs columns (one zlib-compressed and
/// chunked), a named spatial embedding, a plain umap embedding, and a
/// three-gene CSC matrix.
pub fn write_dataset(root: &Path) {
    put_json(
        root,
        "obs/.zattrs",
        r#"{"encoding-type":"dataframe","column-order":["volume","cell_type"],"_index":"_index"}"#,
    );
    let labels: Vec<String> = (0..8).map(|i| format!("cell{i}")).collect();
    let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
    string_array(root, "obs/_index", &refs, 8);

    f64_array(
        root,
        "obs/volume",
        &[0.5, 1.5, 2.5, 3.5, 4.5, 5.5, 6.5, 7.5],
        3,
        true,
    );
    categorical(
        root,
        "obs/cell_type",
        &[0, 1, 0, -1, 2, 1, 0, 2],
        &["Astro", "Neuron", "Glia"],
    );

    put_json(
        root,
        "obsm/Global_Spatial/.zattrs",
        r#"{"encoding-type":"dataframe","column-order":["global_x","global_y"]}"#,
    );
    f64_array(
        root,
        "obsm/Global_Spatial/global_x",
        &[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0],
        8,
        false,
    );
    f64_array(
        root,
        "obsm/Global_Spatial/global_y",
        &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
        8,
        false,
    );
    let umap: Vec<f64> = (0..16).map(f64::from).collect();
    obsm_2d(root, "X_umap", 8, 2, &umap);

    // Genes: Gad1 {0: 1.0, 5: 2.0}, Slc17a7 {3: 1.5, 7: 2.0}, Pvalb empty.
    put_json(
        root,
        "var/.zattrs",
        r#"{"encoding-type":"dataframe","column-order":[],"_index":"_index"}"#,
    );
    string_array(root, "var/_index", &["Gad1", "Slc17a7", "Pvalb"], 3);
    put_json(
        root,
        "X/.zattrs",
        r#"{"encoding-type":"csc_matrix","shape":[8,3]}"#,
    );
    i32_array(root, "X/indptr", &[0, 2, 4, 4]);
    i32_array(root, "X/indices", &[0, 5, 3, 7]);
    f64_array(root, "X/data", &[1.0, 2.0, 1.5, 2.0], 4, false);
}
