//! Column discovery: the cell-table manifest and per-column encoding probes.

use serde_json::Value;

use crate::array;
use crate::config::ViewerConfig;
use crate::error::Result;
use crate::store::ChunkStore;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

/// Immutable description of one cell attribute, built once at discovery.
#[derive(Clone, Debug)]
pub struct ColumnDescriptor {
    pub name: String,
    pub kind: ColumnKind,
    /// Declared `encoding-type` of the column node (`array`, `categorical`);
    /// probes that fail resolve to `array`.
    pub encoding: String,
    /// Store node the column loads from.
    pub source_path: String,
}

#[derive(Debug, Default)]
pub struct ColumnRegistry {
    columns: Vec<ColumnDescriptor>,
}

impl ColumnRegistry {
    /// Reads the `obs` manifest and probes each listed column's encoding.
    ///
    /// The manifest's `column-order` fixes presentation order. A column whose
    /// encoding probe is missing or unreadable is registered as numeric
    /// rather than dropped, so a sloppy writer cannot hide attributes.
    /// Duplicate names keep the last occurrence. A dataset without an `obs`
    /// manifest yields an empty registry.
    pub fn discover(store: &dyn ChunkStore, config: &ViewerConfig) -> Result<Self> {
        let Some(attrs) = array::read_attrs(store, "obs")? else {
            return Ok(Self::default());
        };
        let names: Vec<String> = attrs
            .get("column-order")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mut columns: Vec<ColumnDescriptor> = Vec::with_capacity(names.len());
        for name in names {
            let source_path = format!("obs/{name}");
            let encoding = match array::read_attrs(store, &source_path) {
                Ok(Some(col_attrs)) => col_attrs
                    .get("encoding-type")
                    .and_then(Value::as_str)
                    .unwrap_or("array")
                    .to_string(),
                Ok(None) | Err(_) => "array".to_string(),
            };
            let kind = if config.data.known_numeric.iter().any(|k| k == &name) {
                ColumnKind::Numeric
            } else if encoding == "categorical" {
                ColumnKind::Categorical
            } else {
                ColumnKind::Numeric
            };
            if let Some(pos) = columns.iter().position(|c| c.name == name) {
                columns.remove(pos);
            }
            columns.push(ColumnDescriptor {
                name,
                kind,
                encoding,
                source_path,
            });
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn descriptor(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
