use std::path::Path;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use polars::prelude::DataFrame;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;

pub mod array;
pub mod config;
pub mod coords;
pub mod error;
pub mod events;
pub mod filter;
pub mod genes;
pub mod report;
pub mod sample;
pub mod schema;
pub mod source;
pub mod store;
pub mod table;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{ConfigManager, ViewerConfig};
pub use coords::{CoordinateCatalog, CoordinateSource};
pub use error::DataError;
pub use events::SessionEvent;
pub use filter::{FilterPredicate, PredicateKind};
pub use genes::{GeneExpression, GeneMatrix};
pub use schema::{ColumnDescriptor, ColumnKind, ColumnRegistry};
pub use source::DatasetLocation;
pub use store::{open_store, ChunkStore};
pub use table::{LoadProgress, NumericSummary, RowTable, CELL_ID_COLUMN};

use events::EventQueue;

/// Application name used for the config directory and other app-specific paths
pub const APP_NAME: &str = "cellvista";

/// Currently bound plot axes, by coordinate-source name. A `None` z means
/// every z value is zero.
#[derive(Clone, Debug)]
pub struct AxisSelection {
    pub x: String,
    pub y: String,
    pub z: Option<String>,
}

/// One opened dataset and everything the render layer reads from it: the
/// row table, column registry, coordinate catalog, gene matrix, filter
/// predicates, and the visible/sampled index sets.
///
/// All mutation goes through `&mut self`, so loads for the same column can
/// never overlap and no locking is needed. Loads degrade instead of failing:
/// a column or axis that cannot be read is filled with defaults and the
/// reason lands in the event queue (see [`DatasetSession::take_events`]).
pub struct DatasetSession {
    store: Box<dyn ChunkStore>,
    config: ViewerConfig,
    n_cells: usize,
    registry: ColumnRegistry,
    table: RowTable,
    catalog: CoordinateCatalog,
    matrix: Option<GeneMatrix>,
    expression: Option<GeneExpression>,
    axes: AxisSelection,
    predicates: Vec<FilterPredicate>,
    next_predicate_id: u64,
    visible: Vec<u32>,
    sampled: Vec<u32>,
    sample_seed: Option<u64>,
    events: EventQueue,
}

impl std::fmt::Debug for DatasetSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetSession").finish_non_exhaustive()
    }
}

impl DatasetSession {
    /// Opens a dataset by URL or filesystem path, picking the store backend
    /// from the scheme (`s3://`, `gs://`, `http(s)://`, else local).
    pub fn open_url(url: &str, config: ViewerConfig) -> Result<Self> {
        let store = store::open_store(Path::new(url), &config)?;
        Self::open(store, config)
    }

    /// Opens a dataset over an already-built store: resolves the cell count,
    /// discovers columns, coordinates, and the gene matrix, then binds the
    /// default axes. Fails when the root is not a dataset or no plottable
    /// coordinates exist; everything else degrades into events.
    pub fn open(store: Box<dyn ChunkStore>, config: ViewerConfig) -> Result<Self> {
        let mut events = EventQueue::default();
        let n_cells = resolve_cell_count(store.as_ref()).map_err(|e| {
            eyre!(
                "{} does not look like a dataset root: {e}",
                store.location()
            )
        })?;
        let registry = ColumnRegistry::discover(store.as_ref(), &config)?;
        let matrix = match GeneMatrix::open(store.as_ref()) {
            Ok(matrix) => Some(matrix),
            Err(err) => {
                events.push(SessionEvent::ExpressionUnavailable {
                    reason: err.to_string(),
                });
                None
            }
        };
        let catalog = CoordinateCatalog::discover(store.as_ref(), &config.data, &mut events);
        tracing::debug!(
            "opened {}: {} cells, {} columns, {} coordinate sources",
            store.location(),
            n_cells,
            registry.len(),
            catalog.sources().len()
        );
        let (x, y) = catalog.default_axes()?;
        let (x, y) = (x.clone(), y.clone());

        let mut table = RowTable::new(n_cells)?;
        let values = x.load_values(store.as_ref(), "x", n_cells, &mut events);
        table.set_axis_column("x", values)?;
        let values = y.load_values(store.as_ref(), "y", n_cells, &mut events);
        table.set_axis_column("y", values)?;
        table.set_axis_column("z", vec![0.0; n_cells])?;

        let mut session = Self {
            store,
            config,
            n_cells,
            registry,
            table,
            catalog,
            matrix,
            expression: None,
            axes: AxisSelection {
                x: x.name,
                y: y.name,
                z: None,
            },
            predicates: Vec::new(),
            next_predicate_id: 1,
            visible: Vec::new(),
            sampled: Vec::new(),
            sample_seed: None,
            events,
        };
        session.recompute_visible()?;
        Ok(session)
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    pub fn location(&self) -> String {
        self.store.location()
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn table(&self) -> &RowTable {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        self.registry.columns()
    }

    pub fn coordinate_sources(&self) -> &[CoordinateSource] {
        self.catalog.sources()
    }

    pub fn axes(&self) -> &AxisSelection {
        &self.axes
    }

    /// Loads one registered column into the row table if not already there.
    pub fn ensure_loaded(&mut self, name: &str) -> Result<()> {
        let Some(desc) = self.registry.descriptor(name).cloned() else {
            return Err(eyre!(
                "Unknown column: {name}. See columns() for what this dataset has."
            ));
        };
        self.table
            .ensure_loaded(self.store.as_ref(), &desc, &mut self.events)?;
        Ok(())
    }

    /// Loads every registered column, reporting progress between columns.
    pub fn ensure_all_loaded<F>(&mut self, progress: F) -> Result<()>
    where
        F: FnMut(LoadProgress),
    {
        self.table.ensure_all(
            self.store.as_ref(),
            self.registry.columns(),
            &mut self.events,
            progress,
        )?;
        Ok(())
    }

    pub fn numeric_summary(&self, name: &str) -> Option<NumericSummary> {
        self.table.numeric_summary(name)
    }

    pub fn category_values(&self, name: &str) -> Option<&[String]> {
        self.table.category_values(name)
    }

    pub fn category_counts(&self, name: &str) -> Result<Vec<(String, u32)>> {
        Ok(self.table.category_counts(name)?)
    }

    pub fn gene_names(&self) -> &[String] {
        self.matrix
            .as_ref()
            .map(GeneMatrix::gene_names)
            .unwrap_or(&[])
    }

    /// Case-insensitive substring search over gene names. Empty when the
    /// dataset has no expression matrix.
    pub fn search_genes(&self, query: &str, limit: usize) -> Vec<String> {
        self.matrix
            .as_ref()
            .map(|m| {
                m.search(query, limit)
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Loads a gene's expression into the single selection slot. Returns
    /// `Ok(None)` for an unknown gene or a dataset without a matrix; the
    /// previous selection stays in place in both cases. Reselecting the
    /// current gene is free and keeps its clip bounds.
    pub fn select_gene(&mut self, gene: &str) -> Result<Option<&GeneExpression>> {
        if self.expression.as_ref().is_some_and(|e| e.gene == gene) {
            return Ok(self.expression.as_ref());
        }
        let Some(matrix) = self.matrix.as_mut() else {
            return Ok(None);
        };
        match matrix.expression(self.store.as_ref(), gene) {
            Ok(values) => {
                self.expression = Some(GeneExpression::new(gene.to_string(), values));
                Ok(self.expression.as_ref())
            }
            Err(DataError::GeneNotFound(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn selected_expression(&self) -> Option<&GeneExpression> {
        self.expression.as_ref()
    }

    pub fn clear_selected_gene(&mut self) {
        self.expression = None;
    }

    /// Winsorizes the color scale for the selected gene. No-op when no gene
    /// is selected.
    pub fn set_expression_clip(&mut self, min: f64, max: f64) {
        if let Some(expression) = &mut self.expression {
            expression.set_clip(min, max);
        }
    }

    pub fn reset_expression_clip(&mut self) {
        if let Some(expression) = &mut self.expression {
            expression.reset_clip();
        }
    }

    /// Appends an unconfigured predicate and returns its id. Unconfigured
    /// predicates pass every row until [`DatasetSession::configure_predicate`]
    /// gives them an attribute and a kind.
    pub fn add_predicate(&mut self) -> u64 {
        let id = self.next_predicate_id;
        self.next_predicate_id += 1;
        self.predicates.push(FilterPredicate::new(id));
        id
    }

    pub fn configure_predicate(
        &mut self,
        id: u64,
        attribute: &str,
        kind: PredicateKind,
    ) -> Result<()> {
        let Some(predicate) = self.predicates.iter_mut().find(|p| p.id == id) else {
            return Err(eyre!("No filter with id {id}"));
        };
        predicate.attribute = Some(attribute.to_string());
        predicate.kind = Some(kind);
        Ok(())
    }

    pub fn remove_predicate(&mut self, id: u64) -> bool {
        let before = self.predicates.len();
        self.predicates.retain(|p| p.id != id);
        self.predicates.len() != before
    }

    pub fn predicates(&self) -> &[FilterPredicate] {
        &self.predicates
    }

    /// Re-runs the filter pipeline and redraws the sample. Columns referenced
    /// by configured predicates are loaded on demand first. Callers debounce
    /// this; it is always a full recompute.
    pub fn recompute_visible(&mut self) -> Result<()> {
        let referenced: Vec<String> = self
            .predicates
            .iter()
            .filter(|p| p.is_configured())
            .filter_map(|p| p.attribute.clone())
            .collect();
        for name in referenced {
            if self.table.is_loaded(&name) {
                continue;
            }
            if let Some(desc) = self.registry.descriptor(&name).cloned() {
                self.table
                    .ensure_loaded(self.store.as_ref(), &desc, &mut self.events)?;
            }
        }
        self.visible = filter::recompute(&self.table, &self.predicates)?;
        self.resample();
        Ok(())
    }

    /// Fixes the sampling seed so every recompute draws the same subset.
    /// `None` restores fresh randomness per recompute.
    pub fn set_sample_seed(&mut self, seed: Option<u64>) {
        self.sample_seed = seed;
    }

    fn resample(&mut self) {
        let mut rng = match self.sample_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.sampled = sample::sample(
            &self.visible,
            self.config.sampling.fraction,
            self.config.sampling.cap,
            &mut rng,
        );
    }

    pub fn visible_indices(&self) -> &[u32] {
        &self.visible
    }

    pub fn sampled_indices(&self) -> &[u32] {
        &self.sampled
    }

    /// The sampled rows as a dataframe, in sample order. This is what the
    /// render layer draws.
    pub fn visible_frame(&self) -> Result<DataFrame> {
        Ok(self.table.gather(&self.sampled)?)
    }

    /// Rebinds plot axes to the named coordinate sources and reloads their
    /// values. A `None` z zero-fills the z column.
    pub fn set_axes(&mut self, x: &str, y: &str, z: Option<&str>) -> Result<()> {
        let sx = self.find_source(x)?;
        let sy = self.find_source(y)?;
        let sz = match z {
            Some(name) => Some(self.find_source(name)?),
            None => None,
        };

        let n_cells = self.n_cells;
        let values = sx.load_values(self.store.as_ref(), "x", n_cells, &mut self.events);
        self.table.set_axis_column("x", values)?;
        let values = sy.load_values(self.store.as_ref(), "y", n_cells, &mut self.events);
        self.table.set_axis_column("y", values)?;
        match &sz {
            Some(source) => {
                let values = source.load_values(self.store.as_ref(), "z", n_cells, &mut self.events);
                self.table.set_axis_column("z", values)?;
            }
            None => self.table.set_axis_column("z", vec![0.0; n_cells])?,
        }

        self.axes = AxisSelection {
            x: sx.name,
            y: sy.name,
            z: sz.map(|s| s.name),
        };
        Ok(())
    }

    fn find_source(&self, name: &str) -> Result<CoordinateSource> {
        self.catalog.find(name).cloned().ok_or_else(|| {
            eyre!("Unknown coordinate source: {name}. See coordinate_sources() for the catalog.")
        })
    }

    /// Drains pending degradation events. The host surfaces these to the
    /// user; they are warnings, never failures.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain()
    }
}

/// Row count resolution: length of the `obs` index array, falling back to
/// the matrix row count for datasets without per-cell metadata.
fn resolve_cell_count(store: &dyn ChunkStore) -> error::Result<usize> {
    let index_column = array::read_attrs(store, "obs")?
        .as_ref()
        .and_then(|attrs| attrs.get("_index").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| "_index".to_string());
    match array::open_array(store, &format!("obs/{index_column}")) {
        Ok(handle) => return Ok(handle.len()),
        Err(err) if err.is_not_found() => {}
        Err(err) => return Err(err),
    }
    if let Some(attrs) = array::read_attrs(store, "X")? {
        if let Some(rows) = attrs
            .get("shape")
            .and_then(Value::as_array)
            .and_then(|shape| shape.first())
            .and_then(Value::as_u64)
        {
            return Ok(rows as usize);
        }
    }
    Err(DataError::NotFound("obs/_index".into()))
}
