//! The Row Table: one DataFrame of per-cell attributes, loaded lazily.
//!
//! The table is seeded with a `cell_id` column and grows one column per
//! loaded attribute. Loading never fails visibly: a column whose fetch
//! breaks is materialized with type defaults and the repair is pushed to the
//! event queue, because a viewer with one broken column is still a viewer.
//! Once a name is in the loaded set it is never fetched again.

use std::collections::{BTreeSet, HashMap, HashSet};

use polars::prelude::*;

use crate::array;
use crate::error::Result;
use crate::events::{EventQueue, SessionEvent};
use crate::schema::{ColumnDescriptor, ColumnKind};
use crate::store::ChunkStore;

pub const CELL_ID_COLUMN: &str = "cell_id";

/// Per-column `{min, max}` over finite values, fixed when the load completes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NumericSummary {
    pub min: f64,
    pub max: f64,
}

/// Progress callback payload for batch loads; emitted between columns so a
/// UI thread can repaint.
#[derive(Clone, Debug)]
pub struct LoadProgress {
    pub completed: usize,
    pub total: usize,
    pub current: String,
}

pub struct RowTable {
    df: DataFrame,
    n_cells: usize,
    loaded: HashSet<String>,
    summaries: HashMap<String, NumericSummary>,
    categories: HashMap<String, Vec<String>>,
}

impl RowTable {
    pub fn new(n_cells: usize) -> Result<Self> {
        let ids: Vec<u32> = (0..n_cells as u32).collect();
        let cell_id = Series::new(CELL_ID_COLUMN.into(), ids);
        let df = DataFrame::new(vec![cell_id.into()])?;
        Ok(Self {
            df,
            n_cells,
            loaded: HashSet::new(),
            summaries: HashMap::new(),
            categories: HashMap::new(),
        })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.df
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains(name)
    }

    pub fn numeric_summary(&self, name: &str) -> Option<NumericSummary> {
        self.summaries.get(name).copied()
    }

    /// Distinct non-empty values of a loaded categorical column, sorted.
    pub fn category_values(&self, name: &str) -> Option<&[String]> {
        self.categories.get(name).map(Vec::as_slice)
    }

    /// Loads a column if it is not already in the table. Idempotent; a
    /// degraded load still marks the column loaded so it is attempted once.
    pub fn ensure_loaded(
        &mut self,
        store: &dyn ChunkStore,
        desc: &ColumnDescriptor,
        events: &mut EventQueue,
    ) -> Result<()> {
        if self.loaded.contains(&desc.name) {
            return Ok(());
        }
        match desc.kind {
            ColumnKind::Numeric => {
                let values = match Self::load_numeric(store, desc) {
                    Ok(values) => self.adjust_len(&desc.name, values, 0.0, events),
                    Err(e) => {
                        events.push(SessionEvent::ColumnDegraded {
                            column: desc.name.clone(),
                            reason: e.to_string(),
                        });
                        vec![0.0; self.n_cells]
                    }
                };
                self.summaries.insert(desc.name.clone(), summarize(&values));
                let series = Series::new(desc.name.as_str().into(), values);
                self.df.with_column(series)?;
            }
            ColumnKind::Categorical => {
                let values = match array::read_categorical(store, &desc.source_path) {
                    Ok(values) => self.adjust_len(&desc.name, values, String::new(), events),
                    Err(e) => {
                        events.push(SessionEvent::ColumnDegraded {
                            column: desc.name.clone(),
                            reason: e.to_string(),
                        });
                        vec![String::new(); self.n_cells]
                    }
                };
                let set: BTreeSet<&String> = values.iter().filter(|s| !s.is_empty()).collect();
                self.categories
                    .insert(desc.name.clone(), set.into_iter().cloned().collect());
                let series = Series::new(desc.name.as_str().into(), values);
                self.df.with_column(series)?;
            }
        }
        self.loaded.insert(desc.name.clone());
        Ok(())
    }

    /// Loads several columns in sequence, reporting progress between columns.
    pub fn ensure_all<F>(
        &mut self,
        store: &dyn ChunkStore,
        descs: &[ColumnDescriptor],
        events: &mut EventQueue,
        mut progress: F,
    ) -> Result<()>
    where
        F: FnMut(LoadProgress),
    {
        let total = descs.len();
        for (i, desc) in descs.iter().enumerate() {
            progress(LoadProgress {
                completed: i,
                total,
                current: desc.name.clone(),
            });
            self.ensure_loaded(store, desc, events)?;
        }
        progress(LoadProgress {
            completed: total,
            total,
            current: String::new(),
        });
        Ok(())
    }

    /// Writes (or replaces) a plot-axis column. Values must already be
    /// exactly table height; the coordinate layer guarantees that.
    pub fn set_axis_column(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        let series = Series::new(name.into(), values);
        self.df.with_column(series)?;
        Ok(())
    }

    /// Rows at the given indices, in index order.
    pub fn gather(&self, indices: &[u32]) -> Result<DataFrame> {
        let ca = UInt32Chunked::new("take".into(), indices.to_vec());
        Ok(self.df.take(&ca)?)
    }

    /// Value → row-count pairs for a loaded categorical column, largest
    /// count first (ties by value). Empty-string rows are left out, matching
    /// the category value set.
    pub fn category_counts(&self, name: &str) -> Result<Vec<(String, u32)>> {
        let counts = self
            .df
            .clone()
            .lazy()
            .group_by([col(name)])
            .agg([len().alias("count")])
            .sort_by_exprs(
                vec![col("count"), col(name)],
                SortMultipleOptions {
                    descending: vec![true, false],
                    ..Default::default()
                },
            )
            .collect()?;
        let values = counts.column(name)?.str()?;
        let sizes = counts.column("count")?.u32()?;
        let mut out = Vec::with_capacity(counts.height());
        for i in 0..counts.height() {
            let (Some(value), Some(size)) = (values.get(i), sizes.get(i)) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            out.push((value.to_string(), size));
        }
        Ok(out)
    }

    fn load_numeric(store: &dyn ChunkStore, desc: &ColumnDescriptor) -> Result<Vec<f64>> {
        // A known-numeric column may still be stored categorically by a
        // sloppy writer; decode the categories and parse them per value.
        if desc.encoding == "categorical" {
            let strings = array::read_categorical(store, &desc.source_path)?;
            return Ok(strings.iter().map(|s| parse_numeric(s)).collect());
        }
        let handle = array::open_array(store, &desc.source_path)?;
        if handle.meta.dtype == "|O" {
            let strings = array::read_strings(store, &handle)?;
            return Ok(strings.iter().map(|s| parse_numeric(s)).collect());
        }
        array::read_f64(store, &handle)
    }

    fn adjust_len<T: Clone>(
        &self,
        name: &str,
        mut values: Vec<T>,
        default: T,
        events: &mut EventQueue,
    ) -> Vec<T> {
        if values.len() != self.n_cells {
            events.push(SessionEvent::LengthAdjusted {
                name: name.to_string(),
                expected: self.n_cells,
                actual: values.len(),
            });
            values.resize(self.n_cells, default);
        }
        values
    }
}

/// One value of a string-typed numeric column; anything unparseable is NaN.
fn parse_numeric(s: &str) -> f64 {
    s.trim().parse::<f64>().unwrap_or(f64::NAN)
}

fn summarize(values: &[f64]) -> NumericSummary {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in values {
        if !v.is_nan() {
            min = min.min(v);
            max = max.max(v);
        }
    }
    if min <= max {
        NumericSummary { min, max }
    } else {
        NumericSummary { min: 0.0, max: 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemStore;

    fn numeric_desc(name: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            kind: ColumnKind::Numeric,
            encoding: "array".to_string(),
            source_path: format!("obs/{name}"),
        }
    }

    fn categorical_desc(name: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            kind: ColumnKind::Categorical,
            encoding: "categorical".to_string(),
            source_path: format!("obs/{name}"),
        }
    }

    #[test]
    fn seeds_cell_id_column() {
        let table = RowTable::new(4).unwrap();
        let ids = table.frame().column(CELL_ID_COLUMN).unwrap().u32().unwrap();
        let ids: Vec<u32> = ids.iter().flatten().collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn numeric_load_records_summary_excluding_nan() {
        let mut store = MemStore::new();
        store.put_f64_array("obs/volume", &[3.0, f64::NAN, 1.0, 7.0], 4);
        let mut table = RowTable::new(4).unwrap();
        let mut events = EventQueue::default();
        table
            .ensure_loaded(&store, &numeric_desc("volume"), &mut events)
            .unwrap();
        assert!(table.is_loaded("volume"));
        assert!(events.is_empty());
        let summary = table.numeric_summary("volume").unwrap();
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 7.0);
        let col = table.frame().column("volume").unwrap().f64().unwrap();
        assert!(col.get(1).unwrap().is_nan());
    }

    #[test]
    fn string_typed_numeric_column_parses_per_value() {
        let mut store = MemStore::new();
        store.put_string_array("obs/score", &["1.5", "oops", "2.5"], 3);
        let mut table = RowTable::new(3).unwrap();
        let mut events = EventQueue::default();
        table
            .ensure_loaded(&store, &numeric_desc("score"), &mut events)
            .unwrap();
        let col = table.frame().column("score").unwrap().f64().unwrap();
        assert_eq!(col.get(0), Some(1.5));
        assert!(col.get(1).unwrap().is_nan());
        assert_eq!(col.get(2), Some(2.5));
        let summary = table.numeric_summary("score").unwrap();
        assert_eq!((summary.min, summary.max), (1.5, 2.5));
    }

    #[test]
    fn known_numeric_categorical_source_parses_categories() {
        let mut store = MemStore::new();
        store.put_categorical("obs/volume", &[1, 0, -1], &["10.5", "2.25"]);
        let mut desc = numeric_desc("volume");
        desc.encoding = "categorical".to_string();
        let mut table = RowTable::new(3).unwrap();
        let mut events = EventQueue::default();
        table.ensure_loaded(&store, &desc, &mut events).unwrap();
        let col = table.frame().column("volume").unwrap().f64().unwrap();
        assert_eq!(col.get(0), Some(2.25));
        assert_eq!(col.get(1), Some(10.5));
        assert!(col.get(2).unwrap().is_nan());
    }

    #[test]
    fn categorical_load_builds_sorted_value_set_without_missing() {
        let mut store = MemStore::new();
        store.put_categorical("obs/class", &[1, 0, -1, 1], &["Neuron", "Glia"]);
        let mut table = RowTable::new(4).unwrap();
        let mut events = EventQueue::default();
        table
            .ensure_loaded(&store, &categorical_desc("class"), &mut events)
            .unwrap();
        assert_eq!(
            table.category_values("class").unwrap(),
            &["Glia".to_string(), "Neuron".to_string()]
        );
        let col = table.frame().column("class").unwrap().str().unwrap();
        assert_eq!(col.get(2), Some(""));
    }

    #[test]
    fn failed_fetch_degrades_once_and_marks_loaded() {
        let mut store = MemStore::new();
        // No obs/volume array at all.
        store.put_obs(3, &["volume"]);
        let mut table = RowTable::new(3).unwrap();
        let mut events = EventQueue::default();
        table
            .ensure_loaded(&store, &numeric_desc("volume"), &mut events)
            .unwrap();

        assert!(table.is_loaded("volume"));
        let col = table.frame().column("volume").unwrap().f64().unwrap();
        assert_eq!(col.iter().flatten().collect::<Vec<f64>>(), vec![0.0, 0.0, 0.0]);
        let drained = events.drain();
        assert!(matches!(
            drained.as_slice(),
            [SessionEvent::ColumnDegraded { column, .. }] if column == "volume"
        ));

        // Second call must not go back to the store.
        let fetches_before = store.fetch_count("obs/volume");
        table
            .ensure_loaded(&store, &numeric_desc("volume"), &mut events)
            .unwrap();
        assert_eq!(store.fetch_count("obs/volume"), fetches_before);
        assert!(events.is_empty());
    }

    #[test]
    fn short_column_pads_and_reports() {
        let mut store = MemStore::new();
        store.put_f64_array("obs/volume", &[5.0, 6.0], 2);
        let mut table = RowTable::new(4).unwrap();
        let mut events = EventQueue::default();
        table
            .ensure_loaded(&store, &numeric_desc("volume"), &mut events)
            .unwrap();
        let col = table.frame().column("volume").unwrap().f64().unwrap();
        assert_eq!(
            col.iter().flatten().collect::<Vec<f64>>(),
            vec![5.0, 6.0, 0.0, 0.0]
        );
        assert!(matches!(
            events.drain().as_slice(),
            [SessionEvent::LengthAdjusted { expected: 4, actual: 2, .. }]
        ));
    }

    #[test]
    fn ensure_all_reports_progress_between_columns() {
        let mut store = MemStore::new();
        store.put_f64_array("obs/a", &[1.0, 2.0], 2);
        store.put_f64_array("obs/b", &[3.0, 4.0], 2);
        let mut table = RowTable::new(2).unwrap();
        let mut events = EventQueue::default();
        let mut seen: Vec<(usize, usize, String)> = Vec::new();
        table
            .ensure_all(
                &store,
                &[numeric_desc("a"), numeric_desc("b")],
                &mut events,
                |p| seen.push((p.completed, p.total, p.current.clone())),
            )
            .unwrap();
        assert_eq!(
            seen,
            vec![
                (0, 2, "a".to_string()),
                (1, 2, "b".to_string()),
                (2, 2, String::new()),
            ]
        );
    }

    #[test]
    fn category_counts_sorted_by_size_then_value() {
        let mut store = MemStore::new();
        store.put_categorical(
            "obs/class",
            &[2, 0, 2, 1, 2, 0, -1],
            &["Astro", "Glia", "Neuron"],
        );
        let mut table = RowTable::new(7).unwrap();
        let mut events = EventQueue::default();
        table
            .ensure_loaded(&store, &categorical_desc("class"), &mut events)
            .unwrap();
        let counts = table.category_counts("class").unwrap();
        assert_eq!(
            counts,
            vec![
                ("Neuron".to_string(), 3),
                ("Astro".to_string(), 2),
                ("Glia".to_string(), 1),
            ]
        );
    }

    #[test]
    fn gather_returns_rows_in_index_order() {
        let mut store = MemStore::new();
        store.put_f64_array("obs/volume", &[10.0, 20.0, 30.0, 40.0], 4);
        let mut table = RowTable::new(4).unwrap();
        let mut events = EventQueue::default();
        table
            .ensure_loaded(&store, &numeric_desc("volume"), &mut events)
            .unwrap();
        let frame = table.gather(&[3, 0]).unwrap();
        let col = frame.column("volume").unwrap().f64().unwrap();
        assert_eq!(col.iter().flatten().collect::<Vec<f64>>(), vec![40.0, 10.0]);
    }

    #[test]
    fn axis_column_is_replaceable() {
        let mut table = RowTable::new(3).unwrap();
        table.set_axis_column("x", vec![1.0, 2.0, 3.0]).unwrap();
        table.set_axis_column("x", vec![9.0, 8.0, 7.0]).unwrap();
        let col = table.frame().column("x").unwrap().f64().unwrap();
        assert_eq!(col.iter().flatten().collect::<Vec<f64>>(), vec![9.0, 8.0, 7.0]);
    }
}
