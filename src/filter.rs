//! Attribute predicates and visible-set recomputation.
//!
//! Predicates start unconfigured (no attribute, no bounds) and become
//! active once both an attribute and a kind are assigned; unconfigured
//! entries pass every row. Recomputation intersects predicates in list
//! order over the full table, so the result is ascending and independent
//! of predicate order.

use std::collections::HashSet;

use polars::prelude::*;

use crate::error::Result;
use crate::table::RowTable;

#[derive(Clone, Debug, PartialEq)]
pub enum PredicateKind {
    /// Row's string value must be in the selected set. Rows with no
    /// category ("") match only when "" is selected explicitly.
    Categorical { selected: HashSet<String> },
    /// Inclusive range test; NaN never matches.
    Continuous { min: f64, max: f64 },
}

#[derive(Clone, Debug)]
pub struct FilterPredicate {
    pub id: u64,
    pub attribute: Option<String>,
    pub kind: Option<PredicateKind>,
}

impl FilterPredicate {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            attribute: None,
            kind: None,
        }
    }

    pub fn continuous(id: u64, attribute: &str, min: f64, max: f64) -> Self {
        Self {
            id,
            attribute: Some(attribute.to_string()),
            kind: Some(PredicateKind::Continuous { min, max }),
        }
    }

    pub fn categorical<I>(id: u64, attribute: &str, selected: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            id,
            attribute: Some(attribute.to_string()),
            kind: Some(PredicateKind::Categorical {
                selected: selected.into_iter().map(Into::into).collect(),
            }),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.attribute.is_some() && self.kind.is_some()
    }
}

/// Full recompute of the visible set. Every attribute referenced by a
/// configured predicate must already be loaded into the table; an
/// unloaded attribute is an error, not an empty result.
pub fn recompute(table: &RowTable, predicates: &[FilterPredicate]) -> Result<Vec<u32>> {
    let mut indices: Vec<u32> = (0..table.n_cells() as u32).collect();
    for predicate in predicates {
        let (Some(attribute), Some(kind)) = (&predicate.attribute, &predicate.kind) else {
            continue;
        };
        match kind {
            PredicateKind::Continuous { min, max } => {
                let values = table.frame().column(attribute)?.f64()?;
                indices.retain(|&i| {
                    values
                        .get(i as usize)
                        .is_some_and(|v| !v.is_nan() && v >= *min && v <= *max)
                });
            }
            PredicateKind::Categorical { selected } => {
                let values = table.frame().column(attribute)?.str()?;
                indices.retain(|&i| {
                    values
                        .get(i as usize)
                        .is_some_and(|v| selected.contains(v))
                });
            }
        }
    }
    Ok(indices)
}
