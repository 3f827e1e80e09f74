//! Structured session events.
//!
//! Loading degrades instead of failing: a broken column fills with defaults,
//! a short coordinate array gets padded. Each such repair pushes an event so
//! hosts (and tests) observe exactly what was patched over instead of
//! scraping logs.

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// A column fetch failed; the column was materialized default-filled.
    ColumnDegraded { column: String, reason: String },
    /// Loaded data had the wrong length and was padded or truncated to the
    /// cell count.
    LengthAdjusted {
        name: String,
        expected: usize,
        actual: usize,
    },
    /// An embedding's dimension count could not be determined, so the
    /// embedding was skipped rather than truncated silently.
    EmbeddingDimsUnknown { embedding: String },
    /// Coordinate values for an axis failed to load; the axis was zero-filled.
    AxisDegraded {
        axis: String,
        source: String,
        reason: String,
    },
    /// The dataset has no expression matrix; gene queries will return nothing.
    ExpressionUnavailable { reason: String },
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::ColumnDegraded { column, reason } => {
                write!(f, "column {column:?} degraded to defaults: {reason}")
            }
            SessionEvent::LengthAdjusted {
                name,
                expected,
                actual,
            } => write!(
                f,
                "{name:?} had {actual} values, adjusted to {expected}"
            ),
            SessionEvent::EmbeddingDimsUnknown { embedding } => {
                write!(f, "embedding {embedding:?} skipped: dimension count unknown")
            }
            SessionEvent::AxisDegraded {
                axis,
                source,
                reason,
            } => write!(f, "axis {axis} ({source}) zero-filled: {reason}"),
            SessionEvent::ExpressionUnavailable { reason } => {
                write!(f, "expression matrix unavailable: {reason}")
            }
        }
    }
}

/// Append-only queue drained by the host each frame.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<SessionEvent>,
}

impl EventQueue {
    pub fn push(&mut self, event: SessionEvent) {
        tracing::warn!("{event}");
        self.events.push(event);
    }

    /// Takes all pending events, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}
