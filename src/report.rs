//! User-facing error message formatting.
//!
//! Uses typed error matching (DataError variants, io::ErrorKind) rather than
//! string parsing to produce actionable, implementation-agnostic messages.

use std::io;

use polars::prelude::PolarsError;

use crate::error::DataError;

/// Format a DataError as a user-facing message by matching on its variant.
pub fn user_message_from_data(err: &DataError) -> String {
    match err {
        DataError::NotFound(key) => format!(
            "Dataset entry not found: {}. Check that the location points at a dataset root.",
            key
        ),
        DataError::Decode(msg) => format!("Corrupted or unsupported data: {}", msg),
        DataError::GeneNotFound(name) => format!(
            "Gene '{}' is not in this dataset. Lookup is exact; try searching for a partial name.",
            name
        ),
        DataError::NoCoordinateSource => {
            "No plottable coordinates found. The dataset needs at least two embedding dimensions."
                .to_string()
        }
        DataError::Store(msg) => format!("Storage error: {}", msg),
        DataError::Http(msg) => format!("Network error: {}", msg),
        DataError::Io(io_err) => user_message_from_io(io_err, None),
        DataError::Json(json_err) => format!("Malformed metadata: {}", json_err),
        DataError::Polars(polars_err) => user_message_from_polars(polars_err),
    }
}

/// Format a PolarsError as a user-facing message by matching on its variant.
pub fn user_message_from_polars(err: &PolarsError) -> String {
    use polars::prelude::PolarsError as PE;

    match err {
        PE::ColumnNotFound(msg) => format!(
            "Column not found: {}. Check spelling and that the column exists.",
            msg
        ),
        PE::IO { error, msg } => {
            user_message_from_io(error.as_ref(), msg.as_ref().map(|m| m.as_ref()))
        }
        PE::NoData(msg) => format!("No data: {}", msg),
        PE::SchemaMismatch(msg) => format!("Schema mismatch: {}", msg),
        PE::ShapeMismatch(msg) => format!("Row shape mismatch: {}", msg),
        PE::InvalidOperation(msg) => format!("Operation not allowed: {}", msg),
        PE::OutOfBounds(msg) => format!("Index or row out of bounds: {}", msg),
        PE::Context { error, msg } => {
            let inner = user_message_from_polars(error);
            format!("{}: {}", msg, inner)
        }
        #[allow(unreachable_patterns)]
        _ => err.to_string(),
    }
}

/// Format an io::Error as a user-facing message by matching on ErrorKind.
pub fn user_message_from_io(err: &io::Error, context: Option<&str>) -> String {
    use std::io::ErrorKind;

    let base: String = match err.kind() {
        ErrorKind::NotFound => "File or directory not found.".to_string(),
        ErrorKind::PermissionDenied => "Permission denied. Check read access.".to_string(),
        ErrorKind::ConnectionRefused => "Connection refused.".to_string(),
        ErrorKind::ConnectionReset => "Connection reset.".to_string(),
        ErrorKind::InvalidData | ErrorKind::InvalidInput => {
            "Invalid or corrupted data.".to_string()
        }
        ErrorKind::UnexpectedEof => "Unexpected end of file.".to_string(),
        ErrorKind::TimedOut => "Operation timed out.".to_string(),
        _ => err.to_string(),
    };

    if let Some(ctx) = context {
        if !ctx.is_empty() {
            format!("{} {}", base, ctx)
        } else {
            base
        }
    } else {
        base
    }
}

/// Format a color_eyre Report by downcasting to known error types.
/// Walks the cause chain to find DataError or io::Error.
pub fn user_message_from_report(
    report: &color_eyre::eyre::Report,
    location: Option<&str>,
) -> String {
    for cause in report.chain() {
        if let Some(data_err) = cause.downcast_ref::<DataError>() {
            let msg = user_message_from_data(data_err);
            return if let Some(loc) = location {
                format!("Failed to open {}: {}", loc, msg)
            } else {
                msg
            };
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            let msg = user_message_from_io(io_err, None);
            return if let Some(loc) = location {
                format!("Failed to open {}: {}", loc, msg)
            } else {
                msg
            };
        }
    }

    // Fallback: use first line of display to avoid long tracebacks
    let display = report.to_string();
    let first_line = display.lines().next().unwrap_or("An error occurred");
    let trimmed = first_line.trim();
    if let Some(loc) = location {
        format!("Failed to open {}: {}", loc, trimmed)
    } else {
        trimmed.to_string()
    }
}
