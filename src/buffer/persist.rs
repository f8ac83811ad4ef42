//! CSV persistence for signal buffers
//!
//! Files have a header row naming each column and one sample per row.
//! Columns may have different lengths; shorter columns are padded with
//! empty fields, which are skipped again on load. Floats are written in
//! Rust's shortest round-trip form, so a save/load cycle is exact.

use crate::error::{Result, ScopeError};
use std::collections::HashSet;
use std::path::Path;

/// Column name reserved for the elapsed-time axis
pub const TIME_COLUMN: &str = "t";

/// One named column read from or written to a persisted file
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Header name
    pub name: String,
    /// Samples, oldest first
    pub values: Vec<f64>,
}

impl Column {
    /// Create a new column
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Write columns to `path`, replacing any existing file
pub fn write_columns<'a, I, V>(path: &Path, columns: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, V)>,
    V: IntoIterator<Item = f64>,
{
    let columns: Vec<(&str, Vec<f64>)> = columns
        .into_iter()
        .map(|(name, values)| (name, values.into_iter().collect()))
        .collect();

    if columns.is_empty() {
        return Err(ScopeError::persistence(path, "nothing to write"));
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(columns.iter().map(|(name, _)| *name))?;

    let rows = columns.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
    let mut record: Vec<String> = Vec::with_capacity(columns.len());
    for row in 0..rows {
        record.clear();
        for (_, values) in &columns {
            record.push(values.get(row).map(f64::to_string).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Read every column of a persisted file
///
/// Fails with a validation-class error when the file has no header,
/// repeats a column name, or contains a field that is not a number.
pub fn read_columns(path: &Path) -> Result<Vec<Column>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    if headers.is_empty() || headers.iter().all(str::is_empty) {
        return Err(ScopeError::persistence(path, "missing header row"));
    }

    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(headers.len());
    for name in headers.iter() {
        if name.is_empty() {
            return Err(ScopeError::persistence(path, "empty column name"));
        }
        if !seen.insert(name) {
            return Err(ScopeError::DuplicateName(name.to_string()));
        }
        columns.push(Column::new(name, Vec::new()));
    }

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        for (column, field) in columns.iter_mut().zip(record.iter()) {
            if field.is_empty() {
                continue;
            }
            let value = field.parse::<f64>().map_err(|e| {
                ScopeError::persistence(
                    path,
                    format!(
                        "row {}, column '{}': '{}' is not a number ({})",
                        index + 2,
                        column.name,
                        field,
                        e
                    ),
                )
            })?;
            column.values.push(value);
        }
    }

    Ok(columns)
}

/// Convert per-sample intervals into a cumulative time axis starting at 0
pub fn cumulative_from_intervals<'a>(intervals: impl IntoIterator<Item = &'a f64>) -> Vec<f64> {
    let mut total = 0.0;
    intervals
        .into_iter()
        .enumerate()
        .map(|(i, dt)| {
            if i > 0 {
                total += dt;
            }
            total
        })
        .collect()
}

/// Convert a cumulative time axis back into per-sample intervals
pub fn intervals_from_cumulative(axis: &[f64]) -> Vec<f64> {
    axis.iter()
        .enumerate()
        .map(|(i, t)| if i == 0 { 0.0 } else { t - axis[i - 1] })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ragged_columns_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("signals.csv");

        write_columns(
            &path,
            vec![("a", vec![1.0, 2.5, -3.25]), ("b", vec![0.1])],
        )
        .unwrap();

        let columns = read_columns(&path).unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0], Column::new("a", vec![1.0, 2.5, -3.25]));
        assert_eq!(columns[1], Column::new("b", vec![0.1]));
    }

    #[test]
    fn test_header_is_first_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.csv");
        write_columns(&path, vec![("x", vec![1.0, 2.0])]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().collect::<Vec<_>>(), vec!["x", "1", "2"]);
    }

    #[test]
    fn test_non_numeric_field_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "x\n1.0\nabc\n").unwrap();

        let err = read_columns(&path).unwrap_err();
        assert!(err.to_string().contains("row 3"));
    }

    #[test]
    fn test_duplicate_header_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dup.csv");
        std::fs::write(&path, "x,x\n1,2\n").unwrap();

        assert!(matches!(
            read_columns(&path),
            Err(ScopeError::DuplicateName(name)) if name == "x"
        ));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(read_columns(&dir.path().join("absent.csv")).is_err());
    }

    #[test]
    fn test_interval_conversions() {
        let intervals = [0.0, 0.5, 0.25, 1.0];
        let axis = cumulative_from_intervals(&intervals);
        assert_eq!(axis, vec![0.0, 0.5, 0.75, 1.75]);
        assert_eq!(intervals_from_cumulative(&axis), intervals.to_vec());
    }
}
