//! Dataset sources backed by Polars.
//!
//! The engine only sees [`Dataset`]s. These helpers turn a `DataFrame` or CSV
//! file into one (target column plus every other numeric column as features)
//! and write surviving rows back out.

use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{OutlierError, Result, ResultExt};
use crate::types::{Dataset, Row};

/// Column names a [`Dataset`] was extracted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub features: Vec<String>,
    pub target: String,
}

/// Returns true if the data type is numeric.
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

fn column_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df
        .column(name)
        .map_err(|_| OutlierError::ColumnNotFound(name.to_string()))?;
    let series = column.as_materialized_series();
    if !is_numeric_dtype(series.dtype()) {
        return Err(OutlierError::InvalidDataset(format!(
            "column '{}' has non-numeric type {}",
            name,
            series.dtype()
        )));
    }
    let float_series = series.cast(&DataType::Float64)?;
    let values = float_series.f64()?;
    values
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| {
                OutlierError::InvalidDataset(format!("column '{}' is null at row {}", name, row))
            })
        })
        .collect()
}

/// Extract a dataset from `df`.
///
/// `target` must be numeric. Every other numeric column becomes a feature, in
/// frame order; non-numeric columns are skipped. Nulls are rejected.
pub fn from_dataframe(
    df: &DataFrame,
    target: &str,
    name: impl Into<String>,
) -> Result<(Dataset, TableSchema)> {
    let targets = column_values(df, target)?;

    let feature_names: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|col| col.name().as_str() != target && is_numeric_dtype(col.dtype()))
        .map(|col| col.name().to_string())
        .collect();
    let skipped = df.width() - feature_names.len() - 1;
    if skipped > 0 {
        debug!(skipped, "Skipping non-numeric columns");
    }

    let feature_columns: Vec<Vec<f64>> = feature_names
        .iter()
        .map(|feature| column_values(df, feature))
        .collect::<Result<_>>()?;

    let rows = targets
        .into_iter()
        .enumerate()
        .map(|(i, target)| {
            let features = feature_columns.iter().map(|values| values[i]).collect();
            Row::new(features, target)
        })
        .collect();

    let dataset = Dataset::new(name, rows)?;
    Ok((
        dataset,
        TableSchema {
            features: feature_names,
            target: target.to_string(),
        },
    ))
}

/// Read a CSV file with a header row and extract a dataset from it.
pub fn read_csv(path: &Path, target: &str) -> Result<(Dataset, TableSchema)> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .context(format!("Opening {}", path.display()))?
        .finish()
        .context(format!("Reading {}", path.display()))?;
    info!(
        rows = df.height(),
        columns = df.width(),
        "Loaded {}",
        path.display()
    );

    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    from_dataframe(&df, target, name)
}

/// Build a `DataFrame` from a dataset, feature columns first.
pub fn to_dataframe(dataset: &Dataset, schema: &TableSchema) -> Result<DataFrame> {
    if !dataset.is_empty() && dataset.num_features() != schema.features.len() {
        return Err(OutlierError::InvalidDataset(format!(
            "dataset has {} features but schema names {}",
            dataset.num_features(),
            schema.features.len()
        )));
    }

    let mut columns: Vec<Column> = schema
        .features
        .iter()
        .enumerate()
        .map(|(j, feature)| {
            let values: Vec<f64> = dataset.rows().iter().map(|row| row.features[j]).collect();
            Column::new(feature.as_str().into(), values)
        })
        .collect();
    let targets: Vec<f64> = dataset.targets().collect();
    columns.push(Column::new(schema.target.as_str().into(), targets));

    Ok(DataFrame::new(columns)?)
}

/// Write a dataset as CSV with a header row.
pub fn write_csv(dataset: &Dataset, schema: &TableSchema, path: &Path) -> Result<()> {
    let mut df = to_dataframe(dataset, schema)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(&mut df)
        .context(format!("Writing {}", path.display()))?;

    info!(rows = dataset.len(), "Dataset saved: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame() -> DataFrame {
        df![
            "x1" => [1.0, 2.0, 3.0],
            "label" => ["a", "b", "c"],
            "x2" => [10i64, 20, 30],
            "y" => [0.5, 1.5, 2.5],
        ]
        .unwrap()
    }

    #[test]
    fn test_from_dataframe_uses_numeric_columns() {
        let (dataset, schema) = from_dataframe(&frame(), "y", "frame").unwrap();

        assert_eq!(schema.features, vec!["x1".to_string(), "x2".to_string()]);
        assert_eq!(schema.target, "y");
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.rows()[1], Row::new(vec![2.0, 20.0], 1.5));
    }

    #[test]
    fn test_missing_target_column() {
        let err = from_dataframe(&frame(), "price", "frame").unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    }

    #[test]
    fn test_non_numeric_target_is_rejected() {
        let err = from_dataframe(&frame(), "label", "frame").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATASET");
    }

    #[test]
    fn test_nulls_are_rejected() {
        let df = df![
            "x" => [Some(1.0), None, Some(3.0)],
            "y" => [1.0, 2.0, 3.0],
        ]
        .unwrap();
        let err = from_dataframe(&df, "y", "nulls").unwrap_err();
        assert!(err.to_string().contains("null"));
    }

    #[test]
    fn test_csv_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("clean.csv");
        let (dataset, schema) = from_dataframe(&frame(), "y", "frame").unwrap();

        write_csv(&dataset, &schema, &path).unwrap();
        let (restored, restored_schema) = read_csv(&path, "y").unwrap();

        assert_eq!(restored_schema, schema);
        assert_eq!(restored.rows(), dataset.rows());
        assert_eq!(restored.name(), "clean");
    }
}
