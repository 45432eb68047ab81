//! # Fold Prediction Loading and Alignment
//!
//! Entry point for externally produced prediction files. Each source's
//! cross-validation fold outputs live under `<data_dir>/5fold_cv/` as
//! `valid.<source>.fold_<k>.csv` with an `ID` column and one probability
//! column per class (`class1` .. `class9`). This module reads the folds,
//! concatenates them, and performs the explicit alignment step: rows are
//! sorted by `ID` and the sorted IDs must form exactly `0..n`, so that row
//! position equals example ID in the resulting matrix.
//!
//! - Strict schema: column names are not configurable; misnamed columns are
//!   a user error, reported with the exact missing name.
//! - User-centric errors: `DataError` assumes failures come from malformed
//!   input files and says which column or ID is at fault.

use ndarray::Array2;
use polars::prelude::*;
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::path::Path;

use crate::combine::NUM_CLASSES;

/// Fold count of the cross-validation split that produced the input files.
pub const DEFAULT_NUM_FOLDS: usize = 5;

/// Subdirectory of the data directory holding per-fold prediction files.
pub const FOLD_SUBDIR: &str = "5fold_cv";

/// A comprehensive error type for all loading and validation failures.
///
/// `Display`, `Error`, and `From` are implemented by hand because the
/// `source` field of `MisalignedIds` is a prediction-source name, not an
/// error cause, and `thiserror`'s derive would otherwise treat it as the
/// `Error::source()`.
#[derive(Debug)]
pub enum DataError {
    PolarsError(PolarsError),
    IoError(std::io::Error),
    ColumnNotFound(String),
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    MissingValuesFound(String),
    NonFiniteValuesFound(String),
    MisalignedIds {
        source: String,
        expected: usize,
        id: i64,
    },
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::PolarsError(err) => write!(
                f,
                "Error from the underlying Polars DataFrame library: {err}"
            ),
            DataError::IoError(err) => write!(f, "IO error: {err}"),
            DataError::ColumnNotFound(name) => write!(
                f,
                "The required column '{name}' was not found in the input file. Please check spelling and case."
            ),
            DataError::ColumnWrongType {
                column_name,
                expected_type,
                found_type,
            } => write!(
                f,
                "The required column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
            ),
            DataError::MissingValuesFound(name) => write!(
                f,
                "Missing or null values were found in the required column '{name}'. This tool requires complete data with no missing values."
            ),
            DataError::NonFiniteValuesFound(name) => write!(
                f,
                "Non-finite values (NaN or Infinity) were found in the required column '{name}'. This tool requires all probabilities to be finite."
            ),
            DataError::MisalignedIds {
                source,
                expected,
                id,
            } => write!(
                f,
                "Example IDs for source '{source}' do not form the contiguous range 0..{expected} after sorting (first problem at ID {id}). Fold files are incomplete or overlap."
            ),
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::PolarsError(err) => Some(err),
            DataError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PolarsError> for DataError {
    fn from(err: PolarsError) -> Self {
        DataError::PolarsError(err)
    }
}

impl From<std::io::Error> for DataError {
    fn from(err: std::io::Error) -> Self {
        DataError::IoError(err)
    }
}

/// Loads one source's per-fold prediction files, concatenates them, and
/// returns its (n x NUM_CLASSES) probability matrix with rows indexed by
/// example ID.
pub fn load_source_predictions(
    data_dir: &Path,
    source: &str,
    num_folds: usize,
) -> Result<Array2<f64>, DataError> {
    let class_names = class_column_names();
    let mut required: Vec<String> = vec!["ID".to_string()];
    required.extend(class_names.iter().cloned());

    let mut ids: Vec<i64> = Vec::new();
    let mut values: Vec<f64> = Vec::new();
    for fold in 0..num_folds {
        let path = data_dir
            .join(FOLD_SUBDIR)
            .join(format!("valid.{source}.fold_{fold}.csv"));
        log::debug!("Reading fold predictions from {}", path.display());
        let df = read_csv(&path)?;
        require_columns(&df, &required)?;

        let fold_ids = extract_id_column(&df, "ID")?;
        let mut columns = Vec::with_capacity(NUM_CLASSES);
        for name in &class_names {
            columns.push(extract_numeric_column(&df, name)?);
        }

        for (i, &id) in fold_ids.iter().enumerate() {
            ids.push(id);
            for column in &columns {
                values.push(column[i]);
            }
        }
    }

    log::info!(
        "Loaded {} held-out predictions across {} folds for source '{}'",
        ids.len(),
        num_folds,
        source
    );
    align_by_id(source, &ids, &values)
}

/// The fixed probability column names `class1` .. `class9`.
pub fn class_column_names() -> Vec<String> {
    (1..=NUM_CLASSES).map(|i| format!("class{i}")).collect()
}

/// Sort-and-reindex step: reorders concatenated fold rows by example ID and
/// verifies the IDs cover exactly `0..n`, so row position equals ID.
fn align_by_id(source: &str, ids: &[i64], values: &[f64]) -> Result<Array2<f64>, DataError> {
    use itertools::Itertools;

    let n = ids.len();
    let order: Vec<usize> = (0..n).sorted_by_key(|&i| ids[i]).collect();

    let mut matrix = Array2::<f64>::zeros((n, NUM_CLASSES));
    for (row, &original) in order.iter().enumerate() {
        let id = ids[original];
        if id != row as i64 {
            return Err(DataError::MisalignedIds {
                source: source.to_string(),
                expected: n,
                id,
            });
        }
        for class in 0..NUM_CLASSES {
            matrix[[row, class]] = values[original * NUM_CLASSES + class];
        }
    }
    Ok(matrix)
}

/// Reads a comma-separated file with a header row into a DataFrame.
pub(crate) fn read_csv(path: &Path) -> Result<DataFrame, DataError> {
    let df = CsvReader::new(File::open(path)?)
        .with_options(CsvReadOptions::default().with_has_header(true))
        .finish()?;
    Ok(df)
}

/// Verifies all required columns exist before any extraction begins.
pub(crate) fn require_columns(df: &DataFrame, required: &[String]) -> Result<(), DataError> {
    let present: HashSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    for name in required {
        if !present.contains(name) {
            return Err(DataError::ColumnNotFound(name.clone()));
        }
    }
    Ok(())
}

/// Extracts a column as finite, non-null f64 values.
pub(crate) fn extract_numeric_column(
    df: &DataFrame,
    column_name: &str,
) -> Result<Vec<f64>, DataError> {
    let column = df.column(column_name)?;
    if column.null_count() > 0 {
        return Err(DataError::MissingValuesFound(column_name.to_string()));
    }

    let casted = match column.cast(&DataType::Float64) {
        Ok(casted) => casted,
        Err(_) => {
            return Err(DataError::ColumnWrongType {
                column_name: column_name.to_string(),
                expected_type: "f64 (numeric)",
                found_type: format!("{:?}", column.dtype()),
            });
        }
    };
    if casted.null_count() > 0 {
        return Err(DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", column.dtype()),
        });
    }

    let chunked = casted.f64()?.rechunk();
    let values: Vec<f64> = chunked.into_no_null_iter().collect();
    if values.iter().any(|&v| !v.is_finite()) {
        return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
    }
    Ok(values)
}

/// Extracts a column as non-null i64 identifiers.
pub(crate) fn extract_id_column(df: &DataFrame, column_name: &str) -> Result<Vec<i64>, DataError> {
    let column = df.column(column_name)?;
    if column.null_count() > 0 {
        return Err(DataError::MissingValuesFound(column_name.to_string()));
    }

    let casted = match column.cast(&DataType::Int64) {
        Ok(casted) => casted,
        Err(_) => {
            return Err(DataError::ColumnWrongType {
                column_name: column_name.to_string(),
                expected_type: "i64 (integer identifier)",
                found_type: format!("{:?}", column.dtype()),
            });
        }
    };
    if casted.null_count() > 0 {
        return Err(DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "i64 (integer identifier)",
            found_type: format!("{:?}", column.dtype()),
        });
    }

    Ok(casted.i64()?.rechunk().into_no_null_iter().collect())
}

/// Extracts a column as non-null text values.
pub(crate) fn extract_string_column(
    df: &DataFrame,
    column_name: &str,
) -> Result<Vec<String>, DataError> {
    let column = df.column(column_name)?;
    if column.null_count() > 0 {
        return Err(DataError::MissingValuesFound(column_name.to_string()));
    }

    let casted = match column.cast(&DataType::String) {
        Ok(casted) => casted,
        Err(_) => {
            return Err(DataError::ColumnWrongType {
                column_name: column_name.to_string(),
                expected_type: "utf8 (text)",
                found_type: format!("{:?}", column.dtype()),
            });
        }
    };

    let chunked = casted.str()?.rechunk();
    Ok(chunked
        .into_no_null_iter()
        .map(|s| s.to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::fs;
    use tempfile::TempDir;

    const HEADER: &str = "ID,class1,class2,class3,class4,class5,class6,class7,class8,class9";

    fn prob_row(seed: f64) -> [f64; NUM_CLASSES] {
        let mut row = [0.0; NUM_CLASSES];
        for (k, value) in row.iter_mut().enumerate() {
            *value = seed + k as f64 / 100.0;
        }
        row
    }

    fn fold_csv(rows: &[(i64, [f64; NUM_CLASSES])]) -> String {
        let mut out = String::from(HEADER);
        out.push('\n');
        for (id, probs) in rows {
            let cells: Vec<String> = probs.iter().map(|p| p.to_string()).collect();
            out.push_str(&format!("{id},{}\n", cells.join(",")));
        }
        out
    }

    fn write_fold(dir: &Path, source: &str, fold: usize, content: &str) {
        let folds = dir.join(FOLD_SUBDIR);
        fs::create_dir_all(&folds).unwrap();
        fs::write(folds.join(format!("valid.{source}.fold_{fold}.csv")), content).unwrap();
    }

    #[test]
    fn concatenates_and_sorts_fold_files_by_id() {
        let dir = TempDir::new().unwrap();
        // Even IDs in fold 0, odd IDs in fold 1, both deliberately unsorted.
        write_fold(
            dir.path(),
            "xgb",
            0,
            &fold_csv(&[(4, prob_row(0.4)), (0, prob_row(0.0)), (2, prob_row(0.2))]),
        );
        write_fold(
            dir.path(),
            "xgb",
            1,
            &fold_csv(&[(3, prob_row(0.3)), (5, prob_row(0.5)), (1, prob_row(0.1))]),
        );

        let matrix = load_source_predictions(dir.path(), "xgb", 2).unwrap();
        assert_eq!(matrix.shape(), &[6, NUM_CLASSES]);
        for id in 0..6 {
            assert_abs_diff_eq!(matrix[[id, 0]], id as f64 / 10.0, epsilon = 1e-12);
            assert_abs_diff_eq!(
                matrix[[id, 8]],
                id as f64 / 10.0 + 0.08,
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn duplicate_ids_across_folds_are_rejected() {
        let dir = TempDir::new().unwrap();
        write_fold(
            dir.path(),
            "xgb",
            0,
            &fold_csv(&[(0, prob_row(0.0)), (1, prob_row(0.1))]),
        );
        write_fold(
            dir.path(),
            "xgb",
            1,
            &fold_csv(&[(1, prob_row(0.9)), (2, prob_row(0.2))]),
        );

        let err = load_source_predictions(dir.path(), "xgb", 2).unwrap_err();
        match err {
            DataError::MisalignedIds {
                source,
                expected,
                id,
            } => {
                assert_eq!(source, "xgb");
                assert_eq!(expected, 4);
                assert_eq!(id, 1);
            }
            other => panic!("Expected MisalignedIds, got {other:?}"),
        }
    }

    #[test]
    fn gaps_in_the_id_range_are_rejected() {
        let dir = TempDir::new().unwrap();
        write_fold(
            dir.path(),
            "xgb",
            0,
            &fold_csv(&[(0, prob_row(0.0)), (2, prob_row(0.2))]),
        );

        let err = load_source_predictions(dir.path(), "xgb", 1).unwrap_err();
        assert!(matches!(err, DataError::MisalignedIds { id: 2, .. }));
    }

    #[test]
    fn missing_class_column_is_named() {
        let dir = TempDir::new().unwrap();
        let content = "ID,class1,class2,class3,class4,class5,class6,class7,class8\n0,0.1,0.1,0.1,0.1,0.1,0.1,0.1,0.3\n";
        write_fold(dir.path(), "xgb", 0, content);

        let err = load_source_predictions(dir.path(), "xgb", 1).unwrap_err();
        match err {
            DataError::ColumnNotFound(name) => assert_eq!(name, "class9"),
            other => panic!("Expected ColumnNotFound, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_probabilities_are_rejected() {
        let dir = TempDir::new().unwrap();
        let mut row = prob_row(0.1);
        row[3] = f64::NAN;
        write_fold(
            dir.path(),
            "xgb",
            0,
            &fold_csv(&[(0, prob_row(0.0)), (1, row)]),
        );

        let err = load_source_predictions(dir.path(), "xgb", 1).unwrap_err();
        match err {
            DataError::NonFiniteValuesFound(name) => assert_eq!(name, "class4"),
            other => panic!("Expected NonFiniteValuesFound, got {other:?}"),
        }
    }

    #[test]
    fn missing_fold_file_surfaces_as_io_error() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(FOLD_SUBDIR)).unwrap();
        let err = load_source_predictions(dir.path(), "absent", 1).unwrap_err();
        assert!(matches!(err, DataError::IoError(_)));
    }
}
