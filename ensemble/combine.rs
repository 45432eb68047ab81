//! # Weighted Ensemble Combination
//!
//! The numeric core of the crate. Every prediction source contributes a
//! matrix of per-example class probabilities and a scalar weight; the
//! combiner accumulates the weighted matrices and row-normalizes the result
//! so that each example's combined scores form a probability distribution.
//!
//! - Determinism: sources are accumulated in the order they are supplied.
//!   Floating-point addition is not associative, so a fixed summation order
//!   is required for bit-identical results across runs.
//! - Purity: inputs are read-only views; the combiner allocates and returns
//!   a new matrix and never mutates its inputs.
//! - Degenerate rows: a row whose weighted sum is zero carries no
//!   information and cannot be normalized. This is reported as an error
//!   naming the row, never as a silent NaN.

use ndarray::{Array2, ArrayView2};
use std::fmt;

/// Number of mutation classes in the classification dataset.
pub const NUM_CLASSES: usize = 9;

/// Smallest predicted probability admitted into the log-loss computation.
/// Matches the clamp used by common ML toolkits so scores are comparable.
pub const PROBABILITY_FLOOR: f64 = 1e-15;

/// One prediction source entering the ensemble: a name used in error
/// reporting, a read-only view of its (num_examples x num_classes)
/// probability matrix, and its scalar weight.
#[derive(Debug, Clone, Copy)]
pub struct WeightedSource<'a> {
    pub name: &'a str,
    pub predictions: ArrayView2<'a, f64>,
    pub weight: f64,
}

/// Errors produced by the combiner and the log-loss metric.
///
/// `Display` and `Error` are implemented by hand because the `source` field
/// of `ShapeMismatch` is a prediction-source name, not an error cause, and
/// `thiserror`'s derive would otherwise treat it as the `Error::source()`.
#[derive(Debug)]
pub enum CombineError {
    EmptySources,
    ShapeMismatch {
        source: String,
        found: (usize, usize),
        expected: (usize, usize),
    },
    DegenerateRow { row: usize },
    LabelCountMismatch { found: usize, expected: usize },
    LabelOutOfRange {
        example: usize,
        label: u8,
        num_classes: usize,
    },
    NoExamples,
}

impl fmt::Display for CombineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombineError::EmptySources => write!(
                f,
                "At least one prediction source is required to form an ensemble."
            ),
            CombineError::ShapeMismatch {
                source,
                found,
                expected,
            } => write!(
                f,
                "Prediction matrix for source '{source}' has shape {found:?}, but every source must supply a {expected:?} matrix."
            ),
            CombineError::DegenerateRow { row } => write!(
                f,
                "Combined probabilities for example {row} sum to zero; no source carries information for this row."
            ),
            CombineError::LabelCountMismatch { found, expected } => {
                write!(f, "Got {found} ground-truth labels for {expected} examples.")
            }
            CombineError::LabelOutOfRange {
                example,
                label,
                num_classes,
            } => write!(
                f,
                "Ground-truth label {label} for example {example} is outside the valid class range 1..={num_classes}."
            ),
            CombineError::NoExamples => write!(
                f,
                "Log loss is undefined for an empty prediction matrix."
            ),
        }
    }
}

impl std::error::Error for CombineError {}

/// Combines the weighted prediction matrices of all sources into a single
/// row-normalized probability matrix.
///
/// Every matrix must have shape (`num_examples`, `num_classes`) with example
/// `i` referring to the same underlying example in every source; callers
/// establish this alignment before matrix construction (see `data`).
pub fn combine(
    sources: &[WeightedSource<'_>],
    num_examples: usize,
    num_classes: usize,
) -> Result<Array2<f64>, CombineError> {
    if sources.is_empty() {
        return Err(CombineError::EmptySources);
    }

    let expected = (num_examples, num_classes);
    let mut accumulator = Array2::<f64>::zeros(expected);
    for source in sources {
        let found = source.predictions.dim();
        if found != expected {
            return Err(CombineError::ShapeMismatch {
                source: source.name.to_string(),
                found,
                expected,
            });
        }
        accumulator.scaled_add(source.weight, &source.predictions);
    }

    for (row, mut values) in accumulator.rows_mut().into_iter().enumerate() {
        let total = values.sum();
        if total == 0.0 {
            return Err(CombineError::DegenerateRow { row });
        }
        values.mapv_inplace(|v| v / total);
    }

    Ok(accumulator)
}

/// Multi-class log loss of a probability matrix against 1-based class labels:
/// `-mean(ln p_true)` with each `p_true` clamped away from 0 and 1.
pub fn multiclass_log_loss(
    probabilities: ArrayView2<'_, f64>,
    labels: &[u8],
) -> Result<f64, CombineError> {
    let (num_examples, num_classes) = probabilities.dim();
    if num_examples == 0 {
        return Err(CombineError::NoExamples);
    }
    if labels.len() != num_examples {
        return Err(CombineError::LabelCountMismatch {
            found: labels.len(),
            expected: num_examples,
        });
    }

    let mut total = 0.0;
    for (example, (&label, row)) in labels.iter().zip(probabilities.rows()).enumerate() {
        if label == 0 || label as usize > num_classes {
            return Err(CombineError::LabelOutOfRange {
                example,
                label,
                num_classes,
            });
        }
        let p = row[label as usize - 1].clamp(PROBABILITY_FLOOR, 1.0 - PROBABILITY_FLOOR);
        total -= p.ln();
    }
    Ok(total / num_examples as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn source<'a>(name: &'a str, predictions: &'a Array2<f64>, weight: f64) -> WeightedSource<'a> {
        WeightedSource {
            name,
            predictions: predictions.view(),
            weight,
        }
    }

    #[test]
    fn every_output_row_sums_to_one() {
        let a = array![[0.7, 0.2, 0.1], [0.05, 0.9, 0.05], [0.3, 0.3, 0.4]];
        let b = array![[0.5, 0.25, 0.25], [0.1, 0.1, 0.8], [0.6, 0.2, 0.2]];
        let combined = combine(&[source("a", &a, 0.35), source("b", &b, 0.65)], 3, 3).unwrap();
        for row in combined.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn single_source_yields_its_own_normalized_rows() {
        let a = array![[2.0, 1.0, 1.0], [0.0, 3.0, 1.0]];
        let combined = combine(&[source("only", &a, 1.0)], 2, 3).unwrap();
        let expected = array![[0.5, 0.25, 0.25], [0.0, 0.75, 0.25]];
        for (&got, &want) in combined.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn uniform_weight_scaling_cancels_out() {
        let a = array![[0.7, 0.2, 0.1], [0.05, 0.9, 0.05]];
        let b = array![[0.5, 0.25, 0.25], [0.1, 0.1, 0.8]];
        let base = combine(&[source("a", &a, 0.3), source("b", &b, 0.7)], 2, 3).unwrap();
        let scaled = combine(&[source("a", &a, 0.3 * 7.5), source("b", &b, 0.7 * 7.5)], 2, 3)
            .unwrap();
        for (&got, &want) in scaled.iter().zip(base.iter()) {
            assert_abs_diff_eq!(got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn source_order_does_not_change_the_result() {
        let a = array![[0.7, 0.2, 0.1], [0.05, 0.9, 0.05]];
        let b = array![[0.5, 0.25, 0.25], [0.1, 0.1, 0.8]];
        let c = array![[0.2, 0.3, 0.5], [0.4, 0.4, 0.2]];
        let forward = combine(
            &[source("a", &a, 0.2), source("b", &b, 0.3), source("c", &c, 0.5)],
            2,
            3,
        )
        .unwrap();
        let reversed = combine(
            &[source("c", &c, 0.5), source("b", &b, 0.3), source("a", &a, 0.2)],
            2,
            3,
        )
        .unwrap();
        for (&got, &want) in reversed.iter().zip(forward.iter()) {
            assert_abs_diff_eq!(got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn all_zero_row_is_reported_not_divided() {
        let a = array![[0.5, 0.5], [0.0, 0.0]];
        let b = array![[0.25, 0.75], [0.0, 0.0]];
        let err = combine(&[source("a", &a, 0.5), source("b", &b, 0.5)], 2, 2).unwrap_err();
        match err {
            CombineError::DegenerateRow { row } => assert_eq!(row, 1),
            other => panic!("Expected DegenerateRow, got {other:?}"),
        }
    }

    #[test]
    fn two_source_worked_example() {
        let a = array![[1.0, 0.0, 0.0], [0.0, 2.0, 0.0]];
        let b = array![[1.0, 2.0, 1.0], [0.0, 0.0, 4.0]];
        let combined = combine(&[source("a", &a, 0.5), source("b", &b, 0.5)], 2, 3).unwrap();
        let expected = array![
            [0.4, 0.4, 0.2],
            [0.0, 1.0 / 3.0, 2.0 / 3.0]
        ];
        for (&got, &want) in combined.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn empty_source_list_is_rejected() {
        let err = combine(&[], 2, 3).unwrap_err();
        assert!(matches!(err, CombineError::EmptySources));
    }

    #[test]
    fn shape_mismatch_names_the_offending_source() {
        let a = array![[0.5, 0.5], [0.25, 0.75]];
        let b = array![[0.5, 0.25, 0.25], [0.1, 0.1, 0.8]];
        let err = combine(&[source("a", &a, 0.5), source("wide", &b, 0.5)], 2, 2).unwrap_err();
        match err {
            CombineError::ShapeMismatch {
                source,
                found,
                expected,
            } => {
                assert_eq!(source, "wide");
                assert_eq!(found, (2, 3));
                assert_eq!(expected, (2, 2));
            }
            other => panic!("Expected ShapeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn log_loss_of_uniform_predictions_is_ln_num_classes() {
        let third = 1.0 / 3.0;
        let probs = array![[third, third, third], [third, third, third]];
        let loss = multiclass_log_loss(probs.view(), &[1, 3]).unwrap();
        assert_abs_diff_eq!(loss, 3.0f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn log_loss_clamps_zero_probabilities() {
        let probs = array![[0.0, 1.0]];
        let loss = multiclass_log_loss(probs.view(), &[1]).unwrap();
        assert_abs_diff_eq!(loss, -PROBABILITY_FLOOR.ln(), epsilon = 1e-9);
        assert!(loss.is_finite());
    }

    #[test]
    fn log_loss_rejects_out_of_range_labels() {
        let probs = array![[0.5, 0.5]];
        let err = multiclass_log_loss(probs.view(), &[3]).unwrap_err();
        match err {
            CombineError::LabelOutOfRange {
                example,
                label,
                num_classes,
            } => {
                assert_eq!(example, 0);
                assert_eq!(label, 3);
                assert_eq!(num_classes, 2);
            }
            other => panic!("Expected LabelOutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn log_loss_rejects_mismatched_label_count() {
        let probs = array![[0.5, 0.5], [0.5, 0.5]];
        let err = multiclass_log_loss(probs.view(), &[1]).unwrap_err();
        assert!(matches!(
            err,
            CombineError::LabelCountMismatch {
                found: 1,
                expected: 2
            }
        ));
    }
}
