//! (gene, variation) lookup against the variant table, and the class-table
//! report printed for a matched example.

use ndarray::{Array1, ArrayView1};

use crate::dataset::{LabeledVariant, VariantTable};

/// Finds the example matching a (gene, variation) pair exactly. A miss is
/// informational, not an error; callers decide how to report it.
pub fn find_example<'a>(
    table: &'a VariantTable,
    gene: &str,
    variation: &str,
) -> Option<&'a LabeledVariant> {
    table
        .variants
        .iter()
        .find(|v| v.gene == gene && v.variation == variation)
}

/// One-hot encoding of a 1-based class label.
pub fn one_hot_ground_truth(class: u8, num_classes: usize) -> Array1<f64> {
    let mut truth = Array1::zeros(num_classes);
    truth[class as usize - 1] = 1.0;
    truth
}

/// Formats the per-class prediction table for a matched example: header line
/// identifying the example, then one row per class with the predicted
/// probability next to the one-hot ground truth.
pub fn format_class_table(variant: &LabeledVariant, predicted: ArrayView1<'_, f64>) -> String {
    let truth = one_hot_ground_truth(variant.class, predicted.len());

    let mut out = format!(
        "ID: {} Gene: {} Variation: {}\n",
        variant.id, variant.gene, variant.variation
    );
    out.push_str(&format!(
        "{:^10} {:^20} {:<20}\n",
        "class", "prediction", "groundtruth"
    ));
    for class in 0..predicted.len() {
        out.push_str(&format!(
            "{:^10} {:<25} {:<3}\n",
            class + 1,
            predicted[class],
            truth[class]
        ));
    }
    out
}
