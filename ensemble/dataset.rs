//! # Variant Table Assembly
//!
//! Builds the labeled (gene, variation) table the ensemble predictions are
//! aligned against. Two inputs are merged:
//!
//! - the stage-1 training variants (`stage1_variants`: ID, Gene, Variation,
//!   Class), whose IDs must already equal their row positions, and
//! - the filtered stage-1 solution (`stage1_solution_filtered.csv`), a
//!   one-hot table over stage-2 test variants (`stage2_variants`). Each
//!   solution row is decoded to a class label, joined to its stage-2 variant
//!   by ID, and appended with a fresh sequential ID continuing after the
//!   stage-1 table.
//!
//! Row position equals example ID in the resulting table; that is the
//! alignment contract shared with the fold-prediction loader.

use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::combine::NUM_CLASSES;
use crate::data::{
    DataError, class_column_names, extract_id_column, extract_numeric_column,
    extract_string_column, read_csv, require_columns,
};

/// One labeled example: row position in the combined matrix equals `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledVariant {
    pub id: usize,
    pub gene: String,
    pub variation: String,
    /// 1-based class label (1..=9).
    pub class: u8,
}

/// The assembled training table, ordered by example ID.
#[derive(Debug, Clone)]
pub struct VariantTable {
    pub variants: Vec<LabeledVariant>,
}

impl VariantTable {
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Ground-truth labels in example order, for log-loss scoring.
    pub fn labels(&self) -> Vec<u8> {
        self.variants.iter().map(|v| v.class).collect()
    }
}

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(
        "IDs in '{file}' must equal the row position: row {position} has ID {id}. The table must be saved in ID order without gaps."
    )]
    NonSequentialIds {
        file: String,
        position: usize,
        id: i64,
    },
    #[error("Class label {class} for ID {id} in '{file}' is outside the valid range 1..={NUM_CLASSES}.")]
    InvalidClassLabel { file: String, id: i64, class: i64 },
    #[error(
        "Solution row for ID {id} sets {set} class flags; exactly one class must be marked."
    )]
    AmbiguousSolution { id: i64, set: usize },
    #[error(
        "The stage-1 solution references ID {id}, which does not exist in the stage-2 variants table."
    )]
    UnknownSolutionId { id: i64 },
}

/// File names within the data directory, as produced by the upstream
/// competition pipeline.
const STAGE1_VARIANTS: &str = "stage1_variants";
const STAGE2_VARIANTS: &str = "stage2_variants";
const STAGE1_SOLUTION: &str = "stage1_solution_filtered.csv";

/// Loads and merges the stage-1 variants with the solution-labeled stage-2
/// variants into one contiguous, labeled table.
pub fn load_training_table(data_dir: &Path) -> Result<VariantTable, DatasetError> {
    let stage1 = load_stage1_variants(&data_dir.join(STAGE1_VARIANTS))?;
    let stage2 = load_stage2_variants(&data_dir.join(STAGE2_VARIANTS))?;
    let solution = load_stage1_solution(&data_dir.join(STAGE1_SOLUTION))?;

    let table = assemble(stage1, &stage2, &solution)?;
    log::info!(
        "Assembled variant table: {} examples ({} from the stage-1 solution)",
        table.len(),
        solution.len()
    );
    Ok(table)
}

fn load_stage1_variants(path: &Path) -> Result<Vec<LabeledVariant>, DatasetError> {
    let df = read_csv(path)?;
    require_columns(
        &df,
        &["ID", "Gene", "Variation", "Class"].map(String::from),
    )?;

    let ids = extract_id_column(&df, "ID")?;
    let genes = extract_string_column(&df, "Gene")?;
    let variations = extract_string_column(&df, "Variation")?;
    let classes = extract_id_column(&df, "Class")?;

    let mut variants = Vec::with_capacity(ids.len());
    for (position, &id) in ids.iter().enumerate() {
        if id != position as i64 {
            return Err(DatasetError::NonSequentialIds {
                file: STAGE1_VARIANTS.to_string(),
                position,
                id,
            });
        }
        let class = classes[position];
        if !(1..=NUM_CLASSES as i64).contains(&class) {
            return Err(DatasetError::InvalidClassLabel {
                file: STAGE1_VARIANTS.to_string(),
                id,
                class,
            });
        }
        variants.push(LabeledVariant {
            id: position,
            gene: genes[position].clone(),
            variation: variations[position].clone(),
            class: class as u8,
        });
    }
    Ok(variants)
}

fn load_stage2_variants(path: &Path) -> Result<HashMap<i64, (String, String)>, DatasetError> {
    let df = read_csv(path)?;
    require_columns(&df, &["ID", "Gene", "Variation"].map(String::from))?;

    let ids = extract_id_column(&df, "ID")?;
    let genes = extract_string_column(&df, "Gene")?;
    let variations = extract_string_column(&df, "Variation")?;

    Ok(ids
        .iter()
        .enumerate()
        .map(|(i, &id)| (id, (genes[i].clone(), variations[i].clone())))
        .collect())
}

/// Decodes each one-hot solution row into a (stage-2 ID, class label) pair.
fn load_stage1_solution(path: &Path) -> Result<Vec<(i64, u8)>, DatasetError> {
    use itertools::Itertools;

    let df = read_csv(path)?;
    let class_names = class_column_names();
    let mut required: Vec<String> = vec!["ID".to_string()];
    required.extend(class_names.iter().cloned());
    require_columns(&df, &required)?;

    let ids = extract_id_column(&df, "ID")?;
    let mut columns = Vec::with_capacity(NUM_CLASSES);
    for name in &class_names {
        columns.push(extract_numeric_column(&df, name)?);
    }

    let mut labels = Vec::with_capacity(ids.len());
    for (i, &id) in ids.iter().enumerate() {
        let class = match (0..NUM_CLASSES).filter(|&c| columns[c][i] != 0.0).exactly_one() {
            Ok(class) => (class + 1) as u8,
            Err(others) => {
                return Err(DatasetError::AmbiguousSolution {
                    id,
                    set: others.count(),
                });
            }
        };
        labels.push((id, class));
    }
    Ok(labels)
}

/// Appends the solution-labeled stage-2 variants after the stage-1 table,
/// assigning sequential IDs starting at the stage-1 length.
fn assemble(
    mut variants: Vec<LabeledVariant>,
    stage2: &HashMap<i64, (String, String)>,
    solution: &[(i64, u8)],
) -> Result<VariantTable, DatasetError> {
    let offset = variants.len();
    variants.reserve(solution.len());
    for (i, &(id, class)) in solution.iter().enumerate() {
        let (gene, variation) = stage2
            .get(&id)
            .ok_or(DatasetError::UnknownSolutionId { id })?;
        variants.push(LabeledVariant {
            id: offset + i,
            gene: gene.clone(),
            variation: variation.clone(),
            class,
        });
    }
    Ok(VariantTable { variants })
}
