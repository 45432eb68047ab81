#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use ndarray::Array2;
use std::path::{Path, PathBuf};
use std::process;

use oncoblend::combine::{NUM_CLASSES, WeightedSource, combine, multiclass_log_loss};
use oncoblend::data::{DEFAULT_NUM_FOLDS, load_source_predictions};
use oncoblend::dataset::{VariantTable, load_training_table};
use oncoblend::query::{find_example, format_class_table};
use oncoblend::weights::SourceWeights;

#[derive(Args)]
struct InputArgs {
    /// Directory holding the variant tables and the 5fold_cv prediction files
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Path to the TOML file mapping each prediction source to its weight
    #[arg(long, default_value = "data/weights.toml")]
    weights: PathBuf,

    /// Number of cross-validation folds per source
    #[arg(long, default_value_t = DEFAULT_NUM_FOLDS)]
    num_folds: usize,
}

#[derive(Args)]
struct PredictArgs {
    #[command(flatten)]
    inputs: InputArgs,

    /// Gene name to look up
    #[arg(long)]
    gene: String,

    /// Variation name to look up
    #[arg(long)]
    variation: String,

    /// Also print the aggregate train+valid log loss
    #[arg(long)]
    log_loss: bool,
}

#[derive(Args)]
struct EvaluateArgs {
    #[command(flatten)]
    inputs: InputArgs,
}

#[derive(Args)]
struct ExportArgs {
    #[command(flatten)]
    inputs: InputArgs,

    /// Output TSV path for the combined probability matrix
    #[arg(long, default_value = "combined.tsv")]
    output: PathBuf,
}

#[derive(Parser)]
#[command(
    name = "oncoblend",
    about = "Weighted ensemble combination of cross-validated cancer-mutation classifier predictions",
    long_about = "Combines precomputed per-fold classifier probabilities into a weighted, \
                 row-normalized ensemble and reports the predicted class distribution \
                 for a (gene, variation) query."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the predicted class distribution for a (gene, variation) pair
    #[command(about = "Look up the ensemble prediction for a (gene, variation) pair")]
    Predict(PredictArgs),

    /// Score the combined predictions against the ground-truth labels
    #[command(about = "Print the multi-class log loss over all examples")]
    Evaluate(EvaluateArgs),

    /// Write the combined probability matrix to a TSV file
    #[command(about = "Export the combined matrix (outputs: combined.tsv)")]
    Export(ExportArgs),
}

/// The assembled ensemble: the labeled variant table and the combined,
/// row-normalized probability matrix aligned to it by example ID.
struct Ensemble {
    table: VariantTable,
    combined: Array2<f64>,
}

fn build_ensemble(inputs: &InputArgs) -> Result<Ensemble, Box<dyn std::error::Error>> {
    println!("Loading variant tables from: {}", inputs.data_dir.display());
    let table = load_training_table(&inputs.data_dir)?;
    println!("Assembled {} labeled examples", table.len());

    let weights = SourceWeights::load(&inputs.weights)?;
    let mut matrices = Vec::with_capacity(weights.len());
    for (name, weight) in weights.iter() {
        println!(
            "Loading {}-fold predictions for source '{}' (weight {})",
            inputs.num_folds, name, weight
        );
        let matrix = load_source_predictions(&inputs.data_dir, name, inputs.num_folds)?;
        matrices.push((name.to_string(), matrix, weight));
    }

    let sources: Vec<WeightedSource<'_>> = matrices
        .iter()
        .map(|(name, matrix, weight)| WeightedSource {
            name: name.as_str(),
            predictions: matrix.view(),
            weight: *weight,
        })
        .collect();

    let combined = combine(&sources, table.len(), NUM_CLASSES)?;
    Ok(Ensemble { table, combined })
}

fn predict(args: PredictArgs) -> Result<(), Box<dyn std::error::Error>> {
    let ensemble = build_ensemble(&args.inputs)?;

    if args.log_loss {
        let loss = multiclass_log_loss(ensemble.combined.view(), &ensemble.table.labels())?;
        println!();
        println!("train + valid log loss: {loss}");
    }

    match find_example(&ensemble.table, &args.gene, &args.variation) {
        Some(variant) => {
            println!();
            print!(
                "{}",
                format_class_table(variant, ensemble.combined.row(variant.id))
            );
        }
        None => {
            println!("No information for the given gene or variation. Please try again.");
        }
    }
    Ok(())
}

fn evaluate(args: EvaluateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let ensemble = build_ensemble(&args.inputs)?;
    let loss = multiclass_log_loss(ensemble.combined.view(), &ensemble.table.labels())?;
    println!("train + valid log loss: {loss}");
    Ok(())
}

fn export(args: ExportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let ensemble = build_ensemble(&args.inputs)?;
    save_combined_matrix(&ensemble, &args.output)?;
    println!("Combined predictions saved to: {}", args.output.display());
    Ok(())
}

fn save_combined_matrix(ensemble: &Ensemble, output: &Path) -> Result<(), std::io::Error> {
    use std::io::Write;

    let mut file = std::fs::File::create(output)?;
    let class_header = (1..=NUM_CLASSES)
        .map(|c| format!("class{c}"))
        .collect::<Vec<_>>()
        .join("\t");
    writeln!(file, "ID\tGene\tVariation\t{class_header}")?;

    for variant in &ensemble.table.variants {
        let cells: Vec<String> = ensemble
            .combined
            .row(variant.id)
            .iter()
            .map(|p| p.to_string())
            .collect();
        writeln!(
            file,
            "{}\t{}\t{}\t{}",
            variant.id,
            variant.gene,
            variant.variation,
            cells.join("\t")
        )?;
    }
    Ok(())
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Predict(args)) => predict(args),
        Some(Commands::Evaluate(args)) => evaluate(args),
        Some(Commands::Export(args)) => export(args),
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
