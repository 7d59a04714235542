// Batch driver
// Converts each input in turn, verifies the written file, and keeps going on failure

use crate::export_npy::load_annotations;
use crate::npy::format_shape;
use crate::pipeline::{convert_mask_to_npy, ConvertOptions};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Inputs converted when none are given on the command line
pub const DEFAULT_INPUTS: [&str; 4] = [
    "samples/ROI 1_1 mask.png",
    "samples/ROI 1_10.png",
    "samples/ROI 1_20.png",
    "samples/ROI 1_62.png",
];

const BANNER_WIDTH: usize = 60;

/// What happened to one input path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Written and reloaded successfully
    Verified { output: PathBuf, contours: usize },
    /// Input did not exist; nothing attempted
    Missing,
    /// Conversion or verification failed with this message
    Failed(String),
}

pub fn default_inputs() -> Vec<PathBuf> {
    DEFAULT_INPUTS.iter().map(PathBuf::from).collect()
}

/// Run the pipeline over every path, in order
pub fn run_batch(inputs: &[PathBuf], options: &ConvertOptions) -> Vec<FileOutcome> {
    inputs.iter().map(|input| process_one(input, options)).collect()
}

fn process_one(input: &Path, options: &ConvertOptions) -> FileOutcome {
    println!("\n{}", "=".repeat(BANNER_WIDTH));
    println!("Processing: {}", input.display());
    println!("{}", "=".repeat(BANNER_WIDTH));

    if !input.exists() {
        println!("Error: File not found: {}", input.display());
        return FileOutcome::Missing;
    }

    match convert_and_verify(input, options) {
        Ok((output, contours)) => FileOutcome::Verified { output, contours },
        Err(err) => {
            println!("Error during conversion of {}: {}", input.display(), err);
            eprintln!("{:?}", err);
            FileOutcome::Failed(format!("{:#}", err))
        }
    }
}

fn convert_and_verify(input: &Path, options: &ConvertOptions) -> Result<(PathBuf, usize)> {
    let output = convert_mask_to_npy(input, None, options)?;
    println!("\nSuccessfully converted {} to {}", input.display(), output.display());

    println!("\nVerifying created NPY file:");
    let loaded = load_annotations(&output)?;
    println!("Loaded array shape: {}", format_shape(&loaded.shape));
    println!("Loaded array dtype: {}", loaded.dtype);
    println!("Number of annotations: {}", loaded.len());

    let mut contours = 0;
    if let Some(record) = loaded.records.first() {
        contours = record.contour_count();
        println!("Timestamp: {}", record.timestamp);
        println!("Action: {}", record.label);
        println!("Number of contours: {}", contours);
    }

    Ok((output, contours))
}

/// (verified, missing, failed) counts of a finished batch
pub fn tally(outcomes: &[FileOutcome]) -> (usize, usize, usize) {
    outcomes.iter().fold((0, 0, 0), |(ok, missing, failed), outcome| match outcome {
        FileOutcome::Verified { .. } => (ok + 1, missing, failed),
        FileOutcome::Missing => (ok, missing + 1, failed),
        FileOutcome::Failed(_) => (ok, missing, failed + 1),
    })
}

/// Closing report for a finished batch
pub fn print_summary(outcomes: &[FileOutcome]) {
    let (verified, missing, failed) = tally(outcomes);
    println!("\nAll conversions completed!");
    println!("Verified: {}, missing: {}, failed: {}", verified, missing, failed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_inputs_are_the_four_samples() {
        let inputs = default_inputs();
        assert_eq!(inputs.len(), 4);
        assert!(inputs.iter().all(|p| p.starts_with("samples")));
        assert_eq!(inputs[0], PathBuf::from("samples/ROI 1_1 mask.png"));
    }

    #[test]
    fn missing_inputs_are_skipped() {
        let inputs = vec![PathBuf::from("definitely/not/here.png")];
        let outcomes = run_batch(&inputs, &ConvertOptions::default());
        assert_eq!(outcomes, vec![FileOutcome::Missing]);
    }

    #[test]
    fn tally_counts_each_outcome() {
        let outcomes = vec![
            FileOutcome::Missing,
            FileOutcome::Failed("bad".into()),
            FileOutcome::Verified {
                output: PathBuf::from("a_seg.npy"),
                contours: 2,
            },
            FileOutcome::Missing,
        ];
        assert_eq!(tally(&outcomes), (1, 2, 1));
        assert_eq!(tally(&[]), (0, 0, 0));
    }
}
