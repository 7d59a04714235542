// Conversion pipeline
// load -> binarize -> trace -> pack -> save, for a single mask file

use crate::annotation::{pack_annotation, timestamp_now};
use crate::binarize::{binarize, MaskKind};
use crate::export_npy::{default_output_path, save_annotation, OUTPUT_SUFFIX};
use crate::export_svg::export_svg;
use crate::loading::load_mask;
use crate::overlay::save_overlay;
use crate::tracing::trace_mask;
use anyhow::Result;
use mask2npy_common::DEFAULT_LABEL;
use ndarray::Axis;
use std::path::{Path, PathBuf};

/// Knobs for a conversion run
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Directory for generated files; `None` means the working directory
    pub output_dir: Option<PathBuf>,
    /// Action label stored in the record
    pub label: String,
    /// Also write `<stem>_seg.svg`
    pub svg_preview: bool,
    /// Also write `<stem>_seg_overlay.png`
    pub overlay: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            output_dir: None,
            label: DEFAULT_LABEL.to_string(),
            svg_preview: false,
            overlay: false,
        }
    }
}

/// Where the `.npy` for `input` goes: the explicit path if given,
/// otherwise `<stem>_seg.npy` under the output directory
pub fn resolve_output_path(input: &Path, explicit: Option<&Path>, options: &ConvertOptions) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let name = default_output_path(input);
            match &options.output_dir {
                Some(dir) => dir.join(name),
                None => name,
            }
        }
    }
}

fn sidecar_path(output_path: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| OUTPUT_SUFFIX.trim_start_matches('_').to_string());
    output_path.with_file_name(format!("{}{}.{}", stem, suffix, extension))
}

/// Convert one mask image into an annotation `.npy` file
/// Returns the path written.
pub fn convert_mask_to_npy(input: &Path, output: Option<&Path>, options: &ConvertOptions) -> Result<PathBuf> {
    let grid = load_mask(input)?;

    println!("{}", MaskKind::classify(grid.unique_values().len()).describe());

    let mask = binarize(&grid.samples);
    let contours = trace_mask(&mask)?;
    println!("Found {} contours", contours.len());

    let record = pack_annotation(&contours, timestamp_now(), &options.label);

    let output_path = resolve_output_path(input, output, options);
    save_annotation(&record, &output_path)?;

    if options.svg_preview {
        export_svg(&contours, grid.rows(), grid.cols(), &sidecar_path(&output_path, "", "svg"))?;
    }
    if options.overlay {
        // trace_mask only succeeds on single-channel masks
        let plane = mask.index_axis(Axis(2), 0);
        save_overlay(plane, &contours, &sidecar_path(&output_path, "_overlay", "png"))?;
    }

    println!("Conversion complete! Saved to: {}", output_path.display());
    Ok(output_path)
}
