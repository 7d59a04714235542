use anyhow::{Context, Result};
use clap::Parser;
use mask2npy::driver::{self, default_inputs};
use mask2npy::ConvertOptions;
use mask2npy_common::DEFAULT_LABEL;
use std::path::PathBuf;

/// Convert binary PNG masks into contour annotation files
#[derive(Parser, Debug)]
#[command(name = "mask2npy")]
#[command(about = "Trace mask contours and save them as .npy annotations", long_about = None)]
struct Args {
    /// Mask images to convert (defaults to the bundled samples)
    inputs: Vec<PathBuf>,

    /// Directory for the generated files (defaults to the working directory)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Action label stored with each annotation
    #[arg(short, long, default_value = DEFAULT_LABEL)]
    label: String,

    /// Also write an SVG preview of the contours
    #[arg(long)]
    svg: bool,

    /// Enable debug mode (save contour overlay images)
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    let inputs = if args.inputs.is_empty() {
        default_inputs()
    } else {
        args.inputs
    };

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    }

    let options = ConvertOptions {
        output_dir: args.output_dir,
        label: args.label,
        svg_preview: args.svg,
        overlay: args.debug,
    };

    let outcomes = driver::run_batch(&inputs, &options);
    driver::print_summary(&outcomes);

    Ok(())
}
