// SVG export module
// Writes a pixel-space preview of traced contours next to the .npy output

use anyhow::{Context, Result};
use mask2npy_common::Contour;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Export contours to an SVG file sized to the mask
/// x is the column coordinate and y the row, both in pixels
pub fn export_svg(contours: &[Contour], rows: usize, cols: usize, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    let mut file = BufWriter::new(file);

    // SVG header with a viewBox covering the whole mask
    writeln!(file, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(file, r#"<svg xmlns="http://www.w3.org/2000/svg" version="1.1""#)?;
    writeln!(file, r#"     width="{}" height="{}""#, cols, rows)?;
    writeln!(file, r#"     viewBox="0 0 {} {}">"#, cols, rows)?;
    writeln!(file)?;

    writeln!(file, r#"  <title>mask2npy - Mask Contours</title>"#)?;
    writeln!(file, r#"  <desc>Iso-contours of a binary mask at level 0.5. Units: pixels</desc>"#)?;
    writeln!(file, r#"  <rect width="{}" height="{}" fill="white" />"#, cols, rows)?;
    writeln!(file)?;

    for (idx, contour) in contours.iter().enumerate() {
        let Some((first, rest)) = contour.points.split_first() else {
            continue;
        };

        write!(file, r#"  <path id="contour-{}" "#, idx + 1)?;
        write!(file, r#"stroke="red" stroke-width="0.5" fill="none" "#)?;
        write!(file, r#"d=""#)?;

        write!(file, "M {:.2},{:.2} ", first.col, first.row)?;
        for pt in rest {
            write!(file, "L {:.2},{:.2} ", pt.col, pt.row)?;
        }

        if contour.closed {
            write!(file, "Z")?;
        }

        writeln!(file, r#"" />"#)?;
    }

    writeln!(file)?;
    writeln!(file, "</svg>")?;
    file.flush()?;

    println!("Exported {} contour(s) to SVG: {}", contours.len(), output_path.display());

    Ok(())
}
