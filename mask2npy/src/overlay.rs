// Debug overlay
// Renders the binarized mask with its traced contours drawn on top

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use mask2npy_common::Contour;
use ndarray::ArrayView2;
use std::path::Path;

const FOREGROUND: Rgb<u8> = Rgb([96, 96, 96]);
const CONTOUR_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const START_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Mask pixels in grey, contours in red, contour start points in green
pub fn render_overlay(mask: ArrayView2<u8>, contours: &[Contour]) -> RgbImage {
    let (rows, cols) = mask.dim();
    let mut img = RgbImage::from_fn(cols as u32, rows as u32, |x, y| {
        if mask[[y as usize, x as usize]] > 0 {
            FOREGROUND
        } else {
            Rgb([0, 0, 0])
        }
    });

    for contour in contours {
        for pair in contour.points.windows(2) {
            draw_line_segment_mut(
                &mut img,
                (pair[0].col as f32, pair[0].row as f32),
                (pair[1].col as f32, pair[1].row as f32),
                CONTOUR_COLOR,
            );
        }
        if let Some(start) = contour.points.first() {
            draw_filled_circle_mut(&mut img, (start.col as i32, start.row as i32), 1, START_COLOR);
        }
    }

    img
}

pub fn save_overlay(mask: ArrayView2<u8>, contours: &[Contour], output_path: &Path) -> Result<()> {
    render_overlay(mask, contours)
        .save(output_path)
        .with_context(|| format!("Failed to save overlay {}", output_path.display()))?;
    println!("Saved contour overlay to: {}", output_path.display());
    Ok(())
}
