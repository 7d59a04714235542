// Mask loading module
// Decodes an image file into a rows x cols x channels grid of raw samples

use crate::npy::format_shape;
use anyhow::{Context, Result};
use image::{DynamicImage, ImageReader};
use mask2npy_common::SampleType;
use ndarray::Array3;
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Raw samples of a decoded image, shaped (rows, cols, channels)
#[derive(Debug, Clone)]
pub struct SampleGrid {
    pub samples: Array3<f64>,
    pub sample_type: SampleType,
}

impl SampleGrid {
    /// Build a grid from a decoded image, keeping its native element type
    pub fn from_dynamic(img: &DynamicImage) -> Result<Self> {
        let (w, h) = (img.width(), img.height());
        let grid = match img {
            DynamicImage::ImageLuma8(buf) => (grid_from_raw(w, h, 1, buf.as_raw())?, SampleType::U8),
            DynamicImage::ImageLumaA8(buf) => (grid_from_raw(w, h, 2, buf.as_raw())?, SampleType::U8),
            DynamicImage::ImageRgb8(buf) => (grid_from_raw(w, h, 3, buf.as_raw())?, SampleType::U8),
            DynamicImage::ImageRgba8(buf) => (grid_from_raw(w, h, 4, buf.as_raw())?, SampleType::U8),
            DynamicImage::ImageLuma16(buf) => (grid_from_raw(w, h, 1, buf.as_raw())?, SampleType::U16),
            DynamicImage::ImageLumaA16(buf) => (grid_from_raw(w, h, 2, buf.as_raw())?, SampleType::U16),
            DynamicImage::ImageRgb16(buf) => (grid_from_raw(w, h, 3, buf.as_raw())?, SampleType::U16),
            DynamicImage::ImageRgba16(buf) => (grid_from_raw(w, h, 4, buf.as_raw())?, SampleType::U16),
            DynamicImage::ImageRgb32F(buf) => (grid_from_raw(w, h, 3, buf.as_raw())?, SampleType::F32),
            DynamicImage::ImageRgba32F(buf) => (grid_from_raw(w, h, 4, buf.as_raw())?, SampleType::F32),
            other => {
                let buf = other.to_rgba32f();
                (grid_from_raw(w, h, 4, buf.as_raw())?, SampleType::F32)
            }
        };

        Ok(Self {
            samples: grid.0,
            sample_type: grid.1,
        })
    }

    pub fn rows(&self) -> usize {
        self.samples.dim().0
    }

    pub fn cols(&self) -> usize {
        self.samples.dim().1
    }

    pub fn channels(&self) -> usize {
        self.samples.dim().2
    }

    /// Shape as numpy reports it: single-channel grids are 2D
    pub fn shape(&self) -> Vec<usize> {
        let (rows, cols, channels) = self.samples.dim();
        if channels == 1 {
            vec![rows, cols]
        } else {
            vec![rows, cols, channels]
        }
    }

    /// Sorted distinct sample values
    pub fn unique_values(&self) -> Vec<f64> {
        let mut values: Vec<f64> = self.samples.iter().copied().collect();
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
        values
    }
}

fn grid_from_raw<T>(width: u32, height: u32, channels: usize, raw: &[T]) -> Result<Array3<f64>>
where
    T: Copy + Into<f64>,
{
    let data: Vec<f64> = raw.iter().map(|&s| s.into()).collect();
    Array3::from_shape_vec((height as usize, width as usize, channels), data)
        .context("Sample buffer does not match image dimensions")
}

/// PNG layouts Pillow keeps unexpanded: palette indices and 1-bit greyscale
///
/// Returns `None` for anything else (including non-PNG files) so the caller
/// falls back to the regular decoder.
fn read_packed_png(path: &Path) -> Result<Option<SampleGrid>> {
    let mut signature = [0u8; PNG_SIGNATURE.len()];
    let mut file = File::open(path).with_context(|| format!("Failed to open image: {}", path.display()))?;
    if file.read_exact(&mut signature).is_err() || signature != PNG_SIGNATURE {
        return Ok(None);
    }
    file.rewind()?;

    let mut decoder = png::Decoder::new(BufReader::new(file));
    decoder.set_transformations(png::Transformations::IDENTITY);
    let mut reader = decoder
        .read_info()
        .with_context(|| format!("Failed to decode image: {}", path.display()))?;

    let sample_type = match (reader.info().color_type, reader.info().bit_depth) {
        (png::ColorType::Indexed, _) => SampleType::U8,
        (png::ColorType::Grayscale, png::BitDepth::One) => SampleType::Bool,
        _ => return Ok(None),
    };

    let mut buf = vec![0u8; reader.output_buffer_size()];
    let frame = reader
        .next_frame(&mut buf)
        .with_context(|| format!("Failed to decode image: {}", path.display()))?;

    let samples = unpack_rows(
        &buf,
        frame.width as usize,
        frame.height as usize,
        frame.line_size,
        frame.bit_depth as u8,
    );
    let samples = grid_from_raw(frame.width, frame.height, 1, &samples)?;
    Ok(Some(SampleGrid { samples, sample_type }))
}

/// Split packed scanlines (1, 2, 4 or 8 bits per sample, MSB first) into one byte per sample
fn unpack_rows(data: &[u8], width: usize, height: usize, line_size: usize, bit_depth: u8) -> Vec<u8> {
    let bits = usize::from(bit_depth);
    let mask = if bits >= 8 { 0xff } else { (1u8 << bits) - 1 };

    let mut out = Vec::with_capacity(width * height);
    for line in data.chunks(line_size).take(height) {
        for x in 0..width {
            let bit = x * bits;
            let shift = 8 - bits - bit % 8;
            out.push((line[bit / 8] >> shift) & mask);
        }
    }
    out
}

fn decode_image(path: &Path) -> Result<DynamicImage> {
    // Detect the format from the file content, not the extension
    let img = ImageReader::open(path)
        .with_context(|| format!("Failed to open image: {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("Failed to read image: {}", path.display()))?
        .decode()
        .with_context(|| format!("Failed to decode image: {}", path.display()))?;
    Ok(img)
}

/// Load a mask image from disk and report its shape, type and values
pub fn load_mask(path: &Path) -> Result<SampleGrid> {
    println!("Loading PNG mask from: {}", path.display());

    let grid = match read_packed_png(path)? {
        Some(grid) => grid,
        None => SampleGrid::from_dynamic(&decode_image(path)?)?,
    };

    println!("Mask shape: {}", format_shape(&grid.shape()));
    println!("Mask dtype: {}", grid.sample_type);
    let unique: Vec<String> = grid.unique_values().iter().map(|v| v.to_string()).collect();
    println!("Unique values: [{}]", unique.join(" "));

    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

    #[test]
    fn luma_image_is_two_dimensional() {
        let img: GrayImage = ImageBuffer::from_fn(5, 3, |x, _y| Luma([if x > 2 { 255 } else { 0 }]));
        let grid = SampleGrid::from_dynamic(&DynamicImage::ImageLuma8(img)).unwrap();

        assert_eq!(grid.shape(), vec![3, 5]);
        assert_eq!(grid.sample_type, SampleType::U8);
        assert_eq!(grid.samples[[0, 4, 0]], 255.0);
        assert_eq!(grid.samples[[2, 0, 0]], 0.0);
        assert_eq!(grid.unique_values(), vec![0.0, 255.0]);
    }

    #[test]
    fn rgb_image_keeps_channel_axis() {
        let img: RgbImage = ImageBuffer::from_fn(2, 2, |_x, _y| Rgb([1, 2, 3]));
        let grid = SampleGrid::from_dynamic(&DynamicImage::ImageRgb8(img)).unwrap();

        assert_eq!(grid.shape(), vec![2, 2, 3]);
        assert_eq!(grid.samples[[1, 1, 2]], 3.0);
    }

    #[test]
    fn sixteen_bit_samples_keep_their_range() {
        let img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_fn(1, 1, |_x, _y| Luma([65535]));
        let grid = SampleGrid::from_dynamic(&DynamicImage::ImageLuma16(img)).unwrap();

        assert_eq!(grid.sample_type, SampleType::U16);
        assert_eq!(grid.samples[[0, 0, 0]], 65535.0);
    }

    #[test]
    fn packed_rows_are_split_per_sample() {
        // two 5-pixel rows at 1 bit, padded to a byte each
        let one_bit = [0b1010_1000, 0b0111_1000];
        assert_eq!(unpack_rows(&one_bit, 5, 2, 1, 1), vec![1, 0, 1, 0, 1, 0, 1, 1, 1, 1]);

        let two_bit = [0b1110_0100];
        assert_eq!(unpack_rows(&two_bit, 4, 1, 1, 2), vec![3, 2, 1, 0]);

        let eight_bit = [7, 9, 0, 4];
        assert_eq!(unpack_rows(&eight_bit, 2, 2, 2, 8), vec![7, 9, 0, 4]);
    }

    fn write_png(path: &Path, color: png::ColorType, depth: png::BitDepth, rows: &[u8]) {
        let file = File::create(path).unwrap();
        let mut encoder = png::Encoder::new(std::io::BufWriter::new(file), 4, 2);
        encoder.set_color(color);
        encoder.set_depth(depth);
        if color == png::ColorType::Indexed {
            encoder.set_palette(vec![0, 0, 0, 255, 255, 255, 255, 0, 0]);
        }
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(rows).unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn indexed_png_keeps_palette_indices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexed.png");
        write_png(&path, png::ColorType::Indexed, png::BitDepth::Eight, &[0, 1, 1, 0, 2, 0, 0, 1]);

        let grid = load_mask(&path).unwrap();
        assert_eq!(grid.shape(), vec![2, 4]);
        assert_eq!(grid.sample_type, SampleType::U8);
        assert_eq!(grid.samples[[0, 1, 0]], 1.0);
        assert_eq!(grid.samples[[1, 0, 0]], 2.0);
        assert_eq!(grid.unique_values(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn one_bit_greyscale_loads_as_bool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bilevel.png");
        write_png(&path, png::ColorType::Grayscale, png::BitDepth::One, &[0b0110_0000, 0b1000_0000]);

        let grid = load_mask(&path).unwrap();
        assert_eq!(grid.shape(), vec![2, 4]);
        assert_eq!(grid.sample_type, SampleType::Bool);
        assert_eq!(grid.unique_values(), vec![0.0, 1.0]);
        assert_eq!(grid.samples[[0, 1, 0]], 1.0);
        assert_eq!(grid.samples[[1, 0, 0]], 1.0);
        assert_eq!(grid.samples[[1, 1, 0]], 0.0);
    }

    #[test]
    fn format_comes_from_content_not_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.dat");
        let img: RgbImage = ImageBuffer::from_fn(3, 2, |x, _y| Rgb([x as u8, 0, 0]));
        img.save_with_format(&path, image::ImageFormat::Png).unwrap();

        let grid = load_mask(&path).unwrap();
        assert_eq!(grid.shape(), vec![2, 3, 3]);
        assert_eq!(grid.samples[[1, 2, 0]], 2.0);
    }
}
