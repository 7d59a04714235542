// Contour tracing module
// Marching squares at a fixed iso-level, with segments joined into ordered polylines

use log::debug;
use mask2npy_common::{Contour, PixelPoint};
use ndarray::{Array3, ArrayView2, Axis};
use std::collections::{BTreeMap, HashMap, VecDeque};
use thiserror::Error;

/// Iso-level separating background (0) from foreground (1)
pub const MASK_LEVEL: f64 = 0.5;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("only 2D arrays are supported, got shape {0:?}")]
    NotTwoDimensional(Vec<usize>),
}

type Segment = (PixelPoint, PixelPoint);
type PointKey = (u64, u64);

/// Trace the boundaries of a 0/1 mask
/// The mask must have a single channel.
pub fn trace_mask(mask: &Array3<u8>) -> Result<Vec<Contour>, TraceError> {
    let (rows, cols, channels) = mask.dim();
    if channels != 1 {
        return Err(TraceError::NotTwoDimensional(vec![rows, cols, channels]));
    }

    let grid = mask.index_axis(Axis(2), 0).mapv(f64::from);
    Ok(find_contours(grid.view(), MASK_LEVEL))
}

/// Find iso-contours of `grid` at `level`
///
/// Cells are scanned row-major; saddle cells keep the low values connected.
/// Contours are returned in the order their first segment was found, so they
/// run top to bottom, left to right. Contours that leave the grid stay open,
/// all others end on their starting point.
pub fn find_contours(grid: ArrayView2<f64>, level: f64) -> Vec<Contour> {
    let segments = contour_segments(grid, level);
    let contours = assemble_contours(&segments);
    debug!(
        "Traced {} segment(s) into {} contour(s) at level {}",
        segments.len(),
        contours.len(),
        level
    );
    contours
}

fn fraction(from: f64, to: f64, level: f64) -> f64 {
    if to == from {
        return 0.0;
    }
    (level - from) / (to - from)
}

fn contour_segments(grid: ArrayView2<f64>, level: f64) -> Vec<Segment> {
    let (rows, cols) = grid.dim();
    let mut segments = Vec::new();

    for r0 in 0..rows.saturating_sub(1) {
        for c0 in 0..cols.saturating_sub(1) {
            let (r1, c1) = (r0 + 1, c0 + 1);
            let ul = grid[[r0, c0]];
            let ur = grid[[r0, c1]];
            let ll = grid[[r1, c0]];
            let lr = grid[[r1, c1]];

            if ul.is_nan() || ur.is_nan() || ll.is_nan() || lr.is_nan() {
                continue;
            }

            let mut case = 0u8;
            if ul > level {
                case |= 1;
            }
            if ur > level {
                case |= 2;
            }
            if ll > level {
                case |= 4;
            }
            if lr > level {
                case |= 8;
            }

            if case == 0 || case == 15 {
                continue;
            }

            let (r0f, c0f) = (r0 as f64, c0 as f64);
            let top = PixelPoint::new(r0f, c0f + fraction(ul, ur, level));
            let bottom = PixelPoint::new(r1 as f64, c0f + fraction(ll, lr, level));
            let left = PixelPoint::new(r0f + fraction(ul, ll, level), c0f);
            let right = PixelPoint::new(r0f + fraction(ur, lr, level), c1 as f64);

            match case {
                1 => segments.push((top, left)),
                2 => segments.push((right, top)),
                3 => segments.push((right, left)),
                4 => segments.push((left, bottom)),
                5 => segments.push((top, bottom)),
                6 => {
                    segments.push((right, top));
                    segments.push((left, bottom));
                }
                7 => segments.push((right, bottom)),
                8 => segments.push((bottom, right)),
                9 => {
                    segments.push((top, left));
                    segments.push((bottom, right));
                }
                10 => segments.push((bottom, top)),
                11 => segments.push((bottom, left)),
                12 => segments.push((left, right)),
                13 => segments.push((top, right)),
                14 => segments.push((left, top)),
                _ => {}
            }
        }
    }

    segments
}

fn key(p: PixelPoint) -> PointKey {
    // +0.0 folds -0.0 into 0.0
    ((p.row + 0.0).to_bits(), (p.col + 0.0).to_bits())
}

fn register(
    starts: &mut HashMap<PointKey, usize>,
    ends: &mut HashMap<PointKey, usize>,
    points: &VecDeque<PixelPoint>,
    index: usize,
) {
    if let (Some(first), Some(last)) = (points.front(), points.back()) {
        starts.insert(key(*first), index);
        ends.insert(key(*last), index);
    }
}

/// Join directed segments end-to-start into polylines
fn assemble_contours(segments: &[Segment]) -> Vec<Contour> {
    let mut next_index = 0usize;
    let mut contours: BTreeMap<usize, VecDeque<PixelPoint>> = BTreeMap::new();
    let mut starts: HashMap<PointKey, usize> = HashMap::new();
    let mut ends: HashMap<PointKey, usize> = HashMap::new();

    for &(from, to) in segments {
        // A corner lying exactly on the level yields a zero-length segment;
        // the neighbouring cells pick that vertex up.
        if from == to {
            continue;
        }

        let tail = starts.remove(&key(to));
        let head = ends.remove(&key(from));

        match (tail, head) {
            (Some(t), Some(h)) if t == h => {
                if let Some(points) = contours.get_mut(&h) {
                    points.push_back(to);
                }
            }
            (Some(t), Some(h)) => {
                // Keep the older index so ordering follows the scan
                if t > h {
                    let tail_points = contours.remove(&t).unwrap_or_default();
                    if let Some(head_points) = contours.get_mut(&h) {
                        head_points.extend(tail_points);
                        register(&mut starts, &mut ends, head_points, h);
                    }
                } else {
                    let head_points = contours.remove(&h).unwrap_or_default();
                    if let Some(first) = head_points.front() {
                        starts.remove(&key(*first));
                    }
                    if let Some(tail_points) = contours.get_mut(&t) {
                        for p in head_points.into_iter().rev() {
                            tail_points.push_front(p);
                        }
                        register(&mut starts, &mut ends, tail_points, t);
                    }
                }
            }
            (None, None) => {
                contours.insert(next_index, VecDeque::from([from, to]));
                starts.insert(key(from), next_index);
                ends.insert(key(to), next_index);
                next_index += 1;
            }
            (Some(t), None) => {
                if let Some(points) = contours.get_mut(&t) {
                    points.push_front(from);
                }
                starts.insert(key(from), t);
            }
            (None, Some(h)) => {
                if let Some(points) = contours.get_mut(&h) {
                    points.push_back(to);
                }
                ends.insert(key(to), h);
            }
        }
    }

    contours
        .into_values()
        .map(|points| Contour::from_points(points.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    fn mask_from(grid: Array2<u8>) -> Array3<u8> {
        grid.insert_axis(Axis(2))
    }

    fn points(contour: &Contour) -> Vec<(f64, f64)> {
        contour.points.iter().map(|p| (p.row, p.col)).collect()
    }

    #[test]
    fn uniform_masks_have_no_contours() {
        assert!(trace_mask(&mask_from(Array2::ones((6, 4)))).unwrap().is_empty());
        assert!(trace_mask(&mask_from(Array2::zeros((6, 4)))).unwrap().is_empty());
    }

    #[test]
    fn degenerate_grids_have_no_contours() {
        assert!(trace_mask(&mask_from(Array2::zeros((0, 0)))).unwrap().is_empty());
        assert!(trace_mask(&mask_from(Array2::ones((1, 7)))).unwrap().is_empty());
    }

    #[test]
    fn single_pixel_is_a_closed_diamond() {
        let mut grid = Array2::<u8>::zeros((5, 5));
        grid[[2, 2]] = 1;

        let contours = trace_mask(&mask_from(grid)).unwrap();
        assert_eq!(contours.len(), 1);
        assert!(contours[0].closed);
        assert_eq!(
            points(&contours[0]),
            vec![(2.5, 2.0), (2.0, 1.5), (1.5, 2.0), (2.0, 2.5), (2.5, 2.0)]
        );
    }

    #[test]
    fn interior_square_yields_one_closed_contour() {
        let mut grid = Array2::<u8>::zeros((10, 12));
        for r in 3..7 {
            for c in 4..9 {
                grid[[r, c]] = 1;
            }
        }

        let contours = trace_mask(&mask_from(grid)).unwrap();
        assert_eq!(contours.len(), 1);
        let contour = &contours[0];
        assert!(contour.closed);
        assert!(contour.len() > 0);
        assert_eq!(contour.xs().len(), contour.ys().len());
        for p in &contour.points {
            assert!(p.row >= 2.5 && p.row <= 6.5);
            assert!(p.col >= 3.5 && p.col <= 8.5);
        }
    }

    #[test]
    fn border_region_stays_open() {
        let mut grid = Array2::<u8>::zeros((3, 3));
        for c in 0..3 {
            grid[[0, c]] = 1;
        }

        let contours = trace_mask(&mask_from(grid)).unwrap();
        assert_eq!(contours.len(), 1);
        assert!(!contours[0].closed);
        assert_eq!(points(&contours[0]), vec![(0.5, 2.0), (0.5, 1.0), (0.5, 0.0)]);
    }

    #[test]
    fn saddle_keeps_diagonal_pixels_apart() {
        let grid = ndarray::array![[1u8, 0], [0, 1]];
        let contours = trace_mask(&mask_from(grid)).unwrap();
        assert_eq!(contours.len(), 2);
        assert_eq!(points(&contours[0]), vec![(0.0, 0.5), (0.5, 0.0)]);
        assert_eq!(points(&contours[1]), vec![(1.0, 0.5), (0.5, 1.0)]);
    }

    #[test]
    fn contours_follow_scan_order() {
        let mut grid = Array2::<u8>::zeros((12, 12));
        grid[[8, 2]] = 1;
        grid[[2, 8]] = 1;

        let contours = trace_mask(&mask_from(grid)).unwrap();
        assert_eq!(contours.len(), 2);
        // The upper blob is met first
        assert!(contours[0].points.iter().all(|p| p.row < 4.0));
        assert!(contours[1].points.iter().all(|p| p.row > 6.0));
    }

    #[test]
    fn multi_channel_masks_are_rejected() {
        let mask = Array3::<u8>::zeros((4, 4, 3));
        let err = trace_mask(&mask).unwrap_err();
        assert!(err.to_string().contains("only 2D arrays are supported"));
    }
}
