use serde::{Deserialize, Serialize};
use std::fmt;

/// Label written into every record produced from a PNG mask
pub const DEFAULT_LABEL: &str = "converted from PNG";

/// strftime pattern of the record timestamp, e.g. `03/14/2025, 09:26:53`
pub const TIMESTAMP_FORMAT: &str = "%m/%d/%Y, %H:%M:%S";

/// Number of fields in an annotation record
pub const RECORD_FIELDS: usize = 4;

/// 2D point in pixel space, row first (image coordinates: row increases downward)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub row: f64,
    pub col: f64,
}

impl PixelPoint {
    pub fn new(row: f64, col: f64) -> Self {
        Self { row, col }
    }
}

/// Contour represented as a sequence of sub-pixel points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    pub points: Vec<PixelPoint>,
    /// Whether the contour is closed (last point repeats the first)
    pub closed: bool,
}

impl Contour {
    /// Build a contour, deriving `closed` from the end points
    pub fn from_points(points: Vec<PixelPoint>) -> Self {
        let closed = points.len() > 2 && points.first() == points.last();
        Self { points, closed }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Column coordinates truncated toward zero
    pub fn xs(&self) -> Vec<i64> {
        self.points.iter().map(|p| p.col as i64).collect()
    }

    /// Row coordinates truncated toward zero
    pub fn ys(&self) -> Vec<i64> {
        self.points.iter().map(|p| p.row as i64).collect()
    }
}

/// One annotation entry of a `*_seg.npy` file
///
/// On disk this is the 4-element sequence
/// `[timestamp, label, [x arrays...], [y arrays...]]`.
/// `xs[i]` and `ys[i]` describe the same contour and have equal length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub timestamp: String,
    pub label: String,
    pub xs: Vec<Vec<i64>>,
    pub ys: Vec<Vec<i64>>,
}

impl AnnotationRecord {
    pub fn contour_count(&self) -> usize {
        self.xs.len()
    }

    /// Check the parallel-sequence invariants
    pub fn is_consistent(&self) -> bool {
        self.xs.len() == self.ys.len()
            && self.xs.iter().zip(&self.ys).all(|(x, y)| x.len() == y.len())
    }
}

impl fmt::Display for AnnotationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | {} contour(s)",
            self.timestamp,
            self.label,
            self.contour_count()
        )
    }
}

/// Element type of the decoded image samples, named as numpy names them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleType {
    /// 1-bit greyscale, stored as 0/1
    Bool,
    U8,
    U16,
    F32,
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleType::Bool => write!(f, "bool"),
            SampleType::U8 => write!(f, "uint8"),
            SampleType::U16 => write!(f, "uint16"),
            SampleType::F32 => write!(f, "float32"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_is_derived_from_end_points() {
        let ring = Contour::from_points(vec![
            PixelPoint::new(1.0, 0.5),
            PixelPoint::new(0.5, 1.0),
            PixelPoint::new(1.0, 1.5),
            PixelPoint::new(1.0, 0.5),
        ]);
        assert!(ring.closed);

        let open = Contour::from_points(vec![PixelPoint::new(0.0, 0.5), PixelPoint::new(0.5, 0.0)]);
        assert!(!open.closed);
    }

    #[test]
    fn coordinates_truncate_toward_zero() {
        let c = Contour::from_points(vec![PixelPoint::new(2.5, 3.5), PixelPoint::new(2.0, 0.5)]);
        assert_eq!(c.xs(), vec![3, 0]);
        assert_eq!(c.ys(), vec![2, 2]);
    }

    #[test]
    fn record_consistency_checks_lengths() {
        let mut record = AnnotationRecord {
            timestamp: "01/02/2025, 03:04:05".into(),
            label: DEFAULT_LABEL.into(),
            xs: vec![vec![1, 2]],
            ys: vec![vec![3, 4]],
        };
        assert!(record.is_consistent());
        record.ys[0].pop();
        assert!(!record.is_consistent());
    }

    #[test]
    fn sample_types_use_numpy_names() {
        assert_eq!(SampleType::Bool.to_string(), "bool");
        assert_eq!(SampleType::U8.to_string(), "uint8");
        assert_eq!(SampleType::U16.to_string(), "uint16");
        assert_eq!(SampleType::F32.to_string(), "float32");
    }
}
