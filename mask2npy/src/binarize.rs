// Mask binarization
// Any strictly positive sample becomes foreground

use ndarray::Array3;

/// How the raw mask looked before thresholding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskKind {
    /// Exactly two distinct values
    Binary,
    /// Anything else (single value, grey levels, label maps)
    NonBinary,
}

impl MaskKind {
    pub fn classify(distinct_values: usize) -> Self {
        if distinct_values == 2 {
            MaskKind::Binary
        } else {
            MaskKind::NonBinary
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            MaskKind::Binary => "Binary mask detected",
            MaskKind::NonBinary => "Non-binary mask detected, converting to binary",
        }
    }
}

/// Threshold raw samples to a 0/1 mask: `1 if raw > 0 else 0`
///
/// NaN and negative samples map to 0. The result has the same shape as the input.
pub fn binarize(samples: &Array3<f64>) -> Array3<u8> {
    samples.mapv(|v| u8::from(v > 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    // Two-branch rendition of the legacy converter, kept to pin equivalence.
    fn binarize_by_kind(samples: &Array3<f64>, distinct: usize) -> Array3<u8> {
        match MaskKind::classify(distinct) {
            MaskKind::Binary => samples.mapv(|v| if v > 0.0 { 1 } else { 0 }),
            MaskKind::NonBinary => samples.mapv(|v| if v > 0.0 { 1 } else { 0 }),
        }
    }

    #[test]
    fn positive_samples_become_foreground() {
        let raw = array![[[0.0], [255.0]], [[-3.0], [0.25]]];
        let mask = binarize(&raw);
        assert_eq!(mask, array![[[0u8], [1]], [[0], [1]]]);
    }

    #[test]
    fn nan_is_background() {
        let raw = array![[[f64::NAN], [1.0]]];
        assert_eq!(binarize(&raw), array![[[0u8], [1]]]);
    }

    #[test]
    fn binarize_is_idempotent() {
        let raw = array![[[0.0], [7.0], [128.0]], [[255.0], [0.0], [3.0]]];
        let once = binarize(&raw);
        let twice = binarize(&once.mapv(f64::from));
        assert_eq!(once, twice);
    }

    #[test]
    fn both_legacy_branches_match_single_threshold() {
        let two_valued = array![[[0.0], [255.0]], [[255.0], [0.0]]];
        let many_valued = array![[[0.0], [10.0]], [[20.0], [30.0]]];
        let single_valued = array![[[5.0], [5.0]]];

        for (raw, distinct) in [(two_valued, 2), (many_valued, 4), (single_valued, 1)] {
            assert_eq!(binarize(&raw), binarize_by_kind(&raw, distinct));
            // Forcing the other branch changes nothing either
            let other = if distinct == 2 { 3 } else { 2 };
            assert_eq!(binarize(&raw), binarize_by_kind(&raw, other));
        }
    }

    #[test]
    fn classify_counts_distinct_values() {
        assert_eq!(MaskKind::classify(2), MaskKind::Binary);
        assert_eq!(MaskKind::classify(1), MaskKind::NonBinary);
        assert_eq!(MaskKind::classify(5), MaskKind::NonBinary);
    }
}
