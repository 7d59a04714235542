// Annotation packing
// Bundles traced contours with a timestamp and label into a record

use chrono::{DateTime, Local, TimeZone};
use mask2npy_common::{AnnotationRecord, Contour, TIMESTAMP_FORMAT};

/// Local wall-clock time formatted as `MM/DD/YYYY, HH:MM:SS`
pub fn timestamp_now() -> String {
    format_timestamp(&Local::now())
}

pub fn format_timestamp<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Split each contour into truncated column (x) and row (y) sequences
pub fn pack_annotation(contours: &[Contour], timestamp: String, label: &str) -> AnnotationRecord {
    let mut xs = Vec::with_capacity(contours.len());
    let mut ys = Vec::with_capacity(contours.len());

    for (idx, contour) in contours.iter().enumerate() {
        let x_coords = contour.xs();
        let y_coords = contour.ys();
        println!("Contour {}: {} points", idx + 1, x_coords.len());
        xs.push(x_coords);
        ys.push(y_coords);
    }

    AnnotationRecord {
        timestamp,
        label: label.to_string(),
        xs,
        ys,
    }
}
