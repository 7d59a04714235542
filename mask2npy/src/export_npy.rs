// NPY export module
// Stores annotation records in the legacy `*_seg.npy` layout: an object array
// of shape (N, 4) whose rows are [timestamp, label, [x arrays], [y arrays]]

use crate::npy::{self, format_shape, ArrayData, NdArray, NpyError};
use crate::pickle::Value;
use anyhow::{Context, Result};
use mask2npy_common::{AnnotationRecord, RECORD_FIELDS};
use std::fs;
use std::path::{Path, PathBuf};

pub const OUTPUT_SUFFIX: &str = "_seg";
pub const OUTPUT_EXTENSION: &str = "npy";

/// `samples/x.png` -> `x_seg.npy` (relative to the working directory)
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    PathBuf::from(format!("{}{}.{}", stem, OUTPUT_SUFFIX, OUTPUT_EXTENSION))
}

/// Array numpy builds from `np.array([record], dtype=object)`
///
/// The four scalar/list fields are not sequences of equal depth, so numpy stops
/// at two dimensions and the record's fields become the second axis.
pub fn record_to_array(record: &AnnotationRecord) -> NdArray {
    let coords = |seqs: &[Vec<i64>]| {
        Value::List(
            seqs.iter()
                .map(|seq| NdArray::int64(seq.clone()).to_pickle())
                .collect(),
        )
    };

    NdArray::object(
        vec![1, RECORD_FIELDS],
        vec![
            Value::Str(record.timestamp.clone()),
            Value::Str(record.label.clone()),
            coords(record.xs.as_slice()),
            coords(record.ys.as_slice()),
        ],
    )
}

/// Recover records from an object array of shape (N, 4) or (N,)
pub fn records_from_array(array: &NdArray) -> Result<Vec<AnnotationRecord>, NpyError> {
    let ArrayData::Object(items) = &array.data else {
        return Err(NpyError::Layout(format!(
            "annotation file holds a {} array, expected object",
            array.dtype_name()
        )));
    };

    match array.shape.as_slice() {
        [_, RECORD_FIELDS] => items.chunks(RECORD_FIELDS).map(record_from_fields).collect(),
        [_] => items
            .iter()
            .map(|item| {
                item.as_sequence()
                    .ok_or_else(|| NpyError::Layout("annotation entry is not a sequence".into()))
                    .and_then(record_from_fields)
            })
            .collect(),
        _ => Err(NpyError::Layout(format!(
            "unexpected annotation array shape {}",
            format_shape(&array.shape)
        ))),
    }
}

fn record_from_fields(fields: &[Value]) -> Result<AnnotationRecord, NpyError> {
    if fields.len() != RECORD_FIELDS {
        return Err(NpyError::Layout(format!(
            "annotation entry has {} fields, expected {}",
            fields.len(),
            RECORD_FIELDS
        )));
    }

    let text = |v: &Value, what: &str| {
        v.as_str()
            .map(str::to_string)
            .ok_or_else(|| NpyError::Layout(format!("{} is not a string", what)))
    };

    let record = AnnotationRecord {
        timestamp: text(&fields[0], "timestamp")?,
        label: text(&fields[1], "label")?,
        xs: coordinate_lists(&fields[2])?,
        ys: coordinate_lists(&fields[3])?,
    };

    if !record.is_consistent() {
        return Err(NpyError::Layout(
            "x and y coordinate sequences do not pair up".into(),
        ));
    }
    Ok(record)
}

fn coordinate_lists(value: &Value) -> Result<Vec<Vec<i64>>, NpyError> {
    value
        .as_sequence()
        .ok_or_else(|| NpyError::Layout("coordinate field is not a list".into()))?
        .iter()
        .map(coordinates)
        .collect()
}

/// One coordinate sequence: a pickled integer ndarray or a plain list of ints
fn coordinates(value: &Value) -> Result<Vec<i64>, NpyError> {
    match value {
        Value::Build { .. } => match NdArray::from_pickle(value)?.data {
            ArrayData::Int64(values) => Ok(values),
            ArrayData::Object(_) => Err(NpyError::Layout(
                "coordinate array has object dtype".into(),
            )),
        },
        Value::List(items) | Value::Tuple(items) => items
            .iter()
            .map(|v| {
                v.as_int()
                    .ok_or_else(|| NpyError::Layout(format!("coordinate {:?} is not an int", v)))
            })
            .collect(),
        other => Err(NpyError::Layout(format!(
            "unexpected coordinate sequence {:?}",
            other
        ))),
    }
}

/// Write `record` to `output_path`, replacing any existing file
pub fn save_annotation(record: &AnnotationRecord, output_path: &Path) -> Result<()> {
    println!("Saving NPY file to: {}", output_path.display());

    npy::save(output_path, &record_to_array(record))
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    let size = fs::metadata(output_path)
        .with_context(|| format!("Failed to stat {}", output_path.display()))?
        .len();
    println!("File size: {} bytes", size);

    Ok(())
}

/// Contents of an annotation file as loaded back from disk
#[derive(Debug, Clone)]
pub struct LoadedAnnotations {
    pub shape: Vec<usize>,
    pub dtype: &'static str,
    pub records: Vec<AnnotationRecord>,
}

impl LoadedAnnotations {
    /// Number of annotations (leading axis)
    pub fn len(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn load_annotations(path: &Path) -> Result<LoadedAnnotations> {
    let array = npy::load(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let records = records_from_array(&array)
        .with_context(|| format!("{} is not an annotation file", path.display()))?;

    Ok(LoadedAnnotations {
        shape: array.shape.clone(),
        dtype: array.dtype_name(),
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mask2npy_common::DEFAULT_LABEL;
    use tempfile::tempdir;

    fn sample_record() -> AnnotationRecord {
        AnnotationRecord {
            timestamp: "11/05/2024, 14:03:59".into(),
            label: DEFAULT_LABEL.into(),
            xs: vec![vec![2, 1, 2, 2, 2], vec![7, 8]],
            ys: vec![vec![2, 2, 1, 2, 2], vec![0, 0]],
        }
    }

    #[test]
    fn default_output_drops_directory_and_extension() {
        assert_eq!(default_output_path(Path::new("samples/x.png")), PathBuf::from("x_seg.npy"));
        assert_eq!(
            default_output_path(Path::new("samples/ROI 1_1 mask.png")),
            PathBuf::from("ROI 1_1 mask_seg.npy")
        );
        assert_eq!(default_output_path(Path::new("mask")), PathBuf::from("mask_seg.npy"));
    }

    #[test]
    fn saved_record_loads_back_identically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("img_0_seg.npy");
        let record = sample_record();

        save_annotation(&record, &path).unwrap();
        let loaded = load_annotations(&path).unwrap();

        assert_eq!(loaded.shape, vec![1, 4]);
        assert_eq!(loaded.dtype, "object");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.records, vec![record]);
    }

    #[test]
    fn saving_overwrites_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x_seg.npy");
        fs::write(&path, vec![0u8; 10_000]).unwrap();

        let mut record = sample_record();
        record.xs.clear();
        record.ys.clear();
        save_annotation(&record, &path).unwrap();

        assert!(fs::metadata(&path).unwrap().len() < 10_000);
        assert_eq!(load_annotations(&path).unwrap().records, vec![record]);
    }

    #[test]
    fn one_dimensional_container_is_accepted() {
        let fields = record_to_array(&sample_record());
        let ArrayData::Object(items) = fields.data else {
            panic!("object array expected");
        };
        let array = NdArray::object(vec![1], vec![Value::List(items)]);

        assert_eq!(records_from_array(&array).unwrap(), vec![sample_record()]);
    }

    #[test]
    fn plain_int_lists_are_accepted() {
        let array = NdArray::object(
            vec![1, 4],
            vec![
                Value::Str("t".into()),
                Value::Str("l".into()),
                Value::List(vec![Value::List(vec![Value::Int(1), Value::Int(2)])]),
                Value::List(vec![Value::Tuple(vec![Value::Int(3), Value::Int(4)])]),
            ],
        );
        let records = records_from_array(&array).unwrap();
        assert_eq!(records[0].xs, vec![vec![1, 2]]);
        assert_eq!(records[0].ys, vec![vec![3, 4]]);
    }

    #[test]
    fn unpaired_sequences_are_rejected() {
        let mut record = sample_record();
        record.ys.pop();
        let err = records_from_array(&record_to_array(&record)).unwrap_err();
        assert!(err.to_string().contains("do not pair up"));
    }

    #[test]
    fn numeric_arrays_are_not_annotations() {
        let err = records_from_array(&NdArray::int64(vec![1, 2, 3])).unwrap_err();
        assert!(err.to_string().contains("expected object"));
    }
}
