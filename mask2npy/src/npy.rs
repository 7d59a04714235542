// NPY array-file format
// Header framing plus numpy's ndarray pickle layout, used for object arrays

use crate::pickle::{self, PickleError, Value};
use log::debug;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

pub const MAGIC: &[u8; 6] = b"\x93NUMPY";

const ARRAY_ALIGN: usize = 64;
/// Header slack numpy reserves so the leading axis can grow in place
const GROWTH_AXIS_MAX_DIGITS: usize = 21;
/// Module path numpy 1.x pickles under; numpy 2.x still resolves it
const RECONSTRUCT_MODULE: &str = "numpy.core.multiarray";
/// NPY_OBJECT dtype flags (list pickle, refcounted items, needs init/PyAPI)
const OBJECT_DTYPE_FLAGS: i64 = 63;

#[derive(Debug, Error)]
pub enum NpyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not an .npy file (bad magic string)")]
    BadMagic,
    #[error("unsupported .npy format version {0}.{1}")]
    UnsupportedVersion(u8, u8),
    #[error("malformed .npy header: {0}")]
    Header(String),
    #[error("unsupported dtype '{0}'")]
    UnsupportedDtype(String),
    #[error("unexpected array layout: {0}")]
    Layout(String),
    #[error(transparent)]
    Pickle(#[from] PickleError),
}

/// Array contents, flattened in C order
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Object(Vec<Value>),
    Int64(Vec<i64>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    pub shape: Vec<usize>,
    pub data: ArrayData,
}

impl NdArray {
    pub fn object(shape: Vec<usize>, items: Vec<Value>) -> Self {
        Self {
            shape,
            data: ArrayData::Object(items),
        }
    }

    /// One-dimensional `int64` array
    pub fn int64(values: Vec<i64>) -> Self {
        Self {
            shape: vec![values.len()],
            data: ArrayData::Int64(values),
        }
    }

    pub fn descr(&self) -> &'static str {
        match self.data {
            ArrayData::Object(_) => "|O",
            ArrayData::Int64(_) => "<i8",
        }
    }

    pub fn dtype_name(&self) -> &'static str {
        match self.data {
            ArrayData::Object(_) => "object",
            ArrayData::Int64(_) => "int64",
        }
    }

    /// Length of the leading axis, as `len(array)` reports it
    pub fn len(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pickle graph numpy produces for this array via `ndarray.__reduce__`
    pub fn to_pickle(&self) -> Value {
        let reconstruct = Value::reduce(
            Value::global(RECONSTRUCT_MODULE, "_reconstruct"),
            vec![
                Value::global("numpy", "ndarray"),
                Value::Tuple(vec![Value::Int(0)]),
                Value::Bytes(b"b".to_vec()),
            ],
        );
        let shape = Value::Tuple(self.shape.iter().map(|&d| Value::Int(d as i64)).collect());
        let (dtype, payload) = match &self.data {
            ArrayData::Object(items) => (
                dtype_value("O8", "|", OBJECT_DTYPE_FLAGS),
                Value::List(items.clone()),
            ),
            ArrayData::Int64(values) => (
                dtype_value("i8", "<", 0),
                Value::Bytes(values.iter().flat_map(|v| v.to_le_bytes()).collect()),
            ),
        };

        Value::build(
            reconstruct,
            Value::Tuple(vec![Value::Int(1), shape, dtype, Value::Bool(false), payload]),
        )
    }

    /// Interpret a pickled `numpy.ndarray`
    pub fn from_pickle(value: &Value) -> Result<Self, NpyError> {
        let Value::Build { object, state } = value else {
            return Err(NpyError::Layout("expected a pickled numpy.ndarray".into()));
        };
        match object.as_ref() {
            Value::Reduce { callable, .. }
                if callable.is_global(|m| m.starts_with("numpy"), "_reconstruct") => {}
            _ => return Err(NpyError::Layout("ndarray is not built by _reconstruct".into())),
        }

        let state = state
            .as_sequence()
            .ok_or_else(|| NpyError::Layout("ndarray state is not a tuple".into()))?;
        // (version, shape, dtype, is_fortran, data); version-less states are older pickles
        let fields = match state.len() {
            5 => &state[1..],
            4 => state,
            n => return Err(NpyError::Layout(format!("ndarray state has {} fields", n))),
        };

        let shape = parse_shape(&fields[0])?;
        let dtype = Dtype::from_pickle(&fields[1])?;
        let fortran = fields[2]
            .as_bool()
            .ok_or_else(|| NpyError::Layout("is_fortran flag is not a bool".into()))?;
        if fortran && shape.iter().filter(|&&d| d > 1).count() > 1 {
            return Err(NpyError::Layout("Fortran-ordered arrays are not supported".into()));
        }
        let count: usize = shape.iter().product();

        let data = match dtype {
            Dtype::Object => {
                let items = fields[3]
                    .as_sequence()
                    .ok_or_else(|| NpyError::Layout("object array data is not a list".into()))?;
                if items.len() != count {
                    return Err(NpyError::Layout(format!(
                        "object array holds {} items for shape {}",
                        items.len(),
                        format_shape(&shape)
                    )));
                }
                ArrayData::Object(items.to_vec())
            }
            int => ArrayData::Int64(int.decode_ints(&payload_bytes(&fields[3])?, count)?),
        };

        Ok(Self { shape, data })
    }
}

fn dtype_value(code: &str, byteorder: &str, flags: i64) -> Value {
    Value::build(
        Value::reduce(
            Value::global("numpy", "dtype"),
            vec![Value::Str(code.into()), Value::Bool(false), Value::Bool(true)],
        ),
        Value::Tuple(vec![
            Value::Int(3),
            Value::Str(byteorder.into()),
            Value::None,
            Value::None,
            Value::None,
            Value::Int(-1),
            Value::Int(-1),
            Value::Int(flags),
        ]),
    )
}

fn parse_shape(value: &Value) -> Result<Vec<usize>, NpyError> {
    let dims = value
        .as_sequence()
        .ok_or_else(|| NpyError::Layout("shape is not a tuple".into()))?;
    dims.iter()
        .map(|d| {
            d.as_int()
                .and_then(|v| usize::try_from(v).ok())
                .ok_or_else(|| NpyError::Layout(format!("invalid dimension {:?}", d)))
        })
        .collect()
}

/// Raw array bytes: `bytes` in protocol 3+, `_codecs.encode(str, 'latin1')` in protocol 2
fn payload_bytes(value: &Value) -> Result<Vec<u8>, NpyError> {
    match value {
        Value::Bytes(bytes) => Ok(bytes.clone()),
        Value::Reduce { callable, args } if callable.is_global(|m| m == "_codecs", "encode") => {
            let text = args
                .as_sequence()
                .and_then(|a| a.first())
                .and_then(Value::as_str)
                .ok_or_else(|| NpyError::Layout("_codecs.encode without a string".into()))?;
            text.chars()
                .map(|c| {
                    u8::try_from(u32::from(c))
                        .map_err(|_| NpyError::Layout("latin1 payload out of range".into()))
                })
                .collect()
        }
        other => Err(NpyError::Layout(format!("unexpected array payload {:?}", other))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    Object,
    Int {
        width: usize,
        signed: bool,
        little_endian: bool,
    },
}

impl Dtype {
    /// Parse a header descr such as `|O`, `<i8` or `>u2`
    fn from_descr(descr: &str) -> Result<Self, NpyError> {
        let (order, code) = match descr.chars().next() {
            Some(c @ ('<' | '>' | '|' | '=')) => (c, &descr[1..]),
            _ => ('=', descr),
        };
        Self::from_code(code, order).ok_or_else(|| NpyError::UnsupportedDtype(descr.to_string()))
    }

    fn from_code(code: &str, order: char) -> Option<Self> {
        let kind = code.chars().next()?;
        if kind == 'O' {
            return Some(Dtype::Object);
        }
        let signed = match kind {
            'i' => true,
            'u' => false,
            _ => return None,
        };
        let width: usize = code[1..].parse().ok()?;
        if !matches!(width, 1 | 2 | 4 | 8) {
            return None;
        }
        let little_endian = match order {
            '<' | '|' => true,
            '>' => false,
            _ => cfg!(target_endian = "little"),
        };
        Some(Dtype::Int {
            width,
            signed,
            little_endian,
        })
    }

    /// `numpy.dtype(code, False, True)` with optional BUILD state carrying the byte order
    fn from_pickle(value: &Value) -> Result<Self, NpyError> {
        let (reduce, state) = match value {
            Value::Build { object, state } => (object.as_ref(), Some(state.as_ref())),
            other => (other, None),
        };
        let code = match reduce {
            Value::Reduce { callable, args } if callable.is_global(|m| m.starts_with("numpy"), "dtype") => args
                .as_sequence()
                .and_then(|a| a.first())
                .and_then(Value::as_str),
            _ => None,
        }
        .ok_or_else(|| NpyError::Layout("dtype is not a pickled numpy.dtype".into()))?;

        let order = state
            .and_then(Value::as_sequence)
            .and_then(|s| s.get(1))
            .and_then(Value::as_str)
            .and_then(|s| s.chars().next())
            .unwrap_or('=');

        Self::from_code(code, order).ok_or_else(|| NpyError::UnsupportedDtype(code.to_string()))
    }

    fn decode_ints(self, bytes: &[u8], count: usize) -> Result<Vec<i64>, NpyError> {
        let Dtype::Int {
            width,
            signed,
            little_endian,
        } = self
        else {
            return Err(NpyError::Layout("object dtype has no integer payload".into()));
        };
        if bytes.len() != width * count {
            return Err(NpyError::Layout(format!(
                "{} payload bytes for {} items of width {}",
                bytes.len(),
                count,
                width
            )));
        }

        bytes
            .chunks_exact(width)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                if little_endian {
                    buf[..width].copy_from_slice(chunk);
                } else {
                    for (dst, src) in buf[..width].iter_mut().zip(chunk.iter().rev()) {
                        *dst = *src;
                    }
                }
                let negative = signed && buf[width - 1] & 0x80 != 0;
                if negative {
                    buf[width..].fill(0xff);
                }
                let raw = u64::from_le_bytes(buf);
                if signed {
                    Ok(raw as i64)
                } else {
                    i64::try_from(raw).map_err(|_| NpyError::Layout("uint64 value exceeds int64".into()))
                }
            })
            .collect()
    }
}

/// Format a shape the way Python prints tuples: `()`, `(3,)`, `(64, 64)`
pub fn format_shape(shape: &[usize]) -> String {
    match shape {
        [single] => format!("({},)", single),
        _ => {
            let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
            format!("({})", dims.join(", "))
        }
    }
}

/// Parsed `.npy` header dictionary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub descr: String,
    pub fortran_order: bool,
    pub shape: Vec<usize>,
}

/// Magic, version and padded header dict; the payload that follows starts 64-byte aligned
pub fn encode_header(header: &Header) -> Vec<u8> {
    let mut text = format!(
        "{{'descr': '{}', 'fortran_order': {}, 'shape': {}, }}",
        header.descr,
        if header.fortran_order { "True" } else { "False" },
        format_shape(&header.shape)
    );
    if let Some(leading) = header.shape.first() {
        let digits = leading.to_string().len();
        text.push_str(&" ".repeat(GROWTH_AXIS_MAX_DIGITS.saturating_sub(digits)));
    }

    let hlen = text.len() + 1;
    let (version, len_bytes) = if MAGIC.len() + 2 + 2 + hlen + ARRAY_ALIGN <= u16::MAX as usize {
        (1u8, 2usize)
    } else {
        (2u8, 4usize)
    };
    let padlen = ARRAY_ALIGN - (MAGIC.len() + 2 + len_bytes + hlen) % ARRAY_ALIGN;
    let total = hlen + padlen;

    let mut out = Vec::with_capacity(MAGIC.len() + 2 + len_bytes + total);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[version, 0]);
    if version == 1 {
        out.extend_from_slice(&(total as u16).to_le_bytes());
    } else {
        out.extend_from_slice(&(total as u32).to_le_bytes());
    }
    out.extend_from_slice(text.as_bytes());
    out.extend(std::iter::repeat(b' ').take(padlen));
    out.push(b'\n');
    out
}

pub fn decode_header<R: Read>(reader: &mut R) -> Result<Header, NpyError> {
    let mut prefix = [0u8; 8];
    reader.read_exact(&mut prefix)?;
    if &prefix[..6] != MAGIC {
        return Err(NpyError::BadMagic);
    }

    let (major, minor) = (prefix[6], prefix[7]);
    let len = match major {
        1 => {
            let mut buf = [0u8; 2];
            reader.read_exact(&mut buf)?;
            u16::from_le_bytes(buf) as usize
        }
        2 | 3 => {
            let mut buf = [0u8; 4];
            reader.read_exact(&mut buf)?;
            u32::from_le_bytes(buf) as usize
        }
        _ => return Err(NpyError::UnsupportedVersion(major, minor)),
    };

    let mut raw = vec![0u8; len];
    reader.read_exact(&mut raw)?;
    // v1/v2 headers are latin1, v3 utf8; the keys we need are ASCII either way
    let text: String = raw.iter().map(|&b| b as char).collect();
    parse_header_dict(&text)
}

fn dict_value<'t>(text: &'t str, key: &str) -> Result<&'t str, NpyError> {
    let needle = format!("'{}':", key);
    let start = text
        .find(&needle)
        .ok_or_else(|| NpyError::Header(format!("missing key '{}'", key)))?;
    Ok(text[start + needle.len()..].trim_start())
}

fn parse_header_dict(text: &str) -> Result<Header, NpyError> {
    let descr = dict_value(text, "descr")?;
    let descr = descr
        .strip_prefix('\'')
        .and_then(|rest| rest.split('\'').next())
        .ok_or_else(|| NpyError::UnsupportedDtype(descr.split(',').next().unwrap_or("").to_string()))?
        .to_string();

    let fortran = dict_value(text, "fortran_order")?;
    let fortran_order = if fortran.starts_with("True") {
        true
    } else if fortran.starts_with("False") {
        false
    } else {
        return Err(NpyError::Header("fortran_order is not a bool".into()));
    };

    let shape_text = dict_value(text, "shape")?;
    let inner = shape_text
        .strip_prefix('(')
        .and_then(|rest| rest.split(')').next())
        .ok_or_else(|| NpyError::Header("shape is not a tuple".into()))?;
    let shape = inner
        .split(',')
        .map(|d| d.trim().trim_end_matches('L'))
        .filter(|d| !d.is_empty())
        .map(|d| {
            d.parse::<usize>()
                .map_err(|_| NpyError::Header(format!("invalid dimension '{}'", d)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Header {
        descr,
        fortran_order,
        shape,
    })
}

pub fn write_npy<W: Write>(writer: &mut W, array: &NdArray) -> Result<(), NpyError> {
    let header = Header {
        descr: array.descr().to_string(),
        fortran_order: false,
        shape: array.shape.clone(),
    };
    writer.write_all(&encode_header(&header))?;

    match &array.data {
        ArrayData::Object(_) => pickle::write(writer, &array.to_pickle())?,
        ArrayData::Int64(values) => {
            for v in values {
                writer.write_all(&v.to_le_bytes())?;
            }
        }
    }
    Ok(())
}

pub fn read_npy<R: Read>(reader: &mut R) -> Result<NdArray, NpyError> {
    let header = decode_header(reader)?;
    debug!(
        "npy header: descr={} fortran_order={} shape={}",
        header.descr,
        header.fortran_order,
        format_shape(&header.shape)
    );

    match Dtype::from_descr(&header.descr)? {
        Dtype::Object => {
            let value = pickle::read(reader)?;
            let array = NdArray::from_pickle(&value)?;
            if array.shape != header.shape {
                return Err(NpyError::Layout(format!(
                    "header shape {} does not match pickled shape {}",
                    format_shape(&header.shape),
                    format_shape(&array.shape)
                )));
            }
            Ok(array)
        }
        int => {
            if header.fortran_order && header.shape.iter().filter(|&&d| d > 1).count() > 1 {
                return Err(NpyError::Layout("Fortran-ordered arrays are not supported".into()));
            }
            let mut bytes = Vec::new();
            reader.read_to_end(&mut bytes)?;
            let count: usize = header.shape.iter().product();
            let values = int.decode_ints(&bytes, count)?;
            Ok(NdArray {
                shape: header.shape,
                data: ArrayData::Int64(values),
            })
        }
    }
}

/// Write `array` to `path`, replacing any existing file
pub fn save(path: &Path, array: &NdArray) -> Result<(), NpyError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_npy(&mut writer, array)?;
    writer.flush()?;
    Ok(())
}

pub fn load(path: &Path) -> Result<NdArray, NpyError> {
    let mut reader = BufReader::new(File::open(path)?);
    read_npy(&mut reader)
}
