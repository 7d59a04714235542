// Pickle codec
// Covers the part of the pickle protocol that numpy uses for object arrays:
// scalars, strings, bytes, containers, globals and REDUCE/BUILD calls.
// Encoding always emits protocol 3 without memo entries; decoding accepts
// protocols 2 through 5 including memoized streams.

use std::collections::HashMap;
use std::io::{Read, Write};
use thiserror::Error;

/// Protocol written by [`to_bytes`]
pub const PROTOCOL: u8 = 3;

mod op {
    pub const MARK: u8 = b'(';
    pub const STOP: u8 = b'.';
    pub const POP: u8 = b'0';
    pub const POP_MARK: u8 = b'1';
    pub const NONE: u8 = b'N';
    pub const BININT: u8 = b'J';
    pub const BININT1: u8 = b'K';
    pub const BININT2: u8 = b'M';
    pub const BINFLOAT: u8 = b'G';
    pub const BINUNICODE: u8 = b'X';
    pub const BINBYTES: u8 = b'B';
    pub const SHORT_BINBYTES: u8 = b'C';
    pub const EMPTY_TUPLE: u8 = b')';
    pub const TUPLE: u8 = b't';
    pub const EMPTY_LIST: u8 = b']';
    pub const LIST: u8 = b'l';
    pub const APPEND: u8 = b'a';
    pub const APPENDS: u8 = b'e';
    pub const EMPTY_DICT: u8 = b'}';
    pub const DICT: u8 = b'd';
    pub const SETITEM: u8 = b's';
    pub const SETITEMS: u8 = b'u';
    pub const GLOBAL: u8 = b'c';
    pub const REDUCE: u8 = b'R';
    pub const BUILD: u8 = b'b';
    pub const BINPUT: u8 = b'q';
    pub const LONG_BINPUT: u8 = b'r';
    pub const BINGET: u8 = b'h';
    pub const LONG_BINGET: u8 = b'j';
    pub const PROTO: u8 = 0x80;
    pub const TUPLE1: u8 = 0x85;
    pub const TUPLE2: u8 = 0x86;
    pub const TUPLE3: u8 = 0x87;
    pub const NEWTRUE: u8 = 0x88;
    pub const NEWFALSE: u8 = 0x89;
    pub const LONG1: u8 = 0x8a;
    pub const SHORT_BINUNICODE: u8 = 0x8c;
    pub const BINUNICODE8: u8 = 0x8d;
    pub const BINBYTES8: u8 = 0x8e;
    pub const STACK_GLOBAL: u8 = 0x93;
    pub const MEMOIZE: u8 = 0x94;
    pub const FRAME: u8 = 0x95;
}

/// A decoded pickle object graph
///
/// Calls are not executed: `Reduce` and `Build` keep the callable and its
/// arguments so callers can interpret the globals they recognise.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Value>),
    List(Vec<Value>),
    Dict(Vec<(Value, Value)>),
    Global { module: String, name: String },
    Reduce { callable: Box<Value>, args: Box<Value> },
    Build { object: Box<Value>, state: Box<Value> },
}

impl Value {
    pub fn global(module: &str, name: &str) -> Self {
        Value::Global {
            module: module.to_string(),
            name: name.to_string(),
        }
    }

    /// `callable(*args)`
    pub fn reduce(callable: Value, args: Vec<Value>) -> Self {
        Value::Reduce {
            callable: Box::new(callable),
            args: Box::new(Value::Tuple(args)),
        }
    }

    /// `object.__setstate__(state)`
    pub fn build(object: Value, state: Value) -> Self {
        Value::Build {
            object: Box::new(object),
            state: Box::new(state),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Items of a tuple or list
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(items) | Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// True for a global named `name` whose module passes `module_matches`
    pub fn is_global(&self, module_matches: impl Fn(&str) -> bool, name: &str) -> bool {
        match self {
            Value::Global { module, name: n } => n == name && module_matches(module),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum PickleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected end of pickle stream")]
    UnexpectedEof,
    #[error("unsupported pickle opcode 0x{0:02x} at offset {1}")]
    UnknownOpcode(u8, usize),
    #[error("pickle stack underflow at offset {0}")]
    StackUnderflow(usize),
    #[error("no mark on the pickle stack at offset {0}")]
    MissingMark(usize),
    #[error("pickle memo slot {0} is empty")]
    MemoMiss(u32),
    #[error("invalid pickle data at offset {offset}: {reason}")]
    Invalid { offset: usize, reason: String },
}

/// Serialize `value` as a complete protocol 3 pickle
pub fn to_bytes(value: &Value) -> Vec<u8> {
    let mut out = vec![op::PROTO, PROTOCOL];
    encode(value, &mut out);
    out.push(op::STOP);
    out
}

pub fn write<W: Write>(writer: &mut W, value: &Value) -> Result<(), PickleError> {
    writer.write_all(&to_bytes(value))?;
    Ok(())
}

fn encode(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::None => out.push(op::NONE),
        Value::Bool(true) => out.push(op::NEWTRUE),
        Value::Bool(false) => out.push(op::NEWFALSE),
        Value::Int(v) => encode_int(*v, out),
        Value::Float(v) => {
            out.push(op::BINFLOAT);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::Str(s) => {
            out.push(op::BINUNICODE);
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(bytes) => {
            if bytes.len() < 256 {
                out.push(op::SHORT_BINBYTES);
                out.push(bytes.len() as u8);
            } else {
                out.push(op::BINBYTES);
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            }
            out.extend_from_slice(bytes);
        }
        Value::Tuple(items) => match items.len() {
            0 => out.push(op::EMPTY_TUPLE),
            n @ 1..=3 => {
                for item in items {
                    encode(item, out);
                }
                out.push([op::TUPLE1, op::TUPLE2, op::TUPLE3][n - 1]);
            }
            _ => {
                out.push(op::MARK);
                for item in items {
                    encode(item, out);
                }
                out.push(op::TUPLE);
            }
        },
        Value::List(items) => {
            out.push(op::EMPTY_LIST);
            if !items.is_empty() {
                out.push(op::MARK);
                for item in items {
                    encode(item, out);
                }
                out.push(op::APPENDS);
            }
        }
        Value::Dict(entries) => {
            out.push(op::EMPTY_DICT);
            if !entries.is_empty() {
                out.push(op::MARK);
                for (k, v) in entries {
                    encode(k, out);
                    encode(v, out);
                }
                out.push(op::SETITEMS);
            }
        }
        Value::Global { module, name } => {
            out.push(op::GLOBAL);
            out.extend_from_slice(module.as_bytes());
            out.push(b'\n');
            out.extend_from_slice(name.as_bytes());
            out.push(b'\n');
        }
        Value::Reduce { callable, args } => {
            encode(callable, out);
            encode(args, out);
            out.push(op::REDUCE);
        }
        Value::Build { object, state } => {
            encode(object, out);
            encode(state, out);
            out.push(op::BUILD);
        }
    }
}

fn encode_int(v: i64, out: &mut Vec<u8>) {
    if (0..=0xff).contains(&v) {
        out.push(op::BININT1);
        out.push(v as u8);
    } else if (0..=0xffff).contains(&v) {
        out.push(op::BININT2);
        out.extend_from_slice(&(v as u16).to_le_bytes());
    } else if (i32::MIN as i64..=i32::MAX as i64).contains(&v) {
        out.push(op::BININT);
        out.extend_from_slice(&(v as i32).to_le_bytes());
    } else {
        // Shortest little-endian two's complement form
        let bytes = v.to_le_bytes();
        let mut len = bytes.len();
        while len > 1 {
            let last = bytes[len - 1];
            let sign_of_prev = bytes[len - 2] & 0x80;
            if (last == 0x00 && sign_of_prev == 0) || (last == 0xff && sign_of_prev != 0) {
                len -= 1;
            } else {
                break;
            }
        }
        out.push(op::LONG1);
        out.push(len as u8);
        out.extend_from_slice(&bytes[..len]);
    }
}

/// Decode a complete pickle stream
pub fn from_bytes(data: &[u8]) -> Result<Value, PickleError> {
    Unpickler::new(data).load()
}

pub fn read<R: Read>(reader: &mut R) -> Result<Value, PickleError> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    from_bytes(&data)
}

/// Stack entry; remembers the memo slot it was stored under so in-place
/// mutations (APPENDS, SETITEMS, BUILD) stay visible through later BINGETs.
struct Slot {
    value: Value,
    memo: Option<u32>,
}

struct Unpickler<'a> {
    data: &'a [u8],
    pos: usize,
    stack: Vec<Slot>,
    marks: Vec<usize>,
    memo: HashMap<u32, Value>,
}

impl<'a> Unpickler<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            stack: Vec::new(),
            marks: Vec::new(),
            memo: HashMap::new(),
        }
    }

    fn load(mut self) -> Result<Value, PickleError> {
        loop {
            let offset = self.pos;
            let opcode = self.read_u8()?;

            match opcode {
                op::PROTO => {
                    self.read_u8()?;
                }
                op::FRAME => {
                    self.take(8)?;
                }
                op::STOP => return self.pop(offset),
                op::MARK => self.marks.push(self.stack.len()),
                op::POP => {
                    self.pop(offset)?;
                }
                op::POP_MARK => {
                    self.pop_mark(offset)?;
                }
                op::NONE => self.push(Value::None),
                op::NEWTRUE => self.push(Value::Bool(true)),
                op::NEWFALSE => self.push(Value::Bool(false)),
                op::BININT1 => {
                    let v = self.read_u8()?;
                    self.push(Value::Int(i64::from(v)));
                }
                op::BININT2 => {
                    let v = u16::from_le_bytes(self.read_array()?);
                    self.push(Value::Int(i64::from(v)));
                }
                op::BININT => {
                    let v = i32::from_le_bytes(self.read_array()?);
                    self.push(Value::Int(i64::from(v)));
                }
                op::LONG1 => {
                    let n = self.read_u8()? as usize;
                    let bytes = self.take(n)?;
                    let v = decode_long(bytes).ok_or_else(|| PickleError::Invalid {
                        offset,
                        reason: format!("{}-byte integer does not fit in 64 bits", n),
                    })?;
                    self.push(Value::Int(v));
                }
                op::BINFLOAT => {
                    let v = f64::from_be_bytes(self.read_array()?);
                    self.push(Value::Float(v));
                }
                op::SHORT_BINUNICODE => {
                    let n = self.read_u8()? as usize;
                    let s = self.read_str(n, offset)?;
                    self.push(Value::Str(s));
                }
                op::BINUNICODE => {
                    let n = u32::from_le_bytes(self.read_array()?) as usize;
                    let s = self.read_str(n, offset)?;
                    self.push(Value::Str(s));
                }
                op::BINUNICODE8 => {
                    let n = self.read_len8(offset)?;
                    let s = self.read_str(n, offset)?;
                    self.push(Value::Str(s));
                }
                op::SHORT_BINBYTES => {
                    let n = self.read_u8()? as usize;
                    let b = self.take(n)?.to_vec();
                    self.push(Value::Bytes(b));
                }
                op::BINBYTES => {
                    let n = u32::from_le_bytes(self.read_array()?) as usize;
                    let b = self.take(n)?.to_vec();
                    self.push(Value::Bytes(b));
                }
                op::BINBYTES8 => {
                    let n = self.read_len8(offset)?;
                    let b = self.take(n)?.to_vec();
                    self.push(Value::Bytes(b));
                }
                op::EMPTY_TUPLE => self.push(Value::Tuple(Vec::new())),
                op::TUPLE1 | op::TUPLE2 | op::TUPLE3 => {
                    let n = (opcode - op::TUPLE1 + 1) as usize;
                    if self.stack.len() < n {
                        return Err(PickleError::StackUnderflow(offset));
                    }
                    let items = self.split_values(self.stack.len() - n);
                    self.push(Value::Tuple(items));
                }
                op::TUPLE => {
                    let items = self.pop_mark(offset)?;
                    self.push(Value::Tuple(items));
                }
                op::EMPTY_LIST => self.push(Value::List(Vec::new())),
                op::LIST => {
                    let items = self.pop_mark(offset)?;
                    self.push(Value::List(items));
                }
                op::APPEND => {
                    let item = self.pop(offset)?;
                    self.extend_list(offset, vec![item])?;
                }
                op::APPENDS => {
                    let items = self.pop_mark(offset)?;
                    self.extend_list(offset, items)?;
                }
                op::EMPTY_DICT => self.push(Value::Dict(Vec::new())),
                op::DICT => {
                    let items = self.pop_mark(offset)?;
                    let entries = pair_up(items, offset)?;
                    self.push(Value::Dict(entries));
                }
                op::SETITEM => {
                    let v = self.pop(offset)?;
                    let k = self.pop(offset)?;
                    self.extend_dict(offset, vec![(k, v)])?;
                }
                op::SETITEMS => {
                    let items = self.pop_mark(offset)?;
                    let entries = pair_up(items, offset)?;
                    self.extend_dict(offset, entries)?;
                }
                op::GLOBAL => {
                    let module = self.read_line(offset)?;
                    let name = self.read_line(offset)?;
                    self.push(Value::Global { module, name });
                }
                op::STACK_GLOBAL => {
                    let name = self.pop(offset)?;
                    let module = self.pop(offset)?;
                    match (module, name) {
                        (Value::Str(module), Value::Str(name)) => {
                            self.push(Value::Global { module, name })
                        }
                        _ => {
                            return Err(PickleError::Invalid {
                                offset,
                                reason: "STACK_GLOBAL expects two strings".into(),
                            })
                        }
                    }
                }
                op::REDUCE => {
                    let args = self.pop(offset)?;
                    let callable = self.pop(offset)?;
                    self.push(Value::Reduce {
                        callable: Box::new(callable),
                        args: Box::new(args),
                    });
                }
                op::BUILD => {
                    let state = self.pop(offset)?;
                    self.mutate_top(offset, |object| {
                        let inner = std::mem::replace(object, Value::None);
                        *object = Value::build(inner, state);
                        Ok(())
                    })?;
                }
                op::BINPUT => {
                    let idx = u32::from(self.read_u8()?);
                    self.memoize(idx, offset)?;
                }
                op::LONG_BINPUT => {
                    let idx = u32::from_le_bytes(self.read_array()?);
                    self.memoize(idx, offset)?;
                }
                op::MEMOIZE => {
                    let idx = self.memo.len() as u32;
                    self.memoize(idx, offset)?;
                }
                op::BINGET => {
                    let idx = u32::from(self.read_u8()?);
                    self.recall(idx)?;
                }
                op::LONG_BINGET => {
                    let idx = u32::from_le_bytes(self.read_array()?);
                    self.recall(idx)?;
                }
                other => return Err(PickleError::UnknownOpcode(other, offset)),
            }
        }
    }

    fn read_u8(&mut self) -> Result<u8, PickleError> {
        let b = *self.data.get(self.pos).ok_or(PickleError::UnexpectedEof)?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], PickleError> {
        let end = self.pos.checked_add(n).ok_or(PickleError::UnexpectedEof)?;
        let slice = self.data.get(self.pos..end).ok_or(PickleError::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], PickleError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn read_len8(&mut self, offset: usize) -> Result<usize, PickleError> {
        let n = u64::from_le_bytes(self.read_array()?);
        usize::try_from(n).map_err(|_| PickleError::Invalid {
            offset,
            reason: format!("length {} exceeds address space", n),
        })
    }

    fn read_str(&mut self, n: usize, offset: usize) -> Result<String, PickleError> {
        let bytes = self.take(n)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| PickleError::Invalid {
            offset,
            reason: "string is not valid UTF-8".into(),
        })
    }

    fn read_line(&mut self, offset: usize) -> Result<String, PickleError> {
        let rest = &self.data[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(PickleError::UnexpectedEof)?;
        let line = self.read_str(len, offset)?;
        self.pos += 1;
        Ok(line)
    }

    fn push(&mut self, value: Value) {
        self.stack.push(Slot { value, memo: None });
    }

    fn pop(&mut self, offset: usize) -> Result<Value, PickleError> {
        self.stack
            .pop()
            .map(|slot| slot.value)
            .ok_or(PickleError::StackUnderflow(offset))
    }

    fn split_values(&mut self, at: usize) -> Vec<Value> {
        self.stack.split_off(at).into_iter().map(|slot| slot.value).collect()
    }

    fn pop_mark(&mut self, offset: usize) -> Result<Vec<Value>, PickleError> {
        let mark = self.marks.pop().ok_or(PickleError::MissingMark(offset))?;
        if mark > self.stack.len() {
            return Err(PickleError::StackUnderflow(offset));
        }
        Ok(self.split_values(mark))
    }

    fn mutate_top<F>(&mut self, offset: usize, f: F) -> Result<(), PickleError>
    where
        F: FnOnce(&mut Value) -> Result<(), PickleError>,
    {
        let slot = self.stack.last_mut().ok_or(PickleError::StackUnderflow(offset))?;
        f(&mut slot.value)?;
        if let Some(idx) = slot.memo {
            self.memo.insert(idx, slot.value.clone());
        }
        Ok(())
    }

    fn extend_list(&mut self, offset: usize, items: Vec<Value>) -> Result<(), PickleError> {
        self.mutate_top(offset, |target| match target {
            Value::List(list) => {
                list.extend(items);
                Ok(())
            }
            _ => Err(PickleError::Invalid {
                offset,
                reason: "append target is not a list".into(),
            }),
        })
    }

    fn extend_dict(&mut self, offset: usize, entries: Vec<(Value, Value)>) -> Result<(), PickleError> {
        self.mutate_top(offset, |target| match target {
            Value::Dict(dict) => {
                dict.extend(entries);
                Ok(())
            }
            _ => Err(PickleError::Invalid {
                offset,
                reason: "setitem target is not a dict".into(),
            }),
        })
    }

    fn memoize(&mut self, idx: u32, offset: usize) -> Result<(), PickleError> {
        let slot = self.stack.last_mut().ok_or(PickleError::StackUnderflow(offset))?;
        slot.memo = Some(idx);
        self.memo.insert(idx, slot.value.clone());
        Ok(())
    }

    fn recall(&mut self, idx: u32) -> Result<(), PickleError> {
        let value = self.memo.get(&idx).cloned().ok_or(PickleError::MemoMiss(idx))?;
        self.stack.push(Slot {
            value,
            memo: Some(idx),
        });
        Ok(())
    }
}

fn decode_long(bytes: &[u8]) -> Option<i64> {
    if bytes.len() > 8 {
        return None;
    }
    let negative = bytes.last().is_some_and(|b| b & 0x80 != 0);
    let mut buf = if negative { [0xff; 8] } else { [0; 8] };
    buf[..bytes.len()].copy_from_slice(bytes);
    Some(i64::from_le_bytes(buf))
}

fn pair_up(items: Vec<Value>, offset: usize) -> Result<Vec<(Value, Value)>, PickleError> {
    if items.len() % 2 != 0 {
        return Err(PickleError::Invalid {
            offset,
            reason: "odd number of dict items".into(),
        });
    }
    let mut entries = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        entries.push((k, v));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ints_use_the_smallest_opcode() {
        let body = |v: i64| {
            let bytes = to_bytes(&Value::Int(v));
            bytes[2..bytes.len() - 1].to_vec()
        };
        assert_eq!(body(5), vec![op::BININT1, 5]);
        assert_eq!(body(300), vec![op::BININT2, 0x2c, 0x01]);
        assert_eq!(body(-1), vec![op::BININT, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(body(1 << 40), vec![op::LONG1, 6, 0, 0, 0, 0, 0, 1]);
        assert_eq!(body(-(1 << 40)), vec![op::LONG1, 6, 0, 0, 0, 0, 0, 0xff]);
    }

    #[test]
    fn decodes_cpython_protocol_3_with_memo() {
        // pickle.dumps([1, 'ab', (None, True), -1, 2**40, b'xy', {'k': 1.5}], protocol=3)
        let data = b"\x80\x03]q\x00(K\x01X\x02\x00\x00\x00abq\x01N\x88\x86q\x02J\xff\xff\xff\xff\x8a\x06\x00\x00\x00\x00\x00\x01C\x02xyq\x03}q\x04X\x01\x00\x00\x00kq\x05G?\xf8\x00\x00\x00\x00\x00\x00se.";
        let value = from_bytes(data).unwrap();
        assert_eq!(
            value,
            Value::List(vec![
                Value::Int(1),
                Value::Str("ab".into()),
                Value::Tuple(vec![Value::None, Value::Bool(true)]),
                Value::Int(-1),
                Value::Int(1 << 40),
                Value::Bytes(b"xy".to_vec()),
                Value::Dict(vec![(Value::Str("k".into()), Value::Float(1.5))]),
            ])
        );
    }

    #[test]
    fn decodes_cpython_protocol_4_frames() {
        // pickle.dumps([1, 'ab', (None, True)], protocol=4)
        let data = b"\x80\x04\x95\x10\x00\x00\x00\x00\x00\x00\x00]\x94(K\x01\x8c\x02ab\x94N\x88\x86\x94e.";
        let value = from_bytes(data).unwrap();
        assert_eq!(
            value,
            Value::List(vec![
                Value::Int(1),
                Value::Str("ab".into()),
                Value::Tuple(vec![Value::None, Value::Bool(true)]),
            ])
        );
    }

    #[test]
    fn memo_reflects_later_mutation() {
        // l = []; [l, l] after l.append(7): EMPTY_LIST, BINPUT 0, then BUILD-free append,
        // then a second reference via BINGET.
        let data = b"\x80\x03](]q\x00K\x07ah\x00e.";
        let value = from_bytes(data).unwrap();
        let inner = Value::List(vec![Value::Int(7)]);
        assert_eq!(value, Value::List(vec![inner.clone(), inner]));
    }

    #[test]
    fn encoded_calls_decode_to_the_same_graph() {
        let value = Value::build(
            Value::reduce(
                Value::global("numpy", "dtype"),
                vec![Value::Str("i8".into()), Value::Bool(false), Value::Bool(true)],
            ),
            Value::Tuple(vec![
                Value::Int(3),
                Value::Str("<".into()),
                Value::None,
                Value::None,
                Value::None,
                Value::Int(-1),
                Value::Int(-1),
                Value::Int(0),
            ]),
        );
        assert_eq!(from_bytes(&to_bytes(&value)).unwrap(), value);
    }

    #[test]
    fn long_byte_strings_use_binbytes() {
        let payload = vec![0xabu8; 300];
        let bytes = to_bytes(&Value::Bytes(payload.clone()));
        assert_eq!(bytes[2], op::BINBYTES);
        assert_eq!(from_bytes(&bytes).unwrap(), Value::Bytes(payload));
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let err = from_bytes(b"\x80\x03X\x05\x00\x00\x00ab").unwrap_err();
        assert!(matches!(err, PickleError::UnexpectedEof));
    }

    #[test]
    fn unknown_opcode_reports_offset() {
        let err = from_bytes(b"\x80\x03\xff.").unwrap_err();
        assert!(matches!(err, PickleError::UnknownOpcode(0xff, 2)));
    }
}
