//! BINRPC record encoding and decoding.
//!
//! Every value on the wire is a record introduced by a one-byte tag:
//!
//! ```text
//!  7   6 5 4   3 2 1 0
//! | S | size  |  type  |
//! ```
//!
//! With `S = 0`, `size` is the length of the value that follows (0-7
//! bytes). With `S = 1`, `size` is the width of a big-endian length field
//! that precedes the value. Structs and arrays are bracketed by a start tag
//! (size 0) and an end tag (size 1); struct members are a name record
//! followed by the member value. Arrays may carry named members too
//! (`dispatcher.list` nests its sets that way); such an array decodes as
//! a [`Record::Struct`].

use crate::error::{BinRpcError, BinRpcResult};

pub const TYPE_INT: u8 = 0x0;
pub const TYPE_STR: u8 = 0x1;
pub const TYPE_DOUBLE: u8 = 0x2;
pub const TYPE_STRUCT: u8 = 0x3;
pub const TYPE_BYTES: u8 = 0x4;
pub const TYPE_AVP: u8 = 0x5;
pub const TYPE_ARRAY: u8 = 0x6;

const SIZE_OF_SIZE: u8 = 0x80;
const END_MARK: u8 = 0x1;

/// A decoded BINRPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Int(i64),
    Str(String),
    /// Doubles travel as integers scaled by 1000.
    Double(f64),
    Bytes(Vec<u8>),
    Struct(Vec<StructItem>),
    Array(Vec<Record>),
}

/// A named struct member. Names may repeat within one struct.
#[derive(Debug, Clone, PartialEq)]
pub struct StructItem {
    pub key: String,
    pub value: Record,
}

impl StructItem {
    pub fn new(key: impl Into<String>, value: Record) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

impl Record {
    /// Build a struct record from `(name, value)` pairs, preserving order.
    pub fn from_items<K: Into<String>>(items: impl IntoIterator<Item = (K, Record)>) -> Self {
        Record::Struct(
            items
                .into_iter()
                .map(|(key, value)| StructItem::new(key, value))
                .collect(),
        )
    }

    pub fn str(value: impl Into<String>) -> Self {
        Record::Str(value.into())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Record::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Record::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn struct_items(&self) -> Option<&[StructItem]> {
        match self {
            Record::Struct(items) => Some(items),
            _ => None,
        }
    }

    /// Short name of the record type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Record::Int(_) => "int",
            Record::Str(_) => "string",
            Record::Double(_) => "double",
            Record::Bytes(_) => "bytes",
            Record::Struct(_) => "struct",
            Record::Array(_) => "array",
        }
    }

    /// Append the wire form of this record to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Record::Int(v) => write_value(buf, TYPE_INT, &int_bytes(*v)),
            Record::Str(s) => write_value(buf, TYPE_STR, &nul_terminated(s)),
            Record::Double(f) => {
                write_value(buf, TYPE_DOUBLE, &int_bytes((f * 1000.0).round() as i64))
            }
            Record::Bytes(b) => write_value(buf, TYPE_BYTES, b),
            Record::Struct(items) => {
                buf.push(TYPE_STRUCT);
                for item in items {
                    write_value(buf, TYPE_AVP, &nul_terminated(&item.key));
                    item.value.encode(buf);
                }
                buf.push(END_MARK << 4 | TYPE_STRUCT);
            }
            Record::Array(values) => {
                buf.push(TYPE_ARRAY);
                for value in values {
                    value.encode(buf);
                }
                buf.push(END_MARK << 4 | TYPE_ARRAY);
            }
        }
    }
}

/// Decode every record in a packet payload.
pub fn decode_records(payload: &[u8]) -> BinRpcResult<Vec<Record>> {
    let mut reader = RecordReader { buf: payload, pos: 0 };
    let mut records = Vec::new();
    while reader.pos < reader.buf.len() {
        records.push(reader.read_record()?);
    }
    Ok(records)
}

/// Encode a sequence of records back to back.
pub fn encode_records(records: &[Record]) -> Vec<u8> {
    let mut buf = Vec::new();
    for record in records {
        record.encode(&mut buf);
    }
    buf
}

#[derive(Debug, Clone, Copy)]
struct Tag {
    ty: u8,
    size: usize,
    /// Size-of-size bit clear and size field equal to one.
    end: bool,
}

struct RecordReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    fn take(&mut self, n: usize) -> BinRpcResult<&'a [u8]> {
        let available = self.buf.len() - self.pos;
        if n > available {
            return Err(BinRpcError::Truncated {
                needed: n,
                available,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_tag(&mut self) -> BinRpcResult<Tag> {
        let byte = self.take(1)?[0];
        let ty = byte & 0x0f;
        let size_field = (byte >> 4) & 0x07;
        if byte & SIZE_OF_SIZE != 0 {
            let len = be_uint(self.take(size_field as usize)?)?;
            let size = usize::try_from(len)
                .map_err(|_| BinRpcError::InvalidRecord(format!("record length {len} too large")))?;
            Ok(Tag {
                ty,
                size,
                end: false,
            })
        } else {
            Ok(Tag {
                ty,
                size: size_field as usize,
                end: size_field == END_MARK,
            })
        }
    }

    fn read_record(&mut self) -> BinRpcResult<Record> {
        let tag = self.read_tag()?;
        self.read_value(tag)
    }

    fn read_value(&mut self, tag: Tag) -> BinRpcResult<Record> {
        match tag.ty {
            TYPE_INT => Ok(Record::Int(decode_int(self.take(tag.size)?)?)),
            TYPE_STR => Ok(Record::Str(decode_str(self.take(tag.size)?))),
            TYPE_DOUBLE => Ok(Record::Double(
                decode_int(self.take(tag.size)?)? as f64 / 1000.0,
            )),
            TYPE_BYTES => Ok(Record::Bytes(self.take(tag.size)?.to_vec())),
            TYPE_STRUCT if tag.size == 0 => self.read_struct(),
            TYPE_ARRAY if tag.size == 0 => self.read_array(),
            TYPE_STRUCT | TYPE_ARRAY => Err(BinRpcError::InvalidRecord(
                "container end without matching start".to_string(),
            )),
            TYPE_AVP => Err(BinRpcError::InvalidRecord(
                "member name outside of a struct".to_string(),
            )),
            other => Err(BinRpcError::UnknownType(other)),
        }
    }

    fn read_struct(&mut self) -> BinRpcResult<Record> {
        let mut items = Vec::new();
        loop {
            let tag = self.read_tag()?;
            if tag.ty == TYPE_STRUCT && tag.end {
                return Ok(Record::Struct(items));
            }
            if tag.ty != TYPE_AVP {
                return Err(BinRpcError::InvalidRecord(format!(
                    "expected struct member name, found type {:#x}",
                    tag.ty
                )));
            }
            let key = decode_str(self.take(tag.size)?);
            let value = self.read_record()?;
            items.push(StructItem { key, value });
        }
    }

    /// An array holding any named member decodes as a struct; its unnamed
    /// values get an empty key.
    fn read_array(&mut self) -> BinRpcResult<Record> {
        let mut items = Vec::new();
        let mut named = false;
        loop {
            let tag = self.read_tag()?;
            if tag.ty == TYPE_ARRAY && tag.end {
                break;
            }
            let item = if tag.ty == TYPE_AVP {
                named = true;
                let key = decode_str(self.take(tag.size)?);
                StructItem {
                    key,
                    value: self.read_record()?,
                }
            } else {
                StructItem {
                    key: String::new(),
                    value: self.read_value(tag)?,
                }
            };
            items.push(item);
        }

        if named {
            Ok(Record::Struct(items))
        } else {
            Ok(Record::Array(items.into_iter().map(|item| item.value).collect()))
        }
    }
}

fn write_value(buf: &mut Vec<u8>, ty: u8, value: &[u8]) {
    let len = value.len();
    if len < 8 {
        buf.push((len as u8) << 4 | ty);
    } else {
        let width = min_width(len as u64);
        buf.push(SIZE_OF_SIZE | (width as u8) << 4 | ty);
        buf.extend_from_slice(&(len as u64).to_be_bytes()[8 - width..]);
    }
    buf.extend_from_slice(value);
}

/// Minimal big-endian width for `value`; zero needs no bytes.
pub(crate) fn min_width(value: u64) -> usize {
    8 - (value.leading_zeros() as usize / 8)
}

/// Integers use the minimal unsigned width up to three bytes; four bytes
/// carry a signed 32-bit value and eight bytes a signed 64-bit value.
fn int_bytes(v: i64) -> Vec<u8> {
    if (0..1 << 24).contains(&v) {
        let width = min_width(v as u64);
        v.to_be_bytes()[8 - width..].to_vec()
    } else if let Ok(v) = i32::try_from(v) {
        v.to_be_bytes().to_vec()
    } else {
        v.to_be_bytes().to_vec()
    }
}

fn decode_int(bytes: &[u8]) -> BinRpcResult<i64> {
    match bytes.len() {
        4 => Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64),
        8 => Ok(i64::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ])),
        _ => Ok(be_uint(bytes)? as i64),
    }
}

pub(crate) fn be_uint(bytes: &[u8]) -> BinRpcResult<u64> {
    if bytes.len() > 8 {
        return Err(BinRpcError::InvalidRecord(format!(
            "{}-byte integer field",
            bytes.len()
        )));
    }
    Ok(bytes.iter().fold(0u64, |acc, b| acc << 8 | *b as u64))
}

fn nul_terminated(s: &str) -> Vec<u8> {
    let mut value = Vec::with_capacity(s.len() + 1);
    value.extend_from_slice(s.as_bytes());
    value.push(0);
    value
}

fn decode_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
