//! Response shape decoding.
//!
//! Turns the records of one RPC reply into a [`DecodedField`] tree. Scalars
//! are kept as they arrived; coercion to integer or text happens on demand,
//! so a projector can decide per field whether a mismatch is fatal.

use kamailio_binrpc::Record;

use crate::error::{CollectorError, CollectorResult, DecodeError};

/// Fault codes a server may answer with instead of a result.
const FAULT_CODES: std::ops::RangeInclusive<i64> = 400..=599;

/// A node of a decoded reply.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedField {
    Int(i64),
    Double(f64),
    Text(String),
    /// Ordered members. Keys repeat for list entries such as `SET` or `DEST`.
    Group(Vec<(String, DecodedField)>),
}

impl DecodedField {
    pub fn kind_name(&self) -> &'static str {
        match self {
            DecodedField::Int(_) => "integer",
            DecodedField::Double(_) => "double",
            DecodedField::Text(_) => "text",
            DecodedField::Group(_) => "group",
        }
    }

    fn mismatch(&self, expected: &'static str) -> DecodeError {
        DecodeError {
            expected,
            found: self.kind_name(),
        }
    }

    pub fn as_int(&self) -> Result<i64, DecodeError> {
        match self {
            DecodedField::Int(v) => Ok(*v),
            other => Err(other.mismatch("integer")),
        }
    }

    /// Integer or double, as a sample value.
    pub fn as_number(&self) -> Result<f64, DecodeError> {
        match self {
            DecodedField::Int(v) => Ok(*v as f64),
            DecodedField::Double(v) => Ok(*v),
            other => Err(other.mismatch("number")),
        }
    }

    pub fn as_text(&self) -> Result<&str, DecodeError> {
        match self {
            DecodedField::Text(s) => Ok(s),
            other => Err(other.mismatch("text")),
        }
    }

    /// Text or integer rendered as a label value.
    pub fn as_label(&self) -> Result<String, DecodeError> {
        match self {
            DecodedField::Text(s) => Ok(s.clone()),
            DecodedField::Int(v) => Ok(v.to_string()),
            other => Err(other.mismatch("text or integer")),
        }
    }

    pub fn as_group(&self) -> Result<&[(String, DecodedField)], DecodeError> {
        match self {
            DecodedField::Group(items) => Ok(items),
            other => Err(other.mismatch("group")),
        }
    }

    /// First member named `key`. `None` for scalars.
    pub fn get(&self, key: &str) -> Option<&DecodedField> {
        self.children(key).next()
    }

    /// Every member named `key`, in order.
    pub fn children<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a DecodedField> {
        let items: &[(String, DecodedField)] = match self {
            DecodedField::Group(items) => items,
            _ => &[],
        };
        items.iter().filter(move |(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Decode the reply to `method`.
///
/// A two-record `[fault code, message]` reply becomes
/// [`CollectorError::Remote`]. Anything other than a single struct record
/// is [`CollectorError::MalformedResponse`].
pub fn decode_response(method: &str, records: Vec<Record>) -> CollectorResult<DecodedField> {
    if let [Record::Int(code), Record::Str(message)] = records.as_slice() {
        if FAULT_CODES.contains(code) {
            return Err(CollectorError::Remote {
                method: method.to_string(),
                code: *code,
                message: message.clone(),
            });
        }
    }

    if records.len() != 1 {
        return Err(CollectorError::malformed(
            method,
            format!("expected 1 record, got {}", records.len()),
        ));
    }

    match records.into_iter().next() {
        Some(record @ Record::Struct(_)) => Ok(from_record(record)),
        Some(other) => Err(CollectorError::malformed(
            method,
            format!("expected a struct, got {}", other.type_name()),
        )),
        None => Err(CollectorError::malformed(method, "empty reply")),
    }
}

fn from_record(record: Record) -> DecodedField {
    match record {
        Record::Int(v) => DecodedField::Int(v),
        Record::Double(v) => DecodedField::Double(v),
        Record::Str(s) => DecodedField::Text(s),
        Record::Bytes(b) => DecodedField::Text(String::from_utf8_lossy(&b).into_owned()),
        Record::Struct(items) => {
            let mut members = Vec::with_capacity(items.len());
            for item in items {
                push_member(&mut members, &item.key, item.value);
            }
            DecodedField::Group(members)
        }
        Record::Array(values) => {
            let mut members = Vec::with_capacity(values.len());
            for value in values {
                push_member(&mut members, "", value);
            }
            DecodedField::Group(members)
        }
    }
}

/// Arrays under a member name become repeated entries with that name.
fn push_member(members: &mut Vec<(String, DecodedField)>, key: &str, value: Record) {
    match value {
        Record::Array(values) => {
            for value in values {
                push_member(members, key, value);
            }
        }
        other => members.push((key.to_string(), from_record(other))),
    }
}
