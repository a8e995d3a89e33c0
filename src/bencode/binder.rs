//! Table-driven binding from [`BencodeValue`] into typed records.
//!
//! This is a hand-written stand-in for the reflection-driven binder in the
//! original Go implementation (`beencode_decoder.go`'s `structBuilder`):
//! instead of walking struct fields at runtime, each record implements
//! [`FromBencode`] and looks its fields up by name through [`Fields::get`],
//! which matches case-insensitively against a small per-field
//! [`FieldSpec`] (a rename tag plus an "omit if empty" flag, mirrored from
//! the original's `bencodeKey`/`omitempty` tag handling). Missing optional
//! fields simply resolve to `None`/the type's default, matching "missing
//! keys leave the target field at its zero value" (§4.A).
use super::{BencodeError, BencodeResult, BencodeValue};
use std::collections::BTreeMap;

/// Describes how one struct field maps onto a bencode dictionary key.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// The bencode dictionary key, matched case-insensitively.
    pub key: &'static str,
    /// If true, an encoder would omit this field when its value is the
    /// type's zero value. Decoding is unaffected; this is carried for
    /// round-trip fidelity with records that are also re-encoded.
    pub omit_if_empty: bool,
}

impl FieldSpec {
    pub const fn required(key: &'static str) -> Self {
        FieldSpec {
            key,
            omit_if_empty: false,
        }
    }

    pub const fn optional(key: &'static str) -> Self {
        FieldSpec {
            key,
            omit_if_empty: true,
        }
    }
}

/// A borrowed view over a bencode dictionary, offering case-insensitive,
/// typed field lookups.
pub struct Fields<'a> {
    dict: &'a BTreeMap<Vec<u8>, BencodeValue>,
}

impl<'a> Fields<'a> {
    pub fn new(dict: &'a BTreeMap<Vec<u8>, BencodeValue>) -> Self {
        Fields { dict }
    }

    /// Looks up a raw value by field spec, case-insensitive on the key.
    pub fn get(&self, spec: FieldSpec) -> Option<&'a BencodeValue> {
        self.dict
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(spec.key.as_bytes()))
            .map(|(_, v)| v)
    }

    pub fn get_bytes(&self, spec: FieldSpec) -> Option<&'a [u8]> {
        self.get(spec).and_then(BencodeValue::as_bytes)
    }

    pub fn get_int(&self, spec: FieldSpec) -> Option<i64> {
        self.get(spec).and_then(BencodeValue::as_int)
    }

    pub fn get_list(&self, spec: FieldSpec) -> Option<&'a [BencodeValue]> {
        self.get(spec).and_then(BencodeValue::as_list)
    }

    pub fn get_dict(&self, spec: FieldSpec) -> Option<&'a BTreeMap<Vec<u8>, BencodeValue>> {
        self.get(spec).and_then(BencodeValue::as_dict)
    }

    /// Like `get_bytes`, but requires the field to be present and valid
    /// UTF-8, converting straight to an owned `String`.
    pub fn get_string_required(&self, spec: FieldSpec) -> BencodeResult<String> {
        let bytes = self
            .get_bytes(spec)
            .ok_or(BencodeError::MissingField(spec.key))?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| BencodeError::InvalidFormat(format!("{}: not UTF-8 ({e})", spec.key)))
    }

    pub fn get_string_optional(&self, spec: FieldSpec) -> String {
        self.get_bytes(spec)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }

    pub fn get_int_required(&self, spec: FieldSpec) -> BencodeResult<i64> {
        self.get_int(spec).ok_or(BencodeError::MissingField(spec.key))
    }

    pub fn get_bytes_required(&self, spec: FieldSpec) -> BencodeResult<Vec<u8>> {
        self.get_bytes(spec)
            .map(|b| b.to_vec())
            .ok_or(BencodeError::MissingField(spec.key))
    }
}

/// Binds a [`BencodeValue`] (expected to be a dictionary) into a typed
/// record. Unknown keys are ignored; this mirrors the original's "first
/// match wins, everything else is skipped" binder.
pub trait FromBencode: Sized {
    fn from_bencode(value: &BencodeValue) -> BencodeResult<Self>;
}

/// Convenience for callers that already have a dict view in hand.
pub fn require_dict(value: &BencodeValue) -> BencodeResult<Fields<'_>> {
    match value {
        BencodeValue::Dict(d) => Ok(Fields::new(d)),
        _ => Err(BencodeError::InvalidFormat("expected a dictionary".into())),
    }
}
