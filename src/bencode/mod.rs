//! Bencode value type and error taxonomy.
//!
//! Bencode is the BitTorrent serialization format: signed integers,
//! byte-strings, lists, and dictionaries. This module defines the value
//! representation shared by [`decoder`], [`encoder`] and [`binder`].
use std::collections::BTreeMap;
use thiserror::Error;

pub mod binder;
pub mod decoder;
pub mod encoder;

pub use binder::FromBencode;

/// A decoded bencode value.
///
/// Dictionaries use a `BTreeMap` rather than a `HashMap` so that key order
/// is always lexicographic ascending, which is both the canonical encoding
/// order (§4.A) and what makes `encode(decode(b)) == b` hold on already-
/// canonical input without a separate sort pass.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum BencodeValue {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<BencodeValue>),
    Dict(BTreeMap<Vec<u8>, BencodeValue>),
}

impl BencodeValue {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BencodeValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            BencodeValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[BencodeValue]> {
        match self {
            BencodeValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, BencodeValue>> {
        match self {
            BencodeValue::Dict(d) => Some(d),
            _ => None,
        }
    }
}

/// Errors produced while decoding or encoding bencode.
#[derive(Debug, Error)]
pub enum BencodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid bencode format: {0}")]
    InvalidFormat(String),

    #[error("invalid integer")]
    InvalidInteger,

    #[error("invalid string length")]
    InvalidStringLength,

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("cannot encode type: {0}")]
    CannotEncodeType(&'static str),

    #[error("dictionary keys must be byte-strings")]
    DictKeyNotString,

    #[error("missing or invalid field: {0}")]
    MissingField(&'static str),
}

pub type BencodeResult<T> = std::result::Result<T, BencodeError>;
