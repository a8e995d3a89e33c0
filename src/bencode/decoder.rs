//! Bencode decoder.
//!
//! Grammar: `i<decimal>e` integers, `<len>:<bytes>` byte-strings, `l...e`
//! lists, `d(<string><value>)*e` dictionaries. The decoder accepts
//! dictionaries with any key order on input; [`encoder`](super::encoder)
//! is what enforces canonical (sorted) output.
use super::{BencodeError, BencodeResult, BencodeValue};
use std::collections::BTreeMap;
use std::io::{self, Read};
use std::iter::Peekable;
use tracing::instrument;

type ByteIter<R> = Peekable<io::Bytes<R>>;

fn next_byte<R: Read>(reader: &mut ByteIter<R>) -> BencodeResult<u8> {
    reader
        .next()
        .ok_or(BencodeError::UnexpectedEof)?
        .map_err(BencodeError::Io)
}

fn peek_byte<R: Read>(reader: &mut ByteIter<R>) -> BencodeResult<u8> {
    match reader.peek() {
        Some(Ok(b)) => Ok(*b),
        Some(Err(e)) => Err(BencodeError::Io(io::Error::new(e.kind(), e.to_string()))),
        None => Err(BencodeError::UnexpectedEof),
    }
}

/// Reads bytes up to (and consuming) `delimiter`, returning them as a
/// UTF-8 string. Used for the decimal prefixes of strings and integers.
#[instrument(skip(reader), level = "trace")]
fn read_until<R: Read>(reader: &mut ByteIter<R>, delimiter: u8) -> BencodeResult<String> {
    let mut buf = Vec::new();
    loop {
        let b = next_byte(reader)?;
        if b == delimiter {
            break;
        }
        buf.push(b);
    }
    String::from_utf8(buf)
        .map_err(|e| BencodeError::InvalidFormat(format!("non-UTF8 length/integer prefix: {e}")))
}

#[instrument(skip(reader), level = "trace")]
fn decode_string<R: Read>(reader: &mut ByteIter<R>) -> BencodeResult<Vec<u8>> {
    let len_str = read_until(reader, b':')?;
    let len: usize = len_str
        .parse()
        .map_err(|_| BencodeError::InvalidStringLength)?;
    let mut buf = vec![0u8; len];
    for slot in buf.iter_mut() {
        *slot = next_byte(reader)?;
    }
    Ok(buf)
}

#[instrument(skip(reader), level = "trace")]
fn decode_integer<R: Read>(reader: &mut ByteIter<R>) -> BencodeResult<i64> {
    let lead = next_byte(reader)?;
    if lead != b'i' {
        return Err(BencodeError::InvalidFormat(
            "integer must start with 'i'".into(),
        ));
    }
    let num_str = read_until(reader, b'e')?;

    if num_str.is_empty() || num_str == "-0" {
        return Err(BencodeError::InvalidInteger);
    }
    let unsigned = num_str.strip_prefix('-').unwrap_or(&num_str);
    if unsigned.is_empty() || (unsigned.len() > 1 && unsigned.starts_with('0')) {
        return Err(BencodeError::InvalidInteger);
    }

    num_str
        .parse::<i64>()
        .map_err(|_| BencodeError::InvalidInteger)
}

#[instrument(skip(reader), level = "trace")]
fn decode_list<R: Read>(reader: &mut ByteIter<R>) -> BencodeResult<Vec<BencodeValue>> {
    let lead = next_byte(reader)?;
    if lead != b'l' {
        return Err(BencodeError::InvalidFormat("list must start with 'l'".into()));
    }
    let mut items = Vec::new();
    loop {
        if peek_byte(reader)? == b'e' {
            next_byte(reader)?;
            break;
        }
        items.push(decode_value(reader)?);
    }
    Ok(items)
}

#[instrument(skip(reader), level = "trace")]
fn decode_dict<R: Read>(reader: &mut ByteIter<R>) -> BencodeResult<BTreeMap<Vec<u8>, BencodeValue>> {
    let lead = next_byte(reader)?;
    if lead != b'd' {
        return Err(BencodeError::InvalidFormat(
            "dictionary must start with 'd'".into(),
        ));
    }
    let mut dict = BTreeMap::new();
    loop {
        if peek_byte(reader)? == b'e' {
            next_byte(reader)?;
            break;
        }
        if !peek_byte(reader)?.is_ascii_digit() {
            return Err(BencodeError::DictKeyNotString);
        }
        let key = decode_string(reader)?;
        let value = decode_value(reader)?;
        dict.insert(key, value);
    }
    Ok(dict)
}

#[instrument(skip(reader), level = "trace")]
fn decode_value<R: Read>(reader: &mut ByteIter<R>) -> BencodeResult<BencodeValue> {
    match peek_byte(reader)? {
        b'0'..=b'9' => decode_string(reader).map(BencodeValue::Bytes),
        b'i' => decode_integer(reader).map(BencodeValue::Int),
        b'l' => decode_list(reader).map(BencodeValue::List),
        b'd' => decode_dict(reader).map(BencodeValue::Dict),
        other => Err(BencodeError::InvalidFormat(format!(
            "unexpected leading byte: {:?}",
            other as char
        ))),
    }
}

/// Decodes a single bencode value from a byte slice.
pub fn decode(bytes: &[u8]) -> BencodeResult<BencodeValue> {
    let mut reader = bytes.bytes().peekable();
    decode_value(&mut reader)
}

/// Decodes a single bencode value from any [`Read`] stream.
pub fn decode_from<R: Read>(r: R) -> BencodeResult<BencodeValue> {
    let mut reader = r.bytes().peekable();
    decode_value(&mut reader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_positive_integer() {
        assert_eq!(decode(b"i42e").unwrap(), BencodeValue::Int(42));
    }

    #[test]
    fn decodes_negative_integer() {
        assert_eq!(decode(b"i-7e").unwrap(), BencodeValue::Int(-7));
    }

    #[test]
    fn rejects_empty_integer() {
        assert!(decode(b"ie").is_err());
    }

    #[test]
    fn rejects_leading_zero_integer() {
        assert!(decode(b"i042e").is_err());
        assert!(decode(b"i-0e").is_err());
    }

    #[test]
    fn decodes_string() {
        assert_eq!(
            decode(b"4:spam").unwrap(),
            BencodeValue::Bytes(b"spam".to_vec())
        );
        assert_eq!(decode(b"0:").unwrap(), BencodeValue::Bytes(Vec::new()));
    }

    #[test]
    fn rejects_short_string() {
        assert!(decode(b"5:spam").is_err());
    }

    #[test]
    fn decodes_dict_and_sorts_keys() {
        let value = decode(b"d3:cow3:moo4:spam4:eggse").unwrap();
        let dict = value.as_dict().unwrap();
        assert_eq!(
            dict.get(b"cow".as_slice()).unwrap().as_bytes(),
            Some(&b"moo"[..])
        );
        assert_eq!(
            dict.get(b"spam".as_slice()).unwrap().as_bytes(),
            Some(&b"eggs"[..])
        );
        let keys: Vec<_> = dict.keys().collect();
        assert_eq!(keys, vec![&b"cow".to_vec(), &b"spam".to_vec()]);
    }

    #[test]
    fn decodes_nested_list() {
        let value = decode(b"li42ei-1ee").unwrap();
        assert_eq!(
            value,
            BencodeValue::List(vec![BencodeValue::Int(42), BencodeValue::Int(-1)])
        );
    }
}
