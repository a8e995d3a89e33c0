//! The `TorrentFile` record and its metainfo parsing/validation (§3, §4.B).
use super::TorrentError;
use crate::bencode::binder::{FieldSpec, Fields};
use crate::bencode::{decoder, encoder, BencodeValue};
use sha1::{Digest, Sha1};
use std::path::Path;

/// Parsed, validated, read-only metainfo for a single-file torrent.
///
/// Invariants (enforced by [`TorrentFile::parse`]): `length > 0`,
/// `piece_length > 0`, `ceil(length / piece_length) == piece_hashes.len()`,
/// and `info_hash == SHA1(canonical_bencode(info_subtree))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentFile {
    pub announce: String,
    pub info_hash: [u8; 20],
    pub piece_hashes: Vec<[u8; 20]>,
    pub piece_length: i64,
    pub length: i64,
    pub name: String,
}

const HASH_LEN: usize = 20;

fn split_piece_hashes(pieces: &[u8]) -> Result<Vec<[u8; 20]>, TorrentError> {
    if pieces.is_empty() || pieces.len() % HASH_LEN != 0 {
        return Err(TorrentError::InvalidPiecesHashLength);
    }
    Ok(pieces
        .chunks_exact(HASH_LEN)
        .map(|chunk| {
            let mut hash = [0u8; HASH_LEN];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect())
}

fn info_hash_of(info_dict: &BencodeValue) -> Result<[u8; 20], TorrentError> {
    let canonical = encoder::encode_to_vec(info_dict)?;
    let mut hasher = Sha1::new();
    hasher.update(&canonical);
    let digest = hasher.finalize();
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    Ok(out)
}

impl TorrentFile {
    /// Parses and validates a previously-decoded metainfo value.
    ///
    /// The `info` sub-dictionary's `BencodeValue` (not a reconstruction
    /// from the typed fields) is what gets re-encoded for the info-hash
    /// computation, so the hash stays byte-faithful to whatever the
    /// source file actually contained (§4.B).
    pub fn parse(root: &BencodeValue) -> Result<Self, TorrentError> {
        let root_fields = Fields::new(
            root.as_dict()
                .ok_or_else(|| TorrentError::InvalidFormat("metainfo root is not a dict".into()))?,
        );

        let announce = root_fields.get_string_required(FieldSpec::required("announce"))?;

        let info_value = root_fields
            .get(FieldSpec::required("info"))
            .ok_or_else(|| TorrentError::InvalidFormat("missing \"info\" dictionary".into()))?;
        let info_dict = info_value
            .as_dict()
            .ok_or_else(|| TorrentError::InvalidFormat("\"info\" is not a dictionary".into()))?;
        let info_fields = Fields::new(info_dict);

        let piece_length = info_fields.get_int_required(FieldSpec::required("piece length"))?;
        let pieces = info_fields.get_bytes_required(FieldSpec::required("pieces"))?;
        let length = info_fields.get_int_required(FieldSpec::required("length"))?;
        let name = info_fields.get_string_required(FieldSpec::required("name"))?;

        if length <= 0 {
            return Err(TorrentError::NonPositiveLength);
        }
        if piece_length <= 0 {
            return Err(TorrentError::NonPositivePieceLength);
        }

        let piece_hashes = split_piece_hashes(&pieces)?;
        let expected_pieces = ((length + piece_length - 1) / piece_length) as usize;
        if piece_hashes.len() != expected_pieces {
            return Err(TorrentError::PieceCountMismatch {
                expected: expected_pieces,
                actual: piece_hashes.len(),
            });
        }

        let info_hash = info_hash_of(info_value)?;

        Ok(TorrentFile {
            announce,
            info_hash,
            piece_hashes,
            piece_length,
            length,
            name,
        })
    }

    /// Reads and parses a `.torrent` file from disk.
    #[tracing::instrument(level = "debug")]
    pub fn load(path: &Path) -> Result<Self, TorrentError> {
        let bytes = std::fs::read(path)?;
        let value = decoder::decode(&bytes)?;
        Self::parse(&value)
    }

    pub fn num_pieces(&self) -> usize {
        self.piece_hashes.len()
    }

    /// Size in bytes of piece `index`: `piece_length` for every piece
    /// except possibly the last, whose size is `length - piece_length *
    /// (num_pieces - 1)` (§8 law 6).
    pub fn piece_size(&self, index: usize) -> i64 {
        let (begin, end) = self.piece_bounds(index);
        end - begin
    }

    fn piece_bounds(&self, index: usize) -> (i64, i64) {
        let begin = index as i64 * self.piece_length;
        let end = (begin + self.piece_length).min(self.length);
        (begin, end)
    }

    /// `(begin, end)` byte offsets of piece `index` within the assembled
    /// output buffer.
    pub fn bounds_for_piece(&self, index: usize) -> (usize, usize) {
        let (begin, end) = self.piece_bounds(index);
        (begin as usize, end as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bytes(piece_length: i64, length: i64, num_pieces: usize) -> Vec<u8> {
        let pieces: Vec<u8> = (0..num_pieces).flat_map(|i| [i as u8; 20]).collect();
        let bencoded = format!(
            "d8:announce20:http://tracker.test/4:infod6:lengthi{length}e12:piece lengthi{piece_length}e6:pieces{}:{}4:name4:testee",
            pieces.len(),
            String::from_utf8_lossy(&pieces),
        );
        bencoded.into_bytes()
    }

    #[test]
    fn piece_size_is_uniform_except_last() {
        // 3 pieces of 16384, total 40000 => last piece is 7232 bytes.
        let pieces: Vec<u8> = (0..3).flat_map(|i| [i as u8; 20]).collect();
        let mut info = std::collections::BTreeMap::new();
        info.insert(b"piece length".to_vec(), BencodeValue::Int(16384));
        info.insert(b"length".to_vec(), BencodeValue::Int(40000));
        info.insert(b"pieces".to_vec(), BencodeValue::Bytes(pieces));
        info.insert(b"name".to_vec(), BencodeValue::Bytes(b"file.bin".to_vec()));
        let mut root = std::collections::BTreeMap::new();
        root.insert(
            b"announce".to_vec(),
            BencodeValue::Bytes(b"http://tracker.test/announce".to_vec()),
        );
        root.insert(b"info".to_vec(), BencodeValue::Dict(info));

        let tf = TorrentFile::parse(&BencodeValue::Dict(root)).unwrap();
        assert_eq!(tf.num_pieces(), 3);
        assert_eq!(tf.piece_size(0), 16384);
        assert_eq!(tf.piece_size(1), 16384);
        assert_eq!(tf.piece_size(2), 7232);
        assert_eq!((0..3).map(|i| tf.piece_size(i)).sum::<i64>(), tf.length);
    }

    #[test]
    fn rejects_piece_count_mismatch() {
        let bytes = sample_bytes(16384, 40000, 2); // should be 3 pieces, only 2 given
        let value = decoder::decode(&bytes).unwrap();
        assert!(matches!(
            TorrentFile::parse(&value),
            Err(TorrentError::PieceCountMismatch { .. })
        ));
    }

    #[test]
    fn rejects_malformed_pieces_length() {
        let mut info = std::collections::BTreeMap::new();
        info.insert(b"piece length".to_vec(), BencodeValue::Int(10));
        info.insert(b"length".to_vec(), BencodeValue::Int(10));
        info.insert(b"pieces".to_vec(), BencodeValue::Bytes(vec![0u8; 19]));
        info.insert(b"name".to_vec(), BencodeValue::Bytes(b"x".to_vec()));
        let mut root = std::collections::BTreeMap::new();
        root.insert(b"announce".to_vec(), BencodeValue::Bytes(b"x".to_vec()));
        root.insert(b"info".to_vec(), BencodeValue::Dict(info));
        assert!(matches!(
            TorrentFile::parse(&BencodeValue::Dict(root)),
            Err(TorrentError::InvalidPiecesHashLength)
        ));
    }

    #[test]
    fn info_hash_is_sha1_of_canonical_info_subtree() {
        let mut info = std::collections::BTreeMap::new();
        info.insert(b"piece length".to_vec(), BencodeValue::Int(5));
        info.insert(b"length".to_vec(), BencodeValue::Int(5));
        info.insert(b"pieces".to_vec(), BencodeValue::Bytes(vec![7u8; 20]));
        info.insert(b"name".to_vec(), BencodeValue::Bytes(b"f".to_vec()));
        let info_value = BencodeValue::Dict(info);
        let mut root = std::collections::BTreeMap::new();
        root.insert(b"announce".to_vec(), BencodeValue::Bytes(b"x".to_vec()));
        root.insert(b"info".to_vec(), info_value.clone());

        let tf = TorrentFile::parse(&BencodeValue::Dict(root)).unwrap();
        let expected = info_hash_of(&info_value).unwrap();
        assert_eq!(tf.info_hash, expected);
    }
}
