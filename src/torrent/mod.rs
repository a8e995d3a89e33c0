//! Torrent metainfo parsing and its error taxonomy.
//!
//! Single-file BitTorrent v1 metainfo only (§6): multi-file torrents are a
//! declared non-goal, so the `info` dictionary is expected to carry
//! exactly `pieces`, `piece length`, `length`, and `name`.
use thiserror::Error;

pub mod file;

pub use file::TorrentFile;

#[derive(Debug, Error)]
pub enum TorrentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bencode decoding error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("invalid torrent file format: {0}")]
    InvalidFormat(String),

    #[error("pieces length is not a positive multiple of 20")]
    InvalidPiecesHashLength,

    #[error(
        "piece count mismatch: ceil(length/piece_length) = {expected}, got {actual} hashes"
    )]
    PieceCountMismatch { expected: usize, actual: usize },

    #[error("length must be > 0")]
    NonPositiveLength,

    #[error("piece_length must be > 0")]
    NonPositivePieceLength,
}

pub type TorrentResult<T> = std::result::Result<T, TorrentError>;
