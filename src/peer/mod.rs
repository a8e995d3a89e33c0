//! Peer-wire protocol: framer (D) and per-peer session state machine (E).
use thiserror::Error;

pub mod bitfield;
pub mod handshake;
pub mod message;
pub mod session;

pub use bitfield::Bitfield;
pub use handshake::Handshake;
pub use message::{Message, MessageId};
pub use session::{PeerSession, PieceResult, WorkItem};

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("invalid protocol length: {0}")]
    InvalidProtocolLength(u8),

    #[error("invalid protocol identifier")]
    InvalidProtocol,

    #[error("info hash mismatch: expected {expected:02x?}, got {got:02x?}")]
    InfoHashMismatch { expected: [u8; 20], got: [u8; 20] },

    #[error("timed out waiting for the peer's first message")]
    BitfieldTimeout,

    #[error("expected a Bitfield as the first message, got {0}")]
    ExpectedBitfield(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("piece #{index} failed its integrity check")]
    IntegrityMismatch { index: usize },
}

pub type PeerResult<T> = std::result::Result<T, PeerError>;
