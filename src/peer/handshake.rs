//! The BitTorrent peer handshake (component D, §4.D).
//!
//! The handshake is the first exchange between two peers. It verifies
//! both sides are talking about the same torrent (via info_hash) and
//! carries the peer id each side identifies itself with.
use super::{PeerError, PeerResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::instrument;

const PROTOCOL: &[u8; 19] = b"BitTorrent protocol";

/// A parsed handshake: protocol identifier, reserved extension bytes,
/// info hash, and peer id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub reserved: [u8; 8],
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Handshake {
            reserved: [0u8; 8],
            info_hash,
            peer_id,
        }
    }

    /// Serializes into the fixed 68-byte wire form:
    /// `<1:len><19:pstr><8:reserved><20:info_hash><20:peer_id>`.
    pub fn serialize(&self) -> [u8; 68] {
        let mut buf = [0u8; 68];
        buf[0] = 19;
        buf[1..20].copy_from_slice(PROTOCOL);
        buf[20..28].copy_from_slice(&self.reserved);
        buf[28..48].copy_from_slice(&self.info_hash);
        buf[48..68].copy_from_slice(&self.peer_id);
        buf
    }

    /// Reads and validates a handshake frame off the wire, without
    /// checking it against any expected info hash (that is the caller's
    /// job via [`Handshake::validate`]).
    #[instrument(level = "trace", skip(stream))]
    async fn read(stream: &mut TcpStream) -> PeerResult<Self> {
        let mut len_buf = [0u8; 1];
        stream.read_exact(&mut len_buf).await?;
        let protocol_len = len_buf[0];
        if protocol_len != 19 {
            return Err(PeerError::InvalidProtocolLength(protocol_len));
        }

        let mut rest = [0u8; 67];
        stream.read_exact(&mut rest).await?;

        if &rest[0..19] != PROTOCOL {
            return Err(PeerError::InvalidProtocol);
        }

        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&rest[19..27]);
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&rest[27..47]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&rest[47..67]);

        Ok(Handshake {
            reserved,
            info_hash,
            peer_id,
        })
    }

    async fn write(&self, stream: &mut TcpStream) -> PeerResult<()> {
        stream.write_all(&self.serialize()).await?;
        Ok(())
    }

    pub fn validate(&self, expected_info_hash: [u8; 20]) -> PeerResult<()> {
        if self.info_hash != expected_info_hash {
            return Err(PeerError::InfoHashMismatch {
                expected: expected_info_hash,
                got: self.info_hash,
            });
        }
        Ok(())
    }

    /// Performs a full handshake over an already-connected stream: sends
    /// ours, reads and validates theirs, returns the peer's handshake
    /// (which carries their peer id for bookkeeping).
    #[instrument(level = "debug", skip(stream))]
    pub async fn perform(
        stream: &mut TcpStream,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
    ) -> PeerResult<Handshake> {
        let ours = Handshake::new(info_hash, peer_id);
        ours.write(stream).await?;

        let theirs = Handshake::read(stream).await?;
        theirs.validate(info_hash)?;
        Ok(theirs)
    }
}
