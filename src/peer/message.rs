//! Length-prefixed peer-wire message framer (component D, §4.D).
//!
//! Wire shape: a 4-byte big-endian length prefix, then (if length > 0) an
//! id byte followed by the payload. A zero-length frame is a keep-alive.
use super::{PeerError, PeerResult};
use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub const MAX_BLOCK_SIZE: usize = 16384;

/// A cap on payload length the framer will accept before erroring: the
/// engine never legitimately sees a message larger than a full block plus
/// the id/index/begin overhead (§4.D: "payloads ≤ maxBlockSize + 13").
const MAX_PAYLOAD_LEN: u32 = (MAX_BLOCK_SIZE + 13) as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageId {
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have,
    Bitfield,
    Request,
    Piece,
    Cancel,
    /// An id outside 0..=8. Tolerated, not an error (§4.D, Design Note 2).
    Unknown(u8),
}

impl MessageId {
    fn to_byte(self) -> u8 {
        match self {
            MessageId::Choke => 0,
            MessageId::Unchoke => 1,
            MessageId::Interested => 2,
            MessageId::NotInterested => 3,
            MessageId::Have => 4,
            MessageId::Bitfield => 5,
            MessageId::Request => 6,
            MessageId::Piece => 7,
            MessageId::Cancel => 8,
            MessageId::Unknown(b) => b,
        }
    }

    fn from_byte(b: u8) -> Self {
        match b {
            0 => MessageId::Choke,
            1 => MessageId::Unchoke,
            2 => MessageId::Interested,
            3 => MessageId::NotInterested,
            4 => MessageId::Have,
            5 => MessageId::Bitfield,
            6 => MessageId::Request,
            7 => MessageId::Piece,
            8 => MessageId::Cancel,
            other => MessageId::Unknown(other),
        }
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MessageId::Choke => "Choke",
            MessageId::Unchoke => "Unchoke",
            MessageId::Interested => "Interested",
            MessageId::NotInterested => "NotInterested",
            MessageId::Have => "Have",
            MessageId::Bitfield => "Bitfield",
            MessageId::Request => "Request",
            MessageId::Piece => "Piece",
            MessageId::Cancel => "Cancel",
            MessageId::Unknown(id) => return write!(f, "Unknown#{id}"),
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    pub payload: Bytes,
}

impl Message {
    pub fn new(id: MessageId, payload: Bytes) -> Self {
        Message { id, payload }
    }

    pub fn interested() -> Self {
        Message::new(MessageId::Interested, Bytes::new())
    }

    pub fn unchoke() -> Self {
        Message::new(MessageId::Unchoke, Bytes::new())
    }

    pub fn request(index: u32, begin: u32, length: u32) -> Self {
        let mut payload = BytesMut::with_capacity(12);
        payload.put_u32(index);
        payload.put_u32(begin);
        payload.put_u32(length);
        Message::new(MessageId::Request, payload.freeze())
    }

    pub fn have(index: u32) -> Self {
        let mut payload = BytesMut::with_capacity(4);
        payload.put_u32(index);
        Message::new(MessageId::Have, payload.freeze())
    }

    /// Human-readable tag for tracing, mirroring the original's
    /// `messageName()`/`String()` helpers (SPEC_FULL §2).
    pub fn describe(msg: Option<&Message>) -> String {
        match msg {
            None => "KeepAlive".to_string(),
            Some(m) => format!("{} [{}]", m.id, m.payload.len()),
        }
    }

    /// Serializes into `<len prefix><id><payload>`. `None` serializes as
    /// the 4 zero bytes of a keep-alive.
    pub fn serialize(msg: Option<&Message>) -> Bytes {
        match msg {
            None => Bytes::from_static(&[0, 0, 0, 0]),
            Some(m) => {
                let len = 1 + m.payload.len() as u32;
                let mut buf = BytesMut::with_capacity(4 + len as usize);
                buf.put_u32(len);
                buf.put_u8(m.id.to_byte());
                buf.extend_from_slice(&m.payload);
                buf.freeze()
            }
        }
    }

    /// Reads one frame from the stream. Returns `Ok(None)` for a
    /// keep-alive.
    pub async fn read(stream: &mut TcpStream) -> PeerResult<Option<Message>> {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let len = BigEndian::read_u32(&len_buf);
        if len == 0 {
            return Ok(None);
        }
        if len > MAX_PAYLOAD_LEN {
            return Err(PeerError::Protocol(format!(
                "message length {len} exceeds cap {MAX_PAYLOAD_LEN}"
            )));
        }
        let mut body = vec![0u8; len as usize];
        stream.read_exact(&mut body).await?;
        let id = MessageId::from_byte(body[0]);
        let payload = Bytes::copy_from_slice(&body[1..]);
        Ok(Some(Message::new(id, payload)))
    }

    pub async fn write(stream: &mut TcpStream, msg: Option<&Message>) -> PeerResult<()> {
        let buf = Message::serialize(msg);
        stream.write_all(&buf).await?;
        Ok(())
    }
}

/// Parses a Have payload (4-byte big-endian piece index), §4.D.
pub fn parse_have(msg: &Message) -> PeerResult<u32> {
    if msg.id != MessageId::Have {
        return Err(PeerError::Protocol(format!(
            "expected Have, got {}",
            msg.id
        )));
    }
    if msg.payload.len() != 4 {
        return Err(PeerError::Protocol(format!(
            "Have payload must be 4 bytes, got {}",
            msg.payload.len()
        )));
    }
    Ok(BigEndian::read_u32(&msg.payload))
}

/// Parsed fields of a Piece message: `(index, begin, data)`.
pub struct ParsedPiece<'a> {
    pub index: u32,
    pub begin: u32,
    pub data: &'a [u8],
}

/// Parses a Piece payload: `<index:4><begin:4><data>` (§4.D, §4.E).
pub fn parse_piece(msg: &Message) -> PeerResult<ParsedPiece<'_>> {
    if msg.id != MessageId::Piece {
        return Err(PeerError::Protocol(format!(
            "expected Piece, got {}",
            msg.id
        )));
    }
    if msg.payload.len() < 8 {
        return Err(PeerError::Protocol(format!(
            "Piece payload too short: {} < 8",
            msg.payload.len()
        )));
    }
    let index = BigEndian::read_u32(&msg.payload[0..4]);
    let begin = BigEndian::read_u32(&msg.payload[4..8]);
    let data = &msg.payload[8..];
    Ok(ParsedPiece { index, begin, data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_keep_alive_as_four_zero_bytes() {
        assert_eq!(&Message::serialize(None)[..], &[0, 0, 0, 0]);
    }

    #[test]
    fn serializes_have_message() {
        let msg = Message::have(1);
        let buf = Message::serialize(Some(&msg));
        // length = 13, id = 6 (Request)... actually Have id=4
        assert_eq!(&buf[..4], &13u32.to_be_bytes());
        assert_eq!(buf[4], 4);
        assert_eq!(&buf[5..], &1u32.to_be_bytes());
    }

    #[test]
    fn serializes_request_message() {
        let msg = Message::request(1, 0, 16384);
        let buf = Message::serialize(Some(&msg));
        assert_eq!(buf.len(), 17);
        assert_eq!(&buf[..4], &13u32.to_be_bytes());
        assert_eq!(buf[4], 6);
    }

    #[test]
    fn parse_have_rejects_wrong_payload_len() {
        let bad = Message::new(MessageId::Have, Bytes::from_static(&[0, 0]));
        assert!(parse_have(&bad).is_err());
    }

    #[test]
    fn parse_piece_extracts_index_begin_data() {
        let mut payload = BytesMut::new();
        payload.put_u32(2);
        payload.put_u32(16384);
        payload.extend_from_slice(b"hello");
        let msg = Message::new(MessageId::Piece, payload.freeze());
        let parsed = parse_piece(&msg).unwrap();
        assert_eq!(parsed.index, 2);
        assert_eq!(parsed.begin, 16384);
        assert_eq!(parsed.data, b"hello");
    }

    #[test]
    fn unknown_message_id_round_trips() {
        assert_eq!(MessageId::from_byte(42), MessageId::Unknown(42));
        assert_eq!(MessageId::Unknown(42).to_byte(), 42);
    }
}
