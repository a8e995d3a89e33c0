//! HTTP tracker client (component C, §4.C).
//!
//! Builds the announce URL, issues the GET, and decodes the compact peer
//! list from the bencoded response. Always requests `compact=1`, so only
//! the compact (6-bytes-per-peer) response shape is handled — a
//! conforming tracker given `compact=1` replies compact (§6).
use crate::bencode::binder::{FieldSpec, Fields};
use crate::bencode::{decoder, BencodeError};
use crate::torrent::TorrentFile;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

const TRACKER_TIMEOUT: Duration = Duration::from_secs(15);
const PEER_ENTRY_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("failed to build tracker URL: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("tracker request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("tracker response decoding error: {0}")]
    Bencode(#[from] BencodeError),

    #[error("tracker returned a malformed compact peer list (length {0} not a multiple of 6)")]
    MalformedPeerList(usize),
}

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

/// A peer address as returned by the tracker (§3: "compact" peer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Peer {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl Peer {
    pub fn socket_addr(&self) -> std::net::SocketAddrV4 {
        std::net::SocketAddrV4::new(self.ip, self.port)
    }
}

/// The decoded (interval, peers) pair from a tracker announce response.
#[derive(Debug)]
pub struct AnnounceResponse {
    pub interval: i64,
    pub peers: Vec<Peer>,
}

fn percent_encode_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for &b in bytes {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char);
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Builds the tracker announce URL for a torrent, independent of
/// performing the HTTP GET (kept separate so URL construction is
/// testable without a network round trip — see SPEC_FULL §2).
///
/// `info_hash` and `peer_id` are raw 20-byte values, not valid UTF-8 in
/// general, so they are percent-encoded by hand and appended to the URL's
/// string form directly rather than through `Url::query_pairs_mut`, which
/// requires `&str` inputs.
pub fn build_tracker_url(
    torrent: &TorrentFile,
    peer_id: [u8; 20],
    port: u16,
) -> TrackerResult<String> {
    let mut base = url::Url::parse(&torrent.announce)?;
    base.set_query(None);
    let query = format!(
        "info_hash={}&peer_id={}&port={port}&uploaded=0&downloaded=0&compact=1&left={}",
        percent_encode_bytes(&torrent.info_hash),
        percent_encode_bytes(&peer_id),
        torrent.length,
    );
    Ok(format!("{base}?{query}"))
}

fn parse_compact_peers(bytes: &[u8]) -> TrackerResult<Vec<Peer>> {
    if bytes.len() % PEER_ENTRY_LEN != 0 {
        return Err(TrackerError::MalformedPeerList(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(PEER_ENTRY_LEN)
        .map(|chunk| Peer {
            ip: Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]),
            port: u16::from_be_bytes([chunk[4], chunk[5]]),
        })
        .collect())
}

fn parse_announce_response(body: &[u8]) -> TrackerResult<AnnounceResponse> {
    let value = decoder::decode(body)?;
    let fields = Fields::new(value.as_dict().ok_or_else(|| {
        BencodeError::InvalidFormat("tracker response is not a dictionary".into())
    })?);
    let interval = fields.get_int(FieldSpec::optional("interval")).unwrap_or(0);
    let peers_bytes = fields
        .get_bytes(FieldSpec::required("peers"))
        .ok_or(BencodeError::MissingField("peers"))?;
    let peers = parse_compact_peers(peers_bytes)?;
    Ok(AnnounceResponse { interval, peers })
}

/// Client for announcing to a single HTTP tracker.
pub struct TrackerClient {
    http: reqwest::Client,
}

impl TrackerClient {
    pub fn new() -> TrackerResult<Self> {
        let http = reqwest::Client::builder().timeout(TRACKER_TIMEOUT).build()?;
        Ok(TrackerClient { http })
    }

    /// Sends an announce request and returns the peer list (§4.C).
    #[tracing::instrument(skip(self, torrent), level = "debug")]
    pub async fn announce(
        &self,
        torrent: &TorrentFile,
        peer_id: [u8; 20],
        port: u16,
    ) -> TrackerResult<AnnounceResponse> {
        let url = build_tracker_url(torrent, peer_id, port)?;
        tracing::debug!(%url, "announcing to tracker");
        let response = self.http.get(url.as_str()).send().await?;
        let body = response.bytes().await?;
        parse_announce_response(&body)
    }
}
