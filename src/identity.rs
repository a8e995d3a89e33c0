//! Peer identity (component G): a random 20-byte peer id.
use rand::Rng;

/// Client prefix before the random suffix, Azureus-style but without a
/// full BEP-20 compliance requirement (§4.G: "no BEP-20 client prefix is
/// required"). Kept anyway since it costs nothing and helps a tracker or
/// packet capture identify the client during debugging.
const CLIENT_PREFIX: &[u8; 8] = b"-RT0001-";

/// Generates a fresh 20-byte peer id: an 8-byte client prefix followed by
/// 12 cryptographically random bytes.
pub fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    peer_id[..CLIENT_PREFIX.len()].copy_from_slice(CLIENT_PREFIX);
    rand::rng().fill(&mut peer_id[CLIENT_PREFIX.len()..]);
    peer_id
}
