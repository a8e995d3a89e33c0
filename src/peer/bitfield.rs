//! Packed, MSB-first bitfield advertising which pieces a peer has (§3).
use bytes::BytesMut;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitfield(BytesMut);

impl Bitfield {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Bitfield(BytesMut::from(&bytes[..]))
    }

    pub fn len_bytes(&self) -> usize {
        self.0.len()
    }

    /// `true` if piece `index` lives within the bitfield's byte range and
    /// its corresponding bit is set. Out-of-range indices are simply
    /// absent, not an error (§8 law 5).
    pub fn has_piece(&self, index: usize) -> bool {
        let byte_index = index / 8;
        let bit_offset = index % 8;
        match self.0.get(byte_index) {
            Some(byte) => (byte >> (7 - bit_offset)) & 1 != 0,
            None => false,
        }
    }

    /// Sets bit for `index`. A no-op if `index` falls outside the
    /// bitfield's current byte range (the field is never grown in place —
    /// a peer's `Have` for a piece beyond the size it advertised at
    /// bitfield time is simply ignored).
    pub fn set_piece(&mut self, index: usize) {
        let byte_index = index / 8;
        let bit_offset = index % 8;
        if let Some(byte) = self.0.get_mut(byte_index) {
            *byte |= 1 << (7 - bit_offset);
        }
    }
}
