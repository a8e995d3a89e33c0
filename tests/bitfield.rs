//! Integration coverage for bitfield symmetry (§8 law 5).
use rs_torrent_client::peer::Bitfield;

#[test]
fn has_piece_reflects_msb_first_bit_layout() {
    let bf = Bitfield::from_bytes(vec![0b1010_0000]);
    assert!(bf.has_piece(0));
    assert!(!bf.has_piece(1));
    assert!(bf.has_piece(2));
    assert!(!bf.has_piece(3));
    assert!(!bf.has_piece(8));
}

#[test]
fn set_piece_is_symmetric_with_has_piece_across_the_whole_range() {
    let mut bf = Bitfield::from_bytes(vec![0u8; 4]);
    for i in 0..32 {
        assert!(!bf.has_piece(i));
        bf.set_piece(i);
        assert!(bf.has_piece(i));
    }
}

#[test]
fn out_of_range_set_is_a_silent_noop() {
    let mut bf = Bitfield::from_bytes(vec![0u8; 2]);
    bf.set_piece(1000);
    assert!(!bf.has_piece(1000));
    // the in-range bits are untouched by the out-of-range write.
    assert!(!bf.has_piece(0));
}
