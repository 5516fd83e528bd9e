use crate::{Bitfield, Error};

#[test]
fn set_test_clear() {
    let mut bf = Bitfield::new();
    assert!(bf.is_empty());
    for pos in [0_u8, 63, 64, 200, 255] {
        bf.set(pos);
        assert!(bf.test(pos));
    }
    assert_eq!(bf.count_ones(), 5);
    assert!(!bf.test(1));

    bf.clear(64);
    assert!(!bf.test(64));
    assert_eq!(bf.count_ones(), 4);
    assert_eq!(bf.iter_ones().collect::<Vec<_>>(), vec![0, 63, 200, 255]);
}

#[test]
fn rank_counts_lower_bits() {
    let mut bf = Bitfield::new();
    for pos in [3_u8, 70, 128, 129, 255] {
        bf.set(pos);
    }
    assert_eq!(bf.rank(0), 0);
    assert_eq!(bf.rank(3), 0);
    assert_eq!(bf.rank(4), 1);
    assert_eq!(bf.rank(70), 1);
    assert_eq!(bf.rank(128), 2);
    assert_eq!(bf.rank(129), 3);
    assert_eq!(bf.rank(200), 4);
    assert_eq!(bf.rank(255), 4);
}

#[test]
fn bytes_are_minimal_big_endian() {
    let mut bf = Bitfield::new();
    assert!(bf.to_bytes().is_empty());

    bf.set(0);
    assert_eq!(bf.to_bytes(), vec![0x01]);

    bf.set(9);
    assert_eq!(bf.to_bytes(), vec![0x02, 0x01]);

    bf.set(255);
    let bytes = bf.to_bytes();
    assert_eq!(bytes.len(), 32);
    assert_eq!(bytes[0], 0x80);
    assert_eq!(Bitfield::from_bytes(&bytes).unwrap(), bf);
}

#[test]
fn empty_bytes_decode_to_empty() {
    assert!(Bitfield::from_bytes(&[]).unwrap().is_empty());
}

#[test]
fn rejects_non_canonical_bytes() {
    assert!(matches!(
        Bitfield::from_bytes(&[0x00, 0x01]),
        Err(Error::MalformedTree(_))
    ));
    assert!(matches!(
        Bitfield::from_bytes(&[0x01; 33]),
        Err(Error::MalformedTree(_))
    ));
}

#[test]
fn debug_lists_positions() {
    let mut bf = Bitfield::new();
    bf.set(1);
    bf.set(42);
    assert_eq!(format!("{bf:?}"), "{1, 42}");
}
