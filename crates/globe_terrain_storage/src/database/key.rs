use globe_terrain_core::{Morton2, MAX_WIRE_KEY_LEN};

use core::ops::RangeInclusive;

/// A key whose big-endian byte form sorts the same way as the key itself, so `sled` range scans follow key order.
pub trait DatabaseKey: Copy + Ord {
    type KeyBytes: AsRef<[u8]>;

    fn to_key_bytes(self) -> Self::KeyBytes;
    fn from_key_bytes(bytes: &[u8]) -> Option<Self>;

    fn key_range(range: RangeInclusive<Self>) -> RangeInclusive<Self::KeyBytes> {
        let (min, max) = range.into_inner();

        min.to_key_bytes()..=max.to_key_bytes()
    }
}

/// The wire form of a `Morton2`, stored inline.
///
/// The zero code is the single byte `0` and every other code is `8` followed by the eight code bytes, so byte order
/// matches code order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WireKey {
    len: u8,
    bytes: [u8; MAX_WIRE_KEY_LEN],
}

impl AsRef<[u8]> for WireKey {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

impl DatabaseKey for Morton2 {
    type KeyBytes = WireKey;

    #[inline]
    fn to_key_bytes(self) -> WireKey {
        let mut bytes = [0; MAX_WIRE_KEY_LEN];
        if self.0 == 0 {
            return WireKey { len: 1, bytes };
        }
        bytes[0] = 8;
        bytes[1..].copy_from_slice(&self.0.to_be_bytes());

        WireKey {
            len: MAX_WIRE_KEY_LEN as u8,
            bytes,
        }
    }

    #[inline]
    fn from_key_bytes(bytes: &[u8]) -> Option<Self> {
        match Morton2::read_wire_key(bytes) {
            Some((key, used)) if used == bytes.len() => Some(key),
            _ => None,
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn key_bytes_match_wire_key_and_order() {
        let codes = [Morton2(0), Morton2(1), Morton2(0xff), Morton2(1 << 40), Morton2(u64::MAX)];
        for code in codes.iter() {
            assert_eq!(code.to_key_bytes().as_ref(), code.wire_key().as_slice());
            assert_eq!(Morton2::from_key_bytes(code.to_key_bytes().as_ref()), Some(*code));
        }
        for pair in codes.windows(2) {
            assert!(pair[0].to_key_bytes().as_ref() < pair[1].to_key_bytes().as_ref());
        }
        assert_eq!(Morton2::from_key_bytes(&[8, 1, 2]), None);
    }
}
