use crate::Point2i;

use morton_encoding::{morton_decode, morton_encode};
use std::cmp::Ordering;
use std::fmt;

/// The longest wire key: one length byte followed by the big-endian code.
pub const MAX_WIRE_KEY_LEN: usize = 9;

/// A Morton-encoded integer (longitude, latitude) pair. Uses a `u64` to support the full set of `Point2i`s.
///
/// The total order on `Morton2` is the Z-order curve, so sorting queries or cache records by their code keeps
/// geographically close positions close together.
///
/// <https://en.wikipedia.org/wiki/Z-order_curve>
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Morton2(pub u64);

impl fmt::Debug for Morton2 {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{} = {:b}", self.0, self.0)
    }
}

impl Morton2 {
    #[inline]
    pub fn from_lon_lat(lon: i32, lat: i32) -> Self {
        Self(morton_encode([translate(lat) as u32, translate(lon) as u32]))
    }

    #[inline]
    pub fn lon_lat(self) -> (i32, i32) {
        let p = Point2i::from(self);

        (p.x(), p.y())
    }

    /// Appends the variable-length wire form of this code to `out`.
    ///
    /// The first byte is the number of code bytes that follow: 0 for the degenerate all-zero code, otherwise 8.
    pub fn write_wire_key(self, out: &mut Vec<u8>) {
        if self.0 == 0 {
            out.push(0);
        } else {
            out.push(8);
            out.extend_from_slice(&self.0.to_be_bytes());
        }
    }

    /// The wire form of this code as a standalone byte vector.
    pub fn wire_key(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MAX_WIRE_KEY_LEN);
        self.write_wire_key(&mut out);

        out
    }

    /// Parses one wire key from the front of `bytes`, returning the code and the number of bytes consumed.
    pub fn read_wire_key(bytes: &[u8]) -> Option<(Self, usize)> {
        let (&len, rest) = bytes.split_first()?;
        match len {
            0 => Some((Self(0), 1)),
            8 if rest.len() >= 8 => {
                let mut code = [0; 8];
                code.copy_from_slice(&rest[..8]);

                Some((Self(u64::from_be_bytes(code)), 9))
            }
            _ => None,
        }
    }
}

impl From<Point2i> for Morton2 {
    #[inline]
    fn from(p: Point2i) -> Self {
        Self::from_lon_lat(p.x(), p.y())
    }
}

impl From<Morton2> for Point2i {
    #[inline]
    fn from(m: Morton2) -> Self {
        let yx: [u32; 2] = morton_decode(m.0);
        Self([untranslate(yx[1] as i32), untranslate(yx[0] as i32)])
    }
}

/// Compares two integer positions by their Morton codes without materializing the wire keys.
#[inline]
pub fn compare_code(lon1: i32, lat1: i32, lon2: i32, lat2: i32) -> Ordering {
    Morton2::from_lon_lat(lon1, lat1).cmp(&Morton2::from_lon_lat(lon2, lat2))
}

/// Send the supported range of i32 into the lower 32 bits of a u64 while preserving the total order.
#[inline]
fn translate(x: i32) -> i32 {
    x.wrapping_sub(i32::MIN)
}

/// The inverse of `translate`.
#[inline]
fn untranslate(x: i32) -> i32 {
    x.wrapping_add(i32::MIN)
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
