//! The binary elevation server protocol. All integers are big-endian `i32`s.
//!
//! - Model query request: `OPCODE_MODEL_QUERY`.
//! - Model query reply: `model_type, a * 100, b * 100, h_scale * 1000, version`.
//! - Batch request: `OPCODE_ELEVATION_BYTE, sequence, count`, then `count` Morton wire keys of 1 or 9 bytes.
//! - Batch reply: the echoed header, then `count` pairs of `elevation, uncertainty` in request order.

use super::ProtocolError;

use globe_terrain_core::{Ellipsoid, Morton2, MAX_WIRE_KEY_LEN};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub const OPCODE_MODEL_QUERY: i32 = 0x1001;
pub const OPCODE_ELEVATION_BYTE: i32 = 0x4000;

const WIRE_MODEL_4X2: i32 = 0x2042;
const WIRE_MODEL_4X8: i32 = 0x2048;

pub const HEADER_LEN: usize = 12;
pub const MODEL_REPLY_LEN: usize = 20;

/// Elevation value meaning "the server has no data here".
pub const NO_DATA: i32 = i32::MAX;

/// The most queries that fit in one request buffer of `buffer_size` bytes.
pub fn max_batch_len(buffer_size: usize) -> usize {
    (buffer_size - HEADER_LEN) / MAX_WIRE_KEY_LEN
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum ModelType {
    Model4x2,
    Model4x8,
}

impl ModelType {
    fn from_wire(code: i32) -> Option<Self> {
        match code {
            WIRE_MODEL_4X2 => Some(Self::Model4x2),
            WIRE_MODEL_4X8 => Some(Self::Model4x8),
            _ => None,
        }
    }

    fn to_wire(self) -> i32 {
        match self {
            Self::Model4x2 => WIRE_MODEL_4X2,
            Self::Model4x8 => WIRE_MODEL_4X8,
        }
    }
}

/// The remote elevation model: its ellipsoid, height scale and protocol version.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct ModelQuery {
    pub model_type: ModelType,
    /// Semi-major axis in meters.
    pub a: f64,
    /// Flattening.
    pub f: f64,
    pub h_scale: f32,
    pub version: i32,
}

impl ModelQuery {
    pub fn ellipsoid(&self) -> Ellipsoid {
        Ellipsoid::new(self.a, self.f)
    }
}

#[inline]
fn read_i32(bytes: &[u8], at: usize) -> i32 {
    let mut word = [0; 4];
    word.copy_from_slice(&bytes[at..at + 4]);

    i32::from_be_bytes(word)
}

pub fn model_query_request() -> Vec<u8> {
    OPCODE_MODEL_QUERY.to_be_bytes().to_vec()
}

pub fn decode_model_reply(bytes: &[u8]) -> Result<ModelQuery, ProtocolError> {
    if bytes.len() < MODEL_REPLY_LEN {
        return Err(ProtocolError::ShortReply {
            expected: MODEL_REPLY_LEN,
            actual: bytes.len(),
        });
    }
    let wire_type = read_i32(bytes, 0);
    let ia = read_i32(bytes, 4) as f64;
    let ib = read_i32(bytes, 8) as f64;
    let h_scale = read_i32(bytes, 12);
    let version = read_i32(bytes, 16);

    let model_type =
        ModelType::from_wire(wire_type).ok_or(ProtocolError::UnknownModelType(wire_type))?;

    Ok(ModelQuery {
        model_type,
        a: ia / 100.0,
        f: (ia - ib) / ia,
        h_scale: h_scale as f32 / 1000.0,
        version,
    })
}

pub fn encode_model_reply(model: &ModelQuery) -> Vec<u8> {
    let ia = (model.a * 100.0).round() as i32;
    let ib = (model.a * (1.0 - model.f) * 100.0).round() as i32;
    let mut out = Vec::with_capacity(MODEL_REPLY_LEN);
    for word in [
        model.model_type.to_wire(),
        ia,
        ib,
        (model.h_scale * 1000.0).round() as i32,
        model.version,
    ]
    .iter()
    {
        out.extend_from_slice(&word.to_be_bytes());
    }

    out
}

/// Writes a batch request for `keys` into `out`, replacing its contents.
pub fn encode_batch_request(sequence: i32, keys: &[Morton2], out: &mut Vec<u8>) {
    out.clear();
    out.extend_from_slice(&OPCODE_ELEVATION_BYTE.to_be_bytes());
    out.extend_from_slice(&sequence.to_be_bytes());
    out.extend_from_slice(&(keys.len() as i32).to_be_bytes());
    for key in keys {
        key.write_wire_key(out);
    }
}

/// Parses a batch request into its sequence number and keys. Returns `None` on malformed input.
pub fn decode_batch_request(bytes: &[u8]) -> Option<(i32, Vec<Morton2>)> {
    if bytes.len() < HEADER_LEN || read_i32(bytes, 0) != OPCODE_ELEVATION_BYTE {
        return None;
    }
    let sequence = read_i32(bytes, 4);
    let count = read_i32(bytes, 8);
    let mut keys = Vec::with_capacity(count.max(0) as usize);
    let mut at = HEADER_LEN;
    for _ in 0..count {
        let (key, used) = Morton2::read_wire_key(&bytes[at..])?;
        keys.push(key);
        at += used;
    }

    Some((sequence, keys))
}

pub fn encode_batch_reply(sequence: i32, values: &[(i32, i32)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + 8 * values.len());
    out.extend_from_slice(&OPCODE_ELEVATION_BYTE.to_be_bytes());
    out.extend_from_slice(&sequence.to_be_bytes());
    out.extend_from_slice(&(values.len() as i32).to_be_bytes());
    for (h, dh) in values {
        out.extend_from_slice(&h.to_be_bytes());
        out.extend_from_slice(&dh.to_be_bytes());
    }

    out
}

/// Checks that a batch reply answers the request `(sequence, count)` and yields its `(elevation, uncertainty)` pairs in
/// request order.
///
/// A reply of the wrong length is `ShortReply`, which the server worker treats as a failed attempt. Header mismatches mean
/// the reply belongs to some other request.
pub fn decode_batch_reply(
    bytes: &[u8],
    sequence: i32,
    count: usize,
) -> Result<impl Iterator<Item = (i32, i32)> + '_, ProtocolError> {
    let expected = HEADER_LEN + 8 * count;
    if bytes.len() != expected {
        return Err(ProtocolError::ShortReply {
            expected,
            actual: bytes.len(),
        });
    }
    let opcode = read_i32(bytes, 0);
    if opcode != OPCODE_ELEVATION_BYTE {
        return Err(ProtocolError::OpcodeMismatch {
            sent: OPCODE_ELEVATION_BYTE,
            received: opcode,
        });
    }
    let reply_sequence = read_i32(bytes, 4);
    if reply_sequence != sequence {
        return Err(ProtocolError::SequenceMismatch {
            sent: sequence,
            received: reply_sequence,
        });
    }
    let reply_count = read_i32(bytes, 8);
    if reply_count != count as i32 {
        return Err(ProtocolError::CountMismatch {
            sent: count as i32,
            received: reply_count,
        });
    }

    Ok(bytes[HEADER_LEN..]
        .chunks_exact(8)
        .map(|pair| (read_i32(pair, 0), read_i32(pair, 4))))
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
    fn model_reply_decodes_axes_and_scale() {
        let mut bytes = Vec::new();
        for w in [0x2048, 637_813_700, 635_675_231, 1000, 3].iter() {
            bytes.extend_from_slice(&i32::to_be_bytes(*w));
        }
        let model = decode_model_reply(&bytes).unwrap();

        assert_eq!(model.model_type, ModelType::Model4x8);
        assert_eq!(model.a, 6_378_137.0);
        assert!((model.f - (637_813_700.0 - 635_675_231.0) / 637_813_700.0).abs() < 1e-15);
        assert_eq!(model.h_scale, 1.0);
        assert_eq!(model.version, 3);

        bytes[3] = 0x99;
        assert_eq!(
            decode_model_reply(&bytes),
            Err(ProtocolError::UnknownModelType(0x2099))
        );
    }

    #[test]
    fn batch_request_layout() {
        let keys = [Morton2(0), Morton2(0x0102_0304_0506_0708)];
        let mut out = Vec::new();
        encode_batch_request(7, &keys, &mut out);

        assert_eq!(&out[..12], &[0, 0, 0x40, 0, 0, 0, 0, 7, 0, 0, 0, 2]);
        assert_eq!(&out[12..], &[0, 8, 1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(decode_batch_request(&out), Some((7, keys.to_vec())));
        assert_eq!(max_batch_len(1 << 15), 3639);
    }

    #[test]
    fn batch_reply_mismatches() {
        let reply = encode_batch_reply(5, &[(100, 1), (NO_DATA, 0)]);

        let values: Vec<_> = decode_batch_reply(&reply, 5, 2).unwrap().collect();
        assert_eq!(values, vec![(100, 1), (NO_DATA, 0)]);

        assert!(matches!(
            decode_batch_reply(&reply, 6, 2),
            Err(ProtocolError::SequenceMismatch { sent: 6, received: 5 })
        ));
        assert!(matches!(
            decode_batch_reply(&reply, 5, 3),
            Err(ProtocolError::ShortReply { .. })
        ));

        let mut bad_count = reply.clone();
        bad_count[11] = 9;
        assert!(matches!(
            decode_batch_reply(&bad_count, 5, 2),
            Err(ProtocolError::CountMismatch { sent: 2, received: 9 })
        ));
    }
}
