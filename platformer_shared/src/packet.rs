//! Wire protocol.
//!
//! Every datagram is a 1-byte tag followed by a body whose size is fixed by
//! the tag. There is no length prefix and no versioning; a datagram whose body
//! does not match its tag's size is rejected outright.
//!
//! All numeric fields are big-endian. Identities are 16 raw bytes.

use std::{fmt, str::FromStr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use uuid::Uuid;

/// Receive buffer size. Every packet fits comfortably.
pub const MAX_DATAGRAM: usize = 1024;

const ID_LEN: usize = 16;
const F32_LEN: usize = 4;

/// Session identity, minted by the server on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(Uuid);

impl PlayerId {
    /// Creates a fresh random identity.
    pub fn new_random() -> Self {
        PlayerId(Uuid::new_v4())
    }

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        PlayerId(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(PlayerId)
    }
}

/// Errors produced while decoding a datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty datagram")]
    Empty,
    #[error("unknown packet tag {0}")]
    UnknownTag(u8),
    #[error("{kind:?} body must be {expected} bytes, got {actual}")]
    BodyLength {
        kind: PacketKind,
        expected: usize,
        actual: usize,
    },
    #[error("horizontal input {0} is not one of -1, 0, 1")]
    InvalidAxis(i8),
}

/// Packet tag as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    PlayerPosition = 0,
    PlayerId = 1,
    PlayerXInput = 2,
    PlayerJump = 3,
    OtherPlayerPosition = 4,
    ConnectionRequest = 5,
    PlayerDisconnect = 6,
    PositionSyncRequest = 7,
    PositionSyncResponse = 8,
}

impl PacketKind {
    pub fn from_tag(tag: u8) -> Result<Self, DecodeError> {
        Ok(match tag {
            0 => Self::PlayerPosition,
            1 => Self::PlayerId,
            2 => Self::PlayerXInput,
            3 => Self::PlayerJump,
            4 => Self::OtherPlayerPosition,
            5 => Self::ConnectionRequest,
            6 => Self::PlayerDisconnect,
            7 => Self::PositionSyncRequest,
            8 => Self::PositionSyncResponse,
            other => return Err(DecodeError::UnknownTag(other)),
        })
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Fixed body size in bytes for this tag.
    pub fn body_len(self) -> usize {
        match self {
            Self::PlayerPosition => 2 * F32_LEN,
            Self::PlayerId | Self::PlayerJump | Self::PlayerDisconnect => ID_LEN,
            Self::PlayerXInput => ID_LEN + 1,
            Self::OtherPlayerPosition | Self::PositionSyncResponse => ID_LEN + 2 * F32_LEN,
            Self::ConnectionRequest | Self::PositionSyncRequest => 0,
        }
    }
}

/// A decoded protocol message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Packet {
    /// Server -> client: set your own player's position.
    PlayerPosition { x: f32, y: f32 },
    /// Server -> client: your session identity.
    PlayerId { id: PlayerId },
    /// Horizontal input; replaces the previous value, never a delta.
    PlayerXInput { id: PlayerId, x: i8 },
    PlayerJump { id: PlayerId },
    /// Server -> client: position of some other player.
    OtherPlayerPosition { id: PlayerId, x: f32, y: f32 },
    ConnectionRequest,
    PlayerDisconnect { id: PlayerId },
    PositionSyncRequest,
    PositionSyncResponse { id: PlayerId, x: f32, y: f32 },
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::PlayerPosition { .. } => PacketKind::PlayerPosition,
            Packet::PlayerId { .. } => PacketKind::PlayerId,
            Packet::PlayerXInput { .. } => PacketKind::PlayerXInput,
            Packet::PlayerJump { .. } => PacketKind::PlayerJump,
            Packet::OtherPlayerPosition { .. } => PacketKind::OtherPlayerPosition,
            Packet::ConnectionRequest => PacketKind::ConnectionRequest,
            Packet::PlayerDisconnect { .. } => PacketKind::PlayerDisconnect,
            Packet::PositionSyncRequest => PacketKind::PositionSyncRequest,
            Packet::PositionSyncResponse { .. } => PacketKind::PositionSyncResponse,
        }
    }
}

/// Encodes a packet into `1 + body_len` bytes.
pub fn encode(packet: &Packet) -> Bytes {
    let kind = packet.kind();
    let mut buf = BytesMut::with_capacity(1 + kind.body_len());
    buf.put_u8(kind.tag());
    match *packet {
        Packet::PlayerPosition { x, y } => {
            buf.put_f32(x);
            buf.put_f32(y);
        }
        Packet::PlayerId { id } | Packet::PlayerJump { id } | Packet::PlayerDisconnect { id } => {
            buf.put_slice(id.as_bytes());
        }
        Packet::PlayerXInput { id, x } => {
            buf.put_slice(id.as_bytes());
            buf.put_i8(x);
        }
        Packet::OtherPlayerPosition { id, x, y } | Packet::PositionSyncResponse { id, x, y } => {
            buf.put_slice(id.as_bytes());
            buf.put_f32(x);
            buf.put_f32(y);
        }
        Packet::ConnectionRequest | Packet::PositionSyncRequest => {}
    }
    buf.freeze()
}

/// Decodes a body given its already-split tag.
pub fn decode(tag: u8, mut body: &[u8]) -> Result<Packet, DecodeError> {
    let kind = PacketKind::from_tag(tag)?;
    if body.len() != kind.body_len() {
        return Err(DecodeError::BodyLength {
            kind,
            expected: kind.body_len(),
            actual: body.len(),
        });
    }

    let packet = match kind {
        PacketKind::PlayerPosition => Packet::PlayerPosition {
            x: body.get_f32(),
            y: body.get_f32(),
        },
        PacketKind::PlayerId => Packet::PlayerId {
            id: read_id(&mut body),
        },
        PacketKind::PlayerXInput => {
            let id = read_id(&mut body);
            let x = body.get_i8();
            if !(-1..=1).contains(&x) {
                return Err(DecodeError::InvalidAxis(x));
            }
            Packet::PlayerXInput { id, x }
        }
        PacketKind::PlayerJump => Packet::PlayerJump {
            id: read_id(&mut body),
        },
        PacketKind::OtherPlayerPosition => Packet::OtherPlayerPosition {
            id: read_id(&mut body),
            x: body.get_f32(),
            y: body.get_f32(),
        },
        PacketKind::ConnectionRequest => Packet::ConnectionRequest,
        PacketKind::PlayerDisconnect => Packet::PlayerDisconnect {
            id: read_id(&mut body),
        },
        PacketKind::PositionSyncRequest => Packet::PositionSyncRequest,
        PacketKind::PositionSyncResponse => Packet::PositionSyncResponse {
            id: read_id(&mut body),
            x: body.get_f32(),
            y: body.get_f32(),
        },
    };
    Ok(packet)
}

/// Decodes a whole datagram (tag byte included).
pub fn decode_datagram(datagram: &[u8]) -> Result<Packet, DecodeError> {
    match datagram.split_first() {
        Some((&tag, body)) => decode(tag, body),
        None => Err(DecodeError::Empty),
    }
}

// Callers have already checked the body length.
fn read_id(body: &mut &[u8]) -> PlayerId {
    let mut raw = [0u8; ID_LEN];
    body.copy_to_slice(&mut raw);
    PlayerId::from_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_id() -> PlayerId {
        PlayerId::from_bytes([
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ])
    }

    #[test]
    fn every_variant_survives_the_wire() {
        let id = sample_id();
        let packets = [
            Packet::PlayerPosition { x: 12.5, y: -3.25 },
            Packet::PlayerId { id },
            Packet::PlayerXInput { id, x: -1 },
            Packet::PlayerJump { id },
            Packet::OtherPlayerPosition {
                id,
                x: f32::MAX,
                y: f32::MIN_POSITIVE,
            },
            Packet::ConnectionRequest,
            Packet::PlayerDisconnect { id },
            Packet::PositionSyncRequest,
            Packet::PositionSyncResponse {
                id,
                x: 0.1,
                y: 1e-30,
            },
        ];
        for p in packets {
            let bytes = encode(&p);
            assert_eq!(bytes.len(), 1 + p.kind().body_len(), "{p:?}");
            let back = decode_datagram(&bytes).unwrap();
            assert_eq!(back, p);
        }
    }

    #[test]
    fn floats_are_bit_exact() {
        let x = f32::from_bits(0x3f80_0001);
        let bytes = encode(&Packet::PlayerPosition { x, y: -0.0 });
        match decode_datagram(&bytes).unwrap() {
            Packet::PlayerPosition { x: dx, y: dy } => {
                assert_eq!(dx.to_bits(), x.to_bits());
                assert_eq!(dy.to_bits(), (-0.0f32).to_bits());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn layout_is_big_endian() {
        let bytes = encode(&Packet::PlayerPosition { x: 1.0, y: 2.0 });
        assert_eq!(&bytes[..], &[0, 0x3f, 0x80, 0, 0, 0x40, 0, 0, 0]);

        let id = sample_id();
        let bytes = encode(&Packet::PlayerXInput { id, x: -1 });
        assert_eq!(bytes[0], 2);
        assert_eq!(&bytes[1..17], id.as_bytes());
        assert_eq!(bytes[17], 0xff);
    }

    #[test]
    fn rejects_unknown_tag() {
        assert_eq!(decode(9, &[]), Err(DecodeError::UnknownTag(9)));
        assert_eq!(decode_datagram(&[]), Err(DecodeError::Empty));
    }

    #[test]
    fn rejects_wrong_body_length() {
        let err = decode(PacketKind::PlayerJump.tag(), &[0u8; 15]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::BodyLength {
                kind: PacketKind::PlayerJump,
                expected: 16,
                actual: 15
            }
        );
        assert!(decode(PacketKind::ConnectionRequest.tag(), &[0]).is_err());
    }

    #[test]
    fn rejects_out_of_range_axis() {
        let mut raw = encode(&Packet::PlayerXInput {
            id: sample_id(),
            x: 1,
        })
        .to_vec();
        raw[17] = 2;
        assert_eq!(decode_datagram(&raw), Err(DecodeError::InvalidAxis(2)));
    }

    #[test]
    fn player_id_parses_its_display_form() {
        let id = PlayerId::new_random();
        let parsed: PlayerId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
