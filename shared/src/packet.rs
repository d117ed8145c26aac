//! Packet definitions and the fixed binary layout they travel in.
//!
//! Every packet is a 12 byte header (`u32` type, `u64` payload size, both
//! little-endian) followed by a payload whose size is fixed per packet type.
//! Payload bodies use bincode's default fixed-int encoding, so each field
//! lands at a fixed offset with no padding.

use crate::error::ProtocolError;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Size of the header that precedes every payload.
pub const HEADER_LEN: usize = 12;
/// Width of the fixed string fields in `Join`, NUL terminator included.
pub const NAME_LEN: usize = 64;
/// Upper bound on a declared payload size; anything larger is rejected
/// before a buffer is allocated for it.
pub const MAX_PAYLOAD_LEN: usize = 4096;

/// Packet type enumerant for one direction of the protocol.
pub trait PacketKind: Copy + fmt::Debug + Send + 'static {
    fn from_wire(raw: u32) -> Option<Self>;
    fn to_wire(self) -> u32;
    /// Exact payload size this packet type carries.
    fn payload_len(self) -> usize;
    fn name(self) -> &'static str;
}

/// A packet that can be framed onto and off the wire.
pub trait Packet: Sized {
    type Kind: PacketKind;

    fn kind(&self) -> Self::Kind;
    fn encode_payload(&self) -> Result<Vec<u8>, ProtocolError>;
    fn decode_payload(kind: Self::Kind, payload: &[u8]) -> Result<Self, ProtocolError>;

    /// Header followed by payload, ready to be written in one go.
    fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let payload = self.encode_payload()?;
        let mut bytes = encode_header(self.kind().to_wire(), payload.len())?;
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decodes one complete frame. The buffer must hold exactly the header
    /// plus the declared payload.
    fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtocolError::TruncatedPayload {
                kind: "header",
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }
        let (kind, size) = decode_header::<Self::Kind>(&bytes[..HEADER_LEN])?;
        let payload = &bytes[HEADER_LEN..];
        if payload.len() != size {
            return Err(ProtocolError::TruncatedPayload {
                kind: kind.name(),
                expected: size,
                actual: payload.len(),
            });
        }
        Self::decode_payload(kind, payload)
    }
}

#[derive(Serialize, Deserialize)]
struct RawHeader {
    kind: u32,
    size: u64,
}

pub fn encode_header(kind: u32, size: usize) -> Result<Vec<u8>, ProtocolError> {
    let header = RawHeader {
        kind,
        size: size as u64,
    };
    Ok(bincode::serialize(&header)?)
}

/// Parses a header and validates its type against the packet family `K`.
pub fn decode_header<K: PacketKind>(bytes: &[u8]) -> Result<(K, usize), ProtocolError> {
    if bytes.len() != HEADER_LEN {
        return Err(ProtocolError::TruncatedPayload {
            kind: "header",
            expected: HEADER_LEN,
            actual: bytes.len(),
        });
    }
    let header: RawHeader = bincode::deserialize(bytes)?;
    let kind = K::from_wire(header.kind).ok_or(ProtocolError::MalformedHeader(header.kind))?;
    if header.size > MAX_PAYLOAD_LEN as u64 {
        return Err(ProtocolError::OversizedPayload {
            size: header.size,
            limit: MAX_PAYLOAD_LEN,
        });
    }
    Ok((kind, header.size as usize))
}

fn expect_len<K: PacketKind>(kind: K, payload: &[u8]) -> Result<(), ProtocolError> {
    if payload.len() != kind.payload_len() {
        return Err(ProtocolError::TruncatedPayload {
            kind: kind.name(),
            expected: kind.payload_len(),
            actual: payload.len(),
        });
    }
    Ok(())
}

/// NUL-terminated string in a 64 byte buffer.
#[derive(Clone, Copy, PartialEq, Eq)]
struct FixedStr([u8; NAME_LEN]);

impl FixedStr {
    fn encode(field: &'static str, value: &str) -> Result<Self, ProtocolError> {
        let bytes = value.as_bytes();
        if bytes.len() >= NAME_LEN {
            return Err(ProtocolError::InvalidString {
                field,
                reason: "longer than 63 bytes",
            });
        }
        if bytes.contains(&0) {
            return Err(ProtocolError::InvalidString {
                field,
                reason: "contains a NUL byte",
            });
        }
        let mut buf = [0u8; NAME_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(FixedStr(buf))
    }

    fn decode(&self, field: &'static str) -> Result<String, ProtocolError> {
        let end = self
            .0
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtocolError::InvalidString {
                field,
                reason: "missing NUL terminator",
            })?;
        std::str::from_utf8(&self.0[..end])
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidString {
                field,
                reason: "not valid UTF-8",
            })
    }
}

impl Serialize for FixedStr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(NAME_LEN)?;
        for byte in &self.0 {
            tuple.serialize_element(byte)?;
        }
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for FixedStr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FixedStrVisitor;

        impl<'de> Visitor<'de> for FixedStrVisitor {
            type Value = FixedStr;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{} bytes", NAME_LEN)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<FixedStr, A::Error> {
                let mut buf = [0u8; NAME_LEN];
                for (i, slot) in buf.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(FixedStr(buf))
            }
        }

        deserializer.deserialize_tuple(NAME_LEN, FixedStrVisitor)
    }
}

#[derive(Serialize, Deserialize)]
struct JoinBody {
    name: FixedStr,
    companion: FixedStr,
}

/// Where a `Teleport` should send the avatar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeleportTarget {
    Player,
    Origin,
    /// Target byte this build does not know; applied as a no-op.
    Reserved(u8),
}

impl From<u8> for TeleportTarget {
    fn from(raw: u8) -> Self {
        match raw {
            0 => TeleportTarget::Player,
            1 => TeleportTarget::Origin,
            other => TeleportTarget::Reserved(other),
        }
    }
}

impl From<TeleportTarget> for u8 {
    fn from(target: TeleportTarget) -> Self {
        match target {
            TeleportTarget::Player => 0,
            TeleportTarget::Origin => 1,
            TeleportTarget::Reserved(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerboundKind {
    Join,
    Leave,
    Move,
    Rotate,
    Look,
    Teleport,
}

impl PacketKind for ServerboundKind {
    fn from_wire(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(ServerboundKind::Join),
            1 => Some(ServerboundKind::Leave),
            2 => Some(ServerboundKind::Move),
            3 => Some(ServerboundKind::Rotate),
            4 => Some(ServerboundKind::Look),
            5 => Some(ServerboundKind::Teleport),
            _ => None,
        }
    }

    fn to_wire(self) -> u32 {
        self as u32
    }

    fn payload_len(self) -> usize {
        match self {
            ServerboundKind::Join => 2 * NAME_LEN,
            ServerboundKind::Leave => 0,
            ServerboundKind::Move => 12,
            ServerboundKind::Rotate => 4,
            ServerboundKind::Look => 8,
            ServerboundKind::Teleport => 1,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ServerboundKind::Join => "Join",
            ServerboundKind::Leave => "Leave",
            ServerboundKind::Move => "Move",
            ServerboundKind::Rotate => "Rotate",
            ServerboundKind::Look => "Look",
            ServerboundKind::Teleport => "Teleport",
        }
    }
}

/// Packets a client sends to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerboundPacket {
    Join { name: String, companion: String },
    Leave,
    /// Relative movement; the server adds it to the avatar position.
    Move { dx: f32, dy: f32, dz: f32 },
    /// Absolute yaw in radians.
    Rotate { yaw: f32 },
    Look { yaw: f32, pitch: f32 },
    Teleport { target: TeleportTarget },
}

impl Packet for ServerboundPacket {
    type Kind = ServerboundKind;

    fn kind(&self) -> ServerboundKind {
        match self {
            ServerboundPacket::Join { .. } => ServerboundKind::Join,
            ServerboundPacket::Leave => ServerboundKind::Leave,
            ServerboundPacket::Move { .. } => ServerboundKind::Move,
            ServerboundPacket::Rotate { .. } => ServerboundKind::Rotate,
            ServerboundPacket::Look { .. } => ServerboundKind::Look,
            ServerboundPacket::Teleport { .. } => ServerboundKind::Teleport,
        }
    }

    fn encode_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        let bytes = match self {
            ServerboundPacket::Join { name, companion } => bincode::serialize(&JoinBody {
                name: FixedStr::encode("name", name)?,
                companion: FixedStr::encode("companion", companion)?,
            })?,
            ServerboundPacket::Leave => Vec::new(),
            ServerboundPacket::Move { dx, dy, dz } => bincode::serialize(&(dx, dy, dz))?,
            ServerboundPacket::Rotate { yaw } => bincode::serialize(yaw)?,
            ServerboundPacket::Look { yaw, pitch } => bincode::serialize(&(yaw, pitch))?,
            ServerboundPacket::Teleport { target } => vec![u8::from(*target)],
        };
        Ok(bytes)
    }

    fn decode_payload(kind: ServerboundKind, payload: &[u8]) -> Result<Self, ProtocolError> {
        expect_len(kind, payload)?;
        let packet = match kind {
            ServerboundKind::Join => {
                let body: JoinBody = bincode::deserialize(payload)?;
                ServerboundPacket::Join {
                    name: body.name.decode("name")?,
                    companion: body.companion.decode("companion")?,
                }
            }
            ServerboundKind::Leave => ServerboundPacket::Leave,
            ServerboundKind::Move => {
                let (dx, dy, dz): (f32, f32, f32) = bincode::deserialize(payload)?;
                ServerboundPacket::Move { dx, dy, dz }
            }
            ServerboundKind::Rotate => ServerboundPacket::Rotate {
                yaw: bincode::deserialize(payload)?,
            },
            ServerboundKind::Look => {
                let (yaw, pitch): (f32, f32) = bincode::deserialize(payload)?;
                ServerboundPacket::Look { yaw, pitch }
            }
            ServerboundKind::Teleport => ServerboundPacket::Teleport {
                target: TeleportTarget::from(payload[0]),
            },
        };
        Ok(packet)
    }
}

/// Why the server is closing a client's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    Generic,
    JoinDenied,
    UnknownCompanion,
    TooManyClients,
    Kicked,
    ServerClosing,
}

impl TryFrom<u32> for DisconnectReason {
    type Error = ProtocolError;

    fn try_from(raw: u32) -> Result<Self, ProtocolError> {
        match raw {
            0 => Ok(DisconnectReason::Generic),
            1 => Ok(DisconnectReason::JoinDenied),
            2 => Ok(DisconnectReason::UnknownCompanion),
            3 => Ok(DisconnectReason::TooManyClients),
            4 => Ok(DisconnectReason::Kicked),
            5 => Ok(DisconnectReason::ServerClosing),
            value => Err(ProtocolError::UnknownEnumerant {
                field: "disconnect reason",
                value,
            }),
        }
    }
}

impl From<DisconnectReason> for u32 {
    fn from(reason: DisconnectReason) -> Self {
        reason as u32
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DisconnectReason::Generic => "disconnected by server",
            DisconnectReason::JoinDenied => "join denied",
            DisconnectReason::UnknownCompanion => "unknown companion",
            DisconnectReason::TooManyClients => "server is full",
            DisconnectReason::Kicked => "kicked by server",
            DisconnectReason::ServerClosing => "server is shutting down",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientboundKind {
    Disconnect,
    Rumble,
}

impl PacketKind for ClientboundKind {
    fn from_wire(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(ClientboundKind::Disconnect),
            1 => Some(ClientboundKind::Rumble),
            _ => None,
        }
    }

    fn to_wire(self) -> u32 {
        self as u32
    }

    fn payload_len(self) -> usize {
        match self {
            ClientboundKind::Disconnect => 4,
            ClientboundKind::Rumble => 8,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ClientboundKind::Disconnect => "Disconnect",
            ClientboundKind::Rumble => "Rumble",
        }
    }
}

/// Packets the server sends to a client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientboundPacket {
    Disconnect { reason: DisconnectReason },
    Rumble { strength: f32, duration_ms: u32 },
}

impl Packet for ClientboundPacket {
    type Kind = ClientboundKind;

    fn kind(&self) -> ClientboundKind {
        match self {
            ClientboundPacket::Disconnect { .. } => ClientboundKind::Disconnect,
            ClientboundPacket::Rumble { .. } => ClientboundKind::Rumble,
        }
    }

    fn encode_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        let bytes = match self {
            ClientboundPacket::Disconnect { reason } => bincode::serialize(&u32::from(*reason))?,
            ClientboundPacket::Rumble {
                strength,
                duration_ms,
            } => bincode::serialize(&(strength, duration_ms))?,
        };
        Ok(bytes)
    }

    fn decode_payload(kind: ClientboundKind, payload: &[u8]) -> Result<Self, ProtocolError> {
        expect_len(kind, payload)?;
        let packet = match kind {
            ClientboundKind::Disconnect => {
                let raw: u32 = bincode::deserialize(payload)?;
                ClientboundPacket::Disconnect {
                    reason: DisconnectReason::try_from(raw)?,
                }
            }
            ClientboundKind::Rumble => {
                let (strength, duration_ms): (f32, u32) = bincode::deserialize(payload)?;
                ClientboundPacket::Rumble {
                    strength,
                    duration_ms,
                }
            }
        };
        Ok(packet)
    }
}
