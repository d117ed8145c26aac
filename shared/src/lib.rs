//! Wire protocol shared by the presence server and the controller client.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

pub mod error;
pub mod frame;
pub mod packet;

pub use error::ProtocolError;
pub use frame::{read_packet, write_packet};
pub use packet::{
    decode_header, encode_header, ClientboundKind, ClientboundPacket, DisconnectReason, Packet,
    PacketKind, ServerboundKind, ServerboundPacket, TeleportTarget, HEADER_LEN, MAX_PAYLOAD_LEN,
    NAME_LEN,
};

/// Default TCP port of the presence server.
pub const DEFAULT_PORT: u16 = 9001;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, other: Vec3) {
        *self = *self + other;
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}
