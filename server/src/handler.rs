//! Per-client packet interpretation.
//!
//! A handler is owned by its registry entry and only ever driven from its
//! client's receive loop, so the avatar it owns is never touched by another
//! client's task.

use crate::context::ServerContext;
use crate::scene::RenderClient;
use crate::ClientId;
use log::{debug, warn};
use shared::{DisconnectReason, ServerboundPacket, TeleportTarget, Vec3};
use std::sync::Arc;

/// What the receive loop should do after a packet has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerAction {
    Continue,
    /// Tell the client why, then drop it.
    Disconnect(DisconnectReason),
    /// The client asked to leave; drop it without a reply.
    Leave,
}

pub trait PacketHandler: Send {
    fn handle_packet(&mut self, packet: ServerboundPacket) -> HandlerAction;

    /// Releases everything the handler holds. Safe to call more than once.
    fn handle_disconnect(&mut self);
}

/// Builds the handler for a freshly registered client from its id and
/// display name.
pub type HandlerFactory = dyn Fn(ClientId, &str) -> Box<dyn PacketHandler> + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvatarState {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

impl AvatarState {
    pub fn at_origin() -> Self {
        Self {
            position: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HandlerState {
    Unjoined,
    Joined(AvatarState),
    Disconnected,
}

/// The companion avatar handler: Unjoined → Joined → Disconnected.
pub struct AvatarHandler {
    id: ClientId,
    connection_name: String,
    ctx: Arc<ServerContext>,
    state: HandlerState,
}

impl AvatarHandler {
    pub fn new(id: ClientId, connection_name: &str, ctx: Arc<ServerContext>) -> Self {
        Self {
            id,
            connection_name: connection_name.to_string(),
            ctx,
            state: HandlerState::Unjoined,
        }
    }

    /// A factory that hands every new client an `AvatarHandler`.
    pub fn factory(ctx: Arc<ServerContext>) -> Arc<HandlerFactory> {
        Arc::new(move |id: ClientId, name: &str| {
            Box::new(AvatarHandler::new(id, name, Arc::clone(&ctx))) as Box<dyn PacketHandler>
        })
    }

    pub fn state(&self) -> &HandlerState {
        &self.state
    }

    pub fn avatar(&self) -> Option<&AvatarState> {
        match &self.state {
            HandlerState::Joined(avatar) => Some(avatar),
            _ => None,
        }
    }

    fn join(&mut self, name: String, companion: String) -> HandlerAction {
        debug!(
            "Join: {} from {} (connection {})",
            companion, name, self.connection_name
        );

        let avatar = AvatarState::at_origin();
        let client = RenderClient {
            id: self.id,
            name,
            companion,
            position: avatar.position,
            yaw: avatar.yaw,
            pitch: avatar.pitch,
        };
        let companion_known = self.ctx.catalog.contains(&client.companion);

        match self
            .ctx
            .scene
            .admit(client, self.ctx.max_clients(), companion_known)
        {
            Ok(()) => {
                self.state = HandlerState::Joined(avatar);
                HandlerAction::Continue
            }
            Err(reason) => {
                warn!("Rejected join from client {}: {}", self.id, reason);
                HandlerAction::Disconnect(reason)
            }
        }
    }

    fn publish(&self, avatar: &AvatarState) {
        self.ctx
            .scene
            .update(self.id, avatar.position, avatar.yaw, avatar.pitch);
    }
}

impl PacketHandler for AvatarHandler {
    fn handle_packet(&mut self, packet: ServerboundPacket) -> HandlerAction {
        let mut avatar = match &self.state {
            HandlerState::Disconnected => {
                debug!("Client {} is disconnected, dropping {:?}", self.id, packet);
                return HandlerAction::Continue;
            }
            HandlerState::Unjoined => {
                return match packet {
                    ServerboundPacket::Join { name, companion } => self.join(name, companion),
                    other => {
                        debug!("Client {} sent {:?} before joining", self.id, other);
                        HandlerAction::Continue
                    }
                };
            }
            HandlerState::Joined(avatar) => *avatar,
        };

        match packet {
            ServerboundPacket::Move { dx, dy, dz } => {
                avatar.position += Vec3::new(dx, dy, dz);
            }
            ServerboundPacket::Rotate { yaw } => {
                avatar.yaw = yaw;
            }
            ServerboundPacket::Look { yaw, pitch } => {
                avatar.yaw = yaw;
                avatar.pitch = pitch;
            }
            ServerboundPacket::Teleport { target } => match target {
                TeleportTarget::Origin => avatar.position = Vec3::ZERO,
                TeleportTarget::Player | TeleportTarget::Reserved(_) => {
                    debug!("Client {} teleport to {:?} ignored", self.id, target);
                    return HandlerAction::Continue;
                }
            },
            ServerboundPacket::Leave => return HandlerAction::Leave,
            ServerboundPacket::Join { .. } => {
                warn!("Client {} sent a second Join, ignoring", self.id);
                return HandlerAction::Continue;
            }
        }

        self.state = HandlerState::Joined(avatar);
        self.publish(&avatar);
        HandlerAction::Continue
    }

    fn handle_disconnect(&mut self) {
        if let HandlerState::Joined(_) = self.state {
            self.ctx.scene.remove(self.id);
        }
        self.state = HandlerState::Disconnected;
    }
}
