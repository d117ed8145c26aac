//! The render-client list: every joined avatar as a renderer sees it.
//!
//! Handlers publish into the scene after each change to their avatar;
//! renderers read snapshots and follow join/leave through [`Scene::subscribe`].
//! The number of entries here is the live-client count joins are limited by.

use crate::ClientId;
use log::{debug, info};
use shared::{DisconnectReason, Vec3};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderClient {
    pub id: ClientId,
    pub name: String,
    pub companion: String,
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    Joined {
        id: ClientId,
        name: String,
        companion: String,
    },
    Left {
        id: ClientId,
    },
}

pub struct Scene {
    clients: RwLock<BTreeMap<ClientId, RenderClient>>,
    events: broadcast::Sender<SceneEvent>,
}

impl Scene {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            clients: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<ClientId, RenderClient>> {
        self.clients.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<ClientId, RenderClient>> {
        self.clients.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a newly joined client unless a join rule says no.
    ///
    /// The capacity check and the insert happen under one write lock, so
    /// concurrent joins cannot push the scene past `max_clients`. A full
    /// scene is reported before an unknown companion.
    pub fn admit(
        &self,
        client: RenderClient,
        max_clients: usize,
        companion_known: bool,
    ) -> Result<(), DisconnectReason> {
        let event = {
            let mut clients = self.write();
            if clients.len() >= max_clients {
                return Err(DisconnectReason::TooManyClients);
            }
            if !companion_known {
                return Err(DisconnectReason::UnknownCompanion);
            }
            let event = SceneEvent::Joined {
                id: client.id,
                name: client.name.clone(),
                companion: client.companion.clone(),
            };
            info!(
                "Client {} joined as {} with companion {} ({} in scene)",
                client.id,
                client.name,
                client.companion,
                clients.len() + 1
            );
            clients.insert(client.id, client);
            event
        };
        // No subscribers is fine.
        let _ = self.events.send(event);
        Ok(())
    }

    /// Publishes a client's current pose. Returns false if the client is not
    /// in the scene.
    pub fn update(&self, id: ClientId, position: Vec3, yaw: f32, pitch: f32) -> bool {
        let mut clients = self.write();
        match clients.get_mut(&id) {
            Some(client) => {
                client.position = position;
                client.yaw = yaw;
                client.pitch = pitch;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: ClientId) -> Option<RenderClient> {
        let removed = self.write().remove(&id);
        if removed.is_some() {
            debug!("Client {} left the scene", id);
            let _ = self.events.send(SceneEvent::Left { id });
        }
        removed
    }

    pub fn get(&self, id: ClientId) -> Option<RenderClient> {
        self.read().get(&id).cloned()
    }

    /// Copy of every joined client, ordered by id.
    pub fn snapshot(&self) -> Vec<RenderClient> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SceneEvent> {
        self.events.subscribe()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
