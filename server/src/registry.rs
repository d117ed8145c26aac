//! Tracks live client sessions by id.
//!
//! Each entry owns the client's handler and a handle to its connection.
//! Removing an entry moves it out of the map, so whoever removes it is the
//! only one who gets to notify the peer and tear the handler down.

use crate::connection::Connection;
use crate::handler::{HandlerAction, HandlerFactory, PacketHandler};
use crate::ClientId;
use log::{debug, info, warn};
use shared::{ClientboundPacket, DisconnectReason, ProtocolError, ServerboundPacket};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How long a departing client gets to take its `Disconnect` packet before
/// the socket is closed under it.
pub const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// A handler behind its own lock, so one client's packets never wait on
/// another's.
pub type SharedHandler = Arc<Mutex<Box<dyn PacketHandler>>>;

pub struct Entry {
    pub name: String,
    pub connection: Arc<Connection>,
    pub handler: SharedHandler,
}

pub struct ClientRegistry {
    entries: Mutex<HashMap<ClientId, Entry>>,
    /// `None` once every id has been handed out.
    next_id: Mutex<Option<ClientId>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: Mutex::new(Some(1)),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ClientId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a connection and builds its handler. Ids start at 1 and are
    /// never handed out twice for the lifetime of the registry, so once they
    /// run out this returns `None`.
    pub fn register(
        &self,
        name: &str,
        connection: Arc<Connection>,
        factory: &HandlerFactory,
    ) -> Option<ClientId> {
        let id = {
            let mut next_id = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
            let id = next_id.take()?;
            *next_id = id.checked_add(1);
            id
        };

        let handler = Arc::new(Mutex::new(factory(id, name)));
        let mut entries = self.entries();
        entries.insert(
            id,
            Entry {
                name: name.to_string(),
                connection,
                handler,
            },
        );
        info!("Registered client {} ({}), {} connected", id, name, entries.len());
        Some(id)
    }

    /// Removes and returns the entry for `id`; `None` if it is already gone.
    pub fn unregister(&self, id: ClientId) -> Option<Entry> {
        let removed = self.entries().remove(&id);
        if removed.is_some() {
            debug!("Unregistered client {}", id);
        }
        removed
    }

    /// Hands a packet to the client's handler. `None` means the client is no
    /// longer registered.
    ///
    /// Only the client's own handler is locked while it runs.
    pub fn dispatch(&self, id: ClientId, packet: ServerboundPacket) -> Option<HandlerAction> {
        let handler = Arc::clone(&self.entries().get(&id)?.handler);
        let mut handler = handler.lock().unwrap_or_else(PoisonError::into_inner);
        Some(handler.handle_packet(packet))
    }

    /// Drops a client, optionally telling it why on the way out.
    ///
    /// The handler is torn down before the `Disconnect` is written, and the
    /// write gets at most [`DISCONNECT_GRACE`], so a stalled peer neither
    /// leaves an avatar behind nor holds the caller up.
    ///
    /// Returns true only for the call that actually removed the client; any
    /// further calls for the same id do nothing.
    pub async fn disconnect(&self, id: ClientId, reason: Option<DisconnectReason>) -> bool {
        let Some(entry) = self.unregister(id) else {
            return false;
        };

        entry
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle_disconnect();

        if let Some(reason) = reason {
            info!("Disconnecting client {} ({}): {}", id, entry.name, reason);
            let notice = ClientboundPacket::Disconnect { reason };
            match tokio::time::timeout(DISCONNECT_GRACE, entry.connection.send(&notice)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    debug!("Could not tell client {} it was disconnected: {}", id, err);
                }
                Err(_) => warn!("Client {} did not take its Disconnect in time", id),
            }
        } else {
            info!("Client {} ({}) disconnected", id, entry.name);
        }

        entry.connection.close().await;
        true
    }

    /// Sends a packet to one client. The registry lock is released before the
    /// write starts.
    pub async fn send(
        &self,
        id: ClientId,
        packet: &ClientboundPacket,
    ) -> Result<(), ProtocolError> {
        let connection = self.connection(id).ok_or(ProtocolError::ConnectionClosed)?;
        let result = connection.send(packet).await;
        if let Err(err) = &result {
            warn!("Send to client {} failed: {}", id, err);
        }
        result
    }

    pub fn connection(&self, id: ClientId) -> Option<Arc<Connection>> {
        self.entries()
            .get(&id)
            .map(|entry| Arc::clone(&entry.connection))
    }

    pub fn name(&self, id: ClientId) -> Option<String> {
        self.entries().get(&id).map(|entry| entry.name.clone())
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.entries().contains_key(&id)
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.entries().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
