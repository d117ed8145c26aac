//! The sending half of one client socket.
//!
//! The receive half is owned by that client's receive loop in
//! [`crate::network`]; this type only ever writes. All writes go through an
//! async mutex and are issued as one buffer per packet, so packets from
//! concurrent senders never interleave.

use log::debug;
use shared::{write_packet, ClientboundPacket, ProtocolError};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, Notify};

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

pub struct Connection {
    peer: SocketAddr,
    writer: Mutex<Writer>,
    closed: AtomicBool,
    close_notify: Notify,
}

impl Connection {
    pub fn new<W>(peer: SocketAddr, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            peer,
            writer: Mutex::new(Box::new(writer)),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sends one packet.
    ///
    /// A failed write marks the connection dead; from then on every send
    /// returns `ConnectionClosed` without touching the socket.
    pub async fn send(&self, packet: &ClientboundPacket) -> Result<(), ProtocolError> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }

        let mut writer = self.writer.lock().await;
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }

        match write_packet(&mut *writer, packet).await {
            Err(ProtocolError::ConnectionClosed) => {
                debug!("Write to {} failed, marking connection closed", self.peer);
                self.mark_closed();
                Err(ProtocolError::ConnectionClosed)
            }
            result => result,
        }
    }

    /// Marks the connection closed, wakes anyone waiting in [`closed`](Self::closed)
    /// and shuts the write side down. Never waits on a sender stuck behind a
    /// stalled peer; in that case the socket closes when the last handle drops.
    pub async fn close(&self) {
        self.mark_closed();
        if let Ok(mut writer) = self.writer.try_lock() {
            if let Err(err) = writer.shutdown().await {
                debug!("Shutdown of {} failed: {}", self.peer, err);
            }
        }
    }

    /// Resolves once the connection has been closed from any side.
    pub async fn closed(&self) {
        loop {
            let notified = self.close_notify.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }

    fn mark_closed(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.close_notify.notify_waiters();
        }
    }
}
