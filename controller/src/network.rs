//! Connection to the presence server: one writer task fed by a channel and
//! one reader task reporting what the server sends back.

use crate::error::ControllerError;
use log::{debug, info, warn};
use shared::{
    read_packet, write_packet, ClientboundPacket, DisconnectReason, ProtocolError,
    ServerboundPacket,
};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Something the server did that the frame loop needs to know about.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Rumble { strength: f32, duration_ms: u32 },
    Disconnected(DisconnectReason),
    /// The server closed the socket without saying why.
    Closed,
    Failed(ProtocolError),
}

pub struct Link {
    outbound: UnboundedSender<ServerboundPacket>,
    events: UnboundedReceiver<LinkEvent>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl Link {
    /// Connects and joins with the given display name and companion.
    pub async fn connect(addr: &str, name: &str, companion: &str) -> Result<Self, ControllerError> {
        info!("Connecting to {}", addr);
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ControllerError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        if let Err(err) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY: {}", err);
        }
        let (reader, writer) = stream.into_split();
        Self::join(reader, writer, name, companion).await
    }

    /// Sends `Join` on an already open stream, then starts the link tasks.
    pub async fn join<R, W>(
        reader: R,
        mut writer: W,
        name: &str,
        companion: &str,
    ) -> Result<Self, ControllerError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let join = ServerboundPacket::Join {
            name: name.to_string(),
            companion: companion.to_string(),
        };
        write_packet(&mut writer, &join).await?;
        info!("Joined as {} with companion {}", name, companion);

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();

        Ok(Self {
            outbound,
            events,
            writer: tokio::spawn(run_writer(writer, outbound_rx)),
            reader: tokio::spawn(run_reader(reader, events_tx)),
        })
    }

    /// A handle for queueing packets, e.g. for the sampler.
    pub fn sender(&self) -> UnboundedSender<ServerboundPacket> {
        self.outbound.clone()
    }

    pub fn send(&self, packet: ServerboundPacket) -> Result<(), ControllerError> {
        self.outbound
            .send(packet)
            .map_err(|_| ControllerError::Protocol(ProtocolError::ConnectionClosed))
    }

    /// Next pending event, without waiting.
    pub fn try_event(&mut self) -> Option<LinkEvent> {
        self.events.try_recv().ok()
    }

    pub async fn next_event(&mut self) -> Option<LinkEvent> {
        self.events.recv().await
    }

    /// Sends `Leave`, lets the writer flush what is queued and closes the
    /// link. Senders handed out by [`Link::sender`] must be dropped first or
    /// the writer keeps waiting for them.
    pub async fn leave(self) {
        let Link {
            outbound,
            writer,
            reader,
            ..
        } = self;

        if outbound.send(ServerboundPacket::Leave).is_err() {
            debug!("Writer already gone, skipping Leave");
        }
        drop(outbound);

        if let Err(err) = writer.await {
            warn!("Writer task failed: {}", err);
        }
        reader.abort();
    }
}

async fn run_writer<W>(mut writer: W, mut outbound: UnboundedReceiver<ServerboundPacket>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(packet) = outbound.recv().await {
        if let Err(err) = write_packet(&mut writer, &packet).await {
            warn!("Send failed: {}", err);
            return;
        }
    }
    if let Err(err) = writer.shutdown().await {
        debug!("Shutdown failed: {}", err);
    }
}

async fn run_reader<R>(mut reader: R, events: UnboundedSender<LinkEvent>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let event = match read_packet::<ClientboundPacket, _>(&mut reader).await {
            Ok(Some(ClientboundPacket::Rumble {
                strength,
                duration_ms,
            })) => {
                debug!("Rumble {} for {}ms", strength, duration_ms);
                LinkEvent::Rumble {
                    strength,
                    duration_ms,
                }
            }
            Ok(Some(ClientboundPacket::Disconnect { reason })) => {
                info!("Server disconnected us: {}", reason);
                let _ = events.send(LinkEvent::Disconnected(reason));
                return;
            }
            Ok(None) => {
                info!("Server closed the connection");
                let _ = events.send(LinkEvent::Closed);
                return;
            }
            Err(err) => {
                warn!("Receive failed: {}", err);
                let _ = events.send(LinkEvent::Failed(err));
                return;
            }
        };

        if events.send(event).is_err() {
            return;
        }
    }
}
