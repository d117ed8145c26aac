//! TCP listener, per-client receive loops and cooperative shutdown.

use crate::connection::Connection;
use crate::context::ServerContext;
use crate::error::ServerError;
use crate::handler::{AvatarHandler, HandlerAction, HandlerFactory};
use crate::registry::ClientRegistry;
use crate::ClientId;
use log::{debug, error, info, warn};
use shared::{read_packet, ClientboundPacket, DisconnectReason, ProtocolError, ServerboundPacket};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

// EMFILE / ENFILE
const FD_EXHAUSTION_CODES: [i32; 2] = [24, 23];

/// A running server. Dropping it without calling [`Server::shutdown`] still
/// stops the accept loop, but does not wait for it.
pub struct Server {
    ctx: Arc<ServerContext>,
    registry: Arc<ClientRegistry>,
    local_addr: SocketAddr,
    exit: Arc<watch::Sender<bool>>,
    accept_task: Mutex<Option<JoinHandle<Result<(), ServerError>>>>,
}

impl Server {
    /// Binds the configured address and starts accepting clients, each of
    /// which gets an [`AvatarHandler`].
    pub async fn bind(ctx: Arc<ServerContext>) -> Result<Self, ServerError> {
        let factory = AvatarHandler::factory(Arc::clone(&ctx));
        Self::bind_with_factory(ctx, factory).await
    }

    pub async fn bind_with_factory(
        ctx: Arc<ServerContext>,
        factory: Arc<HandlerFactory>,
    ) -> Result<Self, ServerError> {
        let addr = ctx.config.bind_address.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
        info!("Server listening on {}", local_addr);

        let registry = Arc::new(ClientRegistry::new());
        let (exit, _) = watch::channel(false);
        let exit = Arc::new(exit);

        let accept_loop = AcceptLoop {
            listener,
            registry: Arc::clone(&registry),
            factory,
            exit: Arc::clone(&exit),
            poll_interval: ctx.config.poll_interval(),
        };
        let accept_task = tokio::spawn(accept_loop.run());

        Ok(Self {
            ctx,
            registry,
            local_addr,
            exit,
            accept_task: Mutex::new(Some(accept_task)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Disconnects a client with `Kicked`. Returns false if it was not
    /// connected.
    pub async fn kick(&self, id: ClientId) -> bool {
        self.registry
            .disconnect(id, Some(DisconnectReason::Kicked))
            .await
    }

    pub async fn send_to(
        &self,
        id: ClientId,
        packet: &ClientboundPacket,
    ) -> Result<(), ProtocolError> {
        self.registry.send(id, packet).await
    }

    /// Resolves once shutdown has been signalled, either by
    /// [`Server::shutdown`] or by the listener failing.
    pub async fn stopping(&self) {
        let mut exit = self.exit.subscribe();
        wait_for_exit(&mut exit).await;
    }

    /// Stops accepting, tells every client the server is closing and waits
    /// for all of their receive loops to finish.
    ///
    /// Returns the listener's error if it had already failed. Calling this
    /// again after it returned is a no-op.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        self.exit.send_replace(true);

        let task = self
            .accept_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(task) = task else {
            return Ok(());
        };

        let result = match task.await {
            Ok(result) => result,
            Err(err) => {
                error!("Accept task panicked: {}", err);
                Ok(())
            }
        };
        info!("Server on {} stopped", self.local_addr);
        result
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.exit.send_replace(true);
    }
}

struct AcceptLoop {
    listener: TcpListener,
    registry: Arc<ClientRegistry>,
    factory: Arc<HandlerFactory>,
    exit: Arc<watch::Sender<bool>>,
    poll_interval: Duration,
}

impl AcceptLoop {
    async fn run(self) -> Result<(), ServerError> {
        let mut exit = self.exit.subscribe();
        let mut sessions = JoinSet::new();

        let result = loop {
            let accepted = tokio::select! {
                _ = wait_for_exit(&mut exit) => break Ok(()),
                accepted = self.listener.accept() => accepted,
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(err) = joined {
                        error!("Receive loop panicked: {}", err);
                    }
                    continue;
                }
            };

            match accepted {
                Ok((stream, peer)) => self.start_session(&mut sessions, stream, peer),
                Err(err) if is_transient(&err) => {
                    warn!("Transient accept error: {}", err);
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(err) => {
                    error!("Listener failed: {}", err);
                    break Err(ServerError::Accept(err));
                }
            }
        };

        // Covers the listener failing on its own.
        self.exit.send_replace(true);

        debug!("Waiting for {} receive loops", sessions.len());
        while let Some(joined) = sessions.join_next().await {
            if let Err(err) = joined {
                error!("Receive loop panicked: {}", err);
            }
        }
        result
    }

    fn start_session(&self, sessions: &mut JoinSet<()>, stream: TcpStream, peer: SocketAddr) {
        if let Err(err) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY for {}: {}", peer, err);
        }
        let (reader, writer) = stream.into_split();
        let connection = Arc::new(Connection::new(peer, writer));
        let Some(id) = self
            .registry
            .register(&peer.to_string(), Arc::clone(&connection), &*self.factory)
        else {
            warn!("Refusing {}: client ids exhausted", peer);
            return;
        };
        info!("Accepted {} as client {}", peer, id);

        let session = Session {
            id,
            reader,
            connection,
            registry: Arc::clone(&self.registry),
            exit: self.exit.subscribe(),
        };
        sessions.spawn(session.run());
    }
}

/// Resolves once the exit flag is raised. The borrow `wait_for` hands back
/// is dropped here so it never lives across another await.
async fn wait_for_exit(exit: &mut watch::Receiver<bool>) {
    // Err means the sender is gone, which also means stop.
    let _ = exit.wait_for(|stopping| *stopping).await;
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || err
        .raw_os_error()
        .is_some_and(|code| FD_EXHAUSTION_CODES.contains(&code))
}

enum Next {
    Packet(Result<Option<ServerboundPacket>, ProtocolError>),
    Closed,
    Exit,
}

/// One client's receive loop.
struct Session {
    id: ClientId,
    reader: OwnedReadHalf,
    connection: Arc<Connection>,
    registry: Arc<ClientRegistry>,
    exit: watch::Receiver<bool>,
}

impl Session {
    async fn run(mut self) {
        loop {
            let next = tokio::select! {
                _ = wait_for_exit(&mut self.exit) => Next::Exit,
                _ = self.connection.closed() => Next::Closed,
                read = read_packet(&mut self.reader) => Next::Packet(read),
            };

            match next {
                Next::Packet(Ok(Some(packet))) => {
                    debug!("Client {} sent {:?}", self.id, packet);
                    match self.registry.dispatch(self.id, packet) {
                        Some(HandlerAction::Continue) => {}
                        Some(HandlerAction::Disconnect(reason)) => {
                            self.registry.disconnect(self.id, Some(reason)).await;
                            break;
                        }
                        Some(HandlerAction::Leave) => {
                            self.registry.disconnect(self.id, None).await;
                            break;
                        }
                        None => break,
                    }
                }
                Next::Packet(Ok(None)) => {
                    debug!("Client {} closed its socket", self.id);
                    self.registry.disconnect(self.id, None).await;
                    break;
                }
                Next::Packet(Err(ProtocolError::ConnectionClosed)) => {
                    debug!("Client {} connection lost", self.id);
                    self.registry.disconnect(self.id, None).await;
                    break;
                }
                Next::Packet(Err(err)) => {
                    warn!("Dropping client {}: {}", self.id, err);
                    self.registry.disconnect(self.id, None).await;
                    break;
                }
                Next::Closed => {
                    debug!("Client {} was closed elsewhere", self.id);
                    // No-op unless the write side failed on its own.
                    self.registry.disconnect(self.id, None).await;
                    break;
                }
                Next::Exit => {
                    self.registry
                        .disconnect(self.id, Some(DisconnectReason::ServerClosing))
                        .await;
                    break;
                }
            }
        }
        debug!("Receive loop for client {} finished", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn context_on(addr: &str) -> Arc<ServerContext> {
        let config = ServerConfig {
            bind_address: addr.to_string(),
            ..ServerConfig::default()
        };
        Arc::new(ServerContext::new(config).unwrap())
    }

    #[tokio::test]
    async fn test_bind_on_address_in_use_fails() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let result = Server::bind(context_on(&addr)).await;
        assert!(matches!(
            result,
            Err(ServerError::Bind { addr: ref failed, .. }) if *failed == addr
        ));
    }

    #[tokio::test]
    async fn test_accept_loop_can_be_spawned() {
        fn assert_send<T: Send>(_: &T) {}

        let ctx = context_on("127.0.0.1:0");
        let (exit, _) = watch::channel(false);
        let accept_loop = AcceptLoop {
            listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
            registry: Arc::new(ClientRegistry::new()),
            factory: AvatarHandler::factory(Arc::clone(&ctx)),
            exit: Arc::new(exit),
            poll_interval: ctx.config.poll_interval(),
        };
        let exit = Arc::clone(&accept_loop.exit);

        let run = accept_loop.run();
        assert_send(&run);
        let task = tokio::spawn(run);
        exit.send_replace(true);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_twice_is_a_no_op() {
        let server = match Server::bind(context_on("127.0.0.1:0")).await {
            Ok(server) => server,
            Err(err) => panic!("bind failed: {}", err),
        };
        assert!(server.shutdown().await.is_ok());
        assert!(server.shutdown().await.is_ok());
        tokio::time::timeout(Duration::from_secs(1), server.stopping())
            .await
            .unwrap();
    }

    #[test]
    fn test_transient_accept_errors() {
        for kind in [
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::Interrupted,
            io::ErrorKind::WouldBlock,
        ] {
            assert!(is_transient(&io::Error::from(kind)), "{:?}", kind);
        }
        assert!(is_transient(&io::Error::from_raw_os_error(24)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::InvalidInput)));
    }
}
