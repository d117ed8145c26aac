//! Integration tests for the presence server and controller link
//!
//! Every test runs a real server on a loopback port and talks to it over TCP.

use server::companion::{CompanionDef, ModelType, TextureSource};
use server::config::ServerConfig;
use server::context::ServerContext;
use server::network::Server;
use shared::{
    encode_header, read_packet, write_packet, ClientboundPacket, DisconnectReason,
    ServerboundPacket, TeleportTarget, Vec3,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};

const WAIT: Duration = Duration::from_secs(2);

fn companion(id: &str) -> CompanionDef {
    CompanionDef {
        id: id.to_string(),
        model_type: ModelType::Obj,
        model_file: PathBuf::from(format!("{}.obj", id)),
        texture: TextureSource::None,
    }
}

async fn start_server(max_clients: usize) -> Server {
    let config = ServerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        max_clients,
        companions: vec![companion("TheCube"), companion("TheCone")],
        ..ServerConfig::default()
    };
    let ctx = Arc::new(ServerContext::new(config).unwrap());
    Server::bind(ctx).await.unwrap()
}

/// Polls `condition` until it holds or the wait runs out.
async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        sleep(Duration::from_millis(5)).await;
    }
}

struct TestClient {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        stream.set_nodelay(true).unwrap();
        let (reader, writer) = stream.into_split();
        Self { reader, writer }
    }

    async fn join(addr: SocketAddr, name: &str, companion: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client
            .send(ServerboundPacket::Join {
                name: name.to_string(),
                companion: companion.to_string(),
            })
            .await;
        client
    }

    async fn send(&mut self, packet: ServerboundPacket) {
        write_packet(&mut self.writer, &packet).await.unwrap();
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    /// Next packet from the server, `None` once it has closed the socket.
    async fn recv(&mut self) -> Option<ClientboundPacket> {
        timeout(WAIT, read_packet::<ClientboundPacket, _>(&mut self.reader))
            .await
            .expect("server did not answer")
            .expect("malformed packet from server")
    }

    /// Whether the server says anything within `wait`.
    async fn is_quiet_for(&mut self, wait: Duration) -> bool {
        timeout(wait, read_packet::<ClientboundPacket, _>(&mut self.reader))
            .await
            .is_err()
    }
}

fn position_of(server: &Server, name: &str) -> Option<Vec3> {
    server
        .context()
        .scene
        .snapshot()
        .into_iter()
        .find(|client| client.name == name)
        .map(|client| client.position)
}

/// AVATAR LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    /// Join, walk, teleport home and leave, watching the scene at each step
    #[tokio::test]
    async fn join_move_teleport_leave() {
        let server = start_server(4).await;
        let mut bob = TestClient::join(server.local_addr(), "Bob", "TheCube").await;

        eventually("Bob in scene", || {
            position_of(&server, "Bob") == Some(Vec3::ZERO)
        })
        .await;
        let rendered = server.context().scene.snapshot();
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].companion, "TheCube");

        bob.send(ServerboundPacket::Move {
            dx: 1.0,
            dy: 0.0,
            dz: 0.0,
        })
        .await;
        bob.send(ServerboundPacket::Move {
            dx: 0.0,
            dy: 2.0,
            dz: 0.0,
        })
        .await;
        eventually("Bob at (1, 2, 0)", || {
            position_of(&server, "Bob") == Some(Vec3::new(1.0, 2.0, 0.0))
        })
        .await;

        bob.send(ServerboundPacket::Teleport {
            target: TeleportTarget::Origin,
        })
        .await;
        eventually("Bob back at origin", || {
            position_of(&server, "Bob") == Some(Vec3::ZERO)
        })
        .await;

        bob.send(ServerboundPacket::Leave).await;
        eventually("Bob gone", || {
            server.context().scene.is_empty() && server.registry().is_empty()
        })
        .await;
        // Leaving is silent: the socket just closes.
        assert_eq!(bob.recv().await, None);

        server.shutdown().await.unwrap();
    }

    /// Rotate and Look land in the rendered pose
    #[tokio::test]
    async fn rotate_and_look_update_pose() {
        let server = start_server(4).await;
        let mut alice = TestClient::join(server.local_addr(), "Alice", "TheCone").await;

        alice.send(ServerboundPacket::Rotate { yaw: 1.5 }).await;
        alice
            .send(ServerboundPacket::Look {
                yaw: 0.5,
                pitch: -0.25,
            })
            .await;

        eventually("pose updated", || {
            server
                .context()
                .scene
                .snapshot()
                .first()
                .is_some_and(|client| client.yaw == 0.5 && client.pitch == -0.25)
        })
        .await;

        server.shutdown().await.unwrap();
    }

    /// A client that closes its socket is cleaned up like one that leaves
    #[tokio::test]
    async fn dropped_socket_removes_avatar() {
        let server = start_server(4).await;
        let bob = TestClient::join(server.local_addr(), "Bob", "TheCube").await;
        eventually("Bob in scene", || server.context().scene.len() == 1).await;

        drop(bob);
        eventually("Bob gone", || {
            server.context().scene.is_empty() && server.registry().is_empty()
        })
        .await;

        server.shutdown().await.unwrap();
    }
}

/// JOIN ADMISSION TESTS
mod admission_tests {
    use super::*;

    /// An unknown companion is refused with a reason and leaves no trace
    #[tokio::test]
    async fn unknown_companion_is_rejected() {
        let server = start_server(4).await;
        let mut eve = TestClient::join(server.local_addr(), "Eve", "TheSphere").await;

        assert_eq!(
            eve.recv().await,
            Some(ClientboundPacket::Disconnect {
                reason: DisconnectReason::UnknownCompanion
            })
        );
        assert_eq!(eve.recv().await, None);
        eventually("Eve unregistered", || server.registry().is_empty()).await;
        assert!(server.context().scene.is_empty());

        server.shutdown().await.unwrap();
    }

    /// Joins past the limit are refused and the live count stays at the limit
    #[tokio::test]
    async fn joins_beyond_capacity_are_rejected() {
        let server = start_server(2).await;
        let addr = server.local_addr();

        let mut first = TestClient::join(addr, "One", "TheCube").await;
        let mut second = TestClient::join(addr, "Two", "TheCone").await;
        eventually("two joined", || server.context().scene.len() == 2).await;

        let mut third = TestClient::join(addr, "Three", "TheCube").await;
        assert_eq!(
            third.recv().await,
            Some(ClientboundPacket::Disconnect {
                reason: DisconnectReason::TooManyClients
            })
        );

        // Both rules fail for this one; only the capacity reason is sent.
        let mut fourth = TestClient::join(addr, "Four", "TheSphere").await;
        assert_eq!(
            fourth.recv().await,
            Some(ClientboundPacket::Disconnect {
                reason: DisconnectReason::TooManyClients
            })
        );
        assert_eq!(fourth.recv().await, None);

        assert_eq!(server.context().scene.len(), 2);
        assert!(first.is_quiet_for(Duration::from_millis(50)).await);
        assert!(second.is_quiet_for(Duration::from_millis(50)).await);

        server.shutdown().await.unwrap();
    }

    /// Concurrent joins never push the scene past the maximum
    #[tokio::test]
    async fn concurrent_joins_respect_capacity() {
        let server = start_server(3).await;
        let addr = server.local_addr();

        let mut attempts = Vec::new();
        for i in 0..10 {
            attempts.push(tokio::spawn(async move {
                let mut client = TestClient::join(addr, &format!("player{}", i), "TheCube").await;
                let rejected = !client.is_quiet_for(Duration::from_millis(500)).await;
                (client, rejected)
            }));
        }

        let mut clients = Vec::new();
        let mut rejected = 0;
        for attempt in attempts {
            let (client, was_rejected) = attempt.await.unwrap();
            if was_rejected {
                rejected += 1;
            }
            clients.push(client);
        }

        assert_eq!(rejected, 7);
        assert_eq!(server.context().scene.len(), 3);

        server.shutdown().await.unwrap();
    }
}

/// CONNECTION MANAGEMENT TESTS
mod connection_tests {
    use super::*;

    /// Kicking twice sends exactly one Disconnect
    #[tokio::test]
    async fn kick_is_idempotent() {
        let server = start_server(4).await;
        let mut bob = TestClient::join(server.local_addr(), "Bob", "TheCube").await;
        eventually("Bob in scene", || server.context().scene.len() == 1).await;
        let id = server.registry().ids()[0];

        assert!(server.kick(id).await);
        assert!(!server.kick(id).await);

        assert_eq!(
            bob.recv().await,
            Some(ClientboundPacket::Disconnect {
                reason: DisconnectReason::Kicked
            })
        );
        assert_eq!(bob.recv().await, None);
        assert!(server.context().scene.is_empty());

        server.shutdown().await.unwrap();
    }

    /// Rumble reaches the addressed client only
    #[tokio::test]
    async fn send_to_delivers_rumble() {
        let server = start_server(4).await;
        let mut bob = TestClient::join(server.local_addr(), "Bob", "TheCube").await;
        let mut alice = TestClient::join(server.local_addr(), "Alice", "TheCone").await;
        eventually("both joined", || server.context().scene.len() == 2).await;

        let bob_id = server
            .context()
            .scene
            .snapshot()
            .into_iter()
            .find(|client| client.name == "Bob")
            .map(|client| client.id)
            .unwrap();
        let rumble = ClientboundPacket::Rumble {
            strength: 0.75,
            duration_ms: 250,
        };
        server.send_to(bob_id, &rumble).await.unwrap();

        assert_eq!(bob.recv().await, Some(rumble));
        assert!(alice.is_quiet_for(Duration::from_millis(50)).await);

        server.shutdown().await.unwrap();
    }

    /// A bad header drops only the client that sent it
    #[tokio::test]
    async fn malformed_header_is_isolated() {
        let server = start_server(4).await;
        let mut bob = TestClient::join(server.local_addr(), "Bob", "TheCube").await;
        eventually("Bob in scene", || server.context().scene.len() == 1).await;

        let mut garbage = TestClient::connect(server.local_addr()).await;
        garbage.send_raw(&encode_header(99, 0).unwrap()).await;
        assert_eq!(garbage.recv().await, None);

        let mut greedy = TestClient::connect(server.local_addr()).await;
        greedy.send_raw(&encode_header(0, 1 << 20).unwrap()).await;
        assert_eq!(greedy.recv().await, None);

        bob.send(ServerboundPacket::Move {
            dx: 0.5,
            dy: 0.0,
            dz: 0.0,
        })
        .await;
        eventually("Bob still moving", || {
            position_of(&server, "Bob") == Some(Vec3::new(0.5, 0.0, 0.0))
        })
        .await;
        eventually("bad clients dropped", || server.registry().len() == 1).await;

        server.shutdown().await.unwrap();
    }

    /// Shutdown tells every client and waits for all receive loops
    #[tokio::test]
    async fn shutdown_closes_every_client() {
        let server = start_server(4).await;
        let addr = server.local_addr();
        let mut bob = TestClient::join(addr, "Bob", "TheCube").await;
        let mut alice = TestClient::join(addr, "Alice", "TheCone").await;
        let mut lurker = TestClient::connect(addr).await;
        eventually("all registered", || server.registry().len() == 3).await;

        timeout(WAIT, server.shutdown())
            .await
            .expect("shutdown hung")
            .unwrap();

        for client in [&mut bob, &mut alice, &mut lurker] {
            assert_eq!(
                client.recv().await,
                Some(ClientboundPacket::Disconnect {
                    reason: DisconnectReason::ServerClosing
                })
            );
            assert_eq!(client.recv().await, None);
        }
        assert!(server.registry().is_empty());
        assert!(server.context().scene.is_empty());
        assert!(TcpStream::connect(addr).await.is_err());

        // A second shutdown is a no-op.
        server.shutdown().await.unwrap();
    }
}

/// CONTROLLER LINK TESTS
mod controller_tests {
    use super::*;
    use controller::controls::{Axis, ControlState, ControllerEvent};
    use controller::network::{Link, LinkEvent};

    /// The controller's link joins, moves the avatar and leaves cleanly
    #[tokio::test]
    async fn controller_link_drives_avatar() {
        let server = start_server(4).await;
        let addr = server.local_addr().to_string();

        let link = Link::connect(&addr, "Pad", "TheCube").await.unwrap();
        eventually("Pad in scene", || position_of(&server, "Pad").is_some()).await;

        let mut controls = ControlState::new();
        controls.apply_event(ControllerEvent::Axis {
            axis: Axis::LeftY,
            value: -i16::MAX,
        });
        for _ in 0..10 {
            for packet in controls.tick() {
                link.send(packet).unwrap();
            }
        }

        eventually("Pad walked forward", || {
            position_of(&server, "Pad").is_some_and(|p| (p.x - 0.1).abs() < 1e-4)
        })
        .await;

        link.leave().await;
        eventually("Pad gone", || server.context().scene.is_empty()).await;

        server.shutdown().await.unwrap();
    }

    /// A rejected join surfaces as a Disconnect event on the link
    #[tokio::test]
    async fn controller_link_reports_rejection() {
        let server = start_server(4).await;
        let addr = server.local_addr().to_string();

        let mut link = Link::connect(&addr, "Pad", "TheSphere").await.unwrap();
        let event = timeout(WAIT, link.next_event()).await.unwrap();
        assert_eq!(
            event,
            Some(LinkEvent::Disconnected(DisconnectReason::UnknownCompanion))
        );

        server.shutdown().await.unwrap();
    }

    /// Server rumble arrives as a link event
    #[tokio::test]
    async fn controller_link_receives_rumble() {
        let server = start_server(4).await;
        let addr = server.local_addr().to_string();

        let mut link = Link::connect(&addr, "Pad", "TheCube").await.unwrap();
        eventually("Pad registered", || server.context().scene.len() == 1).await;
        let id = server.registry().ids()[0];

        server
            .send_to(
                id,
                &ClientboundPacket::Rumble {
                    strength: 1.0,
                    duration_ms: 500,
                },
            )
            .await
            .unwrap();

        assert_eq!(
            timeout(WAIT, link.next_event()).await.unwrap(),
            Some(LinkEvent::Rumble {
                strength: 1.0,
                duration_ms: 500
            })
        );

        link.leave().await;
        server.shutdown().await.unwrap();
    }
}
