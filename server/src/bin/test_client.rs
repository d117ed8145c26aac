//! Scripted client: joins, walks around a bit, teleports home and leaves.
//! Handy for poking a running server without a controller.

use clap::Parser;
use shared::{
    read_packet, write_packet, ClientboundPacket, ServerboundPacket, TeleportTarget, DEFAULT_PORT,
};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    #[clap(short, long, default_value = "test_client")]
    name: String,
    #[clap(short, long, default_value = "TheCube")]
    companion: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    println!("Connecting to {}", addr);
    let stream = TcpStream::connect(&addr).await?;
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();

    let script = vec![
        ServerboundPacket::Join {
            name: args.name.clone(),
            companion: args.companion.clone(),
        },
        ServerboundPacket::Move {
            dx: 1.0,
            dy: 0.0,
            dz: 0.0,
        },
        ServerboundPacket::Move {
            dx: 0.0,
            dy: 2.0,
            dz: 0.0,
        },
        ServerboundPacket::Rotate { yaw: 1.57 },
        ServerboundPacket::Look {
            yaw: 0.5,
            pitch: -0.25,
        },
        ServerboundPacket::Teleport {
            target: TeleportTarget::Origin,
        },
    ];

    for packet in &script {
        println!("Sending {:?}", packet);
        write_packet(&mut writer, packet).await?;
        sleep(Duration::from_millis(100)).await;
    }

    // A rejected join shows up here as a Disconnect.
    match timeout(
        Duration::from_millis(200),
        read_packet::<ClientboundPacket, _>(&mut reader),
    )
    .await
    {
        Ok(Ok(Some(packet))) => println!("Server sent {:?}", packet),
        Ok(Ok(None)) => println!("Server closed the connection"),
        Ok(Err(err)) => println!("Read failed: {}", err),
        Err(_) => println!("Nothing from the server, join accepted"),
    }

    println!("Leaving");
    write_packet(&mut writer, &ServerboundPacket::Leave).await?;
    Ok(())
}
