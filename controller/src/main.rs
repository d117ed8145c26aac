use clap::Parser;
use controller::controls::{ControlState, Reaction};
use controller::error::ControllerError;
use controller::input::InputManager;
use controller::network::{Link, LinkEvent};
use controller::rendering::{HudConfig, Renderer, Rumble};
use controller::sampler::spawn_sampler;
use log::{error, info, warn};
use macroquad::prelude::{next_frame, screen_height, screen_width};
use shared::{ProtocolError, DEFAULT_PORT};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Presence server host
    #[arg(short = 's', long, default_value = "127.0.0.1")]
    server: String,

    /// Presence server port
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Display name sent with the join
    #[arg(short = 'n', long, default_value = "anonymous")]
    player_name: String,

    /// Companion to control, must be one the server knows
    #[arg(short = 'c', long)]
    companion: String,

    /// Sampler period in milliseconds
    #[arg(long, default_value = "1")]
    sample_interval_ms: u64,
}

#[macroquad::main("Companion Controller")]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    if let Err(err) = run(args).await {
        error!("{}", err);
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), ControllerError> {
    // macroquad owns the main thread; sockets and the sampler live here.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(ControllerError::Runtime)?;

    let addr = format!("{}:{}", args.server, args.port);
    let mut link = runtime.block_on(Link::connect(&addr, &args.player_name, &args.companion))?;

    let state = Arc::new(Mutex::new(ControlState::new()));
    let period = Duration::from_millis(args.sample_interval_ms.max(1));
    let sampler = {
        let _guard = runtime.enter();
        spawn_sampler(Arc::clone(&state), link.sender(), period)
    };

    info!("Controls: WASD move, Q/E down/up, arrows look, Backspace teleports home");

    let mut input = InputManager::new();
    let mut renderer = Renderer::new(screen_width() as usize, screen_height() as usize);
    let mut rumble = Rumble::default();

    let outcome = 'frames: loop {
        let now = Instant::now();

        for event in input.update() {
            let reactions = state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .apply_event(event);
            for reaction in reactions {
                match reaction {
                    Reaction::Send(packet) => {
                        if let Err(err) = link.send(packet) {
                            warn!("Could not queue packet: {}", err);
                        }
                    }
                    Reaction::Rumble {
                        strength,
                        duration_ms,
                    } => rumble.start(strength, duration_ms, now),
                    Reaction::StopRumble => rumble.stop(),
                    Reaction::Quit => break 'frames Ok(()),
                }
            }
        }

        while let Some(event) = link.try_event() {
            match event {
                LinkEvent::Rumble {
                    strength,
                    duration_ms,
                } => {
                    info!("Rumble: strength {} for {}ms", strength, duration_ms);
                    rumble.start(strength, duration_ms, now);
                }
                LinkEvent::Disconnected(reason) => {
                    break 'frames Err(ControllerError::Disconnected(reason))
                }
                LinkEvent::Closed => {
                    break 'frames Err(ControllerError::Protocol(ProtocolError::ConnectionClosed))
                }
                LinkEvent::Failed(err) => break 'frames Err(ControllerError::Protocol(err)),
            }
        }

        let controls = *state.lock().unwrap_or_else(PoisonError::into_inner);
        renderer.render(HudConfig {
            player_name: &args.player_name,
            companion: &args.companion,
            server: &addr,
            controls,
            rumble_level: rumble.level(now),
        });

        next_frame().await;
    };

    sampler.abort();
    runtime.block_on(async {
        // The sampler holds a sender; the writer only finishes once it is gone.
        let _ = sampler.await;
        if outcome.is_ok() {
            info!("Leaving");
            link.leave().await;
        }
    });
    runtime.shutdown_timeout(Duration::from_millis(500));

    outcome
}
