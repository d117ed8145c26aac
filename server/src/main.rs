use clap::Parser;
use log::{error, info, warn};
use server::config::ServerConfig;
use server::context::ServerContext;
use server::error::ServerError;
use server::network::Server;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Path to the TOML config file
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Address to listen on, overrides the config file
    #[clap(short, long)]
    bind: Option<String>,
    /// Maximum number of joined clients, overrides the config file
    #[clap(short, long)]
    max_clients: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(max_clients) = args.max_clients {
        config.max_clients = max_clients;
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    let ctx = Arc::new(ServerContext::new(config)?);
    if ctx.catalog.is_empty() {
        warn!("No companions configured, every join will be rejected");
    } else {
        info!("Companions: {}", ctx.catalog.ids().join(", "));
    }

    let server = Server::bind(ctx).await?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received Ctrl+C, shutting down"),
                Err(err) => error!("Could not listen for Ctrl+C: {}", err),
            }
        }
        _ = server.stopping() => {}
    }

    server.shutdown().await
}
