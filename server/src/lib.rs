//! # Companion Presence Server
//!
//! Accepts TCP connections from controller clients, lets each one join with a
//! display name and a companion model, and keeps that companion's avatar
//! (position, yaw, pitch) up to date from the client's input packets. Joined
//! avatars are published to the [`scene::Scene`], which is what a renderer
//! reads.
//!
//! ## Module Organization
//!
//! - `config` / `companion`: TOML configuration and the catalog of
//!   companion models clients may pick from
//! - `context`: the config, catalog and scene bundled for handlers
//! - `connection`: the write half of one client socket
//! - `registry`: live clients by id, each owning its handler
//! - `handler`: per-client packet interpretation (the avatar state machine)
//! - `scene`: the render-client list
//! - `network`: listener, receive loops and shutdown
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::context::ServerContext;
//! use server::network::Server;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = Arc::new(ServerContext::new(ServerConfig::default())?);
//!     let server = Server::bind(ctx).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod companion;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod handler;
pub mod network;
pub mod registry;
pub mod scene;

/// Server-assigned client id. Starts at 1 and is never reused.
pub type ClientId = u32;
