//! # Companion Controller
//!
//! Drives one companion on a presence server from a gamepad. The keyboard
//! stands in for the pad: keys become stick and button events, a fixed-rate
//! sampler turns the held sticks into `Move`/`Rotate` packets, and the
//! network link carries them to the server and reports `Rumble` and
//! `Disconnect` back.
//!
//! ## Module Organization
//!
//! - `controls`: pad state and the yaw-relative motion math
//! - `input`: keyboard sampling with change detection
//! - `sampler`: the fixed-rate send loop
//! - `network`: TCP link with writer and reader tasks
//! - `rendering`: HUD with stick, yaw and rumble indicators
//!
//! The macroquad frame loop owns input and drawing. Everything that touches
//! the socket runs on a tokio runtime, and the two sides share only the
//! `ControlState` behind a mutex plus the link's channels.

pub mod controls;
pub mod error;
pub mod input;
pub mod network;
pub mod rendering;
pub mod sampler;
