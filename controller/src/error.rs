use shared::{DisconnectReason, ProtocolError};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("disconnected by server: {0}")]
    Disconnected(DisconnectReason),

    #[error("runtime error: {0}")]
    Runtime(#[source] io::Error),
}
