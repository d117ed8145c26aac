use thiserror::Error;

/// Everything that can go wrong while framing or decoding a packet.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("malformed header: unknown packet type {0}")]
    MalformedHeader(u32),

    #[error("declared payload of {size} bytes exceeds the {limit} byte limit")]
    OversizedPayload { size: u64, limit: usize },

    #[error("truncated {kind} payload: expected {expected} bytes, got {actual}")]
    TruncatedPayload {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid string in field `{field}`: {reason}")]
    InvalidString {
        field: &'static str,
        reason: &'static str,
    },

    #[error("unknown {field} value {value}")]
    UnknownEnumerant { field: &'static str, value: u32 },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("codec error: {0}")]
    Codec(String),
}

impl From<bincode::Error> for ProtocolError {
    fn from(err: bincode::Error) -> Self {
        ProtocolError::Codec(err.to_string())
    }
}
