use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),
}

/// Why a single inbound frame was dropped.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ticker is empty")]
    EmptyTicker,

    #[error("price must be finite and > 0, got {0}")]
    InvalidPrice(f64),

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed")]
    Closed,

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("WebSocket protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Refused, reset, or closed before the session was usable.
    pub fn is_refusal(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Closed)
    }
}
