//! Error types for the NLS client library.

use thiserror::Error;

/// Error type for NLS client operations.
///
/// Malformed frames and unrecognized events are not errors; they are recorded
/// as [`Diagnostic`](crate::Diagnostic)s on the session.
#[derive(Error, Debug)]
pub enum Error {
    /// WebSocket connection error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required callback was not registered before session start.
    #[error("Missing required {event} callback for {kind} session")]
    MissingCallback {
        /// Session kind being started.
        kind: &'static str,
        /// Event name whose handler is missing.
        event: &'static str,
    },

    /// The connection is gone or was never established.
    #[error("Not connected")]
    NotConnected,

    /// Connection timeout.
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// The handshake request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Channel receive error.
    #[error("Channel receive error")]
    ChannelRecv,
}
