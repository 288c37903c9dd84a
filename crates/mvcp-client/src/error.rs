use std::time::Duration;

use mvcp_frame::Failure;

use crate::state::ConnectionState;

/// Errors that can occur in client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] mvcp_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] mvcp_frame::FrameError),

    /// The engine rejected the command.
    #[error("command rejected: {0}")]
    Protocol(Failure),

    /// The command was outstanding when the connection went away.
    #[error("command abandoned: {0}")]
    Abandoned(String),

    /// The command was submitted while no connection was available.
    #[error("not connected")]
    NotConnected,

    /// The command text cannot be sent as a single protocol line.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The lifecycle operation is not allowed in the current state.
    #[error("operation not allowed while {0}")]
    InvalidState(ConnectionState),

    /// The engine greeting was missing or unexpected.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A lifecycle operation timed out.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, ClientError>;
