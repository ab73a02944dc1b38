//! Unified error type for botmux.

use botmux_connection::ConnectionError;
use botmux_protocol::ProtocolError;
use botmux_session::SessionError;
use botmux_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum BotmuxError {
    /// Missing or invalid configuration. Raised before any connection
    /// attempt.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Sessions could not be started (bad routing keys, connect failure).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The gateway link failed for good.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl BotmuxError {
    /// `true` for errors that should end the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Session(_) | Self::Connection(_)
        )
    }
}
