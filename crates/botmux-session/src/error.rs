//! Error types for the session layer.

use std::error::Error as StdError;

use botmux_connection::ConnectionError;
use botmux_protocol::GroupId;

/// Errors that stop a [`SessionManager`](crate::SessionManager) from starting.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No routing key was configured.
    #[error("no routing keys configured")]
    NoRoutingKeys,

    /// The same group appears twice in the routing keys.
    #[error("routing key {0} is configured more than once")]
    DuplicateRoutingKey(GroupId),

    /// The gateway link could not be established.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// A failure inside a [`MessageHandler`](crate::MessageHandler).
///
/// Logged by the session with its group and never propagated further.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
