//! Error types for the connection layer.

use std::time::Duration;

use botmux_protocol::{GroupId, ProtocolError, UserId};
use botmux_transport::TransportError;

/// Errors about the lifecycle of the shared link.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// `connect` was called before any dispatcher was registered.
    #[error("no dispatcher registered; register one before connecting")]
    NoDispatcher,

    /// `connect` was called on a manager that already owns a link.
    #[error("connection manager is already connected")]
    AlreadyConnected,

    /// The manager was closed and cannot be reused.
    #[error("connection manager is closed")]
    Closed,

    /// The initial connect attempt failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The link dropped and the reconnection policy is disabled.
    #[error("gateway link lost: {reason}")]
    Lost { reason: String },

    /// The link dropped and every reconnect attempt failed.
    #[error("gateway link lost after {attempts} reconnect attempt(s): {reason}")]
    ReconnectExhausted { attempts: u32, reason: String },
}

/// Why a single request/response exchange with the gateway failed.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The link is not up (never connected, reconnecting, or closed).
    #[error("not connected to the gateway")]
    NotConnected,

    /// The request could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Writing the frame to the link failed.
    #[error("write failed: {0}")]
    Write(#[source] TransportError),

    /// The gateway answered with a failure status.
    #[error("gateway rejected the action (retcode {retcode}): {reason}")]
    Rejected { retcode: i64, reason: String },

    /// No response arrived in time.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The link dropped while the request was outstanding.
    #[error("connection lost while waiting for a response")]
    ConnectionLost,

    /// The response `data` did not have the expected shape.
    #[error("unexpected response data: {0}")]
    UnexpectedData(#[source] serde_json::Error),
}

/// A group message could not be delivered.
#[derive(Debug, thiserror::Error)]
#[error("failed to send to group {group_id}: {source}")]
pub struct SendError {
    pub group_id: GroupId,
    #[source]
    pub source: ActionError,
}

/// A display-name lookup did not produce a name.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The lookup request itself failed.
    #[error("display name lookup for {user_id} failed: {source}")]
    Action {
        user_id: UserId,
        #[source]
        source: ActionError,
    },

    /// The gateway answered but had no name for the user.
    #[error("user {user_id} has no display name")]
    NoName { user_id: UserId },
}
