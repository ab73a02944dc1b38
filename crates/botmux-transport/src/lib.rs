//! Transport layer for botmux.
//!
//! Provides the [`Connection`] trait over a single client link to a chat
//! gateway, the WebSocket implementation of it, and the
//! [`ReconnectPolicy`] that decides how a lost link is re-established.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket client via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
mod policy;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::{ReconnectError, TransportError};
pub use policy::{Endpoint, ReconnectPolicy};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, reconnect};

use std::fmt;

/// Opaque identifier for one established link.
///
/// A new id is issued every time the gateway is (re)connected, which makes
/// reconnects visible in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// A single link that can send and receive frames.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one frame to the gateway.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next data frame from the gateway.
    ///
    /// Returns `Ok(None)` when the link is cleanly closed. Control frames
    /// (ping/pong) are handled internally and never returned.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the link.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this link.
    fn id(&self) -> ConnectionId;
}
