//! The shared gateway link for botmux.
//!
//! One [`ConnectionManager`] owns the single WebSocket link to the chat
//! gateway. It:
//!
//! - hands every inbound group message to the registered [`Dispatcher`],
//!   keyed by group;
//! - serializes outbound requests from any number of tasks onto the socket
//!   and matches each response to its caller by `echo`;
//! - re-establishes a lost link according to the
//!   [`ReconnectPolicy`](botmux_transport::ReconnectPolicy).
//!
//! # Feature Flags
//!
//! - `test-util`: exposes [`testing::FakeGateway`], an in-process gateway
//!   for integration tests.

mod dispatch;
mod driver;
mod error;
mod manager;
#[cfg(feature = "test-util")]
pub mod testing;

pub use dispatch::{Dispatcher, InboundEvent};
pub use error::{ActionError, ConnectionError, LookupError, SendError};
pub use manager::{ConnectionManager, ConnectionSettings, DEFAULT_REQUEST_TIMEOUT, LinkState};

pub use botmux_transport::{Endpoint, ReconnectPolicy};
