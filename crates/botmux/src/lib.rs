//! # botmux
//!
//! Serve many chat groups from one gateway connection.
//!
//! A bot holds a single WebSocket link to a OneBot-style gateway and runs
//! an isolated session per configured group. Each session gets its own
//! [`MessageHandler`](botmux_session::MessageHandler), its own history,
//! and its own failure boundary; the link is shared.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use botmux::prelude::*;
//!
//! struct Hello;
//!
//! impl MessageHandler for Hello {
//!     async fn handle_message(
//!         &mut self,
//!         ctx: &SessionContext,
//!         message: &Message,
//!     ) -> Result<Vec<Vec<Segment>>, HandlerError> {
//!         if !ctx.mentioned {
//!             return Ok(vec![]);
//!         }
//!         Ok(vec![vec![Segment::mention(message.sender_id), Segment::text(" hi")]])
//!     }
//! }
//!
//! # async fn run() -> Result<(), BotmuxError> {
//! init_logging();
//! let bot = Bot::builder()
//!     .config(BotConfig::load("bot.toml")?)
//!     .build(|_group| Hello)
//!     .await?;
//! bot.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await
//! # }
//! ```

mod bot;
mod config;
mod error;
mod logging;

pub use bot::{Bot, BotBuilder};
pub use config::{BotConfig, ConfigError};
pub use error::BotmuxError;
pub use logging::{init_logging, init_logging_with};

pub use botmux_connection as connection;
pub use botmux_protocol as protocol;
pub use botmux_session as session;
pub use botmux_transport as transport;

/// Everything needed to write and run a bot.
pub mod prelude {
    pub use crate::{Bot, BotConfig, BotmuxError, ConfigError, init_logging};
    pub use botmux_protocol::{GroupId, Message, MessageId, Segment, UserId};
    pub use botmux_session::{
        CompletionBackend, CompletionHandler, HandlerError, HistoryEntry, MessageHandler,
        SessionContext,
    };
}
