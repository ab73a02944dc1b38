//! The `MessageHandler` trait: the extension point for bot behavior.
//!
//! One handler instance is created per group by the factory passed to
//! [`SessionManager::initialize`](crate::SessionManager::initialize). The
//! session calls it with fully enriched messages, one at a time, in arrival
//! order.

use std::future::Future;

use botmux_protocol::{GroupId, Message, Segment, UserId};

use crate::{HandlerError, HistoryEntry};

/// What the session knows when it hands a message to its handler.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// The group this session serves.
    pub group_id: GroupId,
    /// The bot's own account.
    pub bot_id: UserId,
    /// `true` if the message mentions [`bot_id`](Self::bot_id).
    pub mentioned: bool,
    /// History preceding this message, oldest first.
    pub history: Vec<HistoryEntry>,
}

/// Per-group business logic.
///
/// Each element of the returned vector is posted to the group as one
/// reply, in order. An empty vector means "stay silent".
///
/// A returned [`HandlerError`] or a panic is logged by the session and
/// does not affect later messages or other groups.
pub trait MessageHandler: Send + 'static {
    fn handle_message(
        &mut self,
        ctx: &SessionContext,
        message: &Message,
    ) -> impl Future<Output = Result<Vec<Vec<Segment>>, HandlerError>> + Send;

    /// Releases resources when the session stops. Default: no-op.
    fn shutdown(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}
