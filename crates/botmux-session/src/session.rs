//! Session actor: one task per group.
//!
//! Events for a group arrive through an unbounded mailbox and are handled
//! strictly one after another, so every group sees its messages in arrival
//! order. Groups never wait on each other: each has its own task.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use botmux_connection::{ConnectionManager, LookupError};
use botmux_protocol::{GroupEvent, GroupId, Message, OutboundMessage, UnresolvedMessage, UserId};
use chrono::Utc;
use futures_util::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::{HandlerError, HistoryBuffer, HistoryEntry, MessageHandler, SessionContext};

/// Whether a session is busy with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Processing,
}

pub(crate) enum SessionCommand {
    Event(GroupEvent),
    Shutdown,
}

/// Handle to a running session actor.
///
/// Cheap to clone; the router holds one per group.
#[derive(Clone)]
pub struct SessionHandle {
    group_id: GroupId,
    sender: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub(crate) fn new(
        group_id: GroupId,
        sender: mpsc::UnboundedSender<SessionCommand>,
        state: watch::Receiver<SessionState>,
    ) -> Self {
        Self {
            group_id,
            sender,
            state,
        }
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Queues an event. Never blocks. Returns `false` if the actor is gone.
    pub(crate) fn deliver(&self, event: GroupEvent) -> bool {
        self.sender.send(SessionCommand::Event(event)).is_ok()
    }

    /// Queues a shutdown behind any events already delivered.
    pub(crate) fn shutdown(&self) -> bool {
        self.sender.send(SessionCommand::Shutdown).is_ok()
    }
}

pub(crate) struct Session<H> {
    group_id: GroupId,
    bot_id: UserId,
    handler: H,
    history: HistoryBuffer,
    connection: ConnectionManager,
    state: watch::Sender<SessionState>,
    mailbox: mpsc::UnboundedReceiver<SessionCommand>,
}

impl<H: MessageHandler> Session<H> {
    /// Spawns the actor and returns its handle and task.
    pub(crate) fn spawn(
        group_id: GroupId,
        bot_id: UserId,
        history_turns: usize,
        handler: H,
        connection: ConnectionManager,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);

        let session = Self {
            group_id,
            bot_id,
            handler,
            history: HistoryBuffer::new(history_turns),
            connection,
            state: state_tx,
            mailbox: rx,
        };
        let task = tokio::spawn(session.run());
        (SessionHandle::new(group_id, tx, state_rx), task)
    }

    async fn run(mut self) {
        tracing::info!(group_id = %self.group_id, "session started");

        while let Some(command) = self.mailbox.recv().await {
            match command {
                SessionCommand::Event(event) => self.supervise(event).await,
                SessionCommand::Shutdown => break,
            }
        }

        if let Err(panic) = AssertUnwindSafe(self.handler.shutdown()).catch_unwind().await {
            tracing::error!(
                group_id = %self.group_id,
                panic = panic_message(panic.as_ref()),
                "handler panicked during shutdown"
            );
        }
        tracing::info!(group_id = %self.group_id, "session stopped");
    }

    /// Runs one event behind a failure boundary.
    async fn supervise(&mut self, event: GroupEvent) {
        self.state.send_replace(SessionState::Processing);
        let message_id = event.message_id.clone();

        match AssertUnwindSafe(self.handle(event)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(
                group_id = %self.group_id,
                %message_id,
                error = %e,
                "handler failed"
            ),
            Err(panic) => tracing::error!(
                group_id = %self.group_id,
                %message_id,
                panic = panic_message(panic.as_ref()),
                "handler panicked"
            ),
        }

        self.state.send_replace(SessionState::Idle);
    }

    /// Enriches the event, invokes the handler, and posts its replies.
    async fn handle(&mut self, event: GroupEvent) -> Result<(), HandlerError> {
        let message = self.enrich(UnresolvedMessage::from_event(event)).await;
        let ctx = SessionContext {
            group_id: self.group_id,
            bot_id: self.bot_id,
            mentioned: message.mentions(self.bot_id),
            history: self.history.snapshot(),
        };
        tracing::debug!(
            group_id = %self.group_id,
            message_id = %message.id,
            sender = %message.sender_id,
            mentioned = ctx.mentioned,
            "handling message"
        );

        let caught = AssertUnwindSafe(self.handler.handle_message(&ctx, &message))
            .catch_unwind()
            .await;
        let outcome = match caught {
            Ok(outcome) => outcome,
            Err(panic) => {
                // Recorded before unwinding on to `supervise`.
                self.history.push(HistoryEntry::Inbound(message));
                std::panic::resume_unwind(panic);
            }
        };
        let replies: Result<Vec<OutboundMessage>, HandlerError> = outcome.map(|replies| {
            replies
                .into_iter()
                .map(|content| message.reply_with(content))
                .collect()
        });
        self.history.push(HistoryEntry::Inbound(message));

        for reply in replies? {
            self.send_message(reply).await;
        }
        Ok(())
    }

    /// Resolves the sender's display name. A failed lookup yields `None`.
    async fn enrich(&mut self, draft: UnresolvedMessage) -> Message {
        let sender = draft.sender_id();
        let name = match self.connection.fetch_user_display_name(sender).await {
            Ok(name) => Some(name),
            Err(e @ LookupError::NoName { .. }) => {
                tracing::debug!(group_id = %self.group_id, error = %e, "no display name");
                None
            }
            Err(e) => {
                tracing::warn!(group_id = %self.group_id, error = %e, "display name lookup failed");
                None
            }
        };
        draft.resolve(name)
    }

    /// Posts a reply. Failures are logged and swallowed.
    async fn send_message(&mut self, message: OutboundMessage) -> bool {
        let record = self.history.is_enabled().then(|| message.content.clone());
        match self.connection.send(message).await {
            Ok(_) => {
                if let Some(content) = record {
                    self.history.push(HistoryEntry::Outbound {
                        content,
                        sent_at: Utc::now(),
                    });
                }
                true
            }
            Err(e) => {
                tracing::warn!(group_id = %self.group_id, error = %e, "reply not sent");
                false
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_extracts_str_and_string() {
        let s: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(s.as_ref()), "boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(owned.as_ref()), "kaboom");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[tokio::test]
    async fn test_handle_delivers_until_actor_stops() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_state_tx, state_rx) = watch::channel(SessionState::Idle);
        let handle = SessionHandle::new(GroupId(1), tx, state_rx);

        assert!(handle.deliver(GroupEvent {
            message_id: botmux_protocol::MessageId::new("1"),
            group_id: GroupId(1),
            user_id: UserId(2),
            message: vec![],
            time: None,
            self_id: None,
        }));
        assert!(handle.shutdown());
        assert!(matches!(rx.recv().await, Some(SessionCommand::Event(_))));
        assert!(matches!(rx.recv().await, Some(SessionCommand::Shutdown)));
        assert_eq!(handle.state(), SessionState::Idle);

        drop(rx);
        assert!(!handle.shutdown());
    }
}
