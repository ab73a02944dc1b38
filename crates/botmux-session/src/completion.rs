//! The boundary to a reply-generating backend (an LLM or anything else).

use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;

use botmux_protocol::{Message, Segment};

use crate::{HandlerError, HistoryEntry, MessageHandler, SessionContext};

/// Produces a reply from a conversation.
pub trait CompletionBackend: Send + Sync + 'static {
    type Error: StdError + Send + Sync + 'static;

    /// Generates reply content for `message`, given up to `turns` entries
    /// of preceding `history`. An empty result means no reply.
    fn complete(
        &self,
        history: &[HistoryEntry],
        message: &Message,
        turns: usize,
    ) -> impl Future<Output = Result<Vec<Segment>, Self::Error>> + Send;
}

/// A [`MessageHandler`] that answers mentions with a backend's completion.
///
/// Messages that don't mention the bot are recorded in history by the
/// session but never answered.
pub struct CompletionHandler<B> {
    backend: Arc<B>,
    turns: usize,
}

impl<B: CompletionBackend> CompletionHandler<B> {
    /// `backend` is shared between the handlers of all groups.
    pub fn new(backend: Arc<B>, turns: usize) -> Self {
        Self { backend, turns }
    }
}

impl<B: CompletionBackend> MessageHandler for CompletionHandler<B> {
    async fn handle_message(
        &mut self,
        ctx: &SessionContext,
        message: &Message,
    ) -> Result<Vec<Vec<Segment>>, HandlerError> {
        if !ctx.mentioned {
            return Ok(Vec::new());
        }

        let start = ctx.history.len().saturating_sub(self.turns);
        let reply = self
            .backend
            .complete(&ctx.history[start..], message, self.turns)
            .await
            .map_err(|e| HandlerError::with_source("completion backend failed", e))?;

        if reply.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec![reply])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use botmux_protocol::{GroupEvent, GroupId, MessageId, UnresolvedMessage, UserId};

    const BOT: UserId = UserId(10001);

    #[derive(Debug, thiserror::Error)]
    #[error("backend unavailable")]
    struct Unavailable;

    /// Replies with a fixed text and remembers how much history it saw.
    #[derive(Default)]
    struct Canned {
        fail: bool,
        seen_history: Mutex<Vec<usize>>,
    }

    impl CompletionBackend for Canned {
        type Error = Unavailable;

        async fn complete(
            &self,
            history: &[HistoryEntry],
            _message: &Message,
            _turns: usize,
        ) -> Result<Vec<Segment>, Unavailable> {
            self.seen_history.lock().unwrap().push(history.len());
            if self.fail {
                return Err(Unavailable);
            }
            Ok(vec![Segment::text("canned")])
        }
    }

    fn message(content: Vec<Segment>) -> Message {
        UnresolvedMessage::from_event(GroupEvent {
            message_id: MessageId::new("1"),
            group_id: GroupId(123456),
            user_id: UserId(42),
            message: content,
            time: None,
            self_id: None,
        })
        .resolve(None)
    }

    fn ctx(mentioned: bool, history: Vec<HistoryEntry>) -> SessionContext {
        SessionContext {
            group_id: GroupId(123456),
            bot_id: BOT,
            mentioned,
            history,
        }
    }

    #[tokio::test]
    async fn test_answers_when_mentioned() {
        let mut handler = CompletionHandler::new(Arc::new(Canned::default()), 4);
        let msg = message(vec![Segment::mention(BOT), Segment::text("hello")]);

        let replies = handler.handle_message(&ctx(true, vec![]), &msg).await.unwrap();
        assert_eq!(replies, vec![vec![Segment::text("canned")]]);
    }

    #[tokio::test]
    async fn test_stays_silent_when_not_mentioned() {
        let backend = Arc::new(Canned::default());
        let mut handler = CompletionHandler::new(Arc::clone(&backend), 4);
        let msg = message(vec![Segment::text("hello")]);

        let replies = handler.handle_message(&ctx(false, vec![]), &msg).await.unwrap();
        assert!(replies.is_empty());
        assert!(backend.seen_history.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_handler_error() {
        let backend = Arc::new(Canned {
            fail: true,
            ..Default::default()
        });
        let mut handler = CompletionHandler::new(backend, 4);
        let msg = message(vec![Segment::mention(BOT)]);

        let err = handler.handle_message(&ctx(true, vec![]), &msg).await.unwrap_err();
        assert_eq!(err.message(), "completion backend failed");
    }

    #[tokio::test]
    async fn test_history_is_trimmed_to_turns() {
        let backend = Arc::new(Canned::default());
        let mut handler = CompletionHandler::new(Arc::clone(&backend), 2);
        let history = (0..5)
            .map(|_| HistoryEntry::Inbound(message(vec![Segment::text("old")])))
            .collect();
        let msg = message(vec![Segment::mention(BOT)]);

        handler.handle_message(&ctx(true, history), &msg).await.unwrap();
        assert_eq!(*backend.seen_history.lock().unwrap(), vec![2]);
    }
}
