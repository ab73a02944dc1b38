//! Routes inbound events from the shared link to session mailboxes.

use std::collections::HashMap;

use botmux_connection::{Dispatcher, InboundEvent};
use botmux_protocol::GroupId;

use crate::SessionHandle;

/// The dispatcher registered with the connection.
///
/// The group → session mapping is fixed at construction, so lookups need
/// no locking. Dispatch is a map lookup plus a non-blocking mailbox push.
pub struct SessionRouter {
    sessions: HashMap<GroupId, SessionHandle>,
}

impl SessionRouter {
    pub(crate) fn new(sessions: HashMap<GroupId, SessionHandle>) -> Self {
        Self { sessions }
    }

    pub fn get(&self, group_id: GroupId) -> Option<&SessionHandle> {
        self.sessions.get(&group_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub(crate) fn handles(&self) -> impl Iterator<Item = &SessionHandle> {
        self.sessions.values()
    }
}

impl Dispatcher for SessionRouter {
    fn dispatch(&self, event: InboundEvent) {
        let group_id = event.group_id;
        match self.sessions.get(&group_id) {
            Some(session) => {
                if !session.deliver(event.payload) {
                    tracing::warn!(%group_id, "session has stopped; event dropped");
                }
            }
            None => tracing::debug!(%group_id, "no session for group; event dropped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionCommand, SessionState};

    use botmux_protocol::{GroupEvent, MessageId, UserId};
    use tokio::sync::{mpsc, watch};

    fn event(group: u64) -> InboundEvent {
        InboundEvent::new(GroupEvent {
            message_id: MessageId::new("1"),
            group_id: GroupId(group),
            user_id: UserId(2),
            message: vec![],
            time: None,
            self_id: None,
        })
    }

    fn router_with(
        group: GroupId,
    ) -> (SessionRouter, mpsc::UnboundedReceiver<SessionCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (_state_tx, state_rx) = watch::channel(SessionState::Idle);
        let handle = SessionHandle::new(group, tx, state_rx);
        (SessionRouter::new(HashMap::from([(group, handle)])), rx)
    }

    #[test]
    fn test_event_reaches_its_session() {
        let (router, mut rx) = router_with(GroupId(123456));
        router.dispatch(event(123456));

        match rx.try_recv() {
            Ok(SessionCommand::Event(payload)) => assert_eq!(payload.group_id, GroupId(123456)),
            _ => panic!("expected the event in the session mailbox"),
        }
    }

    #[test]
    fn test_unknown_group_is_dropped() {
        let (router, mut rx) = router_with(GroupId(1));
        router.dispatch(event(999));
        assert!(rx.try_recv().is_err());
        assert!(router.get(GroupId(999)).is_none());
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn test_stopped_session_does_not_panic_dispatcher() {
        let (router, rx) = router_with(GroupId(1));
        drop(rx);
        router.dispatch(event(1));
    }
}
