//! The callback through which inbound group messages leave the connection.

use botmux_protocol::{GroupEvent, GroupId};

/// A group message event, keyed by the group it was posted in.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// The routing key.
    pub group_id: GroupId,
    /// The decoded event, untouched.
    pub payload: GroupEvent,
}

impl InboundEvent {
    pub fn new(payload: GroupEvent) -> Self {
        Self {
            group_id: payload.group_id,
            payload,
        }
    }
}

/// Receives every inbound group message.
///
/// `dispatch` runs on the connection's reader task, so it must hand the
/// event off and return quickly. A slow dispatcher stalls the whole link.
pub trait Dispatcher: Send + Sync + 'static {
    fn dispatch(&self, event: InboundEvent);
}

impl<F> Dispatcher for F
where
    F: Fn(InboundEvent) + Send + Sync + 'static,
{
    fn dispatch(&self, event: InboundEvent) {
        self(event)
    }
}
