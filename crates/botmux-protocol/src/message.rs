//! The normalized message model handed to session logic.
//!
//! `content` is the only carrier of meaning. There is no
//! plain-text field next to it; [`Message::text`] derives one on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GroupEvent, GroupId, MessageId, Segment, UserId};

/// A group message after normalization and enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// The group this message was posted in (the routing key).
    pub group_id: GroupId,
    pub sender_id: UserId,
    /// Resolved by an async lookup. `None` means the lookup failed or
    /// returned nothing; it never means "still pending".
    pub sender_display_name: Option<String>,
    pub content: Vec<Segment>,
    pub received_at: DateTime<Utc>,
}

impl Message {
    /// Concatenation of all text segments, for logging and prompts.
    pub fn text(&self) -> String {
        self.content.iter().filter_map(Segment::as_text).collect()
    }

    /// Returns `true` if any segment mentions `user`.
    pub fn mentions(&self, user: UserId) -> bool {
        is_addressed(&self.content, user)
    }

    /// Builds the reply target for this message's group.
    pub fn reply_with(&self, content: Vec<Segment>) -> OutboundMessage {
        OutboundMessage {
            group_id: self.group_id,
            content,
        }
    }
}

/// A group message whose sender name has not been resolved yet.
///
/// This is the only way to build a [`Message`] from a raw event, and the
/// only way out is [`UnresolvedMessage::resolve`], so code that sees a
/// `Message` always sees the outcome of the lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedMessage {
    id: MessageId,
    group_id: GroupId,
    sender_id: UserId,
    content: Vec<Segment>,
    received_at: DateTime<Utc>,
}

impl UnresolvedMessage {
    /// Adopts the event's segments as-is.
    ///
    /// The event's `time` becomes `received_at`; a missing or out-of-range
    /// timestamp falls back to now.
    pub fn from_event(event: GroupEvent) -> Self {
        let received_at = event
            .time
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);
        Self {
            id: event.message_id,
            group_id: event.group_id,
            sender_id: event.user_id,
            content: event.message,
            received_at,
        }
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn sender_id(&self) -> UserId {
        self.sender_id
    }

    /// Merges the lookup outcome. Blank names count as absent.
    pub fn resolve(self, display_name: Option<String>) -> Message {
        let sender_display_name = display_name.filter(|name| !name.trim().is_empty());
        Message {
            id: self.id,
            group_id: self.group_id,
            sender_id: self.sender_id,
            sender_display_name,
            content: self.content,
            received_at: self.received_at,
        }
    }
}

/// A message to post into a group.
///
/// Uses the same [`Segment`] type as [`Message`], so received content can be
/// echoed without transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub group_id: GroupId,
    pub content: Vec<Segment>,
}

/// Returns `true` iff some segment mentions exactly `bot`.
///
/// Purely structural: text that merely looks like a mention does not count,
/// and an empty content sequence is never addressed.
pub fn is_addressed(content: &[Segment], bot: UserId) -> bool {
    content.iter().any(|seg| seg.is_mention_of(bot))
}
