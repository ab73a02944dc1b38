//! Inbound frames: everything the gateway can push down the link.
//!
//! A frame is either the answer to one of our actions (it carries the
//! `echo` we sent) or an event (`post_type`). Only group messages are
//! routed; meta events are surfaced for logging; the rest is ignored.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{GroupId, MessageId, ProtocolError, Segment, UserId};

/// A group message event as delivered by the gateway.
///
/// This is the raw payload handed to the session; it is turned into a
/// [`Message`](crate::Message) only after enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupEvent {
    pub message_id: MessageId,
    pub group_id: GroupId,
    pub user_id: UserId,
    #[serde(deserialize_with = "segments_or_text")]
    pub message: Vec<Segment>,
    /// Unix seconds.
    #[serde(default)]
    pub time: Option<i64>,
    /// The bot account the gateway is logged in as.
    #[serde(default)]
    pub self_id: Option<UserId>,
}

/// Accepts the array format, or a bare string adopted as one text segment.
fn segments_or_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Segment>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(text) if text.is_empty() => Ok(Vec::new()),
        Value::String(text) => Ok(vec![Segment::text(text)]),
        value @ Value::Array(_) => serde_json::from_value(value)
            .map_err(|e| de::Error::custom(format!("invalid message segments: {e}"))),
        other => Err(de::Error::custom(format!(
            "`message` must be a segment array or a string, got {other}"
        ))),
    }
}

/// The gateway's answer to an [`ActionRequest`](crate::ActionRequest).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// `"ok"`, `"async"`, or `"failed"`.
    pub status: String,
    pub retcode: i64,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,
    /// Error description some gateways attach on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wording: Option<String>,
}

impl ActionResponse {
    pub fn ok(data: Value, echo: impl Into<String>) -> Self {
        Self {
            status: "ok".into(),
            retcode: 0,
            data,
            echo: Some(echo.into()),
            message: None,
            wording: None,
        }
    }

    pub fn failed(retcode: i64, reason: impl Into<String>, echo: impl Into<String>) -> Self {
        Self {
            status: "failed".into(),
            retcode,
            data: Value::Null,
            echo: Some(echo.into()),
            message: Some(reason.into()),
            wording: None,
        }
    }

    /// `true` when the gateway accepted the action.
    pub fn is_ok(&self) -> bool {
        self.retcode == 0 && matches!(self.status.as_str(), "ok" | "async")
    }

    /// Best available human-readable failure reason.
    pub fn reason(&self) -> String {
        self.wording
            .as_deref()
            .or(self.message.as_deref())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("status `{}`", self.status))
    }
}

/// A meta event: heartbeats and lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEvent {
    pub meta_event_type: String,
    #[serde(default)]
    pub sub_type: Option<String>,
}

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// The answer to an action we sent.
    Response(ActionResponse),
    /// A message posted in a group.
    GroupMessage(GroupEvent),
    /// Heartbeat or lifecycle notification.
    Meta(MetaEvent),
    /// A well-formed event we don't route (private messages, notices, ...).
    Ignored { post_type: String },
}

/// Classifies and decodes one inbound frame.
///
/// # Errors
/// - [`ProtocolError::Decode`] if the bytes are not JSON or a recognized
///   frame has the wrong shape.
/// - [`ProtocolError::InvalidMessage`] if the JSON is neither a response nor
///   an event.
pub fn decode_frame(data: &[u8]) -> Result<Frame, ProtocolError> {
    let value: Value = serde_json::from_slice(data).map_err(ProtocolError::Decode)?;

    if value.get("retcode").is_some() && value.get("status").is_some() {
        return serde_json::from_value(value)
            .map(Frame::Response)
            .map_err(ProtocolError::Decode);
    }

    let post_type = value
        .get("post_type")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ProtocolError::InvalidMessage("frame is neither a response nor an event".into())
        })?;

    match post_type.as_str() {
        "message" if value.get("message_type").and_then(Value::as_str) == Some("group") => {
            serde_json::from_value(value)
                .map(Frame::GroupMessage)
                .map_err(ProtocolError::Decode)
        }
        "meta_event" => serde_json::from_value(value)
            .map(Frame::Meta)
            .map_err(ProtocolError::Decode),
        _ => Ok(Frame::Ignored { post_type }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> Result<Frame, ProtocolError> {
        decode_frame(&serde_json::to_vec(&value).unwrap())
    }

    #[test]
    fn test_decode_group_message_event() {
        let frame = decode(json!({
            "time": 1700000000,
            "self_id": 10001,
            "post_type": "message",
            "message_type": "group",
            "sub_type": "normal",
            "message_id": 5561,
            "group_id": 123456,
            "user_id": 42,
            "message": [
                { "type": "at", "data": { "qq": "10001" } },
                { "type": "text", "data": { "text": "hello" } }
            ],
            "raw_message": "[CQ:at,qq=10001]hello",
            "sender": { "user_id": 42, "nickname": "alice" }
        }))
        .unwrap();

        let Frame::GroupMessage(event) = frame else {
            panic!("expected a group message, got {frame:?}");
        };
        assert_eq!(event.group_id, GroupId(123456));
        assert_eq!(event.user_id, UserId(42));
        assert_eq!(event.message_id, MessageId::new("5561"));
        assert_eq!(event.self_id, Some(UserId(10001)));
        assert_eq!(
            event.message,
            vec![Segment::mention(UserId(10001)), Segment::text("hello")]
        );
    }

    #[test]
    fn test_decode_group_message_with_string_content() {
        let frame = decode(json!({
            "post_type": "message",
            "message_type": "group",
            "message_id": "x1",
            "group_id": 1,
            "user_id": 2,
            "message": "plain words"
        }))
        .unwrap();

        let Frame::GroupMessage(event) = frame else {
            panic!("expected a group message");
        };
        assert_eq!(event.message, vec![Segment::text("plain words")]);
        assert_eq!(event.time, None);
    }

    #[test]
    fn test_decode_keeps_event_with_unexpected_segment_shape() {
        let frame = decode(json!({
            "post_type": "message",
            "message_type": "group",
            "message_id": 7,
            "group_id": 123456,
            "user_id": 42,
            "message": [
                { "type": "at", "data": { "qq": "10001" } },
                { "type": "text", "data": { "text": "hello" } },
                { "type": "image", "data": { "url": "https://cdn/x.jpg" } }
            ]
        }))
        .unwrap();

        let Frame::GroupMessage(event) = frame else {
            panic!("expected a group message, got {frame:?}");
        };
        assert_eq!(
            event.message,
            vec![
                Segment::mention(UserId(10001)),
                Segment::text("hello"),
                Segment::Other {
                    kind: "image".into(),
                    data: json!({ "url": "https://cdn/x.jpg" }),
                },
            ]
        );
        assert!(crate::is_addressed(&event.message, UserId(10001)));
    }

    #[test]
    fn test_decode_message_of_wrong_type_names_the_cause() {
        let result = decode(json!({
            "post_type": "message",
            "message_type": "group",
            "message_id": 7,
            "group_id": 1,
            "user_id": 2,
            "message": 42
        }));
        let Err(ProtocolError::Decode(e)) = result else {
            panic!("expected a decode error, got {result:?}");
        };
        assert!(e.to_string().contains("segment array or a string"), "{e}");
    }

    #[test]
    fn test_decode_group_message_missing_group_id_fails() {
        let result = decode(json!({
            "post_type": "message",
            "message_type": "group",
            "message_id": 1,
            "user_id": 2,
            "message": []
        }));
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_private_message_is_ignored() {
        let frame = decode(json!({
            "post_type": "message",
            "message_type": "private",
            "message_id": 1,
            "user_id": 2,
            "message": []
        }))
        .unwrap();
        assert_eq!(frame, Frame::Ignored { post_type: "message".into() });
    }

    #[test]
    fn test_decode_notice_is_ignored() {
        let frame = decode(json!({ "post_type": "notice", "notice_type": "group_increase" }))
            .unwrap();
        assert_eq!(frame, Frame::Ignored { post_type: "notice".into() });
    }

    #[test]
    fn test_decode_heartbeat_meta_event() {
        let frame = decode(json!({
            "post_type": "meta_event",
            "meta_event_type": "heartbeat",
            "interval": 30000,
            "status": { "online": true }
        }))
        .unwrap();
        assert_eq!(
            frame,
            Frame::Meta(MetaEvent {
                meta_event_type: "heartbeat".into(),
                sub_type: None,
            })
        );
    }

    #[test]
    fn test_decode_action_response() {
        let frame = decode(json!({
            "status": "ok",
            "retcode": 0,
            "data": { "message_id": 77 },
            "echo": "3"
        }))
        .unwrap();

        let Frame::Response(response) = frame else {
            panic!("expected a response");
        };
        assert!(response.is_ok());
        assert_eq!(response.echo.as_deref(), Some("3"));
        assert_eq!(response.data["message_id"], 77);
    }

    #[test]
    fn test_failed_response_reason_prefers_wording() {
        let mut response = ActionResponse::failed(1200, "send failed", "9");
        assert!(!response.is_ok());
        assert_eq!(response.reason(), "send failed");

        response.wording = Some("group muted".into());
        assert_eq!(response.reason(), "group muted");

        response.wording = None;
        response.message = None;
        assert_eq!(response.reason(), "status `failed`");
    }

    #[test]
    fn test_decode_unrecognized_json_is_invalid() {
        let result = decode(json!({ "hello": "world" }));
        assert!(matches!(result, Err(ProtocolError::InvalidMessage(_))));
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        assert!(matches!(
            decode_frame(b"not json at all"),
            Err(ProtocolError::Decode(_))
        ));
    }
}
