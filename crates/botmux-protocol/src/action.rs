//! Outbound actions: requests we send to the gateway.
//!
//! Every action is `{"action": <name>, "params": {...}, "echo": <id>}`; the
//! gateway copies `echo` into its [`ActionResponse`](crate::ActionResponse)
//! so the caller can be woken up with the right answer.

use serde::{Deserialize, Serialize};

use crate::{GroupId, MessageId, OutboundMessage, Segment, UserId};

/// Action name for posting into a group.
pub const SEND_GROUP_MSG: &str = "send_group_msg";
/// Action name for looking up a user's profile.
pub const GET_STRANGER_INFO: &str = "get_stranger_info";

/// The request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest<P> {
    pub action: String,
    pub params: P,
    pub echo: String,
}

impl<P> ActionRequest<P> {
    pub fn new(action: impl Into<String>, params: P, echo: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params,
            echo: echo.into(),
        }
    }
}

/// Params of `send_group_msg`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendGroupMessage {
    pub group_id: GroupId,
    pub message: Vec<Segment>,
}

impl From<OutboundMessage> for SendGroupMessage {
    fn from(msg: OutboundMessage) -> Self {
        Self {
            group_id: msg.group_id,
            message: msg.content,
        }
    }
}

/// `data` of a successful `send_group_msg`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentMessage {
    pub message_id: MessageId,
}

/// Params of `get_stranger_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetStrangerInfo {
    pub user_id: UserId,
    #[serde(default)]
    pub no_cache: bool,
}

/// `data` of a successful `get_stranger_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrangerInfo {
    pub user_id: UserId,
    #[serde(default)]
    pub nickname: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Frame, decode_frame};
    use serde_json::json;

    #[test]
    fn test_send_group_message_json_shape() {
        let request = ActionRequest::new(
            SEND_GROUP_MSG,
            SendGroupMessage::from(OutboundMessage {
                group_id: GroupId(123456),
                content: vec![Segment::text("hi")],
            }),
            "1",
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            json!({
                "action": "send_group_msg",
                "params": {
                    "group_id": 123456,
                    "message": [{ "type": "text", "data": { "text": "hi" } }]
                },
                "echo": "1"
            })
        );
    }

    #[test]
    fn test_echoed_segments_match_freshly_authored_payload() {
        // Segments lifted from an inbound event must produce the same
        // outbound payload as segments written by hand.
        let inbound = br#"{
            "post_type": "message",
            "message_type": "group",
            "message_id": 1,
            "group_id": 123456,
            "user_id": 42,
            "message": [
                { "type": "at", "data": { "qq": 10001 } },
                { "type": "text", "data": { "text": "hello" } },
                { "type": "poke", "data": { "id": "1" } }
            ]
        }"#;
        let Frame::GroupMessage(event) = decode_frame(inbound).unwrap() else {
            panic!("expected a group message");
        };

        let echoed = SendGroupMessage {
            group_id: event.group_id,
            message: event.message,
        };
        let authored = SendGroupMessage {
            group_id: GroupId(123456),
            message: vec![
                Segment::mention(UserId(10001)),
                Segment::text("hello"),
                Segment::Other {
                    kind: "poke".into(),
                    data: json!({ "id": "1" }),
                },
            ],
        };

        assert_eq!(
            serde_json::to_vec(&echoed).unwrap(),
            serde_json::to_vec(&authored).unwrap()
        );
    }

    #[test]
    fn test_stranger_info_tolerates_missing_nickname() {
        let info: StrangerInfo = serde_json::from_value(json!({ "user_id": 42 })).unwrap();
        assert_eq!(info.nickname, "");
    }

    #[test]
    fn test_sent_message_accepts_numeric_id() {
        let sent: SentMessage = serde_json::from_value(json!({ "message_id": 77 })).unwrap();
        assert_eq!(sent.message_id, MessageId::new("77"));
    }
}
