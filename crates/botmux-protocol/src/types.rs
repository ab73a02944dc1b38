//! Identity types shared by every layer.
//!
//! Gateways send numeric ids for groups and users. They are wrapped in
//! newtypes so a `UserId` can never be passed where a `GroupId` is expected,
//! even though both are `u64` underneath.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Identifies a group chat. This is the routing key: one session per group.
///
/// `#[serde(transparent)]` keeps it a plain number on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G-{}", self.0)
    }
}

/// Identifies a platform user (message senders and the bot itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// Transport-assigned message id, kept opaque.
///
/// Gateways disagree on whether this is a number or a string, so both are
/// accepted and normalized to a string. It always serializes as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Signed(i64),
            Unsigned(u64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Signed(n) => Self(n.to_string()),
            RawId::Unsigned(n) => Self(n.to_string()),
            RawId::Text(s) => Self(s),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_id_serializes_as_plain_number() {
        assert_eq!(serde_json::to_string(&GroupId(123456)).unwrap(), "123456");
        let gid: GroupId = serde_json::from_str("123456").unwrap();
        assert_eq!(gid, GroupId(123456));
    }

    #[test]
    fn test_ids_display_with_prefix() {
        assert_eq!(GroupId(3).to_string(), "G-3");
        assert_eq!(UserId(7).to_string(), "U-7");
    }

    #[test]
    fn test_message_id_accepts_numbers_and_strings() {
        let from_num: MessageId = serde_json::from_str("-2147483000").unwrap();
        assert_eq!(from_num.as_str(), "-2147483000");

        let from_str: MessageId = serde_json::from_str("\"abc-1\"").unwrap();
        assert_eq!(from_str.as_str(), "abc-1");
    }

    #[test]
    fn test_message_id_serializes_as_string() {
        let json = serde_json::to_string(&MessageId::new("99")).unwrap();
        assert_eq!(json, "\"99\"");
    }

    #[test]
    fn test_message_id_rejects_objects() {
        let result: Result<MessageId, _> = serde_json::from_str("{\"id\":1}");
        assert!(result.is_err());
    }
}
