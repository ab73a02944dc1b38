//! Message segments: the typed units that make up message content.
//!
//! On the wire every segment is `{"type": <kind>, "data": {...}}`. The same
//! [`Segment`] type is used for inbound and outbound content, so a segment
//! received from the gateway can be sent back without any conversion.
//!
//! Decoding never rejects a segment for its `data`:
//!
//! - known kinds keep the `data` fields they don't model in `extra`, and
//!   write them back on output;
//! - unknown kinds, and known kinds whose `data` has an unexpected shape,
//!   become [`Segment::Other`] and are serialized back exactly as they
//!   arrived.
//!
//! Ids are the one normalization: numeric `qq`/`id` values come back out as
//! strings, which is the form gateways emit themselves.

use std::fmt;

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{MessageId, UserId};

/// Who a mention segment points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MentionTarget {
    /// `@all`: addresses every member, not one user.
    All,
    /// A single user.
    User(UserId),
}

impl fmt::Display for MentionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::User(id) => write!(f, "{}", id.0),
        }
    }
}

// Gateways emit the target as a string ("12345" or "all"); some emit a
// bare number. Output is always the string form.
impl Serialize for MentionTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MentionTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self::User(UserId(n))),
            Raw::Text(s) if s == "all" => Ok(Self::All),
            Raw::Text(s) => s
                .parse::<u64>()
                .map(|n| Self::User(UserId(n)))
                .map_err(|_| de::Error::custom(format!("invalid mention target `{s}`"))),
        }
    }
}

/// `data` fields a known segment kind carries but doesn't model.
pub type Extra = Map<String, Value>;

/// One tagged unit of message content.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Plain text.
    Text { text: String, extra: Extra },
    /// A mention (`at` on the wire).
    Mention { target: MentionTarget, extra: Extra },
    /// A built-in emoji/face by id.
    Face { id: String, extra: Extra },
    /// An image by file reference, with the download URL when the gateway
    /// provides one.
    Image {
        file: String,
        url: Option<String>,
        extra: Extra,
    },
    /// A quote of an earlier message.
    Reply { id: MessageId, extra: Extra },
    /// Anything this crate doesn't model, preserved verbatim.
    Other { kind: String, data: Value },
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            extra: Extra::new(),
        }
    }

    pub fn mention(user: UserId) -> Self {
        Self::Mention {
            target: MentionTarget::User(user),
            extra: Extra::new(),
        }
    }

    pub fn mention_all() -> Self {
        Self::Mention {
            target: MentionTarget::All,
            extra: Extra::new(),
        }
    }

    pub fn face(id: impl Into<String>) -> Self {
        Self::Face {
            id: id.into(),
            extra: Extra::new(),
        }
    }

    pub fn image(file: impl Into<String>) -> Self {
        Self::Image {
            file: file.into(),
            url: None,
            extra: Extra::new(),
        }
    }

    pub fn reply(id: MessageId) -> Self {
        Self::Reply {
            id,
            extra: Extra::new(),
        }
    }

    /// The wire `type` of this segment.
    pub fn kind(&self) -> &str {
        match self {
            Self::Text { .. } => "text",
            Self::Mention { .. } => "at",
            Self::Face { .. } => "face",
            Self::Image { .. } => "image",
            Self::Reply { .. } => "reply",
            Self::Other { kind, .. } => kind,
        }
    }

    /// Returns the text if this is a text segment.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Returns `true` if this is a mention of exactly `user`.
    ///
    /// `@all` is not a mention of any particular user.
    pub fn is_mention_of(&self, user: UserId) -> bool {
        matches!(
            self,
            Self::Mention { target: MentionTarget::User(id), .. } if *id == user
        )
    }

    /// Decodes `data` for a known kind. `None` sends the segment to
    /// [`Segment::Other`].
    fn from_known(kind: &str, data: &Value) -> Option<Self> {
        let mut extra = data.as_object()?.clone();
        Some(match kind {
            "text" => Self::Text {
                text: take(&mut extra, "text")?,
                extra,
            },
            "at" => Self::Mention {
                target: take(&mut extra, "qq")?,
                extra,
            },
            "face" => Self::Face {
                id: take::<MessageId>(&mut extra, "id")?.to_string(),
                extra,
            },
            "image" => {
                let file = take(&mut extra, "file")?;
                let url = match extra.get("url") {
                    Some(Value::String(_)) => take(&mut extra, "url"),
                    _ => None,
                };
                Self::Image { file, url, extra }
            }
            "reply" => Self::Reply {
                id: take(&mut extra, "id")?,
                extra,
            },
            _ => return None,
        })
    }

    /// The wire `data` object.
    fn data(&self) -> Value {
        let (extra, fields) = match self {
            Self::Other { data, .. } => return data.clone(),
            Self::Text { text, extra } => (extra, vec![("text", Value::from(text.as_str()))]),
            Self::Mention { target, extra } => (extra, vec![("qq", target.to_string().into())]),
            Self::Face { id, extra } => (extra, vec![("id", Value::from(id.as_str()))]),
            Self::Image { file, url, extra } => {
                let mut fields = vec![("file", Value::from(file.as_str()))];
                if let Some(url) = url {
                    fields.push(("url", Value::from(url.as_str())));
                }
                (extra, fields)
            }
            Self::Reply { id, extra } => (extra, vec![("id", Value::from(id.as_str()))]),
        };

        let mut data = extra.clone();
        for (key, value) in fields {
            data.insert(key.to_string(), value);
        }
        Value::Object(data)
    }
}

/// Removes `key` and decodes it; `None` if absent or of the wrong shape.
fn take<T: DeserializeOwned>(fields: &mut Extra, key: &str) -> Option<T> {
    serde_json::from_value(fields.remove(key)?).ok()
}

/// The `{type, data}` shape every segment has on the wire.
#[derive(Serialize, Deserialize)]
struct RawSegment {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    data: Value,
}

impl Serialize for Segment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RawSegment {
            kind: self.kind().to_string(),
            data: self.data(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Segment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let RawSegment { kind, data } = RawSegment::deserialize(deserializer)?;
        Ok(Self::from_known(&kind, &data).unwrap_or(Self::Other { kind, data }))
    }
}
