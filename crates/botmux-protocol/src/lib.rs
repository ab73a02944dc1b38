//! Wire protocol for botmux.
//!
//! This crate defines the language spoken with the chat gateway:
//!
//! - **Identity** ([`GroupId`], [`UserId`], [`MessageId`])
//! - **Content** ([`Segment`], [`MentionTarget`]): the typed segment
//!   sequence shared by inbound and outbound messages.
//! - **Model** ([`Message`], [`UnresolvedMessage`], [`OutboundMessage`]):
//!   what session logic works with.
//! - **Frames** ([`Frame`], [`GroupEvent`], [`ActionResponse`]): what the
//!   gateway pushes to us, classified by [`decode_frame`].
//! - **Actions** ([`ActionRequest`], [`SendGroupMessage`],
//!   [`GetStrangerInfo`]): what we ask of the gateway.
//! - **Codec** ([`Codec`], [`JsonCodec`]) and [`ProtocolError`].
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Frame) → Connection (InboundEvent) → Session (Message)
//! ```

mod action;
mod codec;
mod error;
mod frame;
mod message;
mod segment;
mod types;

pub use action::{
    ActionRequest, GET_STRANGER_INFO, GetStrangerInfo, SEND_GROUP_MSG, SendGroupMessage,
    SentMessage, StrangerInfo,
};
pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use frame::{ActionResponse, Frame, GroupEvent, MetaEvent, decode_frame};
pub use message::{Message, OutboundMessage, UnresolvedMessage, is_addressed};
pub use segment::{Extra, MentionTarget, Segment};
pub use types::{GroupId, MessageId, UserId};
