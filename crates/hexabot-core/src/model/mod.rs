//! Domain model shared by every layer.

pub mod block;
pub mod context;
pub mod conversation;
pub mod message;
pub mod nlp;
pub mod subscriber;

pub use block::{
    Block, BlockAttachment, BlockMessage, BlockOptions, CaptureEntity, CaptureVar, ContentDisplay,
    ContentFields, ContentOptions, FallbackOptions, NlpMatch, NlpPattern, Pattern, PayloadPattern,
};
pub use context::{Context, UserLocation, UserSnapshot};
pub use conversation::Conversation;
pub use message::{
    AttachmentRef, AttachmentTarget, AttachmentUrl, Button, ContentMessage, Coordinates, Envelope,
    EventType, IncomingMessage, IncomingMessageType, OutgoingAttachment, OutgoingFormat,
    Pagination, Payload, QuickReply, QuickReplyType, SendOptions, SendResult, StructuredPayload,
    VIEW_MORE_PAYLOAD,
};
pub use nlp::{NlpEntity, NlpParse};
pub use subscriber::{Subscriber, SubscriberContext};
