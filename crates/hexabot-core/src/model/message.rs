//! Incoming message shapes, payloads and outgoing envelopes.
//!
//! Outgoing envelopes serialize as `{ "format": ..., "message": {...} }`,
//! which is the contract every channel's `send_message` receives.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::block::ContentOptions;

/// Payload sent by the widget when the user asks for the next page of a
/// list or carousel.
pub const VIEW_MORE_PAYLOAD: &str = "VIEW_MORE";

// =============================================================================
// Incoming
// =============================================================================

/// Standardized event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Message,
    Delivery,
    Read,
    Typing,
    Unknown,
}

/// Standardized type of an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomingMessageType {
    Message,
    Postback,
    QuickReply,
    Location,
    Attachments,
    Unknown,
}

impl IncomingMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Postback => "postback",
            Self::QuickReply => "quick_reply",
            Self::Location => "location",
            Self::Attachments => "attachments",
            Self::Unknown => "unknown",
        }
    }
}

/// Geographic coordinates in the engine's `lat`/`lon` convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// A reference to a file received from or sent to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// File type (`image`, `video`, `audio`, `file`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: AttachmentUrl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentUrl {
    pub url: String,
}

/// Structured payloads produced by non-text interactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StructuredPayload {
    Location { coordinates: Coordinates },
    Attachments { attachments: AttachmentRef },
}

/// Payload carried by a button click, quick reply, location or upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Code(String),
    Structured(StructuredPayload),
}

impl Payload {
    /// Returns the payload code for button/quick-reply payloads.
    pub fn as_code(&self) -> Option<&str> {
        match self {
            Self::Code(code) => Some(code),
            Self::Structured(_) => None,
        }
    }

    /// Returns the `type` discriminator of a structured payload.
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            Self::Code(_) => None,
            Self::Structured(StructuredPayload::Location { .. }) => Some("location"),
            Self::Structured(StructuredPayload::Attachments { .. }) => Some("attachments"),
        }
    }

    /// Converts the payload into a JSON value suitable for context vars.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Code(code) => Value::String(code.clone()),
            Self::Structured(_) => serde_json::to_value(self).unwrap_or(Value::Null),
        }
    }
}

impl From<&str> for Payload {
    fn from(code: &str) -> Self {
        Self::Code(code.to_string())
    }
}

/// A received message in a channel-independent shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IncomingMessage {
    Postback {
        postback: String,
        text: String,
    },
    Text {
        text: String,
    },
    Location {
        coordinates: Coordinates,
    },
    Attachment {
        serialized_text: String,
        attachment: AttachmentRef,
    },
}

impl IncomingMessage {
    /// Text as seen by the pattern matcher.
    pub fn text(&self) -> &str {
        match self {
            Self::Postback { text, .. } | Self::Text { text } => text,
            Self::Attachment {
                serialized_text, ..
            } => serialized_text,
            Self::Location { .. } => "",
        }
    }
}

// =============================================================================
// Outgoing
// =============================================================================

/// Format discriminator of an outgoing envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutgoingFormat {
    Text,
    QuickReplies,
    Buttons,
    Attachment,
    List,
    Carousel,
    System,
}

impl OutgoingFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::QuickReplies => "quickReplies",
            Self::Buttons => "buttons",
            Self::Attachment => "attachment",
            Self::List => "list",
            Self::Carousel => "carousel",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuickReplyType {
    #[default]
    Text,
    Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickReply {
    #[serde(default)]
    pub content_type: QuickReplyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl QuickReply {
    pub fn text(title: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            content_type: QuickReplyType::Text,
            title: Some(title.into()),
            payload: Some(payload.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Button {
    Postback {
        title: String,
        payload: String,
    },
    WebUrl {
        title: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        webview_height_ratio: Option<String>,
    },
}

impl Button {
    pub fn title(&self) -> &str {
        match self {
            Self::Postback { title, .. } | Self::WebUrl { title, .. } => title,
        }
    }

    pub fn title_mut(&mut self) -> &mut String {
        match self {
            Self::Postback { title, .. } | Self::WebUrl { title, .. } => title,
        }
    }
}

/// Attachment reference used in outgoing messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingAttachment {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: AttachmentTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_id: Option<String>,
    /// Remote URL; no longer accepted for block messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: usize,
    pub skip: usize,
    pub limit: usize,
}

/// A page of content rendered as a list or carousel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMessage {
    pub elements: Vec<Value>,
    pub pagination: Pagination,
    pub options: ContentOptions,
}

/// The `{format, message}` pair handed to a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "message", rename_all = "camelCase")]
pub enum Envelope {
    Text {
        text: String,
    },
    QuickReplies {
        text: String,
        #[serde(rename = "quickReplies")]
        quick_replies: Vec<QuickReply>,
    },
    Buttons {
        text: String,
        buttons: Vec<Button>,
    },
    Attachment {
        attachment: OutgoingAttachment,
        #[serde(
            default,
            rename = "quickReplies",
            skip_serializing_if = "Vec::is_empty"
        )]
        quick_replies: Vec<QuickReply>,
    },
    List(ContentMessage),
    Carousel(ContentMessage),
    System {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outcome: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
}

impl Envelope {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn format(&self) -> OutgoingFormat {
        match self {
            Self::Text { .. } => OutgoingFormat::Text,
            Self::QuickReplies { .. } => OutgoingFormat::QuickReplies,
            Self::Buttons { .. } => OutgoingFormat::Buttons,
            Self::Attachment { .. } => OutgoingFormat::Attachment,
            Self::List(_) => OutgoingFormat::List,
            Self::Carousel(_) => OutgoingFormat::Carousel,
            Self::System { .. } => OutgoingFormat::System,
        }
    }

    /// Main text of the envelope, when it has one.
    pub fn text_content(&self) -> Option<&str> {
        match self {
            Self::Text { text } | Self::QuickReplies { text, .. } | Self::Buttons { text, .. } => {
                Some(text)
            }
            _ => None,
        }
    }
}

/// Delivery options passed alongside an envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendOptions {
    /// Typing indicator duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typing: Option<u64>,
    /// Hand the subscriber over to this agent.
    #[serde(default, rename = "assignTo", skip_serializing_if = "Option::is_none")]
    pub assign_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentOptions>,
}

/// Result of a successful send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    /// Channel-assigned message id.
    pub mid: String,
}
