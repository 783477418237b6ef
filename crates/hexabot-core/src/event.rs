//! Canonical inbound events.
//!
//! Every channel normalizes its raw payload into one variant of
//! [`ChannelEvent`]. The engine only ever sees an [`Event`], which wraps the
//! variant together with the resolved sender and the NLU parse, and exposes a
//! single accessor surface regardless of the channel it came from:
//!
//! ```text
//! raw JSON ──parse──▶ ChannelEvent::Web(..)     ─┐
//!                     ChannelEvent::Console(..) ─┴─▶ Event { sender, nlp } ──▶ engine
//! ```
//!
//! # Widget protocol
//!
//! Both built-in channels speak the chat widget protocol ([`WebEvent`]):
//!
//! ```json
//! { "type": "text", "data": { "text": "Hello" }, "mid": "m1", "author": "u1" }
//! { "type": "postback", "data": { "text": "Yes", "payload": "YES" }, "author": "u1" }
//! { "type": "location", "data": { "coordinates": { "lat": 1.0, "lng": 2.0 } } }
//! { "type": "delivery", "mid": "m1" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EventError, EventResult};
use crate::model::{
    AttachmentRef, AttachmentUrl, Coordinates, EventType, IncomingMessage, IncomingMessageType,
    NlpParse, Payload, StructuredPayload, Subscriber,
};

/// Channel name of the web widget.
pub const WEB_CHANNEL_NAME: &str = "web-channel";

/// Channel name of the admin console test widget.
pub const CONSOLE_CHANNEL_NAME: &str = "console-channel";

// =============================================================================
// Widget protocol model
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextData {
    pub text: String,
}

/// Quick replies and buttons carry the same data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadData {
    pub text: String,
    pub payload: String,
}

/// Widget coordinates use `lng`; they are renamed to `lon` when normalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationData {
    pub coordinates: LatLng,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileData {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Body of a widget message, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WebMessageBody {
    Text { data: TextData },
    QuickReply { data: PayloadData },
    Postback { data: PayloadData },
    Location { data: LocationData },
    File { data: FileData },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebMessage {
    #[serde(flatten)]
    pub body: WebMessageBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    /// Foreign id of the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WebStatus {
    Delivery { mid: String },
    Read { watermark: i64 },
    Typing,
}

/// A raw widget event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WebEvent {
    Message(WebMessage),
    Status(WebStatus),
    /// Anything the widget sent that is not understood.
    Unknown(Value),
}

impl WebEvent {
    fn message(&self) -> Option<&WebMessage> {
        match self {
            Self::Message(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            Self::Message(_) => EventType::Message,
            Self::Status(WebStatus::Delivery { .. }) => EventType::Delivery,
            Self::Status(WebStatus::Read { .. }) => EventType::Read,
            Self::Status(WebStatus::Typing) => EventType::Typing,
            Self::Unknown(_) => EventType::Unknown,
        }
    }

    pub fn message_type(&self) -> IncomingMessageType {
        match self.message().map(|m| &m.body) {
            Some(WebMessageBody::Text { .. }) => IncomingMessageType::Message,
            Some(WebMessageBody::QuickReply { .. }) => IncomingMessageType::QuickReply,
            Some(WebMessageBody::Postback { .. }) => IncomingMessageType::Postback,
            Some(WebMessageBody::Location { .. }) => IncomingMessageType::Location,
            Some(WebMessageBody::File { .. }) => IncomingMessageType::Attachments,
            None => IncomingMessageType::Unknown,
        }
    }

    pub fn payload(&self) -> Option<Payload> {
        match &self.message()?.body {
            WebMessageBody::QuickReply { data } | WebMessageBody::Postback { data } => {
                Some(Payload::Code(data.payload.clone()))
            }
            WebMessageBody::Location { data } => {
                Some(Payload::Structured(StructuredPayload::Location {
                    coordinates: Coordinates {
                        lat: data.coordinates.lat,
                        lon: data.coordinates.lng,
                    },
                }))
            }
            WebMessageBody::File { data } => {
                Some(Payload::Structured(StructuredPayload::Attachments {
                    attachments: attachment_ref(data),
                }))
            }
            WebMessageBody::Text { .. } => None,
        }
    }

    pub fn message_content(&self) -> IncomingMessage {
        let Some(msg) = self.message() else {
            return IncomingMessage::Text {
                text: String::new(),
            };
        };
        match &msg.body {
            WebMessageBody::Text { data } => IncomingMessage::Text {
                text: data.text.clone(),
            },
            WebMessageBody::QuickReply { data } | WebMessageBody::Postback { data } => {
                IncomingMessage::Postback {
                    postback: data.payload.clone(),
                    text: data.text.clone(),
                }
            }
            WebMessageBody::Location { data } => IncomingMessage::Location {
                coordinates: Coordinates {
                    lat: data.coordinates.lat,
                    lon: data.coordinates.lng,
                },
            },
            WebMessageBody::File { data } => IncomingMessage::Attachment {
                serialized_text: format!("attachment:{}:{}", data.kind, data.url),
                attachment: attachment_ref(data),
            },
        }
    }
}

fn attachment_ref(data: &FileData) -> AttachmentRef {
    AttachmentRef {
        kind: data.kind.clone(),
        payload: AttachmentUrl {
            url: data.url.clone(),
        },
    }
}

// =============================================================================
// ChannelEvent / Event
// =============================================================================

/// A normalized event, one variant per channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Web(WebEvent),
    Console(WebEvent),
}

impl ChannelEvent {
    /// Name of the channel that produced the event.
    pub fn channel_name(&self) -> &'static str {
        match self {
            Self::Web(_) => WEB_CHANNEL_NAME,
            Self::Console(_) => CONSOLE_CHANNEL_NAME,
        }
    }

    fn widget(&self) -> &WebEvent {
        match self {
            Self::Web(ev) | Self::Console(ev) => ev,
        }
    }
}

/// The event handed to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    inner: ChannelEvent,
    sender: Option<Subscriber>,
    nlp: Option<NlpParse>,
}

impl Event {
    pub fn new(inner: ChannelEvent) -> Self {
        Self {
            inner,
            sender: None,
            nlp: None,
        }
    }

    /// Convenience constructor for a web widget text message.
    pub fn web_text(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(ChannelEvent::Web(WebEvent::Message(WebMessage {
            body: WebMessageBody::Text {
                data: TextData { text: text.into() },
            },
            mid: None,
            author: Some(author.into()),
        })))
    }

    /// Convenience constructor for a web widget postback.
    pub fn web_postback(
        author: impl Into<String>,
        text: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self::new(ChannelEvent::Web(WebEvent::Message(WebMessage {
            body: WebMessageBody::Postback {
                data: PayloadData {
                    text: text.into(),
                    payload: payload.into(),
                },
            },
            mid: None,
            author: Some(author.into()),
        })))
    }

    pub fn with_sender(mut self, sender: Subscriber) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_nlp(mut self, nlp: NlpParse) -> Self {
        self.nlp = Some(nlp);
        self
    }

    pub fn inner(&self) -> &ChannelEvent {
        &self.inner
    }

    pub fn channel_name(&self) -> &'static str {
        self.inner.channel_name()
    }

    pub fn event_type(&self) -> EventType {
        self.inner.widget().event_type()
    }

    pub fn message_type(&self) -> IncomingMessageType {
        self.inner.widget().message_type()
    }

    /// Channel message id; only message events carry one.
    pub fn id(&self) -> EventResult<&str> {
        match self.inner.widget() {
            WebEvent::Message(msg) => msg.mid.as_deref().ok_or(EventError::MissingField("mid")),
            _ => Err(EventError::NotAMessage("mid")),
        }
    }

    /// Foreign id of the sender on its channel.
    pub fn sender_foreign_id(&self) -> EventResult<&str> {
        match self.inner.widget() {
            WebEvent::Message(msg) => msg
                .author
                .as_deref()
                .ok_or(EventError::MissingField("author")),
            _ => Err(EventError::NotAMessage("author")),
        }
    }

    pub fn payload(&self) -> Option<Payload> {
        self.inner.widget().payload()
    }

    pub fn message(&self) -> IncomingMessage {
        self.inner.widget().message_content()
    }

    /// Text as typed, or the serialized form of an attachment.
    pub fn text(&self) -> String {
        self.message().text().to_string()
    }

    /// Coordinates of a location message.
    pub fn coordinates(&self) -> Option<Coordinates> {
        match self.message() {
            IncomingMessage::Location { coordinates } => Some(coordinates),
            _ => None,
        }
    }

    pub fn sender(&self) -> Option<&Subscriber> {
        self.sender.as_ref()
    }

    pub fn sender_mut(&mut self) -> Option<&mut Subscriber> {
        self.sender.as_mut()
    }

    pub fn set_sender(&mut self, sender: Subscriber) {
        self.sender = Some(sender);
    }

    pub fn nlp(&self) -> Option<&NlpParse> {
        self.nlp.as_ref()
    }

    pub fn set_nlp(&mut self, nlp: NlpParse) {
        self.nlp = Some(nlp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> WebEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_text_message() {
        let ev = parse(json!({
            "type": "text",
            "data": { "text": "Hello" },
            "mid": "m-1",
            "author": "u-1"
        }));
        let event = Event::new(ChannelEvent::Web(ev));

        assert_eq!(event.channel_name(), WEB_CHANNEL_NAME);
        assert_eq!(event.event_type(), EventType::Message);
        assert_eq!(event.message_type(), IncomingMessageType::Message);
        assert_eq!(event.text(), "Hello");
        assert_eq!(event.payload(), None);
        assert_eq!(event.id().unwrap(), "m-1");
        assert_eq!(event.sender_foreign_id().unwrap(), "u-1");
    }

    #[test]
    fn test_postback_payload() {
        let ev = parse(json!({
            "type": "postback",
            "data": { "text": "View more", "payload": "VIEW_MORE" },
            "author": "u-1"
        }));
        let event = Event::new(ChannelEvent::Console(ev));

        assert_eq!(event.channel_name(), CONSOLE_CHANNEL_NAME);
        assert_eq!(event.message_type(), IncomingMessageType::Postback);
        assert_eq!(event.payload(), Some(Payload::Code("VIEW_MORE".into())));
        assert_eq!(event.text(), "View more");
        assert!(event.id().is_err());
    }

    #[test]
    fn test_location_renames_lng() {
        let ev = parse(json!({
            "type": "location",
            "data": { "coordinates": { "lat": 36.8065, "lng": 10.1815 } },
            "author": "u-1"
        }));
        let event = Event::new(ChannelEvent::Web(ev));

        assert_eq!(event.message_type(), IncomingMessageType::Location);
        assert_eq!(
            event.coordinates(),
            Some(Coordinates {
                lat: 36.8065,
                lon: 10.1815
            })
        );
        assert_eq!(event.payload().and_then(|p| p.type_name()), Some("location"));
        assert_eq!(event.text(), "");
    }

    #[test]
    fn test_file_serialized_text() {
        let ev = parse(json!({
            "type": "file",
            "data": { "type": "image", "url": "https://cdn/x.png" },
            "author": "u-1"
        }));
        let event = Event::new(ChannelEvent::Web(ev));

        assert_eq!(event.message_type(), IncomingMessageType::Attachments);
        assert_eq!(event.text(), "attachment:image:https://cdn/x.png");
    }

    #[test]
    fn test_status_and_unknown() {
        let delivery = Event::new(ChannelEvent::Web(parse(json!({
            "type": "delivery",
            "mid": "m-1"
        }))));
        assert_eq!(delivery.event_type(), EventType::Delivery);
        assert_eq!(delivery.message_type(), IncomingMessageType::Unknown);
        assert!(delivery.sender_foreign_id().is_err());

        let unknown = Event::new(ChannelEvent::Web(parse(json!({ "type": "wave" }))));
        assert_eq!(unknown.event_type(), EventType::Unknown);
        assert_eq!(unknown.text(), "");
    }
}
