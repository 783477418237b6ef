//! Blocks: the nodes of a conversation flow graph.
//!
//! A block bundles what triggers it ([`Pattern`]s, channel and label
//! filters), what it captures from the user ([`CaptureVar`]), what it sends
//! back ([`BlockMessage`]) and where the flow goes next (`next_blocks`,
//! `attached_block`). Blocks are read-only while a conversation runs.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::{Button, QuickReply};

// =============================================================================
// Patterns
// =============================================================================

/// How an NLU pattern condition is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NlpMatch {
    /// The entity must be present with exactly this value.
    Value,
    /// The entity must be present, whatever its value.
    Entity,
}

/// One condition of an NLU pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NlpPattern {
    pub entity: String,
    #[serde(rename = "match")]
    pub match_type: NlpMatch,
    #[serde(default)]
    pub value: String,
}

impl NlpPattern {
    pub fn value(entity: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            match_type: NlpMatch::Value,
            value: value.into(),
        }
    }

    pub fn entity(entity: impl Into<String>) -> Self {
        let entity = entity.into();
        Self {
            value: entity.clone(),
            entity,
            match_type: NlpMatch::Entity,
        }
    }
}

/// A payload pattern (button, quick reply, menu item or content reference).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadPattern {
    /// Label shown to the user; typing it matches like the payload.
    pub label: String,
    /// Payload code. Content payloads arrive as `value:<content>`.
    pub value: String,
    /// Structured payload type (`location`, `attachments`, `menu`, `content`).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// A trigger rule attached to a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pattern {
    /// All conditions must be satisfied by the NLU parse.
    Nlp(Vec<NlpPattern>),
    Payload(PayloadPattern),
    /// Literal text, or a regex when wrapped in slashes (`/^hi+$/`).
    Text(String),
}

impl Pattern {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn payload(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Payload(PayloadPattern {
            label: label.into(),
            value: value.into(),
            kind: None,
        })
    }

    /// Returns the regex source when the pattern is a `/.../` literal.
    pub fn regex_source(&self) -> Option<&str> {
        match self {
            Self::Text(s) if s.len() >= 2 && s.starts_with('/') && s.ends_with('/') => {
                Some(&s[1..s.len() - 1])
            }
            _ => None,
        }
    }
}

// =============================================================================
// Capture rules
// =============================================================================

/// What a capture rule reads from the incoming event.
///
/// Serialized as `-1` (user input), `-2` (payload) or an entity name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawCaptureEntity", into = "RawCaptureEntity")]
pub enum CaptureEntity {
    /// Raw text for text/quick-reply messages, the payload otherwise.
    Input,
    /// The postback payload.
    Payload,
    /// The value of the named NLU entity.
    Nlp(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawCaptureEntity {
    Code(i64),
    Name(String),
}

impl From<RawCaptureEntity> for CaptureEntity {
    fn from(raw: RawCaptureEntity) -> Self {
        match raw {
            RawCaptureEntity::Code(-1) => Self::Input,
            RawCaptureEntity::Code(-2) => Self::Payload,
            RawCaptureEntity::Code(other) => Self::Nlp(other.to_string()),
            RawCaptureEntity::Name(name) => Self::Nlp(name),
        }
    }
}

impl From<CaptureEntity> for RawCaptureEntity {
    fn from(entity: CaptureEntity) -> Self {
        match entity {
            CaptureEntity::Input => Self::Code(-1),
            CaptureEntity::Payload => Self::Code(-2),
            CaptureEntity::Nlp(name) => Self::Name(name),
        }
    }
}

impl fmt::Display for CaptureEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "-1"),
            Self::Payload => write!(f, "-2"),
            Self::Nlp(name) => write!(f, "{name}"),
        }
    }
}

/// Stores a piece of the user's reply into a context variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureVar {
    pub entity: CaptureEntity,
    pub context_var: String,
}

impl CaptureVar {
    pub fn new(entity: CaptureEntity, context_var: impl Into<String>) -> Self {
        Self {
            entity,
            context_var: context_var.into(),
        }
    }
}

// =============================================================================
// Options
// =============================================================================

/// Local fallback policy: re-prompt when nothing in `next` matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FallbackOptions {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub max_attempts: u32,
    #[serde(default)]
    pub message: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentDisplay {
    List,
    Carousel,
}

/// Which content fields map to element title, subtitle, image and link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentFields {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_payload: Option<String>,
}

/// Pagination and rendering options for list/carousel blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentOptions {
    pub display: ContentDisplay,
    /// Content type the elements are drawn from.
    #[serde(default, alias = "entity")]
    pub content_type: String,
    #[serde(default)]
    pub fields: ContentFields,
    #[serde(default)]
    pub buttons: Vec<Button>,
    /// Page size.
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_element_style: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockOptions {
    /// Typing indicator delay in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typing: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentOptions>,
    /// Hand the subscriber over to this agent after sending.
    #[serde(default, rename = "assignTo", skip_serializing_if = "Option::is_none")]
    pub assign_to: Option<String>,
}

impl BlockOptions {
    /// Returns the content options when they paginate (list or carousel).
    pub fn paginated_content(&self) -> Option<&ContentOptions> {
        self.content.as_ref()
    }
}

// =============================================================================
// Message
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockAttachment {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: super::message::AttachmentTarget,
}

/// What a block sends when triggered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockMessage {
    /// One text is picked at random.
    Text(Vec<String>),
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
        attachment: BlockAttachment,
        #[serde(default, rename = "quickReplies")]
        quick_replies: Vec<QuickReply>,
    },
    /// Elements are drawn from the content store per `options.content`.
    Content { elements: bool },
    /// Delegated to a named block executor.
    Plugin {
        plugin: String,
        #[serde(default)]
        args: Value,
    },
}

impl BlockMessage {
    pub fn texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Text(texts.into_iter().map(Into::into).collect())
    }
}

// =============================================================================
// Block
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    /// Channel allow-list; empty means every channel.
    #[serde(default)]
    pub trigger_channels: Vec<String>,
    /// Subscriber labels required to trigger; empty means anyone.
    #[serde(default)]
    pub trigger_labels: Vec<String>,
    /// Labels given to the subscriber once the block is sent.
    #[serde(default)]
    pub assign_labels: Vec<String>,
    #[serde(default)]
    pub capture_vars: Vec<CaptureVar>,
    #[serde(default)]
    pub options: BlockOptions,
    pub message: BlockMessage,
    #[serde(default)]
    pub starts_conversation: bool,
    #[serde(default, rename = "nextBlocks")]
    pub next_blocks: Vec<String>,
    #[serde(default, rename = "attachedBlock")]
    pub attached_block: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub builtin: bool,
}

impl Block {
    /// Creates a block with a plain text message and no trigger rules.
    pub fn new(id: impl Into<String>, name: impl Into<String>, message: BlockMessage) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            patterns: Vec::new(),
            trigger_channels: Vec::new(),
            trigger_labels: Vec::new(),
            assign_labels: Vec::new(),
            capture_vars: Vec::new(),
            options: BlockOptions::default(),
            message,
            starts_conversation: false,
            next_blocks: Vec::new(),
            attached_block: None,
            category: None,
            builtin: false,
        }
    }

    pub fn with_patterns(mut self, patterns: impl IntoIterator<Item = Pattern>) -> Self {
        self.patterns.extend(patterns);
        self
    }

    pub fn with_next(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.next_blocks.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_capture(mut self, capture: CaptureVar) -> Self {
        self.capture_vars.push(capture);
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackOptions) -> Self {
        self.options.fallback = Some(fallback);
        self
    }

    pub fn starting(mut self) -> Self {
        self.starts_conversation = true;
        self
    }

    /// Returns `true` when the block paginates content (list or carousel).
    pub fn is_paginated(&self) -> bool {
        self.options.paginated_content().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_deserialize() {
        let block: Block = serde_json::from_value(json!({
            "id": "b1",
            "name": "greeting",
            "patterns": [
                "hello",
                "/^hi+$/",
                { "label": "Get started", "value": "GET_STARTED" },
                [{ "entity": "intent", "match": "value", "value": "greet" }]
            ],
            "capture_vars": [
                { "entity": -1, "context_var": "phone" },
                { "entity": "country_code", "context_var": "country" }
            ],
            "options": { "fallback": { "active": true, "max_attempts": 2, "message": ["Sorry?"] } },
            "message": ["Hello {context.user.first_name}!"],
            "starts_conversation": true,
            "nextBlocks": ["b2"]
        }))
        .unwrap();

        assert_eq!(block.patterns.len(), 4);
        assert!(matches!(block.patterns[0], Pattern::Text(_)));
        assert_eq!(block.patterns[1].regex_source(), Some("^hi+$"));
        assert!(matches!(block.patterns[2], Pattern::Payload(_)));
        assert!(matches!(block.patterns[3], Pattern::Nlp(_)));
        assert_eq!(block.capture_vars[0].entity, CaptureEntity::Input);
        assert_eq!(
            block.capture_vars[1].entity,
            CaptureEntity::Nlp("country_code".into())
        );
        assert_eq!(block.next_blocks, vec!["b2".to_string()]);
        assert!(block.starts_conversation);
    }

    #[test]
    fn test_capture_entity_serialize() {
        let capture = CaptureVar::new(CaptureEntity::Payload, "choice");
        let value = serde_json::to_value(&capture).unwrap();
        assert_eq!(value["entity"], json!(-2));
    }

    #[test]
    fn test_block_message_variants() {
        let buttons: BlockMessage = serde_json::from_value(json!({
            "text": "Choose",
            "buttons": [{ "type": "postback", "title": "A", "payload": "A" }]
        }))
        .unwrap();
        assert!(matches!(buttons, BlockMessage::Buttons { .. }));

        let plugin: BlockMessage =
            serde_json::from_value(json!({ "plugin": "ollama", "args": { "model": "x" } }))
                .unwrap();
        assert!(matches!(plugin, BlockMessage::Plugin { .. }));
    }
}
