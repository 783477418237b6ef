//! Envelope to widget message formatting.
//!
//! The widget renders `{type, data}` messages:
//!
//! | Envelope        | Widget `type`   | `data`                                   |
//! |-----------------|-----------------|------------------------------------------|
//! | `text`          | `text`          | `{text}`                                 |
//! | `quickReplies`  | `quick_replies` | `{text, quick_replies}`                  |
//! | `buttons`       | `buttons`       | `{text, buttons}`                        |
//! | `attachment`    | `file`          | `{type, url?, attachment_id?, quick_replies?}` |
//! | `list`          | `list`          | `{elements, buttons, top_element_style?}` |
//! | `carousel`      | `carousel`      | `{elements}`                             |
//!
//! `system` envelopes are not rendered by the widget.

use hexabot_core::model::{Button, ContentFields, ContentMessage, Envelope, VIEW_MORE_PAYLOAD};
use hexabot_core::{ChannelError, ChannelResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::warn;

/// Author of every bot message.
pub const BOT_AUTHOR: &str = "chatbot";

/// Title of the pagination button appended to long lists.
pub const VIEW_MORE_TITLE: &str = "View More";

/// A message as delivered to the widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    pub mid: String,
    pub author: String,
    /// Whether the subscriber was handed over to a human agent.
    pub handover: bool,
}

/// Renders `envelope` into the widget's `{type, data}` pair.
pub fn format_envelope(envelope: &Envelope) -> ChannelResult<(&'static str, Value)> {
    let formatted = match envelope {
        Envelope::Text { text } => ("text", json!({ "text": text })),
        Envelope::QuickReplies {
            text,
            quick_replies,
        } => (
            "quick_replies",
            json!({ "text": text, "quick_replies": quick_replies }),
        ),
        Envelope::Buttons { text, buttons } => {
            ("buttons", json!({ "text": text, "buttons": buttons }))
        }
        Envelope::Attachment {
            attachment,
            quick_replies,
        } => {
            let mut data = Map::new();
            data.insert("type".into(), json!(attachment.kind));
            if let Some(url) = &attachment.payload.url {
                data.insert("url".into(), json!(url));
            }
            if let Some(id) = &attachment.payload.attachment_id {
                data.insert("attachment_id".into(), json!(id));
            }
            if !quick_replies.is_empty() {
                data.insert("quick_replies".into(), json!(quick_replies));
            }
            ("file", Value::Object(data))
        }
        Envelope::List(content) => ("list", format_list(content)?),
        Envelope::Carousel(content) => {
            let elements = format_elements(content, "carousel")?;
            ("carousel", json!({ "elements": elements }))
        }
        Envelope::System { .. } => {
            return Err(ChannelError::UnsupportedFormat(
                envelope.format().as_str().to_string(),
            ));
        }
    };
    Ok(formatted)
}

fn format_list(content: &ContentMessage) -> ChannelResult<Value> {
    let elements = format_elements(content, "list")?;
    let pagination = content.pagination;

    let mut buttons = Vec::new();
    if pagination.total > pagination.skip + pagination.limit {
        buttons.push(Button::Postback {
            title: VIEW_MORE_TITLE.to_string(),
            payload: VIEW_MORE_PAYLOAD.to_string(),
        });
    }

    let mut data = json!({ "elements": elements, "buttons": buttons });
    if let (Some(style), Some(obj)) = (&content.options.top_element_style, data.as_object_mut()) {
        obj.insert("top_element_style".into(), json!(style));
    }
    Ok(data)
}

fn format_elements(content: &ContentMessage, display: &str) -> ChannelResult<Vec<Value>> {
    if content.elements.is_empty() {
        return Err(ChannelError::send_failed(format!(
            "insufficient content count for {display}"
        )));
    }
    let fields = &content.options.fields;
    if fields.title.is_empty() {
        return Err(ChannelError::send_failed(
            "content options are missing the title field",
        ));
    }

    Ok(content
        .elements
        .iter()
        .map(|item| format_element(item, fields, &content.options.buttons))
        .collect())
}

fn format_element(item: &Value, fields: &ContentFields, buttons: &[Button]) -> Value {
    let mut element = Map::new();
    element.insert(
        "title".into(),
        item.get(&fields.title).cloned().unwrap_or(Value::Null),
    );

    if let Some(subtitle) = fields.subtitle.as_ref().and_then(|f| item.get(f)) {
        element.insert("subtitle".into(), subtitle.clone());
    }

    if let Some(image) = fields.image_url.as_ref().and_then(|f| item.get(f)) {
        match image.pointer("/payload/url").or(Some(image).filter(|v| v.is_string())) {
            Some(url) => {
                element.insert("image_url".into(), url.clone());
            }
            None => warn!(item = %item, "Content image has no URL"),
        }
    }

    let mut rendered = Vec::with_capacity(buttons.len());
    for (index, button) in buttons.iter().enumerate() {
        let mut button = button.clone();
        match &mut button {
            Button::WebUrl { url, .. } => {
                let link = fields
                    .url
                    .as_ref()
                    .and_then(|f| item.get(f))
                    .or_else(|| item.get("url"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                *url = if link.starts_with("http") {
                    link.to_string()
                } else {
                    format!("https://{link}")
                };
                if !element.contains_key("default_action") {
                    element.insert("default_action".into(), default_action(&button));
                }
            }
            Button::Postback { title, payload } => {
                let value = fields
                    .action_payload
                    .as_ref()
                    .and_then(|f| item.get(f))
                    .or_else(|| item.get("title"))
                    .map(value_to_string)
                    .unwrap_or_default();
                *payload = format!("{title}:{value}");
            }
        }

        if index == 0
            && let Some(title) = fields
                .action_title
                .as_ref()
                .and_then(|f| item.get(f))
                .and_then(Value::as_str)
        {
            *button.title_mut() = title.to_string();
        }
        rendered.push(button);
    }

    if !rendered.is_empty() {
        element.insert("buttons".into(), json!(rendered));
    }
    Value::Object(element)
}

/// A web_url button without its title.
fn default_action(button: &Button) -> Value {
    let mut action = json!(button);
    if let Some(obj) = action.as_object_mut() {
        obj.remove("title");
    }
    action
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
