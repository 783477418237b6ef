//! Turning blocks into outgoing envelopes.
//!
//! [`BlockMessageProcessor`] renders a block's message (or its local fallback
//! message) into an [`Envelope`], replacing `{...}` tokens with context data:
//!
//! | Token | Source |
//! |-------|--------|
//! | `{context.vars.X}` | conversation vars over subscriber vars |
//! | `{context.user.X}` | sender snapshot |
//! | `{context.user_location.lat}` / `lon` / `address.X` | last location |
//! | `{contact.X}` | contact settings |

use std::collections::BTreeMap;
use std::sync::Arc;

use hexabot_core::ContentStore;
use hexabot_core::model::{
    Block, BlockMessage, ContentDisplay, ContentMessage, Context, Envelope, OutgoingAttachment,
};
use rand::seq::SliceRandom;
use serde_json::Value;
use tracing::{error, trace};

use crate::error::{MessageError, MessageResult};
use crate::executor::ExecutorRegistry;

/// Renders block messages.
#[derive(Clone)]
pub struct BlockMessageProcessor {
    content: Arc<dyn ContentStore>,
    executors: ExecutorRegistry,
    contact: BTreeMap<String, String>,
}

impl BlockMessageProcessor {
    pub fn new(content: Arc<dyn ContentStore>, executors: ExecutorRegistry) -> Self {
        Self {
            content,
            executors,
            contact: BTreeMap::new(),
        }
    }

    /// Sets the values available to `{contact.X}` tokens.
    pub fn with_contact(mut self, contact: BTreeMap<String, String>) -> Self {
        self.contact = contact;
        self
    }

    pub fn executors(&self) -> &ExecutorRegistry {
        &self.executors
    }

    /// Builds the envelope for `block`.
    ///
    /// With `fallback`, the block's local fallback messages are used instead
    /// of its message when it has fallback options.
    pub async fn process(
        &self,
        block: &Block,
        context: &Context,
        subscriber_vars: &BTreeMap<String, Value>,
        fallback: bool,
        conversation_id: Option<&str>,
    ) -> MessageResult<Envelope> {
        let render = |text: &str| replace_tokens(text, context, subscriber_vars, &self.contact);

        if fallback {
            if let Some(options) = &block.options.fallback {
                let text = pick_random(&options.message)
                    .ok_or_else(|| MessageError::InvalidFormat(block.id.clone()))?;
                return Ok(Envelope::text(render(text)));
            }
        }

        match &block.message {
            BlockMessage::Text(texts) => {
                let text = pick_random(texts)
                    .ok_or_else(|| MessageError::InvalidFormat(block.id.clone()))?;
                Ok(Envelope::text(render(text)))
            }
            BlockMessage::QuickReplies {
                text,
                quick_replies,
            } => {
                if quick_replies.is_empty() {
                    return Ok(Envelope::text(render(text)));
                }
                let quick_replies = quick_replies
                    .iter()
                    .cloned()
                    .map(|mut qr| {
                        if let Some(title) = qr.title.as_mut() {
                            *title = render(title);
                        }
                        qr
                    })
                    .collect();
                Ok(Envelope::QuickReplies {
                    text: render(text),
                    quick_replies,
                })
            }
            BlockMessage::Buttons { text, buttons } => {
                if buttons.is_empty() {
                    return Ok(Envelope::text(render(text)));
                }
                let buttons = buttons
                    .iter()
                    .cloned()
                    .map(|mut btn| {
                        let title = render(btn.title());
                        *btn.title_mut() = title;
                        btn
                    })
                    .collect();
                Ok(Envelope::Buttons {
                    text: render(text),
                    buttons,
                })
            }
            BlockMessage::Attachment {
                attachment,
                quick_replies,
            } => {
                if attachment.payload.attachment_id.is_none() {
                    if attachment.payload.url.is_some() {
                        error!(
                            block = %block.id,
                            "Attachment `url` payload is deprecated in favor of `attachment_id`"
                        );
                    }
                    return Err(MessageError::RemoteAttachment);
                }
                Ok(Envelope::Attachment {
                    attachment: OutgoingAttachment {
                        kind: attachment.kind.clone(),
                        payload: attachment.payload.clone(),
                    },
                    quick_replies: quick_replies.clone(),
                })
            }
            BlockMessage::Content { .. } => {
                let options = block
                    .options
                    .content
                    .as_ref()
                    .ok_or_else(|| MessageError::MissingContentOptions(block.id.clone()))?;
                let skip = context.skip_for(&block.id);
                let page = self.content.get_content(options, skip).await?;
                trace!(
                    block = %block.id,
                    skip,
                    total = page.pagination.total,
                    "Fetched content page"
                );

                let message = ContentMessage {
                    elements: page.elements,
                    pagination: page.pagination,
                    options: options.clone(),
                };
                Ok(match options.display {
                    ContentDisplay::List => Envelope::List(message),
                    ContentDisplay::Carousel => Envelope::Carousel(message),
                })
            }
            BlockMessage::Plugin { plugin, .. } => {
                let executor = self
                    .executors
                    .get(plugin)
                    .ok_or_else(|| MessageError::UnknownExecutor(plugin.clone()))?;
                executor.process(block, context, conversation_id).await
            }
        }
    }
}

fn pick_random(items: &[String]) -> Option<&String> {
    items.choose(&mut rand::thread_rng())
}

/// Replaces context and contact tokens in `text`.
pub fn replace_tokens(
    text: &str,
    context: &Context,
    subscriber_vars: &BTreeMap<String, Value>,
    contact: &BTreeMap<String, String>,
) -> String {
    if !text.contains('{') {
        return text.to_string();
    }

    let mut out = text.to_string();

    let mut vars = subscriber_vars.clone();
    vars.extend(context.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
    for (key, value) in &vars {
        let rendered = match value {
            // Payload-style values (`CODE:label`) render their second segment.
            Value::String(s) if s.contains(':') => s.split(':').nth(1).unwrap_or_default().to_string(),
            other => token_value(other),
        };
        out = out.replace(&format!("{{context.vars.{key}}}"), &rendered);
    }

    let location = &context.user_location;
    if let Some(address) = &location.address {
        for (key, value) in address {
            out = out.replace(
                &format!("{{context.user_location.address.{key}}}"),
                &token_value(value),
            );
        }
    }
    out = out.replace("{context.user_location.lat}", &location.lat.to_string());
    out = out.replace("{context.user_location.lon}", &location.lon.to_string());

    if let Ok(Value::Object(user)) = serde_json::to_value(&context.user) {
        for (key, value) in &user {
            out = out.replace(&format!("{{context.user.{key}}}"), &token_value(value));
        }
    }

    for (key, value) in contact {
        out = out.replace(&format!("{{contact.{key}}}"), value);
    }

    out
}

fn token_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexabot_core::model::{
        AttachmentTarget, BlockAttachment, Button, ContentFields, ContentOptions, FallbackOptions,
        QuickReply, UserLocation,
    };
    use hexabot_core::MemoryContentStore;
    use serde_json::json;

    fn processor() -> BlockMessageProcessor {
        BlockMessageProcessor::new(Arc::new(MemoryContentStore::new()), ExecutorRegistry::new())
    }

    fn context() -> Context {
        let mut ctx = Context::default();
        ctx.user.first_name = "Jhon".into();
        ctx.vars.insert("phone".into(), json!("+1 514 678 9873"));
        ctx
    }

    #[test]
    fn test_replace_tokens() {
        let mut subscriber_vars = BTreeMap::new();
        subscriber_vars.insert("phone".into(), json!("old"));
        subscriber_vars.insert("age".into(), json!(30));
        subscriber_vars.insert("size".into(), json!("SIZE:Large"));
        let mut contact = BTreeMap::new();
        contact.insert("company_name".into(), "Hexastack".into());

        let mut ctx = context();
        ctx.user_location = UserLocation {
            lat: 36.8,
            lon: 10.2,
            address: None,
        };

        let text = replace_tokens(
            "Hi {context.user.first_name}, {context.vars.phone} / {context.vars.age} / \
             {context.vars.size} @ {context.user_location.lat},{context.user_location.lon} \
             from {contact.company_name}",
            &ctx,
            &subscriber_vars,
            &contact,
        );
        assert_eq!(
            text,
            "Hi Jhon, +1 514 678 9873 / 30 / Large @ 36.8,10.2 from Hexastack"
        );
    }

    #[test]
    fn test_unknown_tokens_are_kept() {
        let text = replace_tokens(
            "Hello {context.vars.missing}",
            &Context::default(),
            &BTreeMap::new(),
            &BTreeMap::new(),
        );
        assert_eq!(text, "Hello {context.vars.missing}");
    }

    #[tokio::test]
    async fn test_fallback_message_is_used() {
        let block = Block::new("b0", "ask", BlockMessage::texts(["What is your phone?"]))
            .with_fallback(FallbackOptions {
                active: true,
                max_attempts: 2,
                message: vec!["Sorry {context.user.first_name}?".into()],
            });

        let envelope = processor()
            .process(&block, &context(), &BTreeMap::new(), true, None)
            .await
            .unwrap();
        assert_eq!(envelope, Envelope::text("Sorry Jhon?"));

        let regular = processor()
            .process(&block, &context(), &BTreeMap::new(), false, None)
            .await
            .unwrap();
        assert_eq!(regular.text_content(), Some("What is your phone?"));
    }

    #[tokio::test]
    async fn test_quick_replies_and_buttons_titles() {
        let qr_block = Block::new(
            "qr",
            "qr",
            BlockMessage::QuickReplies {
                text: "Pick {context.user.first_name}".into(),
                quick_replies: vec![QuickReply::text("Call {context.vars.phone}", "CALL")],
            },
        );
        let envelope = processor()
            .process(&qr_block, &context(), &BTreeMap::new(), false, None)
            .await
            .unwrap();
        let Envelope::QuickReplies {
            text,
            quick_replies,
        } = envelope
        else {
            panic!("expected quick replies");
        };
        assert_eq!(text, "Pick Jhon");
        assert_eq!(quick_replies[0].title.as_deref(), Some("Call +1 514 678 9873"));

        let btn_block = Block::new(
            "btn",
            "btn",
            BlockMessage::Buttons {
                text: "Go".into(),
                buttons: vec![Button::Postback {
                    title: "{context.user.first_name}".into(),
                    payload: "ME".into(),
                }],
            },
        );
        let envelope = processor()
            .process(&btn_block, &context(), &BTreeMap::new(), false, None)
            .await
            .unwrap();
        let Envelope::Buttons { buttons, .. } = envelope else {
            panic!("expected buttons");
        };
        assert_eq!(buttons[0].title(), "Jhon");
    }

    #[tokio::test]
    async fn test_empty_quick_replies_render_as_text() {
        let block = Block::new(
            "qr",
            "qr",
            BlockMessage::QuickReplies {
                text: "Plain".into(),
                quick_replies: vec![],
            },
        );
        let envelope = processor()
            .process(&block, &Context::default(), &BTreeMap::new(), false, None)
            .await
            .unwrap();
        assert_eq!(envelope, Envelope::text("Plain"));
    }

    #[tokio::test]
    async fn test_remote_attachment_rejected() {
        let block = Block::new(
            "att",
            "att",
            BlockMessage::Attachment {
                attachment: BlockAttachment {
                    kind: "image".into(),
                    payload: AttachmentTarget {
                        attachment_id: None,
                        url: Some("https://cdn/x.png".into()),
                    },
                },
                quick_replies: vec![],
            },
        );
        let err = processor()
            .process(&block, &Context::default(), &BTreeMap::new(), false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MessageError::RemoteAttachment));
        assert_eq!(err.to_string(), "Remote attachments are no longer supported");
    }

    #[tokio::test]
    async fn test_content_page_uses_skip() {
        let store = MemoryContentStore::new();
        for i in 0..3 {
            store.insert("product", json!({ "title": format!("P{i}") })).await;
        }
        let processor = BlockMessageProcessor::new(Arc::new(store), ExecutorRegistry::new());

        let mut block = Block::new("block-1", "products", BlockMessage::Content { elements: true });
        block.options.content = Some(ContentOptions {
            display: ContentDisplay::Carousel,
            content_type: "product".into(),
            fields: ContentFields::default(),
            buttons: vec![],
            limit: 2,
            top_element_style: None,
        });
        let mut ctx = Context::default();
        ctx.skip.insert("block-1".into(), 2);

        let envelope = processor
            .process(&block, &ctx, &BTreeMap::new(), false, None)
            .await
            .unwrap();
        let Envelope::Carousel(message) = envelope else {
            panic!("expected carousel");
        };
        assert_eq!(message.elements, vec![json!({ "title": "P2" })]);
        assert_eq!(message.pagination.skip, 2);
    }

    #[tokio::test]
    async fn test_unknown_plugin() {
        let block = Block::new(
            "p",
            "p",
            BlockMessage::Plugin {
                plugin: "ollama".into(),
                args: json!({}),
            },
        );
        let err = processor()
            .process(&block, &Context::default(), &BTreeMap::new(), false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MessageError::UnknownExecutor(name) if name == "ollama"));
    }
}
