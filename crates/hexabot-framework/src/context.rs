//! Per-turn context building.
//!
//! [`ContextBuilder`] folds an incoming event into a conversation's
//! [`Context`]: the sender snapshot, the last text/payload/NLU parse, the
//! user location, captured variables and pagination offsets. It then persists
//! the conversation, and the subscriber when permanent variables were
//! captured.

use std::collections::BTreeMap;
use std::sync::Arc;

use hexabot_core::model::{
    Block, CaptureEntity, Context, Conversation, IncomingMessageType, Payload, VIEW_MORE_PAYLOAD,
};
use hexabot_core::{ConversationStore, Event, SubscriberStore};
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::EngineResult;

/// Result of folding one event into a context.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextUpdate {
    pub context: Context,
    /// Captures to write back to the subscriber.
    pub permanent_vars: BTreeMap<String, Value>,
}

/// Derives and persists conversation context.
#[derive(Clone)]
pub struct ContextBuilder {
    conversations: Arc<dyn ConversationStore>,
    subscribers: Arc<dyn SubscriberStore>,
}

impl ContextBuilder {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        subscribers: Arc<dyn SubscriberStore>,
    ) -> Self {
        Self {
            conversations,
            subscribers,
        }
    }

    /// Updates `conversation.context` for `next` and persists it.
    ///
    /// With `permanent`, user-input captures (`-1`) are also merged into the
    /// subscriber's stored vars. The subscriber is written first so a failed
    /// write leaves the conversation untouched; either failure fails the turn.
    pub async fn store_context_data(
        &self,
        conversation: &mut Conversation,
        next: &Block,
        event: &Event,
        permanent: bool,
    ) -> EngineResult<()> {
        let update = build_context(&conversation.context, next, event, permanent);

        if !update.permanent_vars.is_empty() {
            if let Some(sender) = event.sender() {
                debug!(
                    sender = %sender.id,
                    vars = ?update.permanent_vars.keys().collect::<Vec<_>>(),
                    "Persisting subscriber context vars"
                );
                self.subscribers
                    .update_vars(&sender.id, update.permanent_vars)
                    .await?;
            }
        }

        conversation.context = update.context;
        *conversation = self.conversations.update(conversation).await?;
        trace!(conversation_id = %conversation.id, block = %next.name, "Stored context data");
        Ok(())
    }
}

/// Pure part of [`ContextBuilder::store_context_data`].
pub fn build_context(current: &Context, next: &Block, event: &Event, permanent: bool) -> ContextUpdate {
    let mut context = current.clone();
    let message_type = event.message_type();
    let text = event.text();
    let payload = event.payload();

    context.channel = Some(event.channel_name().to_string());
    context.text = Some(text.clone());
    context.payload = payload.clone();
    context.nlp = event.nlp().cloned();

    let mut permanent_vars = BTreeMap::new();
    for capture in &next.capture_vars {
        let value = match &capture.entity {
            CaptureEntity::Input => {
                if matches!(
                    message_type,
                    IncomingMessageType::Message | IncomingMessageType::QuickReply
                ) {
                    Some(Value::String(text.clone()))
                } else {
                    payload.as_ref().map(Payload::to_value)
                }
            }
            CaptureEntity::Payload => payload.as_ref().map(Payload::to_value),
            CaptureEntity::Nlp(entity) => event
                .nlp()
                .and_then(|nlp| nlp.find(entity))
                .map(|e| Value::String(e.value.clone())),
        };

        let Some(value) = value.map(trim_value) else {
            continue;
        };
        if permanent && capture.entity == CaptureEntity::Input {
            permanent_vars.insert(capture.context_var.clone(), value.clone());
        }
        context.vars.insert(capture.context_var.clone(), value);
    }

    if let Some(sender) = event.sender() {
        context.user.id = sender.id.clone();
        context.user.first_name = sender.first_name.clone();
        context.user.last_name = sender.last_name.clone();
        if sender.language.is_some() {
            context.user.language = sender.language.clone();
        }
    }

    if message_type == IncomingMessageType::Location {
        if let Some(coordinates) = event.coordinates() {
            context.user_location.lat = coordinates.lat;
            context.user_location.lon = coordinates.lon;
            context.user_location.address = None;
        }
    }

    if let Some(content) = next.options.paginated_content() {
        let view_more = payload.as_ref().and_then(Payload::as_code) == Some(VIEW_MORE_PAYLOAD);
        let offset = if view_more {
            context.skip_for(&next.id).saturating_add(content.limit)
        } else {
            0
        };
        context.skip.insert(next.id.clone(), offset);
    }

    ContextUpdate {
        context,
        permanent_vars,
    }
}

fn trim_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexabot_core::model::{
        BlockMessage, CaptureVar, ContentDisplay, ContentFields, ContentOptions, NlpParse,
        Subscriber,
    };
    use hexabot_core::{MemoryConversationStore, MemorySubscriberStore};
    use serde_json::json;

    fn subscriber() -> Subscriber {
        Subscriber::new("sub-1", "u-1", "web-channel").with_name("Jhon", "Doe")
    }

    #[test]
    fn test_snapshot_and_channel_data() {
        let next = Block::new("b1", "hasNextBlocks", BlockMessage::texts(["hi"]));
        let event = Event::web_text("u-1", "Hello").with_sender(subscriber());

        let update = build_context(&Context::default(), &next, &event, true);
        let ctx = update.context;
        assert_eq!(ctx.user.id, "sub-1");
        assert_eq!(ctx.user.first_name, "Jhon");
        assert_eq!(ctx.channel.as_deref(), Some("web-channel"));
        assert_eq!(ctx.text.as_deref(), Some("Hello"));
        assert_eq!(ctx.payload, None);
        assert_eq!(ctx.attempt, 0);
        assert_eq!(ctx.user_location.lat, 0.0);
        assert!(ctx.skip.is_empty());
        assert!(ctx.vars.is_empty());
    }

    #[test]
    fn test_capture_is_deterministic() {
        let next = Block::new("b1", "ask", BlockMessage::texts(["ok"]))
            .with_capture(CaptureVar::new(CaptureEntity::Input, "phone"))
            .with_capture(CaptureVar::new(CaptureEntity::Nlp("country_code".into()), "country"));
        let event = Event::web_text("u-1", " +1 514 678 9873 ")
            .with_sender(subscriber())
            .with_nlp(NlpParse::from_pairs([("country_code", "US")]));

        let first = build_context(&Context::default(), &next, &event, true);
        let second = build_context(&Context::default(), &next, &event, true);
        assert_eq!(first, second);
        assert_eq!(first.context.vars["phone"], json!("+1 514 678 9873"));
        assert_eq!(first.context.vars["country"], json!("US"));
        assert!(!first.permanent_vars.contains_key("country"));
    }

    #[test]
    fn test_payload_capture_on_postback() {
        let next = Block::new("b1", "choice", BlockMessage::texts(["ok"]))
            .with_capture(CaptureVar::new(CaptureEntity::Input, "input"))
            .with_capture(CaptureVar::new(CaptureEntity::Payload, "choice"));
        let event = Event::web_postback("u-1", "Large", "SIZE_L");

        let ctx = build_context(&Context::default(), &next, &event, false).context;
        assert_eq!(ctx.vars["input"], json!("SIZE_L"));
        assert_eq!(ctx.vars["choice"], json!("SIZE_L"));
    }

    #[tokio::test]
    async fn test_view_more_advances_skip() {
        let conversations = Arc::new(MemoryConversationStore::new());
        let subscribers = Arc::new(MemorySubscriberStore::new());
        let builder = ContextBuilder::new(conversations.clone(), subscribers);

        let mut next = Block::new("block-1", "products", BlockMessage::Content { elements: true });
        next.options.content = Some(ContentOptions {
            display: ContentDisplay::List,
            content_type: "product".into(),
            fields: ContentFields::default(),
            buttons: vec![],
            limit: 10,
            top_element_style: None,
        });

        let mut conversation = conversations.create("sub-1").await.unwrap();
        let first = Event::web_text("u-1", "products");
        builder
            .store_context_data(&mut conversation, &next, &first, true)
            .await
            .unwrap();
        assert_eq!(conversation.context.skip["block-1"], 0);

        let more = Event::web_postback("u-1", "View more", VIEW_MORE_PAYLOAD);
        builder
            .store_context_data(&mut conversation, &next, &more, true)
            .await
            .unwrap();
        assert_eq!(conversation.context.skip["block-1"], 10);

        let stored = conversations.get(&conversation.id).await.unwrap();
        assert_eq!(stored.context.skip["block-1"], 10);
    }

    #[test]
    fn test_view_more_skip_saturates() {
        let mut next = Block::new("block-1", "products", BlockMessage::Content { elements: true });
        next.options.content = Some(ContentOptions {
            display: ContentDisplay::Carousel,
            content_type: "product".into(),
            fields: ContentFields::default(),
            buttons: vec![],
            limit: u32::MAX,
            top_element_style: None,
        });
        let more = Event::web_postback("u-1", "View more", VIEW_MORE_PAYLOAD);

        let first = build_context(&Context::default(), &next, &more, false).context;
        assert_eq!(first.skip["block-1"], u32::MAX);
        let second = build_context(&first, &next, &more, false).context;
        assert_eq!(second.skip["block-1"], u32::MAX);
    }
}
