//! Widget channels.
//!
//! The web widget and the admin console share one implementation; only the
//! registered name differs. Delivered messages are appended to an in-process
//! outbox from which the transport (socket, polling endpoint, terminal) picks
//! them up.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use hexabot_core::model::{Context, Envelope, SendOptions, SendResult};
use hexabot_core::{
    CONSOLE_CHANNEL_NAME, Channel, ChannelError, ChannelResult, Event, WEB_CHANNEL_NAME,
};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::format::{BOT_AUTHOR, WidgetMessage, format_envelope};

/// A delivered message and its recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Foreign id of the subscriber.
    pub recipient: String,
    /// Typing indicator shown before the message, in milliseconds.
    pub typing: Option<u64>,
    pub message: WidgetMessage,
}

/// Web widget or console channel.
pub struct WidgetChannel {
    name: &'static str,
    outbox: Mutex<VecDeque<Delivery>>,
}

impl WidgetChannel {
    fn with_name(name: &'static str) -> Self {
        Self {
            name,
            outbox: Mutex::new(VecDeque::new()),
        }
    }

    /// The public website widget.
    pub fn web() -> Self {
        Self::with_name(WEB_CHANNEL_NAME)
    }

    /// The admin console test widget.
    pub fn console() -> Self {
        Self::with_name(CONSOLE_CHANNEL_NAME)
    }

    /// Removes and returns every pending delivery, oldest first.
    pub fn drain(&self) -> Vec<Delivery> {
        self.outbox.lock().drain(..).collect()
    }

    /// Removes and returns the pending deliveries of one subscriber.
    pub fn drain_for(&self, recipient: &str) -> Vec<Delivery> {
        let mut outbox = self.outbox.lock();
        let (mine, rest): (VecDeque<_>, VecDeque<_>) =
            outbox.drain(..).partition(|d| d.recipient == recipient);
        *outbox = rest;
        mine.into()
    }

    pub fn pending(&self) -> usize {
        self.outbox.lock().len()
    }
}

impl std::fmt::Debug for WidgetChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetChannel")
            .field("name", &self.name)
            .field("pending", &self.pending())
            .finish()
    }
}

/// Foreign id of the recipient: the resolved subscriber, else the author.
fn recipient(event: &Event) -> ChannelResult<String> {
    if let Some(sender) = event.sender() {
        return Ok(sender.foreign_id.clone());
    }
    event
        .sender_foreign_id()
        .map(str::to_string)
        .map_err(|err| ChannelError::send_failed(err.to_string()))
}

fn generate_mid() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[async_trait]
impl Channel for WidgetChannel {
    fn name(&self) -> &str {
        self.name
    }

    async fn send_message(
        &self,
        event: &Event,
        envelope: &Envelope,
        options: &SendOptions,
        _context: &Context,
    ) -> ChannelResult<SendResult> {
        let (kind, data) = format_envelope(envelope)?;
        let recipient = recipient(event)?;

        let message = WidgetMessage {
            kind: kind.to_string(),
            data,
            mid: generate_mid(),
            author: BOT_AUTHOR.to_string(),
            handover: options.assign_to.is_some(),
        };
        let mid = message.mid.clone();
        trace!(channel = self.name, message = ?message, "Formatted widget message");

        self.outbox.lock().push_back(Delivery {
            recipient: recipient.clone(),
            typing: options.typing,
            message,
        });
        debug!(
            channel = self.name,
            recipient = %recipient,
            mid = %mid,
            format = envelope.format().as_str(),
            "Message queued for delivery"
        );

        Ok(SendResult { mid })
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexabot_core::model::Subscriber;
    use hexabot_core::{BoxedChannel, ChannelRegistry};

    fn subscriber() -> Subscriber {
        Subscriber::new("sub-1", "u-1", WEB_CHANNEL_NAME)
    }

    #[tokio::test]
    async fn test_send_queues_widget_message() {
        let channel = WidgetChannel::web();
        let event = Event::web_text("u-1", "hi").with_sender(subscriber());
        let options = SendOptions {
            typing: Some(500),
            assign_to: Some("agent-1".into()),
            content: None,
        };

        let result = channel
            .send_message(&event, &Envelope::text("Hello"), &options, &Context::default())
            .await
            .unwrap();

        let deliveries = channel.drain();
        assert_eq!(deliveries.len(), 1);
        let delivery = &deliveries[0];
        assert_eq!(delivery.recipient, "u-1");
        assert_eq!(delivery.typing, Some(500));
        assert_eq!(delivery.message.mid, result.mid);
        assert_eq!(delivery.message.kind, "text");
        assert_eq!(delivery.message.author, BOT_AUTHOR);
        assert!(delivery.message.handover);
        assert_eq!(channel.pending(), 0);
    }

    #[tokio::test]
    async fn test_mids_are_unique_and_drain_is_per_recipient() {
        let channel = WidgetChannel::console();
        let a = Event::web_text("u-a", "hi");
        let b = Event::web_text("u-b", "hi");
        let options = SendOptions::default();
        let context = Context::default();

        let first = channel
            .send_message(&a, &Envelope::text("one"), &options, &context)
            .await
            .unwrap();
        let second = channel
            .send_message(&b, &Envelope::text("two"), &options, &context)
            .await
            .unwrap();
        channel
            .send_message(&a, &Envelope::text("three"), &options, &context)
            .await
            .unwrap();
        assert_ne!(first.mid, second.mid);

        let for_a = channel.drain_for("u-a");
        assert_eq!(for_a.len(), 2);
        assert_eq!(for_a[1].message.data["text"], "three");
        assert_eq!(channel.pending(), 1);
    }

    #[tokio::test]
    async fn test_unrenderable_envelope_fails_without_queueing() {
        let channel = WidgetChannel::web();
        let event = Event::web_text("u-1", "hi");
        let envelope = Envelope::System {
            outcome: Some("done".into()),
            data: None,
        };

        let result = channel
            .send_message(&event, &envelope, &SendOptions::default(), &Context::default())
            .await;
        assert!(result.is_err());
        assert_eq!(channel.pending(), 0);
    }

    #[test]
    fn test_registry_downcast() {
        let registry = ChannelRegistry::new();
        registry.register(Arc::new(WidgetChannel::web()));
        registry.register(Arc::new(WidgetChannel::console()));

        let channel: BoxedChannel = registry.require(CONSOLE_CHANNEL_NAME).unwrap();
        let widget = channel.as_any().downcast::<WidgetChannel>().unwrap();
        assert_eq!(widget.name(), CONSOLE_CHANNEL_NAME);
    }
}
