//! The conversation engine.
//!
//! [`BotEngine`] drives one turn of a subscriber's conversation:
//!
//! ```text
//! handle_message_event
//!   ├─ process_conversation_message ── active conversation?
//!   │     └─ handle_ongoing_conversation_message
//!   │           ├─ match in `next`            → proceed_to_next_block
//!   │           ├─ local fallback allowed     → proceed_to_next_block(current, fallback)
//!   │           └─ otherwise                  → end conversation
//!   ├─ match a starting block                 → start_conversation
//!   └─ global fallback                        → fallback block or one-off message
//! ```
//!
//! Every outgoing message goes through [`BotEngine::trigger_block`], which
//! sends the block, follows attached blocks and moves the conversation
//! pointer to the block's `next_blocks`.
//!
//! # Error policy
//!
//! Failures while loading or matching the next candidates end the
//! conversation and are returned to the caller. Failures while advancing
//! ([`proceed_to_next_block`](BotEngine::proceed_to_next_block)) end the
//! conversation and are reported as `false`.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use hexabot_core::model::{Block, BlockMessage, Context, Conversation, SendOptions, SendResult};
use hexabot_core::{
    BlockStore, BoxedTelemetry, ChannelRegistry, ContentStore, ConversationStore, Event,
    MemoryContentStore, NoopTelemetry, StatsKind, SubscriberStore, TelemetryEvent,
};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, Level, debug, error, info, span, warn};

use crate::context::ContextBuilder;
use crate::error::{EngineError, EngineResult};
use crate::executor::ExecutorRegistry;
use crate::matcher::{BlockMatch, PatternMatcher, detect_language};
use crate::message::BlockMessageProcessor;

/// Id of the synthetic block used for the global fallback message.
pub const GLOBAL_FALLBACK_BLOCK_ID: &str = "global-fallback";

/// Chatbot settings consumed by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Answer unmatched messages outside of a conversation.
    pub global_fallback: bool,
    /// Block starting a conversation on global fallback.
    pub fallback_block: Option<String>,
    /// Texts sent when no fallback block is configured; one is picked.
    pub fallback_message: Vec<String>,
    /// Values for `{contact.X}` tokens.
    pub contact: BTreeMap<String, String>,
    /// Languages accepted from NLU language detection.
    pub languages: Vec<String>,
}

/// What a turn resulted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// An active conversation consumed the message.
    Conversation,
    /// A starting block matched and a conversation was started.
    Started { block: String },
    /// The global fallback block started a conversation.
    FallbackBlock { block: String },
    /// The global fallback message was sent.
    FallbackMessage,
    /// Nothing answered the message.
    Unhandled,
}

impl TurnOutcome {
    pub fn is_handled(&self) -> bool {
        !matches!(self, Self::Unhandled)
    }
}

struct EngineInner {
    blocks: Arc<dyn BlockStore>,
    conversations: Arc<dyn ConversationStore>,
    subscribers: Arc<dyn SubscriberStore>,
    channels: ChannelRegistry,
    matcher: PatternMatcher,
    contexts: ContextBuilder,
    messages: BlockMessageProcessor,
    telemetry: BoxedTelemetry,
    settings: EngineSettings,
}

/// The bot engine. Cloning is cheap.
#[derive(Clone)]
pub struct BotEngine {
    inner: Arc<EngineInner>,
}

/// Builder for [`BotEngine`].
pub struct BotEngineBuilder {
    blocks: Arc<dyn BlockStore>,
    conversations: Arc<dyn ConversationStore>,
    subscribers: Arc<dyn SubscriberStore>,
    channels: ChannelRegistry,
    content: Option<Arc<dyn ContentStore>>,
    executors: ExecutorRegistry,
    telemetry: Option<BoxedTelemetry>,
    settings: EngineSettings,
}

impl BotEngineBuilder {
    pub fn content(mut self, content: Arc<dyn ContentStore>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn executors(mut self, executors: ExecutorRegistry) -> Self {
        self.executors = executors;
        self
    }

    pub fn telemetry(mut self, telemetry: BoxedTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> BotEngine {
        let content = self
            .content
            .unwrap_or_else(|| Arc::new(MemoryContentStore::new()));
        let messages = BlockMessageProcessor::new(content, self.executors)
            .with_contact(self.settings.contact.clone());
        let contexts = ContextBuilder::new(
            Arc::clone(&self.conversations),
            Arc::clone(&self.subscribers),
        );

        BotEngine {
            inner: Arc::new(EngineInner {
                blocks: self.blocks,
                conversations: self.conversations,
                subscribers: self.subscribers,
                channels: self.channels,
                matcher: PatternMatcher::new(),
                contexts,
                messages,
                telemetry: self.telemetry.unwrap_or_else(|| Arc::new(NoopTelemetry)),
                settings: self.settings,
            }),
        }
    }
}

impl BotEngine {
    pub fn builder(
        blocks: Arc<dyn BlockStore>,
        conversations: Arc<dyn ConversationStore>,
        subscribers: Arc<dyn SubscriberStore>,
        channels: ChannelRegistry,
    ) -> BotEngineBuilder {
        BotEngineBuilder {
            blocks,
            conversations,
            subscribers,
            channels,
            content: None,
            executors: ExecutorRegistry::new(),
            telemetry: None,
            settings: EngineSettings::default(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.inner.channels
    }

    pub fn executors(&self) -> &ExecutorRegistry {
        self.inner.messages.executors()
    }

    fn emit(&self, event: TelemetryEvent) {
        self.inner.telemetry.emit(event);
    }

    // ─── Entry point ────────────────────────────────────────────────────

    /// Processes an incoming message event from any channel.
    ///
    /// The event must carry its resolved sender.
    pub async fn handle_message_event(&self, mut event: Event) -> EngineResult<TurnOutcome> {
        let sender = event
            .sender()
            .map(|s| s.id.clone())
            .ok_or(EngineError::MissingSender)?;
        let span = span!(
            Level::DEBUG,
            "turn",
            channel = %event.channel_name(),
            sender = %sender
        );

        async move {
            detect_language(&mut event, &self.inner.settings.languages);

            if self.process_conversation_message(&event).await? {
                return Ok(TurnOutcome::Conversation);
            }

            let starting = self.inner.blocks.find_starting().await?;
            if let Some(found) = self.inner.matcher.match_block(&event, &starting) {
                self.start_conversation(&event, &found.block).await?;
                return Ok(TurnOutcome::Started {
                    block: found.block.name,
                });
            }
            debug!("No starting block matched");

            self.handle_global_fallback(&event).await
        }
        .instrument(span)
        .await
    }

    async fn handle_global_fallback(&self, event: &Event) -> EngineResult<TurnOutcome> {
        let settings = &self.inner.settings;
        if !settings.global_fallback {
            return Ok(TurnOutcome::Unhandled);
        }

        let sender = event.sender().ok_or(EngineError::MissingSender)?;
        self.emit(TelemetryEvent::GlobalFallback {
            sender: sender.id.clone(),
        });

        if let Some(id) = &settings.fallback_block {
            match self.inner.blocks.find(id).await? {
                Some(block) => {
                    self.start_conversation(event, &block).await?;
                    return Ok(TurnOutcome::FallbackBlock { block: block.name });
                }
                None => warn!(block_id = %id, "Global fallback block not found, sending fallback message"),
            }
        }

        if settings.fallback_message.is_empty() {
            warn!("Global fallback enabled without a fallback message");
            return Ok(TurnOutcome::Unhandled);
        }

        let mut block = Block::new(
            GLOBAL_FALLBACK_BLOCK_ID,
            "Global Fallback",
            BlockMessage::Text(settings.fallback_message.clone()),
        );
        block.builtin = true;
        self.send_message_to_subscriber(event, &block, &Context::default(), false, None)
            .await?;
        Ok(TurnOutcome::FallbackMessage)
    }

    // ─── Conversation lifecycle ─────────────────────────────────────────

    /// Starts a conversation for the event's sender at `block`.
    ///
    /// Fails with a store conflict when the sender already has an active
    /// conversation. Failures after creation end the new conversation.
    pub async fn start_conversation(&self, event: &Event, block: &Block) -> EngineResult<()> {
        let sender = event.sender().ok_or(EngineError::MissingSender)?;

        self.emit(TelemetryEvent::stats(StatsKind::Popular, &block.name));
        let mut conversation = self.inner.conversations.create(&sender.id).await?;
        self.emit(TelemetryEvent::stats_default(StatsKind::NewConversations));

        let result = async {
            self.inner
                .contexts
                .store_context_data(&mut conversation, block, event, true)
                .await?;
            info!(
                conversation_id = %conversation.id,
                sender = %sender.id,
                block = %block.name,
                "Started conversation"
            );
            self.trigger_block(event, &mut conversation, block, false).await
        }
        .await;

        if let Err(err) = &result {
            error!(conversation_id = %conversation.id, error = %err, "Unable to start conversation");
            self.end_conversation(&mut conversation, Some(err.to_string()))
                .await;
        }
        result
    }

    /// Routes the event to the sender's active conversation, if any.
    ///
    /// Returns `false` when there is no active conversation or when it ended
    /// without consuming the message.
    pub async fn process_conversation_message(&self, event: &Event) -> EngineResult<bool> {
        let sender = event.sender().ok_or(EngineError::MissingSender)?;
        let Some(conversation) = self
            .inner
            .conversations
            .find_active_by_sender(&sender.id)
            .await?
        else {
            debug!(sender = %sender.id, "No active conversation");
            return Ok(false);
        };

        let handled = self
            .handle_ongoing_conversation_message(conversation, event)
            .await?;
        if handled {
            self.emit(TelemetryEvent::stats_default(StatsKind::ExistingConversations));
        }
        Ok(handled)
    }

    /// One step of an ongoing conversation.
    pub async fn handle_ongoing_conversation_message(
        &self,
        mut conversation: Conversation,
        event: &Event,
    ) -> EngineResult<bool> {
        let matched = match self.find_next_matching_block(&conversation, event).await {
            Ok(matched) => matched,
            Err(err) => {
                error!(
                    conversation_id = %conversation.id,
                    error = %err,
                    "Unable to load the next blocks"
                );
                self.end_conversation(&mut conversation, Some(err.to_string()))
                    .await;
                return Err(err);
            }
        };

        let (next, fallback) = match matched {
            Some(found) => (found.block, false),
            None => {
                let fallback_block = Self::should_attempt_local_fallback(&conversation, event)
                    .then(|| local_fallback_block(&conversation))
                    .flatten();
                match fallback_block {
                    Some(block) => (block, true),
                    None => {
                        debug!(conversation_id = %conversation.id, "No matching block found to call next");
                        self.end_conversation(&mut conversation, None).await;
                        return Ok(false);
                    }
                }
            }
        };

        debug!(
            conversation_id = %conversation.id,
            block = %next.name,
            fallback,
            "Responding"
        );
        Ok(self
            .proceed_to_next_block(conversation, &next, event, fallback)
            .await)
    }

    /// Whether the current block may re-prompt instead of ending the
    /// conversation.
    ///
    /// `attempt` counts fallbacks already sent; a block allows fallbacks while
    /// `attempt <= max_attempts`.
    pub fn should_attempt_local_fallback(conversation: &Conversation, _event: &Event) -> bool {
        conversation
            .current
            .as_ref()
            .and_then(|block| block.options.fallback.as_ref())
            .is_some_and(|fallback| {
                fallback.active && conversation.context.attempt <= fallback.max_attempts
            })
    }

    /// Stores the context for `next`, updates the attempt counter and
    /// triggers the block.
    ///
    /// Failures end the conversation and yield `false`.
    pub async fn proceed_to_next_block(
        &self,
        mut conversation: Conversation,
        next: &Block,
        event: &Event,
        fallback: bool,
    ) -> bool {
        let result: EngineResult<()> = async {
            conversation.context.attempt = if fallback {
                conversation.context.attempt + 1
            } else {
                0
            };
            // Fallbacks do not capture, so earlier captures are not overwritten.
            self.inner
                .contexts
                .store_context_data(&mut conversation, next, event, !fallback)
                .await?;
            self.emit(TelemetryEvent::stats(StatsKind::Popular, &next.name));
            self.trigger_block(event, &mut conversation, next, fallback)
                .await
        }
        .await;

        match result {
            Ok(()) => true,
            Err(err) => {
                error!(
                    conversation_id = %conversation.id,
                    block = %next.name,
                    error = %err,
                    "Unable to proceed to the next block"
                );
                self.end_conversation(&mut conversation, Some(err.to_string()))
                    .await;
                false
            }
        }
    }

    /// Sends `block`, follows attached blocks, then moves the conversation to
    /// the block's `next_blocks` or ends it.
    pub async fn trigger_block(
        &self,
        event: &Event,
        conversation: &mut Conversation,
        block: &Block,
        fallback: bool,
    ) -> EngineResult<()> {
        let mut visited = HashSet::new();
        let mut block = block.clone();

        loop {
            if !visited.insert(block.id.clone()) {
                let err = EngineError::AttachedCycle(block.id.clone());
                warn!(conversation_id = %conversation.id, error = %err, "Stopping attached block chain");
                self.end_conversation(conversation, Some(err.to_string()))
                    .await;
                return Ok(());
            }

            let conversation_id = conversation.id.clone();
            self.send_message_to_subscriber(
                event,
                &block,
                &conversation.context,
                fallback,
                Some(&conversation_id),
            )
            .await?;

            if let Some(attached) = block.attached_block.clone() {
                match self.inner.blocks.find(&attached).await {
                    Ok(Some(next)) => {
                        block = next;
                        continue;
                    }
                    Ok(None) => {
                        error!(block_id = %attached, "Attached block not found");
                        self.end_conversation(
                            conversation,
                            Some(format!("attached block '{attached}' not found")),
                        )
                        .await;
                    }
                    Err(err) => {
                        error!(block_id = %attached, error = %err, "Unable to retrieve attached block");
                        self.end_conversation(conversation, Some(err.to_string()))
                            .await;
                    }
                }
                return Ok(());
            }

            if block.next_blocks.is_empty() {
                debug!(conversation_id = %conversation.id, "No attached/next blocks to execute");
                self.end_conversation(conversation, None).await;
                return Ok(());
            }

            let next = self.inner.blocks.find_many(&block.next_blocks).await?;
            debug!(
                conversation_id = %conversation.id,
                next = next.len(),
                "Conversation continues"
            );
            conversation.current = Some(block);
            conversation.next = next;
            *conversation = self.inner.conversations.update(conversation).await?;
            return Ok(());
        }
    }

    /// Renders `block`, sends it through the event's channel and applies the
    /// block's labels and handover to the sender.
    pub async fn send_message_to_subscriber(
        &self,
        event: &Event,
        block: &Block,
        context: &Context,
        fallback: bool,
        conversation_id: Option<&str>,
    ) -> EngineResult<SendResult> {
        let recipient = event.sender().ok_or(EngineError::MissingSender)?;
        debug!(sender = %recipient.foreign_id, block = %block.name, "Sending message");

        let envelope = self
            .inner
            .messages
            .process(
                block,
                context,
                &recipient.context.vars,
                fallback,
                conversation_id,
            )
            .await?;

        let channel = self.inner.channels.require(event.channel_name())?;
        let options = SendOptions {
            typing: block.options.typing,
            assign_to: block.options.assign_to.clone(),
            content: block.options.content.clone(),
        };
        let response = channel
            .send_message(event, &envelope, &options, context)
            .await?;

        self.emit(TelemetryEvent::stats_default(StatsKind::Outgoing));
        self.emit(TelemetryEvent::stats_default(StatsKind::AllMessages));
        self.emit(TelemetryEvent::MessageSent {
            mid: response.mid.clone(),
            recipient: recipient.id.clone(),
            handover: options.assign_to.clone(),
        });
        self.emit(TelemetryEvent::BlockTriggered {
            block: block.name.clone(),
            fallback,
        });

        self.inner
            .subscribers
            .apply_updates(
                &recipient.id,
                &block.assign_labels,
                block.options.assign_to.as_deref(),
            )
            .await?;
        debug!(labels = ?block.assign_labels, "Applied subscriber updates");

        Ok(response)
    }

    /// Reloads the conversation's next candidates and matches the event.
    pub async fn find_next_matching_block(
        &self,
        conversation: &Conversation,
        event: &Event,
    ) -> EngineResult<Option<BlockMatch>> {
        let candidates = self
            .inner
            .blocks
            .find_many(&conversation.next_ids())
            .await?;
        Ok(self.inner.matcher.match_block(event, &candidates))
    }

    /// Emits `conversation:end` and deactivates the conversation.
    async fn end_conversation(&self, conversation: &mut Conversation, error: Option<String>) {
        conversation.active = false;
        self.emit(TelemetryEvent::ConversationEnd {
            conversation: conversation.clone(),
            error,
        });
        if let Err(err) = self.inner.conversations.end(&conversation.id).await {
            warn!(conversation_id = %conversation.id, error = %err, "Unable to end conversation");
        }
    }
}

impl std::fmt::Debug for BotEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotEngine")
            .field("channels", &self.inner.channels.names())
            .field("executors", self.inner.messages.executors())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

/// The current block re-sent as a fallback: same message, the conversation's
/// pending candidates as next blocks and no side effects.
fn local_fallback_block(conversation: &Conversation) -> Option<Block> {
    let mut block = conversation.current.clone()?;
    block.next_blocks = conversation.next_ids();
    block.assign_labels.clear();
    block.trigger_labels.clear();
    block.capture_vars.clear();
    block.attached_block = None;
    block.category = None;
    Some(block)
}
