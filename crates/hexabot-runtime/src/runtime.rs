//! Runtime orchestration: raw channel payload in, engine turn out.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use hexabot_runtime::HexabotRuntime;
//!
//! let runtime = HexabotRuntime::builder()
//!     .config_file("hexabot.toml")
//!     .blocks(Arc::new(MemoryBlockStore::with_blocks(blocks)))
//!     .build()?;
//!
//! let outcome = runtime
//!     .handle_raw("web-channel", &json!({
//!         "type": "text",
//!         "data": { "text": "Hello" },
//!         "author": "visitor-42"
//!     }))
//!     .await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use hexabot_channel_web::WidgetChannel;
use hexabot_core::model::EventType;
use hexabot_core::{
    BlockStore, ChannelRegistry, ContentStore, ConversationStore, Event, MemoryBlockStore,
    MemoryContentStore, MemoryConversationStore, MemorySubscriberStore, NluService,
    SubscriberStore,
};
use hexabot_framework::{
    BotEngine, BoxedEngineService, EngineError, ExecutorRegistry, ServiceBuilderExt, TurnOutcome,
    is_skipped, message_events,
};
use serde_json::Value;
use tokio::signal;
use tower::ServiceExt;
use tower::util::BoxCloneSyncService;
use tracing::{Instrument, Level, debug, info, span, warn};

use crate::config::{ConfigLoader, HexabotConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::telemetry::{StatsSnapshot, TelemetryPump};
use crate::turn::TurnLocks;

/// Owns the engine and its collaborators, and runs turns for raw events.
pub struct HexabotRuntime {
    config: HexabotConfig,
    subscribers: Arc<dyn SubscriberStore>,
    conversations: Arc<dyn ConversationStore>,
    channels: ChannelRegistry,
    nlu: Option<Arc<dyn NluService>>,
    engine: BotEngine,
    service: BoxedEngineService,
    turns: TurnLocks,
    telemetry: Option<TelemetryPump>,
}

impl HexabotRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &HexabotConfig {
        &self.config
    }

    pub fn engine(&self) -> &BotEngine {
        &self.engine
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub fn subscribers(&self) -> &Arc<dyn SubscriberStore> {
        &self.subscribers
    }

    pub fn conversations(&self) -> &Arc<dyn ConversationStore> {
        &self.conversations
    }

    /// The registered widget channel called `name`, if any.
    pub fn widget(&self, name: &str) -> Option<Arc<WidgetChannel>> {
        self.channels
            .get(name)?
            .as_any()
            .downcast::<WidgetChannel>()
            .ok()
    }

    /// Parses a raw payload received on `channel` and runs its turn.
    ///
    /// Returns `None` for events that do not start a turn (delivery, read,
    /// typing and unknown widget events).
    pub async fn handle_raw(
        &self,
        channel: &str,
        raw: &Value,
    ) -> RuntimeResult<Option<TurnOutcome>> {
        let event = hexabot_channel_web::parse(channel, raw)?;
        self.handle_event(event).await
    }

    /// Runs the turn of an already parsed event.
    pub async fn handle_event(&self, mut event: Event) -> RuntimeResult<Option<TurnOutcome>> {
        let channel = event.channel_name();
        if event.event_type() != EventType::Message {
            debug!(
                channel = %channel,
                event_type = ?event.event_type(),
                "Ignoring non-message event"
            );
            return Ok(None);
        }

        let foreign_id = event.sender_foreign_id()?.to_string();
        let span = span!(Level::DEBUG, "event", channel = %channel, foreign_id = %foreign_id);

        async move {
            let subscriber = self.subscribers.get_or_create(channel, &foreign_id).await?;
            self.attach_nlp(&mut event).await;

            let sender_id = subscriber.id.clone();
            self.turns
                .run(&sender_id, async {
                    // A previous turn may have updated labels or vars.
                    let subscriber = self
                        .subscribers
                        .find(&sender_id)
                        .await?
                        .unwrap_or(subscriber);
                    event.set_sender(subscriber);
                    self.dispatch(event).await
                })
                .await
        }
        .instrument(span)
        .await
    }

    async fn attach_nlp(&self, event: &mut Event) {
        let Some(nlu) = self.nlu.as_ref().filter(|_| self.config.nlu.enabled) else {
            return;
        };
        let text = event.text();
        if text.trim().is_empty() {
            return;
        }

        match nlu.parse(&text).await {
            Ok(mut parse) => {
                let threshold = self.config.nlu.confidence_threshold;
                parse.entities.retain(|e| e.confidence >= threshold);
                debug!(entities = parse.entities.len(), "NLU parse attached");
                event.set_nlp(parse);
            }
            Err(err) => warn!(error = %err, "NLU parse failed, continuing without entities"),
        }
    }

    async fn dispatch(&self, event: Event) -> RuntimeResult<Option<TurnOutcome>> {
        match self.service.clone().oneshot(event).await {
            Ok(outcome) => {
                debug!(outcome = ?outcome, "Turn complete");
                Ok(Some(outcome))
            }
            Err(err) if is_skipped(&err) => Ok(None),
            Err(err) => match err.downcast::<EngineError>() {
                Ok(err) => Err(RuntimeError::Engine(*err)),
                Err(other) => Err(RuntimeError::Service(other.to_string())),
            },
        }
    }

    /// Telemetry counters so far; `None` when telemetry is disabled.
    pub fn stats(&self) -> Option<StatsSnapshot> {
        self.telemetry.as_ref().map(TelemetryPump::snapshot)
    }

    /// Stops the telemetry pump and returns the final counters.
    pub async fn shutdown(self) -> StatsSnapshot {
        let stats = match self.telemetry {
            Some(pump) => pump.shutdown().await,
            None => StatsSnapshot::default(),
        };
        info!("Hexabot runtime stopped");
        stats
    }
}

impl std::fmt::Debug for HexabotRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HexabotRuntime")
            .field("engine", &self.engine)
            .field("nlu", &self.nlu.is_some())
            .field("turns", &self.turns)
            .field("telemetry", &self.telemetry)
            .finish()
    }
}

/// Waits for Ctrl+C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(err) => warn!(error = %err, "Unable to listen for SIGTERM"),
        }
    }

    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "Unable to listen for Ctrl+C");
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`HexabotRuntime`].
///
/// Stores default to the in-memory implementations and, when no channel is
/// registered, the web and console widget channels are.
///
/// ```rust,ignore
/// let runtime = HexabotRuntime::builder()
///     .profile("production")
///     .blocks(blocks)
///     .nlu(Arc::new(MyNlu))
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<HexabotConfig>,
    init_logging: bool,
    blocks: Option<Arc<dyn BlockStore>>,
    conversations: Option<Arc<dyn ConversationStore>>,
    subscribers: Option<Arc<dyn SubscriberStore>>,
    content: Option<Arc<dyn ContentStore>>,
    channels: ChannelRegistry,
    executors: ExecutorRegistry,
    nlu: Option<Arc<dyn NluService>>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            config: None,
            init_logging: true,
            blocks: None,
            conversations: None,
            subscribers: None,
            content: None,
            channels: ChannelRegistry::new(),
            executors: ExecutorRegistry::new(),
            nlu: None,
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Uses this configuration as is; files and environment are not read.
    pub fn config(mut self, config: HexabotConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Leaves the global tracing subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    pub fn blocks(mut self, blocks: Arc<dyn BlockStore>) -> Self {
        self.blocks = Some(blocks);
        self
    }

    pub fn conversations(mut self, conversations: Arc<dyn ConversationStore>) -> Self {
        self.conversations = Some(conversations);
        self
    }

    pub fn subscribers(mut self, subscribers: Arc<dyn SubscriberStore>) -> Self {
        self.subscribers = Some(subscribers);
        self
    }

    pub fn content(mut self, content: Arc<dyn ContentStore>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn channels(mut self, channels: ChannelRegistry) -> Self {
        self.channels = channels;
        self
    }

    pub fn executors(mut self, executors: ExecutorRegistry) -> Self {
        self.executors = executors;
        self
    }

    pub fn nlu(mut self, nlu: Arc<dyn NluService>) -> Self {
        self.nlu = Some(nlu);
        self
    }

    /// Builds the runtime.
    ///
    /// The telemetry pump is spawned on the current Tokio runtime; outside of
    /// one, telemetry is disabled with a warning.
    pub fn build(self) -> RuntimeResult<HexabotRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_loader.load()?,
        };
        validate_config(&config)?;

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let blocks = self
            .blocks
            .unwrap_or_else(|| Arc::new(MemoryBlockStore::new()));
        let conversations: Arc<dyn ConversationStore> = self
            .conversations
            .unwrap_or_else(|| Arc::new(MemoryConversationStore::new()));
        let subscribers: Arc<dyn SubscriberStore> = self
            .subscribers
            .unwrap_or_else(|| Arc::new(MemorySubscriberStore::new()));
        let content = self
            .content
            .unwrap_or_else(|| Arc::new(MemoryContentStore::new()));

        if self.channels.is_empty() {
            self.channels.register(Arc::new(WidgetChannel::web()));
            self.channels.register(Arc::new(WidgetChannel::console()));
        }

        let telemetry = if !config.telemetry.enabled {
            None
        } else if tokio::runtime::Handle::try_current().is_ok() {
            Some(TelemetryPump::spawn())
        } else {
            warn!("No Tokio runtime available, telemetry disabled");
            None
        };

        let mut engine = BotEngine::builder(
            blocks,
            Arc::clone(&conversations),
            Arc::clone(&subscribers),
            self.channels.clone(),
        )
        .content(content)
        .executors(self.executors)
        .settings(config.chatbot.to_engine_settings());
        if let Some(pump) = &telemetry {
            engine = engine.telemetry(pump.sink());
        }
        let engine = engine.build();
        let service = BoxCloneSyncService::new(message_events().engine(engine.clone()));

        info!(
            channels = ?self.channels.names(),
            executors = engine.executors().len(),
            nlu = self.nlu.is_some() && config.nlu.enabled,
            telemetry = telemetry.is_some(),
            "Hexabot runtime ready"
        );

        Ok(HexabotRuntime {
            config,
            subscribers,
            conversations,
            channels: self.channels,
            nlu: self.nlu,
            engine,
            service,
            turns: TurnLocks::new(),
            telemetry,
        })
    }
}
