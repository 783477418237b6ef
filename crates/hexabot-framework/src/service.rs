//! Tower adapter for the engine.
//!
//! [`EngineService`] exposes [`BotEngine::handle_message_event`] as a
//! `tower::Service<Event>`. Event filtering is an ordinary tower filter layer
//! stacked on top:
//!
//! ```text
//! message_events()         ← ServiceBuilder<Stack<FilterLayer, Identity>>
//!     .engine(engine)      ← Filter<EngineService>
//! ```
//!
//! A rejected event surfaces as [`EventSkipped`], which callers ignore.
//!
//! # Example
//!
//! ```rust,ignore
//! use tower::ServiceExt;
//!
//! let mut svc = message_events().engine(engine);
//! let outcome = svc.ready().await?.call(event).await?;
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use hexabot_core::Event;
use hexabot_core::model::EventType;
use tower::filter::{FilterLayer, Predicate};
use tower::layer::util::{Identity, Stack};
use tower::util::BoxCloneSyncService;
use tower::{BoxError, Layer, Service, ServiceBuilder};

use crate::engine::{BotEngine, TurnOutcome};
use crate::error::EventSkipped;

/// A type-erased engine pipeline.
pub type BoxedEngineService = BoxCloneSyncService<Event, TurnOutcome, BoxError>;

// ============================================================================
// EventPredicate
// ============================================================================

/// A cloneable synchronous event filter.
///
/// Rejects with [`EventSkipped`] when the closure returns `false`.
#[derive(Clone)]
pub struct EventPredicate(Arc<dyn Fn(&Event) -> bool + Send + Sync>);

impl EventPredicate {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Accepts message events only; delivery, read and typing events are
    /// skipped.
    pub fn messages() -> Self {
        Self::new(|event| event.event_type() == EventType::Message)
    }
}

impl Predicate<Event> for EventPredicate {
    type Request = Event;

    fn check(&mut self, request: Event) -> Result<Event, BoxError> {
        if (self.0)(&request) {
            Ok(request)
        } else {
            Err(Box::new(EventSkipped))
        }
    }
}

// ============================================================================
// EngineService
// ============================================================================

/// Runs one engine turn per request.
#[derive(Clone)]
pub struct EngineService {
    engine: BotEngine,
}

impl EngineService {
    pub fn new(engine: BotEngine) -> Self {
        Self { engine }
    }
}

impl Service<Event> for EngineService {
    type Response = TurnOutcome;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<TurnOutcome, BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: Event) -> Self::Future {
        let engine = self.engine.clone();
        Box::pin(async move {
            engine
                .handle_message_event(event)
                .await
                .map_err(BoxError::from)
        })
    }
}

/// A builder pre-stacked with the message-only filter.
pub fn message_events() -> ServiceBuilder<Stack<FilterLayer<EventPredicate>, Identity>> {
    ServiceBuilder::new().filter(EventPredicate::messages())
}

/// Builder shortcuts for engine pipelines.
pub trait ServiceBuilderExt<L> {
    /// Applies the stacked layers to an [`EngineService`].
    fn engine(self, engine: BotEngine) -> L::Service
    where
        L: Layer<EngineService>;

    /// Adds a synchronous filter.
    fn rule<F>(self, predicate: F) -> ServiceBuilder<Stack<FilterLayer<EventPredicate>, L>>
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static;
}

impl<L> ServiceBuilderExt<L> for ServiceBuilder<L> {
    fn engine(self, engine: BotEngine) -> L::Service
    where
        L: Layer<EngineService>,
    {
        self.service(EngineService::new(engine))
    }

    fn rule<F>(self, predicate: F) -> ServiceBuilder<Stack<FilterLayer<EventPredicate>, L>>
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.filter(EventPredicate::new(predicate))
    }
}

/// Whether a pipeline error is a filter rejection.
pub fn is_skipped(err: &BoxError) -> bool {
    err.downcast_ref::<EventSkipped>().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexabot_core::model::{Block, BlockMessage, Pattern, Subscriber};
    use hexabot_core::{
        ChannelEvent, ChannelRegistry, MemoryBlockStore, MemoryConversationStore, MemorySubscriberStore,
        WebEvent, WebStatus,
    };
    use tower::ServiceExt;

    fn engine() -> BotEngine {
        BotEngine::builder(
            Arc::new(MemoryBlockStore::with_blocks([Block::new(
                "b1",
                "start",
                BlockMessage::texts(["Hi"]),
            )
            .with_patterns([Pattern::text("hi")])
            .starting()])),
            Arc::new(MemoryConversationStore::new()),
            Arc::new(MemorySubscriberStore::new()),
            ChannelRegistry::new(),
        )
        .build()
    }

    fn sender() -> Subscriber {
        Subscriber::new("sub-1", "u-1", "web-channel")
    }

    #[tokio::test]
    async fn test_non_message_events_are_skipped() {
        let svc = message_events().engine(engine());
        let status = Event::new(ChannelEvent::Web(WebEvent::Status(WebStatus::Read {
            watermark: 1_700_000_000,
        })))
        .with_sender(sender());

        let err = svc.oneshot(status).await.unwrap_err();
        assert!(is_skipped(&err));
    }

    #[tokio::test]
    async fn test_message_reaches_engine() {
        let svc = message_events().engine(engine());
        let event = Event::web_text("u-1", "something else").with_sender(sender());

        let outcome = svc.oneshot(event).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Unhandled);
    }

    #[tokio::test]
    async fn test_engine_errors_are_not_skips() {
        let svc = message_events().engine(engine());
        // No channel is registered, so the matched block cannot be sent.
        let event = Event::web_text("u-1", "hi").with_sender(sender());

        let err = svc.oneshot(event).await.unwrap_err();
        assert!(!is_skipped(&err));
    }

    #[tokio::test]
    async fn test_rule_and_boxing() {
        let svc: BoxedEngineService = BoxCloneSyncService::new(
            ServiceBuilder::new()
                .rule(|event: &Event| event.text().starts_with('!'))
                .engine(engine()),
        );
        let event = Event::web_text("u-1", "hello").with_sender(sender());
        let err = svc.oneshot(event).await.unwrap_err();
        assert!(is_skipped(&err));
    }
}
