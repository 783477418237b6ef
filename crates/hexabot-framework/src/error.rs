//! Error types for the Hexabot framework.

use hexabot_core::{ChannelError, EventError, StoreError};
use thiserror::Error;

/// Returned by the engine service filter when an event is not a message.
///
/// Callers recognise this error and skip the event without logging a failure.
#[derive(Debug, Clone, Error)]
#[error("event skipped by filter")]
pub struct EventSkipped;

/// Errors raised while turning a block into an outgoing envelope.
#[derive(Debug, Clone, Error)]
pub enum MessageError {
    /// Attachment blocks must reference an uploaded attachment.
    #[error("Remote attachments are no longer supported")]
    RemoteAttachment,

    /// No executor is registered for the block's plugin name.
    #[error("unknown block executor '{0}'")]
    UnknownExecutor(String),

    /// A content block has no `options.content`.
    #[error("block '{0}' has no content options")]
    MissingContentOptions(String),

    /// The message shape cannot be rendered (e.g. a fallback without messages).
    #[error("invalid message format for block '{0}'")]
    InvalidFormat(String),

    /// The content store failed while fetching a page.
    #[error("unable to retrieve content: {0}")]
    Content(#[from] StoreError),

    /// A block executor failed.
    #[error("executor '{name}' failed: {reason}")]
    Executor {
        /// Executor name.
        name: String,
        /// Failure reason.
        reason: String,
    },
}

impl MessageError {
    /// Creates an executor failure.
    pub fn executor(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Executor {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by the bot engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Event(#[from] EventError),

    /// The event reached the engine without a resolved subscriber.
    #[error("event has no resolved sender")]
    MissingSender,

    /// An attached-block chain loops back on itself.
    #[error("attached block cycle detected at '{0}'")]
    AttachedCycle(String),
}

/// Result type for message processing.
pub type MessageResult<T> = Result<T, MessageError>;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
