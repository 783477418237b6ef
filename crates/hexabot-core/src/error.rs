//! Unified error types for the Hexabot core.
//!
//! These cover the collaborator boundaries (stores, channels, NLU) and
//! canonical event parsing. Engine-level errors live in `hexabot-framework`.

use thiserror::Error;

// =============================================================================
// Store Errors
// =============================================================================

/// Errors raised by block, conversation, subscriber and content stores.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Kind of record (e.g. "block", "conversation").
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The write would break a store invariant.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The underlying backend failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Creates a not-found error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Creates a backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

// =============================================================================
// Channel Errors
// =============================================================================

/// Errors raised while delivering an outgoing envelope.
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// No channel is registered under this name.
    #[error("channel '{0}' is not registered")]
    NotRegistered(String),

    /// The channel cannot render this envelope format.
    #[error("unsupported envelope format: {0}")]
    UnsupportedFormat(String),

    /// The send itself failed.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// The send did not complete in time.
    #[error("send timed out")]
    Timeout,
}

impl ChannelError {
    /// Creates a send failure.
    pub fn send_failed(msg: impl Into<String>) -> Self {
        Self::SendFailed(msg.into())
    }
}

// =============================================================================
// Event Errors
// =============================================================================

/// Errors raised while normalizing a raw channel payload.
#[derive(Debug, Clone, Error)]
pub enum EventError {
    /// The payload could not be decoded.
    #[error("failed to parse event: {reason}")]
    Parse {
        /// Reason for failure.
        reason: String,
    },

    /// A field required by the accessor is absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// The accessor only applies to message events.
    #[error("`{0}` is only available on message events")]
    NotAMessage(&'static str),
}

impl EventError {
    /// Creates a parse error.
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        Self::parse(err.to_string())
    }
}

/// Error returned by an NLU service.
#[derive(Debug, Clone, Error)]
#[error("nlu service error: {0}")]
pub struct NluError(pub String);

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Result type for event accessors and parsing.
pub type EventResult<T> = Result<T, EventError>;

/// Result type for NLU calls.
pub type NluResult<T> = Result<T, NluError>;
