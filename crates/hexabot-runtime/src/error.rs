//! Runtime error type.

use hexabot_core::{EventError, StoreError};
use hexabot_framework::EngineError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by [`HexabotRuntime`](crate::HexabotRuntime).
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The raw payload could not be turned into an event.
    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The engine service failed outside of the engine itself.
    #[error("engine service error: {0}")]
    Service(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
