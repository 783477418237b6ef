//! Hexabot Runtime - configuration, logging and turn orchestration.
//!
//! This crate provides:
//! - Layered configuration (`HexabotConfig`, `ConfigLoader`)
//! - Tracing subscriber setup (`LoggingBuilder`)
//! - Per-subscriber turn serialization (`TurnLocks`)
//! - Background telemetry consumption (`TelemetryPump`)
//! - The runtime itself (`HexabotRuntime`): raw channel payload in, engine
//!   turn out
//!
//! ```ignore
//! use hexabot_runtime::{HexabotRuntime, shutdown_signal};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = HexabotRuntime::builder()
//!         .blocks(Arc::new(MemoryBlockStore::with_blocks(load_flow()?)))
//!         .build()?;
//!
//!     // Feed widget payloads from your transport
//!     runtime.handle_raw("web-channel", &payload).await?;
//!
//!     shutdown_signal().await;
//!     let stats = runtime.shutdown().await;
//!     println!("{stats}");
//!     Ok(())
//! }
//! ```
//!
//! Two payloads from the same subscriber never run concurrently; payloads of
//! different subscribers do.

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod telemetry;
pub mod turn;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, HexabotConfig, Profile};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{HexabotRuntime, RuntimeBuilder, shutdown_signal};
pub use telemetry::{StatsSnapshot, TelemetryPump};
pub use turn::TurnLocks;

// Re-export tracing for convenience
pub use tracing;
pub use tracing_subscriber;
