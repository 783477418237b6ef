//! Configuration for the Hexabot runtime.
//!
//! Settings are layered with figment (defaults, files, `HEXABOT_*`
//! environment variables) and checked by [`validate_config`] before the
//! runtime is built.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    ChatbotConfig, HexabotConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    NluConfig, SpanEventConfig, TelemetryConfig,
};
pub use validation::validate_config;
