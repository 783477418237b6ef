//! Configuration schema definitions.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use hexabot_framework::EngineSettings;
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HexabotConfig {
    pub logging: LoggingConfig,
    pub chatbot: ChatbotConfig,
    pub nlu: NluConfig,
    pub telemetry: TelemetryConfig,
}

// =============================================================================
// Logging
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `full` otherwise.
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Rotation period of the log file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanEventConfig {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Log file, used with `output = "file"`.
    pub file_path: Option<PathBuf>,
    pub rotation: LogRotation,
    /// Rotated files kept on disk.
    pub max_files: usize,
    pub thread_ids: bool,
    /// Include file and line of the call site.
    pub file_location: bool,
    /// Per-target levels, e.g. `hexabot_framework = "debug"`.
    pub filters: HashMap<String, LogLevel>,
    pub span_events: SpanEventConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            rotation: LogRotation::Never,
            max_files: 5,
            thread_ids: false,
            file_location: false,
            filters: HashMap::new(),
            span_events: SpanEventConfig::default(),
        }
    }
}

// =============================================================================
// Chatbot
// =============================================================================

/// Chatbot behavior settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatbotConfig {
    /// Answer messages that match no starting block.
    pub global_fallback: bool,
    /// Block id starting a conversation on global fallback.
    pub fallback_block: Option<String>,
    /// Texts sent on global fallback when no block is configured.
    pub fallback_message: Vec<String>,
    /// Languages accepted from NLU detection.
    pub languages: Vec<String>,
    /// Values for `{contact.X}` tokens.
    pub contact: BTreeMap<String, String>,
}

impl Default for ChatbotConfig {
    fn default() -> Self {
        Self {
            global_fallback: true,
            fallback_block: None,
            fallback_message: vec![
                "Sorry but i didn't understand your request. Maybe you can check the menu".into(),
                "I'm really sorry but i don't quite understand what you are saying :(".into(),
            ],
            languages: vec!["en".into()],
            contact: BTreeMap::new(),
        }
    }
}

impl ChatbotConfig {
    pub fn to_engine_settings(&self) -> EngineSettings {
        EngineSettings {
            global_fallback: self.global_fallback,
            fallback_block: self.fallback_block.clone(),
            fallback_message: self.fallback_message.clone(),
            contact: self.contact.clone(),
            languages: self.languages.clone(),
        }
    }
}

// =============================================================================
// NLU & Telemetry
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NluConfig {
    pub enabled: bool,
    /// Entities below this confidence are dropped from the parse.
    pub confidence_threshold: f64,
}

impl Default for NluConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence_threshold: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config: HexabotConfig = serde_json::from_value(serde_json::json!({
            "logging": { "level": "debug" },
            "chatbot": { "fallback_block": "menu" }
        }))
        .unwrap();

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.chatbot.fallback_block.as_deref(), Some("menu"));
        assert!(config.chatbot.global_fallback);
        assert_eq!(config.chatbot.languages, vec!["en".to_string()]);
        assert!(config.telemetry.enabled);
    }

    #[test]
    fn test_unknown_level_is_rejected() {
        let result: Result<HexabotConfig, _> = serde_json::from_value(serde_json::json!({
            "logging": { "level": "verbose" }
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_engine_settings_mirror_chatbot_section() {
        let mut chatbot = ChatbotConfig::default();
        chatbot
            .contact
            .insert("company_name".into(), "Hexastack".into());
        let settings = chatbot.to_engine_settings();

        assert_eq!(settings.contact["company_name"], "Hexastack");
        assert_eq!(settings.fallback_message.len(), 2);
        assert!(settings.global_fallback);
    }
}
