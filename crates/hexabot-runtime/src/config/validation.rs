//! Configuration validation.

use super::error::{ConfigError, ConfigResult};
use super::schema::{ChatbotConfig, HexabotConfig, LogOutput, LoggingConfig, NluConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &HexabotConfig) -> ConfigResult<()> {
    validate_logging(&config.logging)?;
    validate_chatbot(&config.chatbot)?;
    validate_nlu(&config.nlu)?;
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if let Some(target) = logging.filters.keys().find(|t| t.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Invalid logging filter target: {target:?}"
        )));
    }

    Ok(())
}

fn validate_chatbot(chatbot: &ChatbotConfig) -> ConfigResult<()> {
    if chatbot.languages.is_empty() {
        return Err(ConfigError::missing_field("chatbot.languages"));
    }

    if chatbot.fallback_block.as_deref().is_some_and(str::is_empty) {
        return Err(ConfigError::validation(
            "chatbot.fallback_block must not be empty when set",
        ));
    }

    let has_message = chatbot.fallback_message.iter().any(|m| !m.trim().is_empty());
    if chatbot.global_fallback && chatbot.fallback_block.is_none() && !has_message {
        return Err(ConfigError::validation(
            "Global fallback is enabled but neither a fallback block nor a fallback message is set",
        ));
    }

    Ok(())
}

fn validate_nlu(nlu: &NluConfig) -> ConfigResult<()> {
    if !(0.0..=1.0).contains(&nlu.confidence_threshold) {
        return Err(ConfigError::validation(format!(
            "nlu.confidence_threshold must be within [0, 1], got {}",
            nlu.confidence_threshold
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&HexabotConfig::default()).is_ok());
    }

    #[test]
    fn test_global_fallback_needs_something_to_send() {
        let mut config = HexabotConfig::default();
        config.chatbot.fallback_message = vec!["  ".into()];
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Validation { .. })
        ));

        config.chatbot.fallback_block = Some("menu".into());
        assert!(validate_config(&config).is_ok());

        config.chatbot.fallback_block = None;
        config.chatbot.global_fallback = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_languages_required() {
        let mut config = HexabotConfig::default();
        config.chatbot.languages.clear();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "chatbot.languages"
        ));
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = HexabotConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("logs/hexabot.log".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_confidence_threshold_range() {
        let mut config = HexabotConfig::default();
        config.nlu.confidence_threshold = 1.5;
        assert!(validate_config(&config).is_err());
    }
}
