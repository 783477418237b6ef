//! Configuration loading with figment.
//!
//! # Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Profile file (`hexabot.{profile}.toml`)
//! 3. Main file (`hexabot.toml`, then `config.toml`)
//! 4. Environment variables (`HEXABOT_*`)
//! 5. Programmatic overrides ([`ConfigLoader::merge`], [`ConfigLoader::set`])
//!
//! YAML files (`hexabot.yaml`, `hexabot.yml`) are searched as well when the
//! `yaml-config` feature is enabled.
//!
//! # Environment variables
//!
//! Nested keys are separated by `__`:
//!
//! - `HEXABOT_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `HEXABOT_CHATBOT__FALLBACK_BLOCK=menu` → `chatbot.fallback_block = "menu"`
//! - `HEXABOT_CHATBOT__CONTACT__COMPANY_NAME=Acme` → `chatbot.contact.company_name`
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("./deploy/hexabot.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::HexabotConfig;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "HEXABOT_";

/// Environment-specific configuration profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `HEXABOT_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var("HEXABOT_PROFILE")
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layered configuration loader.
pub struct ConfigLoader {
    profile: Profile,
    search_paths: Vec<PathBuf>,
    config_file: Option<PathBuf>,
    load_env: bool,
    /// Merged after every other source.
    overrides: Figment,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            config_file: None,
            load_env: true,
            overrides: Figment::new(),
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory searched for configuration files.
    ///
    /// Without any search path, the current directory and
    /// `<config dir>/hexabot` are searched.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Overrides the whole configuration.
    pub fn merge(mut self, config: HexabotConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    /// Overrides a single (dotted) key, e.g. `set("chatbot.global_fallback", false)`.
    pub fn set<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.overrides = self.overrides.merge(Serialized::default(key, value));
        self
    }

    /// Merges an inline TOML document with the programmatic overrides.
    #[cfg(feature = "toml-config")]
    pub fn toml_str(mut self, content: &str) -> Self {
        self.overrides = self.overrides.merge(Toml::string(content));
        self
    }

    pub fn load(self) -> ConfigResult<HexabotConfig> {
        let profile = self.profile.clone();
        let config: HexabotConfig = self.figment()?.extract()?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            global_fallback = config.chatbot.global_fallback,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Builds the layered figment without extracting it.
    pub fn figment(self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(HexabotConfig::default()));

        figment = match &self.config_file {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "Loading configuration file");
                merge_file(figment, path)?
            }
            Some(path) => return Err(ConfigError::FileNotFound(path.clone())),
            None => self.search_files(figment),
        };

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(figment.merge(self.overrides))
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        std::env::current_dir()
            .ok()
            .into_iter()
            .chain(dirs::config_dir().map(|dir| dir.join("hexabot")))
            .collect()
    }

    /// Merges the first directory's profile and main file, for every enabled
    /// format.
    fn search_files(&self, mut figment: Figment) -> Figment {
        let mut found = false;

        for dir in self.resolve_search_paths() {
            for (stem, ext) in candidate_names() {
                let profile_path = dir.join(format!("{stem}.{}.{ext}", self.profile));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile configuration");
                    figment = merge_file_lenient(figment, &profile_path);
                }

                let main_path = dir.join(format!("{stem}.{ext}"));
                if main_path.exists() {
                    info!(path = %main_path.display(), "Loading configuration file");
                    figment = merge_file_lenient(figment, &main_path);
                    found = true;
                    break;
                }
            }
            if found {
                break;
            }
        }

        if !found {
            warn!("No configuration file found, using defaults");
        }
        figment
    }
}

/// `(stem, extension)` pairs searched in order.
fn candidate_names() -> Vec<(&'static str, &'static str)> {
    let mut names = Vec::new();
    #[cfg(feature = "toml-config")]
    names.extend([("hexabot", "toml"), ("config", "toml")]);
    #[cfg(feature = "yaml-config")]
    names.extend([("hexabot", "yaml"), ("hexabot", "yml")]);
    names
}

fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    match ext {
        #[cfg(feature = "toml-config")]
        "toml" => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

fn merge_file_lenient(figment: Figment, path: &Path) -> Figment {
    match merge_file(figment.clone(), path) {
        Ok(merged) => merged,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Skipping configuration file");
            figment
        }
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<HexabotConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from `path`, with environment overrides.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<HexabotConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{LogFormat, LogLevel};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hexabot-config-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_defaults_without_files() {
        let config = ConfigLoader::new()
            .search_path(scratch_dir("empty"))
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config, HexabotConfig::default());
        assert_eq!(config.logging.level.as_str(), "info");
    }

    #[test]
    fn test_profile_file_under_main_file() {
        let dir = scratch_dir("layered");
        std::fs::write(
            dir.join("hexabot.production.toml"),
            "[logging]\nlevel = \"warn\"\nformat = \"pretty\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("hexabot.toml"),
            "[logging]\nlevel = \"debug\"\n\n[chatbot]\nfallback_block = \"menu\"\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .profile("prod")
            .search_path(&dir)
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.chatbot.fallback_block.as_deref(), Some("menu"));
    }

    #[test]
    fn test_env_then_programmatic_overrides() {
        // SAFETY: these variables are only read by this test.
        unsafe {
            std::env::set_var("HEXABOT_CHATBOT__FALLBACK_BLOCK", "from-env");
            std::env::set_var("HEXABOT_LOGGING__LEVEL", "trace");
        }
        let config = ConfigLoader::new()
            .search_path(scratch_dir("env"))
            .toml_str("[chatbot]\nfallback_block = \"from-toml\"\nlanguages = [\"en\", \"fr\"]\n")
            .set("telemetry.enabled", false)
            .load()
            .unwrap();
        unsafe {
            std::env::remove_var("HEXABOT_CHATBOT__FALLBACK_BLOCK");
            std::env::remove_var("HEXABOT_LOGGING__LEVEL");
        }

        assert_eq!(config.logging.level, LogLevel::Trace);

        // Inline documents sit with the overrides, above the environment.
        assert_eq!(config.chatbot.fallback_block.as_deref(), Some("from-toml"));
        assert_eq!(config.chatbot.languages, vec!["en".to_string(), "fr".to_string()]);
        assert!(!config.telemetry.enabled);
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = ConfigLoader::new()
            .file("/nonexistent/hexabot.toml")
            .without_env()
            .load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_unsupported_explicit_format() {
        let dir = scratch_dir("format");
        let path = dir.join("hexabot.ini");
        std::fs::write(&path, "level=debug").unwrap();

        let result = ConfigLoader::new().file(&path).without_env().load();
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(ext)) if ext == "ini"));
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("PROD"), Profile::Production);
        assert_eq!(Profile::parse("dev"), Profile::Development);
        assert_eq!(Profile::parse("staging").as_str(), "staging");
    }
}
