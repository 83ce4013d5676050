//! Configuration types for the Mentor service.
//!
//! This module provides all configuration structures used to control the
//! pipeline, including LLM provider selection, storage location, HTTP
//! server binding, and generation policy.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MentorError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "mentor.json";

/// Environment variable that overrides the database path.
pub const DATABASE_ENV: &str = "MENTOR_DATABASE";

/// Default model name.
fn default_model() -> String {
    "gpt-4o".to_string()
}

/// Default sampling temperature.
const fn default_temperature() -> f32 {
    0.7
}

/// Default maximum tokens per completion.
const fn default_max_tokens() -> u32 {
    4096
}

/// Default timeout in seconds for a single model call.
const fn default_llm_timeout() -> u64 {
    120
}

/// Default SQLite database path.
fn default_database_path() -> String {
    "mentor.db".to_string()
}

/// Default HTTP bind host.
fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Default HTTP port.
const fn default_port() -> u16 {
    3000
}

/// Default per-subscriber event buffer.
const fn default_event_buffer() -> usize {
    100
}

/// Main configuration for the Mentor service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Language model settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Persistence settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Generation pipeline settings.
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `mentor.json` in the current directory. If found, loads and
    /// validates the configuration. If not found, returns default configuration.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            MentorError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `mentor.json` in a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        Self::load_from_file(&config_path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `MentorError::ConfigParseError` if the file exists but contains
    /// invalid JSON or invalid enum values.
    ///
    /// Returns `MentorError::ConfigValidationError` if the configuration values
    /// are invalid (e.g., zero timeout, empty model name).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(MentorError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| MentorError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// Only `MENTOR_DATABASE` is recognised; blank values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(DATABASE_ENV).filter(|p| !p.trim().is_empty()) {
            self.database.path = path.trim().to_string();
        }
    }

    /// Validates the configuration values.
    ///
    /// Checks that:
    /// - `llm.model` is not empty
    /// - `llm.temperature` lies within 0.0..=2.0
    /// - `llm.maxTokens` and `llm.timeoutSecs` are greater than 0
    /// - `database.path` and `server.host` are not empty
    /// - `server.eventBufferSize` is greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.llm.model.trim().is_empty() {
            return Err(MentorError::config_validation(
                "llm.model must not be empty",
                "Set llm.model to a model name (e.g. \"gpt-4o\") in your mentor.json",
            ));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(MentorError::config_validation(
                format!(
                    "llm.temperature must be between 0.0 and 2.0 (got {})",
                    self.llm.temperature
                ),
                "Set llm.temperature to a value such as 0.7 in your mentor.json",
            ));
        }

        if self.llm.max_tokens == 0 {
            return Err(MentorError::config_validation(
                "llm.maxTokens must be greater than 0",
                "Set llm.maxTokens to at least 1 in your mentor.json",
            ));
        }

        if self.llm.timeout_secs == 0 {
            return Err(MentorError::config_validation(
                "llm.timeoutSecs must be greater than 0",
                "Set llm.timeoutSecs to at least 1 second in your mentor.json",
            ));
        }

        if self.database.path.trim().is_empty() {
            return Err(MentorError::config_validation(
                "database.path must not be empty",
                "Provide a database file path in your mentor.json or set MENTOR_DATABASE",
            ));
        }

        if self.server.host.trim().is_empty() {
            return Err(MentorError::config_validation(
                "server.host must not be empty",
                "Set server.host to an address such as \"127.0.0.1\" in your mentor.json",
            ));
        }

        if self.server.event_buffer_size == 0 {
            return Err(MentorError::config_validation(
                "server.eventBufferSize must be greater than 0",
                "Set server.eventBufferSize to at least 1 in your mentor.json",
            ));
        }

        Ok(())
    }
}

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LlmProvider {
    /// `OpenAI` chat completions API (default).
    #[default]
    OpenAi,
    /// Anthropic messages API.
    Anthropic,
}

impl LlmProvider {
    /// Parses a string into an `LlmProvider`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            _ => None,
        }
    }

    /// Returns the lowercase name used in `mentor.json`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    /// The public API base URL of the provider.
    #[must_use]
    pub const fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
        }
    }

    /// The environment variable conventionally holding the provider's key.
    #[must_use]
    pub const fn default_api_key_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl<'de> Deserialize<'de> for LlmProvider {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid LLM provider '{s}': expected one of 'openai', 'anthropic'"
            ))
        })
    }
}

impl Serialize for LlmProvider {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    /// Which provider API to speak.
    #[serde(default)]
    pub provider: LlmProvider,

    /// Model name passed to the provider.
    #[serde(default = "default_model")]
    pub model: String,

    /// Override for the provider base URL (e.g. a local proxy).
    #[serde(default)]
    pub base_url: Option<String>,

    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Timeout for a single model call in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: default_model(),
            base_url: None,
            api_key_env: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    /// The base URL to call, honouring an explicit override.
    #[must_use]
    pub fn resolved_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .map_or_else(|| self.provider.default_base_url(), |u| u.trim_end_matches('/'))
    }

    /// The environment variable to read the API key from.
    #[must_use]
    pub fn resolved_api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_key_env())
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Events buffered per WebSocket subscriber before it lags.
    #[serde(default = "default_event_buffer")]
    pub event_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            event_buffer_size: default_event_buffer(),
        }
    }
}

/// Generation pipeline settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// What module expansion does when lesson outlines already exist.
    #[serde(default)]
    pub expansion_policy: ExpansionPolicy,
}

/// Behaviour of module expansion for modules that already have lessons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExpansionPolicy {
    /// Keep existing lesson outlines and skip the model call (default).
    #[default]
    SkipExisting,
    /// Always ask the model for fresh outlines, replacing existing ones.
    Regenerate,
}

impl ExpansionPolicy {
    /// Parses a string into an `ExpansionPolicy`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "skip_existing" => Some(Self::SkipExisting),
            "regenerate" => Some(Self::Regenerate),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for ExpansionPolicy {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid expansion policy '{s}': expected one of 'skip_existing', 'regenerate'"
            ))
        })
    }
}

impl Serialize for ExpansionPolicy {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Self::SkipExisting => "skip_existing",
            Self::Regenerate => "regenerate",
        };
        serializer.serialize_str(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.model, "gpt-4o");
        assert!((config.llm.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.llm.timeout_secs, 120);
        assert_eq!(config.database.path, "mentor.db");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(
            config.generation.expansion_policy,
            ExpansionPolicy::SkipExisting
        );
    }

    #[test]
    fn test_llm_provider_serialization() {
        assert_eq!(
            serde_json::to_string(&LlmProvider::OpenAi).unwrap(),
            "\"openai\""
        );
        assert_eq!(
            serde_json::to_string(&LlmProvider::Anthropic).unwrap(),
            "\"anthropic\""
        );
    }

    #[test]
    fn test_llm_provider_case_insensitive() {
        let config: Config = serde_json::from_str(r#"{"llm": {"provider": "OpenAI"}}"#).unwrap();
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);

        let config: Config =
            serde_json::from_str(r#"{"llm": {"provider": "ANTHROPIC"}}"#).unwrap();
        assert_eq!(config.llm.provider, LlmProvider::Anthropic);
    }

    #[test]
    fn test_invalid_llm_provider_error() {
        let json = r#"{"llm": {"provider": "mistral"}}"#;
        let result: std::result::Result<Config, _> = serde_json::from_str(json);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("invalid LLM provider"));
        assert!(err.contains("mistral"));
    }

    #[test]
    fn test_expansion_policy_parsing() {
        let config: Config =
            serde_json::from_str(r#"{"generation": {"expansionPolicy": "Regenerate"}}"#).unwrap();
        assert_eq!(
            config.generation.expansion_policy,
            ExpansionPolicy::Regenerate
        );

        let config: Config =
            serde_json::from_str(r#"{"generation": {"expansionPolicy": "skip-existing"}}"#)
                .unwrap();
        assert_eq!(
            config.generation.expansion_policy,
            ExpansionPolicy::SkipExisting
        );

        let result: std::result::Result<Config, _> =
            serde_json::from_str(r#"{"generation": {"expansionPolicy": "sometimes"}}"#);
        assert!(result.unwrap_err().to_string().contains("sometimes"));
    }

    #[test]
    fn test_resolved_provider_defaults() {
        let mut llm = LlmConfig::default();
        assert_eq!(llm.resolved_base_url(), "https://api.openai.com/v1");
        assert_eq!(llm.resolved_api_key_env(), "OPENAI_API_KEY");

        llm.provider = LlmProvider::Anthropic;
        assert_eq!(llm.resolved_base_url(), "https://api.anthropic.com/v1");
        assert_eq!(llm.resolved_api_key_env(), "ANTHROPIC_API_KEY");

        llm.base_url = Some("http://localhost:8080/v1/".to_string());
        llm.api_key_env = Some("PROXY_KEY".to_string());
        assert_eq!(llm.resolved_base_url(), "http://localhost:8080/v1");
        assert_eq!(llm.resolved_api_key_env(), "PROXY_KEY");
    }

    #[test]
    fn test_config_deserialization_with_overrides() {
        let json = r#"{
            "llm": {"model": "gpt-4o-mini", "timeoutSecs": 30},
            "database": {"path": "/tmp/courses.db"},
            "server": {"port": 8080}
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.timeout_secs, 30);
        assert_eq!(config.database.path, "/tmp/courses.db");
        assert_eq!(config.server.port, 8080);
        // Check that other fields got their defaults
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.llm.max_tokens, 4096);
    }

    #[test]
    fn test_env_override_database_path() {
        let mut config = Config::default();
        config.apply_overrides(|key| (key == DATABASE_ENV).then(|| "/data/m.db".to_string()));
        assert_eq!(config.database.path, "/data/m.db");

        let mut config = Config::default();
        config.apply_overrides(|_| Some("   ".to_string()));
        assert_eq!(config.database.path, "mentor.db");
    }

    #[test]
    fn test_load_from_file_valid_json() {
        use std::io::Write;

        let config_path = std::env::temp_dir().join("test_mentor_valid.json");
        let json = r#"{"llm": {"provider": "anthropic", "model": "claude-sonnet"}}"#;
        let mut file = std::fs::File::create(&config_path).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.llm.provider, LlmProvider::Anthropic);
        assert_eq!(config.llm.model, "claude-sonnet");
        assert_eq!(config.llm.timeout_secs, 120);

        std::fs::remove_file(&config_path).ok();
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        use std::io::Write;

        let config_path = std::env::temp_dir().join("test_mentor_invalid.json");
        let mut file = std::fs::File::create(&config_path).unwrap();
        file.write_all(b"{ not valid json }").unwrap();

        let err = Config::load_from_file(&config_path).unwrap_err();
        assert!(
            matches!(&err, MentorError::ConfigParseError { path, message } if *path == config_path && !message.is_empty()),
            "Expected ConfigParseError with correct path, got: {err:?}"
        );

        std::fs::remove_file(&config_path).ok();
    }

    #[test]
    fn test_load_from_file_nonexistent_returns_default() {
        let config = Config::load_from_file(&PathBuf::from("/nonexistent/mentor.json")).unwrap();
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.database.path, "mentor.db");
    }

    #[test]
    fn test_load_from_dir_finds_mentor_json() {
        use std::io::Write;

        let temp_dir = std::env::temp_dir().join("test_mentor_dir");
        std::fs::create_dir_all(&temp_dir).unwrap();
        let config_path = temp_dir.join("mentor.json");
        let mut file = std::fs::File::create(&config_path).unwrap();
        file.write_all(br#"{"server": {"port": 4100}}"#).unwrap();

        let config = Config::load_from_dir(&temp_dir).unwrap();
        assert_eq!(config.server.port, 4100);

        std::fs::remove_file(&config_path).ok();
        std::fs::remove_dir(&temp_dir).ok();
    }

    #[test]
    fn test_config_validation_empty_model() {
        let mut config = Config::default();
        config.llm.model = "  ".to_string();

        let err = config.validate().unwrap_err();
        assert!(
            matches!(&err, MentorError::ConfigValidationError { message, .. } if message.contains("llm.model")),
            "Expected ConfigValidationError about llm.model, got: {err:?}"
        );
    }

    #[test]
    fn test_config_validation_temperature_range() {
        let mut config = Config::default();
        config.llm.temperature = 3.5;
        assert!(config.validate().is_err());

        config.llm.temperature = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = Config::default();
        config.llm.timeout_secs = 0;

        let err = config.validate().unwrap_err();
        assert!(
            matches!(&err, MentorError::ConfigValidationError { message, suggestion }
                if message.contains("timeoutSecs") && suggestion.contains("timeoutSecs")),
            "Expected ConfigValidationError about timeoutSecs, got: {err:?}"
        );
    }

    #[test]
    fn test_config_validation_empty_database_path() {
        let mut config = Config::default();
        config.database.path = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("database.path"));
    }

    #[test]
    fn test_load_from_file_validates_after_parsing() {
        use std::io::Write;

        let config_path = std::env::temp_dir().join("test_mentor_validation.json");
        let mut file = std::fs::File::create(&config_path).unwrap();
        file.write_all(br#"{"llm": {"maxTokens": 0}}"#).unwrap();

        let err = Config::load_from_file(&config_path).unwrap_err();
        assert!(
            matches!(&err, MentorError::ConfigValidationError { .. }),
            "Expected ConfigValidationError, got: {err:?}"
        );

        std::fs::remove_file(&config_path).ok();
    }
}
