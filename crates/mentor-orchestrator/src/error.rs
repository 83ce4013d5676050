//! Error types for the Mentor course generation pipeline.
//!
//! This module defines the error hierarchy for all pipeline operations,
//! including configuration loading, model invocation, reply parsing,
//! content generation and persistence.

use std::path::PathBuf;

/// A specialized `Result` type for Mentor pipeline operations.
pub type Result<T> = std::result::Result<T, MentorError>;

/// Errors that can occur while generating or storing course material.
///
/// Error variants are organized by pipeline stage and include actionable
/// suggestions where the user can do something about them.
#[derive(Debug, thiserror::Error)]
pub enum MentorError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your mentor.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Language Model Errors
    // ========================================================================
    /// LLM API returned an error (authentication, rate limiting, etc.).
    #[error("LLM API error ({kind}): {message}\n\nSuggestion: {suggestion}")]
    LlmApiError {
        /// The kind of API error (e.g., rate limit, authentication, server).
        kind: LlmErrorKind,
        /// Detailed error message from the API.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// The model did not answer within the configured timeout.
    #[error("LLM call timed out after {timeout_secs}s\n\nSuggestion: Raise llm.timeoutSecs in mentor.json or retry later")]
    LlmTimeout {
        /// The timeout duration in seconds.
        timeout_secs: u64,
    },

    // ========================================================================
    // Generation Errors
    // ========================================================================
    /// The model reply was not valid JSON or did not match the expected shape.
    ///
    /// The raw reply is kept so the failure can be diagnosed.
    #[error("Could not parse {stage} reply: {message}")]
    GenerationParse {
        /// Pipeline stage whose reply failed to parse.
        stage: GenerationStage,
        /// Description of the parse or shape failure.
        message: String,
        /// The model output exactly as received.
        raw_output: String,
    },

    /// A module violated a precondition of the requested operation.
    #[error("Invalid module '{module_id}': {reason}")]
    InvalidModule {
        /// Identifier of the offending module.
        module_id: String,
        /// Which precondition failed.
        reason: String,
    },

    /// Generating one lesson failed; the whole module generation is aborted.
    #[error("Failed to generate lesson '{lesson_id}': {source}")]
    ContentGeneration {
        /// Identifier of the lesson outline being generated.
        lesson_id: String,
        /// The underlying failure.
        #[source]
        source: Box<MentorError>,
    },

    // ========================================================================
    // Lookup and Request Errors
    // ========================================================================
    /// A referenced resource is absent from storage.
    #[error("{kind} with id '{id}' not found")]
    NotFound {
        /// What kind of resource was looked up.
        kind: ResourceKind,
        /// The identifier that missed.
        id: String,
    },

    /// The caller supplied an unusable request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ========================================================================
    // Persistence Errors
    // ========================================================================
    /// The persistence gateway failed.
    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Categories of LLM API errors for structured error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Authentication failure (invalid API key, expired credentials).
    Authentication,
    /// Rate limit exceeded.
    RateLimit,
    /// Server error (5xx responses).
    Server,
    /// Network connectivity issues.
    Network,
    /// Other unclassified errors.
    Other,
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl LlmErrorKind {
    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Authentication => "Check your API key or credentials",
            Self::RateLimit => "Wait and retry, or reduce request frequency",
            Self::Server => "Retry later; the LLM service may be experiencing issues",
            Self::Network => "Check your network connection",
            Self::Other => "Check the LLM provider's status page",
        }
    }

    /// Classifies an HTTP status code returned by an LLM provider.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }
}

/// The pipeline stage that produced a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStage {
    /// Course syllabus generation.
    Syllabus,
    /// Module structure expansion into lesson outlines.
    ModuleStructure,
}

impl std::fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syllabus => write!(f, "syllabus"),
            Self::ModuleStructure => write!(f, "module structure"),
        }
    }
}

/// Kinds of stored resources that can be looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A persisted course.
    Course,
    /// A persisted module.
    Module,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Course => write!(f, "Course"),
            Self::Module => write!(f, "Module"),
        }
    }
}

impl MentorError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `LlmApiError` with automatic suggestion based on error kind.
    #[must_use]
    pub fn llm_api_error(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        let suggestion = kind.suggestion().to_string();
        Self::LlmApiError {
            kind,
            message: message.into(),
            suggestion,
        }
    }

    /// Creates a new `LlmTimeout` error.
    #[must_use]
    pub const fn llm_timeout(timeout_secs: u64) -> Self {
        Self::LlmTimeout { timeout_secs }
    }

    /// Creates a new `GenerationParse` error that keeps the raw model output.
    #[must_use]
    pub fn generation_parse(
        stage: GenerationStage,
        message: impl Into<String>,
        raw_output: impl Into<String>,
    ) -> Self {
        Self::GenerationParse {
            stage,
            message: message.into(),
            raw_output: raw_output.into(),
        }
    }

    /// Creates a new `InvalidModule` error.
    #[must_use]
    pub fn invalid_module(module_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidModule {
            module_id: module_id.into(),
            reason: reason.into(),
        }
    }

    /// Wraps a per-lesson failure with the lesson identifier.
    #[must_use]
    pub fn content_generation(lesson_id: impl Into<String>, source: Self) -> Self {
        Self::ContentGeneration {
            lesson_id: lesson_id.into(),
            source: Box::new(source),
        }
    }

    /// Creates a `NotFound` error for a course.
    #[must_use]
    pub fn course_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: ResourceKind::Course,
            id: id.into(),
        }
    }

    /// Creates a `NotFound` error for a module.
    #[must_use]
    pub fn module_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: ResourceKind::Module,
            id: id.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Returns the raw model output if this error (or the error it wraps)
    /// came from an unparseable reply.
    #[must_use]
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::GenerationParse { raw_output, .. } => Some(raw_output),
            Self::ContentGeneration { source, .. } => source.raw_output(),
            _ => None,
        }
    }

    /// Returns `true` if this error is transient and may be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::LlmApiError { kind, .. } => matches!(
                kind,
                LlmErrorKind::RateLimit | LlmErrorKind::Server | LlmErrorKind::Network
            ),
            Self::LlmTimeout { .. } => true,
            Self::ContentGeneration { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Returns `true` if this error is fatal and retrying cannot help.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::ConfigParseError { .. }
            | Self::ConfigValidationError { .. }
            | Self::GenerationParse { .. }
            | Self::InvalidModule { .. }
            | Self::NotFound { .. }
            | Self::InvalidRequest(_)
            | Self::LlmApiError {
                kind: LlmErrorKind::Authentication,
                ..
            } => true,
            Self::ContentGeneration { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}
