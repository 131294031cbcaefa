//! Error types for the scenario engine
//!
//! Only genuinely unexpected failures travel through this channel: adapter
//! transport faults, callback faults, watchdog timeouts, and configuration
//! mistakes. Assertion outcomes are data ([`crate::AssertionResult`]) and
//! are never raised as errors.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the scenario engine
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Scenario '{title}' already has a target; open()/mock() may be called once")]
    TargetAlreadySet { title: String },

    #[error("Scenario '{title}' has already started executing; pipeline and hooks are frozen")]
    AlreadyExecuting { title: String },

    #[error("Suite '{title}' has already been executed; execute() may be called once")]
    SuiteAlreadyExecuted { title: String },

    #[error("Invalid target URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("No adapter registered for response type '{response_type}'")]
    AdapterNotRegistered { response_type: String },

    // === Transport Errors ===
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to parse response as {expected}: {reason}")]
    ResponseParse { expected: String, reason: String },

    // === Callback Errors ===
    #[error("Pipeline step failed: {0}")]
    Callback(String),

    // === Timeout Errors ===
    #[error("Scenario '{title}' timed out after {after_ms}ms")]
    ScenarioTimeout { title: String, after_ms: u64 },

    #[error("Suite '{title}' timed out after {after_ms}ms; scenario aborted")]
    SuiteTimeout { title: String, after_ms: u64 },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a transport error from any displayable fault
    pub fn transport<E: std::fmt::Display>(e: E) -> Self {
        Self::Transport(e.to_string())
    }

    /// Create a response parse error
    pub fn response_parse(expected: &str, reason: impl std::fmt::Display) -> Self {
        Self::ResponseParse {
            expected: expected.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid URL error
    pub fn invalid_url(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for faults raised by a watchdog rather than by the work itself
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ScenarioTimeout { .. } | Self::SuiteTimeout { .. }
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
