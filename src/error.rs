// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the aicoder pipeline.
//!
//! This module provides strongly-typed errors for different parts of the application,
//! using `thiserror` for ergonomic error definitions and `anyhow` for error propagation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::PipelinePhase;

/// Errors that can occur during provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("API error: {message}")]
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Context window exceeded: {used} tokens used, {limit} available")]
    ContextWindowExceeded { used: u32, limit: u32 },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Response parsing error: {0}")]
    ParseError(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl ProviderError {
    /// Create an API error with status code.
    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        Self::ApiError {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create an API error without status code.
    pub fn api_message(message: impl Into<String>) -> Self {
        Self::ApiError {
            message: message.into(),
            status_code: None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::NetworkError(_) | Self::Timeout(_)
        )
    }
}

/// Wire-level classification of a tool failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    UnknownTool,
    InvalidInput,
    Filesystem,
    NotFound,
    PathEscape,
    NotPermitted,
    DuplicateAppend,
    ReadOnlyPath,
    Connection,
    Protocol,
}

/// Errors that can occur during tool execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Filesystem error: {0}")]
    Filesystem(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: path escapes output root: {0}")]
    PathEscape(String),

    #[error("Tool '{tool}' is not permitted for {caller}")]
    NotPermitted { tool: String, caller: String },

    #[error("Refusing to repeat identical append to {0}")]
    DuplicateAppend(String),

    #[error("{0} may not be modified in this phase")]
    ReadOnlyPath(String),

    #[error("Tool server connection error: {0}")]
    Connection(String),

    #[error("Tool protocol error: {0}")]
    Protocol(String),
}

impl ToolError {
    /// Classify this error for transport.
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            Self::UnknownTool(_) => ToolErrorKind::UnknownTool,
            Self::InvalidInput(_) | Self::MissingParameter(_) => ToolErrorKind::InvalidInput,
            Self::Filesystem(_) => ToolErrorKind::Filesystem,
            Self::NotFound(_) => ToolErrorKind::NotFound,
            Self::PathEscape(_) => ToolErrorKind::PathEscape,
            Self::NotPermitted { .. } => ToolErrorKind::NotPermitted,
            Self::DuplicateAppend(_) => ToolErrorKind::DuplicateAppend,
            Self::ReadOnlyPath(_) => ToolErrorKind::ReadOnlyPath,
            Self::Connection(_) => ToolErrorKind::Connection,
            Self::Protocol(_) => ToolErrorKind::Protocol,
        }
    }

    /// Rebuild an error received from the tool server.
    pub fn from_wire(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ToolErrorKind::UnknownTool => Self::UnknownTool(message),
            ToolErrorKind::InvalidInput => Self::InvalidInput(message),
            ToolErrorKind::Filesystem => Self::Filesystem(message),
            ToolErrorKind::NotFound => Self::NotFound(message),
            ToolErrorKind::PathEscape => Self::PathEscape(message),
            ToolErrorKind::NotPermitted => Self::NotPermitted {
                tool: message,
                caller: "server".to_string(),
            },
            ToolErrorKind::DuplicateAppend => Self::DuplicateAppend(message),
            ToolErrorKind::ReadOnlyPath => Self::ReadOnlyPath(message),
            ToolErrorKind::Connection => Self::Connection(message),
            ToolErrorKind::Protocol => Self::Protocol(message),
        }
    }

    /// Message without the variant prefix, as sent over the wire.
    pub fn detail(&self) -> String {
        match self {
            Self::UnknownTool(m)
            | Self::InvalidInput(m)
            | Self::MissingParameter(m)
            | Self::Filesystem(m)
            | Self::NotFound(m)
            | Self::PathEscape(m)
            | Self::DuplicateAppend(m)
            | Self::ReadOnlyPath(m)
            | Self::Connection(m)
            | Self::Protocol(m) => m.clone(),
            Self::NotPermitted { tool, .. } => tool.clone(),
        }
    }

    /// Errors that end the phase instead of being handed back to the model.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::PathEscape(_) | Self::Protocol(_)
        )
    }
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::Filesystem(err.to_string()),
        }
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Errors that can occur while an agent works on its phase.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Iteration budget of {iterations} exhausted{}", issue_suffix(.last_issue))]
    BudgetExceeded {
        iterations: usize,
        last_issue: Option<String>,
    },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Invalid input artifact: {0}")]
    InvalidInput(String),
}

fn issue_suffix(issue: &Option<String>) -> String {
    issue
        .as_ref()
        .map(|i| format!(" (last issue: {i})"))
        .unwrap_or_default()
}

/// User-visible classification of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Filesystem,
    NotFound,
    PermissionError,
    SyntaxValidationFailure,
    BudgetExceeded,
    Connection,
    Cancelled,
    Provider,
    InsufficientTests,
    InvalidArtifact,
}

impl ErrorKind {
    /// Map a tool error onto the run-level taxonomy.
    pub fn of_tool_error(err: &ToolError) -> Self {
        match err {
            ToolError::NotFound(_) => Self::NotFound,
            ToolError::PathEscape(_) | ToolError::NotPermitted { .. } | ToolError::ReadOnlyPath(_) => {
                Self::PermissionError
            }
            ToolError::Connection(_) | ToolError::Protocol(_) => Self::Connection,
            _ => Self::Filesystem,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Filesystem => "FilesystemError",
            Self::NotFound => "NotFoundError",
            Self::PermissionError => "PermissionError",
            Self::SyntaxValidationFailure => "SyntaxValidationFailure",
            Self::BudgetExceeded => "BudgetExceeded",
            Self::Connection => "ConnectionError",
            Self::Cancelled => "Cancelled",
            Self::Provider => "ProviderError",
            Self::InsufficientTests => "InsufficientTests",
            Self::InvalidArtifact => "InvalidArtifact",
        };
        f.write_str(name)
    }
}

impl AgentError {
    /// Classify this failure for the pipeline result.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Provider(_) => ErrorKind::Provider,
            Self::Tool(err) => ErrorKind::of_tool_error(err),
            Self::BudgetExceeded { .. } => ErrorKind::BudgetExceeded,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InvalidInput(_) => ErrorKind::InvalidArtifact,
        }
    }
}

/// Errors surfaced by the pipeline orchestrator.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{phase} failed: {source}")]
    PhaseFailure {
        phase: PipelinePhase,
        #[source]
        source: AgentError,
    },

    #[error("{phase} failed: {found} test cases written, {required} required")]
    InsufficientTests {
        phase: PipelinePhase,
        found: usize,
        required: usize,
    },

    #[error("Tool server unavailable: {0}")]
    Connection(#[from] ToolError),

    #[error("Invalid pipeline transition from {from} to {to}")]
    InvalidTransition {
        from: PipelinePhase,
        to: PipelinePhase,
    },

    #[error("Failed to write usage report: {0}")]
    Report(String),
}

impl PipelineError {
    /// The phase the failure is attributed to.
    pub fn phase(&self) -> Option<PipelinePhase> {
        match self {
            Self::PhaseFailure { phase, .. } | Self::InsufficientTests { phase, .. } => Some(*phase),
            Self::InvalidTransition { from, .. } => Some(*from),
            Self::Connection(_) | Self::Report(_) => None,
        }
    }

    /// User-visible error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PhaseFailure { source, .. } => source.kind(),
            Self::InsufficientTests { .. } => ErrorKind::InsufficientTests,
            Self::Connection(_) => ErrorKind::Connection,
            Self::InvalidTransition { .. } => ErrorKind::InvalidArtifact,
            Self::Report(_) => ErrorKind::Filesystem,
        }
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_retryable() {
        assert!(ProviderError::RateLimited("wait 1s".to_string()).is_retryable());
        assert!(ProviderError::NetworkError("timeout".to_string()).is_retryable());
        assert!(ProviderError::Timeout(30000).is_retryable());
        assert!(!ProviderError::AuthError("invalid key".to_string()).is_retryable());
        assert!(!ProviderError::ModelNotFound("gpt-5".to_string()).is_retryable());
    }

    #[test]
    fn test_provider_error_api() {
        let err = ProviderError::api("Bad request", 400);
        match err {
            ProviderError::ApiError { message, status_code } => {
                assert_eq!(message, "Bad request");
                assert_eq!(status_code, Some(400));
            }
            _ => panic!("Expected ApiError"),
        }
    }

    #[test]
    fn test_tool_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let tool_err: ToolError = io_err.into();
        assert!(matches!(tool_err, ToolError::NotFound(_)));

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let tool_err: ToolError = io_err.into();
        assert!(matches!(tool_err, ToolError::Filesystem(_)));
    }

    #[test]
    fn test_tool_error_wire_roundtrip() {
        let errors = [
            ToolError::Filesystem("parent missing".to_string()),
            ToolError::NotFound("a.py".to_string()),
            ToolError::PathEscape("../x".to_string()),
            ToolError::UnknownTool("rm".to_string()),
            ToolError::ReadOnlyPath("pkg/models.py".to_string()),
        ];
        for err in errors {
            let rebuilt = ToolError::from_wire(err.kind(), err.detail());
            assert_eq!(rebuilt, err);
        }
    }

    #[test]
    fn test_tool_error_fatality() {
        assert!(ToolError::PathEscape("/etc".to_string()).is_fatal());
        assert!(ToolError::Connection("closed".to_string()).is_fatal());
        assert!(!ToolError::NotFound("x".to_string()).is_fatal());
        assert!(!ToolError::Filesystem("x".to_string()).is_fatal());
    }

    #[test]
    fn test_config_error_from_json() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("invalid json");
        let json_err = result.unwrap_err();
        let config_err: ConfigError = json_err.into();
        assert!(matches!(config_err, ConfigError::JsonError(_)));
    }

    #[test]
    fn test_agent_error_kind() {
        let err = AgentError::BudgetExceeded {
            iterations: 3,
            last_issue: Some("syntax".to_string()),
        };
        assert_eq!(err.kind(), ErrorKind::BudgetExceeded);
        assert!(err.to_string().contains("last issue: syntax"));

        let err: AgentError = ToolError::PathEscape("../etc".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::PermissionError);
    }

    #[test]
    fn test_phase_failure_display() {
        let err = PipelineError::PhaseFailure {
            phase: PipelinePhase::CodeGenPhase,
            source: AgentError::BudgetExceeded {
                iterations: 2,
                last_issue: None,
            },
        };
        assert_eq!(err.phase(), Some(PipelinePhase::CodeGenPhase));
        assert_eq!(err.kind(), ErrorKind::BudgetExceeded);
        assert!(err.to_string().starts_with("CodeGenPhase failed"));
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::Connection.to_string(), "ConnectionError");
        assert_eq!(ErrorKind::NotFound.to_string(), "NotFoundError");
    }
}
