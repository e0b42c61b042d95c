//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout askdb.
//! Every error maps to a stable error code so that the HTTP and MCP surfaces
//! can report it without string matching.
//!
//! # Error Categories
//! - `ClientInput`: Missing question, missing connect fields, malformed requests
//! - `NoActiveConnection`: An operation needs a connection and none is open
//! - `ConnectionFailed`: Auth, network or TLS failure while connecting
//! - `GenerationFailed`: The SQL generation model call failed
//! - `ExecutionFailed`: The database rejected or failed the statement
//! - `SynthesisFailed`: The answer synthesis model call failed
//! - `CapabilityViolation`: The statement policy refused the statement
//! - `ConfigError`: Configuration file or environment errors

use thiserror::Error;

/// Main error type for askdb operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AskError {
    /// Missing or malformed input from the caller
    #[error("{0}")]
    ClientInput(String),

    /// No database is connected
    #[error("No active database connection. Connect to a database first.")]
    NoActiveConnection,

    /// Database connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// SQL generation model call failed
    #[error("SQL generation failed: {0}")]
    GenerationFailed(String),

    /// Statement execution failed
    #[error("Error running query: {0}")]
    ExecutionFailed(String),

    /// Answer synthesis model call failed
    #[error("Answer synthesis failed: {0}")]
    SynthesisFailed(String),

    /// Statement blocked by the execution policy
    #[error("Capability violation: {0}")]
    CapabilityViolation(String),

    /// Configuration error (file not found, invalid JSON, missing env var, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AskError {
    /// Convert error to error code string for JSON output
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ClientInput(_) => "CLIENT_INPUT",
            Self::NoActiveConnection => "NO_ACTIVE_CONNECTION",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::GenerationFailed(_) => "GENERATION_FAILED",
            Self::ExecutionFailed(_) => "EXECUTION_FAILED",
            Self::SynthesisFailed(_) => "SYNTHESIS_FAILED",
            Self::CapabilityViolation(_) => "CAPABILITY_VIOLATION",
            Self::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// HTTP status code the error maps to on the HTTP surface
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::ClientInput(_) | Self::NoActiveConnection => 400,
            Self::CapabilityViolation(_) => 403,
            _ => 500,
        }
    }

    /// Human-readable message, safe for client output
    ///
    /// Never contains credentials; engine messages are passed through as-is.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn client_input(message: impl Into<String>) -> Self {
        Self::ClientInput(message.into())
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    pub fn generation_failed(message: impl Into<String>) -> Self {
        Self::GenerationFailed(message.into())
    }

    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed(message.into())
    }

    pub fn synthesis_failed(message: impl Into<String>) -> Self {
        Self::SynthesisFailed(message.into())
    }

    pub fn capability_violation(message: impl Into<String>) -> Self {
        Self::CapabilityViolation(message.into())
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }
}

/// Result type alias for askdb operations
pub type Result<T> = std::result::Result<T, AskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AskError::client_input("x").error_code(), "CLIENT_INPUT");
        assert_eq!(AskError::NoActiveConnection.error_code(), "NO_ACTIVE_CONNECTION");
        assert_eq!(AskError::connection_failed("x").error_code(), "CONNECTION_FAILED");
        assert_eq!(AskError::generation_failed("x").error_code(), "GENERATION_FAILED");
        assert_eq!(AskError::execution_failed("x").error_code(), "EXECUTION_FAILED");
        assert_eq!(AskError::synthesis_failed("x").error_code(), "SYNTHESIS_FAILED");
        assert_eq!(AskError::capability_violation("x").error_code(), "CAPABILITY_VIOLATION");
        assert_eq!(AskError::config_error("x").error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(AskError::client_input("x").http_status(), 400);
        assert_eq!(AskError::NoActiveConnection.http_status(), 400);
        assert_eq!(AskError::capability_violation("x").http_status(), 403);
        assert_eq!(AskError::execution_failed("x").http_status(), 500);
        assert_eq!(AskError::connection_failed("x").http_status(), 500);
    }

    #[test]
    fn test_error_messages_carry_cause() {
        let err = AskError::execution_failed("Unknown column 'Foo' in 'field list'");
        assert!(err.message().contains("Unknown column 'Foo'"));

        let err = AskError::NoActiveConnection;
        assert!(err.message().contains("No active database connection"));

        let err = AskError::client_input("No question provided");
        assert_eq!(err.message(), "No question provided");
    }
}
