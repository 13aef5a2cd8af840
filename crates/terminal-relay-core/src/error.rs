//! Error types for Terminal Relay.

use thiserror::Error;

use crate::SessionId;

/// Main error type for Terminal Relay operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Session not found (unknown or already disposed id)
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Process failed to launch
    #[error("Launch failed: {0}")]
    Launch(String),

    /// PTY-related errors
    #[error("PTY error: {0}")]
    Pty(String),

    /// The session was disposed before a command result arrived
    #[error("Command request abandoned: session disposed before a result arrived")]
    CommandAbandoned,

    /// The client answered a command request with an error payload
    #[error("Command execution failed: {0}")]
    CommandFailed(serde_json::Value),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_not_found_error() {
        let err = Error::SessionNotFound(SessionId::new(7));
        assert_eq!(err.to_string(), "Session not found: 7");
    }

    #[test]
    fn test_launch_error() {
        let err = Error::Launch("no such shell: /bin/zzsh".to_string());
        assert_eq!(err.to_string(), "Launch failed: no such shell: /bin/zzsh");
    }

    #[test]
    fn test_pty_error() {
        let err = Error::Pty("openpty failed".to_string());
        assert_eq!(err.to_string(), "PTY error: openpty failed");
    }

    #[test]
    fn test_command_failed_error() {
        let err = Error::CommandFailed(serde_json::json!({"message": "denied"}));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_config_error() {
        let err = Error::Config("session.grace_ms must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: session.grace_ms must be > 0"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<i32>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_result_type() {
        let success: Result<i32> = Ok(42);
        assert!(success.is_ok());

        let failure: Result<i32> = Err(Error::CommandAbandoned);
        assert!(failure.is_err());
    }
}
