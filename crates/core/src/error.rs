use serde::{Deserialize, Serialize};
use std::io;

/// Errors that can occur while bridging operations to the build tool
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The build tool reported a failure; the message is passed through verbatim.
    #[error("{0}")]
    ToolFailure(String),

    #[error("Resolution error: {0}")]
    ResolutionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    ArchiveError(#[from] zip::result::ZipError),

    #[error("{0}")]
    Other(String),
}

/// Error classes reported to callers on the `Error` frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    Connection,
    ToolFailure,
    ResolutionFailure,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ValidationError(_) => ErrorKind::Validation,
            Error::ConnectionError(_) | Error::ConnectionLost(_) | Error::IoError(_) => {
                ErrorKind::Connection
            }
            Error::ToolFailure(_) => ErrorKind::ToolFailure,
            Error::ResolutionError(_) => ErrorKind::ResolutionFailure,
            Error::ConfigError(_)
            | Error::ProtocolError(_)
            | Error::StateError(_)
            | Error::SerializationError(_)
            | Error::ArchiveError(_)
            | Error::Other(_) => ErrorKind::Internal,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::ValidationError(message.into())
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Error::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(
            Error::ConnectionLost("gone".into()).kind(),
            ErrorKind::Connection
        );
        assert_eq!(
            Error::ResolutionError("none".into()).kind(),
            ErrorKind::ResolutionFailure
        );
        assert_eq!(
            Error::ProtocolError("bad".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_tool_failure_message_is_verbatim() {
        let err = Error::ToolFailure("Task 'foo' not found in root project".into());
        assert_eq!(err.to_string(), "Task 'foo' not found in root project");
    }
}
