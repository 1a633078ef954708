//! bsftp Error Types

use russh_sftp::protocol::StatusCode;
use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Configuration serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Invalid host key: {0}")]
    HostKey(String),

    // File operation errors
    #[error("Operation not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("Object does not exist: {0}")]
    NotExist(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("End of data")]
    EndOfData,

    #[error("Write at offset {offset} is below the flushed watermark {flushed}")]
    OffsetFlushed { offset: u64, flushed: u64 },

    #[error("Write at offset {0} exceeds the maximum object size")]
    InvalidOffset(u64),

    #[error("Stream already closed")]
    Closed,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    // Session errors
    #[error("Unsupported channel type: {0}")]
    UnsupportedChannelType(String),

    #[error("Unsupported subsystem: {0}")]
    UnsupportedSubsystem(String),

    #[error("Authentication failed for user {0}")]
    AuthenticationFailure(String),

    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if the backend reported the addressed object as absent
    pub fn is_not_exist(&self) -> bool {
        matches!(self, Error::NotExist(_))
    }

    /// Check if this error originated from the storage backend,
    /// including cancellation of an in-flight backend call
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Error::Backend(_) | Error::NotExist(_) | Error::Cancelled
        )
    }
}

impl From<Error> for StatusCode {
    fn from(err: Error) -> Self {
        match err {
            Error::NotExist(_) => StatusCode::NoSuchFile,
            Error::NotImplemented(_) => StatusCode::OpUnsupported,
            Error::EndOfData => StatusCode::Eof,
            Error::InvalidHandle(_) => StatusCode::BadMessage,
            _ => StatusCode::Failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            StatusCode::from(Error::NotExist("a.txt".into())),
            StatusCode::NoSuchFile
        );
        assert_eq!(
            StatusCode::from(Error::NotImplemented("rename")),
            StatusCode::OpUnsupported
        );
        assert_eq!(StatusCode::from(Error::EndOfData), StatusCode::Eof);
        assert_eq!(
            StatusCode::from(Error::Backend("timeout".into())),
            StatusCode::Failure
        );
    }

    #[test]
    fn test_backend_classification() {
        assert!(Error::Cancelled.is_backend());
        assert!(Error::NotExist("x".into()).is_not_exist());
        assert!(!Error::NotImplemented("remove").is_backend());
    }
}
