//! Mail source error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("IMAP connection failed: {0}")]
    ConnectionFailed(String),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("IMAP protocol error: {0}")]
    ProtocolError(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("IMAP folder '{0}' not found")]
    FolderNotFound(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Mail operation timed out after {0}s")]
    Timeout(u64),
}

impl From<async_native_tls::Error> for MailError {
    fn from(err: async_native_tls::Error) -> Self {
        MailError::TlsError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MailError>;
