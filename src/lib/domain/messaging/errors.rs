//! Error types for the messaging module

use std::{io, path::PathBuf};

use thiserror::Error;
use tracing::debug;

use super::EmailAddressError;

/// Errors that can occur when constructing a [`Message`](super::Message)
#[derive(Debug, Error)]
pub enum MessageError {
    /// No sender address was given
    #[error("a sender address is required")]
    MissingSender,

    /// The recipient list is empty
    #[error("at least one recipient is required")]
    NoRecipients,

    /// A sender or recipient address is invalid
    #[error(transparent)]
    InvalidAddress(#[from] EmailAddressError),

    /// The message template could not be loaded
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Errors raised while loading message templates
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template root directory does not exist
    #[error("template directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// A template file exists but could not be read
    #[error("could not read template {path}: {source}")]
    Read {
        /// The template file
        path: PathBuf,

        /// The underlying I/O error
        source: io::Error,
    },
}

/// Errors returned by a [`Transport`](super::Transport) when a delivery attempt fails
#[derive(Debug, Error)]
pub enum TransportError {
    /// The message could not be converted into the transport's native format
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The sender or a recipient address was rejected
    #[error("invalid email address")]
    InvalidAddress,

    /// The remote service answered with a non-success status
    #[error("message rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code
        status: u16,

        /// Response body, if any
        body: String,
    },

    /// Unknown error
    #[error(transparent)]
    UnknownError(anyhow::Error),
}

impl From<anyhow::Error> for TransportError {
    fn from(err: anyhow::Error) -> Self {
        TransportError::UnknownError(err)
    }
}

impl From<lettre::address::AddressError> for TransportError {
    fn from(_err: lettre::address::AddressError) -> Self {
        debug!("AddressError -> TransportError");

        TransportError::InvalidAddress
    }
}

impl From<lettre::error::Error> for TransportError {
    fn from(err: lettre::error::Error) -> Self {
        debug!("lettre::error::Error -> TransportError");

        TransportError::InvalidMessage(err.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for TransportError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        debug!("lettre::transport::smtp::Error -> TransportError");

        TransportError::UnknownError(err.into())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        debug!("reqwest::Error -> TransportError");

        TransportError::UnknownError(err.into())
    }
}

/// Configuration errors, raised when a transport is selected or constructed
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configured transport kind is not supported
    #[error("unsupported transport kind: {0}")]
    UnknownTransport(String),

    /// A setting required by the selected transport is missing
    #[error("missing required setting: {0}")]
    MissingSetting(&'static str),

    /// A setting has an unusable value
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting {
        /// The setting name
        name: &'static str,

        /// Why the value was rejected
        reason: String,
    },
}

/// Errors raised by the on-disk message spool
#[derive(Debug, Error)]
pub enum SpoolError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A message could not be serialized or deserialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The spool path exists but is not a directory
    #[error("spool path is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Errors raised by the [`DispatchWorker`](super::DispatchWorker) lifecycle
#[derive(Debug, Error)]
pub enum WorkerError {
    /// `start` was called while the worker was not stopped
    #[error("dispatch worker is already running")]
    AlreadyRunning,

    /// The spill to disk could not run at all
    #[error(transparent)]
    Spool(#[from] SpoolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let spool_err: SpoolError = io_err.into();

        assert!(matches!(spool_err, SpoolError::Io(_)));
        assert!(spool_err.to_string().contains("access denied"));
    }

    #[test]
    fn test_address_error_conversion() {
        let err = "not an address"
            .parse::<lettre::Address>()
            .expect_err("address should not parse");

        assert!(matches!(
            TransportError::from(err),
            TransportError::InvalidAddress
        ));
    }

    #[test]
    fn test_unknown_transport_message() {
        let err = ConfigError::UnknownTransport("pigeon".to_string());

        assert_eq!(err.to_string(), "unsupported transport kind: pigeon");
    }
}
