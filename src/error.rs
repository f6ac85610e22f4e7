//! Error taxonomy for jSQL queries.
//!
//! Every failure of a query surfaces to the caller as one `JsqlError`.
//! Nothing is retried by the client.

use thiserror::Error;

/// Errors returned by [`JsqlClient`](crate::JsqlClient).
#[derive(Debug, Error)]
pub enum JsqlError {
    /// The connection to the gateway could not be established
    /// (refused, unreachable, connect timeout, TLS handshake failure).
    #[error("Connection failed: {0}")]
    Connect(#[source] std::io::Error),

    /// The TLS client configuration could not be built.
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// Reading from or writing to an established connection failed.
    #[error("Transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// The request envelope could not be serialized.
    #[error("Failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    /// The response bytes were not a valid JSON-RPC response.
    #[error("Failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    /// The response belongs to a different request.
    #[error("Response id {actual} does not match request id {expected}")]
    IdMismatch {
        /// Id of the request in flight
        expected: u64,
        /// Id carried by the response
        actual: u64,
    },

    /// The gateway reported an error; the message is the server's, verbatim.
    #[error("Server error: {0}")]
    Server(String),
}

/// Flat classification of a [`JsqlError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connect,
    Transport,
    Encode,
    Decode,
    IdMismatch,
    Server,
}

impl JsqlError {
    /// Which kind of failure this is.
    pub fn kind(&self) -> ErrorKind {
        match self {
            JsqlError::Connect(_) | JsqlError::Tls(_) => ErrorKind::Connect,
            JsqlError::Transport(_) => ErrorKind::Transport,
            JsqlError::Encode(_) => ErrorKind::Encode,
            JsqlError::Decode(_) => ErrorKind::Decode,
            JsqlError::IdMismatch { .. } => ErrorKind::IdMismatch,
            JsqlError::Server(_) => ErrorKind::Server,
        }
    }

    /// The server-supplied message, if the gateway reported an error.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            JsqlError::Server(message) => Some(message),
            _ => None,
        }
    }
}

impl From<std::io::Error> for JsqlError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::AddrNotAvailable => JsqlError::Connect(err),
            _ => JsqlError::Transport(err),
        }
    }
}

/// Result alias for jSQL operations.
pub type Result<T, E = JsqlError> = std::result::Result<T, E>;
