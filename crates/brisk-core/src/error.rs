//! Error types for brisk-core

use std::net::SocketAddr;
use thiserror::Error;

/// Result type alias for brisk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the brisk HTTP server
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid HTTP method
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Listen address could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Listening socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// `start`/`run` called before `listen`
    #[error("Server is not listening; call listen() first")]
    NotListening,

    /// `start`/`run` called on a server that is already accepting
    #[error("Server is already running")]
    AlreadyRunning,

    /// `start`/`run` called after `stop`
    #[error("Server has been stopped")]
    Stopped,

    /// Execution context could not be created
    #[error("Runtime error: {0}")]
    Runtime(#[source] std::io::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS error
    #[cfg(feature = "tls")]
    #[error("TLS error: {0}")]
    Tls(String),
}
