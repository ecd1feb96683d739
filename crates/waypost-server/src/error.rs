//! Error types for the transport.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Accepting a connection failed.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, ServerError>;
