//! Error types for the callback server.

use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised while starting or stopping the callback server.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// The listening socket could not be bound
    #[error("Failed to bind callback server on {addr}: {message}")]
    Bind { addr: SocketAddr, message: String },

    /// No address reachable by devices could be determined for the callback URL
    #[error("No routable local address found for the callback URL")]
    NoRoutableAddress,

    /// The server task did not terminate cleanly
    #[error("Callback server shutdown failed: {0}")]
    Shutdown(String),
}
