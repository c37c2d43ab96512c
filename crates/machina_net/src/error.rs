//! RPC-layer error types.

use std::time::Duration;

/// Errors that can occur in the RPC layer.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// NATS connection error (handshake, auth, TLS).
    #[error("NATS connection error: {0}")]
    Connect(#[from] async_nats::ConnectError),

    /// NATS subscription error (e.g. invalid subject pattern).
    #[error("NATS subscribe error: {0}")]
    Subscribe(#[from] async_nats::SubscribeError),

    /// NATS publish error.
    #[error("NATS publish error: {0}")]
    Publish(#[from] async_nats::PublishError),

    /// Any other transport failure (flush, closed reply stream, TLS setup).
    #[error("transport error: {0}")]
    Transport(String),

    /// No reply arrived within the deadline.
    #[error("no reply on {subject} within {timeout:?}")]
    Timeout {
        /// Subject the request was published on.
        subject: String,
        /// The effective (clamped) deadline.
        timeout: Duration,
    },

    /// The remote handler reported a failure in its reply body.
    #[error("remote error: {0}")]
    Remote(String),

    /// Malformed input rejected before any network I/O.
    #[error("validation error: {0}")]
    Validation(String),
}
