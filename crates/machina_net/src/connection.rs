//! NATS connection management.
//!
//! Owns the single broker session shared by the request/reply client and
//! the queue-group server. Only this module drains and closes the session.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::RpcError;
use crate::shutdown::ShutdownCoordinator;
use crate::tls;

/// Connection settings for one broker session.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Token credential presented during the handshake.
    pub credential: String,
    /// Broker endpoint, `host:port`.
    pub endpoint: String,
    /// Disable TLS certificate verification. Never the default.
    pub skip_verify: bool,
}

impl ConnectConfig {
    /// Create a config with certificate verification enabled.
    #[must_use]
    pub fn new(credential: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            endpoint: endpoint.into(),
            skip_verify: false,
        }
    }

    /// Disable TLS certificate verification (test/dev use only).
    #[must_use]
    pub fn danger_skip_verify(mut self) -> Self {
        self.skip_verify = true;
        self
    }

    fn validate(&self) -> Result<(), RpcError> {
        if self.credential.is_empty() {
            return Err(RpcError::Validation("credential must not be empty".into()));
        }
        if self.endpoint.is_empty() {
            return Err(RpcError::Validation("endpoint must not be empty".into()));
        }
        Ok(())
    }

    fn url(&self) -> String {
        format!("tls://{}", self.endpoint)
    }
}

/// Liveness of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The transport is establishing or re-establishing the session.
    Connecting,
    /// The session is open and usable.
    Open,
    /// A drain is in progress; no new work is accepted.
    Draining,
    /// The session is fully drained and released.
    Closed,
}

/// Wrapper lifecycle, tracked independently of the transport's own
/// reconnect state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Open,
    Draining,
    Closed,
}

/// One broker session.
///
/// Cheaply cloneable; all clones share the same session. The request/reply
/// client and the queue-group server borrow the session through
/// [`Connection::client`] and must never close it. Only
/// [`Connection::drain`] does, after dependent subscriptions have been
/// told to stop.
#[derive(Debug, Clone)]
pub struct Connection {
    client: async_nats::Client,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl Connection {
    /// Establish a TLS session to the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Validation`] for an empty credential or
    /// endpoint, and [`RpcError::Connect`] if the transport handshake
    /// cannot complete.
    pub async fn open(config: ConnectConfig) -> Result<Self, RpcError> {
        config.validate()?;
        info!(endpoint = %config.endpoint, "connecting to NATS");
        let mut options =
            async_nats::ConnectOptions::with_token(config.credential.clone()).require_tls(true);
        if config.skip_verify {
            warn!("TLS certificate verification is disabled for this connection");
            options = options.tls_client_config(tls::insecure_client_config()?);
        }
        let client = options.connect(config.url()).await?;
        info!("NATS connection established");
        Ok(Self {
            client,
            lifecycle: Arc::new(Mutex::new(Lifecycle::Open)),
        })
    }

    /// Establish a session and register its drain with `shutdown`.
    ///
    /// Hooks run in LIFO order, so a connection opened later drains before
    /// one opened earlier. Nothing is registered when the connect fails.
    ///
    /// # Errors
    ///
    /// As [`Connection::open`].
    pub async fn open_managed(
        config: ConnectConfig,
        shutdown: &ShutdownCoordinator,
    ) -> Result<Self, RpcError> {
        let conn = Self::open(config).await?;
        let hook = conn.clone();
        shutdown.defer(move || async move { hook.drain().await });
        Ok(conn)
    }

    /// Returns a handle to the underlying NATS client.
    ///
    /// The handle is safe for concurrent use by any number of in-flight
    /// calls and subscriptions, but must not be used to close the session.
    #[must_use]
    pub fn client(&self) -> async_nats::Client {
        self.client.clone()
    }

    /// Current liveness of this session.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        match *self.lifecycle.lock() {
            Lifecycle::Draining => ConnectionState::Draining,
            Lifecycle::Closed => ConnectionState::Closed,
            Lifecycle::Open => match self.client.connection_state() {
                async_nats::connection::State::Connected => ConnectionState::Open,
                // Pending and disconnected both mean the transport is
                // working to re-establish the session.
                _ => ConnectionState::Connecting,
            },
        }
    }

    /// Gracefully drain and close the session: stop accepting new inbound
    /// work, flush in-flight outbound messages, and wait for the transport
    /// to confirm the drained state.
    ///
    /// Draining more than once is a no-op. A drain the transport does not
    /// confirm is logged, not fatal.
    pub async fn drain(&self) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle != Lifecycle::Open {
                return;
            }
            *lifecycle = Lifecycle::Draining;
        }
        info!("draining NATS connection");
        if let Err(e) = self.client.drain().await {
            warn!(error = %e, "transport did not confirm the drain");
        }
        *self.lifecycle.lock() = Lifecycle::Closed;
        info!("NATS connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_verifies_certificates_by_default() {
        let config = ConnectConfig::new("s3cr3t", "broker.internal:4222");
        assert_eq!(config.credential, "s3cr3t");
        assert_eq!(config.endpoint, "broker.internal:4222");
        assert!(!config.skip_verify);
    }

    #[test]
    fn test_config_skip_verify_is_an_explicit_opt_in() {
        let config = ConnectConfig::new("s3cr3t", "broker.internal:4222").danger_skip_verify();
        assert!(config.skip_verify);
    }

    #[test]
    fn test_config_rejects_empty_credential() {
        let err = ConnectConfig::new("", "broker.internal:4222")
            .validate()
            .unwrap_err();
        assert!(matches!(err, RpcError::Validation(_)));
    }

    #[test]
    fn test_config_rejects_empty_endpoint() {
        let err = ConnectConfig::new("s3cr3t", "").validate().unwrap_err();
        assert!(matches!(err, RpcError::Validation(_)));
    }

    #[test]
    fn test_config_url_uses_tls_scheme() {
        let config = ConnectConfig::new("s3cr3t", "broker.internal:4222");
        assert_eq!(config.url(), "tls://broker.internal:4222");
    }
}
