//! Request/reply client.
//!
//! Builds synchronous call semantics from the pub/sub primitives: each
//! call publishes with a fresh inbox as the reply subject and awaits
//! exactly one reply on it, bounded by a deadline. Because the inbox is a
//! plain subscription, an unanswered request runs to its deadline and
//! surfaces as a timeout, never as an immediate no-responder failure.

use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tracing::debug;

use crate::connection::Connection;
use crate::error::RpcError;

/// Callers may not go below this deadline; see [`clamp_timeout`].
pub const MIN_CALL_TIMEOUT: Duration = Duration::from_secs(1);

/// Raise a caller-supplied timeout to the one-second floor.
///
/// Guards against zero or near-zero deadlines failing spuriously under
/// normal network jitter.
#[must_use]
pub fn clamp_timeout(timeout: Duration) -> Duration {
    timeout.max(MIN_CALL_TIMEOUT)
}

/// Issues correlated requests over a shared [`Connection`].
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: async_nats::Client,
}

impl RpcClient {
    /// Create a client on an open connection.
    #[must_use]
    pub fn new(conn: &Connection) -> Self {
        Self {
            client: conn.client(),
        }
    }

    /// Send `payload` on `subject` and wait for a single reply.
    ///
    /// Exactly one reply is consumed per call; the correlation inbox is
    /// unsubscribed afterwards, so late duplicates are dropped by the
    /// transport.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Timeout`] if no reply arrives within the
    /// (clamped) timeout, and [`RpcError::Publish`] or
    /// [`RpcError::Transport`] if the send itself cannot be delivered.
    pub async fn call(
        &self,
        subject: &str,
        payload: impl Into<Bytes>,
        timeout: Duration,
    ) -> Result<Bytes, RpcError> {
        let timeout = clamp_timeout(timeout);
        let inbox = self.client.new_inbox();
        let mut replies = self.client.subscribe(inbox.clone()).await?;
        self.client
            .publish_with_reply(subject.to_string(), inbox, payload.into())
            .await?;
        self.client
            .flush()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let reply = tokio::time::timeout(timeout, replies.next()).await;
        let _ = replies.unsubscribe().await;
        match reply {
            Ok(Some(msg)) => Ok(msg.payload),
            Ok(None) => Err(RpcError::Transport(
                "reply subscription closed before a reply arrived".into(),
            )),
            Err(_) => {
                debug!(subject, ?timeout, "call timed out");
                Err(RpcError::Timeout {
                    subject: subject.to_string(),
                    timeout,
                })
            }
        }
    }
}
