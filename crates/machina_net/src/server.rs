//! Queue-group server.
//!
//! Registers handlers as members of a named queue group and turns their
//! return values into replies. Each inbound message is dispatched on its
//! own task; a panicking handler is contained at the dispatch boundary and
//! produces no reply, so its caller observes a timeout rather than a
//! crash, and the hosting process keeps serving.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::connection::Connection;
use crate::error::RpcError;

/// Queue group shared by all replicas that load-balance a subject pattern.
pub const DEFAULT_QUEUE_GROUP: &str = "default";

/// Handler invoked once per inbound message with `(subject, payload)`.
type Handler = Arc<dyn Fn(String, Bytes) -> BoxFuture<'static, Bytes> + Send + Sync>;

/// Registers queue-group handlers on a shared [`Connection`].
#[derive(Debug, Clone)]
pub struct RpcServer {
    client: async_nats::Client,
}

/// Liveness of a [`Subscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Receiving and dispatching messages.
    Active,
    /// Stop was requested; in-flight handlers are finishing.
    Draining,
    /// Unsubscribed, with all in-flight handlers done.
    Closed,
}

/// One active queue-group registration.
///
/// The registration runs until [`Subscription::stop`] is called; dropping
/// the handle also requests a stop.
pub struct Subscription {
    pattern: String,
    group: String,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    state: Arc<Mutex<SubscriptionState>>,
}

impl RpcServer {
    /// Create a server on an open connection.
    #[must_use]
    pub fn new(conn: &Connection) -> Self {
        Self {
            client: conn.client(),
        }
    }

    /// Register `handler` on `pattern` in the default queue group.
    ///
    /// # Errors
    ///
    /// As [`RpcServer::serve_in_group`].
    pub async fn serve<F, Fut>(&self, pattern: &str, handler: F) -> Result<Subscription, RpcError>
    where
        F: Fn(String, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Bytes> + Send + 'static,
    {
        self.serve_in_group(pattern, DEFAULT_QUEUE_GROUP, handler).await
    }

    /// Register `handler` on `pattern` as a member of `group`.
    ///
    /// Every registrant of the same `(pattern, group)` pair shares one
    /// load-balanced stream: the transport delivers each matching message
    /// to exactly one member. Each message is dispatched on its own task,
    /// so a slow or blocked handler never stalls delivery of the next
    /// message on the same registration.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Subscribe`] if the transport rejects the
    /// registration (e.g. invalid pattern syntax). The failure is isolated
    /// to this registration; others keep running.
    pub async fn serve_in_group<F, Fut>(
        &self,
        pattern: &str,
        group: &str,
        handler: F,
    ) -> Result<Subscription, RpcError>
    where
        F: Fn(String, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Bytes> + Send + 'static,
    {
        let subscriber = self
            .client
            .queue_subscribe(pattern.to_string(), group.to_string())
            .await?;
        info!(pattern, group, "queue-group handler registered");

        let handler: Handler = Arc::new(move |subject, payload| handler(subject, payload).boxed());
        let (stop_tx, stop_rx) = oneshot::channel();
        let state = Arc::new(Mutex::new(SubscriptionState::Active));

        tokio::spawn(dispatch_loop(
            self.client.clone(),
            subscriber,
            handler,
            stop_rx,
            Arc::clone(&state),
            pattern.to_string(),
        ));

        Ok(Subscription {
            pattern: pattern.to_string(),
            group: group.to_string(),
            stop: Mutex::new(Some(stop_tx)),
            state,
        })
    }
}

impl Subscription {
    /// The subject pattern this registration matches.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The queue group this registration belongs to.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Current liveness of this registration.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        *self.state.lock()
    }

    /// Request a drain of this registration.
    ///
    /// Idempotent: the first call signals the dispatch loop to unsubscribe
    /// and let in-flight handlers finish in the background; later calls,
    /// and calls after the connection has already closed, do nothing.
    /// Completion is observable via [`Subscription::state`].
    pub fn stop(&self) {
        if let Some(tx) = self.stop.lock().take() {
            // The loop may already be gone if the connection closed first.
            let _ = tx.send(());
        }
    }
}

/// Receive messages until stopped, dispatching each on its own task.
async fn dispatch_loop(
    client: async_nats::Client,
    mut subscriber: async_nats::Subscriber,
    handler: Handler,
    mut stop_rx: oneshot::Receiver<()>,
    state: Arc<Mutex<SubscriptionState>>,
    pattern: String,
) {
    let mut in_flight = JoinSet::new();
    loop {
        tokio::select! {
            // Fires on an explicit stop and when the handle is dropped.
            _ = &mut stop_rx => break,
            // Reap finished handler tasks as we go.
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            next = subscriber.next() => match next {
                Some(msg) => {
                    let client = client.clone();
                    let handler = Arc::clone(&handler);
                    in_flight.spawn(dispatch(client, handler, msg));
                }
                // Stream ended underneath us: connection closed or drained.
                None => break,
            },
        }
    }

    *state.lock() = SubscriptionState::Draining;
    debug!(pattern, "draining queue-group subscription");
    if let Err(e) = subscriber.unsubscribe().await {
        debug!(pattern, error = %e, "unsubscribe after stop failed");
    }
    while in_flight.join_next().await.is_some() {}
    *state.lock() = SubscriptionState::Closed;
    info!(pattern, "queue-group subscription closed");
}

/// Run the handler for one message and reply with its result.
///
/// Faults are contained here: a panic is logged with the originating
/// subject and no reply is sent, so the requester times out instead of
/// seeing a crash. A failed reply publish after a successful handler run
/// is likewise logged, not propagated.
async fn dispatch(client: async_nats::Client, handler: Handler, msg: async_nats::Message) {
    let subject = msg.subject.as_str().to_string();
    let reply_to = msg.reply;
    let payload = msg.payload;

    let outcome = AssertUnwindSafe(async { handler(subject.clone(), payload).await })
        .catch_unwind()
        .await;

    let reply = match outcome {
        Ok(reply) => reply,
        Err(panic) => {
            error!(
                subject,
                panic = panic_message(panic.as_ref()),
                "handler panicked; no reply sent"
            );
            return;
        }
    };

    let Some(reply_to) = reply_to else {
        debug!(subject, "request carried no reply subject");
        return;
    };
    if let Err(e) = client.publish(reply_to, reply).await {
        warn!(subject, error = %e, "failed to publish reply");
    }
}

/// Best-effort text of a panic payload.
fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "opaque panic payload"
    }
}
