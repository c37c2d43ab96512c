//! # machina_net
//!
//! RPC layer for remote machine control, built over NATS pub/sub.
//!
//! This crate provides:
//!
//! - [`connection`] — broker session management with graceful drain.
//! - [`client`] — synchronous request/reply calls with per-call timeouts.
//! - [`server`] — queue-group handler registration with panic containment.
//! - [`crud`] — the CRUD subject convention and reply-shape validation.
//! - [`shutdown`] — LIFO release-hook coordination for process teardown.
//! - [`error`] — RPC-layer error types.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use machina_net::{
//!     ConnectConfig, Connection, Operation, RpcClient, RpcServer, ShutdownCoordinator,
//! };
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), machina_net::RpcError> {
//!     let shutdown = ShutdownCoordinator::new();
//!     let conn = Connection::open_managed(
//!         ConnectConfig::new("s3cr3t", "broker.internal:4222"),
//!         &shutdown,
//!     )
//!     .await?;
//!
//!     let server = RpcServer::new(&conn);
//!     let sub = server
//!         .serve("svc.gpu.*", |_subject, _payload| async {
//!             Bytes::from_static(b"{\"ok\":true}")
//!         })
//!         .await?;
//!
//!     let client = RpcClient::new(&conn);
//!     let reply = client
//!         .invoke("svc.gpu", Operation::Create, "abc123", "{}", Duration::from_secs(2))
//!         .await?;
//!     println!("{}", String::from_utf8_lossy(&reply));
//!
//!     sub.stop();
//!     shutdown.run().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod connection;
pub mod crud;
pub mod error;
pub mod server;
pub mod shutdown;

mod tls;

pub use client::{MIN_CALL_TIMEOUT, RpcClient, clamp_timeout};
pub use connection::{ConnectConfig, Connection, ConnectionState};
pub use crud::{Operation, subject_for};
pub use error::RpcError;
pub use server::{DEFAULT_QUEUE_GROUP, RpcServer, Subscription, SubscriptionState};
pub use shutdown::ShutdownCoordinator;
