//! # machina_resource
//!
//! Typed lifecycle client for remote resources driven over the machina
//! RPC layer. A resource lives under a logical resource path; `create`
//! provisions an instance under a freshly generated id and the remaining
//! calls address that id. Replies are JSON objects; a non-object reply is
//! surfaced as the remote error it carries.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use machina_net::{ConnectConfig, Connection, RpcClient};
//! use machina_resource::{ResourceClient, ResourceRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let conn = Connection::open(ConnectConfig::new("s3cr3t", "broker.internal:4222")).await?;
//!     let resources = ResourceClient::new(RpcClient::new(&conn));
//!
//!     let request = ResourceRequest::new("svc.gpu")
//!         .with_payload(serde_json::json!({"profile": "a100"}));
//!     let created = resources.create(&request).await?;
//!     let state = resources.read(&request, &created.id).await?;
//!     println!("{state}");
//!     resources.delete(&request, &created.id).await?;
//!     Ok(())
//! }
//! ```

mod client;

pub use client::{
    CreatedResource, DEFAULT_TIMEOUT, ResourceClient, ResourceError, ResourceRequest,
};
