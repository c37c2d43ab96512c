//! Resource lifecycle client.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use machina_net::{Operation, RpcClient, RpcError};

/// Per-call timeout applied when a request does not override it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from driving a resource lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// Failure in the underlying RPC layer: validation, transport,
    /// timeout, or a remote error body.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// The reply opened like a JSON object but did not parse as one.
    #[error("malformed JSON reply: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One lifecycle request: a logical resource path plus payload and timeout
/// overrides.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    resource_path: String,
    payload: Value,
    timeout: Duration,
}

impl ResourceRequest {
    /// Request on `resource_path` with an empty `{}` payload and the
    /// default timeout.
    #[must_use]
    pub fn new(resource_path: impl Into<String>) -> Self {
        Self {
            resource_path: resource_path.into(),
            payload: Value::Object(serde_json::Map::new()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Replace the `{}` payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Override the default timeout. Values below one second are raised to
    /// one second by the RPC layer.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The logical resource path.
    #[must_use]
    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    /// The JSON payload sent with each call.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn payload_bytes(&self) -> Result<Vec<u8>, ResourceError> {
        Ok(serde_json::to_vec(&self.payload)?)
    }
}

/// The id and reply produced by a successful create.
#[derive(Debug, Clone)]
pub struct CreatedResource {
    /// Generated instance identifier; pass it to read/update/delete.
    pub id: String,
    /// Parsed JSON reply from the remote handler.
    pub reply: Value,
}

/// Drives remote resource lifecycles over an injected [`RpcClient`].
#[derive(Debug, Clone)]
pub struct ResourceClient {
    rpc: RpcClient,
}

impl ResourceClient {
    /// Create a lifecycle client over an RPC client.
    #[must_use]
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    /// Provision a new resource instance under a freshly generated id.
    ///
    /// # Errors
    ///
    /// Any [`RpcError`] from the invocation, or [`ResourceError::Decode`]
    /// if the reply is not a well-formed JSON object.
    pub async fn create(&self, request: &ResourceRequest) -> Result<CreatedResource, ResourceError> {
        let id = generate_id();
        debug!(resource = request.resource_path(), id, "creating resource");
        let reply = self.invoke(request, Operation::Create, &id).await?;
        Ok(CreatedResource { id, reply })
    }

    /// Refresh the remote state of an existing instance.
    ///
    /// # Errors
    ///
    /// As [`ResourceClient::create`].
    pub async fn read(&self, request: &ResourceRequest, id: &str) -> Result<Value, ResourceError> {
        self.invoke(request, Operation::Read, id).await
    }

    /// Modify an existing instance in place.
    ///
    /// # Errors
    ///
    /// As [`ResourceClient::create`].
    pub async fn update(&self, request: &ResourceRequest, id: &str) -> Result<Value, ResourceError> {
        self.invoke(request, Operation::Update, id).await
    }

    /// Tear an instance down, discarding the reply body.
    ///
    /// # Errors
    ///
    /// As [`ResourceClient::create`].
    pub async fn delete(&self, request: &ResourceRequest, id: &str) -> Result<(), ResourceError> {
        self.invoke(request, Operation::Delete, id).await.map(|_| ())
    }

    async fn invoke(
        &self,
        request: &ResourceRequest,
        operation: Operation,
        id: &str,
    ) -> Result<Value, ResourceError> {
        let payload = request.payload_bytes()?;
        let reply = self
            .rpc
            .invoke(
                request.resource_path(),
                operation,
                id,
                payload,
                request.timeout(),
            )
            .await?;
        Ok(serde_json::from_slice(&reply)?)
    }
}

/// Fresh instance identifier for a created resource.
fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_defaults() {
        let request = ResourceRequest::new("svc.gpu");
        assert_eq!(request.resource_path(), "svc.gpu");
        assert_eq!(request.payload().to_string(), "{}");
        assert_eq!(request.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_request_overrides() {
        let request = ResourceRequest::new("svc.gpu")
            .with_payload(json!({"profile": "a100"}))
            .with_timeout(Duration::from_secs(5));
        assert_eq!(request.payload()["profile"], "a100");
        assert_eq!(request.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_payload_serialises_to_an_object() {
        let request = ResourceRequest::new("svc.gpu");
        let bytes = request.payload_bytes().unwrap();
        assert_eq!(bytes.first(), Some(&b'{'));
    }

    #[test]
    fn test_generated_ids_are_unique_and_subject_safe() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        for id in [&a, &b] {
            assert!(!id.is_empty());
            // Ids become one subject token; separators would change the
            // wire shape.
            assert!(!id.contains(['.', ' ', '*', '>']));
        }
    }
}
