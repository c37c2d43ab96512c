//! CRUD subject convention.
//!
//! Maps a logical resource path, an instance identifier, and an operation
//! kind onto one wire subject, and validates the reply shape of the four
//! lifecycle operations.
//!
//! Subjects are `<resource_path><infix><id>`. The four infixes are fixed
//! wire constants and pairwise distinct, so two operations on the same
//! resource path never collide even for equal ids.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;

use crate::client::RpcClient;
use crate::error::RpcError;

/// Wire infix for create subjects.
pub const CREATE_INFIX: &str = ".create_";
/// Wire infix for read subjects. Deployed workers expect exactly this
/// spelling; do not regularise it.
pub const READ_INFIX: &str = ".readxx_";
/// Wire infix for update subjects.
pub const UPDATE_INFIX: &str = ".update_";
/// Wire infix for delete subjects.
pub const DELETE_INFIX: &str = ".delete_";

/// The four remote lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Provision a new resource instance.
    Create,
    /// Refresh the state of an existing instance.
    Read,
    /// Modify an existing instance in place.
    Update,
    /// Tear an instance down.
    Delete,
}

impl Operation {
    /// All operations, in lifecycle order.
    pub const ALL: [Operation; 4] = [
        Operation::Create,
        Operation::Read,
        Operation::Update,
        Operation::Delete,
    ];

    /// The wire infix placed between resource path and id.
    #[must_use]
    pub fn infix(self) -> &'static str {
        match self {
            Operation::Create => CREATE_INFIX,
            Operation::Read => READ_INFIX,
            Operation::Update => UPDATE_INFIX,
            Operation::Delete => DELETE_INFIX,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Build the wire subject for one operation on one resource instance.
#[must_use]
pub fn subject_for(resource_path: &str, operation: Operation, id: &str) -> String {
    format!("{resource_path}{}{id}", operation.infix())
}

/// [`subject_for`] behind the non-empty resource path precondition.
fn validated_subject(resource_path: &str, operation: Operation, id: &str) -> Result<String, RpcError> {
    if resource_path.is_empty() {
        return Err(RpcError::Validation("resource path must not be empty".into()));
    }
    Ok(subject_for(resource_path, operation, id))
}

/// Success replies are JSON objects; anything else is the remote error
/// message, verbatim. Empty replies are always remote errors.
fn check_reply(reply: &[u8]) -> Result<(), RpcError> {
    if reply.first() == Some(&b'{') {
        Ok(())
    } else {
        Err(RpcError::Remote(String::from_utf8_lossy(reply).into_owned()))
    }
}

impl RpcClient {
    /// Invoke one lifecycle operation on a remote resource instance.
    ///
    /// The resource path is validated before any subject is constructed or
    /// network I/O attempted; then [`RpcClient::call`] runs on the
    /// computed subject and the reply shape is checked.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Validation`] for an empty resource path,
    /// [`RpcError::Remote`] when the reply is empty or does not open a
    /// JSON object (the message is the literal reply body), plus any
    /// error [`RpcClient::call`] can produce.
    pub async fn invoke(
        &self,
        resource_path: &str,
        operation: Operation,
        id: &str,
        payload: impl Into<Bytes>,
        timeout: Duration,
    ) -> Result<Bytes, RpcError> {
        let subject = validated_subject(resource_path, operation, id)?;
        let reply = self.call(&subject, payload, timeout).await?;
        check_reply(&reply)?;
        Ok(reply)
    }
}
