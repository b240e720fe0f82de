//! Error types.
//!
//! Three worlds, kept deliberately separate:
//!
//! - [`RpcError`] — the single tagged error the dispatcher and application
//!   code raise: a numeric code, a message, an optional payload. This is the
//!   only shape a client ever sees.
//! - [`SchemaError`] — what a schema's `parse` raises. A distinct kind: the
//!   core propagates it untouched and never converts it into an [`RpcError`];
//!   that classification happens once, at the transport boundary.
//! - [`Error`] — infrastructure failures of the server itself: binding a
//!   port, accepting a connection. Never crosses the wire.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── RpcError ─────────────────────────────────────────────────────────────────

/// The tagged error raised by dispatch and by application handlers.
///
/// The dispatcher itself only ever produces two codes — 404 for an
/// unresolved path segment and 400 for segments trailing past a procedure.
/// Handlers and middleware raise it with any code they like:
///
/// ```rust
/// use tansu::RpcError;
///
/// let err = RpcError::new(401, "authentication required")
///     .with_payload(serde_json::json!({"realm": "api"}));
/// assert_eq!(err.code, 401);
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RpcError {
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl RpcError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), payload: None }
    }

    /// Attaches an arbitrary payload, forwarded verbatim to the client.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// 404 — no route matched the first unresolved segment.
    pub(crate) fn route_not_found(path: &str) -> Self {
        Self::new(404, format!("no route matches `{path}`"))
    }

    /// 400 — the path continues past a procedure. Procedures are terminal.
    pub(crate) fn route_not_callable(path: &str) -> Self {
        Self::new(400, format!("`{path}` is a procedure and cannot be descended into"))
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpc error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

// ── SchemaError ──────────────────────────────────────────────────────────────

/// A validation failure raised by a [`Schema`](crate::Schema).
///
/// Not part of the RPC taxonomy. The dispatcher propagates it without
/// inspecting it; the transport wraps it as a 400-coded [`RpcError`] because
/// a value that fails schema validation is malformed client input, not a
/// server fault.
#[derive(Clone, Debug, PartialEq)]
pub struct SchemaError {
    pub message: String,
    pub detail: Option<Value>,
}

impl SchemaError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), detail: None }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed: {}", self.message)
    }
}

impl std::error::Error for SchemaError {}

// ── CallError ────────────────────────────────────────────────────────────────

/// Everything a call to [`Router::call`](crate::Router::call) or
/// [`Procedure::call`](crate::Procedure::call) can reject with.
///
/// The two variants stay distinct all the way to the transport boundary —
/// the dispatcher performs no local recovery and no reclassification.
#[derive(Clone, Debug, PartialEq)]
pub enum CallError {
    /// The tagged error: dispatch failures and handler-raised errors.
    Rpc(RpcError),
    /// An input or output value did not conform to its schema.
    Validation(SchemaError),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(e) => e.fmt(f),
            Self::Validation(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rpc(e) => Some(e),
            Self::Validation(e) => Some(e),
        }
    }
}

impl From<RpcError> for CallError {
    fn from(e: RpcError) -> Self {
        Self::Rpc(e)
    }
}

impl From<SchemaError> for CallError {
    fn from(e: SchemaError) -> Self {
        Self::Validation(e)
    }
}

// ── Error ────────────────────────────────────────────────────────────────────

/// The error type returned by the server's fallible operations.
///
/// Dispatch-level failures are [`RpcError`] values serialized into the wire
/// envelope, never `Error`s. This type surfaces infrastructure failures:
/// binding to a port or accepting a connection.
#[derive(Debug)]
pub struct Error(std::io::Error);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "io: {}", self.0)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self(e)
    }
}
