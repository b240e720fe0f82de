//! HTTP transport boundary and graceful shutdown.
//!
//! The transport is deliberately thin: it maps one `POST {prefix}/a/b/c`
//! request to one dispatch call and one JSON envelope back. Everything with
//! behavior lives in the router tree.
//!
//! # Wire protocol
//!
//! Request body: `{ "input": <value>, "context": <value> }` — both fields
//! optional, defaulting to null. Success response: `{ "result": <value> }`.
//! Failure response: `{ "error": { "code", "message", "payload"? } }`.
//!
//! Error classification happens here and only here: a schema validation
//! failure becomes a 400-coded error (it is malformed client input), a
//! tagged [`RpcError`] passes through untouched, and anything else — a body
//! that will not read, a result that will not serialize — collapses to the
//! generic `{"code": 500, "message": "internal error"}`.
//!
//! # Graceful shutdown
//!
//! On SIGTERM or Ctrl-C the server stops accepting, drains in-flight
//! connections, and returns from [`Server::serve`]. Size your orchestrator's
//! grace period to your slowest call.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{HeaderName, HeaderValue, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpSocket;
use tracing::{debug, error, info, warn};

use crate::error::{CallError, Error, RpcError};
use crate::router::Router;
use crate::sink::{ResponseSink, SharedSink};

const DEFAULT_BACKLOG: u32 = 1024;
const DEFAULT_PREFIX: &str = "/rpc";

/// The HTTP server hosting a router tree.
pub struct Server {
    addr: SocketAddr,
    backlog: u32,
    prefix: String,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use tansu::Server;
    /// let server = Server::bind("0.0.0.0:3000").backlog(512).prefix("/api");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr, backlog: DEFAULT_BACKLOG, prefix: DEFAULT_PREFIX.to_owned() }
    }

    /// Accept-queue depth passed to `listen(2)`. Defaults to 1024.
    pub fn backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Routing prefix stripped from request paths. Defaults to `/rpc`.
    pub fn prefix(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim_end_matches('/');
        self.prefix =
            if trimmed.starts_with('/') { trimmed.to_owned() } else { format!("/{trimmed}") };
        self
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight connections completing).
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let socket = match self.addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(self.addr)?;
        let listener = socket.listen(self.backlog)?;

        // Shared across connection tasks without copying the tree.
        let router = Arc::new(router);
        let prefix: Arc<str> = self.prefix.into();

        info!(addr = %self.addr, prefix = %prefix, "tansu listening");

        // JoinSet tracks every spawned connection task so we can wait for
        // them all to finish during graceful shutdown.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // `biased` checks arms top-to-bottom: a shutdown signal stops
                // the accept loop even when connections are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let prefix = Arc::clone(&prefix);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection, not once
                        // per connection.
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            let prefix = Arc::clone(&prefix);
                            async move { dispatch(router, &prefix, req).await }
                        });

                        // auto::Builder handles HTTP/1.1 and HTTP/2 alike.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Drain: wait for every in-flight connection before returning.
        while tasks.join_next().await.is_some() {}

        info!("tansu stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Deserialized request body. Absent fields are null, matching a dispatcher
/// that imposes no shape on either value.
#[derive(Deserialize)]
struct CallEnvelope {
    #[serde(default)]
    input: Value,
    #[serde(default)]
    context: Value,
}

/// Collects headers and a status override emitted during one call.
#[derive(Default)]
struct HttpSink {
    headers: Mutex<Vec<(String, String)>>,
    status: Mutex<Option<u16>>,
}

impl ResponseSink for HttpSink {
    fn set_header(&self, name: &str, value: &str) {
        self.headers.lock().unwrap().push((name.to_owned(), value.to_owned()));
    }

    fn status(&self, code: u16) {
        *self.status.lock().unwrap() = Some(code);
    }
}

/// Core hot path: maps one request to one dispatch call and one envelope.
///
/// The error type is [`Infallible`](std::convert::Infallible) — every
/// failure becomes an error envelope, hyper never sees one.
async fn dispatch(
    router: Arc<Router>,
    prefix: &str,
    req: hyper::Request<hyper::body::Incoming>,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    if req.method() != http::Method::POST {
        return Ok(error_response(RpcError::new(404, "not found"), &[]));
    }

    let Some(path) = rpc_path(req.uri().path(), prefix) else {
        return Ok(error_response(RpcError::new(404, "not found"), &[]));
    };

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!("body read error: {e}");
            return Ok(error_response(RpcError::new(500, "internal error"), &[]));
        }
    };

    let envelope: CallEnvelope = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return Ok(error_response(
                RpcError::new(400, format!("invalid request body: {e}")),
                &[],
            ));
        }
    };

    debug!(path = %path, "dispatching call");

    let sink = Arc::new(HttpSink::default());
    let shared: SharedSink = sink.clone();
    let outcome = router.call(envelope.context, path.as_str(), envelope.input, shared).await;

    let headers = sink.headers.lock().unwrap().clone();
    let response = match outcome {
        Ok(value) => {
            let status = sink.status.lock().unwrap().unwrap_or(200);
            json_response(status, encode(json!({"result": value})), &headers)
        }
        Err(err) => error_response(classify(err), &headers),
    };

    Ok(response)
}

/// Strips the routing prefix and joins the remaining segments into a
/// dispatch path. `None` means the request is outside the prefix.
fn rpc_path(path: &str, prefix: &str) -> Option<String> {
    let rest = path.strip_prefix(prefix)?;
    // `/rpcx` must not match prefix `/rpc` (a bare `/` prefix matches all).
    if !(rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/')) {
        return None;
    }
    Some(rest.split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("."))
}

/// The single point where a call failure is coerced into the client-visible
/// shape. Validation failures are malformed client input and surface as 400;
/// tagged errors pass through untouched.
fn classify(err: CallError) -> RpcError {
    match err {
        CallError::Rpc(e) => e,
        CallError::Validation(e) => {
            let wrapped = RpcError::new(400, e.message);
            match e.detail {
                Some(detail) => wrapped.with_payload(detail),
                None => wrapped,
            }
        }
    }
}

fn encode(envelope: Value) -> Vec<u8> {
    serde_json::to_vec(&envelope)
        .unwrap_or_else(|_| br#"{"error":{"code":500,"message":"internal error"}}"#.to_vec())
}

fn error_response(err: RpcError, headers: &[(String, String)]) -> http::Response<Full<Bytes>> {
    let status = if (400..=599).contains(&err.code) { err.code } else { 500 };
    json_response(status, encode(json!({"error": err})), headers)
}

fn json_response(
    status: u16,
    body: Vec<u8>,
    headers: &[(String, String)],
) -> http::Response<Full<Bytes>> {
    let mut response = http::Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() =
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    response
        .headers_mut()
        .insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for (name, value) in headers {
        match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().append(name, value);
            }
            _ => warn!(header = %name, "dropping invalid sink header"),
        }
    }

    response
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by orchestrators) and
/// **SIGINT** (Ctrl-C, for local dev). On Windows only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    // `pending()` never resolves — on non-Unix platforms the SIGTERM arm is
    // effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;

    #[test]
    fn rpc_path_strips_prefix_and_joins_segments() {
        assert_eq!(rpc_path("/rpc/auth/login", "/rpc"), Some("auth.login".to_owned()));
        assert_eq!(rpc_path("/rpc/echo", "/rpc"), Some("echo".to_owned()));
        assert_eq!(rpc_path("/rpc/echo/", "/rpc"), Some("echo".to_owned()));
        assert_eq!(rpc_path("/rpc", "/rpc"), Some(String::new()));
    }

    #[test]
    fn rpc_path_rejects_paths_outside_the_prefix() {
        assert_eq!(rpc_path("/other/echo", "/rpc"), None);
        assert_eq!(rpc_path("/rpcx/echo", "/rpc"), None);
    }

    #[test]
    fn envelope_fields_default_to_null() {
        let envelope: CallEnvelope = serde_json::from_str("{}").unwrap();
        assert_eq!(envelope.input, Value::Null);
        assert_eq!(envelope.context, Value::Null);

        let envelope: CallEnvelope =
            serde_json::from_str(r#"{"input": {"message": "hi"}}"#).unwrap();
        assert_eq!(envelope.input, json!({"message": "hi"}));
        assert_eq!(envelope.context, Value::Null);
    }

    #[test]
    fn validation_failures_classify_as_400() {
        let wrapped = classify(CallError::Validation(
            SchemaError::new("missing field `message`").with_detail(json!({"field": "message"})),
        ));
        assert_eq!(wrapped.code, 400);
        assert_eq!(wrapped.message, "missing field `message`");
        assert_eq!(wrapped.payload, Some(json!({"field": "message"})));
    }

    #[test]
    fn tagged_errors_classify_unchanged() {
        let original = RpcError::new(401, "Authentication required").with_payload(json!("token"));
        assert_eq!(classify(CallError::Rpc(original.clone())), original);
    }

    #[test]
    fn error_envelope_shape_matches_the_wire_format() {
        let body = encode(json!({"error": RpcError::new(404, "no route matches `x`")}));
        let decoded: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(decoded, json!({"error": {"code": 404, "message": "no route matches `x`"}}));
    }

    #[test]
    fn out_of_range_error_codes_map_to_http_500() {
        let response = error_response(RpcError::new(42, "domain code"), &[]);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = error_response(RpcError::new(404, "not found"), &[]);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn sink_headers_are_applied_to_the_response() {
        let headers = vec![("x-request-id".to_owned(), "abc".to_owned())];
        let response = json_response(200, b"{}".to_vec(), &headers);
        assert_eq!(response.headers()["x-request-id"], "abc");
        assert_eq!(response.headers()[http::header::CONTENT_TYPE], "application/json");
    }
}
