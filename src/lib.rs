//! # tansu
//!
//! A typed remote-procedure dispatch engine. Nothing more. Nothing less.
//!
//! ## The contract
//!
//! You describe a tree: named procedures grouped into nested routers, each
//! procedure owning an input schema, an output schema, and a handler; each
//! node owning an ordered middleware chain. tansu resolves a dot-separated
//! path through that tree, runs every middleware along the way exactly once
//! — outermost router first, terminal procedure last — validates the input
//! on the way in and the result on the way out, and hands back the value or
//! a single tagged error.
//!
//! What tansu intentionally ignores, because it belongs in middleware you
//! write or in the layer in front of you:
//!
//! - **Authentication** — a middleware that checks the context and returns
//!   a 401-coded error without running `next`
//! - **Rate limiting** — a middleware, or the proxy in front
//! - **Connection pooling / streaming** — transport concerns, not dispatch
//! - **Retries** — a middleware that owns its own policy
//!
//! What's left — the only part that changes between applications:
//!
//! - Route resolution with per-call middleware accumulation (the stored
//!   tree is never mutated by dispatch)
//! - Schema validation at both edges of every call, via [`schema`]
//! - A wire envelope over HTTP — `{result}` or `{error: {code, message,
//!   payload}}` — with graceful shutdown, via [`Server`]
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use serde::{Deserialize, Serialize};
//! use serde_json::{json, Value};
//! use tansu::{schema, Context, Procedure, Router, Server, SharedSink};
//!
//! #[derive(Deserialize, Serialize)]
//! struct EchoInput { message: String }
//! #[derive(Deserialize, Serialize)]
//! struct EchoOutput { result: String }
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new().route(
//!         "echo",
//!         Procedure::new(
//!             schema::typed::<EchoInput>(),
//!             schema::typed::<EchoOutput>(),
//!             echo,
//!         ),
//!     );
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn echo(_ctx: Context, input: Value, _sink: SharedSink) -> Value {
//!     json!({"result": format!("Echo: {}", input["message"].as_str().unwrap())})
//! }
//! ```
//!
//! `curl -X POST localhost:3000/rpc/echo -d '{"input":{"message":"Hello World"}}'`
//! answers `{"result":{"result":"Echo: Hello World"}}`.
//!
//! No server required: [`Router::call`] is the whole engine, and embedding
//! it directly (with a [`NoopSink`]) is how the test suite uses it.

mod error;
mod middleware;
mod procedure;
mod router;
mod server;
mod sink;

pub mod schema;

pub use error::{CallError, Error, RpcError, SchemaError};
pub use middleware::{BoxFuture, Middleware, Next};
pub use procedure::{Handler, IntoCallResult, Procedure};
pub use router::{DispatchPath, Route, Router};
pub use schema::Schema;
pub use server::Server;
pub use sink::{NoopSink, ResponseSink, SharedSink};

/// The caller-supplied context threaded unchanged through a call.
///
/// Opaque to the dispatcher: it imposes no shape, and only middleware the
/// application registered ever reads or rewrites it. Mutations made by a
/// middleware are visible to everything inward within the same call and to
/// nothing else.
pub type Context = serde_json::Value;
