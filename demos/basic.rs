//! Minimal tansu example — an echo procedure and an authenticated namespace.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl -X POST http://localhost:3000/rpc/echo \
//!        -d '{"input":{"message":"Hello World"}}'
//!   curl -X POST http://localhost:3000/rpc/auth/login \
//!        -d '{"input":{"name":"alice"},"context":{"token":"let-me-in"}}'
//!   curl -X POST http://localhost:3000/rpc/auth/login \
//!        -d '{"input":{"name":"alice"}}'          # 401
//!   curl -X POST http://localhost:3000/rpc/nope -d '{}'   # 404

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tansu::{CallError, Context, Next, Procedure, Router, RpcError, Server, SharedSink, schema};

#[derive(Deserialize, Serialize)]
struct EchoInput {
    message: String,
}

#[derive(Deserialize, Serialize)]
struct EchoOutput {
    result: String,
}

#[derive(Deserialize, Serialize)]
struct LoginInput {
    name: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let auth = Router::new()
        .wrap(require_token)
        .route(
            "login",
            Procedure::new(schema::typed::<LoginInput>(), schema::any(), login),
        );

    let app = Router::new()
        .route(
            "echo",
            Procedure::new(schema::typed::<EchoInput>(), schema::typed::<EchoOutput>(), echo),
        )
        .route("auth", auth);

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}

// Every call under /rpc/auth passes through here before its own middleware
// and handler. No token, no `next`.
async fn require_token(
    ctx: Context,
    input: Value,
    _sink: SharedSink,
    next: Next,
) -> Result<Value, CallError> {
    match ctx["token"].as_str() {
        Some("let-me-in") => next.run(ctx, input).await,
        _ => Err(RpcError::new(401, "Authentication required").into()),
    }
}

async fn echo(_ctx: Context, input: Value, _sink: SharedSink) -> Value {
    json!({"result": format!("Echo: {}", input["message"].as_str().unwrap())})
}

async fn login(_ctx: Context, input: Value, sink: SharedSink) -> Value {
    sink.set_header("x-session", "demo");
    json!({"welcome": input["name"]})
}
