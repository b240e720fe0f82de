//! Procedure — the leaf endpoint — and its validation/execution pipeline.
//!
//! # How async handlers are stored
//!
//! A router holds procedures whose handlers are all *different* closure
//! types, so handlers are erased behind a trait object:
//!
//! ```text
//! async fn echo(ctx, input, sink) -> Result<Value, CallError>  ← user writes this
//!        ↓ Procedure::new(input, output, echo)
//! echo.into_boxed_handler()                    ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(echo))                    ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(ctx, input, sink)  at call time ← one vtable dispatch
//! ```
//!
//! The only per-call cost is one `Arc` clone and one virtual call.
//!
//! # The pipeline
//!
//! [`Procedure::call`] runs four stages in order: parse the raw input
//! through the input schema, compose the middleware chain over the handler,
//! execute the chain outermost-first, parse whatever the chain returned
//! through the output schema. A short-circuiting middleware's return value
//! goes through output validation like any other result.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::Context;
use crate::error::{CallError, RpcError};
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, Next};
use crate::schema::{BoxedSchema, Schema};
use crate::sink::SharedSink;

// ── Internal types ────────────────────────────────────────────────────────────

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
/// External crates cannot usefully interact with this trait.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: Context, input: Value, sink: SharedSink)
    -> BoxFuture<Result<Value, CallError>>;
}

/// A heap-allocated, type-erased handler shared across concurrent calls.
///
/// `#[doc(hidden)] pub` for the same reason as `ErasedHandler`.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid procedure handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` with the signature:
///
/// ```text
/// async fn name(ctx: Context, input: Value, sink: SharedSink) -> impl IntoCallResult
/// ```
///
/// `input` arrives already validated by the procedure's input schema; the
/// return value is validated against the output schema after the chain
/// unwinds.
///
/// The trait is **sealed** (via the private `Sealed` supertrait): only the
/// blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

/// The sealing module. Because `Sealed` is private, external crates cannot
/// name it and therefore cannot implement `Handler` on their own types.
mod private {
    pub trait Sealed {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Context, Value, SharedSink) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoCallResult + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Context, Value, SharedSink) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoCallResult + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Newtype wrapper that holds a concrete handler `F` and implements
/// [`ErasedHandler`], bridging the typed world to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Context, Value, SharedSink) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoCallResult + Send + 'static,
{
    fn call(
        &self,
        ctx: Context,
        input: Value,
        sink: SharedSink,
    ) -> BoxFuture<Result<Value, CallError>> {
        let fut = (self.0)(ctx, input, sink);
        Box::pin(async move { fut.await.into_call_result() })
    }
}

// ── IntoCallResult ────────────────────────────────────────────────────────────

/// Conversion into a call result.
///
/// Lets handlers and middleware return a bare [`Value`] when they cannot
/// fail, or a `Result` with either error type when they can.
pub trait IntoCallResult {
    fn into_call_result(self) -> Result<Value, CallError>;
}

impl IntoCallResult for Value {
    fn into_call_result(self) -> Result<Value, CallError> {
        Ok(self)
    }
}

impl IntoCallResult for Result<Value, CallError> {
    fn into_call_result(self) -> Result<Value, CallError> {
        self
    }
}

impl IntoCallResult for Result<Value, RpcError> {
    fn into_call_result(self) -> Result<Value, CallError> {
        self.map_err(CallError::from)
    }
}

// ── Procedure ────────────────────────────────────────────────────────────────

/// A terminal RPC endpoint: input schema, output schema, handler, and the
/// procedure's own middleware.
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use serde_json::{json, Value};
/// use tansu::{schema, Context, Procedure, SharedSink};
///
/// #[derive(Deserialize, Serialize)]
/// struct EchoInput { message: String }
/// #[derive(Deserialize, Serialize)]
/// struct EchoOutput { result: String }
///
/// let echo = Procedure::new(
///     schema::typed::<EchoInput>(),
///     schema::typed::<EchoOutput>(),
///     |_ctx: Context, input: Value, _sink: SharedSink| async move {
///         json!({"result": format!("Echo: {}", input["message"].as_str().unwrap())})
///     },
/// );
/// ```
///
/// Once attached to a router a procedure is immutable; share one instance
/// under several routers with `Arc` when the same endpoint should be
/// reachable through different middleware stacks.
pub struct Procedure {
    input: BoxedSchema,
    output: BoxedSchema,
    handler: BoxedHandler,
    middlewares: Vec<BoxedMiddleware>,
}

impl Procedure {
    pub fn new(input: impl Schema, output: impl Schema, handler: impl Handler) -> Self {
        Self {
            input: Arc::new(input),
            output: Arc::new(output),
            handler: handler.into_boxed_handler(),
            middlewares: Vec::new(),
        }
    }

    /// Appends a middleware to this procedure's own chain. Returns `self`
    /// so registrations chain naturally; registration order is execution
    /// order.
    pub fn wrap(mut self, middleware: impl Middleware) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Runs the full pipeline with this procedure's own middleware only.
    ///
    /// Routers do not use this entry point — they prepend the middleware
    /// accumulated along the traversed path first.
    pub async fn call(
        &self,
        ctx: Context,
        raw_input: Value,
        sink: SharedSink,
    ) -> Result<Value, CallError> {
        self.call_with(Vec::new(), ctx, raw_input, sink).await
    }

    /// Runs the pipeline with `inherited` middleware executing ahead of the
    /// procedure's own. `inherited` is this call's ephemeral accumulation —
    /// it is consumed here and never stored.
    pub(crate) async fn call_with(
        &self,
        inherited: Vec<BoxedMiddleware>,
        ctx: Context,
        raw_input: Value,
        sink: SharedSink,
    ) -> Result<Value, CallError> {
        let parsed = self.input.parse(raw_input)?;

        let mut chain = inherited;
        chain.extend(self.middlewares.iter().cloned());

        let next = Next::new(chain, Arc::clone(&self.handler), Arc::clone(&sink));
        let result = next.run(ctx, parsed).await?;

        Ok(self.output.parse(result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;
    use crate::sink::{NoopSink, ResponseSink};
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Deserialize, Serialize)]
    struct EchoInput {
        message: String,
    }

    #[derive(Deserialize, Serialize)]
    struct EchoOutput {
        result: String,
    }

    fn echo_procedure() -> Procedure {
        Procedure::new(
            schema::typed::<EchoInput>(),
            schema::typed::<EchoOutput>(),
            |_ctx: Context, input: Value, _sink: SharedSink| async move {
                json!({"result": format!("Echo: {}", input["message"].as_str().unwrap())})
            },
        )
    }

    fn noop_sink() -> SharedSink {
        Arc::new(NoopSink)
    }

    #[tokio::test]
    async fn valid_input_yields_validated_output() {
        let out = echo_procedure()
            .call(json!({}), json!({"message": "Hello World"}), noop_sink())
            .await
            .unwrap();
        assert_eq!(out, json!({"result": "Echo: Hello World"}));
    }

    #[tokio::test]
    async fn nonconforming_input_is_a_validation_error() {
        let err = echo_procedure()
            .call(json!({}), json!({"message": 42}), noop_sink())
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Validation(_)));
    }

    #[tokio::test]
    async fn input_is_coerced_before_reaching_the_handler() {
        // The schema-normalized value flows downstream: the unknown field is
        // gone by the time the handler sees the input.
        let proc = Procedure::new(
            schema::typed::<EchoInput>(),
            schema::any(),
            |_ctx: Context, input: Value, _sink: SharedSink| async move { input },
        );
        let out = proc
            .call(json!({}), json!({"message": "hi", "extra": true}), noop_sink())
            .await
            .unwrap();
        assert_eq!(out, json!({"message": "hi"}));
    }

    #[tokio::test]
    async fn nonconforming_handler_output_is_a_validation_error() {
        let proc = Procedure::new(
            schema::any(),
            schema::typed::<EchoOutput>(),
            |_ctx: Context, _input: Value, _sink: SharedSink| async move { json!({"oops": 1}) },
        );
        let err = proc.call(json!({}), Value::Null, noop_sink()).await.unwrap_err();
        assert!(matches!(err, CallError::Validation(_)));
    }

    #[tokio::test]
    async fn short_circuit_results_also_pass_output_validation() {
        let proc = Procedure::new(
            schema::any(),
            schema::typed::<EchoOutput>(),
            |_ctx: Context, _input: Value, _sink: SharedSink| async move {
                json!({"result": "from handler"})
            },
        )
        .wrap(|_ctx: Context, _input: Value, _sink: SharedSink, _next: Next| async move {
            // Never runs the continuation; this value is the chain result.
            Ok::<_, CallError>(json!({"not": "conforming"}))
        });
        let err = proc.call(json!({}), Value::Null, noop_sink()).await.unwrap_err();
        assert!(matches!(err, CallError::Validation(_)));
    }

    struct RecordingSink {
        headers: Mutex<Vec<(String, String)>>,
        status: Mutex<Option<u16>>,
    }

    impl ResponseSink for RecordingSink {
        fn set_header(&self, name: &str, value: &str) {
            self.headers.lock().unwrap().push((name.to_owned(), value.to_owned()));
        }

        fn status(&self, code: u16) {
            *self.status.lock().unwrap() = Some(code);
        }
    }

    #[tokio::test]
    async fn sink_writes_are_forwarded_from_middleware_and_handler() {
        let sink = Arc::new(RecordingSink { headers: Mutex::new(Vec::new()), status: Mutex::new(None) });

        let proc = Procedure::new(
            schema::any(),
            schema::any(),
            |_ctx: Context, input: Value, sink: SharedSink| async move {
                sink.set_header("x-handler", "yes");
                sink.status(201);
                input
            },
        )
        .wrap(|ctx: Context, input: Value, sink: SharedSink, next: Next| async move {
            sink.set_header("x-middleware", "yes");
            next.run(ctx, input).await
        });

        let shared: SharedSink = sink.clone();
        proc.call(json!({}), Value::Null, shared).await.unwrap();

        assert_eq!(
            *sink.headers.lock().unwrap(),
            vec![
                ("x-middleware".to_owned(), "yes".to_owned()),
                ("x-handler".to_owned(), "yes".to_owned()),
            ]
        );
        assert_eq!(*sink.status.lock().unwrap(), Some(201));
    }
}
