//! Middleware trait and chain execution.
//!
//! A middleware sits between the dispatcher and the handler and sees every
//! call that passes through its node: the context, the (already validated)
//! input, the response sink, and a [`Next`] continuation representing the
//! rest of the chain. It decides what happens:
//!
//! - call `next.run(ctx, input)` to continue inward — possibly with a
//!   modified context or input;
//! - return without running `next` to short-circuit — its own return value
//!   becomes the call's result and nothing further inward executes;
//! - return an error ([`RpcError`](crate::RpcError) via `?`) to reject the
//!   call.
//!
//! `Next` is consumed by value, so a middleware can continue the chain at
//! most once — double invocation is not a documented caller error here, it
//! simply does not compile.
//!
//! # How chains are assembled
//!
//! Each router traversed on the way to a procedure contributes its
//! middleware, outermost first, ahead of the procedure's own. That merged
//! list is built fresh for every call and dropped when the call completes;
//! the lists stored on routers and procedures are never written to after
//! construction. Repeating the same call N times therefore runs every
//! middleware exactly N times — once per call, never more.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::Context;
use crate::error::CallError;
use crate::procedure::{BoxedHandler, IntoCallResult};
use crate::sink::SharedSink;

/// A heap-allocated, type-erased future.
///
/// `Pin<Box<…>>` because the runtime polls the future in place; `Send +
/// 'static` so tokio may move it across threads. `'static` is why a stateful
/// [`Middleware`] impl clones what it needs out of `&self` before the async
/// block.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A chainable call interceptor.
///
/// Automatically implemented for any async closure of the right shape —
/// annotate the parameters, inference cannot find them on its own:
///
/// ```rust
/// use serde_json::Value;
/// use tansu::{Context, Next, SharedSink};
///
/// let log = |ctx: Context, input: Value, _sink: SharedSink, next: Next| async move {
///     next.run(ctx, input).await
/// };
/// # let _ = log;
/// ```
///
/// Implement the trait directly when the middleware carries state; the
/// returned future is `'static`, so clone what it needs out of `&self`.
pub trait Middleware: Send + Sync + 'static {
    fn handle(
        &self,
        ctx: Context,
        input: Value,
        sink: SharedSink,
        next: Next,
    ) -> BoxFuture<Result<Value, CallError>>;
}

/// A heap-allocated, type-erased middleware shared across concurrent calls.
pub(crate) type BoxedMiddleware = Arc<dyn Middleware>;

impl<F, Fut, R> Middleware for F
where
    F: Fn(Context, Value, SharedSink, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoCallResult + Send + 'static,
{
    fn handle(
        &self,
        ctx: Context,
        input: Value,
        sink: SharedSink,
        next: Next,
    ) -> BoxFuture<Result<Value, CallError>> {
        let fut = self(ctx, input, sink, next);
        Box::pin(async move { fut.await.into_call_result() })
    }
}

// ── Next ─────────────────────────────────────────────────────────────────────

/// The rest of one call's chain: the remaining middleware, then the handler.
///
/// Owned by the middleware currently executing. Running it yields whatever
/// the inner chain produced; dropping it without running short-circuits the
/// call.
pub struct Next {
    chain: std::vec::IntoIter<BoxedMiddleware>,
    handler: BoxedHandler,
    sink: SharedSink,
}

impl Next {
    pub(crate) fn new(chain: Vec<BoxedMiddleware>, handler: BoxedHandler, sink: SharedSink) -> Self {
        Self { chain: chain.into_iter(), handler, sink }
    }

    /// Invokes the next middleware inward, or the handler if none remain.
    ///
    /// Consumes `self`: the continuation can be run at most once per call.
    pub fn run(mut self, ctx: Context, input: Value) -> BoxFuture<Result<Value, CallError>> {
        match self.chain.next() {
            Some(mw) => {
                let sink = Arc::clone(&self.sink);
                mw.handle(ctx, input, sink, self)
            }
            None => self.handler.call(ctx, input, self.sink),
        }
    }
}
