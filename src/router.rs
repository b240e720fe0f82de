//! Router tree and the dispatch algorithm.
//!
//! A router maps segment names to children — procedures or nested routers —
//! and carries its own middleware. Dispatch resolves a dot-separated path
//! one segment at a time, accumulating middleware from every router level it
//! traverses, and hands the accumulated prefix to the terminal procedure's
//! pipeline.
//!
//! The accumulation is ephemeral: each call builds a fresh list of
//! middleware Arcs and discards it when the call completes. Stored lists
//! are never written to during dispatch, so the tree can be shared freely
//! across concurrent calls and repeated calls never observe duplicated
//! middleware.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::Context;
use crate::error::{CallError, RpcError};
use crate::middleware::{BoxedMiddleware, Middleware};
use crate::procedure::Procedure;
use crate::sink::SharedSink;

// ── DispatchPath ─────────────────────────────────────────────────────────────

/// An ordered sequence of segment names identifying a route.
///
/// Built from a delimited string (`.` and `/` both separate, empty segments
/// are ignored) or from pre-split segments:
///
/// ```rust
/// use tansu::DispatchPath;
///
/// let a = DispatchPath::from("v1.users.profile.get");
/// let b = DispatchPath::from("v1/users/profile/get");
/// let c = DispatchPath::from(vec!["v1".to_owned(), "users".to_owned(),
///                                 "profile".to_owned(), "get".to_owned()]);
/// assert_eq!(a, b);
/// assert_eq!(b, c);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DispatchPath(Vec<String>);

impl DispatchPath {
    pub(crate) fn segments(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for DispatchPath {
    fn from(path: &str) -> Self {
        Self(
            path.split(['.', '/'])
                .filter(|segment| !segment.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }
}

impl From<String> for DispatchPath {
    fn from(path: String) -> Self {
        Self::from(path.as_str())
    }
}

impl From<Vec<String>> for DispatchPath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<&[&str]> for DispatchPath {
    fn from(segments: &[&str]) -> Self {
        Self(segments.iter().map(|s| (*s).to_owned()).collect())
    }
}

// ── Route ────────────────────────────────────────────────────────────────────

/// A router's child: a terminal procedure or a nested router.
///
/// A sum type rather than runtime type inspection — dispatch matches on it
/// exhaustively, so "neither procedure nor router" is unrepresentable.
pub enum Route {
    Procedure(Arc<Procedure>),
    Router(Arc<Router>),
}

impl From<Procedure> for Route {
    fn from(p: Procedure) -> Self {
        Self::Procedure(Arc::new(p))
    }
}

/// Attach one procedure under several routers by cloning the `Arc`.
impl From<Arc<Procedure>> for Route {
    fn from(p: Arc<Procedure>) -> Self {
        Self::Procedure(p)
    }
}

impl From<Router> for Route {
    fn from(r: Router) -> Self {
        Self::Router(Arc::new(r))
    }
}

impl From<Arc<Router>> for Route {
    fn from(r: Arc<Router>) -> Self {
        Self::Router(r)
    }
}

// ── Router ───────────────────────────────────────────────────────────────────

/// An internal routing node: named children plus this level's middleware.
///
/// Built once, immutable afterwards — both builder methods consume `self`,
/// so nothing can be registered on a router that is already part of a served
/// tree. Each [`Router::route`] call returns `self` so registrations chain
/// naturally:
///
/// ```rust,no_run
/// # use serde_json::Value;
/// # use tansu::{schema, Context, Procedure, Router, SharedSink};
/// # async fn login(_: Context, i: Value, _: SharedSink) -> Value { i }
/// # async fn logout(_: Context, i: Value, _: SharedSink) -> Value { i }
/// # fn authenticate() -> impl tansu::Middleware {
/// #     |ctx: Context, i: Value, _: SharedSink, next: tansu::Next| async move { next.run(ctx, i).await }
/// # }
/// let auth = Router::new()
///     .wrap(authenticate())
///     .route("login",  Procedure::new(schema::any(), schema::any(), login))
///     .route("logout", Procedure::new(schema::any(), schema::any(), logout));
///
/// let root = Router::new().route("auth", auth);
/// ```
pub struct Router {
    routes: HashMap<String, Route>,
    middlewares: Vec<BoxedMiddleware>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), middlewares: Vec::new() }
    }

    /// Attaches a child under `name`. Returns `self` for chaining.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already taken — route names are unique within a
    /// router by construction, not by a runtime check at dispatch time.
    pub fn route(mut self, name: impl Into<String>, child: impl Into<Route>) -> Self {
        let name = name.into();
        match self.routes.entry(name) {
            std::collections::hash_map::Entry::Occupied(e) => {
                panic!("duplicate route `{}`", e.key())
            }
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(child.into());
            }
        }
        self
    }

    /// Appends a middleware to this router's own chain. Returns `self` for
    /// chaining; registration order is execution order.
    ///
    /// The middleware applies to every call that traverses this router,
    /// ahead of anything registered deeper in the tree.
    pub fn wrap(mut self, middleware: impl Middleware) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Resolves `path` through the tree and runs the matched procedure's
    /// pipeline with the middleware accumulated along the way.
    ///
    /// Rejects with a 404-coded [`RpcError`] when a segment has no route and
    /// with a 400-coded one when segments trail past a procedure.
    pub async fn call(
        &self,
        ctx: Context,
        path: impl Into<DispatchPath>,
        input: Value,
        sink: SharedSink,
    ) -> Result<Value, CallError> {
        let path = path.into();
        self.dispatch(ctx, path.segments(), input, sink, Vec::new()).await
    }

    /// One level of resolution. `inherited` holds the middleware gathered
    /// from every router above this one, in traversal order; this call's
    /// contribution is appended to a fresh copy, never to a stored list.
    ///
    /// Boxed because the recursion flows through an async body.
    fn dispatch<'a>(
        &'a self,
        ctx: Context,
        segments: &'a [String],
        input: Value,
        sink: SharedSink,
        inherited: Vec<BoxedMiddleware>,
    ) -> Pin<Box<dyn Future<Output = Result<Value, CallError>> + Send + 'a>> {
        Box::pin(async move {
            let Some((first, rest)) = segments.split_first() else {
                return Err(RpcError::route_not_found("").into());
            };

            match self.routes.get(first) {
                None => Err(RpcError::route_not_found(&segments.join(".")).into()),
                Some(Route::Procedure(procedure)) => {
                    if !rest.is_empty() {
                        return Err(RpcError::route_not_callable(first).into());
                    }
                    let mut effective = inherited;
                    effective.extend(self.middlewares.iter().cloned());
                    procedure.call_with(effective, ctx, input, sink).await
                }
                Some(Route::Router(child)) => {
                    let mut effective = inherited;
                    effective.extend(self.middlewares.iter().cloned());
                    child.dispatch(ctx, rest, input, sink, effective).await
                }
            }
        })
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
