//! Response sink — the side channel from handlers to the transport.
//!
//! Middleware and handlers may set response headers (and optionally an HTTP
//! status) at any point during a call. The sink carries those verbatim to
//! whatever transport hosts the call; it never influences dispatch control
//! flow. The HTTP server installs a collecting sink per request; embedded
//! callers that don't care pass [`NoopSink`].

use std::sync::Arc;

/// Receives response metadata emitted during a call.
///
/// Implementations must be safe to call from any await point in the chain,
/// hence `&self` methods — use interior mutability to record values.
pub trait ResponseSink: Send + Sync {
    /// Records a response header. Later values for the same name accumulate;
    /// the transport decides how to fold them.
    fn set_header(&self, name: &str, value: &str);

    /// Overrides the success status code. Optional — the default is a no-op
    /// for sinks with no status concept.
    fn status(&self, code: u16) {
        let _ = code;
    }
}

/// A shared, type-erased sink threaded through one call.
pub type SharedSink = Arc<dyn ResponseSink>;

/// A sink that discards everything. For embedding and tests.
///
/// ```rust
/// use std::sync::Arc;
/// use tansu::{NoopSink, SharedSink};
///
/// let sink: SharedSink = Arc::new(NoopSink);
/// ```
pub struct NoopSink;

impl ResponseSink for NoopSink {
    fn set_header(&self, _name: &str, _value: &str) {}
}
