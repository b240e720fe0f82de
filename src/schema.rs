//! The schema capability.
//!
//! A schema is a parse function: untyped value in, validated value out, or a
//! [`SchemaError`]. The dispatcher treats it as opaque — it calls `parse` on
//! the way into a procedure and on the way out, and propagates whatever
//! failure it raises without looking inside.
//!
//! Two stock schemas cover most procedures:
//!
//! - [`any()`] — accepts everything unchanged. For procedures that do their
//!   own checking, or none.
//! - [`typed::<T>()`] — round-trips the value through a `serde` type. The
//!   value that flows downstream is the re-serialized `T`, so unknown fields
//!   are dropped and shapes are normalized, not merely checked.
//!
//! Anything else is a closure away:
//!
//! ```rust
//! use serde_json::Value;
//! use tansu::SchemaError;
//!
//! let non_empty_string = |v: Value| match v {
//!     Value::String(s) if !s.is_empty() => Ok(Value::String(s)),
//!     _ => Err(SchemaError::new("expected a non-empty string")),
//! };
//! # let _ = non_empty_string;
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::SchemaError;

/// Validates and coerces an untyped value.
///
/// Automatically implemented for any
/// `Fn(Value) -> Result<Value, SchemaError>` closure.
pub trait Schema: Send + Sync + 'static {
    /// Parses `value`, returning the validated (possibly coerced) value.
    ///
    /// The returned value, not the one passed in, is what callers use
    /// downstream.
    fn parse(&self, value: Value) -> Result<Value, SchemaError>;
}

/// A heap-allocated, type-erased schema shared across concurrent calls.
pub(crate) type BoxedSchema = Arc<dyn Schema>;

impl<F> Schema for F
where
    F: Fn(Value) -> Result<Value, SchemaError> + Send + Sync + 'static,
{
    fn parse(&self, value: Value) -> Result<Value, SchemaError> {
        self(value)
    }
}

// ── Stock schemas ─────────────────────────────────────────────────────────────

/// A schema that accepts any value unchanged.
pub fn any() -> impl Schema {
    AnySchema
}

struct AnySchema;

impl Schema for AnySchema {
    fn parse(&self, value: Value) -> Result<Value, SchemaError> {
        Ok(value)
    }
}

/// A schema backed by a `serde` type.
///
/// `parse` deserializes the value into `T` and re-serializes it, so the
/// downstream value is exactly what `T` represents — extra fields are gone,
/// defaults applied by `T`'s `Deserialize` impl are materialized.
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use tansu::{schema, Schema};
///
/// #[derive(Deserialize, Serialize)]
/// struct EchoInput { message: String }
///
/// let input = schema::typed::<EchoInput>();
/// assert!(input.parse(serde_json::json!({"message": "hi"})).is_ok());
/// assert!(input.parse(serde_json::json!({"message": 42})).is_err());
/// ```
pub fn typed<T>() -> impl Schema
where
    T: DeserializeOwned + Serialize + Send + Sync + 'static,
{
    TypedSchema::<T>(PhantomData)
}

// `fn() -> T` keeps the schema Send + Sync without requiring it of T's fields.
struct TypedSchema<T>(PhantomData<fn() -> T>);

impl<T> Schema for TypedSchema<T>
where
    T: DeserializeOwned + Serialize + Send + Sync + 'static,
{
    fn parse(&self, value: Value) -> Result<Value, SchemaError> {
        let parsed: T =
            serde_json::from_value(value).map_err(|e| SchemaError::new(e.to_string()))?;
        serde_json::to_value(&parsed).map_err(|e| SchemaError::new(e.to_string()))
    }
}
