//! Pluggable result transforms and error mappers.
//!
//! A request is a composition of a descriptor, a [`ResultTransform`] that turns
//! the response body into the caller's result type, and an [`ErrorMapper`]
//! that turns transport failures into caller-facing errors. Plain closures
//! implement both traits.

use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::{DEFAULT_ERROR_CODE, ParseError, RequestError};
use crate::transport::TransportError;

/// Turns a complete response body into a result object.
pub trait ResultTransform: Send + Sync {
    /// Result type handed to the completion handler.
    type Output: Send + 'static;

    /// Parses the accumulated body.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if the body is not what the variant expects.
    fn parse(&self, data: Bytes) -> Result<Self::Output, ParseError>;
}

impl<F, T> ResultTransform for F
where
    F: Fn(Bytes) -> Result<T, ParseError> + Send + Sync,
    T: Send + 'static,
{
    type Output = T;

    fn parse(&self, data: Bytes) -> Result<T, ParseError> {
        self(data)
    }
}

/// Identity transform: the result is the raw body.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawTransform;

impl ResultTransform for RawTransform {
    type Output = Bytes;

    fn parse(&self, data: Bytes) -> Result<Bytes, ParseError> {
        Ok(data)
    }
}

/// Deserializes the body as JSON.
///
/// `JsonTransform::new()` yields a generic [`serde_json::Value`];
/// `JsonTransform::<T>::typed()` deserializes straight into `T`.
pub struct JsonTransform<D = Value> {
    _target: PhantomData<fn() -> D>,
}

impl JsonTransform<Value> {
    /// Transform producing a generic JSON value.
    #[must_use]
    pub fn new() -> Self {
        Self::typed()
    }
}

impl<D> JsonTransform<D> {
    /// Transform producing `D`.
    #[must_use]
    pub fn typed() -> Self {
        Self {
            _target: PhantomData,
        }
    }
}

impl Default for JsonTransform<Value> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Clone for JsonTransform<D> {
    fn clone(&self) -> Self {
        Self::typed()
    }
}

impl<D> std::fmt::Debug for JsonTransform<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonTransform")
            .field("target", &std::any::type_name::<D>())
            .finish()
    }
}

impl<D> ResultTransform for JsonTransform<D>
where
    D: DeserializeOwned + Send + 'static,
{
    type Output = D;

    fn parse(&self, data: Bytes) -> Result<D, ParseError> {
        if data.is_empty() {
            return Err(ParseError::new("empty response body"));
        }
        Ok(serde_json::from_slice(&data)?)
    }
}

/// Maps transport failures to caller-facing errors.
pub trait ErrorMapper: Send + Sync {
    /// Code attached to errors of this variant (parse failures and the
    /// default transport wrapping).
    fn error_code(&self) -> i64 {
        DEFAULT_ERROR_CODE
    }

    /// Maps a transport failure. The default keeps the original message and
    /// tags it with [`error_code`](Self::error_code).
    fn map_error(&self, error: TransportError) -> RequestError {
        RequestError::transport(self.error_code(), error)
    }
}

impl<F> ErrorMapper for F
where
    F: Fn(TransportError) -> RequestError + Send + Sync,
{
    fn map_error(&self, error: TransportError) -> RequestError {
        self(error)
    }
}

/// Wraps transport errors as-is with a fixed code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultErrorMapper {
    code: i64,
}

impl DefaultErrorMapper {
    /// Mapper tagging errors with `code` instead of [`DEFAULT_ERROR_CODE`].
    #[must_use]
    pub fn with_code(code: i64) -> Self {
        Self { code }
    }
}

impl Default for DefaultErrorMapper {
    fn default() -> Self {
        Self::with_code(DEFAULT_ERROR_CODE)
    }
}

impl ErrorMapper for DefaultErrorMapper {
    fn error_code(&self) -> i64 {
        self.code
    }
}
