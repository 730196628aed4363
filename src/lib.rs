//! Connection Request Library
//!
//! A reusable HTTP request abstraction configured per API endpoint. Every
//! request follows the same lifecycle (build, execute, parse, notify) and is
//! tracked while in flight so whole groups of requests can be queried or
//! cancelled at once.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`request`] - Descriptors, result transforms and the lifecycle engine
//! - [`registry`] - Process-wide table of active requests
//! - [`transport`] - The HTTP exchange behind each request (reqwest by default)
//! - [`config`] - Transport timeouts and User-Agent
//!
//! # Example
//!
//! ```no_run
//! use connection_request::{ConnectionRequest, RequestDescriptor};
//!
//! struct Avatars;
//!
//! # async fn example() -> Result<(), connection_request::RequestError> {
//! let request = ConnectionRequest::builder(RequestDescriptor::get("https://example.com/a.png"))
//!     .variant::<Avatars>()
//!     .build();
//! let path = request.download(None).await?;
//!
//! // Elsewhere: drop everything avatar-related.
//! connection_request::cancel_all::<Avatars>();
//! # let _ = path;
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod registry;
pub mod request;
pub mod transport;
mod user_agent;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::TransportConfig;
pub use registry::{
    ActiveRequest, ActiveRequestRegistry, VariantKey, cancel_all, cancel_everything, is_in_use,
};
pub use request::{
    ConnectionId, ConnectionRequest, DEFAULT_ERROR_CODE, DefaultErrorMapper, ErrorMapper,
    HttpMethod, JsonTransform, ParseError, Progress, RawTransform, RequestBuilder,
    RequestDescriptor, RequestError, RequestState, ResultTransform,
};
pub use transport::{
    ReqwestTransport, ResponseMeta, Transport, TransportError, TransportEvents, TransportRequest,
};
