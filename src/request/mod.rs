//! Request descriptors, lifecycle engine and result handling.
//!
//! - [`RequestDescriptor`] - URL, method, headers and body of one call
//! - [`ResultTransform`] / [`ErrorMapper`] - per-variant parsing and error mapping
//! - [`ConnectionRequest`] - the single-use lifecycle engine
//! - [`RequestError`] - everything a completion handler can receive

mod descriptor;
mod engine;
mod error;
mod state;
mod transform;

pub use descriptor::{HttpMethod, RequestDescriptor};
pub use engine::{ConnectionRequest, ProgressHandler, RequestBuilder};
pub use error::{DEFAULT_ERROR_CODE, ParseError, RequestError};
pub use state::{ConnectionId, Progress, RequestState};
pub use transform::{DefaultErrorMapper, ErrorMapper, JsonTransform, RawTransform, ResultTransform};
