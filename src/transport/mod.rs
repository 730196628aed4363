//! Transport adapters: the component that performs the actual HTTP exchange.
//!
//! The request engine never touches sockets itself. It hands a validated
//! [`TransportRequest`] to a [`Transport`] and listens on a
//! [`TransportEvents`] channel for response metadata and body chunks. The
//! transport's return value is the single completion of the exchange.
//!
//! # Contract
//!
//! - [`TransportEvents::response`] at most once, before any data.
//! - [`TransportEvents::data`] zero or more times, in body order.
//! - `execute` returns exactly once; `Ok` means the body was delivered in full.
//! - Aborting is dropping the future: the engine runs `execute` in its own
//!   task and aborts that task on cancellation.
//!
//! Timeouts are the transport's responsibility and must surface as
//! [`TransportError::Timeout`].

mod client;
pub mod constants;
mod error;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use tokio::sync::mpsc;
use url::Url;

use crate::request::HttpMethod;

pub use client::ReqwestTransport;
pub use error::TransportError;

/// A fully validated request handed to a transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute target URL.
    pub url: Url,
    /// Request headers (names and values already validated).
    pub headers: HeaderMap,
    /// Body bytes; only present for methods that carry a body.
    pub body: Option<Bytes>,
}

/// Response metadata captured when the transport receives response headers.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    /// HTTP status code.
    pub status: u16,
    /// Final URL after redirects.
    pub url: Url,
    /// Response headers.
    pub headers: HeaderMap,
    /// Declared body length, if the server sent one.
    pub content_length: Option<u64>,
}

impl ResponseMeta {
    /// Metadata for a plain `200 OK` with the given body length.
    #[must_use]
    pub fn ok(url: Url, content_length: Option<u64>) -> Self {
        Self {
            status: 200,
            url,
            headers: HeaderMap::new(),
            content_length,
        }
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Events a transport emits while an exchange is in flight.
#[derive(Debug)]
pub enum TransportEvent {
    /// Response headers arrived.
    Response(ResponseMeta),
    /// A chunk of the response body.
    Data(Bytes),
}

/// Sending half of the event channel between a transport and its engine.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    sender: mpsc::Sender<TransportEvent>,
}

impl TransportEvents {
    /// Creates a bounded event channel.
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Reports response metadata.
    ///
    /// Returns `false` once the engine has stopped listening (cancelled or
    /// finished); transports should stop work at that point.
    pub async fn response(&self, meta: ResponseMeta) -> bool {
        self.sender.send(TransportEvent::Response(meta)).await.is_ok()
    }

    /// Reports a body chunk. Returns `false` once the engine stopped listening.
    pub async fn data(&self, chunk: Bytes) -> bool {
        self.sender.send(TransportEvent::Data(chunk)).await.is_ok()
    }

    /// Returns true if the engine dropped its receiving end.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Performs HTTP exchanges on behalf of request engines.
///
/// This trait uses `async_trait` so engines can hold `Arc<dyn Transport>`;
/// Rust 2024 native async traits are not object-safe.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Executes one exchange, streaming events to `events`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the exchange fails at any point. Non-2xx
    /// statuses are reported as [`TransportError::HttpStatus`] after the
    /// response metadata event.
    async fn execute(
        &self,
        request: TransportRequest,
        events: TransportEvents,
    ) -> Result<ResponseMeta, TransportError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_response_meta_ok_is_success() {
        let meta = ResponseMeta::ok(Url::parse("https://api.example.com/").unwrap(), Some(4));
        assert!(meta.is_success());
        assert_eq!(meta.content_length, Some(4));
    }

    #[test]
    fn test_response_meta_error_status_is_not_success() {
        let mut meta = ResponseMeta::ok(Url::parse("https://api.example.com/").unwrap(), None);
        meta.status = 503;
        assert!(!meta.is_success());
    }

    #[tokio::test]
    async fn test_transport_events_report_closed_receiver() {
        let (events, receiver) = TransportEvents::channel(1);
        assert!(!events.is_closed());
        drop(receiver);
        assert!(events.is_closed());
        assert!(!events.data(Bytes::from_static(b"late")).await);
    }
}
