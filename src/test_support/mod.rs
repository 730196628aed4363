//! Helpers shared by unit tests.

#[path = "../../tests/support/socket_guard.rs"]
pub(crate) mod socket_guard;

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;

use crate::transport::{
    ResponseMeta, Transport, TransportError, TransportEvents, TransportRequest,
};

/// What a [`ScriptedTransport`] does when executed.
pub(crate) enum Script {
    /// Responds with `status` and streams `chunks`.
    Body {
        status: u16,
        chunks: Vec<Bytes>,
        declare_length: bool,
    },
    /// Responds 200, streams `chunks`, then never completes.
    Stall(Vec<Bytes>),
    /// Fails with a connection error before any response.
    Fail(String),
    /// Responds 200 with the request body.
    Echo,
    /// Never responds.
    Hang,
}

fn to_chunks(chunks: &[&str]) -> Vec<Bytes> {
    chunks
        .iter()
        .map(|chunk| Bytes::copy_from_slice(chunk.as_bytes()))
        .collect()
}

impl Script {
    pub(crate) fn body(status: u16, chunks: &[&str]) -> Self {
        Self::Body {
            status,
            chunks: to_chunks(chunks),
            declare_length: true,
        }
    }

    pub(crate) fn stall(chunks: &[&str]) -> Self {
        Self::Stall(to_chunks(chunks))
    }

    pub(crate) fn fail(message: &str) -> Self {
        Self::Fail(message.to_string())
    }

    /// Omits `Content-Length` from the scripted response.
    pub(crate) fn without_length(self) -> Self {
        match self {
            Self::Body { status, chunks, .. } => Self::Body {
                status,
                chunks,
                declare_length: false,
            },
            other => other,
        }
    }
}

/// Transport replaying a fixed [`Script`] and counting invocations.
pub(crate) struct ScriptedTransport {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn new(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(
        &self,
        request: TransportRequest,
        events: TransportEvents,
    ) -> Result<ResponseMeta, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let url = request.url.clone();

        match &self.script {
            Script::Body {
                status,
                chunks,
                declare_length,
            } => {
                let total: u64 = chunks.iter().map(|c| c.len() as u64).sum();
                let meta = ResponseMeta {
                    status: *status,
                    url: url.clone(),
                    headers: HeaderMap::new(),
                    content_length: declare_length.then_some(total),
                };
                events.response(meta.clone()).await;
                if !meta.is_success() {
                    return Err(TransportError::http_status(url.as_str(), *status));
                }
                for chunk in chunks {
                    if !events.data(chunk.clone()).await {
                        break;
                    }
                }
                Ok(meta)
            }
            Script::Stall(chunks) => {
                events.response(ResponseMeta::ok(url, None)).await;
                for chunk in chunks {
                    events.data(chunk.clone()).await;
                }
                std::future::pending().await
            }
            Script::Fail(message) => Err(TransportError::connection(url.as_str(), message.clone())),
            Script::Echo => {
                let body = request.body.unwrap_or_default();
                let meta = ResponseMeta::ok(url, Some(body.len() as u64));
                events.response(meta.clone()).await;
                events.data(body).await;
                Ok(meta)
            }
            Script::Hang => std::future::pending().await,
        }
    }
}
