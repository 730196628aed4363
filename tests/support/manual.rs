//! A transport driven step by step by the test.
//!
//! Every `execute` call is handed to the test as an [`Exchange`]; the test
//! decides when metadata, body chunks and the completion arrive.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use connection_request::{
    ResponseMeta, Transport, TransportError, TransportEvents, TransportRequest,
};
use tokio::sync::{mpsc, oneshot};

pub struct ManualTransport {
    exchanges: mpsc::UnboundedSender<Exchange>,
    calls: AtomicUsize,
}

impl ManualTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Exchange>) {
        let (exchanges, receiver) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            exchanges,
            calls: AtomicUsize::new(0),
        });
        (transport, receiver)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ManualTransport {
    fn name(&self) -> &str {
        "manual"
    }

    async fn execute(
        &self,
        request: TransportRequest,
        events: TransportEvents,
    ) -> Result<ResponseMeta, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let url = request.url.to_string();
        let (done, finished) = oneshot::channel();
        if self
            .exchanges
            .send(Exchange {
                request,
                events,
                done,
            })
            .is_err()
        {
            return Err(TransportError::connection(url, "test stopped accepting exchanges"));
        }
        finished.await.unwrap_or_else(|_| {
            Err(TransportError::connection(url, "exchange dropped without completion"))
        })
    }
}

/// One in-flight exchange, controlled by the test.
pub struct Exchange {
    pub request: TransportRequest,
    events: TransportEvents,
    done: oneshot::Sender<Result<ResponseMeta, TransportError>>,
}

impl Exchange {
    pub fn meta(&self, content_length: Option<u64>) -> ResponseMeta {
        ResponseMeta::ok(self.request.url.clone(), content_length)
    }

    pub async fn respond(&self, content_length: Option<u64>) -> bool {
        self.events.response(self.meta(content_length)).await
    }

    pub async fn data(&self, chunk: &'static [u8]) -> bool {
        self.events.data(Bytes::from_static(chunk)).await
    }

    pub fn finish(self, content_length: Option<u64>) {
        let meta = self.meta(content_length);
        let _ = self.done.send(Ok(meta));
    }

    pub fn fail(self, error: TransportError) {
        let _ = self.done.send(Err(error));
    }
}

/// Receives the next exchange, failing the test if none arrives in time.
pub async fn next_exchange(exchanges: &mut mpsc::UnboundedReceiver<Exchange>) -> Exchange {
    tokio::time::timeout(Duration::from_secs(5), exchanges.recv())
        .await
        .expect("timed out waiting for the transport to be called")
        .expect("transport dropped")
}

/// Polls `condition` until it holds, failing the test after a few seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
