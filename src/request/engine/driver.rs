use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, trace, warn};

use super::sink::{Delivered, Sink, remove_partial};
use super::{Engine, Finished};
use crate::request::{RequestError, RequestState, ResultTransform};
use crate::transport::constants::EVENT_CHANNEL_CAPACITY;
use crate::transport::{
    ResponseMeta, TransportError, TransportEvent, TransportEvents, TransportRequest,
};

/// Where the body of a started request goes.
pub(super) enum Target {
    Buffer,
    File(PathBuf),
}

impl Target {
    fn file(&self) -> Option<PathBuf> {
        match self {
            Self::Buffer => None,
            Self::File(path) => Some(path.clone()),
        }
    }
}

type Joined = Result<Result<ResponseMeta, TransportError>, JoinError>;

enum Step {
    Cancelled,
    Event(TransportEvent),
    Joined(Joined),
}

enum Flow {
    Continue,
    Stop,
    Fail(RequestError),
}

enum Ending {
    Joined(Joined),
    Stopped,
    Failed(RequestError),
}

/// Runs [`drive`] on its own task and settles the request if that task ends
/// without doing so.
///
/// The guard is created before the returned future is first polled, so a
/// runtime that drops the task unpolled still ends the request.
pub(super) fn supervise<Q>(
    engine: Arc<Engine<Q>>,
    request: TransportRequest,
    target: Target,
) -> impl Future<Output = ()>
where
    Q: ResultTransform + 'static,
{
    let supervision = Supervision {
        engine: Arc::clone(&engine),
        partial: target.file(),
    };
    async move {
        let driver = tokio::spawn(drive(engine, request, target));
        if let Err(join_error) = driver.await {
            if join_error.is_panic() {
                let url = supervision.engine.descriptor.url();
                warn!(url, error = %join_error, "request driver panicked");
                supervision.abandon(
                    RequestState::Failed,
                    RequestError::domain(
                        supervision.engine.mapper.error_code(),
                        format!("request driver panicked: {join_error}"),
                    ),
                );
            }
        }
    }
}

/// Ends a request whose driver stopped before reaching a terminal state.
struct Supervision<Q: ResultTransform + 'static> {
    engine: Arc<Engine<Q>>,
    partial: Option<PathBuf>,
}

impl<Q: ResultTransform + 'static> Supervision<Q> {
    /// Settles the request as `state`, removes any partial download and then
    /// delivers `error`. Does nothing if the request already finished.
    fn abandon(&self, state: RequestState, error: RequestError) {
        let Some(completion) = self.engine.settle(state, None) else {
            return;
        };
        self.engine.token.cancel();
        if let Some(path) = &self.partial {
            debug!(path = %path.display(), "removing partial file of abandoned request");
            let _ = std::fs::remove_file(path);
        }
        completion.fail(error);
    }
}

impl<Q: ResultTransform + 'static> Drop for Supervision<Q> {
    fn drop(&mut self) {
        if self.engine.is_active() {
            warn!(url = self.engine.descriptor.url(), "request dropped while active");
            self.abandon(
                RequestState::Cancelled,
                RequestError::cancelled(self.engine.descriptor.url()),
            );
        }
    }
}

/// Runs one request from transport call to terminal transition.
async fn drive<Q>(engine: Arc<Engine<Q>>, request: TransportRequest, target: Target)
where
    Q: ResultTransform + 'static,
{
    let url = request.url.to_string();
    let mut sink = match target {
        Target::Buffer => Sink::buffer(),
        Target::File(path) => match Sink::file(path).await {
            Ok(sink) => sink,
            Err(error) => {
                engine.fail(error);
                return;
            }
        },
    };

    if engine.token.is_cancelled() {
        sink.discard().await;
        return;
    }

    let (events, mut receiver) = TransportEvents::channel(EVENT_CHANNEL_CAPACITY);
    let transport = Arc::clone(&engine.transport);
    let mut transfer = tokio::spawn(async move { transport.execute(request, events).await });
    if !engine.attach_transfer(transfer.abort_handle()) {
        transfer.abort();
        sink.discard().await;
        return;
    }

    let token = engine.token.clone();
    let ending = loop {
        let step = tokio::select! {
            biased;
            () = token.cancelled() => Step::Cancelled,
            Some(event) = receiver.recv() => Step::Event(event),
            joined = &mut transfer => Step::Joined(joined),
        };
        match step {
            Step::Cancelled => break Ending::Stopped,
            Step::Event(event) => match apply(&engine, event, &mut sink).await {
                Flow::Continue => {}
                Flow::Stop => break Ending::Stopped,
                Flow::Fail(error) => break Ending::Failed(error),
            },
            Step::Joined(joined) => break drain(&engine, &mut receiver, &mut sink, joined).await,
        }
    };

    match ending {
        Ending::Stopped => {
            transfer.abort();
            sink.discard().await;
            trace!(%url, "driver stopped");
        }
        Ending::Failed(error) => {
            transfer.abort();
            sink.discard().await;
            engine.fail(error);
        }
        Ending::Joined(joined) => settle(&engine, joined, sink, &url).await,
    }
}

/// Applies events the transport queued before it returned.
async fn drain<Q>(
    engine: &Engine<Q>,
    receiver: &mut mpsc::Receiver<TransportEvent>,
    sink: &mut Sink,
    joined: Joined,
) -> Ending
where
    Q: ResultTransform + 'static,
{
    while let Ok(event) = receiver.try_recv() {
        match apply(engine, event, sink).await {
            Flow::Continue => {}
            Flow::Stop => return Ending::Stopped,
            Flow::Fail(error) => return Ending::Failed(error),
        }
    }
    Ending::Joined(joined)
}

async fn apply<Q>(engine: &Engine<Q>, event: TransportEvent, sink: &mut Sink) -> Flow
where
    Q: ResultTransform + 'static,
{
    match event {
        TransportEvent::Response(meta) => {
            debug!(status = meta.status, content_length = ?meta.content_length, "response metadata");
            if engine.record_response(meta) {
                Flow::Continue
            } else {
                Flow::Stop
            }
        }
        TransportEvent::Data(chunk) => {
            if !engine.is_active() {
                return Flow::Stop;
            }
            if let Err(error) = sink.write(&chunk).await {
                return Flow::Fail(error);
            }
            let Some(progress) = engine.record_data(chunk.len()) else {
                return Flow::Stop;
            };
            if let Some(handler) = &engine.progress {
                handler(progress);
            }
            Flow::Continue
        }
    }
}

/// Turns the transport's single completion into the request's outcome.
async fn settle<Q>(engine: &Engine<Q>, joined: Joined, sink: Sink, url: &str)
where
    Q: ResultTransform + 'static,
{
    let outcome = match joined {
        Ok(Ok(meta)) if !meta.is_success() => {
            engine.record_response(meta.clone());
            Err(TransportError::http_status(url, meta.status))
        }
        Ok(outcome) => outcome,
        Err(join_error) => Err(TransportError::connection(
            url,
            format!("transport task ended abnormally: {join_error}"),
        )),
    };

    let meta = match outcome {
        Ok(meta) => meta,
        Err(error) => {
            sink.discard().await;
            engine.fail(engine.mapper.map_error(error));
            return;
        }
    };

    {
        let mut lifecycle = engine.lock();
        if lifecycle.response.is_none() {
            lifecycle.bytes_expected = meta.content_length;
            lifecycle.response = Some(meta);
        }
    }

    match sink.finish().await {
        Err(error) => engine.fail(error),
        Ok(Delivered::Body(body)) => {
            if !engine.is_active() {
                return;
            }
            match engine.transform.parse(body) {
                Ok(value) => {
                    engine.complete(Finished::Value(value));
                }
                Err(error) => {
                    engine.fail(RequestError::parse(engine.mapper.error_code(), url, error));
                }
            }
        }
        Ok(Delivered::File(path)) => {
            if !engine.complete(Finished::File(path.clone())) {
                remove_partial(&path).await;
            }
        }
    }
}
