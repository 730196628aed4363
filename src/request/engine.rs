//! Request lifecycle engine.
//!
//! A [`ConnectionRequest`] turns a [`RequestDescriptor`] into one tracked,
//! cancellable network operation. Each request is single use:
//!
//! ```text
//! Idle ──start──► Active ──► Completed
//!                    │  └──► Failed
//!                    └─cancel──► Cancelled
//! ```
//!
//! While `Active` the request is listed in its [`ActiveRequestRegistry`],
//! and its completion handler fires exactly once whichever of
//! completion, failure and cancellation wins.
//!
//! # Example
//!
//! ```no_run
//! use connection_request::{ConnectionRequest, RequestDescriptor};
//!
//! # async fn example() -> Result<(), connection_request::RequestError> {
//! let request = ConnectionRequest::json(RequestDescriptor::get("https://api.example.com/users/1"));
//! let user = request.send().await?;
//! println!("{} took {:?}", user["name"], request.duration());
//! # Ok(())
//! # }
//! ```
//!
//! # Callback context
//!
//! Progress handlers and completions for success or failure run on the tokio
//! task driving the request. A completion caused by [`ConnectionRequest::cancel`]
//! (directly or through the registry) runs synchronously on the cancelling
//! thread before `cancel` returns.

mod driver;
mod sink;

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant, SystemTime};

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{
    ConnectionId, DEFAULT_ERROR_CODE, DefaultErrorMapper, ErrorMapper, JsonTransform, Progress, RawTransform,
    RequestDescriptor, RequestError, RequestState, ResultTransform,
};
use crate::registry::{ActiveRequest, ActiveRequestRegistry, VariantKey};
use crate::transport::{ReqwestTransport, ResponseMeta, Transport};

use driver::Target;

/// Callback receiving progress notifications.
pub type ProgressHandler = Arc<dyn Fn(Progress) + Send + Sync>;

type BufferedHandler<T> = Box<dyn FnOnce(Result<T, RequestError>) + Send>;
type DownloadHandler = Box<dyn FnOnce(Result<PathBuf, RequestError>) + Send>;

/// The caller's completion handler, shaped by the transfer mode.
enum Completion<T> {
    Buffered(BufferedHandler<T>),
    Download(DownloadHandler),
}

/// Successful result of a finished transfer.
enum Finished<T> {
    Value(T),
    File(PathBuf),
}

impl<T> Completion<T> {
    fn fail(self, error: RequestError) {
        match self {
            Self::Buffered(handler) => handler(Err(error)),
            Self::Download(handler) => handler(Err(error)),
        }
    }

    fn deliver(self, finished: Finished<T>) {
        match (self, finished) {
            (Self::Buffered(handler), Finished::Value(value)) => handler(Ok(value)),
            (Self::Download(handler), Finished::File(path)) => handler(Ok(path)),
            (completion, _) => {
                debug_assert!(
                    false,
                    "transfer finished in a different mode than it was started in"
                );
                completion.fail(RequestError::domain(
                    DEFAULT_ERROR_CODE,
                    "transfer finished in a different mode than it was started in",
                ));
            }
        }
    }
}

struct Lifecycle<T> {
    state: RequestState,
    connection_id: Option<ConnectionId>,
    date_started: Option<SystemTime>,
    date_finished: Option<SystemTime>,
    started_at: Option<Instant>,
    duration: Option<Duration>,
    bytes_received: u64,
    bytes_expected: Option<u64>,
    response: Option<ResponseMeta>,
    file_destination: Option<PathBuf>,
    completion: Option<Completion<T>>,
    transfer: Option<AbortHandle>,
}

impl<T> Default for Lifecycle<T> {
    fn default() -> Self {
        Self {
            state: RequestState::Idle,
            connection_id: None,
            date_started: None,
            date_finished: None,
            started_at: None,
            duration: None,
            bytes_received: 0,
            bytes_expected: None,
            response: None,
            file_destination: None,
            completion: None,
            transfer: None,
        }
    }
}

struct Engine<Q: ResultTransform> {
    descriptor: RequestDescriptor,
    variant: VariantKey,
    transform: Q,
    mapper: Box<dyn ErrorMapper>,
    transport: Arc<dyn Transport>,
    registry: Arc<ActiveRequestRegistry>,
    progress: Option<ProgressHandler>,
    download_dir: Option<PathBuf>,
    token: CancellationToken,
    lifecycle: Mutex<Lifecycle<Q::Output>>,
}

impl<Q: ResultTransform + 'static> Engine<Q> {
    fn lock(&self) -> MutexGuard<'_, Lifecycle<Q::Output>> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_active(&self) -> bool {
        self.lock().state == RequestState::Active
    }

    fn begin(
        self: &Arc<Self>,
        completion: Completion<Q::Output>,
        destination: Option<PathBuf>,
    ) -> Result<(), RequestError> {
        let mut lifecycle = self.lock();
        if lifecycle.state != RequestState::Idle {
            return Err(RequestError::configuration(format!(
                "request is {} and cannot be started again",
                lifecycle.state
            )));
        }
        let runtime = Handle::try_current().map_err(|_| {
            RequestError::configuration("no tokio runtime available to drive the request")
        })?;
        let request = self.descriptor.validate()?;

        let id = ConnectionId::new();
        let target = match &completion {
            Completion::Buffered(_) => Target::Buffer,
            Completion::Download(_) => Target::File(destination.unwrap_or_else(|| {
                self.download_dir
                    .clone()
                    .unwrap_or_else(std::env::temp_dir)
                    .join(id.to_string())
            })),
        };

        lifecycle.state = RequestState::Active;
        lifecycle.connection_id = Some(id);
        lifecycle.date_started = Some(SystemTime::now());
        lifecycle.started_at = Some(Instant::now());
        lifecycle.completion = Some(completion);

        let weak: Weak<Self> = Arc::downgrade(self);
        let weak: Weak<dyn ActiveRequest> = weak;
        self.registry.register(self.variant, id, weak);
        drop(lifecycle);

        debug!(%id, method = %request.method, transport = self.transport.name(), "request started");
        runtime.spawn(driver::supervise(Arc::clone(self), request, target));
        Ok(())
    }

    /// Keeps the transfer's abort handle so `cancel` can stop it. Returns
    /// false if the request is no longer active.
    fn attach_transfer(&self, handle: AbortHandle) -> bool {
        let mut lifecycle = self.lock();
        if lifecycle.state != RequestState::Active {
            return false;
        }
        lifecycle.transfer = Some(handle);
        true
    }

    fn record_response(&self, meta: ResponseMeta) -> bool {
        let mut lifecycle = self.lock();
        if lifecycle.state != RequestState::Active {
            return false;
        }
        lifecycle.bytes_expected = meta.content_length;
        lifecycle.response = Some(meta);
        true
    }

    /// Counts received body bytes. Returns `None` once the request is no
    /// longer active, so late data is ignored.
    fn record_data(&self, len: usize) -> Option<Progress> {
        let mut lifecycle = self.lock();
        if lifecycle.state != RequestState::Active {
            return None;
        }
        lifecycle.bytes_received += len as u64;
        Some(Progress {
            id: lifecycle.connection_id?,
            bytes_received: lifecycle.bytes_received,
            bytes_expected: lifecycle.bytes_expected,
        })
    }

    /// Moves an active request to `state`, deregisters it and hands back the
    /// completion handler. Only the first caller wins.
    fn settle(
        &self,
        state: RequestState,
        file_destination: Option<PathBuf>,
    ) -> Option<Completion<Q::Output>> {
        let mut lifecycle = self.lock();
        if lifecycle.state != RequestState::Active {
            return None;
        }
        lifecycle.state = state;
        lifecycle.date_finished = Some(SystemTime::now());
        lifecycle.duration = lifecycle.started_at.map(|started| started.elapsed());
        if let Some(transfer) = lifecycle.transfer.take() {
            transfer.abort();
        }
        if file_destination.is_some() {
            lifecycle.file_destination = file_destination;
        }
        if let Some(id) = lifecycle.connection_id {
            self.registry.deregister(self.variant, id);
            debug!(
                %id,
                url = self.descriptor.url(),
                state = %state,
                bytes = lifecycle.bytes_received,
                duration_ms = lifecycle
                    .duration
                    .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
                "request finished"
            );
        }
        lifecycle.completion.take()
    }

    fn complete(&self, finished: Finished<Q::Output>) -> bool {
        let file = match &finished {
            Finished::File(path) => Some(path.clone()),
            Finished::Value(_) => None,
        };
        match self.settle(RequestState::Completed, file) {
            Some(completion) => {
                completion.deliver(finished);
                true
            }
            None => false,
        }
    }

    fn fail(&self, error: RequestError) {
        if let Some(completion) = self.settle(RequestState::Failed, None) {
            debug!(url = self.descriptor.url(), code = error.code(), error = %error, "request failed");
            completion.fail(error);
        }
    }
}

impl<Q: ResultTransform> Drop for Engine<Q> {
    fn drop(&mut self) {
        let lifecycle = self
            .lifecycle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if lifecycle.state == RequestState::Active {
            if let Some(id) = lifecycle.connection_id {
                self.registry.deregister(self.variant, id);
            }
        }
    }
}

impl<Q: ResultTransform + 'static> ActiveRequest for Engine<Q> {
    fn cancel(&self) {
        let completion = self.settle(RequestState::Cancelled, None);
        self.token.cancel();
        if let Some(completion) = completion {
            completion.fail(RequestError::cancelled(self.descriptor.url()));
        }
    }
}

/// A single-use HTTP request with lifecycle tracking.
///
/// Cheap to clone; clones share the same underlying request, so any clone can
/// observe or cancel it.
pub struct ConnectionRequest<Q: ResultTransform + 'static = RawTransform> {
    engine: Arc<Engine<Q>>,
}

impl ConnectionRequest<RawTransform> {
    /// Starts building a request for `descriptor`.
    #[must_use]
    pub fn builder(descriptor: RequestDescriptor) -> RequestBuilder<RawTransform> {
        RequestBuilder::new(descriptor)
    }

    /// A one-off request that yields the raw body.
    #[must_use]
    pub fn basic(descriptor: RequestDescriptor) -> Self {
        Self::builder(descriptor).build()
    }
}

impl ConnectionRequest<JsonTransform<Value>> {
    /// A request whose body is parsed as JSON.
    #[must_use]
    pub fn json(descriptor: RequestDescriptor) -> Self {
        RequestBuilder::new(descriptor)
            .transform(JsonTransform::new())
            .build()
    }
}

impl<Q: ResultTransform + 'static> ConnectionRequest<Q> {
    /// Starts the request in buffered mode.
    ///
    /// Returns immediately; `completion` receives the transformed body or an
    /// error exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Configuration`] without touching the network if
    /// the request was already started, the descriptor is invalid, or no
    /// tokio runtime is running.
    #[instrument(level = "debug", skip_all, fields(url = self.engine.descriptor.url(), variant = %self.engine.variant))]
    pub fn start<F>(&self, completion: F) -> Result<(), RequestError>
    where
        F: FnOnce(Result<Q::Output, RequestError>) + Send + 'static,
    {
        self.engine
            .begin(Completion::Buffered(Box::new(completion)), None)
    }

    /// Starts the request in download mode, streaming the body to
    /// `destination`.
    ///
    /// Without a destination the file is named after the connection id and
    /// placed in the builder's download directory (or the system temp
    /// directory). A failed or cancelled download leaves no file behind.
    /// After [`cancel`](Self::cancel) the driver task removes the partial
    /// file, which can happen shortly after the completion has received
    /// [`RequestError::Cancelled`].
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    #[instrument(level = "debug", skip_all, fields(url = self.engine.descriptor.url(), variant = %self.engine.variant))]
    pub fn start_download<F>(
        &self,
        destination: Option<PathBuf>,
        completion: F,
    ) -> Result<(), RequestError>
    where
        F: FnOnce(Result<PathBuf, RequestError>) + Send + 'static,
    {
        self.engine
            .begin(Completion::Download(Box::new(completion)), destination)
    }

    /// Starts the request and waits for its result.
    ///
    /// Dropping the returned future does not cancel the request; use
    /// [`cancel`](Self::cancel).
    ///
    /// # Errors
    ///
    /// Any [`RequestError`] the request finishes with.
    pub async fn send(&self) -> Result<Q::Output, RequestError> {
        let (tx, rx) = oneshot::channel();
        self.start(move |result| {
            let _ = tx.send(result);
        })?;
        rx.await
            .unwrap_or_else(|_| Err(RequestError::cancelled(self.engine.descriptor.url())))
    }

    /// Downloads to `destination` and waits for the written path.
    ///
    /// # Errors
    ///
    /// Any [`RequestError`] the download finishes with.
    pub async fn download(&self, destination: Option<PathBuf>) -> Result<PathBuf, RequestError> {
        let (tx, rx) = oneshot::channel();
        self.start_download(destination, move |result| {
            let _ = tx.send(result);
        })?;
        rx.await
            .unwrap_or_else(|_| Err(RequestError::cancelled(self.engine.descriptor.url())))
    }

    /// Cancels the request if it is active; otherwise does nothing.
    ///
    /// The completion handler receives [`RequestError::Cancelled`] before this
    /// returns.
    pub fn cancel(&self) {
        ActiveRequest::cancel(self.engine.as_ref());
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RequestState {
        self.engine.lock().state
    }

    /// Returns true while the request is in flight.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.engine.is_active()
    }

    /// Identifier assigned at start.
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.engine.lock().connection_id
    }

    #[must_use]
    pub fn date_started(&self) -> Option<SystemTime> {
        self.engine.lock().date_started
    }

    #[must_use]
    pub fn date_finished(&self) -> Option<SystemTime> {
        self.engine.lock().date_finished
    }

    /// Time from start to the terminal transition; `None` until finished.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.engine.lock().duration
    }

    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.engine.lock().bytes_received
    }

    /// Declared body length, once the response headers arrived.
    #[must_use]
    pub fn bytes_expected(&self) -> Option<u64> {
        self.engine.lock().bytes_expected
    }

    /// Response metadata, once received.
    #[must_use]
    pub fn response(&self) -> Option<ResponseMeta> {
        self.engine.lock().response.clone()
    }

    /// Path of the completed download.
    #[must_use]
    pub fn file_destination(&self) -> Option<PathBuf> {
        self.engine.lock().file_destination.clone()
    }

    #[must_use]
    pub fn variant(&self) -> VariantKey {
        self.engine.variant
    }

    #[must_use]
    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.engine.descriptor
    }
}

impl<Q: ResultTransform + 'static> Clone for ConnectionRequest<Q> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<Q: ResultTransform + 'static> fmt::Debug for ConnectionRequest<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lifecycle = self.engine.lock();
        f.debug_struct("ConnectionRequest")
            .field("url", &self.engine.descriptor.url())
            .field("method", &self.engine.descriptor.method())
            .field("variant", &self.engine.variant)
            .field("state", &lifecycle.state)
            .field("connection_id", &lifecycle.connection_id)
            .finish_non_exhaustive()
    }
}

/// Configures a [`ConnectionRequest`].
///
/// Unless overridden, the variant key is the transform type, errors are
/// wrapped by [`DefaultErrorMapper`], the transport is
/// [`ReqwestTransport::shared`] and the registry is
/// [`ActiveRequestRegistry::global`].
pub struct RequestBuilder<Q = RawTransform> {
    descriptor: RequestDescriptor,
    variant: Option<VariantKey>,
    transform: Q,
    mapper: Box<dyn ErrorMapper>,
    transport: Option<Arc<dyn Transport>>,
    registry: Option<Arc<ActiveRequestRegistry>>,
    progress: Option<ProgressHandler>,
    download_dir: Option<PathBuf>,
}

impl RequestBuilder<RawTransform> {
    #[must_use]
    pub fn new(descriptor: RequestDescriptor) -> Self {
        Self {
            descriptor,
            variant: None,
            transform: RawTransform,
            mapper: Box::new(DefaultErrorMapper::default()),
            transport: None,
            registry: None,
            progress: None,
            download_dir: None,
        }
    }
}

impl<Q: ResultTransform + 'static> RequestBuilder<Q> {
    /// Groups the request under marker type `V` for registry queries.
    #[must_use]
    pub fn variant<V: ?Sized + 'static>(mut self) -> Self {
        self.variant = Some(VariantKey::of::<V>());
        self
    }

    /// Replaces the result transform.
    #[must_use]
    pub fn transform<R: ResultTransform + 'static>(self, transform: R) -> RequestBuilder<R> {
        RequestBuilder {
            descriptor: self.descriptor,
            variant: self.variant,
            transform,
            mapper: self.mapper,
            transport: self.transport,
            registry: self.registry,
            progress: self.progress,
            download_dir: self.download_dir,
        }
    }

    #[must_use]
    pub fn error_mapper(mut self, mapper: impl ErrorMapper + 'static) -> Self {
        self.mapper = Box::new(mapper);
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn registry(mut self, registry: Arc<ActiveRequestRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Called after every received body chunk.
    #[must_use]
    pub fn on_progress<F>(mut self, handler: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(handler));
        self
    }

    /// Directory for downloads started without an explicit destination.
    #[must_use]
    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn build(self) -> ConnectionRequest<Q> {
        let transport = self.transport.unwrap_or_else(|| {
            let shared: Arc<dyn Transport> = ReqwestTransport::shared();
            shared
        });
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::clone(ActiveRequestRegistry::global()));
        ConnectionRequest {
            engine: Arc::new(Engine {
                descriptor: self.descriptor,
                variant: self.variant.unwrap_or_else(VariantKey::of::<Q>),
                transform: self.transform,
                mapper: self.mapper,
                transport,
                registry,
                progress: self.progress,
                download_dir: self.download_dir,
                token: CancellationToken::new(),
                lifecycle: Mutex::new(Lifecycle::default()),
            }),
        }
    }
}

impl<Q> fmt::Debug for RequestBuilder<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("descriptor", &self.descriptor)
            .field("variant", &self.variant)
            .field("transform", &std::any::type_name::<Q>())
            .field("error_code", &self.mapper.error_code())
            .field("has_progress", &self.progress.is_some())
            .field("download_dir", &self.download_dir)
            .finish_non_exhaustive()
    }
}
