//! reqwest-backed [`Transport`] implementation.
//!
//! One [`ReqwestTransport`] is meant to be created once and shared by many
//! requests so they reuse reqwest's connection handling.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tracing::{debug, instrument, trace};

use super::{ResponseMeta, Transport, TransportError, TransportEvents, TransportRequest};
use crate::config::TransportConfig;

static SHARED: LazyLock<Option<Arc<ReqwestTransport>>> = LazyLock::new(|| {
    ReqwestTransport::with_config(&TransportConfig::default().with_env_overrides())
        .ok()
        .map(Arc::new)
});

/// HTTP transport built on a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes
    /// - Gzip decompression: enabled
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static default
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_config(&TransportConfig::default())
            .expect("failed to build HTTP client with static configuration")
    }

    /// Creates a transport from explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ClientBuild`] if reqwest rejects the settings.
    #[instrument(level = "debug", skip(config))]
    pub fn with_config(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .gzip(config.gzip)
            .user_agent(config.effective_user_agent())
            .build()
            .map_err(|source| TransportError::ClientBuild { source })?;
        debug!(
            connect_timeout_secs = config.connect_timeout_secs,
            read_timeout_secs = config.read_timeout_secs,
            "built reqwest transport"
        );
        Ok(Self { client })
    }

    /// Process-wide transport used by requests that do not inject their own.
    ///
    /// Built lazily from defaults plus `CONNECTION_REQUEST_*` environment
    /// overrides; falls back to static defaults if the overrides are rejected.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        match SHARED.as_ref() {
            Some(transport) => Arc::clone(transport),
            None => Arc::new(Self::new()),
        }
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    fn name(&self) -> &str {
        "reqwest"
    }

    #[instrument(skip(self, request, events), fields(method = %request.method, url = %request.url))]
    async fn execute(
        &self,
        request: TransportRequest,
        events: TransportEvents,
    ) -> Result<ResponseMeta, TransportError> {
        let url = request.url.to_string();
        let mut builder = self
            .client
            .request(request.method.to_reqwest(), request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&url, e))?;

        let meta = ResponseMeta {
            status: response.status().as_u16(),
            url: response.url().clone(),
            headers: response.headers().clone(),
            content_length: response.content_length(),
        };
        debug!(status = meta.status, content_length = ?meta.content_length, "response received");

        if !events.response(meta.clone()).await {
            debug!("engine stopped listening before body transfer");
            return Ok(meta);
        }

        if !meta.is_success() {
            return Err(TransportError::http_status(url, meta.status));
        }

        let mut stream = response.bytes_stream();
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| TransportError::from_reqwest(&url, e))?;
            trace!(len = chunk.len(), "body chunk");
            if !events.data(chunk).await {
                debug!("engine stopped listening mid-body");
                break;
            }
        }

        Ok(meta)
    }
}
