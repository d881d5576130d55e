//! Server-sent event transport.
//!
//! [`EventSourceFactory`] opens a long-lived subscription and drives an
//! [`EventSourceListener`] from a background task: events, then exactly one
//! of `on_closed` or `on_failure`. Callbacks for one subscription never run
//! concurrently. The returned [`EventSource`] cancels the subscription.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{ConfigError, ExportError};
use crate::obs;
use crate::sse::SseDecoder;

/// Subscription request.
#[derive(Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub url: Url,
    /// Sent as a bearer token when present.
    pub access_key: Option<String>,
}

impl std::fmt::Debug for StreamRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRequest")
            .field("url", &self.url.as_str())
            .field("access_key", &self.access_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Why a subscription ended abnormally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFailure {
    /// Connecting or reading failed below HTTP.
    Transport(String),
    /// The server answered without an event stream.
    Response { status: u16, body: String },
    /// The listener rejected an event with an already classified error.
    Export(ExportError),
}

/// Handle to a running subscription.
#[derive(Debug, Clone)]
pub struct EventSource {
    cancelled: Arc<watch::Sender<bool>>,
}

impl Default for EventSource {
    fn default() -> Self {
        Self {
            cancelled: Arc::new(watch::channel(false).0),
        }
    }
}

impl EventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop event delivery and release the connection.
    pub fn cancel(&self) {
        self.cancelled.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut receiver = self.cancelled.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

/// Callbacks for one subscription.
pub trait EventSourceListener: Send + Sync {
    fn on_open(&self, _source: &EventSource) {}

    /// One dispatched event. An error aborts the stream and is handed back
    /// through [`on_failure`](Self::on_failure).
    fn on_event(
        &self,
        source: &EventSource,
        id: Option<&str>,
        event_type: Option<&str>,
        data: &str,
    ) -> Result<(), ExportError>;

    /// The server ended the stream cleanly.
    fn on_closed(&self, source: &EventSource);

    fn on_failure(&self, source: &EventSource, failure: StreamFailure);
}

/// Opens subscriptions. Implementations spawn onto the current tokio runtime.
pub trait EventSourceFactory: Send + Sync {
    fn new_event_source(
        &self,
        request: StreamRequest,
        listener: Arc<dyn EventSourceListener>,
    ) -> EventSource;
}

/// Default connection attempts before a connect error is reported.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;

/// reqwest-backed transport.
///
/// The client has no connect or read timeout; streams stay open until the
/// server closes them or the subscription is cancelled. Connection failures
/// are retried with linear backoff.
#[derive(Debug, Clone)]
pub struct ReqwestEventSources {
    client: reqwest::Client,
    connect_attempts: u32,
    retry_backoff: Duration,
}

impl ReqwestEventSources {
    pub fn new() -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("build-scan-export/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client))
    }

    /// Use a preconfigured client (proxies, TLS roots).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            retry_backoff: Duration::from_millis(250),
        }
    }

    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts.max(1);
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    async fn connect(&self, request: &StreamRequest) -> Result<reqwest::Response, reqwest::Error> {
        let mut attempt = 1;
        loop {
            let mut builder = self
                .client
                .get(request.url.clone())
                .header(ACCEPT, "text/event-stream");
            if let Some(key) = &request.access_key {
                builder = builder.bearer_auth(key);
            }

            match builder.send().await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_connect() && attempt < self.connect_attempts => {
                    obs::emit_connect_retry(request.url.as_str(), attempt, &err);
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn drive(
        &self,
        request: StreamRequest,
        listener: &dyn EventSourceListener,
        source: &EventSource,
    ) {
        let response = match self.connect(&request).await {
            Ok(response) => response,
            Err(err) => {
                listener.on_failure(source, StreamFailure::Transport(err.to_string()));
                return;
            }
        };

        let status = response.status();
        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("text/event-stream"))
            .unwrap_or(false);
        if !status.is_success() || !is_event_stream {
            let body = response.text().await.unwrap_or_default();
            listener.on_failure(
                source,
                StreamFailure::Response {
                    status: status.as_u16(),
                    body,
                },
            );
            return;
        }

        listener.on_open(source);

        let mut decoder = SseDecoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    listener.on_failure(
                        source,
                        StreamFailure::Transport(format!("failed to read event stream: {err}")),
                    );
                    return;
                }
            };

            for event in decoder.feed(&chunk) {
                if source.is_cancelled() {
                    return;
                }
                if let Err(err) = listener.on_event(
                    source,
                    event.id.as_deref(),
                    event.event.as_deref(),
                    &event.data,
                ) {
                    listener.on_failure(source, StreamFailure::Export(err));
                    return;
                }
            }
        }

        if decoder.finish() {
            debug!(url = %request.url, "discarded incomplete trailing event");
        }
        listener.on_closed(source);
    }
}

impl EventSourceFactory for ReqwestEventSources {
    fn new_event_source(
        &self,
        request: StreamRequest,
        listener: Arc<dyn EventSourceListener>,
    ) -> EventSource {
        let source = EventSource::new();
        let task_source = source.clone();
        let transport = self.clone();

        tokio::spawn(async move {
            let url = request.url.clone();
            tokio::select! {
                _ = task_source.cancelled() => {
                    debug!(url = %url, "event source cancelled");
                }
                _ = transport.drive(request, listener.as_ref(), &task_source) => {}
            }
        });

        source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let source = EventSource::new();
        let waiter = {
            let source = source.clone();
            tokio::spawn(async move { source.cancelled().await })
        };

        assert!(!source.is_cancelled());
        source.cancel();
        waiter.await.unwrap();
        assert!(source.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_after_cancel() {
        let source = EventSource::new();
        source.cancel();
        source.cancelled().await;
    }

    #[test]
    fn test_request_debug_redacts_access_key() {
        let request = StreamRequest {
            url: Url::parse("https://ge.example.com/build-export/v1/build/x/events").unwrap(),
            access_key: Some("secret-token".to_string()),
        };
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_connect_attempts_never_zero() {
        let sources = ReqwestEventSources::new().unwrap().with_connect_attempts(0);
        assert_eq!(sources.connect_attempts, 1);
    }
}
