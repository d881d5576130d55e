//! Client facade: one call per build scan.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use reqwest::Url;
use tracing::{warn, Instrument};

use crate::aggregator;
use crate::config::ClientConfig;
use crate::error::{ConfigError, ExportError, Result, ScanRef};
use crate::events::EventType;
use crate::listener::BuildValidationListener;
use crate::obs;
use crate::record::BuildValidationRecord;
use crate::transport::{EventSource, EventSourceFactory, ReqwestEventSources, StreamRequest};

/// Export API path below the server base URL.
const EXPORT_PATH: [&str; 3] = ["build-export", "v1", "build"];

/// Fetches build validation records from the build export API.
pub struct BuildValidationClient {
    config: ClientConfig,
    sources: Arc<dyn EventSourceFactory>,
}

impl BuildValidationClient {
    /// Client backed by the reqwest transport.
    pub fn new(config: ClientConfig) -> std::result::Result<Self, ConfigError> {
        let sources =
            ReqwestEventSources::new()?.with_connect_attempts(config.connect_attempts);
        Ok(Self::with_event_sources(config, Arc::new(sources)))
    }

    /// Client backed by a caller-supplied transport.
    pub fn with_event_sources(config: ClientConfig, sources: Arc<dyn EventSourceFactory>) -> Self {
        if config.custom_value_keys.has_duplicates() {
            warn!(
                keys = ?config.custom_value_keys,
                "custom value keys overlap; one event may settle several git fields"
            );
        }
        Self { config, sources }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn server_url(&self) -> &Url {
        &self.config.server_url
    }

    /// Fetch the validation record for `build_scan_id`.
    pub async fn fetch(&self, build_scan_id: &str) -> Result<BuildValidationRecord> {
        self.fetch_with_interrupt(build_scan_id, std::future::pending())
            .await
    }

    /// Like [`fetch`](Self::fetch), but gives up with
    /// `InterruptedWhileFetchingBuildScan` once `interrupt` completes.
    pub async fn fetch_with_interrupt<F>(
        &self,
        build_scan_id: &str,
        interrupt: F,
    ) -> Result<BuildValidationRecord>
    where
        F: Future<Output = ()>,
    {
        let span = obs::fetch_span(build_scan_id, self.config.server_url.as_str());
        async move {
            let started = Instant::now();
            let result = self.run_fetch(build_scan_id, interrupt).await;
            obs::emit_fetch_finished(
                build_scan_id,
                started.elapsed().as_millis() as u64,
                result.is_ok(),
            );
            result
        }
        .instrument(span)
        .await
    }

    /// Blocking variant for callers without a runtime.
    ///
    /// # Panics
    ///
    /// Panics when called from within a tokio runtime.
    pub fn fetch_blocking(&self, build_scan_id: &str) -> Result<BuildValidationRecord> {
        let scan = self.scan_ref(build_scan_id);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| ExportError::unexpected(&scan, &err))?;
        runtime.block_on(self.fetch(build_scan_id))
    }

    async fn run_fetch<F>(&self, build_scan_id: &str, interrupt: F) -> Result<BuildValidationRecord>
    where
        F: Future<Output = ()>,
    {
        let scan = self.scan_ref(build_scan_id);
        let url = endpoint_for(&self.config.server_url, build_scan_id)
            .map_err(|cause| ExportError::unexpected(&scan, &cause))?;
        obs::emit_fetch_started(build_scan_id, url.as_str());

        let (aggregator, completion) = aggregator::channel();
        let listener = BuildValidationListener::new(
            scan.clone(),
            self.config.custom_value_keys.clone(),
            aggregator,
        );
        let request = StreamRequest {
            url,
            access_key: self.config.access_key.clone(),
        };
        let source = CancelOnDrop(self.sources.new_event_source(request, Arc::new(listener)));

        tokio::select! {
            result = completion.wait(&scan) => result,
            _ = interrupt => {
                source.0.cancel();
                Err(ExportError::interrupted(&scan))
            }
        }
    }

    fn scan_ref(&self, build_scan_id: &str) -> ScanRef {
        ScanRef::new(build_scan_id, self.config.server_url.clone())
    }
}

/// Cancels the subscription when the fetch returns or is dropped.
struct CancelOnDrop(EventSource);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// `{server}/build-export/v1/build/{id}/events?eventTypes=...`, keeping any
/// context path on the server URL.
pub fn endpoint_for(server_url: &Url, build_scan_id: &str) -> std::result::Result<Url, String> {
    if build_scan_id.trim().is_empty() {
        return Err("build scan id must not be empty".to_string());
    }

    let mut url = server_url.clone();
    url.path_segments_mut()
        .map_err(|_| format!("{server_url} cannot be used as a base URL"))?
        .pop_if_empty()
        .extend(EXPORT_PATH)
        .push(build_scan_id)
        .push("events");
    url.set_fragment(None);
    url.set_query(Some(&format!("eventTypes={}", EventType::query_value())));
    Ok(url)
}
