//! Structured observability hooks for build scan fetches.
//!
//! Events are emitted with an `event = "..."` field so they can be filtered
//! in JSON log pipelines (see [`crate::telemetry::init_tracing`]).

use tracing::{debug, info, warn};

use crate::aggregator::Field;
use crate::error::ExportError;

/// Span covering one fetch; attach with `tracing::Instrument`.
pub fn fetch_span(build_scan_id: &str, server_url: &str) -> tracing::Span {
    tracing::info_span!("build_scan.fetch", build_scan_id = %build_scan_id, server_url = %server_url)
}

pub fn emit_fetch_started(build_scan_id: &str, endpoint: &str) {
    info!(event = "fetch.started", build_scan_id = %build_scan_id, endpoint = %endpoint);
}

pub fn emit_fetch_finished(build_scan_id: &str, duration_ms: u64, success: bool) {
    info!(
        event = "fetch.finished",
        build_scan_id = %build_scan_id,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: a build event settled one or more fields.
pub fn emit_event_routed(build_scan_id: &str, event_type: &str, settled: &[Field]) {
    let fields: Vec<&str> = settled.iter().map(Field::as_str).collect();
    debug!(
        event = "stream.event_routed",
        build_scan_id = %build_scan_id,
        event_type = %event_type,
        settled = ?fields,
    );
}

/// Emit event: the server closed the stream; `defaulted` fields were never sent.
pub fn emit_stream_closed(build_scan_id: &str, defaulted: &[Field]) {
    let fields: Vec<&str> = defaulted.iter().map(Field::as_str).collect();
    info!(
        event = "stream.closed",
        build_scan_id = %build_scan_id,
        defaulted = ?fields,
    );
}

/// Emit event: stream failure (warning level).
pub fn emit_stream_failed(build_scan_id: &str, error: &ExportError) {
    warn!(
        event = "stream.failed",
        build_scan_id = %build_scan_id,
        kind = error.kind(),
        error = %error,
    );
}

pub fn emit_connect_retry(url: &str, attempt: u32, error: &dyn std::fmt::Display) {
    warn!(event = "stream.connect_retry", url = %url, attempt = attempt, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanRef;
    use reqwest::Url;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_stream_failed_logs_kind() {
        let scan = ScanRef::new("abc123", Url::parse("https://ge.example.com").unwrap());
        emit_stream_failed("abc123", &ExportError::authentication_failed(&scan));
        assert!(logs_contain("stream.failed"));
        assert!(logs_contain("authentication_failed"));
    }

    #[traced_test]
    #[test]
    fn test_stream_closed_lists_defaulted_fields() {
        emit_stream_closed("abc123", &[Field::GitBranch, Field::GitCommitId]);
        assert!(logs_contain("git_branch"));
        assert!(logs_contain("git_commit_id"));
    }

    #[test]
    fn test_fetch_span_create() {
        let _span = fetch_span("abc123", "https://ge.example.com/").entered();
    }
}
