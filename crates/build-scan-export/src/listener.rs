//! Stream lifecycle handling for one build scan fetch.
//!
//! [`BuildValidationListener`] decodes `BuildEvent` payloads, routes them
//! into the aggregator, and settles every outstanding slot when the stream
//! ends: with "unavailable" defaults on a clean close, or with one
//! classified error on failure.

use std::sync::{Mutex, PoisonError};

use tracing::{debug, trace};

use crate::aggregator::Aggregator;
use crate::error::{ExportError, ScanRef};
use crate::events::{BuildEvent, BUILD_EVENT};
use crate::keys::CustomValueKeys;
use crate::obs;
use crate::router::EventRouter;
use crate::transport::{EventSource, EventSourceListener, StreamFailure};

/// Lifecycle of one subscription. `Closed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Streaming,
    Closed,
    Failed,
}

#[derive(Debug)]
pub struct BuildValidationListener {
    scan: ScanRef,
    keys: CustomValueKeys,
    aggregator: Aggregator,
    state: Mutex<StreamState>,
}

impl BuildValidationListener {
    pub fn new(scan: ScanRef, keys: CustomValueKeys, aggregator: Aggregator) -> Self {
        Self {
            scan,
            keys,
            aggregator,
            state: Mutex::new(StreamState::Streaming),
        }
    }

    pub fn state(&self) -> StreamState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Map a transport failure onto the error taxonomy. Errors that are
    /// already classified pass through unchanged.
    pub fn classify(&self, failure: StreamFailure) -> ExportError {
        match failure {
            StreamFailure::Export(error) => error,
            StreamFailure::Response { status, body } => {
                ExportError::from_status(&self.scan, status, body)
            }
            StreamFailure::Transport(cause) => ExportError::unexpected(&self.scan, &cause),
        }
    }

    /// Move to a terminal state. Returns `false` if already terminal.
    fn finish(&self, next: StreamState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != StreamState::Streaming {
            return false;
        }
        *state = next;
        true
    }
}

impl EventSourceListener for BuildValidationListener {
    fn on_event(
        &self,
        _source: &EventSource,
        _id: Option<&str>,
        event_type: Option<&str>,
        data: &str,
    ) -> Result<(), ExportError> {
        if self.state() != StreamState::Streaming {
            debug!(build_scan_id = %self.scan.build_scan_id, "event after stream end ignored");
            return Ok(());
        }
        if event_type != Some(BUILD_EVENT) {
            trace!(build_scan_id = %self.scan.build_scan_id, event_type = ?event_type, "skipping non-build event");
            return Ok(());
        }

        let event = BuildEvent::parse(data)
            .map_err(|err| ExportError::unparsable_event(&self.scan, data, &err))?;
        let settled = EventRouter::new(&self.aggregator, &self.keys).route(&event);
        obs::emit_event_routed(&self.scan.build_scan_id, event.type_name(), &settled);
        Ok(())
    }

    fn on_closed(&self, _source: &EventSource) {
        if !self.finish(StreamState::Closed) {
            return;
        }
        // A clean close means the scan never recorded the missing values.
        let defaulted = self.aggregator.resolve_pending_with_defaults();
        obs::emit_stream_closed(&self.scan.build_scan_id, &defaulted);
    }

    fn on_failure(&self, source: &EventSource, failure: StreamFailure) {
        if !self.finish(StreamState::Failed) {
            return;
        }
        let error = self.classify(failure);
        obs::emit_stream_failed(&self.scan.build_scan_id, &error);
        self.aggregator.fail_pending(error);
        source.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{channel, Completion};
    use reqwest::Url;

    fn scan() -> ScanRef {
        ScanRef::new("abc123", Url::parse("https://ge.example.com").unwrap())
    }

    fn listener() -> (BuildValidationListener, Completion) {
        let (aggregator, completion) = channel();
        let keys = CustomValueKeys::new("gitRepo", "gitBranch", "gitCommit");
        (BuildValidationListener::new(scan(), keys, aggregator), completion)
    }

    fn build_event(listener: &BuildValidationListener, source: &EventSource, data: &str) {
        listener
            .on_event(source, None, Some(BUILD_EVENT), data)
            .expect("event should route");
    }

    #[tokio::test]
    async fn test_worked_example() {
        let (listener, completion) = listener();
        let source = EventSource::new();

        build_event(&listener, &source, r#"{"type":{"eventType":"ProjectStructure"},"data":{"rootProjectName":"app"}}"#);
        build_event(&listener, &source, r#"{"type":{"eventType":"BuildRequestedTasks"},"data":{"requested":["build","test"]}}"#);
        build_event(&listener, &source, r#"{"type":{"eventType":"UserNamedValue"},"data":{"key":"gitRepo","value":"git@x"}}"#);
        build_event(&listener, &source, r#"{"type":{"eventType":"BuildFinished"},"data":{"failure":null}}"#);
        listener.on_closed(&source);

        let record = completion.wait(&scan()).await.unwrap();
        assert_eq!(record.root_project_name(), "app");
        assert_eq!(record.requested_tasks(), ["build", "test"]);
        assert_eq!(record.git_url(), "git@x");
        assert_eq!(record.git_branch(), "");
        assert_eq!(record.git_commit_id(), "");
        assert!(record.build_successful());
        assert_eq!(listener.state(), StreamState::Closed);
    }

    #[tokio::test]
    async fn test_non_build_events_are_ignored() {
        let (listener, completion) = listener();
        let source = EventSource::new();

        listener
            .on_event(&source, None, Some("Heartbeat"), "not json at all")
            .unwrap();
        listener.on_event(&source, None, None, "{}").unwrap();
        listener.on_closed(&source);

        let record = completion.wait(&scan()).await.unwrap();
        assert_eq!(record.root_project_name(), "");
    }

    #[tokio::test]
    async fn test_malformed_payload_is_unparsable() {
        let (listener, _completion) = listener();
        let source = EventSource::new();

        let err = listener
            .on_event(&source, None, Some(BUILD_EVENT), "{\"type\":")
            .unwrap_err();
        match err {
            ExportError::UnparsableBuildScanEvent { payload, .. } => assert_eq!(payload, "{\"type\":"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_fails_pending_slots_and_cancels() {
        let (listener, completion) = listener();
        let source = EventSource::new();

        build_event(&listener, &source, r#"{"type":{"eventType":"ProjectStructure"},"data":{"rootProjectName":"app"}}"#);
        listener.on_failure(
            &source,
            StreamFailure::Response {
                status: 500,
                body: "oops".to_string(),
            },
        );

        assert!(source.is_cancelled());
        assert_eq!(listener.state(), StreamState::Failed);
        let err = completion.wait(&scan()).await.unwrap_err();
        assert!(matches!(err, ExportError::UnexpectedResponse { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_close_after_failure_does_not_default() {
        let (listener, completion) = listener();
        let source = EventSource::new();

        listener.on_failure(&source, StreamFailure::Transport("connection reset".to_string()));
        listener.on_closed(&source);

        let err = completion.wait(&scan()).await.unwrap_err();
        assert!(matches!(
            err,
            ExportError::UnexpectedExceptionWhileFetchingBuildScan { .. }
        ));
    }

    #[test]
    fn test_classification() {
        let (listener, _completion) = listener();
        let passthrough = ExportError::interrupted(&scan());

        assert!(matches!(
            listener.classify(StreamFailure::Response { status: 401, body: String::new() }),
            ExportError::AuthenticationFailed { .. }
        ));
        assert!(matches!(
            listener.classify(StreamFailure::Response { status: 404, body: String::new() }),
            ExportError::BuildScanNotFound { .. }
        ));
        assert!(matches!(
            listener.classify(StreamFailure::Transport("dns".to_string())),
            ExportError::UnexpectedExceptionWhileFetchingBuildScan { .. }
        ));
        assert_eq!(
            listener.classify(StreamFailure::Export(passthrough.clone())),
            passthrough
        );
    }
}
