//! Scripted transport (testing only)
//!
//! [`ScriptedEventSources`] replays a fixed list of [`StreamSignal`]s to the
//! listener on a spawned task, without any network access. Every opened
//! request and event source is recorded for later assertions.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::events::BUILD_EVENT;
use crate::transport::{
    EventSource, EventSourceFactory, EventSourceListener, StreamFailure, StreamRequest,
};

/// One step of a scripted stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSignal {
    Event {
        event_type: Option<String>,
        data: String,
    },
    /// Clean end of stream.
    Closed,
    Failed(StreamFailure),
    /// Deliver nothing more until the source is cancelled.
    Hang,
}

impl StreamSignal {
    /// A `BuildEvent` envelope for `event_type` carrying `data`.
    pub fn build_event(event_type: &str, data: Value) -> Self {
        let envelope = serde_json::json!({
            "timestamp": 0,
            "type": { "majorVersion": 1, "minorVersion": 0, "eventType": event_type },
            "data": data,
        });
        StreamSignal::Event {
            event_type: Some(BUILD_EVENT.to_string()),
            data: envelope.to_string(),
        }
    }

    /// A `BuildEvent` whose payload is sent verbatim.
    pub fn raw_build_event(data: impl Into<String>) -> Self {
        StreamSignal::Event {
            event_type: Some(BUILD_EVENT.to_string()),
            data: data.into(),
        }
    }

    pub fn http_status(status: u16) -> Self {
        StreamSignal::Failed(StreamFailure::Response {
            status,
            body: String::new(),
        })
    }
}

/// Transport that replays a script. Running off the end of the script drops
/// the listener without a terminal callback.
#[derive(Debug, Default)]
pub struct ScriptedEventSources {
    script: Vec<StreamSignal>,
    requests: Mutex<Vec<StreamRequest>>,
    sources: Mutex<Vec<EventSource>>,
}

impl ScriptedEventSources {
    pub fn new(script: Vec<StreamSignal>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sources(&self) -> Vec<EventSource> {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EventSourceFactory for ScriptedEventSources {
    fn new_event_source(
        &self,
        request: StreamRequest,
        listener: Arc<dyn EventSourceListener>,
    ) -> EventSource {
        let source = EventSource::new();
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(source.clone());

        let script = self.script.clone();
        let task_source = source.clone();
        tokio::spawn(async move {
            for signal in script {
                if task_source.is_cancelled() {
                    return;
                }
                tokio::task::yield_now().await;

                match signal {
                    StreamSignal::Event { event_type, data } => {
                        if let Err(err) =
                            listener.on_event(&task_source, None, event_type.as_deref(), &data)
                        {
                            listener.on_failure(&task_source, StreamFailure::Export(err));
                            return;
                        }
                    }
                    StreamSignal::Closed => {
                        listener.on_closed(&task_source);
                        return;
                    }
                    StreamSignal::Failed(failure) => {
                        listener.on_failure(&task_source, failure);
                        return;
                    }
                    StreamSignal::Hang => {
                        task_source.cancelled().await;
                        return;
                    }
                }
            }
        });

        source
    }
}
