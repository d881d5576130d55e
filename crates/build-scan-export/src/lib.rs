//! Build Scan Export: build validation data over server-sent events
//!
//! This crate subscribes to the build export API of a Develocity / Gradle
//! Enterprise server and reduces the event stream of one build scan to a
//! [`BuildValidationRecord`]: root project, requested tasks, git metadata
//! and outcome.
//!
//! ## Key Components
//!
//! - `BuildValidationClient`: opens the stream and waits for the record
//! - `EventRouter`: maps `ProjectStructure`, `BuildRequestedTasks`,
//!   `UserNamedValue` and `BuildFinished` events to record fields
//! - `Aggregator` / `Completion`: write-once slots, one per field
//! - `BuildValidationListener`: defaults missing fields on close, fails
//!   everything on error
//! - `ReqwestEventSources`: SSE transport over reqwest
//!
//! ## Example
//!
//! ```rust,ignore
//! use build_scan_export::{BuildValidationClient, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::from_env("https://ge.example.com")?;
//!     let client = BuildValidationClient::new(config)?;
//!     let record = client.fetch("abc123xyz").await?;
//!     println!("{} -> {}", record.root_project_name(), record.build_successful());
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod client;
pub mod config;
mod error;
pub mod events;
pub mod fakes;
pub mod keys;
pub mod listener;
pub mod obs;
pub mod record;
pub mod router;
pub mod slot;
pub mod sse;
pub mod telemetry;
pub mod transport;

pub use aggregator::{Aggregator, Completion, Field};
pub use client::{endpoint_for, BuildValidationClient};
pub use config::{lookup_access_key, ClientConfig, ACCESS_KEY_ENV};
pub use error::{ConfigError, ExportError, Result, ScanRef};
pub use events::{BuildEvent, EventType, BUILD_EVENT};
pub use keys::CustomValueKeys;
pub use listener::{BuildValidationListener, StreamState};
pub use record::BuildValidationRecord;
pub use router::EventRouter;
pub use slot::{Slot, SlotState};
pub use sse::{SseDecoder, SseEvent};
pub use telemetry::init_tracing;
pub use reqwest::Url;
pub use transport::{
    EventSource, EventSourceFactory, EventSourceListener, ReqwestEventSources, StreamFailure,
    StreamRequest,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
