//! Error taxonomy for build scan export operations.
//!
//! Every fetch failure is classified into exactly one [`ExportError`] that
//! names the build scan and the server it was fetched from. Errors are
//! `Clone` because a single classified failure is delivered to every
//! pending aggregator slot.

use reqwest::Url;
use thiserror::Error;

/// Identifies the build scan a fetch is working on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRef {
    /// Opaque build scan id.
    pub build_scan_id: String,
    /// Base URL of the server hosting the build scan.
    pub server_url: Url,
}

impl ScanRef {
    pub fn new(build_scan_id: impl Into<String>, server_url: Url) -> Self {
        Self {
            build_scan_id: build_scan_id.into(),
            server_url,
        }
    }
}

impl std::fmt::Display for ScanRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} on {}", self.build_scan_id, self.server_url)
    }
}

/// Classified failure of a build scan fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    /// The server answered 401.
    #[error("authentication failed for build scan {build_scan_id} on {server_url}")]
    AuthenticationFailed {
        build_scan_id: String,
        server_url: Url,
    },

    /// The server answered 404.
    #[error("build scan {build_scan_id} not found on {server_url}")]
    BuildScanNotFound {
        build_scan_id: String,
        server_url: Url,
    },

    /// The server answered with any other status, or not with an event stream.
    #[error("unexpected response (HTTP {status}) for build scan {build_scan_id} on {server_url}")]
    UnexpectedResponse {
        build_scan_id: String,
        server_url: Url,
        status: u16,
        body: String,
    },

    /// A `BuildEvent` payload could not be decoded.
    #[error("unparsable event in build scan {build_scan_id} on {server_url}: {reason}")]
    UnparsableBuildScanEvent {
        build_scan_id: String,
        server_url: Url,
        payload: String,
        reason: String,
    },

    #[error("unexpected error while fetching build scan {build_scan_id} from {server_url}: {cause}")]
    UnexpectedExceptionWhileFetchingBuildScan {
        build_scan_id: String,
        server_url: Url,
        cause: String,
    },

    #[error("interrupted while fetching build scan {build_scan_id} from {server_url}")]
    InterruptedWhileFetchingBuildScan {
        build_scan_id: String,
        server_url: Url,
    },
}

impl ExportError {
    pub fn authentication_failed(scan: &ScanRef) -> Self {
        Self::AuthenticationFailed {
            build_scan_id: scan.build_scan_id.clone(),
            server_url: scan.server_url.clone(),
        }
    }

    pub fn build_scan_not_found(scan: &ScanRef) -> Self {
        Self::BuildScanNotFound {
            build_scan_id: scan.build_scan_id.clone(),
            server_url: scan.server_url.clone(),
        }
    }

    pub fn unexpected_response(scan: &ScanRef, status: u16, body: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            build_scan_id: scan.build_scan_id.clone(),
            server_url: scan.server_url.clone(),
            status,
            body: body.into(),
        }
    }

    pub fn unparsable_event(
        scan: &ScanRef,
        payload: impl Into<String>,
        reason: &dyn std::fmt::Display,
    ) -> Self {
        Self::UnparsableBuildScanEvent {
            build_scan_id: scan.build_scan_id.clone(),
            server_url: scan.server_url.clone(),
            payload: payload.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unexpected(scan: &ScanRef, cause: &dyn std::fmt::Display) -> Self {
        Self::UnexpectedExceptionWhileFetchingBuildScan {
            build_scan_id: scan.build_scan_id.clone(),
            server_url: scan.server_url.clone(),
            cause: cause.to_string(),
        }
    }

    pub fn interrupted(scan: &ScanRef) -> Self {
        Self::InterruptedWhileFetchingBuildScan {
            build_scan_id: scan.build_scan_id.clone(),
            server_url: scan.server_url.clone(),
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(scan: &ScanRef, status: u16, body: impl Into<String>) -> Self {
        match status {
            401 => Self::authentication_failed(scan),
            404 => Self::build_scan_not_found(scan),
            _ => Self::unexpected_response(scan, status, body),
        }
    }

    pub fn build_scan_id(&self) -> &str {
        match self {
            Self::AuthenticationFailed { build_scan_id, .. }
            | Self::BuildScanNotFound { build_scan_id, .. }
            | Self::UnexpectedResponse { build_scan_id, .. }
            | Self::UnparsableBuildScanEvent { build_scan_id, .. }
            | Self::UnexpectedExceptionWhileFetchingBuildScan { build_scan_id, .. }
            | Self::InterruptedWhileFetchingBuildScan { build_scan_id, .. } => build_scan_id,
        }
    }

    pub fn server_url(&self) -> &Url {
        match self {
            Self::AuthenticationFailed { server_url, .. }
            | Self::BuildScanNotFound { server_url, .. }
            | Self::UnexpectedResponse { server_url, .. }
            | Self::UnparsableBuildScanEvent { server_url, .. }
            | Self::UnexpectedExceptionWhileFetchingBuildScan { server_url, .. }
            | Self::InterruptedWhileFetchingBuildScan { server_url, .. } => server_url,
        }
    }

    /// Stable short name of the error kind, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed { .. } => "authentication_failed",
            Self::BuildScanNotFound { .. } => "build_scan_not_found",
            Self::UnexpectedResponse { .. } => "unexpected_response",
            Self::UnparsableBuildScanEvent { .. } => "unparsable_build_scan_event",
            Self::UnexpectedExceptionWhileFetchingBuildScan { .. } => "unexpected_exception",
            Self::InterruptedWhileFetchingBuildScan { .. } => "interrupted",
        }
    }
}

/// Errors raised while assembling client configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid server URL {url}: {reason}")]
    InvalidServerUrl { url: String, reason: String },

    #[error("invalid custom value key mapping at line {line}: {reason}")]
    InvalidMapping { line: usize, reason: String },

    #[error("invalid access key entry: {0}")]
    InvalidAccessKey(String),

    #[error("HTTP client could not be built: {0}")]
    HttpClient(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ConfigError {
    fn from(err: reqwest::Error) -> Self {
        ConfigError::HttpClient(err.to_string())
    }
}

/// Result type for build scan fetches.
pub type Result<T> = std::result::Result<T, ExportError>;
