//! The assembled build validation record.

use reqwest::Url;
use serde::{Serialize, Serializer};

/// Validation data for one build scan. Every field is populated; fields the
/// build scan never recorded hold their "unavailable" value (`""`, `[]`,
/// `false`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildValidationRecord {
    pub(crate) root_project_name: String,
    pub(crate) build_scan_id: String,
    #[serde(serialize_with = "serialize_url")]
    pub(crate) server_url: Url,
    pub(crate) git_url: String,
    pub(crate) git_branch: String,
    pub(crate) git_commit_id: String,
    pub(crate) requested_tasks: Vec<String>,
    pub(crate) build_successful: bool,
}

impl BuildValidationRecord {
    pub fn root_project_name(&self) -> &str {
        &self.root_project_name
    }

    pub fn build_scan_id(&self) -> &str {
        &self.build_scan_id
    }

    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    /// Link to the build scan page, `{server}/s/{id}`.
    pub fn build_scan_url(&self) -> String {
        format!(
            "{}/s/{}",
            self.server_url.as_str().trim_end_matches('/'),
            self.build_scan_id
        )
    }

    pub fn git_url(&self) -> &str {
        &self.git_url
    }

    pub fn git_branch(&self) -> &str {
        &self.git_branch
    }

    pub fn git_commit_id(&self) -> &str {
        &self.git_commit_id
    }

    pub fn requested_tasks(&self) -> &[String] {
        &self.requested_tasks
    }

    pub fn build_successful(&self) -> bool {
        self.build_successful
    }
}

fn serialize_url<S: Serializer>(url: &Url, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(url.as_str())
}
