//! Custom value keys used to recognise git metadata in `UserNamedValue` events.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Mapping from git metadata fields to the custom value keys a build records
/// them under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomValueKeys {
    git_repository_key: String,
    git_branch_key: String,
    git_commit_id_key: String,
}

impl Default for CustomValueKeys {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_GIT_REPOSITORY_KEY,
            Self::DEFAULT_GIT_BRANCH_KEY,
            Self::DEFAULT_GIT_COMMIT_ID_KEY,
        )
    }
}

impl CustomValueKeys {
    pub const DEFAULT_GIT_REPOSITORY_KEY: &'static str = "Git repository";
    pub const DEFAULT_GIT_BRANCH_KEY: &'static str = "Git branch";
    pub const DEFAULT_GIT_COMMIT_ID_KEY: &'static str = "Git commit id";

    pub fn new(
        git_repository_key: impl Into<String>,
        git_branch_key: impl Into<String>,
        git_commit_id_key: impl Into<String>,
    ) -> Self {
        Self {
            git_repository_key: git_repository_key.into(),
            git_branch_key: git_branch_key.into(),
            git_commit_id_key: git_commit_id_key.into(),
        }
    }

    pub fn git_repository_key(&self) -> &str {
        &self.git_repository_key
    }

    pub fn git_branch_key(&self) -> &str {
        &self.git_branch_key
    }

    pub fn git_commit_id_key(&self) -> &str {
        &self.git_commit_id_key
    }

    /// True when two fields share a key, so one event would resolve both.
    pub fn has_duplicates(&self) -> bool {
        self.git_repository_key == self.git_branch_key
            || self.git_repository_key == self.git_commit_id_key
            || self.git_branch_key == self.git_commit_id_key
    }

    /// Parse a mapping file body, overriding the defaults.
    ///
    /// ```text
    /// # comment
    /// git.repository=Git repository
    /// git.branch=Git branch
    /// git.commitId=Git commit id
    /// ```
    pub fn from_mapping(text: &str) -> Result<Self, ConfigError> {
        let mut keys = Self::default();

        for (index, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (name, value) = line.split_once('=').ok_or_else(|| ConfigError::InvalidMapping {
                line: index + 1,
                reason: format!("expected <field>=<custom value key>, got '{line}'"),
            })?;
            let value = value.trim();
            if value.is_empty() {
                return Err(ConfigError::InvalidMapping {
                    line: index + 1,
                    reason: format!("empty custom value key for '{}'", name.trim()),
                });
            }

            match name.trim() {
                "git.repository" => keys.git_repository_key = value.to_string(),
                "git.branch" => keys.git_branch_key = value.to_string(),
                "git.commitId" => keys.git_commit_id_key = value.to_string(),
                other => {
                    return Err(ConfigError::InvalidMapping {
                        line: index + 1,
                        reason: format!("unknown field '{other}'"),
                    })
                }
            }
        }

        Ok(keys)
    }

    pub fn from_mapping_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_mapping(&text)
    }
}
