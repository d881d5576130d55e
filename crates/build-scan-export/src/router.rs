//! Routes decoded build events to the aggregator slots they settle.

use crate::aggregator::{Aggregator, Field};
use crate::events::BuildEvent;
use crate::keys::CustomValueKeys;

/// Stateless dispatcher from [`BuildEvent`] to [`Aggregator`] slots.
///
/// Safe to call repeatedly and in any order; slots keep the first value
/// they receive.
#[derive(Debug, Clone, Copy)]
pub struct EventRouter<'a> {
    aggregator: &'a Aggregator,
    keys: &'a CustomValueKeys,
}

impl<'a> EventRouter<'a> {
    pub fn new(aggregator: &'a Aggregator, keys: &'a CustomValueKeys) -> Self {
        Self { aggregator, keys }
    }

    /// Apply one event. Returns the fields this event settled.
    pub fn route(&self, event: &BuildEvent) -> Vec<Field> {
        let mut settled = Vec::new();
        match event {
            BuildEvent::ProjectStructure(structure) => {
                if self
                    .aggregator
                    .resolve_root_project_name(structure.root_project_name.clone())
                {
                    settled.push(Field::RootProjectName);
                }
            }
            BuildEvent::BuildRequestedTasks(tasks) => {
                if self
                    .aggregator
                    .resolve_requested_tasks(tasks.requested.clone())
                {
                    settled.push(Field::RequestedTasks);
                }
            }
            BuildEvent::UserNamedValue(named) => {
                let value = named.value.clone().unwrap_or_default();
                // Each key is checked on its own: a mapping that reuses a key
                // settles every field bound to it.
                if named.key == self.keys.git_repository_key()
                    && self.aggregator.resolve_git_url(value.clone())
                {
                    settled.push(Field::GitUrl);
                }
                if named.key == self.keys.git_branch_key()
                    && self.aggregator.resolve_git_branch(value.clone())
                {
                    settled.push(Field::GitBranch);
                }
                if named.key == self.keys.git_commit_id_key()
                    && self.aggregator.resolve_git_commit_id(value)
                {
                    settled.push(Field::GitCommitId);
                }
            }
            BuildEvent::BuildFinished(finished) => {
                if self
                    .aggregator
                    .resolve_build_successful(finished.successful())
                {
                    settled.push(Field::BuildSuccessful);
                }
            }
            BuildEvent::Other(_) => {}
        }
        settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::channel;
    use crate::error::ScanRef;
    use crate::events::{BuildFinished, BuildRequestedTasks, ProjectStructure, UserNamedValue};
    use reqwest::Url;

    fn scan() -> ScanRef {
        ScanRef::new("abc123", Url::parse("https://ge.example.com").unwrap())
    }

    fn named(key: &str, value: &str) -> BuildEvent {
        BuildEvent::UserNamedValue(UserNamedValue {
            key: key.to_string(),
            value: Some(value.to_string()),
        })
    }

    #[tokio::test]
    async fn test_routes_each_event_type() {
        let keys = CustomValueKeys::new("repo", "branch", "commit");
        let (aggregator, completion) = channel();
        let router = EventRouter::new(&aggregator, &keys);

        router.route(&BuildEvent::BuildFinished(BuildFinished { failure: None }));
        router.route(&named("commit", "deadbeef"));
        router.route(&BuildEvent::BuildRequestedTasks(BuildRequestedTasks {
            requested: vec!["build".to_string(), "test".to_string()],
        }));
        router.route(&named("branch", "main"));
        router.route(&BuildEvent::ProjectStructure(ProjectStructure {
            root_project_name: "app".to_string(),
        }));
        router.route(&named("repo", "git@x"));

        let record = completion.wait(&scan()).await.unwrap();
        assert_eq!(record.root_project_name(), "app");
        assert_eq!(record.requested_tasks(), ["build", "test"]);
        assert_eq!(record.git_url(), "git@x");
        assert_eq!(record.git_branch(), "main");
        assert_eq!(record.git_commit_id(), "deadbeef");
        assert!(record.build_successful());
    }

    #[test]
    fn test_unmatched_named_value_settles_nothing() {
        let keys = CustomValueKeys::default();
        let (aggregator, _completion) = channel();
        let router = EventRouter::new(&aggregator, &keys);

        assert!(router.route(&named("CI provider", "GitHub Actions")).is_empty());
        assert!(router.route(&BuildEvent::Other("TaskStarted".to_string())).is_empty());
        assert_eq!(aggregator.pending(), Field::COUNT);
    }

    #[test]
    fn test_conflicting_named_values_keep_first() {
        let keys = CustomValueKeys::default();
        let (aggregator, _completion) = channel();
        let router = EventRouter::new(&aggregator, &keys);

        assert_eq!(router.route(&named("Git branch", "main")), vec![Field::GitBranch]);
        assert!(router.route(&named("Git branch", "feature")).is_empty());
    }

    #[test]
    fn test_duplicate_configured_keys_settle_several_fields() {
        let keys = CustomValueKeys::new("shared", "shared", "commit");
        let (aggregator, _completion) = channel();
        let router = EventRouter::new(&aggregator, &keys);

        assert_eq!(
            router.route(&named("shared", "value")),
            vec![Field::GitUrl, Field::GitBranch]
        );
    }

    #[test]
    fn test_failed_build_finished_resolves_false() {
        let keys = CustomValueKeys::default();
        let (aggregator, _completion) = channel();
        let router = EventRouter::new(&aggregator, &keys);

        let failure = serde_json::json!({"message": "compilation failed"});
        assert_eq!(
            router.route(&BuildEvent::BuildFinished(BuildFinished {
                failure: Some(failure)
            })),
            vec![Field::BuildSuccessful]
        );
        // A duplicate, successful BuildFinished does not flip the outcome.
        assert!(router
            .route(&BuildEvent::BuildFinished(BuildFinished { failure: None }))
            .is_empty());
    }
}
