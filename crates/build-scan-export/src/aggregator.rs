//! Result aggregation across the six record fields.
//!
//! [`channel`] creates the producer half ([`Aggregator`], driven by the
//! stream listener) and the consumer half ([`Completion`], awaited by the
//! client). Each field is a [`Slot`]; a `watch` channel carries a countdown
//! of pending slots together with the first failure, so the waiter wakes
//! once everything resolved or as soon as anything failed.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{ExportError, Result, ScanRef};
use crate::record::BuildValidationRecord;
use crate::slot::{Slot, SlotState};

/// Record fields backed by a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    RootProjectName,
    RequestedTasks,
    GitUrl,
    GitBranch,
    GitCommitId,
    BuildSuccessful,
}

impl Field {
    pub const COUNT: usize = 6;

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::RootProjectName => "root_project_name",
            Field::RequestedTasks => "requested_tasks",
            Field::GitUrl => "git_url",
            Field::GitBranch => "git_branch",
            Field::GitCommitId => "git_commit_id",
            Field::BuildSuccessful => "build_successful",
        }
    }
}

#[derive(Debug, Default)]
struct Slots {
    root_project_name: Slot<String>,
    requested_tasks: Slot<Vec<String>>,
    git_url: Slot<String>,
    git_branch: Slot<String>,
    git_commit_id: Slot<String>,
    build_successful: Slot<bool>,
}

/// Countdown shared between the producer and the waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub pending: usize,
    pub failure: Option<ExportError>,
}

impl Progress {
    pub fn is_done(&self) -> bool {
        self.pending == 0 || self.failure.is_some()
    }
}

/// Create a fresh aggregator and its completion handle.
pub fn channel() -> (Aggregator, Completion) {
    let slots = Arc::new(Slots::default());
    let (progress, receiver) = watch::channel(Progress {
        pending: Field::COUNT,
        failure: None,
    });
    (
        Aggregator {
            slots: slots.clone(),
            progress,
        },
        Completion {
            slots,
            progress: receiver,
        },
    )
}

/// Producer half. Dropping it before every slot is settled interrupts the
/// waiter.
#[derive(Debug)]
pub struct Aggregator {
    slots: Arc<Slots>,
    progress: watch::Sender<Progress>,
}

impl Aggregator {
    pub fn resolve_root_project_name(&self, value: String) -> bool {
        self.settle(self.slots.root_project_name.complete(value))
    }

    pub fn resolve_requested_tasks(&self, value: Vec<String>) -> bool {
        self.settle(self.slots.requested_tasks.complete(value))
    }

    pub fn resolve_git_url(&self, value: String) -> bool {
        self.settle(self.slots.git_url.complete(value))
    }

    pub fn resolve_git_branch(&self, value: String) -> bool {
        self.settle(self.slots.git_branch.complete(value))
    }

    pub fn resolve_git_commit_id(&self, value: String) -> bool {
        self.settle(self.slots.git_commit_id.complete(value))
    }

    pub fn resolve_build_successful(&self, value: bool) -> bool {
        self.settle(self.slots.build_successful.complete(value))
    }

    /// Resolve every pending slot with its "unavailable" value. Returns the
    /// fields that were defaulted.
    pub fn resolve_pending_with_defaults(&self) -> Vec<Field> {
        let mut defaulted = Vec::new();
        if self.resolve_root_project_name(String::new()) {
            defaulted.push(Field::RootProjectName);
        }
        if self.resolve_requested_tasks(Vec::new()) {
            defaulted.push(Field::RequestedTasks);
        }
        if self.resolve_git_url(String::new()) {
            defaulted.push(Field::GitUrl);
        }
        if self.resolve_git_branch(String::new()) {
            defaulted.push(Field::GitBranch);
        }
        if self.resolve_git_commit_id(String::new()) {
            defaulted.push(Field::GitCommitId);
        }
        if self.resolve_build_successful(false) {
            defaulted.push(Field::BuildSuccessful);
        }
        defaulted
    }

    /// Fail every pending slot with `error`. Returns how many were failed.
    pub fn fail_pending(&self, error: ExportError) -> usize {
        let slots = &self.slots;
        let failed = [
            slots.root_project_name.fail(error.clone()),
            slots.requested_tasks.fail(error.clone()),
            slots.git_url.fail(error.clone()),
            slots.git_branch.fail(error.clone()),
            slots.git_commit_id.fail(error.clone()),
            slots.build_successful.fail(error.clone()),
        ]
        .into_iter()
        .filter(|failed| *failed)
        .count();

        if failed > 0 {
            self.progress.send_modify(|progress| {
                progress.pending -= failed;
                progress.failure.get_or_insert(error);
            });
        }
        failed
    }

    pub fn pending(&self) -> usize {
        self.progress.borrow().pending
    }

    fn settle(&self, transitioned: bool) -> bool {
        if transitioned {
            self.progress.send_modify(|progress| progress.pending -= 1);
        }
        transitioned
    }
}

/// Consumer half.
#[derive(Debug)]
pub struct Completion {
    slots: Arc<Slots>,
    progress: watch::Receiver<Progress>,
}

impl Completion {
    /// Wait until every slot resolved or any slot failed.
    ///
    /// Returns `InterruptedWhileFetchingBuildScan` when the producer goes
    /// away first.
    pub async fn wait(mut self, scan: &ScanRef) -> Result<BuildValidationRecord> {
        let failure = match self.progress.wait_for(Progress::is_done).await {
            Ok(progress) => progress.failure.clone(),
            Err(_) => return Err(ExportError::interrupted(scan)),
        };
        if let Some(error) = failure {
            return Err(error);
        }

        let slots = &self.slots;
        Ok(BuildValidationRecord {
            root_project_name: resolved(scan, Field::RootProjectName, slots.root_project_name.state())?,
            build_scan_id: scan.build_scan_id.clone(),
            server_url: scan.server_url.clone(),
            git_url: resolved(scan, Field::GitUrl, slots.git_url.state())?,
            git_branch: resolved(scan, Field::GitBranch, slots.git_branch.state())?,
            git_commit_id: resolved(scan, Field::GitCommitId, slots.git_commit_id.state())?,
            requested_tasks: resolved(scan, Field::RequestedTasks, slots.requested_tasks.state())?,
            build_successful: resolved(scan, Field::BuildSuccessful, slots.build_successful.state())?,
        })
    }
}

fn resolved<T>(scan: &ScanRef, field: Field, state: SlotState<T>) -> Result<T> {
    match state {
        SlotState::Resolved(value) => Ok(value),
        SlotState::Failed(error) => Err(error),
        SlotState::Pending => Err(ExportError::unexpected(
            scan,
            &format!("{} was still pending after completion", field.as_str()),
        )),
    }
}
