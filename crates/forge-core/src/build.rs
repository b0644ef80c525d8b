//! `BuildContext`, `BuildRequest`, and the build lifecycle state machine.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};

use crate::artifact::Artifact;
use crate::error::ForgeError;
use crate::ids::{BuildId, OrgId, ProjectId, StageId, UserId};

/// Terminal and non-terminal statuses a build can be in. Transitions to a
/// terminal state are monotonic and one-shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl BuildStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Request to start a new build.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub project_id: ProjectId,
    pub org_id: OrgId,
    pub user_id: UserId,
    pub spec_json: serde_json::Value,
    /// Artifacts the caller already has on hand; stages whose declared
    /// outputs are all present here are treated as pre-provided/skipped.
    pub initial_artifacts: BTreeMap<String, Artifact>,
}

/// Process-local state for one active build. Owned exclusively by the
/// orchestrator task driving it; never shared or cloned across tasks.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub build_id: BuildId,
    pub project_id: ProjectId,
    pub org_id: OrgId,
    pub user_id: UserId,
    pub spec_json: serde_json::Value,
    pub project_dir: Utf8PathBuf,
    pub started_at: DateTime<Utc>,
    pub current_stage: StageId,
    pub completed_stages: Vec<StageId>,
    pub failed_stage: Option<StageId>,
    pub status: BuildStatus,
    /// Artifacts produced so far, keyed by stage id then artifact name.
    pub artifacts: BTreeMap<StageId, BTreeMap<String, Artifact>>,
    pub error: Option<ForgeError>,
}

impl BuildContext {
    #[must_use]
    pub fn new(build_id: BuildId, request: &BuildRequest, project_dir: Utf8PathBuf, now: DateTime<Utc>) -> Self {
        Self {
            build_id,
            project_id: request.project_id.clone(),
            org_id: request.org_id.clone(),
            user_id: request.user_id.clone(),
            spec_json: request.spec_json.clone(),
            project_dir,
            started_at: now,
            current_stage: StageId(0),
            completed_stages: Vec::new(),
            failed_stage: None,
            status: BuildStatus::Pending,
            artifacts: BTreeMap::new(),
            error: None,
        }
    }

    /// Record a completed (or skipped) stage and its outputs.
    pub fn record_stage_success(&mut self, stage_id: StageId, artifacts: BTreeMap<String, Artifact>) {
        self.artifacts.insert(stage_id, artifacts);
        self.completed_stages.push(stage_id);
    }

    /// Transition to a terminal status exactly once. Returns `false` if
    /// already terminal (the orchestrator must not emit a second terminal
    /// event in that case).
    #[must_use]
    pub fn transition_terminal(&mut self, status: BuildStatus) -> bool {
        debug_assert!(status.is_terminal());
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }
}

/// A read-only snapshot returned by `Orchestrator::status`.
#[derive(Debug, Clone)]
pub struct BuildSnapshot {
    pub build_id: BuildId,
    pub status: BuildStatus,
    pub current_stage: StageId,
    pub completed_stages: Vec<StageId>,
    pub error: Option<ForgeError>,
}

impl From<&BuildContext> for BuildSnapshot {
    fn from(ctx: &BuildContext) -> Self {
        Self {
            build_id: ctx.build_id.clone(),
            status: ctx.status,
            current_stage: ctx.current_stage,
            completed_stages: ctx.completed_stages.clone(),
            error: ctx.error.clone(),
        }
    }
}
