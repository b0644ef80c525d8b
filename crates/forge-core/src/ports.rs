//! The external-interface traits from `spec.md` §6, plus the internal
//! component ports stage handlers are driven through.
//!
//! Defining these traits here (rather than in the crates that implement
//! them) avoids a dependency cycle between `forge-stage` and
//! `forge-artifact`/`forge-template`/`forge-llm`, the same way the
//! teacher's `xchecker-phase-api` crate exists solely to hold the shared
//! `Phase` contract without introducing one.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use serde_json::Value;

use crate::artifact::Artifact;
use crate::error::ForgeError;
use crate::ids::StageId;

// ---------------------------------------------------------------------
// C1 — Artifact Store
// ---------------------------------------------------------------------

#[async_trait]
pub trait ArtifactStorePort: Send + Sync {
    async fn ensure_layout(&self, project_dir: &Utf8PathBuf) -> Result<(), ForgeError>;
    async fn write(
        &self,
        project_dir: &Utf8PathBuf,
        name: &str,
        value: &Artifact,
    ) -> Result<(), ForgeError>;
    async fn read(&self, project_dir: &Utf8PathBuf, name: &str) -> Result<Artifact, ForgeError>;
    async fn exists(&self, project_dir: &Utf8PathBuf, name: &str) -> bool;
    async fn list_code(&self, project_dir: &Utf8PathBuf) -> Result<Vec<Utf8PathBuf>, ForgeError>;
}

// ---------------------------------------------------------------------
// C2 — Prompt Template Registry
// ---------------------------------------------------------------------

/// A rendering variable: either a plain string or a JSON value rendered
/// with stable two-space indentation.
#[derive(Debug, Clone)]
pub enum TemplateVar {
    Text(String),
    Json(Value),
}

pub trait TemplateRegistryPort: Send + Sync {
    fn render(&self, name: &str, vars: &BTreeMap<String, TemplateVar>) -> Result<String, ForgeError>;
}

// ---------------------------------------------------------------------
// C3 — Model Provider + Router
// ---------------------------------------------------------------------

/// Correlation metadata attached to every model call for metrics and logs.
#[derive(Debug, Clone)]
pub struct Correlation {
    pub build_id: String,
    pub stage_id: StageId,
    pub file_path: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ModelCallOpts {
    pub timeout: Duration,
    pub correlation: Correlation,
}

#[derive(Debug, Clone)]
pub struct ModelCallResult {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub latency_ms: u64,
    pub provider: String,
    pub model: String,
}

/// A single named model backend (an OpenAI-style chat API or similar).
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn call(&self, prompt: &str, opts: &ModelCallOpts) -> Result<ModelCallResult, ForgeError>;
}

/// Routes a stage's model call across a primary and its fallbacks.
#[async_trait]
pub trait StageRouterPort: Send + Sync {
    async fn call_stage(
        &self,
        stage_id: StageId,
        prompt: &str,
        opts: &ModelCallOpts,
    ) -> Result<ModelCallResult, ForgeError>;
}

// ---------------------------------------------------------------------
// C7 — Progress sink (the handler-facing face of the event bus)
// ---------------------------------------------------------------------

/// The narrow slice of C7 that stage handlers themselves drive: emitting
/// `stage:progress` during stage 7/8's fan-out loops. Declared here rather
/// than depending on the `forge-events` crate directly, the same way the
/// other collaborator ports avoid a dependency cycle.
pub trait ProgressSink: Send + Sync {
    fn emit_progress(
        &self,
        build_id: &str,
        stage_id: StageId,
        completed: u32,
        total: u32,
        current_file: Option<Utf8PathBuf>,
    );
}

/// Used by tests and by any context where progress reporting is not
/// wired up; drops every call.
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn emit_progress(&self, _: &str, _: StageId, _: u32, _: u32, _: Option<Utf8PathBuf>) {}
}

// ---------------------------------------------------------------------
// §6 — BuildStore / ProjectStore / Notifier / RepoPublisher
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BuildRecordFields {
    pub status: Option<String>,
    pub current_stage: Option<StageId>,
}

#[async_trait]
pub trait BuildStore: Send + Sync {
    async fn find(&self, project_id: &str, build_id: &str) -> Option<BuildRecordHandle>;
    async fn update(&self, build_id: &str, fields: BuildRecordFields);
    async fn update_stage_status(&self, build_id: &str, stage_name: &str, status: &str);
    async fn log_stage_error(&self, build_id: &str, stage_id: StageId, error: &ForgeError);
    async fn mark_failed_at_stage(&self, build_id: &str, stage_id: StageId, message: &str);
}

/// Opaque handle returned by `BuildStore::find`; the core never inspects
/// its contents, only passes it back to the store.
#[derive(Debug, Clone)]
pub struct BuildRecordHandle {
    pub build_id: String,
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn find(&self, org_id: &str, project_id: &str) -> Option<ProjectRecordHandle>;
    async fn update(&self, project_id: &str, fields: BTreeMap<String, String>);
}

#[derive(Debug, Clone)]
pub struct ProjectRecordHandle {
    pub project_id: String,
}

/// Best-effort notification sink. Failures here must never fail the
/// orchestrator (`spec.md` §6).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn build_started(&self, user_id: &str, build_id: &str);
    async fn build_completed(&self, user_id: &str, build_id: &str);
    async fn build_failed(&self, user_id: &str, build_id: &str, message: &str);
}

#[derive(Debug, Clone)]
pub struct RepoHandle {
    pub url: String,
    pub owner: String,
    pub name: String,
}

#[async_trait]
pub trait RepoPublisher: Send + Sync {
    async fn create_repo(&self, name: &str, description: &str, private: bool) -> Result<RepoHandle, ForgeError>;
    async fn push_files(
        &self,
        owner: &str,
        name: &str,
        files: &BTreeMap<Utf8PathBuf, String>,
        message: &str,
        branch: &str,
    ) -> Result<String, ForgeError>;
}
