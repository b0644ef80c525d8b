//! `StageDescriptor`: the immutable, process-wide table entry describing
//! one of the ten fixed pipeline stages (`spec.md` §3, §4.5).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::artifact::{Artifact, StageResult};
use crate::error::ForgeError;
use crate::ids::{BuildId, ProjectId, StageId};

/// Context passed to a stage handler at invocation time.
///
/// Carries everything a handler needs to render its prompt(s), call the
/// router, and assemble its output artifacts, without giving it access to
/// the full `BuildContext` (which is exclusively owned by the orchestrator
/// task). Reading declared inputs (§4.6 step c) and writing declared
/// outputs (step f) remain the orchestrator's responsibility; `inputs`
/// below is what it read before invoking the handler.
#[derive(Clone)]
pub struct StageContext {
    pub build_id: BuildId,
    pub project_id: ProjectId,
    pub project_dir: Utf8PathBuf,
    pub stage_id: StageId,
    pub stage_name: &'static str,
    /// Free-form config values threaded from the `BuildRequest` (e.g. the
    /// original problem statement), analogous to `PhaseContext::config` in
    /// the teacher's phase-execution model.
    pub config: HashMap<String, String>,
    /// This stage's declared input artifacts, already read by the
    /// orchestrator via `C1.Read`, keyed by artifact name.
    pub inputs: BTreeMap<String, Artifact>,
    /// The `SpecJSON` the build was started with; only stage 0 reads this.
    pub spec_json: serde_json::Value,
    /// This stage's declared `StageDescriptor::concurrency` — only stage
    /// 8 (code-generation) reads this, to size its fan-out batches.
    pub concurrency: usize,
    /// Collaborators this stage's handler may call into.
    pub deps: StageDeps,
    /// The build's cancellation signal, checked at this stage's
    /// cancellation points (fan-out batches within stage 8).
    pub cancel: CancellationToken,
}

/// Uniform handler signature every stage implements: no method-name-string
/// dispatch, a direct function reference held by the descriptor (see the
/// REDESIGN FLAGS in `spec.md` §9).
pub type Handler = for<'a> fn(&'a StageContext) -> BoxFuture<'a, Result<StageResult, ForgeError>>;

/// Immutable, process-wide descriptor for one pipeline stage.
#[derive(Clone)]
pub struct StageDescriptor {
    pub id: StageId,
    pub name: &'static str,
    pub requires_ai: bool,
    pub input_artifacts: &'static [&'static str],
    pub output_artifacts: &'static [&'static str],
    pub handler: Handler,
    pub prompt_template: Option<&'static str>,
    pub timeout: Duration,
    pub retries: u32,
    pub concurrency: usize,
}

/// Shared collaborator handles threaded through the orchestrator into
/// every handler invocation. Kept separate from `StageContext` because
/// these are `Arc`-shared across all builds, not owned by one.
#[derive(Clone)]
pub struct StageDeps {
    pub artifact_store: Arc<dyn crate::ports::ArtifactStorePort>,
    pub template_registry: Arc<dyn crate::ports::TemplateRegistryPort>,
    pub router: Arc<dyn crate::ports::StageRouterPort>,
    /// Only stage 9 (repo-push) uses this; every other stage ignores it.
    pub repo_publisher: Arc<dyn crate::ports::RepoPublisher>,
    /// Only stages 7 and 8 use this, to emit `stage:progress` during their
    /// fan-out loops.
    pub progress: Arc<dyn crate::ports::ProgressSink>,
}
