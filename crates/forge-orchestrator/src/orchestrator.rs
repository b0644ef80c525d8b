//! The stable facade external callers drive (`spec.md` §4.6's three
//! operations: `Start`, `Status`, `Cancel`). One `Orchestrator` serves
//! every build in the process; each build gets its own spawned task and
//! `CancellationToken`, tracked in `builds` until it reaches a terminal
//! status.

use std::collections::BTreeMap;
use std::sync::Arc;

use camino::Utf8PathBuf;
use chrono::Utc;
use dashmap::DashMap;
use forge_core::artifact::Artifact;
use forge_core::build::{BuildContext, BuildRequest, BuildSnapshot};
use forge_core::ids::BuildId;
use forge_core::ports::{
    ArtifactStorePort, BuildStore, Notifier, RepoPublisher, StageRouterPort, TemplateRegistryPort,
};
use forge_core::stage::StageDeps;
use forge_events::EventBus;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::run_loop;

/// The collaborators a production `Orchestrator` is wired with — one
/// instance of each, shared `Arc`-style across every build it runs.
/// Analogous to the teacher's `OrchestratorHandle::new` wiring together
/// `ArtifactManager`, the receipt manager, and the LLM backend.
pub struct OrchestratorDeps {
    pub artifact_store: Arc<dyn ArtifactStorePort>,
    pub template_registry: Arc<dyn TemplateRegistryPort>,
    pub router: Arc<dyn StageRouterPort>,
    pub repo_publisher: Arc<dyn RepoPublisher>,
    pub events: Arc<EventBus>,
    pub build_store: Arc<dyn BuildStore>,
    pub notifier: Arc<dyn Notifier>,
}

pub(crate) struct RunningBuild {
    pub(crate) cancel: CancellationToken,
    pub(crate) snapshot: Arc<RwLock<BuildSnapshot>>,
}

/// Drives zero or more concurrent builds through the ten fixed stages.
pub struct Orchestrator {
    pub(crate) config: OrchestratorConfig,
    pub(crate) stage_deps: StageDeps,
    pub(crate) events: Arc<EventBus>,
    pub(crate) build_store: Arc<dyn BuildStore>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) stage_table: [forge_core::stage::StageDescriptor; forge_stage::STAGE_COUNT],
    pub(crate) builds: DashMap<String, RunningBuild>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(config: OrchestratorConfig, deps: OrchestratorDeps) -> Arc<Self> {
        let stage_deps = StageDeps {
            artifact_store: deps.artifact_store,
            template_registry: deps.template_registry,
            router: deps.router,
            repo_publisher: deps.repo_publisher,
            progress: deps.events.clone(),
        };
        Arc::new(Self {
            config,
            stage_deps,
            events: deps.events,
            build_store: deps.build_store,
            notifier: deps.notifier,
            stage_table: forge_stage::stage_table(),
            builds: DashMap::new(),
        })
    }

    /// `Start(request) → BuildID`: validates nothing further than the
    /// `BuildRequest` type itself guarantees, creates a `pending`
    /// `BuildContext`, spawns its execution, and returns immediately.
    pub async fn start(self: &Arc<Self>, request: BuildRequest) -> BuildId {
        let build_id = BuildId(Uuid::now_v7().to_string());
        let project_dir = self.project_dir(&request.project_id.0);
        let ctx = BuildContext::new(build_id.clone(), &request, project_dir, Utc::now());

        let cancel = CancellationToken::new();
        let snapshot = Arc::new(RwLock::new(BuildSnapshot::from(&ctx)));
        self.builds.insert(
            build_id.0.clone(),
            RunningBuild {
                cancel: cancel.clone(),
                snapshot: Arc::clone(&snapshot),
            },
        );

        let me = Arc::clone(self);
        let initial_artifacts: BTreeMap<String, Artifact> = request.initial_artifacts;
        tokio::spawn(async move {
            run_loop::run(me, ctx, initial_artifacts, cancel, snapshot).await;
        });

        build_id
    }

    /// `Status(BuildID) → snapshot`. `None` if no build with this id has
    /// ever been started on this orchestrator instance.
    pub async fn status(&self, build_id: &BuildId) -> Option<BuildSnapshot> {
        let entry = self.builds.get(&build_id.0)?;
        Some(entry.snapshot.read().await.clone())
    }

    /// `Cancel(BuildID)`: requests cancellation. Takes effect at the
    /// build's next cancellation point, never synchronously.
    pub fn cancel(&self, build_id: &BuildId) {
        if let Some(entry) = self.builds.get(&build_id.0) {
            entry.cancel.cancel();
        }
    }

    fn project_dir(&self, project_id: &str) -> Utf8PathBuf {
        self.config.projects_root.join(project_id)
    }
}
