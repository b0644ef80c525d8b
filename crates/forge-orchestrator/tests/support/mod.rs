//! In-memory test doubles for the orchestrator's integration tests. Mirrors
//! `forge_stage`'s own `test_support` module, but lives under `tests/` since
//! these doubles only need to satisfy `forge-core`'s ports, not reach into
//! anything crate-private.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use forge_core::artifact::Artifact;
use forge_core::config::RetryConfig;
use forge_core::error::ForgeError;
use forge_core::ids::{ProjectId, StageId};
use forge_core::ports::{
    ArtifactStorePort, BuildRecordFields, BuildRecordHandle, BuildStore, ModelCallOpts, ModelCallResult,
    Notifier, RepoHandle, RepoPublisher, StageRouterPort,
};
use forge_orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorDeps};

/// Queues one scripted response per call, in call order, regardless of which
/// stage is asking. A build's ten stages execute strictly sequentially, so a
/// single flat queue is enough to script an entire pipeline run (stage 1
/// makes two calls, stage 7/8 make one per file, queued back to back).
pub struct ScriptedRouter {
    responses: Mutex<VecDeque<Result<String, ForgeError>>>,
}

impl ScriptedRouter {
    pub fn new(responses: Vec<Result<String, ForgeError>>) -> Self {
        Self { responses: Mutex::new(responses.into_iter().collect()) }
    }
}

#[async_trait]
impl StageRouterPort for ScriptedRouter {
    async fn call_stage(
        &self,
        _stage_id: StageId,
        _prompt: &str,
        _opts: &ModelCallOpts,
    ) -> Result<ModelCallResult, ForgeError> {
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(content)) => Ok(ModelCallResult {
                content,
                input_tokens: 10,
                output_tokens: 10,
                cost: 0.0,
                latency_ms: 1,
                provider: "test-provider".to_string(),
                model: "test-model".to_string(),
            }),
            Some(Err(err)) => Err(err),
            None => panic!("ScriptedRouter exhausted its scripted responses"),
        }
    }
}

/// `ArtifactStorePort` double backed by an in-process map, keyed by
/// `(project_dir, name)`. Exercises the real write/read round trip the
/// orchestrator depends on without touching the filesystem.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    entries: Mutex<HashMap<(Utf8PathBuf, String), Artifact>>,
    layouts: Mutex<Vec<Utf8PathBuf>>,
}

#[async_trait]
impl ArtifactStorePort for InMemoryArtifactStore {
    async fn ensure_layout(&self, project_dir: &Utf8PathBuf) -> Result<(), ForgeError> {
        self.layouts.lock().unwrap().push(project_dir.clone());
        Ok(())
    }

    async fn write(&self, project_dir: &Utf8PathBuf, name: &str, value: &Artifact) -> Result<(), ForgeError> {
        self.entries
            .lock()
            .unwrap()
            .insert((project_dir.clone(), name.to_string()), value.clone());
        Ok(())
    }

    async fn read(&self, project_dir: &Utf8PathBuf, name: &str) -> Result<Artifact, ForgeError> {
        self.entries
            .lock()
            .unwrap()
            .get(&(project_dir.clone(), name.to_string()))
            .cloned()
            .ok_or_else(|| {
                ForgeError::new(forge_core::error::ForgeErrorKind::ArtifactIoError {
                    artifact: name.to_string(),
                    reason: "not found in in-memory store".to_string(),
                })
            })
    }

    async fn exists(&self, project_dir: &Utf8PathBuf, name: &str) -> bool {
        self.entries.lock().unwrap().contains_key(&(project_dir.clone(), name.to_string()))
    }

    async fn list_code(&self, _project_dir: &Utf8PathBuf) -> Result<Vec<Utf8PathBuf>, ForgeError> {
        Ok(Vec::new())
    }
}

/// `BuildStore` double recording every call it receives, so tests can assert
/// on the sequence of stage-status transitions observed.
#[derive(Default)]
pub struct RecordingBuildStore {
    pub stage_statuses: Mutex<Vec<(String, String)>>,
    pub updates: Mutex<Vec<BuildRecordFields>>,
    pub failures: Mutex<Vec<(StageId, String)>>,
}

#[async_trait]
impl BuildStore for RecordingBuildStore {
    async fn find(&self, _project_id: &str, build_id: &str) -> Option<BuildRecordHandle> {
        Some(BuildRecordHandle { build_id: build_id.to_string() })
    }

    async fn update(&self, _build_id: &str, fields: BuildRecordFields) {
        self.updates.lock().unwrap().push(fields);
    }

    async fn update_stage_status(&self, _build_id: &str, stage_name: &str, status: &str) {
        self.stage_statuses.lock().unwrap().push((stage_name.to_string(), status.to_string()));
    }

    async fn log_stage_error(&self, _build_id: &str, stage_id: StageId, error: &ForgeError) {
        self.failures.lock().unwrap().push((stage_id, error.message.clone()));
    }

    async fn mark_failed_at_stage(&self, _build_id: &str, _stage_id: StageId, _message: &str) {}
}

/// `Notifier` double recording every notification it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    pub completed: Mutex<Vec<String>>,
    pub failed: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn build_started(&self, _user_id: &str, _build_id: &str) {}

    async fn build_completed(&self, _user_id: &str, build_id: &str) {
        self.completed.lock().unwrap().push(build_id.to_string());
    }

    async fn build_failed(&self, _user_id: &str, build_id: &str, message: &str) {
        self.failed.lock().unwrap().push((build_id.to_string(), message.to_string()));
    }
}

/// `RepoPublisher` double recording the files it was asked to push.
#[derive(Default)]
pub struct RecordingRepoPublisher {
    pub pushed: Mutex<Option<BTreeMap<Utf8PathBuf, String>>>,
}

#[async_trait]
impl RepoPublisher for RecordingRepoPublisher {
    async fn create_repo(&self, name: &str, _description: &str, _private: bool) -> Result<RepoHandle, ForgeError> {
        Ok(RepoHandle {
            url: format!("https://example.test/test-org/{name}"),
            owner: "test-org".to_string(),
            name: name.to_string(),
        })
    }

    async fn push_files(
        &self,
        _owner: &str,
        _name: &str,
        files: &BTreeMap<Utf8PathBuf, String>,
        _message: &str,
        _branch: &str,
    ) -> Result<String, ForgeError> {
        *self.pushed.lock().unwrap() = Some(files.clone());
        Ok("deadbeef".to_string())
    }
}

/// Everything a scenario builds up before starting a build: the wired
/// orchestrator plus handles to its doubles for post-hoc assertions.
pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub build_store: Arc<RecordingBuildStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub repo_publisher: Arc<RecordingRepoPublisher>,
    pub artifact_store: Arc<InMemoryArtifactStore>,
    pub events: Arc<forge_events::EventBus>,
}

/// Give every scenario its own isolated project root so parallel test
/// threads never collide over `Utf8PathBuf` keys in the in-memory store.
pub fn unique_project_root(test_name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("/tmp/forge-orchestrator-tests/{test_name}-{}", std::process::id()))
}

pub fn harness(router_responses: Vec<Result<String, ForgeError>>) -> Harness {
    let artifact_store = Arc::new(InMemoryArtifactStore::default());
    let build_store = Arc::new(RecordingBuildStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let repo_publisher = Arc::new(RecordingRepoPublisher::default());

    let config = OrchestratorConfig {
        projects_root: Utf8PathBuf::from("/tmp/forge-orchestrator-tests"),
        retry: RetryConfig { backoff_schedule_ms: vec![1, 1, 1] },
    };

    let events = Arc::new(forge_events::EventBus::new());

    let deps = OrchestratorDeps {
        artifact_store: artifact_store.clone(),
        template_registry: Arc::new(forge_template::TemplateRegistry::new()),
        router: Arc::new(ScriptedRouter::new(router_responses)),
        repo_publisher: repo_publisher.clone(),
        events: events.clone(),
        build_store: build_store.clone(),
        notifier: notifier.clone(),
    };

    Harness {
        orchestrator: Orchestrator::new(config, deps),
        build_store,
        notifier,
        repo_publisher,
        artifact_store,
        events,
    }
}

/// Polls `status` until it reports a terminal build or the deadline passes.
/// Integration tests never sleep on a fixed wall-clock guess for an
/// in-process spawned task; they poll with a bound instead.
pub async fn await_terminal(
    orchestrator: &Orchestrator,
    build_id: &forge_core::ids::BuildId,
) -> forge_core::build::BuildSnapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = orchestrator.status(build_id).await.expect("build was started");
        if snapshot.status.is_terminal() {
            return snapshot;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("build {} did not reach a terminal status within 5s (stuck at {:?})", build_id.0, snapshot.status);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn basic_request(project_id: &str) -> forge_core::build::BuildRequest {
    forge_core::build::BuildRequest {
        project_id: ProjectId(project_id.to_string()),
        org_id: forge_core::ids::OrgId("org-1".to_string()),
        user_id: forge_core::ids::UserId("user-1".to_string()),
        spec_json: serde_json::json!({
            "name": "demo-app",
            "description": "a tiny demo application",
        }),
        initial_artifacts: BTreeMap::new(),
    }
}

/// Router response scripts for a single-file happy-path run through all
/// ten stages, in the order their calls occur:
/// stage 1 (clarifier, consolidation) → stage 2 → stage 3 → stage 4 →
/// stage 5 → stage 7 (one file) → stage 8 (one file).
pub fn happy_path_responses() -> Vec<Result<String, ForgeError>> {
    vec![
        Ok("1. What database should this use?\n2. What auth method?".to_string()),
        Ok(serde_json::json!({"name": "demo-app", "refined": true}).to_string()),
        Ok("# Documentation\n\nA tiny demo application.".to_string()),
        Ok(serde_json::json!({"type": "object", "properties": {}}).to_string()),
        Ok(serde_json::json!({"src": {"index.js": "entry point"}}).to_string()),
        Ok(serde_json::json!({"src": {"index.js": "entry point"}}).to_string()),
        Ok("Generate the entry point for this demo application.".to_string()),
        Ok("```js\nconsole.log('hello from the demo app');\n```".to_string()),
    ]
}
