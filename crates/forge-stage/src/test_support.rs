//! In-memory test doubles shared across stage handler unit tests. Not part
//! of the public API; gated behind `#[cfg(test)]` in `lib.rs`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use camino::Utf8PathBuf;
use forge_core::artifact::Artifact;
use forge_core::error::ForgeError;
use forge_core::ids::{BuildId, ProjectId, StageId};
use forge_core::ports::{
    ArtifactStorePort, ModelCallOpts, ModelCallResult, NoopProgressSink, RepoHandle, RepoPublisher,
    StageRouterPort,
};
use forge_core::stage::{StageContext, StageDeps};
use tokio_util::sync::CancellationToken;

/// Router double that replays a fixed queue of responses in order,
/// regardless of which stage calls it — handler tests only need one
/// call per run (stage 1 makes two, queued in order).
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

/// `RepoPublisher` double recording what it was asked to publish.
#[derive(Default)]
pub struct ScriptedRepoPublisher {
    pub pushed: Mutex<Option<BTreeMap<Utf8PathBuf, String>>>,
}

#[async_trait]
impl RepoPublisher for ScriptedRepoPublisher {
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

/// `ArtifactStorePort` double that panics if called; stage handlers never
/// touch the store directly, only the orchestrator does.
pub struct UnusedArtifactStore;

#[async_trait]
impl ArtifactStorePort for UnusedArtifactStore {
    async fn ensure_layout(&self, _project_dir: &Utf8PathBuf) -> Result<(), ForgeError> {
        unreachable!("stage handlers never call the artifact store directly")
    }
    async fn write(&self, _project_dir: &Utf8PathBuf, _name: &str, _value: &Artifact) -> Result<(), ForgeError> {
        unreachable!("stage handlers never call the artifact store directly")
    }
    async fn read(&self, _project_dir: &Utf8PathBuf, _name: &str) -> Result<Artifact, ForgeError> {
        unreachable!("stage handlers never call the artifact store directly")
    }
    async fn exists(&self, _project_dir: &Utf8PathBuf, _name: &str) -> bool {
        unreachable!("stage handlers never call the artifact store directly")
    }
    async fn list_code(&self, _project_dir: &Utf8PathBuf) -> Result<Vec<Utf8PathBuf>, ForgeError> {
        unreachable!("stage handlers never call the artifact store directly")
    }
}

pub fn scripted_deps(responses: Vec<Result<String, ForgeError>>) -> StageDeps {
    deps_with_repo_publisher(responses, Arc::new(ScriptedRepoPublisher::default()))
}

pub fn deps_with_repo_publisher(
    responses: Vec<Result<String, ForgeError>>,
    repo_publisher: Arc<dyn RepoPublisher>,
) -> StageDeps {
    StageDeps {
        artifact_store: Arc::new(UnusedArtifactStore),
        template_registry: Arc::new(forge_template::TemplateRegistry::new()),
        router: Arc::new(ScriptedRouter::new(responses)),
        repo_publisher,
        progress: Arc::new(NoopProgressSink),
    }
}

pub fn context_with_inputs(
    stage_id: u8,
    stage_name: &'static str,
    inputs: BTreeMap<String, Artifact>,
    deps: StageDeps,
) -> StageContext {
    StageContext {
        build_id: BuildId("build-1".to_string()),
        project_id: ProjectId("project-1".to_string()),
        project_dir: Utf8PathBuf::from("/tmp/forge-test/project-1"),
        stage_id: StageId(stage_id),
        stage_name,
        config: HashMap::new(),
        inputs,
        spec_json: serde_json::Value::Null,
        concurrency: 5,
        deps,
        cancel: CancellationToken::new(),
    }
}

pub fn fixture_context(stage_id: u8, stage_name: &'static str, spec_json: serde_json::Value) -> StageContext {
    let mut ctx = context_with_inputs(stage_id, stage_name, BTreeMap::new(), scripted_deps(vec![]));
    ctx.spec_json = spec_json;
    ctx
}
