//! The stage loop itself (`spec.md` §4.6's numbered execution algorithm).
//! Spawned once per build by `Orchestrator::start`; owns its `BuildContext`
//! exclusively until the build reaches a terminal status, mirroring the
//! teacher's `phase_exec`/`workflow` split between single-stage execution
//! and the overall run.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use forge_core::artifact::{Artifact, StageResult};
use forge_core::build::{BuildContext, BuildSnapshot, BuildStatus};
use forge_core::error::{ForgeError, ForgeErrorKind};
use forge_core::ids::StageId;
use forge_core::ports::BuildRecordFields;
use forge_core::stage::{StageContext, StageDescriptor};
use forge_events::{error_kind_label, PipelineEvent};
use forge_retry::RetryPolicy;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::orchestrator::Orchestrator;

/// Runs one build from `pending` to a terminal status. Never panics on
/// handler or I/O failure — every failure path transitions the build to
/// `failed`/`cancelled` and returns.
pub(crate) async fn run(
    orchestrator: Arc<Orchestrator>,
    mut ctx: BuildContext,
    initial_artifacts: BTreeMap<String, Artifact>,
    cancel: CancellationToken,
    snapshot: Arc<RwLock<BuildSnapshot>>,
) {
    // Names the *caller* supplied up front (`BuildRequest.initial_artifacts`,
    // `spec.md` §4.6 step b) — distinct from `known`, which accumulates
    // every artifact produced as the pipeline runs. Two stages can declare
    // the same output name (stage 6 and stage 8 both produce
    // `source_files`); checking skip-eligibility against the ever-growing
    // `known` map would wrongly treat stage 8 as pre-provided once stage 6
    // had already written its placeholders.
    let pre_provided: std::collections::BTreeSet<String> = initial_artifacts.keys().cloned().collect();
    let mut known: BTreeMap<String, Artifact> = initial_artifacts;

    info!(
        target: "forge::orchestrator",
        build_id = %ctx.build_id,
        project_id = %ctx.project_id,
        "starting build"
    );

    orchestrator.events.emit(PipelineEvent::PipelineStarted {
        build_id: ctx.build_id.clone(),
        project_id: ctx.project_id.clone(),
        total_stages: orchestrator.stage_table.len() as u32,
    });
    ctx.status = BuildStatus::Running;
    sync_snapshot(&ctx, &snapshot).await;
    orchestrator.notifier.build_started(&ctx.user_id.0, &ctx.build_id.0).await;

    if let Err(err) = orchestrator.stage_deps.artifact_store.ensure_layout(&ctx.project_dir).await {
        fail_setup(&orchestrator, &mut ctx, &snapshot, err).await;
        return;
    }

    let stage_table: &[StageDescriptor] = &orchestrator.stage_table;
    for stage in stage_table {
        if cancel.is_cancelled() {
            finish_cancelled(&orchestrator, &mut ctx, &snapshot, Some(stage.id)).await;
            return;
        }

        ctx.current_stage = stage.id;
        orchestrator.events.emit(PipelineEvent::StageStarted {
            build_id: ctx.build_id.clone(),
            stage_id: stage.id,
            stage_name: stage.name.to_string(),
        });
        orchestrator.build_store.update_stage_status(&ctx.build_id.0, stage.name, "started").await;

        if stage.output_artifacts.iter().all(|name| pre_provided.contains(*name)) {
            match persist_pre_provided(&orchestrator, &ctx, stage, &known).await {
                Ok(outputs) => {
                    ctx.record_stage_success(stage.id, outputs.clone());
                    orchestrator.events.emit(PipelineEvent::StageCompleted {
                        build_id: ctx.build_id.clone(),
                        stage_id: stage.id,
                        stage_name: stage.name.to_string(),
                        skipped: true,
                        artifact_names: outputs.into_keys().collect(),
                    });
                    orchestrator.build_store.update_stage_status(&ctx.build_id.0, stage.name, "completed").await;
                    sync_snapshot(&ctx, &snapshot).await;
                    continue;
                }
                Err(err) => {
                    fail_build_in_stage(&orchestrator, &mut ctx, &snapshot, stage, err).await;
                    return;
                }
            }
        }

        let inputs = match read_inputs(stage_table, stage, &known) {
            Ok(inputs) => inputs,
            Err(err) => {
                fail_build_in_stage(&orchestrator, &mut ctx, &snapshot, stage, err).await;
                return;
            }
        };

        let stage_ctx = StageContext {
            build_id: ctx.build_id.clone(),
            project_id: ctx.project_id.clone(),
            project_dir: ctx.project_dir.clone(),
            stage_id: stage.id,
            stage_name: stage.name,
            config: HashMap::new(),
            inputs,
            spec_json: if stage.id == StageId(0) { ctx.spec_json.clone() } else { serde_json::Value::Null },
            concurrency: stage.concurrency,
            deps: orchestrator.stage_deps.clone(),
            cancel: cancel.clone(),
        };

        let result = invoke_with_retry(&orchestrator, stage, stage_ctx, &cancel).await;

        match result {
            Ok(stage_result) => {
                if stage_result.success && !stage_result.has_all_outputs(stage.output_artifacts) {
                    let err = ForgeError::new(ForgeErrorKind::ArtifactIoError {
                        artifact: stage.output_artifacts.join(","),
                        reason: "handler reported success without producing every declared output".to_string(),
                    })
                    .with_stage(stage.id, stage.name);
                    fail_build_in_stage(&orchestrator, &mut ctx, &snapshot, stage, err).await;
                    return;
                }

                if let Err(err) = write_outputs(&orchestrator, &ctx, stage, &stage_result.artifacts, &mut known).await {
                    fail_build_in_stage(&orchestrator, &mut ctx, &snapshot, stage, err).await;
                    return;
                }
                ctx.record_stage_success(stage.id, stage_result.artifacts.clone());
                orchestrator.events.emit(PipelineEvent::StageCompleted {
                    build_id: ctx.build_id.clone(),
                    stage_id: stage.id,
                    stage_name: stage.name.to_string(),
                    skipped: false,
                    artifact_names: stage_result.artifacts.into_keys().collect(),
                });
                orchestrator.build_store.update_stage_status(&ctx.build_id.0, stage.name, "completed").await;
                sync_snapshot(&ctx, &snapshot).await;
            }
            Err(err) if matches!(err.kind, ForgeErrorKind::Cancelled) => {
                finish_cancelled(&orchestrator, &mut ctx, &snapshot, Some(stage.id)).await;
                return;
            }
            Err(err) => {
                fail_build_in_stage(&orchestrator, &mut ctx, &snapshot, stage, err).await;
                return;
            }
        }
    }

    let duration_ms = Utc::now().signed_duration_since(ctx.started_at).num_milliseconds().max(0) as u64;
    let artifact_summary: Vec<String> = known.into_keys().collect();
    info!(
        target: "forge::orchestrator",
        build_id = %ctx.build_id,
        duration_ms,
        artifact_count = artifact_summary.len(),
        "build completed"
    );
    if !ctx.transition_terminal(BuildStatus::Completed) {
        // Already terminal (e.g. raced with a cancellation that landed just
        // before this point) — the one-shot guard forbids a second
        // terminal event/`BuildStore` update.
        sync_snapshot(&ctx, &snapshot).await;
        return;
    }
    orchestrator.build_store.update(
        &ctx.build_id.0,
        BuildRecordFields { status: Some("completed".to_string()), current_stage: Some(ctx.current_stage) },
    ).await;
    orchestrator.events.emit(PipelineEvent::PipelineCompleted {
        build_id: ctx.build_id.clone(),
        artifact_summary,
        duration_ms,
    });
    orchestrator.notifier.build_completed(&ctx.user_id.0, &ctx.build_id.0).await;
    sync_snapshot(&ctx, &snapshot).await;
}

/// Writes every already-known value for a skipped stage's declared
/// outputs, to guarantee on-disk presence even though nothing new was
/// produced (`spec.md` §4.6 step b).
async fn persist_pre_provided(
    orchestrator: &Orchestrator,
    ctx: &BuildContext,
    stage: &StageDescriptor,
    known: &BTreeMap<String, Artifact>,
) -> Result<BTreeMap<String, Artifact>, ForgeError> {
    let mut outputs = BTreeMap::new();
    for name in stage.output_artifacts {
        let artifact = known.get(*name).expect("membership already checked by the caller").clone();
        orchestrator
            .stage_deps
            .artifact_store
            .write(&ctx.project_dir, name, &artifact)
            .await
            .map_err(|e| e.with_stage(stage.id, stage.name))?;
        outputs.insert((*name).to_string(), artifact);
    }
    Ok(outputs)
}

fn read_inputs(
    stage_table: &[StageDescriptor],
    stage: &StageDescriptor,
    known: &BTreeMap<String, Artifact>,
) -> Result<BTreeMap<String, Artifact>, ForgeError> {
    let mut inputs = BTreeMap::new();
    for name in stage.input_artifacts {
        let Some(artifact) = known.get(*name) else {
            let producing_stage = producing_stage_for(stage_table, name);
            return Err(ForgeError::new(ForgeErrorKind::InputMissing {
                artifact: (*name).to_string(),
                producing_stage,
            })
            .with_stage(stage.id, stage.name));
        };
        inputs.insert((*name).to_string(), artifact.clone());
    }
    Ok(inputs)
}

fn producing_stage_for(stage_table: &[StageDescriptor], name: &str) -> StageId {
    stage_table
        .iter()
        .find(|s| s.output_artifacts.contains(&name))
        .map_or(StageId(0), |s| s.id)
}

async fn invoke_with_retry(
    orchestrator: &Orchestrator,
    stage: &StageDescriptor,
    stage_ctx: StageContext,
    cancel: &CancellationToken,
) -> Result<StageResult, ForgeError> {
    let policy = RetryPolicy::from_retries(stage.retries, orchestrator.config.retry.schedule());
    let events = Arc::clone(&orchestrator.events);
    let build_id = stage_ctx.build_id.clone();
    let stage_id = stage.id;
    let observer = move |attempt: u32, max_attempts: u32, backoff: Duration, previous_error: &ForgeError| {
        events.emit(PipelineEvent::StageRetrying {
            build_id: build_id.clone(),
            stage_id,
            attempt,
            max_attempts,
            backoff_ms: backoff.as_millis() as u64,
            previous_error: previous_error.message.clone(),
        });
    };

    let handler = stage.handler;
    let timeout = stage.timeout;
    let op = move |_attempt: u32| {
        let stage_ctx = stage_ctx.clone();
        async move {
            if timeout.is_zero() {
                (handler)(&stage_ctx).await
            } else {
                match tokio::time::timeout(timeout, (handler)(&stage_ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(ForgeError::new(ForgeErrorKind::Timeout { duration: timeout })
                        .with_stage(stage_ctx.stage_id, stage_ctx.stage_name)),
                }
            }
        }
    };

    forge_retry::retry(op, &policy, cancel, &observer).await
}

async fn write_outputs(
    orchestrator: &Orchestrator,
    ctx: &BuildContext,
    stage: &StageDescriptor,
    artifacts: &BTreeMap<String, Artifact>,
    known: &mut BTreeMap<String, Artifact>,
) -> Result<(), ForgeError> {
    for (name, artifact) in artifacts {
        orchestrator
            .stage_deps
            .artifact_store
            .write(&ctx.project_dir, name, artifact)
            .await
            .map_err(|e| e.with_stage(stage.id, stage.name))?;
        known.insert(name.clone(), artifact.clone());
    }
    Ok(())
}

async fn fail_setup(orchestrator: &Orchestrator, ctx: &mut BuildContext, snapshot: &RwLock<BuildSnapshot>, err: ForgeError) {
    ctx.error = Some(err.clone());
    if !ctx.transition_terminal(BuildStatus::Failed) {
        sync_snapshot(ctx, snapshot).await;
        return;
    }
    orchestrator.events.emit(PipelineEvent::PipelineFailed {
        build_id: ctx.build_id.clone(),
        failed_stage: ctx.current_stage,
        message: err.message.clone(),
    });
    orchestrator.notifier.build_failed(&ctx.user_id.0, &ctx.build_id.0, &err.message).await;
    sync_snapshot(ctx, snapshot).await;
}

async fn fail_build_in_stage(
    orchestrator: &Orchestrator,
    ctx: &mut BuildContext,
    snapshot: &RwLock<BuildSnapshot>,
    stage: &StageDescriptor,
    err: ForgeError,
) {
    warn!(
        target: "forge::orchestrator",
        build_id = %ctx.build_id,
        stage_id = stage.id.0,
        stage_name = stage.name,
        error = %err,
        attempts = err.attempt_count,
        "stage failed"
    );

    ctx.error = Some(err.clone());
    ctx.failed_stage = Some(stage.id);
    if !ctx.transition_terminal(BuildStatus::Failed) {
        sync_snapshot(ctx, snapshot).await;
        return;
    }

    orchestrator.build_store.log_stage_error(&ctx.build_id.0, stage.id, &err).await;
    orchestrator.build_store.mark_failed_at_stage(&ctx.build_id.0, stage.id, &err.message).await;

    orchestrator.events.emit(PipelineEvent::StageFailed {
        build_id: ctx.build_id.clone(),
        stage_id: stage.id,
        stage_name: stage.name.to_string(),
        error_kind: error_kind_label(&err.kind),
        message: err.message.clone(),
    });
    orchestrator.events.emit(PipelineEvent::PipelineFailed {
        build_id: ctx.build_id.clone(),
        failed_stage: stage.id,
        message: err.message.clone(),
    });
    orchestrator.notifier.build_failed(&ctx.user_id.0, &ctx.build_id.0, &err.message).await;
    sync_snapshot(ctx, snapshot).await;
}

async fn finish_cancelled(
    orchestrator: &Orchestrator,
    ctx: &mut BuildContext,
    snapshot: &RwLock<BuildSnapshot>,
    failed_stage: Option<StageId>,
) {
    ctx.failed_stage = failed_stage;
    if !ctx.transition_terminal(BuildStatus::Cancelled) {
        sync_snapshot(ctx, snapshot).await;
        return;
    }
    orchestrator.build_store.update(
        &ctx.build_id.0,
        BuildRecordFields { status: Some("cancelled".to_string()), current_stage: Some(ctx.current_stage) },
    ).await;
    orchestrator.events.emit(PipelineEvent::PipelineCancelled { build_id: ctx.build_id.clone(), failed_stage });
    sync_snapshot(ctx, snapshot).await;
}

async fn sync_snapshot(ctx: &BuildContext, snapshot: &RwLock<BuildSnapshot>) {
    *snapshot.write().await = BuildSnapshot::from(ctx);
}
