//! Best-effort lifecycle/progress event bus (`spec.md` §4.7), grounded on
//! `buildit-api`'s WebSocket `Broadcaster`: a `tokio::sync::broadcast`
//! channel wrapped in a small struct exposing `send`/`subscribe`.
//!
//! Progress events (`stage:progress`) are noisy and safe to drop under
//! back-pressure, so they travel on a short, drop-oldest channel. Every
//! other event is a lifecycle transition the `BuildStore`/UI must not
//! miss, so it travels on a separate, much larger channel — bounding the
//! chance of ever lagging it out in practice, per the "drop-oldest
//! progress events, never drop lifecycle events" overflow policy.

use camino::Utf8PathBuf;
use forge_core::error::ForgeErrorKind;
use forge_core::ids::{BuildId, ProjectId, StageId};
use forge_core::ports::ProgressSink;
use tokio::sync::broadcast;
use tracing::warn;

const LIFECYCLE_CAPACITY: usize = 1024;
const PROGRESS_CAPACITY: usize = 64;

/// One event in a build's lifecycle, as described in `spec.md` §4.7.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    PipelineStarted {
        build_id: BuildId,
        project_id: ProjectId,
        total_stages: u32,
    },
    StageStarted {
        build_id: BuildId,
        stage_id: StageId,
        stage_name: String,
    },
    StageProgress {
        build_id: BuildId,
        stage_id: StageId,
        completed: u32,
        total: u32,
        current_file: Option<Utf8PathBuf>,
    },
    StageRetrying {
        build_id: BuildId,
        stage_id: StageId,
        attempt: u32,
        max_attempts: u32,
        backoff_ms: u64,
        previous_error: String,
    },
    StageCompleted {
        build_id: BuildId,
        stage_id: StageId,
        stage_name: String,
        skipped: bool,
        artifact_names: Vec<String>,
    },
    StageFailed {
        build_id: BuildId,
        stage_id: StageId,
        stage_name: String,
        error_kind: &'static str,
        message: String,
    },
    PipelineCompleted {
        build_id: BuildId,
        artifact_summary: Vec<String>,
        duration_ms: u64,
    },
    PipelineFailed {
        build_id: BuildId,
        failed_stage: StageId,
        message: String,
    },
    PipelineCancelled {
        build_id: BuildId,
        failed_stage: Option<StageId>,
    },
}

impl PipelineEvent {
    /// Whether this event rides the drop-oldest progress channel rather
    /// than the never-drop lifecycle channel.
    #[must_use]
    pub const fn is_progress(&self) -> bool {
        matches!(self, Self::StageProgress { .. })
    }

    #[must_use]
    pub fn build_id(&self) -> &BuildId {
        match self {
            Self::PipelineStarted { build_id, .. }
            | Self::StageStarted { build_id, .. }
            | Self::StageProgress { build_id, .. }
            | Self::StageRetrying { build_id, .. }
            | Self::StageCompleted { build_id, .. }
            | Self::StageFailed { build_id, .. }
            | Self::PipelineCompleted { build_id, .. }
            | Self::PipelineFailed { build_id, .. }
            | Self::PipelineCancelled { build_id, .. } => build_id,
        }
    }
}

/// A stable label for a `ForgeErrorKind` variant, for the `stage:failed`
/// event's `error-kind` attribute.
#[must_use]
pub fn error_kind_label(kind: &ForgeErrorKind) -> &'static str {
    match kind {
        ForgeErrorKind::InputMissing { .. } => "input_missing",
        ForgeErrorKind::TemplateMissing { .. } => "template_missing",
        ForgeErrorKind::RateLimit { .. } => "rate_limit",
        ForgeErrorKind::ProviderUnavailable { .. } => "provider_unavailable",
        ForgeErrorKind::Timeout { .. } => "timeout",
        ForgeErrorKind::Authentication { .. } => "authentication",
        ForgeErrorKind::InvalidRequest { .. } => "invalid_request",
        ForgeErrorKind::ModelNotFound { .. } => "model_not_found",
        ForgeErrorKind::ParseFailure { .. } => "parse_failure",
        ForgeErrorKind::ArtifactIoError { .. } => "artifact_io_error",
        ForgeErrorKind::FallbackExhausted { .. } => "fallback_exhausted",
        ForgeErrorKind::Cancelled => "cancelled",
    }
}

/// Broadcasts pipeline events to zero or more subscribers. Cloning shares
/// the same underlying channels.
#[derive(Clone)]
pub struct EventBus {
    lifecycle_tx: broadcast::Sender<PipelineEvent>,
    progress_tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (lifecycle_tx, _) = broadcast::channel(LIFECYCLE_CAPACITY);
        let (progress_tx, _) = broadcast::channel(PROGRESS_CAPACITY);
        Self { lifecycle_tx, progress_tx }
    }

    /// Send an event to all current subscribers. Never blocks; if there
    /// are no subscribers the event is simply dropped.
    pub fn emit(&self, event: PipelineEvent) {
        let tx = if event.is_progress() { &self.progress_tx } else { &self.lifecycle_tx };
        let _ = tx.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            lifecycle_rx: self.lifecycle_tx.subscribe(),
            progress_rx: self.progress_tx.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Lets stage handlers (which only know about `forge_core::ports::ProgressSink`)
/// emit `stage:progress` without depending on this crate directly.
impl ProgressSink for EventBus {
    fn emit_progress(
        &self,
        build_id: &str,
        stage_id: StageId,
        completed: u32,
        total: u32,
        current_file: Option<Utf8PathBuf>,
    ) {
        self.emit(PipelineEvent::StageProgress {
            build_id: BuildId(build_id.to_string()),
            stage_id,
            completed,
            total,
            current_file,
        });
    }
}

/// A single subscriber's view of the bus. Lifecycle events are preferred
/// over progress events when both are ready, so a burst of `stage:progress`
/// can never delay delivery of a `stage:failed`/`pipeline:completed`.
pub struct EventSubscription {
    lifecycle_rx: broadcast::Receiver<PipelineEvent>,
    progress_rx: broadcast::Receiver<PipelineEvent>,
}

impl EventSubscription {
    /// Waits for the next event, skipping over lag gaps with a warning
    /// rather than surfacing them to the caller.
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        loop {
            tokio::select! {
                biased;
                lifecycle = self.lifecycle_rx.recv() => {
                    match lifecycle {
                        Ok(event) => return Some(event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "event subscriber lagged on lifecycle channel");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
                progress = self.progress_rx.recv() => {
                    match progress {
                        Ok(event) => return Some(event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "event subscriber dropped oldest progress events");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => continue,
                    }
                }
            }
        }
    }
}
