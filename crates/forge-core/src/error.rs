//! The §7 error taxonomy: a single enum that every component classifies
//! its failures into, and the retryability rule the retry engine dispatches
//! on.

use std::time::Duration;
use thiserror::Error;

use crate::ids::StageId;

/// One attempted `(provider, model)` choice and the error it produced,
/// recorded when a [`ForgeErrorKind::FallbackExhausted`] is raised.
#[derive(Debug, Clone)]
pub struct AttemptError {
    pub provider: String,
    pub model: String,
    pub message: String,
}

/// The classification every failure in the pipeline core is mapped into.
///
/// The retry engine dispatches on this enum's variant, never on string
/// matching of error messages (see the REDESIGN FLAGS in `spec.md` §9).
#[derive(Debug, Error, Clone)]
pub enum ForgeErrorKind {
    /// A required input artifact is absent.
    #[error("required input artifact '{artifact}' is missing (expected from stage {producing_stage})")]
    InputMissing {
        artifact: String,
        producing_stage: StageId,
    },

    /// Unknown prompt template name.
    #[error("unknown prompt template '{name}'")]
    TemplateMissing { name: String },

    /// Provider signalled throttling.
    #[error("rate limited{}", retry_after.map(|d| format!(", retry after {d:?}")).unwrap_or_default())]
    RateLimit { retry_after: Option<Duration> },

    /// Provider 5xx, DNS failure, connection reset.
    #[error("provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    /// Per-attempt deadline exceeded.
    #[error("timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Bad credentials.
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// Provider rejected the request payload outright.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Requested model is not known to the provider.
    #[error("model not found: {model}")]
    ModelNotFound { model: String },

    /// Model output could not be parsed into the declared artifact shape.
    #[error("failed to parse model output: {reason}")]
    ParseFailure { reason: String },

    /// Writing or reading an artifact failed.
    #[error("artifact I/O error on '{artifact}': {reason}")]
    ArtifactIoError { artifact: String, reason: String },

    /// The router exhausted every `(provider, model)` choice.
    #[error("all {} provider choices exhausted", attempts.len())]
    FallbackExhausted { attempts: Vec<AttemptError> },

    /// Propagated from a cancellation signal.
    #[error("cancelled")]
    Cancelled,
}

impl ForgeErrorKind {
    /// Whether the retry engine should retry a failure of this kind at
    /// all; see [`Self::max_retries`] for kinds that are retryable but
    /// capped below the stage's own budget. Stage handlers that need the
    /// "second `ParseFailure` becomes a soft success" behavior from
    /// `spec.md` §4.6 implement that themselves, since it's stage-specific,
    /// not a property of the error kind alone.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit { .. }
                | Self::ProviderUnavailable { .. }
                | Self::Timeout { .. }
                | Self::ParseFailure { .. }
                | Self::ArtifactIoError { .. }
        )
    }

    /// Whether the router should try the next fallback choice rather than
    /// aborting immediately.
    #[must_use]
    pub const fn advances_router_fallback(&self) -> bool {
        matches!(
            self,
            Self::RateLimit { .. }
                | Self::ProviderUnavailable { .. }
                | Self::Timeout { .. }
                | Self::ModelNotFound { .. }
                | Self::InvalidRequest { .. }
        )
    }

    /// A hard cap on retries for this kind, independent of the stage's own
    /// retry budget. `spec.md` §7 item 8: `ParseFailure` is "retryable
    /// once" — a stage configured with a larger retry budget (e.g. stage
    /// 3's 2 retries) must still stop retrying a persistently-unparseable
    /// response after a single retry, leaving the rest of its budget
    /// unused. `None` means the kind is bounded only by the stage's own
    /// policy.
    #[must_use]
    pub const fn max_retries(&self) -> Option<u32> {
        match self {
            Self::ParseFailure { .. } => Some(1),
            _ => None,
        }
    }
}

/// Structured error attached to a failed stage, and the public error type
/// returned by fallible pipeline-core operations.
#[derive(Debug, Error, Clone)]
#[error("{kind}")]
pub struct ForgeError {
    pub kind: ForgeErrorKind,
    /// Stage this error occurred in, if any (stage 0 errors and
    /// component-level errors outside any stage are both valid `None`).
    pub stage_id: Option<StageId>,
    pub stage_name: Option<String>,
    pub message: String,
    pub attempt_count: u32,
}

impl ForgeError {
    #[must_use]
    pub fn new(kind: ForgeErrorKind) -> Self {
        let message = kind.to_string();
        Self {
            kind,
            stage_id: None,
            stage_name: None,
            message,
            attempt_count: 1,
        }
    }

    #[must_use]
    pub fn with_stage(mut self, stage_id: StageId, stage_name: impl Into<String>) -> Self {
        self.stage_id = Some(stage_id);
        self.stage_name = Some(stage_name.into());
        self
    }

    #[must_use]
    pub fn with_attempt_count(mut self, attempt_count: u32) -> Self {
        self.attempt_count = attempt_count;
        self
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}
