//! Pipeline Orchestration Core.
//!
//! Given a user-supplied application specification, this crate drives a
//! fixed ten-stage pipeline that progressively refines the specification
//! into source code and a published repository. See `SPEC_FULL.md` for the
//! full design.
//!
//! This is a library facade: it re-exports the public API of each
//! component crate under a single namespace, the way the teacher's root
//! package re-exports its engine crate.

pub use forge_core as core;
pub use forge_core::error::{ForgeError, ForgeErrorKind};

pub use forge_artifact as artifact;
pub use forge_template as template;
pub use forge_llm as llm;
pub use forge_retry as retry;
pub use forge_events as events;
pub use forge_stage as stage;

pub use forge_orchestrator as orchestrator;
pub use forge_orchestrator::{Orchestrator, OrchestratorConfig};
