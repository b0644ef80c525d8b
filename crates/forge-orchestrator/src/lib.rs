//! C6 — the Pipeline Orchestrator (`spec.md` §4.6).
//!
//! Walks `forge_stage::stage_table()` in ascending stage-id order for one
//! build: skip-if-pre-provided, read declared inputs, invoke the stage's
//! handler under `forge_retry`, write declared outputs, emit lifecycle
//! events on `forge_events::EventBus`. Mirrors the teacher's split between
//! a stable external facade (`Orchestrator`) and the internal run loop
//! (`run_loop`), the way `xchecker-orchestrator` separates `handle.rs`
//! from `phase_exec.rs`/`workflow.rs`.
//!
//! **Outside this crate, use [`Orchestrator`] for all production
//! scenarios.** The run loop is an internal implementation detail spawned
//! per build and is not meant to be driven directly.

mod config;
mod orchestrator;
mod run_loop;

pub use config::OrchestratorConfig;
pub use orchestrator::{Orchestrator, OrchestratorDeps};
