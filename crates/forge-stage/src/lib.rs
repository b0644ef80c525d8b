//! C5/C8 — the Stage Registry and the ten stage handlers it describes
//! (`spec.md` §4.5, §4.6 stage-specific notes).
//!
//! `registry::table()` is the single source of truth the orchestrator
//! walks; everything else in this crate exists to let each `stages::*`
//! handler stay a thin, declarative rendering of its stage's prose.

pub mod json_extract;
pub mod registry;
pub mod stages;
pub mod structure;
pub mod support;
pub mod text;

#[cfg(test)]
mod test_support;

pub use registry::{table as stage_table, STAGE_COUNT};
