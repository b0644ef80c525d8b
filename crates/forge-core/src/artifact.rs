//! The `Artifact` value type and the per-stage `StageResult` every handler
//! produces.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// One of the four artifact shapes a stage can produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Artifact {
    Json(serde_json::Value),
    Markdown(String),
    Binary(Vec<u8>),
    /// A set of source files keyed by path relative to `code/`.
    SourceTree(BTreeMap<Utf8PathBuf, String>),
}

impl Artifact {
    #[must_use]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Markdown(s) => Some(s),
            _ => None,
        }
    }
}

/// Optional warnings a handler can surface without failing its stage.
pub type Diagnostics = Vec<String>;

/// The result of executing a single stage handler.
///
/// Invariant: `success == true` implies every name in the stage's declared
/// `output_artifacts` is present in `artifacts`.
#[derive(Debug, Clone)]
pub struct StageResult {
    pub success: bool,
    pub artifacts: BTreeMap<String, Artifact>,
    pub skipped: bool,
    pub diagnostics: Diagnostics,
}

impl StageResult {
    #[must_use]
    pub fn success(artifacts: BTreeMap<String, Artifact>) -> Self {
        Self {
            success: true,
            artifacts,
            skipped: false,
            diagnostics: Vec::new(),
        }
    }

    #[must_use]
    pub fn skipped(artifacts: BTreeMap<String, Artifact>) -> Self {
        Self {
            success: true,
            artifacts,
            skipped: true,
            diagnostics: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Verify every declared output is present; called by the orchestrator
    /// before accepting a handler's result as a success.
    #[must_use]
    pub fn has_all_outputs(&self, declared_outputs: &[&str]) -> bool {
        declared_outputs.iter().all(|name| self.artifacts.contains_key(*name))
    }
}
