//! Orchestrator-level configuration: everything that isn't part of the
//! fixed stage table itself.

use camino::Utf8PathBuf;
use forge_core::config::RetryConfig;

/// Configuration for one `Orchestrator` instance.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Base directory under which each build's `ProjectDir` is derived
    /// from its `ProjectID` (`spec.md` §3's `BuildContext.ProjectDir`).
    pub projects_root: Utf8PathBuf,
    /// Backoff schedule handed to every stage's `RetryPolicy`
    /// (`ForgeConfig::retry` by default).
    pub retry: RetryConfig,
}

impl OrchestratorConfig {
    #[must_use]
    pub fn new(projects_root: Utf8PathBuf) -> Self {
        Self {
            projects_root,
            retry: RetryConfig::default(),
        }
    }
}
