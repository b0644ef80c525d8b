//! Stage 9 — repo-push: publishes the generated source tree to a remote
//! repository (`spec.md` §4.6 stage-specific note). No AI call.
//!
//! Declares its input as the same `source_files` artifact stage 6/8 write,
//! letting the orchestrator hand the handler the complete in-memory file
//! map rather than the handler reading `code/` back off the artifact store
//! itself (`spec.md`'s "last-write-wins per artifact name" Non-goal makes
//! reusing that name across stages safe).

use std::collections::BTreeMap;

use forge_core::artifact::{Artifact, StageResult};
use forge_core::error::{ForgeError, ForgeErrorKind};
use forge_core::ids::StageId;
use forge_core::stage::StageContext;
use futures::future::BoxFuture;

use crate::support::require_input;
use crate::text::sanitize_repo_name;

pub fn run(ctx: &StageContext) -> BoxFuture<'_, Result<StageResult, ForgeError>> {
    Box::pin(async move {
        let source_files = match require_input(ctx, "source_files", StageId(8))? {
            Artifact::SourceTree(files) => files.clone(),
            _ => {
                return Err(ForgeError::new(ForgeErrorKind::ParseFailure {
                    reason: "source_files is not a source tree".to_string(),
                })
                .with_stage(ctx.stage_id, ctx.stage_name))
            }
        };

        let repo_name = sanitize_repo_name(&ctx.project_id.0);
        let description = format!("Generated application for project {}", ctx.project_id);
        let repo = ctx
            .deps
            .repo_publisher
            .create_repo(&repo_name, &description, true)
            .await
            .map_err(|e| e.with_stage(ctx.stage_id, ctx.stage_name))?;

        let commit_sha = ctx
            .deps
            .repo_publisher
            .push_files(&repo.owner, &repo.name, &source_files, "Initial generated commit", "main")
            .await
            .map_err(|e| e.with_stage(ctx.stage_id, ctx.stage_name))?;

        let mut artifacts = BTreeMap::new();
        artifacts.insert("github_repo_url".to_string(), Artifact::Markdown(repo.url));
        artifacts.insert("commit_sha".to_string(), Artifact::Markdown(commit_sha));
        Ok(StageResult::success(artifacts))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context_with_inputs, deps_with_repo_publisher, ScriptedRepoPublisher};
    use camino::Utf8PathBuf;
    use std::sync::Arc;

    #[tokio::test]
    async fn pushes_source_files_and_returns_url_and_commit() {
        let mut files = BTreeMap::new();
        files.insert(Utf8PathBuf::from("src/index.js"), "console.log(1);".to_string());

        let mut inputs = BTreeMap::new();
        inputs.insert("source_files".to_string(), Artifact::SourceTree(files));

        let publisher = Arc::new(ScriptedRepoPublisher::default());
        let deps = deps_with_repo_publisher(vec![], publisher.clone());
        let mut ctx = context_with_inputs(9, "repo-push", inputs, deps);
        ctx.project_id = forge_core::ids::ProjectId("My Cool App!!".to_string());

        let result = run(&ctx).await.unwrap();
        assert!(result.artifacts["github_repo_url"].as_str().unwrap().contains("my-cool-app"));
        assert_eq!(result.artifacts["commit_sha"].as_str().unwrap(), "deadbeef");
        assert!(publisher.pushed.lock().unwrap().is_some());
    }
}
