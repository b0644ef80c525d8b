//! Stage 8 — code-generation: the per-file fan-out scheduler (`spec.md`
//! §4.6 stage-specific note, §5 concurrency model). Processes the prompt
//! array in batches of the stage descriptor's `Concurrency`
//! (`StageContext::concurrency`, 5 by default), strips fenced code blocks
//! from each response, and fails the whole stage only if more than 30% of
//! files fail.

use std::collections::BTreeMap;
use std::time::Duration;

use camino::Utf8PathBuf;
use forge_core::artifact::{Artifact, StageResult};
use forge_core::error::{ForgeError, ForgeErrorKind};
use forge_core::ids::StageId;
use forge_core::ports::TemplateVar;
use forge_core::stage::StageContext;
use futures::future::BoxFuture;

use crate::support::{call_model, render};
use crate::text::strip_code_fence;

const TIMEOUT: Duration = Duration::from_secs(60 * 60);
const FAILURE_RATIO_THRESHOLD: f64 = 0.30;

struct FileOutcome {
    path: Utf8PathBuf,
    content: Result<String, String>,
}

pub fn run(ctx: &StageContext) -> BoxFuture<'_, Result<StageResult, ForgeError>> {
    Box::pin(async move {
        let prompts = crate::support::require_json(ctx, "gemini_prompts.json", StageId(7))?
            .as_array()
            .cloned()
            .ok_or_else(|| {
                ForgeError::new(ForgeErrorKind::ParseFailure {
                    reason: "gemini_prompts.json is not an array".to_string(),
                })
                .with_stage(ctx.stage_id, ctx.stage_name)
            })?;

        if prompts.is_empty() {
            return Err(ForgeError::new(ForgeErrorKind::InputMissing {
                artifact: "gemini_prompts.json".to_string(),
                producing_stage: StageId(7),
            })
            .with_stage(ctx.stage_id, ctx.stage_name));
        }

        let total = prompts.len() as u32;
        let mut outcomes = Vec::with_capacity(prompts.len());
        let batch_size = ctx.concurrency.max(1);

        for batch in prompts.chunks(batch_size) {
            if ctx.cancel.is_cancelled() {
                return Err(ForgeError::new(ForgeErrorKind::Cancelled).with_stage(ctx.stage_id, ctx.stage_name));
            }

            let futures = batch.iter().map(|record| generate_one(ctx, record));
            let batch_outcomes = futures::future::join_all(futures).await;
            outcomes.extend(batch_outcomes);

            ctx.deps.progress.emit_progress(
                &ctx.build_id.0,
                ctx.stage_id,
                outcomes.len() as u32,
                total,
                None,
            );
        }

        let failed: Vec<&FileOutcome> = outcomes.iter().filter(|o| o.content.is_err()).collect();
        let failure_ratio = if outcomes.is_empty() { 0.0 } else { failed.len() as f64 / outcomes.len() as f64 };

        if failure_ratio > FAILURE_RATIO_THRESHOLD {
            let summary = failed
                .iter()
                .map(|o| format!("{}: {}", o.path, o.content.as_ref().unwrap_err()))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ForgeError::new(ForgeErrorKind::ArtifactIoError {
                artifact: "source_files".to_string(),
                reason: format!(
                    "{}/{} files failed to generate (> {:.0}% threshold): {summary}",
                    failed.len(),
                    outcomes.len(),
                    FAILURE_RATIO_THRESHOLD * 100.0
                ),
            })
            .with_stage(ctx.stage_id, ctx.stage_name));
        }

        let mut source_files = BTreeMap::new();
        let mut diagnostics = Vec::new();
        for outcome in outcomes {
            match outcome.content {
                Ok(content) => {
                    source_files.insert(outcome.path, content);
                }
                Err(reason) => diagnostics.push(format!("{}: generation failed: {reason}", outcome.path)),
            }
        }

        let mut artifacts = BTreeMap::new();
        artifacts.insert("source_files".to_string(), Artifact::SourceTree(source_files));
        Ok(StageResult::success(artifacts).with_diagnostics(diagnostics))
    })
}

async fn generate_one(ctx: &StageContext, record: &serde_json::Value) -> FileOutcome {
    let filename = record["filename"].as_str().unwrap_or("unknown").to_string();
    let path = Utf8PathBuf::from(&filename);
    let generated_prompt = record["generatedPrompt"].as_str().unwrap_or_default().to_string();

    let result = async {
        let vars = BTreeMap::from([
            ("filename".to_string(), TemplateVar::Text(filename.clone())),
            ("generated_prompt".to_string(), TemplateVar::Text(generated_prompt)),
        ]);
        let prompt = render(ctx, forge_template::GEMINI_CODER, vars)?;
        let response = call_model(ctx, &prompt, TIMEOUT, Some(path.clone())).await?;
        Ok::<_, ForgeError>(strip_code_fence(&response.content))
    }
    .await;

    FileOutcome { path, content: result.map_err(|e| e.message) }
}
