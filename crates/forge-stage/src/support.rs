//! Shared plumbing every stage handler uses to read its declared inputs,
//! render its template, and call the router, so each handler module is
//! left with only its stage-specific logic.

use std::collections::BTreeMap;
use std::time::Duration;

use camino::Utf8PathBuf;
use forge_core::artifact::Artifact;
use forge_core::error::{ForgeError, ForgeErrorKind};
use forge_core::ids::StageId;
use forge_core::ports::{Correlation, ModelCallOpts, ModelCallResult, TemplateVar};
use forge_core::stage::StageContext;

/// Fetches a declared input artifact, failing with `InputMissing` if the
/// orchestrator did not supply it (it always should have, per §4.6 step c;
/// this is a defensive check for misconfigured stage descriptors).
pub fn require_input<'a>(
    ctx: &'a StageContext,
    name: &str,
    producing_stage: StageId,
) -> Result<&'a Artifact, ForgeError> {
    ctx.inputs.get(name).ok_or_else(|| {
        ForgeError::new(ForgeErrorKind::InputMissing {
            artifact: name.to_string(),
            producing_stage,
        })
        .with_stage(ctx.stage_id, ctx.stage_name)
    })
}

pub fn require_json<'a>(
    ctx: &'a StageContext,
    name: &str,
    producing_stage: StageId,
) -> Result<&'a serde_json::Value, ForgeError> {
    require_input(ctx, name, producing_stage)?.as_json().ok_or_else(|| {
        ForgeError::new(ForgeErrorKind::ParseFailure {
            reason: format!("artifact '{name}' is not a JSON document"),
        })
        .with_stage(ctx.stage_id, ctx.stage_name)
    })
}

pub fn require_markdown<'a>(
    ctx: &'a StageContext,
    name: &str,
    producing_stage: StageId,
) -> Result<&'a str, ForgeError> {
    require_input(ctx, name, producing_stage)?.as_str().ok_or_else(|| {
        ForgeError::new(ForgeErrorKind::ParseFailure {
            reason: format!("artifact '{name}' is not a markdown document"),
        })
        .with_stage(ctx.stage_id, ctx.stage_name)
    })
}

/// Renders `template` against `vars` through this stage's template registry.
pub fn render(
    ctx: &StageContext,
    template: &str,
    vars: BTreeMap<String, TemplateVar>,
) -> Result<String, ForgeError> {
    ctx.deps
        .template_registry
        .render(template, &vars)
        .map_err(|e| e.with_stage(ctx.stage_id, ctx.stage_name))
}

/// Calls this stage's model through the router, attaching correlation
/// metadata and the per-attempt deadline.
pub async fn call_model(
    ctx: &StageContext,
    prompt: &str,
    timeout: Duration,
    file_path: Option<Utf8PathBuf>,
) -> Result<ModelCallResult, ForgeError> {
    let opts = ModelCallOpts {
        timeout,
        correlation: Correlation {
            build_id: ctx.build_id.0.clone(),
            stage_id: ctx.stage_id,
            file_path,
        },
    };
    ctx.deps
        .router
        .call_stage(ctx.stage_id, prompt, &opts)
        .await
        .map_err(|e| e.with_stage(ctx.stage_id, ctx.stage_name))
}
