//! Stage 5 — structure-validation: validates the proposed file structure
//! against the documentation, correcting it if needed (`spec.md` §4.5).
//!
//! Open Question (§9): on a second, unrecoverable parse failure the
//! original behaviour silently substituted the unvalidated input. Here the
//! substitution still happens (the pipeline must make forward progress),
//! but the failure is also surfaced as a diagnostic rather than swallowed.

use std::collections::BTreeMap;
use std::time::Duration;

use forge_core::artifact::{Artifact, StageResult};
use forge_core::error::ForgeError;
use forge_core::ids::StageId;
use forge_core::ports::TemplateVar;
use forge_core::stage::StageContext;
use futures::future::BoxFuture;

use crate::json_extract::extract_json;
use crate::support::{call_model, render, require_json, require_markdown};

const TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub fn run(ctx: &StageContext) -> BoxFuture<'_, Result<StageResult, ForgeError>> {
    Box::pin(async move {
        let documentation = require_markdown(ctx, "documentation_with_schema.md", StageId(3))?.to_string();
        let proposed = require_json(ctx, "file_structure.json", StageId(4))?.clone();

        let vars = BTreeMap::from([
            ("documentation_with_schema".to_string(), TemplateVar::Text(documentation)),
            ("file_structure".to_string(), TemplateVar::Json(proposed.clone())),
        ]);
        let prompt = render(ctx, forge_template::STRUCTURAL_VALIDATOR, vars)?;
        let response = call_model(ctx, &prompt, TIMEOUT, None).await?;

        let mut artifacts = BTreeMap::new();
        let result = match extract_json(&response.content) {
            Ok(validated) => {
                artifacts.insert("validated_structure.json".to_string(), Artifact::Json(validated));
                StageResult::success(artifacts)
            }
            Err(err) => {
                artifacts.insert("validated_structure.json".to_string(), Artifact::Json(proposed));
                StageResult::success(artifacts).with_diagnostics(vec![format!(
                    "structure-validation response did not parse as JSON, falling back to the \
                     proposed structure unchanged: {err}"
                )])
            }
        };
        Ok(result)
    })
}
