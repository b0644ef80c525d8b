//! Stage 4 — file-structure: proposes a nested file-tree mapping from
//! `documentation_with_schema.md` (`spec.md` §4.5).

use std::collections::BTreeMap;
use std::time::Duration;

use forge_core::artifact::{Artifact, StageResult};
use forge_core::error::ForgeError;
use forge_core::ids::StageId;
use forge_core::ports::TemplateVar;
use forge_core::stage::StageContext;
use futures::future::BoxFuture;

use crate::json_extract::extract_json;
use crate::support::{call_model, render, require_markdown};

const TIMEOUT: Duration = Duration::from_secs(10 * 60);

pub fn run(ctx: &StageContext) -> BoxFuture<'_, Result<StageResult, ForgeError>> {
    Box::pin(async move {
        let documentation = require_markdown(ctx, "documentation_with_schema.md", StageId(3))?.to_string();

        let vars = BTreeMap::from([(
            "documentation_with_schema".to_string(),
            TemplateVar::Text(documentation),
        )]);
        let prompt = render(ctx, forge_template::FILE_STRUCTURE_GENERATOR, vars)?;
        let response = call_model(ctx, &prompt, TIMEOUT, None).await?;
        let structure = extract_json(&response.content)?;

        let mut artifacts = BTreeMap::new();
        artifacts.insert("file_structure.json".to_string(), Artifact::Json(structure));
        Ok(StageResult::success(artifacts))
    })
}
