//! Stage 3 — schema-creation: derives `schema.json` from `documentation.md`
//! and appends it as a fenced JSON section, writing the combined file as
//! `documentation_with_schema.md` (`spec.md` §4.6 stage-specific note).

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
        let documentation = require_markdown(ctx, "documentation.md", StageId(2))?.to_string();

        let vars = BTreeMap::from([(
            "documentation".to_string(),
            TemplateVar::Text(documentation.clone()),
        )]);
        let prompt = render(ctx, forge_template::SCHEMA_GENERATOR, vars)?;
        let response = call_model(ctx, &prompt, TIMEOUT, None).await?;
        let schema = extract_json(&response.content)?;

        let combined = append_schema_section(&documentation, &schema);

        let mut artifacts = BTreeMap::new();
        artifacts.insert("schema.json".to_string(), Artifact::Json(schema));
        artifacts.insert("documentation_with_schema.md".to_string(), Artifact::Markdown(combined));
        Ok(StageResult::success(artifacts))
    })
}

fn append_schema_section(documentation: &str, schema: &serde_json::Value) -> String {
    let rendered = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!("{documentation}\n\n## Data Schema\n\n```json\n{rendered}\n```\n")
}
