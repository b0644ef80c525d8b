//! Stage 2 — docs-creation: renders developer-facing documentation from
//! `refined_specs.json` (`spec.md` §4.5, §4.6).

use std::collections::BTreeMap;
use std::time::Duration;

use forge_core::artifact::{Artifact, StageResult};
use forge_core::error::ForgeError;
use forge_core::ids::StageId;
use forge_core::ports::TemplateVar;
use forge_core::stage::StageContext;
use futures::future::BoxFuture;

use crate::support::{call_model, render, require_json};

const TIMEOUT: Duration = Duration::from_secs(10 * 60);

pub fn run(ctx: &StageContext) -> BoxFuture<'_, Result<StageResult, ForgeError>> {
    Box::pin(async move {
        let refined_specs = require_json(ctx, "refined_specs.json", StageId(1))?;

        let vars = BTreeMap::from([("refined_specs".to_string(), TemplateVar::Json(refined_specs.clone()))]);
        let prompt = render(ctx, forge_template::DOCS_CREATOR, vars)?;
        let response = call_model(ctx, &prompt, TIMEOUT, None).await?;

        let mut artifacts = BTreeMap::new();
        artifacts.insert("documentation.md".to_string(), Artifact::Markdown(response.content));
        Ok(StageResult::success(artifacts))
    })
}
