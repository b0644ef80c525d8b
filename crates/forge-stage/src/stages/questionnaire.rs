//! Stage 0 — questionnaire: the degenerate first stage. Records the
//! `SpecJSON` the build was started with as `specs.json` and succeeds
//! without calling any model (`spec.md` §4.5).

use std::collections::BTreeMap;

use forge_core::artifact::{Artifact, StageResult};
use forge_core::error::ForgeError;
use forge_core::stage::StageContext;
use futures::future::BoxFuture;

pub fn run(ctx: &StageContext) -> BoxFuture<'_, Result<StageResult, ForgeError>> {
    Box::pin(async move {
        let mut artifacts = BTreeMap::new();
        artifacts.insert("specs.json".to_string(), Artifact::Json(ctx.spec_json.clone()));
        Ok(StageResult::success(artifacts))
    })
}
