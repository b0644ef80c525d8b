//! Stage 6 — empty-file-creation: flattens `validated_structure.json` and
//! writes a typed placeholder for every file (`spec.md` §4.6 stage-specific
//! note). No AI call.
//!
//! Artifact writing happens in the orchestrator, after a handler returns
//! (`spec.md` §4.6 step f), so the "verifies every expected file exists"
//! check described for this stage is performed here against the in-memory
//! `SourceTree` the handler is about to return, rather than against disk.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use forge_core::artifact::{Artifact, StageResult};
use forge_core::error::{ForgeError, ForgeErrorKind};
use forge_core::ids::StageId;
use forge_core::stage::StageContext;
use futures::future::BoxFuture;

use crate::structure::flatten_structure;
use crate::support::require_json;

pub fn run(ctx: &StageContext) -> BoxFuture<'_, Result<StageResult, ForgeError>> {
    Box::pin(async move {
        let structure = require_json(ctx, "validated_structure.json", StageId(5))?;
        let files = flatten_structure(structure);

        let mut source_files = BTreeMap::new();
        for file in &files {
            let content = placeholder_for(&file.path, &file.purpose);
            source_files.insert(file.path.clone(), content);
        }

        if source_files.len() != files.len() {
            return Err(ForgeError::new(ForgeErrorKind::ArtifactIoError {
                artifact: "source_files".to_string(),
                reason: format!(
                    "expected {} placeholder files but only produced {}",
                    files.len(),
                    source_files.len()
                ),
            })
            .with_stage(ctx.stage_id, ctx.stage_name));
        }

        let mut artifacts = BTreeMap::new();
        artifacts.insert("source_files".to_string(), Artifact::SourceTree(source_files));
        Ok(StageResult::success(artifacts))
    })
}

fn placeholder_for(path: &Utf8PathBuf, purpose: &str) -> String {
    match path.extension().unwrap_or_default() {
        "js" | "ts" | "jsx" | "tsx" => format!("/**\n * {purpose}\n */\n"),
        "svelte" | "vue" => format!(
            "<!--\n  {purpose}\n-->\n<script>\n</script>\n\n<template>\n</template>\n\n<style>\n</style>\n"
        ),
        "css" | "scss" => format!("/* {purpose} */\n"),
        "html" => format!("<!-- {purpose} -->\n"),
        "md" => format!("<!-- {purpose} -->\n"),
        "json" => serde_json::json!({"_placeholder": purpose}).to_string() + "\n",
        _ => format!("# {purpose}\n"),
    }
}
