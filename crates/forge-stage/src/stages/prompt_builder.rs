//! Stage 7 — prompt-builder: turns the validated file structure into one
//! code-generation prompt per file (`spec.md` §4.6 stage-specific note).
//! Concurrency is 1 for this stage (§4.5), so files are processed in
//! sequence; `stage:progress` is still emitted per file, per §4.7's note
//! that stage 7 reports progress during its fan-out.

use std::collections::BTreeMap;
use std::time::Duration;

use forge_core::artifact::{Artifact, StageResult};
use forge_core::ids::StageId;
use forge_core::ports::TemplateVar;
use forge_core::stage::StageContext;
use forge_core::ForgeError;
use futures::future::BoxFuture;

use crate::structure::flatten_structure;
use crate::support::{call_model, render, require_json, require_markdown};
use crate::text::docs_excerpt;

const TIMEOUT: Duration = Duration::from_secs(10 * 60);
const DOCS_EXCERPT_CAP: usize = 2_000;

pub fn run(ctx: &StageContext) -> BoxFuture<'_, Result<StageResult, ForgeError>> {
    Box::pin(async move {
        let structure = require_json(ctx, "validated_structure.json", StageId(5))?;
        let documentation = require_markdown(ctx, "documentation_with_schema.md", StageId(3))?.to_string();
        let schema = require_json(ctx, "schema.json", StageId(3))?;
        let schema_excerpt = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());

        let files = flatten_structure(structure);
        let total = files.len() as u32;
        let mut prompts = Vec::with_capacity(files.len());

        for (index, file) in files.iter().enumerate() {
            let keyword = primary_keyword(&file.path);
            let docs = docs_excerpt(&documentation, &keyword, DOCS_EXCERPT_CAP);
            let imports = infer_imports(&file.path);
            let functions = infer_functions(&file.path);

            let vars = BTreeMap::from([
                ("filename".to_string(), TemplateVar::Text(file.path.to_string())),
                ("purpose".to_string(), TemplateVar::Text(file.purpose.clone())),
                ("docs_excerpt".to_string(), TemplateVar::Text(docs)),
                ("schema_excerpt".to_string(), TemplateVar::Text(schema_excerpt.clone())),
                ("imports".to_string(), TemplateVar::Text(imports.join(", "))),
                ("functions".to_string(), TemplateVar::Text(functions.join(", "))),
            ]);
            let prompt = render(ctx, forge_template::PROMPT_BUILDER, vars)?;
            let response = call_model(ctx, &prompt, TIMEOUT, Some(file.path.clone())).await?;

            prompts.push(serde_json::json!({
                "filename": file.path.to_string(),
                "purpose": file.purpose,
                "schema": schema,
                "imports": imports,
                "generatedPrompt": response.content,
                "functions": functions,
            }));

            ctx.deps.progress.emit_progress(
                &ctx.build_id.0,
                ctx.stage_id,
                index as u32 + 1,
                total,
                Some(file.path.clone()),
            );
        }

        let mut artifacts = BTreeMap::new();
        artifacts.insert("gemini_prompts.json".to_string(), Artifact::Json(serde_json::Value::Array(prompts)));
        Ok(StageResult::success(artifacts))
    })
}

/// The keyword used to find this file's relevant documentation section:
/// the file stem, falling back to the parent directory name.
fn primary_keyword(path: &camino::Utf8PathBuf) -> String {
    path.file_stem().map(str::to_string).unwrap_or_else(|| path.to_string())
}

/// Infers likely imports from filename/path keywords (`spec.md` §4.6).
fn infer_imports(path: &camino::Utf8PathBuf) -> Vec<String> {
    let lower = path.as_str().to_lowercase();
    let mut imports = Vec::new();
    if lower.contains("route") {
        imports.push("auth middleware".to_string());
        imports.push("database client".to_string());
    }
    if lower.contains("component") {
        imports.push("shared stores".to_string());
    }
    if lower.contains("auth") {
        imports.push("password hashing library".to_string());
    }
    if lower.contains("crud") || lower.contains("model") {
        imports.push("database client".to_string());
    }
    if imports.is_empty() {
        imports.push("standard library only".to_string());
    }
    imports
}

/// Infers a likely function list from filename/path keywords.
fn infer_functions(path: &camino::Utf8PathBuf) -> Vec<String> {
    let lower = path.as_str().to_lowercase();
    let mut functions = Vec::new();
    if lower.contains("auth") {
        functions.push("login".to_string());
        functions.push("register".to_string());
    }
    if lower.contains("route") || lower.contains("crud") {
        functions.push("create".to_string());
        functions.push("read".to_string());
        functions.push("update".to_string());
        functions.push("delete".to_string());
    }
    if functions.is_empty() {
        functions.push("default export".to_string());
    }
    functions
}
