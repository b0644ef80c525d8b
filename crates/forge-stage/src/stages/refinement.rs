//! Stage 1 — refinement: turns `specs.json` into `refined_specs.json` by
//! round-tripping a clarifying-question list through a heuristic answerer
//! (`spec.md` §4.6, and the human-in-the-loop Open Question in §9 — no
//! retained `original_source/` file describes this stage, so the question
//! parser and answer heuristics below are derived directly from the
//! stage-1 prose).

use std::collections::BTreeMap;
use std::time::Duration;

use forge_core::artifact::{Artifact, StageResult};
use forge_core::error::ForgeError;
use forge_core::ids::StageId;
use forge_core::ports::TemplateVar;
use forge_core::stage::StageContext;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::json_extract::extract_json;
use crate::support::{call_model, render, require_json};

const TIMEOUT: Duration = Duration::from_secs(5 * 60);

static NUMBERED_QUESTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*\d+[.)]\s*(.+)$").unwrap());

pub fn run(ctx: &StageContext) -> BoxFuture<'_, Result<StageResult, ForgeError>> {
    Box::pin(async move {
        let specs = require_json(ctx, "specs.json", StageId(0))?;

        let clarifier_prompt = render(
            ctx,
            forge_template::CLARIFIER,
            vars([("specs", TemplateVar::Json(specs.clone()))]),
        )?;
        let questions_response = call_model(ctx, &clarifier_prompt, TIMEOUT, None).await?;
        let questions = parse_questions(&questions_response.content);

        let history: Vec<serde_json::Value> = questions
            .iter()
            .map(|q| {
                let answer = heuristic_answer(q);
                serde_json::json!({"question": q, "answer": answer})
            })
            .collect();
        let history_value = serde_json::Value::Array(history.clone());

        let consolidation_prompt = render(
            ctx,
            forge_template::REFINEMENT_CONSOLIDATION,
            vars([
                ("specs", TemplateVar::Json(specs.clone())),
                ("clarification_history", TemplateVar::Json(history_value.clone())),
            ]),
        )?;
        let consolidated = call_model(ctx, &consolidation_prompt, TIMEOUT, None).await?;

        let refined = match extract_json(&consolidated.content) {
            Ok(value) => value,
            Err(_) => deterministic_merge(specs, &history),
        };

        let mut artifacts = BTreeMap::new();
        artifacts.insert("refined_specs.json".to_string(), Artifact::Json(refined));
        artifacts.insert("clarification_history.json".to_string(), Artifact::Json(history_value));
        Ok(StageResult::success(artifacts))
    })
}

fn vars<const N: usize>(pairs: [(&str, TemplateVar); N]) -> BTreeMap<String, TemplateVar> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// Splits a clarifier response into its numbered questions; if nothing
/// matches the numbered-list pattern the whole response is treated as a
/// single question so the stage still makes forward progress.
fn parse_questions(content: &str) -> Vec<String> {
    let matches: Vec<String> = NUMBERED_QUESTION
        .captures_iter(content)
        .map(|caps| caps[1].trim().to_string())
        .collect();
    if matches.is_empty() {
        let trimmed = content.trim();
        if trimmed.is_empty() { Vec::new() } else { vec![trimmed.to_string()] }
    } else {
        matches
    }
}

/// Canned answers keyed by keyword found in the question text, standing in
/// for the human-in-the-loop replacement the Open Question discusses.
fn heuristic_answer(question: &str) -> String {
    let lower = question.to_lowercase();
    if lower.contains("auth") || lower.contains("login") || lower.contains("sign in") {
        "Use email/password authentication with hashed credentials and session-based login."
            .to_string()
    } else if lower.contains("database") || lower.contains("data store") || lower.contains("persist") {
        "Use a relational database with a schema matching the described data model.".to_string()
    } else if lower.contains("style") || lower.contains("design") || lower.contains(" ui") {
        "Use a clean, minimal, responsive design with no specific branding requirements."
            .to_string()
    } else if lower.contains("deploy") || lower.contains("hosting") {
        "Deployment is out of scope for this specification; assume a standard container deployment."
            .to_string()
    } else {
        "Use sensible defaults for this aspect unless stated otherwise elsewhere in the specification."
            .to_string()
    }
}

/// Folds each Q/A pair into `specs` under a `_clarifications` list, used
/// when the consolidation response fails to parse as JSON.
fn deterministic_merge(specs: &serde_json::Value, history: &[serde_json::Value]) -> serde_json::Value {
    let mut merged = specs.clone();
    if let serde_json::Value::Object(ref mut map) = merged {
        map.insert("_clarifications".to_string(), serde_json::Value::Array(history.to_vec()));
    } else {
        merged = serde_json::json!({
            "_original": specs,
            "_clarifications": history,
        });
    }
    merged
}
