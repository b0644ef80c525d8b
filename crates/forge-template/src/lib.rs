//! C2 — Prompt Template Registry.
//!
//! A read-only map from template name to template body, with `{{name}}`
//! placeholder substitution. Ported from the `${...}` interpolation engine
//! in `buildit-config::variables::VariableContext`, adapted to the
//! double-brace delimiter and to rendering JSON values with a stable
//! two-space indent rather than plain string interpolation (`spec.md` §4.2).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use forge_core::error::{ForgeError, ForgeErrorKind};
use forge_core::ports::{TemplateRegistryPort, TemplateVar};
use regex::{Captures, Regex};

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([a-zA-Z_][a-zA-Z0-9_]*)\}\}").unwrap());

/// The ten required template names (`spec.md` §4.2).
pub const CLARIFIER: &str = "clarifier";
pub const REFINEMENT_CONSOLIDATION: &str = "refinement-consolidation";
pub const NORMALIZER: &str = "normalizer";
pub const DOCS_CREATOR: &str = "docs-creator";
pub const SCHEMA_GENERATOR: &str = "schema-generator";
pub const STRUCTURAL_VALIDATOR: &str = "structural-validator";
pub const FILE_STRUCTURE_GENERATOR: &str = "file-structure-generator";
pub const VALIDATOR: &str = "validator";
pub const PROMPT_BUILDER: &str = "prompt-builder";
pub const GEMINI_CODER: &str = "gemini-coder";

const REQUIRED_TEMPLATES: &[(&str, &str)] = &[
    (
        CLARIFIER,
        "You are refining an application specification.\n\
         Specification:\n{{specs}}\n\n\
         List every ambiguity or missing detail as a numbered list of questions. \
         Ask only what is necessary to generate a complete, buildable application.",
    ),
    (
        REFINEMENT_CONSOLIDATION,
        "Fold the following clarification history into a single refined specification.\n\
         Original specification:\n{{specs}}\n\n\
         Clarification history (question/answer pairs):\n{{clarification_history}}\n\n\
         Return the refined specification as a single JSON object.",
    ),
    (
        NORMALIZER,
        "Normalize the following refined specification into a canonical shape \
         with well-known top-level keys (appName, description, features, dataModel).\n\n\
         {{refined_specs}}",
    ),
    (
        DOCS_CREATOR,
        "Write developer-facing documentation for the application described below.\n\n\
         {{refined_specs}}",
    ),
    (
        SCHEMA_GENERATOR,
        "Derive a JSON Schema for the data model implied by this documentation.\n\n\
         {{documentation}}",
    ),
    (
        STRUCTURAL_VALIDATOR,
        "Validate the following proposed file structure against the application \
         documentation and schema, and return a corrected structure if needed.\n\n\
         Documentation:\n{{documentation_with_schema}}\n\n\
         Proposed structure:\n{{file_structure}}",
    ),
    (
        FILE_STRUCTURE_GENERATOR,
        "Propose a complete file structure (as a nested JSON object where leaves are \
         one-line file purposes) for the application described below.\n\n\
         {{documentation_with_schema}}",
    ),
    (
        VALIDATOR,
        "Validate the following artifact for internal consistency and completeness.\n\n\
         {{artifact}}",
    ),
    (
        PROMPT_BUILDER,
        "Write a precise code-generation prompt for the file below.\n\n\
         File: {{filename}}\nPurpose: {{purpose}}\n\n\
         Relevant documentation excerpt:\n{{docs_excerpt}}\n\n\
         Relevant schema excerpt:\n{{schema_excerpt}}\n\n\
         Likely imports: {{imports}}\nLikely functions: {{functions}}",
    ),
    (
        GEMINI_CODER,
        "Generate the complete contents of {{filename}} for this application.\n\n\
         Prompt:\n{{generated_prompt}}\n\n\
         Return only the file contents, no explanation and no surrounding prose.",
    ),
];

/// In-memory registry of the ten required prompt templates.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: BTreeMap<&'static str, &'static str>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            templates: REQUIRED_TEMPLATES.iter().copied().collect(),
        }
    }

    /// Render `{{name}}` placeholders in `body` against `vars`.
    ///
    /// Unknown keys (not present in `vars`) are left untouched. An unresolved
    /// placeholder is logged as a warning rather than treated as an error —
    /// the caller is responsible for deciding whether a missing variable is
    /// fatal to its stage.
    fn substitute(body: &str, vars: &BTreeMap<String, TemplateVar>) -> String {
        PLACEHOLDER_RE
            .replace_all(body, |caps: &Captures<'_>| {
                let name = &caps[1];
                match vars.get(name) {
                    Some(TemplateVar::Text(s)) => s.clone(),
                    Some(TemplateVar::Json(v)) => {
                        serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
                    }
                    None => {
                        tracing::warn!(placeholder = name, "unresolved template placeholder");
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }
}

impl TemplateRegistryPort for TemplateRegistry {
    fn render(&self, name: &str, vars: &BTreeMap<String, TemplateVar>) -> Result<String, ForgeError> {
        let body = self
            .templates
            .get(name)
            .ok_or_else(|| ForgeError::new(ForgeErrorKind::TemplateMissing { name: name.to_string() }))?;
        Ok(Self::substitute(body, vars))
    }
}
