//! The canonical stage table (`spec.md` §4.5). An implementation must
//! reproduce this table exactly: names, inputs, outputs, timeouts,
//! retries, and concurrency are part of the external contract.

use std::time::Duration;

use forge_core::ids::StageId;
use forge_core::stage::StageDescriptor;

use crate::stages;

pub const STAGE_COUNT: usize = 10;

#[must_use]
pub fn table() -> [StageDescriptor; STAGE_COUNT] {
    [
        StageDescriptor {
            id: StageId(0),
            name: "questionnaire",
            requires_ai: false,
            input_artifacts: &[],
            output_artifacts: &["specs.json"],
            handler: stages::questionnaire::run,
            prompt_template: None,
            timeout: Duration::ZERO,
            retries: 0,
            concurrency: 1,
        },
        StageDescriptor {
            id: StageId(1),
            name: "refinement",
            requires_ai: true,
            input_artifacts: &["specs.json"],
            output_artifacts: &["refined_specs.json", "clarification_history.json"],
            handler: stages::refinement::run,
            prompt_template: Some(forge_template::CLARIFIER),
            timeout: Duration::from_secs(5 * 60),
            retries: 2,
            concurrency: 1,
        },
        StageDescriptor {
            id: StageId(2),
            name: "docs-creation",
            requires_ai: true,
            input_artifacts: &["refined_specs.json"],
            output_artifacts: &["documentation.md"],
            handler: stages::docs_creation::run,
            prompt_template: Some(forge_template::DOCS_CREATOR),
            timeout: Duration::from_secs(10 * 60),
            retries: 2,
            concurrency: 1,
        },
        StageDescriptor {
            id: StageId(3),
            name: "schema-creation",
            requires_ai: true,
            input_artifacts: &["documentation.md"],
            output_artifacts: &["schema.json", "documentation_with_schema.md"],
            handler: stages::schema_creation::run,
            prompt_template: Some(forge_template::SCHEMA_GENERATOR),
            timeout: Duration::from_secs(10 * 60),
            retries: 2,
            concurrency: 1,
        },
        StageDescriptor {
            id: StageId(4),
            name: "file-structure",
            requires_ai: true,
            input_artifacts: &["documentation_with_schema.md"],
            output_artifacts: &["file_structure.json"],
            handler: stages::file_structure::run,
            prompt_template: Some(forge_template::FILE_STRUCTURE_GENERATOR),
            timeout: Duration::from_secs(10 * 60),
            retries: 2,
            concurrency: 1,
        },
        StageDescriptor {
            id: StageId(5),
            name: "structure-validation",
            requires_ai: true,
            input_artifacts: &["documentation_with_schema.md", "file_structure.json"],
            output_artifacts: &["validated_structure.json"],
            handler: stages::structure_validation::run,
            prompt_template: Some(forge_template::STRUCTURAL_VALIDATOR),
            timeout: Duration::from_secs(5 * 60),
            retries: 2,
            concurrency: 1,
        },
        StageDescriptor {
            id: StageId(6),
            name: "empty-file-creation",
            requires_ai: false,
            input_artifacts: &["validated_structure.json"],
            output_artifacts: &["source_files"],
            handler: stages::empty_file_creation::run,
            prompt_template: None,
            timeout: Duration::from_secs(5 * 60),
            retries: 1,
            concurrency: 1,
        },
        StageDescriptor {
            id: StageId(7),
            name: "prompt-builder",
            requires_ai: true,
            input_artifacts: &["validated_structure.json", "documentation_with_schema.md", "schema.json"],
            output_artifacts: &["gemini_prompts.json"],
            handler: stages::prompt_builder::run,
            prompt_template: Some(forge_template::PROMPT_BUILDER),
            timeout: Duration::from_secs(10 * 60),
            retries: 2,
            concurrency: 1,
        },
        StageDescriptor {
            id: StageId(8),
            name: "code-generation",
            requires_ai: true,
            input_artifacts: &["gemini_prompts.json"],
            output_artifacts: &["source_files"],
            handler: stages::code_generation::run,
            prompt_template: Some(forge_template::GEMINI_CODER),
            timeout: Duration::from_secs(60 * 60),
            retries: 3,
            concurrency: 5,
        },
        StageDescriptor {
            id: StageId(9),
            name: "repo-push",
            requires_ai: false,
            input_artifacts: &["source_files"],
            output_artifacts: &["github_repo_url", "commit_sha"],
            handler: stages::repo_push::run,
            prompt_template: None,
            timeout: Duration::from_secs(10 * 60),
            retries: 2,
            concurrency: 1,
        },
    ]
}
