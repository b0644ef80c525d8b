//! Opaque identifiers used throughout the pipeline core.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// Unique identifier for a single build (one execution of the pipeline).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
pub struct BuildId(pub String);

/// Identifier of the project this build belongs to; derives the build's
/// filesystem-scoped project directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
pub struct ProjectId(pub String);

/// Identifier of the organization that owns the project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
pub struct OrgId(pub String);

/// Identifier of the user who triggered the build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Identifier of one of the ten fixed stages, 0 through 9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StageId(pub u8);

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
