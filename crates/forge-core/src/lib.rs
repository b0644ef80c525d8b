//! Data model, error taxonomy, and collaborator-trait contracts shared by
//! every pipeline-core component (`spec.md` §3, §6, §7).

pub mod artifact;
pub mod build;
pub mod config;
pub mod error;
pub mod ids;
pub mod ports;
pub mod stage;

pub use artifact::{Artifact, Diagnostics, StageResult};
pub use build::{BuildContext, BuildRequest, BuildSnapshot, BuildStatus};
pub use error::{ForgeError, ForgeErrorKind};
pub use ids::{BuildId, OrgId, ProjectId, StageId, UserId};
pub use stage::{Handler, StageContext, StageDeps, StageDescriptor};
