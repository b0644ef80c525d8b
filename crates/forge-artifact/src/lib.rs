//! C1 — Artifact Store.
//!
//! A filesystem-rooted, per-project namespace holding every pipeline
//! output under the canonical `specs/`, `docs/`, `code/` layout
//! (`spec.md` §4.1, §6).

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use forge_core::artifact::Artifact;
use forge_core::error::{ForgeError, ForgeErrorKind};
use forge_core::ports::ArtifactStorePort;
use forge_utils::atomic_write::write_file_atomic;
use forge_utils::paths::SandboxRoot;

/// Filesystem-backed implementation of [`ArtifactStorePort`].
#[derive(Debug, Clone, Default)]
pub struct FsArtifactStore;

impl FsArtifactStore {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// The three canonical subdirectories every project directory has.
const SPECS_DIR: &str = "specs";
const DOCS_DIR: &str = "docs";
const CODE_DIR: &str = "code";

/// Decide which canonical subtree an artifact name routes to.
///
/// Routing rule (`spec.md` §4.1): `.md` -> `docs/`; a name with a path
/// segment exactly equal to `code` or `file`, or any path already under
/// `code/`, -> the `code/` tree; otherwise -> `specs/`.
fn route(name: &str) -> &'static str {
    if name.ends_with(".md") {
        return DOCS_DIR;
    }
    let is_code_segment = Utf8Path::new(name)
        .components()
        .any(|c| matches!(c.as_str(), "code" | "file"));
    if is_code_segment {
        return CODE_DIR;
    }
    SPECS_DIR
}

fn is_json_name(name: &str) -> bool {
    name.ends_with(".json")
}

fn io_err(artifact: &str, reason: impl std::fmt::Display) -> ForgeError {
    ForgeError::new(ForgeErrorKind::ArtifactIoError {
        artifact: artifact.to_string(),
        reason: reason.to_string(),
    })
}

fn canonical_json(value: &serde_json::Value) -> Result<String, ForgeError> {
    serde_json_canonicalizer::to_string(value)
        .map_err(|e| io_err("<json>", e))
        .map(|compact| {
            // Re-parse and pretty-print with two-space indent over the
            // canonicalized (stable key order) value.
            let reparsed: serde_json::Value =
                serde_json::from_str(&compact).expect("canonicalizer output is valid JSON");
            serde_json::to_string_pretty(&reparsed).expect("re-serialization cannot fail")
        })
}

impl FsArtifactStore {
    fn write_scalar(
        &self,
        sandbox: &SandboxRoot,
        name: &str,
        artifact: &Artifact,
    ) -> Result<(), ForgeError> {
        let subtree = route(name);
        let relative = format!("{subtree}/{name}");
        let path = sandbox.join(&relative).map_err(|e| io_err(name, e))?;

        let content = match artifact {
            Artifact::Markdown(s) => s.clone(),
            Artifact::Json(v) => canonical_json(v)?,
            Artifact::Binary(bytes) => {
                return self.write_binary(&path, name, bytes);
            }
            Artifact::SourceTree(_) => {
                unreachable!("source trees are written per-file by write_source_tree")
            }
        };

        write_file_atomic(&path, &content).map_err(|e| io_err(name, e))?;
        Ok(())
    }

    fn write_binary(&self, path: &Utf8Path, name: &str, bytes: &[u8]) -> Result<(), ForgeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(name, e))?;
        }
        std::fs::write(path, bytes).map_err(|e| io_err(name, e))?;
        Ok(())
    }

    fn write_source_tree(
        &self,
        sandbox: &SandboxRoot,
        files: &std::collections::BTreeMap<Utf8PathBuf, String>,
    ) -> Result<(), ForgeError> {
        for (relpath, content) in files {
            let relative = format!("{CODE_DIR}/{relpath}");
            let path = sandbox
                .join(&relative)
                .map_err(|e| io_err(relpath.as_str(), e))?;
            write_file_atomic(&path, content).map_err(|e| io_err(relpath.as_str(), e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStorePort for FsArtifactStore {
    async fn ensure_layout(&self, project_dir: &Utf8PathBuf) -> Result<(), ForgeError> {
        for dir in [SPECS_DIR, DOCS_DIR, CODE_DIR] {
            let path = project_dir.join(dir);
            std::fs::create_dir_all(&path).map_err(|e| io_err(dir, e))?;
        }
        Ok(())
    }

    async fn write(
        &self,
        project_dir: &Utf8PathBuf,
        name: &str,
        value: &Artifact,
    ) -> Result<(), ForgeError> {
        let sandbox = SandboxRoot::new(project_dir.clone());
        match value {
            Artifact::SourceTree(files) => self.write_source_tree(&sandbox, files),
            other => self.write_scalar(&sandbox, name, other),
        }
    }

    async fn read(&self, project_dir: &Utf8PathBuf, name: &str) -> Result<Artifact, ForgeError> {
        let sandbox = SandboxRoot::new(project_dir.clone());
        let subtree = route(name);
        let relative = format!("{subtree}/{name}");
        let path = sandbox.join(&relative).map_err(|e| io_err(name, e))?;

        let bytes = std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                io_err(name, "artifact not found")
            } else {
                io_err(name, e)
            }
        })?;

        if is_json_name(name) {
            let text = String::from_utf8(bytes).map_err(|e| io_err(name, e))?;
            let value: serde_json::Value =
                serde_json::from_str(&text).map_err(|e| io_err(name, format!("invalid JSON: {e}")))?;
            Ok(Artifact::Json(value))
        } else {
            match String::from_utf8(bytes) {
                Ok(text) => Ok(Artifact::Markdown(text)),
                Err(e) => Ok(Artifact::Binary(e.into_bytes())),
            }
        }
    }

    async fn exists(&self, project_dir: &Utf8PathBuf, name: &str) -> bool {
        let sandbox = SandboxRoot::new(project_dir.clone());
        let subtree = route(name);
        let relative = format!("{subtree}/{name}");
        match sandbox.join(&relative) {
            Ok(path) => path.as_std_path().exists(),
            Err(_) => false,
        }
    }

    async fn list_code(&self, project_dir: &Utf8PathBuf) -> Result<Vec<Utf8PathBuf>, ForgeError> {
        let code_dir = project_dir.join(CODE_DIR);
        if !code_dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        walk(&code_dir, &code_dir, &mut files).map_err(|e| io_err("code/", e))?;
        files.sort();
        Ok(files)
    }
}

fn walk(root: &Utf8Path, dir: &Utf8Path, out: &mut Vec<Utf8PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir.as_std_path())? {
        let entry = entry?;
        let path = Utf8PathBuf::from_path_buf(entry.path())
            .expect("file paths produced by read_dir over a UTF-8 root are UTF-8");
        if path.is_dir() {
            walk(root, &path, out)?;
        } else {
            out.push(path.strip_prefix(root).unwrap_or(&path).to_owned());
        }
    }
    Ok(())
}
