//! Flattens `validated_structure.json`'s nested mapping into an ordered
//! list of files, per stage 6's traversal rule (`spec.md` §4.6). No file
//! from `original_source/` survived retrieval filtering for this system,
//! so this traversal is derived directly from the stage-6 prose rather
//! than ported from a kept reference file.

use std::collections::BTreeSet;

use camino::Utf8PathBuf;
use serde_json::Value;

/// One file discovered while flattening a proposed/validated structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenedFile {
    pub path: Utf8PathBuf,
    pub purpose: String,
}

/// Depth-first traversal of `structure`'s nested mappings. A leaf whose
/// value is a string is a file with that string as its purpose; a nested
/// mapping carrying a `purpose` or `description` field is itself a file
/// rather than a directory to descend into. Keys starting with `_` and the
/// reserved `metadata` key are skipped. Duplicate paths are de-duplicated
/// and the result is sorted lexicographically.
#[must_use]
pub fn flatten_structure(structure: &Value) -> Vec<FlattenedFile> {
    let mut files = Vec::new();
    let mut seen = BTreeSet::new();
    walk(structure, &Utf8PathBuf::new(), &mut files, &mut seen);
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}

fn walk(value: &Value, prefix: &Utf8PathBuf, files: &mut Vec<FlattenedFile>, seen: &mut BTreeSet<Utf8PathBuf>) {
    let Value::Object(map) = value else { return };

    for (key, child) in map {
        if key.starts_with('_') || key == "metadata" {
            continue;
        }
        let path = if prefix.as_str().is_empty() { Utf8PathBuf::from(key) } else { prefix.join(key) };

        match child {
            Value::String(purpose) => push_once(files, seen, path, purpose.clone()),
            Value::Object(obj) => {
                let purpose = obj
                    .get("purpose")
                    .or_else(|| obj.get("description"))
                    .and_then(Value::as_str);
                match purpose {
                    Some(purpose) => push_once(files, seen, path, purpose.to_string()),
                    None => walk(child, &path, files, seen),
                }
            }
            _ => {}
        }
    }
}

fn push_once(files: &mut Vec<FlattenedFile>, seen: &mut BTreeSet<Utf8PathBuf>, path: Utf8PathBuf, purpose: String) {
    if seen.insert(path.clone()) {
        files.push(FlattenedFile { path, purpose });
    }
}
